//! Flat weight and statistics tensors
//!
//! Tensors are read from C-header style brace lists such as
//! `const float weights[] = { 0.5f, -1.25, 3e-2 };`. Everything outside the
//! first brace pair is ignored, so plain comma-separated files work too.

use crate::description::WeightPaths;
use crate::{NetworkError, NetworkResult};
use std::path::Path;
use tracing::{debug, info};

/// Parse the values of a brace list
///
/// `source_name` is only used in error messages.
pub fn parse_brace_list(text: &str, source_name: &str) -> NetworkResult<Vec<f64>> {
    let body = match text.find('{') {
        Some(open) => {
            let rest = &text[open + 1..];
            match rest.find('}') {
                Some(close) => &rest[..close],
                None => rest,
            }
        }
        None => text,
    };

    body.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(position, token)| {
            let number = token.strip_suffix(['f', 'F']).unwrap_or(token);
            number
                .parse::<f64>()
                .map_err(|_| NetworkError::WeightFormat {
                    source_name: source_name.to_string(),
                    position,
                    token: token.to_string(),
                })
        })
        .collect()
}

fn read_tensor(path: &Path) -> NetworkResult<Vec<f64>> {
    let text = std::fs::read_to_string(path).map_err(|e| NetworkError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let values = parse_brace_list(&text, &path.display().to_string())?;
    debug!("Read {} values from {}", values.len(), path.display());
    Ok(values)
}

/// Read-only tensors consumed by the graph builder
///
/// Missing biases read as zeros. Scales, means and variances are only
/// required by layers with batch normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightStore {
    pub weights: Vec<f64>,
    pub biases: Option<Vec<f64>>,
    pub scales: Option<Vec<f64>>,
    pub means: Option<Vec<f64>>,
    pub variances: Option<Vec<f64>>,
}

impl WeightStore {
    pub fn new(weights: Vec<f64>) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    pub fn with_biases(mut self, biases: Vec<f64>) -> Self {
        self.biases = Some(biases);
        self
    }

    /// Attach batch-norm statistics
    pub fn with_statistics(mut self, scales: Vec<f64>, means: Vec<f64>, variances: Vec<f64>) -> Self {
        self.scales = Some(scales);
        self.means = Some(means);
        self.variances = Some(variances);
        self
    }

    /// Read every tensor named in `paths`
    pub fn load(paths: &WeightPaths) -> NetworkResult<Self> {
        let optional = |path: &Option<std::path::PathBuf>| -> NetworkResult<Option<Vec<f64>>> {
            path.as_deref().map(read_tensor).transpose()
        };

        let store = Self {
            weights: read_tensor(&paths.weights)?,
            biases: optional(&paths.biases)?,
            scales: optional(&paths.scales)?,
            means: optional(&paths.means)?,
            variances: optional(&paths.variances)?,
        };
        info!(
            "Loaded {} weights, {} biases",
            store.weights.len(),
            store.biases.as_ref().map_or(0, Vec::len)
        );
        Ok(store)
    }

    pub fn has_statistics(&self) -> bool {
        self.scales.is_some() && self.means.is_some() && self.variances.is_some()
    }

    /// Bias of entry `index`, zero when no bias tensor was given
    pub fn bias(&self, index: usize) -> Option<f64> {
        match &self.biases {
            Some(biases) => biases.get(index).copied(),
            None => Some(0.0),
        }
    }
}
