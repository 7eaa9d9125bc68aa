//! yolohdl manifest parsing
//!
//! This crate handles parsing and validation of `yolohdl.toml` files, which
//! configure the generator: the fixed-point format, the leaky activation,
//! the batch-norm epsilon and the elaboration thread pool.

pub mod error;
pub mod manifest;

pub use error::{ManifestError, Result};
pub use manifest::{ActivationConfig, BatchNormConfig, FormatConfig, Manifest, ParallelConfig};

use std::path::Path;

/// Default manifest file name
pub const MANIFEST_FILE: &str = "yolohdl.toml";

/// Parse and validate a manifest from a file path
pub fn from_path(path: impl AsRef<Path>) -> Result<Manifest> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ManifestError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
    from_str(&contents)
}

/// Parse and validate a manifest from a string
pub fn from_str(s: &str) -> Result<Manifest> {
    let manifest: Manifest = toml::from_str(s).map_err(|e| ManifestError::Parse(e.to_string()))?;
    manifest.validate()?;
    Ok(manifest)
}

/// Load `yolohdl.toml` from `dir` if present, otherwise the defaults
pub fn discover(dir: impl AsRef<Path>) -> Result<Manifest> {
    let path = dir.as_ref().join(MANIFEST_FILE);
    if path.is_file() {
        from_path(path)
    } else {
        Ok(Manifest::default())
    }
}
