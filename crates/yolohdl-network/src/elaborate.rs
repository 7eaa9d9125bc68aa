//! Parallel elaboration of a network graph

use crate::graph::NetworkGraph;
use crate::weights::WeightStore;
use crate::NetworkResult;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use yolohdl_mir::{validate_hierarchy, Entity};
use yolohdl_parallel::ElaborationEngine;

/// Elaborated entities of a whole network, in emission order
#[derive(Debug, Clone)]
pub struct Elaboration {
    pub entities: Vec<Entity>,
}

/// Serializable summary of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub name: String,
    /// Port name to width, in declaration order
    pub ports: IndexMap<String, usize>,
    pub constants: usize,
    pub instances: usize,
}

impl Elaboration {
    pub fn find(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    pub fn report(&self) -> Vec<UnitReport> {
        self.entities
            .iter()
            .map(|entity| UnitReport {
                name: entity.name.clone(),
                ports: entity
                    .ports
                    .iter()
                    .map(|port| (port.name.clone(), port.port_type.width()))
                    .collect(),
                constants: entity.constants.len(),
                instances: entity.instances.len(),
            })
            .collect()
    }
}

/// Elaborate every emission unit on the engine and validate the hierarchy
///
/// Units only share the read-only store. All unit failures are collected
/// before the build fails.
pub fn elaborate_graph(
    graph: &NetworkGraph,
    store: Arc<WeightStore>,
    engine: &ElaborationEngine,
) -> NetworkResult<Elaboration> {
    let per_unit = engine.run(&graph.units, |unit| unit.elaborate(&store))?;
    let entities: Vec<Entity> = per_unit.into_iter().flatten().collect();

    validate_hierarchy(&entities)?;
    info!(
        "Elaborated {} entities from {} units",
        entities.len(),
        graph.units.len()
    );
    Ok(Elaboration { entities })
}
