//! Structural invariant checks
//!
//! Elaborated entities must satisfy:
//! 1. Port and instance names are unique within an entity
//! 2. Bit ports have a non-zero width
//! 3. Constants fit their width and each group is indexed `0..n` in order
//! 4. Instances reference known entities and connect only existing ports

use crate::entity::{DataType, Entity};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Duplicate port '{port}' in entity '{entity}'")]
    DuplicatePort { entity: String, port: String },

    #[error("Port '{port}' in entity '{entity}' has zero width")]
    ZeroWidthPort { entity: String, port: String },

    #[error("Constant '{constant}' in entity '{entity}' does not fit in {width} bits")]
    ConstantOverflow {
        entity: String,
        constant: String,
        width: usize,
    },

    #[error("Constant group '{group}' in entity '{entity}' is not indexed in order")]
    ConstantOrder { entity: String, group: String },

    #[error("Duplicate instance '{instance}' in entity '{entity}'")]
    DuplicateInstance { entity: String, instance: String },

    #[error("Instance '{instance}' in entity '{entity}' references unknown entity '{target}'")]
    UnknownEntity {
        entity: String,
        instance: String,
        target: String,
    },

    #[error("Instance '{instance}' in entity '{entity}' connects unknown port '{port}'")]
    UnknownPort {
        entity: String,
        instance: String,
        port: String,
    },
}

/// Validate a single entity's local invariants
pub fn validate_entity(entity: &Entity) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for port in &entity.ports {
        if !seen.insert(port.name.as_str()) {
            return Err(ValidationError::DuplicatePort {
                entity: entity.name.clone(),
                port: port.name.clone(),
            });
        }
        if port.port_type == DataType::Bit(0) {
            return Err(ValidationError::ZeroWidthPort {
                entity: entity.name.clone(),
                port: port.name.clone(),
            });
        }
    }

    let mut next_index: HashMap<&str, usize> = HashMap::new();
    for constant in &entity.constants {
        let fits = constant.width > 0 && (constant.width >= 64 || constant.bits >> constant.width == 0);
        if !fits {
            return Err(ValidationError::ConstantOverflow {
                entity: entity.name.clone(),
                constant: constant.name(),
                width: constant.width,
            });
        }
        let expected = next_index.entry(constant.group.as_str()).or_insert(0);
        if constant.index != *expected {
            return Err(ValidationError::ConstantOrder {
                entity: entity.name.clone(),
                group: constant.group.clone(),
            });
        }
        *expected += 1;
    }

    let mut instances = HashSet::new();
    for instance in &entity.instances {
        if !instances.insert(instance.name.as_str()) {
            return Err(ValidationError::DuplicateInstance {
                entity: entity.name.clone(),
                instance: instance.name.clone(),
            });
        }
    }

    Ok(())
}

/// Validate every entity and the instance references between them
pub fn validate_hierarchy(entities: &[Entity]) -> Result<(), ValidationError> {
    let by_name: HashMap<&str, &Entity> = entities.iter().map(|e| (e.name.as_str(), e)).collect();

    for entity in entities {
        validate_entity(entity)?;
        for instance in &entity.instances {
            let target = by_name.get(instance.entity.as_str()).ok_or_else(|| {
                ValidationError::UnknownEntity {
                    entity: entity.name.clone(),
                    instance: instance.name.clone(),
                    target: instance.entity.clone(),
                }
            })?;
            if let Some(port) = instance
                .connections
                .keys()
                .find(|port| target.find_port(port).is_none())
            {
                return Err(ValidationError::UnknownPort {
                    entity: entity.name.clone(),
                    instance: instance.name.clone(),
                    port: port.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ConstantPort, Instance};

    #[test]
    fn test_validate_ok() {
        let child = Entity::new("Child").with_clock_reset().input("input", 8).output("output", 8);
        let parent = Entity::new("Parent")
            .with_clock_reset()
            .constant("kernel", 8, 0xFF)
            .instance(Instance::new("u0", "Child").connect("clk", "clk").connect("input", "input"));
        assert_eq!(validate_hierarchy(&[child, parent]), Ok(()));
    }

    #[test]
    fn test_duplicate_port() {
        let entity = Entity::new("E").input("a", 1).input("a", 2);
        assert!(matches!(
            validate_entity(&entity),
            Err(ValidationError::DuplicatePort { .. })
        ));
    }

    #[test]
    fn test_zero_width_port() {
        let entity = Entity::new("E").output("output", 0);
        assert!(matches!(
            validate_entity(&entity),
            Err(ValidationError::ZeroWidthPort { .. })
        ));
    }

    #[test]
    fn test_constant_checks() {
        let entity = Entity::new("E").constant("kernel", 4, 0x1F);
        assert!(matches!(
            validate_entity(&entity),
            Err(ValidationError::ConstantOverflow { .. })
        ));

        let mut entity = Entity::new("E");
        entity.constants.push(ConstantPort {
            group: "kernel".to_string(),
            index: 1,
            width: 8,
            bits: 0,
        });
        assert!(matches!(
            validate_entity(&entity),
            Err(ValidationError::ConstantOrder { .. })
        ));
    }

    #[test]
    fn test_unknown_references() {
        let parent = Entity::new("Parent").instance(Instance::new("u0", "Missing"));
        assert!(matches!(
            validate_hierarchy(&[parent]),
            Err(ValidationError::UnknownEntity { .. })
        ));

        let child = Entity::new("Child").input("input", 8);
        let parent = Entity::new("Parent").instance(Instance::new("u0", "Child").connect("bogus", "x"));
        assert!(matches!(
            validate_hierarchy(&[child, parent]),
            Err(ValidationError::UnknownPort { .. })
        ));
    }
}
