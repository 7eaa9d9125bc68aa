//! yolohdl MIR - structural description of generated entities
//!
//! Every datapath unit elaborates into an `Entity`:
//! - Ports with direction and bit width (clock, reset, enables, buses)
//! - Constant ports holding quantized kernels and batch-norm coefficients,
//!   grouped and indexed numerically
//! - Child instances with their port connections
//!
//! Unit names are derived at the entity boundary from an immutable
//! `UnitCoord`.

pub mod coord;
pub mod entity;
pub mod validation;

pub use coord::{UnitCoord, UnitKind};
pub use entity::{ConstantPort, DataType, Entity, Instance, Port, PortDirection};
pub use validation::{validate_entity, validate_hierarchy, ValidationError};
