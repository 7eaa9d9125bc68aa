//! Entities, ports and instances

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A generated hardware entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name, unique across the network
    pub name: String,
    /// Input/output ports in declaration order
    pub ports: Vec<Port>,
    /// Constant ports (kernels, scale, bias)
    pub constants: Vec<ConstantPort>,
    /// Child instances
    pub instances: Vec<Instance>,
}

/// Port of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,
    pub port_type: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Port data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Bit vector of the given width
    Bit(usize),
    /// Rising-edge clock
    Clock,
    /// Synchronous reset
    Reset { active_high: bool },
}

impl DataType {
    pub fn width(&self) -> usize {
        match self {
            DataType::Bit(width) => *width,
            DataType::Clock | DataType::Reset { .. } => 1,
        }
    }
}

/// Constant driven into an entity, e.g. one kernel weight
///
/// Constants of the same group are indexed from zero in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantPort {
    pub group: String,
    pub index: usize,
    pub width: usize,
    pub bits: u64,
}

impl ConstantPort {
    pub fn name(&self) -> String {
        format!("{}_{}", self.group, self.index)
    }
}

/// Child entity instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance name
    pub name: String,
    /// Name of the instantiated entity
    pub entity: String,
    /// Child port name to parent net expression
    pub connections: IndexMap<String, String>,
}

impl Instance {
    pub fn new(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            connections: IndexMap::new(),
        }
    }

    /// Connect a child port to a parent net
    pub fn connect(mut self, port: impl Into<String>, net: impl Into<String>) -> Self {
        self.connections.insert(port.into(), net.into());
        self
    }
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            constants: Vec::new(),
            instances: Vec::new(),
        }
    }

    /// Add `clk` and `rst` ports
    pub fn with_clock_reset(self) -> Self {
        self.port("clk", PortDirection::Input, DataType::Clock)
            .port("rst", PortDirection::Input, DataType::Reset { active_high: true })
    }

    pub fn port(mut self, name: impl Into<String>, direction: PortDirection, port_type: DataType) -> Self {
        self.ports.push(Port {
            name: name.into(),
            direction,
            port_type,
        });
        self
    }

    pub fn input(self, name: impl Into<String>, width: usize) -> Self {
        self.port(name, PortDirection::Input, DataType::Bit(width))
    }

    pub fn output(self, name: impl Into<String>, width: usize) -> Self {
        self.port(name, PortDirection::Output, DataType::Bit(width))
    }

    /// Add one-bit enable inputs
    pub fn enables(self, names: &[&str]) -> Self {
        names.iter().fold(self, |entity, name| entity.input(*name, 1))
    }

    /// Append a constant to `group`, indexed after the existing ones
    pub fn constant(mut self, group: &str, width: usize, bits: u64) -> Self {
        let index = self.constants_in(group).count();
        self.constants.push(ConstantPort {
            group: group.to_string(),
            index,
            width,
            bits,
        });
        self
    }

    pub fn instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn find_port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Width of a named port, if present
    pub fn port_width(&self, name: &str) -> Option<usize> {
        self.find_port(name).map(|p| p.port_type.width())
    }

    /// Ports keyed by name, preserving declaration order
    pub fn port_map(&self) -> IndexMap<&str, &Port> {
        self.ports.iter().map(|p| (p.name.as_str(), p)).collect()
    }

    pub fn constants_in<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a ConstantPort> + 'a {
        self.constants.iter().filter(move |c| c.group == group)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Output)
    }
}
