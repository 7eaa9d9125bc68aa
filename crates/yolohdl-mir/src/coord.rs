//! Unit coordinates and entity naming

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a unit inside the network
///
/// Coordinates are built once and copied into child units; the `with_*`
/// methods return a new value instead of mutating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitCoord {
    pub layer: usize,
    pub part: usize,
    pub filter: usize,
    pub channel: usize,
}

/// Kind of generated entity, selecting its naming pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    ConvUnit,
    BinConvUnit,
    MultiChannelConvUnit,
    ConvLayerPart,
    ConvLayer,
    ScatterUnit,
    BufferLayer,
    MaxPoolUnit,
    MaxPoolLayer,
}

impl UnitCoord {
    pub fn layer(layer: usize) -> Self {
        Self {
            layer,
            ..Self::default()
        }
    }

    pub fn with_part(self, part: usize) -> Self {
        Self { part, ..self }
    }

    pub fn with_filter(self, filter: usize) -> Self {
        Self { filter, ..self }
    }

    pub fn with_channel(self, channel: usize) -> Self {
        Self { channel, ..self }
    }

    /// Entity name of a unit of `kind` at this coordinate
    pub fn entity_name(&self, kind: UnitKind) -> String {
        let Self {
            layer,
            part,
            filter,
            channel,
        } = *self;
        match kind {
            UnitKind::ConvUnit => format!("ConvUnitL{layer}F{filter}C{channel}P{part}"),
            UnitKind::BinConvUnit => format!("BinConvUnitL{layer}F{filter}C{channel}P{part}"),
            UnitKind::MultiChannelConvUnit => {
                format!("MultiChannelConvUnitL{layer}F{filter}P{part}")
            }
            UnitKind::ConvLayerPart => format!("ConvLayerL{layer}P{part}"),
            UnitKind::ConvLayer => format!("ConvLayerL{layer}"),
            UnitKind::ScatterUnit => format!("ScatterUnitL{layer}F{filter}"),
            UnitKind::BufferLayer => format!("BufferLayerL{layer}"),
            UnitKind::MaxPoolUnit => format!("MaxPoolUnitL{layer}F{filter}"),
            UnitKind::MaxPoolLayer => format!("MaxPoolLayerL{layer}"),
        }
    }
}

impl fmt::Display for UnitCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L{}P{}F{}C{}",
            self.layer, self.part, self.filter, self.channel
        )
    }
}
