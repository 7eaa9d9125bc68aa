//! Buffer layer: one scatter unit per filter with shared cursors and control

use crate::scatter::{ScatterControl, ScatterUnit};
use crate::{bus_slice, check_inputs, Elaborate, UnitResult};
use tracing::debug;
use yolohdl_mir::{Entity, Instance, UnitCoord, UnitKind};

#[derive(Debug, Clone)]
pub struct BufferLayer {
    coord: UnitCoord,
    size: usize,
    data_width: usize,
    units: Vec<ScatterUnit>,
}

impl BufferLayer {
    pub fn new(
        coord: UnitCoord,
        filters: usize,
        size: usize,
        data_width: usize,
        image_width: usize,
    ) -> UnitResult<Self> {
        let units = (0..filters)
            .map(|filter| ScatterUnit::new(coord.with_filter(filter), size, data_width, image_width))
            .collect::<UnitResult<Vec<_>>>()?;
        debug!(
            "{}: {} scatter units, window {}x{}, image width {}",
            coord.entity_name(UnitKind::BufferLayer),
            filters,
            size,
            size,
            image_width
        );
        Ok(Self {
            coord,
            size,
            data_width,
            units,
        })
    }

    pub fn filters(&self) -> usize {
        self.units.len()
    }

    pub fn units(&self) -> &[ScatterUnit] {
        &self.units
    }

    /// Bank depth shared by every unit
    pub fn mem_size(&self) -> usize {
        self.units.first().map(ScatterUnit::mem_size).unwrap_or(1)
    }

    pub fn counter_width(&self) -> usize {
        crate::scatter::counter_width(self.mem_size())
    }

    pub fn reset(&mut self) {
        self.units.iter_mut().for_each(ScatterUnit::reset);
    }

    /// Advance one clock edge with one sample per filter
    pub fn step(&mut self, samples: &[u64], control: &ScatterControl) -> UnitResult<()> {
        check_inputs(&self.name(), self.units.len(), samples.len())?;
        for (unit, &sample) in self.units.iter_mut().zip(samples) {
            unit.step(sample, control);
        }
        Ok(())
    }

    /// Windows of every unit, concatenated in filter order
    pub fn windows(&self) -> Vec<u64> {
        self.units
            .iter()
            .flat_map(|unit| unit.window().iter().copied())
            .collect()
    }
}

impl Elaborate for BufferLayer {
    fn coord(&self) -> UnitCoord {
        self.coord
    }

    fn name(&self) -> String {
        self.coord.entity_name(UnitKind::BufferLayer)
    }

    fn entity(&self) -> Entity {
        let filters = self.units.len();
        let window_width = self.size * self.size * self.data_width;
        let counter = self.counter_width();

        let entity = Entity::new(self.name())
            .with_clock_reset()
            .input("input", filters * self.data_width)
            .input("input_counter", counter)
            .input("output_counter", counter)
            .input("mode", self.size + 1)
            .enables(&["en_read", "en_write", "en_zero"])
            .output("output", filters * window_width);

        let shared = [
            "clk",
            "rst",
            "input_counter",
            "output_counter",
            "mode",
            "en_read",
            "en_write",
            "en_zero",
        ];
        self.units.iter().enumerate().fold(entity, |entity, (i, unit)| {
            let instance = shared
                .iter()
                .fold(Instance::new(format!("scatter_unit_{i}"), unit.name()), |inst, port| {
                    inst.connect(*port, *port)
                })
                .connect("input", bus_slice("input", i, self.data_width))
                .connect("output", bus_slice("output", i, window_width));
            entity.instance(instance)
        })
    }

    fn elaborate(&self) -> Vec<Entity> {
        std::iter::once(self.entity())
            .chain(self.units.iter().map(Elaborate::entity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_share_control() {
        let mut layer = BufferLayer::new(UnitCoord::layer(2), 2, 1, 8, 3).unwrap();
        assert_eq!(layer.mem_size(), 4);
        assert_eq!(layer.counter_width(), 3);

        let write = ScatterControl {
            input_cursor: 1,
            mode: 0b01,
            en_write: true,
            ..ScatterControl::default()
        };
        layer.step(&[10, 20], &write).unwrap();

        let read = ScatterControl {
            output_cursor: 1,
            mode: 0b10,
            en_read: true,
            ..ScatterControl::default()
        };
        layer.step(&[0, 0], &read).unwrap();
        assert_eq!(layer.windows(), vec![10, 20]);
        assert!(layer.step(&[0], &read).is_err());
    }

    #[test]
    fn test_entity_buses() {
        let layer = BufferLayer::new(UnitCoord::layer(5), 4, 3, 1, 52).unwrap();
        let entities = layer.elaborate();
        assert_eq!(entities.len(), 5);
        let top = &entities[0];
        assert_eq!(top.name, "BufferLayerL5");
        assert_eq!(top.port_width("input"), Some(4));
        assert_eq!(top.port_width("output"), Some(36));
        assert_eq!(top.port_width("input_counter"), Some(7));
        assert_eq!(top.instances[3].connections["output"], "output[35:27]");
        assert_eq!(yolohdl_mir::validate_hierarchy(&entities), Ok(()));
    }
}
