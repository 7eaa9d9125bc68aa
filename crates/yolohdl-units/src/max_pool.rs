//! 2x2 max pooling
//!
//! The unit compares its four inputs in two combinational pairs and
//! registers the larger pair result on `en_pool`. Value units compare signed
//! words. Binary units carry 1-bit signs (1 = negative), so the maximum is
//! negative only when both operands are.

use crate::{bus_slice, check_inputs, word_mask, Elaborate, UnitResult};
use tracing::debug;
use yolohdl_mir::{Entity, Instance, UnitCoord, UnitKind};

#[derive(Debug, Clone)]
pub struct MaxPoolUnit {
    coord: UnitCoord,
    width: usize,
    binary: bool,
    output: u64,
}

impl MaxPoolUnit {
    pub fn new(coord: UnitCoord, width: usize, binary: bool) -> Self {
        let width = if binary { 1 } else { width.clamp(1, 64) };
        Self {
            coord,
            width,
            binary,
            output: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn output(&self) -> u64 {
        self.output
    }

    pub fn reset(&mut self) {
        self.output = 0;
    }

    /// Larger of two words
    pub fn max(&self, a: u64, b: u64) -> u64 {
        let (a, b) = (a & word_mask(self.width), b & word_mask(self.width));
        if self.binary {
            a & b
        } else if self.signed(a) >= self.signed(b) {
            a
        } else {
            b
        }
    }

    fn signed(&self, word: u64) -> i64 {
        let shift = 64 - self.width as u32;
        ((word << shift) as i64) >> shift
    }

    /// Advance one clock edge with the four window samples
    pub fn step(&mut self, inputs: &[u64], en_pool: bool) -> UnitResult<()> {
        check_inputs(&self.name(), 4, inputs.len())?;
        if en_pool {
            let first0 = self.max(inputs[0], inputs[1]);
            let first1 = self.max(inputs[2], inputs[3]);
            self.output = self.max(first0, first1);
        }
        Ok(())
    }
}

impl Elaborate for MaxPoolUnit {
    fn coord(&self) -> UnitCoord {
        self.coord
    }

    fn name(&self) -> String {
        self.coord.entity_name(UnitKind::MaxPoolUnit)
    }

    fn entity(&self) -> Entity {
        Entity::new(self.name())
            .with_clock_reset()
            .enables(&["en_pool"])
            .input("input", 4 * self.width)
            .output("output", self.width)
    }
}

/// One max-pool unit per filter with shared control
#[derive(Debug, Clone)]
pub struct MaxPoolLayer {
    coord: UnitCoord,
    units: Vec<MaxPoolUnit>,
}

impl MaxPoolLayer {
    pub fn new(coord: UnitCoord, filters: usize, width: usize, binary: bool) -> Self {
        let units: Vec<MaxPoolUnit> = (0..filters)
            .map(|filter| MaxPoolUnit::new(coord.with_filter(filter), width, binary))
            .collect();
        debug!(
            "{}: {} units",
            coord.entity_name(UnitKind::MaxPoolLayer),
            units.len()
        );
        Self { coord, units }
    }

    pub fn filters(&self) -> usize {
        self.units.len()
    }

    pub fn units(&self) -> &[MaxPoolUnit] {
        &self.units
    }

    /// Output word of every unit
    pub fn outputs(&self) -> Vec<u64> {
        self.units.iter().map(MaxPoolUnit::output).collect()
    }

    pub fn reset(&mut self) {
        self.units.iter_mut().for_each(MaxPoolUnit::reset);
    }

    /// Advance one clock edge; `inputs` holds four words per filter
    pub fn step(&mut self, inputs: &[u64], en_pool: bool) -> UnitResult<()> {
        check_inputs(&self.name(), 4 * self.units.len(), inputs.len())?;
        for (unit, window) in self.units.iter_mut().zip(inputs.chunks(4)) {
            unit.step(window, en_pool)?;
        }
        Ok(())
    }

    fn unit_width(&self) -> usize {
        self.units.first().map(MaxPoolUnit::width).unwrap_or(1)
    }
}

impl Elaborate for MaxPoolLayer {
    fn coord(&self) -> UnitCoord {
        self.coord
    }

    fn name(&self) -> String {
        self.coord.entity_name(UnitKind::MaxPoolLayer)
    }

    fn entity(&self) -> Entity {
        let width = self.unit_width();
        let entity = Entity::new(self.name())
            .with_clock_reset()
            .enables(&["en_pool"])
            .input("input", 4 * width * self.units.len())
            .output("output", width * self.units.len());

        self.units.iter().enumerate().fold(entity, |entity, (i, unit)| {
            entity.instance(
                Instance::new(format!("max_pool_unit_{i}"), unit.name())
                    .connect("clk", "clk")
                    .connect("rst", "rst")
                    .connect("en_pool", "en_pool")
                    .connect("input", bus_slice("input", i, 4 * width))
                    .connect("output", bus_slice("output", i, width)),
            )
        })
    }

    fn elaborate(&self) -> Vec<Entity> {
        std::iter::once(self.entity())
            .chain(self.units.iter().map(Elaborate::entity))
            .collect()
    }
}
