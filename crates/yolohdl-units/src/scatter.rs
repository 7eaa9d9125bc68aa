//! Line-buffer scatter unit
//!
//! A feature map is streamed one sample per cycle through `size + 1` circular
//! banks of `mem_size` words. One bank ingests the current row (addressed by
//! the input cursor) while the other `size` banks export the previous rows
//! (addressed by the output cursor). Each read shifts a fresh column into the
//! `size * size` window register:
//!
//! ```text
//!   mode (size+1 bits) ──► ingest = lowest set bit
//!   banks[(ingest + 1 + r) mod (size + 1)][output_cursor]  r = 0..size
//!        ──► window[0..size]   (oldest row first)
//!   window[i] ──► window[i + size], oldest column drops off
//! ```

use crate::{word_mask, Elaborate, UnitError, UnitResult};
use yolohdl_mir::{Entity, UnitCoord, UnitKind};

/// Control signals shared by every scatter unit of a buffer layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScatterControl {
    pub input_cursor: usize,
    pub output_cursor: usize,
    /// One-hot (priority) selector of the ingest bank
    pub mode: u64,
    pub en_read: bool,
    pub en_write: bool,
    pub en_zero: bool,
}

#[derive(Debug, Clone)]
pub struct ScatterUnit {
    coord: UnitCoord,
    size: usize,
    data_width: usize,
    mem_size: usize,
    banks: Vec<Vec<u64>>,
    window: Vec<u64>,
}

impl ScatterUnit {
    /// Build a unit for rows of `image_width` samples
    pub fn new(coord: UnitCoord, size: usize, data_width: usize, image_width: usize) -> UnitResult<Self> {
        if size == 0 || data_width == 0 || data_width > 64 || image_width == 0 {
            return Err(UnitError::InvalidConfig {
                unit: coord.entity_name(UnitKind::ScatterUnit),
                reason: format!(
                    "invalid shape: size {size}, data width {data_width}, image width {image_width}"
                ),
            });
        }
        let mem_size = image_width.next_power_of_two();
        Ok(Self {
            coord,
            size,
            data_width,
            mem_size,
            banks: vec![vec![0; mem_size]; size + 1],
            window: vec![0; size * size],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data_width(&self) -> usize {
        self.data_width
    }

    /// Depth of each bank
    pub fn mem_size(&self) -> usize {
        self.mem_size
    }

    /// Width of the cursor ports
    pub fn counter_width(&self) -> usize {
        counter_width(self.mem_size)
    }

    /// Window register, column-major with the newest column first
    pub fn window(&self) -> &[u64] {
        &self.window
    }

    /// Bank selected for ingest by `mode`, if any bit is set
    pub fn ingest_bank(&self, mode: u64) -> Option<usize> {
        let mode = mode & word_mask(self.size + 1);
        (mode != 0).then(|| mode.trailing_zeros() as usize)
    }

    /// Export banks in read order, oldest row first
    pub fn read_order(&self, ingest: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).map(move |r| (ingest + 1 + r) % (self.size + 1))
    }

    /// Clears the window register; bank contents are kept
    pub fn reset(&mut self) {
        self.window.fill(0);
    }

    /// Advance one clock edge
    pub fn step(&mut self, sample: u64, control: &ScatterControl) {
        let Some(ingest) = self.ingest_bank(control.mode) else {
            return;
        };
        let input_addr = control.input_cursor % self.mem_size;
        let output_addr = control.output_cursor % self.mem_size;

        if control.en_read {
            let fresh: Vec<u64> = if control.en_zero {
                vec![0; self.size]
            } else {
                self.read_order(ingest)
                    .map(|bank| self.banks[bank][output_addr])
                    .collect()
            };
            let keep = self.window.len() - self.size;
            self.window.copy_within(0..keep, self.size);
            self.window[..self.size].copy_from_slice(&fresh);
        }

        if control.en_write {
            self.banks[ingest][input_addr] = sample & word_mask(self.data_width);
        }
    }
}

/// Cursor width for a bank depth: `log2(mem_size) + 1`
pub fn counter_width(mem_size: usize) -> usize {
    mem_size.trailing_zeros() as usize + 1
}

impl Elaborate for ScatterUnit {
    fn coord(&self) -> UnitCoord {
        self.coord
    }

    fn name(&self) -> String {
        self.coord.entity_name(UnitKind::ScatterUnit)
    }

    fn entity(&self) -> Entity {
        let counter = self.counter_width();
        Entity::new(self.name())
            .with_clock_reset()
            .input("input", self.data_width)
            .input("input_counter", counter)
            .input("output_counter", counter)
            .input("mode", self.size + 1)
            .enables(&["en_read", "en_write", "en_zero"])
            .output("output", self.size * self.size * self.data_width)
    }
}
