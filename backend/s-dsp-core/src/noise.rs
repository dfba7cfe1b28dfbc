use crate::envelope::{RATE_COUNTER_INITIAL, RATE_TABLE};
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct NoiseGenerator {
    lfsr: u16,
    counter: i32,
    output: i16,
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseGenerator {
    pub fn new() -> Self {
        Self { lfsr: 1, counter: 0, output: 0 }
    }

    pub fn output(&self) -> i16 {
        self.output
    }

    /// Advance one sample at the 5-bit noise rate from FLG. Shares the envelope rate table.
    pub fn clock(&mut self, rate: u8) {
        self.counter -= RATE_TABLE[(rate & 0x1F) as usize];
        if self.counter > 0 {
            return;
        }

        self.counter = RATE_COUNTER_INITIAL;

        // 15-bit LFSR, shifted left 1 to produce a 16-bit sample
        self.output = (self.lfsr << 1) as i16;
        let feedback = ((self.lfsr << 13) ^ (self.lfsr << 14)) & 0x4000;
        self.lfsr = feedback | (self.lfsr >> 1);
    }
}
