use crate::echo::{self, ECHO_BLOCK_LEN, FIR_TAPS, FRAME_LEN, FirFilter};
use bincode::{Decode, Encode};
use s_dsp_common::num::ClampI16;

const DELAY_RAM_LEN: usize = EchoUnit::MAX_DELAY as usize * ECHO_BLOCK_LEN as usize;

const DEFAULT_FIR: [i16; FIR_TAPS] = [127, 0, 0, 0, 0, 0, 0, 0];

/// The chip's echo path with its own delay RAM, processing an external stereo signal.
///
/// Up to 31 blocks of delay are available instead of the chip's 15.
#[derive(Debug, Clone, Encode, Decode)]
pub struct EchoUnit {
    ram: Box<[u8]>,
    buffer_offset: u16,
    fir: FirFilter,
    coefficients: [i16; FIR_TAPS],
    delay: u8,
    feedback: i8,
    mix: [i8; 2],
}

impl Default for EchoUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoUnit {
    /// Longest delay setting, in 16ms (2KB) blocks
    pub const MAX_DELAY: u8 = 31;

    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; DELAY_RAM_LEN].into_boxed_slice(),
            buffer_offset: 0,
            fir: FirFilter::default(),
            coefficients: DEFAULT_FIR,
            delay: 0,
            feedback: 0,
            mix: [0; 2],
        }
    }

    /// Clear the delay line and zero delay, feedback, and mix. FIR coefficients are kept.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.buffer_offset = 0;
        self.fir.reset();
        self.delay = 0;
        self.feedback = 0;
        self.mix = [0; 2];
    }

    /// Delay in 16ms blocks, masked to 5 bits
    pub fn set_delay(&mut self, delay: u8) {
        self.delay = delay & Self::MAX_DELAY;
    }

    pub fn set_feedback(&mut self, feedback: i8) {
        self.feedback = feedback;
    }

    pub fn set_mix_left(&mut self, mix: i8) {
        self.mix[0] = mix;
    }

    pub fn set_mix_right(&mut self, mix: i8) {
        self.mix[1] = mix;
    }

    /// Set FIR coefficient `index` (0-7). Coefficient 7 multiplies the newest delayed sample.
    ///
    /// # Panics
    ///
    /// Panics if `index` is 8 or more.
    pub fn set_fir(&mut self, index: usize, coefficient: i8) {
        self.coefficients[index] = coefficient.into();
    }

    #[must_use]
    pub fn fir(&self, index: usize) -> i8 {
        self.coefficients[index] as i8
    }

    /// Process one 32 kHz stereo sample, returning the dry signal plus the mixed echo.
    pub fn run(&mut self, left: i32, right: i32) -> [i16; 2] {
        let frame_address = self.buffer_offset;

        self.buffer_offset += FRAME_LEN;
        if u32::from(self.buffer_offset) >= u32::from(self.delay) * ECHO_BLOCK_LEN {
            self.buffer_offset = 0;
        }

        self.fir.push(echo::read_frame(&self.ram, frame_address));
        let fir_out = self.fir.apply(&self.coefficients);

        let input = [left, right];
        let feedback = i32::from(self.feedback);
        let frame: [i16; 2] = std::array::from_fn(|channel| {
            (input[channel] + (fir_out[channel].wrapping_mul(feedback) >> 14)).clamp_i16()
        });
        echo::write_frame(&mut self.ram, frame_address, frame);

        std::array::from_fn(|channel| {
            let mix = i32::from(self.mix[channel]);
            (input[channel] + (fir_out[channel].wrapping_mul(mix) >> 14)).clamp_i16()
        })
    }
}
