//! Echo: a stereo ring buffer in audio RAM feeding an 8-tap FIR filter with feedback

use crate::AudioRam;
use crate::registers::RegisterFile;
use bincode::{Decode, Encode};
use s_dsp_common::num::{ClampI16, read_u16_le, write_u16_le};

/// Each EDL step adds 2KB (512 stereo frames) of delay
pub(crate) const ECHO_BLOCK_LEN: u32 = 0x800;
pub(crate) const FRAME_LEN: u16 = 4;
pub(crate) const FIR_TAPS: usize = 8;

/// Last 8 stereo samples read from an echo buffer, and the FIR over them.
///
/// Coefficient 7 multiplies the newest sample and coefficient 0 the oldest.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct FirFilter {
    samples: [[i16; 2]; FIR_TAPS],
    newest_idx: usize,
}

impl FirFilter {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn push(&mut self, sample: [i16; 2]) {
        self.newest_idx = (self.newest_idx + FIR_TAPS - 1) % FIR_TAPS;
        self.samples[self.newest_idx] = sample;
    }

    /// Unscaled FIR output; callers shift by 14 after applying a volume
    pub fn apply(&self, coefficients: &[i16; 8]) -> [i32; 2] {
        let mut out = [0_i32; 2];
        for age in 0..FIR_TAPS {
            let coefficient = i32::from(coefficients[FIR_TAPS - 1 - age]);
            let sample = self.samples[(self.newest_idx + age) % FIR_TAPS];
            for (channel, out) in out.iter_mut().enumerate() {
                *out += i32::from(sample[channel]) * coefficient;
            }
        }
        out
    }
}

pub(crate) fn read_frame(ram: &[u8], address: u16) -> [i16; 2] {
    [
        read_u16_le(ram, address.into()) as i16,
        read_u16_le(ram, address.wrapping_add(2).into()) as i16,
    ]
}

pub(crate) fn write_frame(ram: &mut [u8], address: u16, frame: [i16; 2]) {
    write_u16_le(ram, address.into(), frame[0] as u16);
    write_u16_le(ram, address.wrapping_add(2).into(), frame[1] as u16);
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct EchoFilter {
    buffer_offset: u16,
    fir: FirFilter,
}

impl EchoFilter {
    pub fn reset(&mut self) {
        self.buffer_offset = 0;
        self.fir.reset();
    }

    #[cfg(test)]
    pub fn buffer_offset(&self) -> u16 {
        self.buffer_offset
    }

    /// Read the oldest frame from the ring, filter it, and write `echo_in` plus feedback back into
    /// its slot (unless FLG disables echo writes).
    ///
    /// Returns the echo contribution to the main output.
    pub fn process(
        &mut self,
        ram: &mut AudioRam,
        registers: &RegisterFile,
        echo_in: [i32; 2],
    ) -> [i32; 2] {
        let frame_address = registers.echo_buffer_address().wrapping_add(self.buffer_offset);

        // The cursor moves before the wrap check, so EDL 0 keeps a single 4-byte slot
        self.buffer_offset = self.buffer_offset.wrapping_add(FRAME_LEN);
        let buffer_len = u32::from(registers.echo_delay() & 0x0F) * ECHO_BLOCK_LEN;
        if u32::from(self.buffer_offset) >= buffer_len {
            self.buffer_offset = 0;
        }

        self.fir.push(read_frame(ram, frame_address));
        let fir_out = self.fir.apply(registers.fir_coefficients());

        // Extreme coefficients can overflow 32 bits here; the chip wraps
        let (volume_l, volume_r) = registers.echo_volume();
        let echo_out = [
            fir_out[0].wrapping_mul(volume_l.into()) >> 14,
            fir_out[1].wrapping_mul(volume_r.into()) >> 14,
        ];

        if !registers.flags().echo_writes_disabled {
            let feedback = i32::from(registers.echo_feedback());
            let frame = [
                (echo_in[0] + (fir_out[0].wrapping_mul(feedback) >> 14)).clamp_i16(),
                (echo_in[1] + (fir_out[1].wrapping_mul(feedback) >> 14)).clamp_i16(),
            ];
            write_frame(ram, frame_address, frame);
        }

        echo_out
    }
}
