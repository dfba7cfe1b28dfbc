//! Sony S-DSP emulation: the 8-voice sample playback chip of the SNES audio unit
//!
//! The DSP shares a 64KB RAM bank with the SPC700 CPU. The bank is owned by the caller and lent to
//! the chip for the duration of each [`SDsp::run`] call.

mod brr;
mod dsp;
mod echo;
mod envelope;
mod gaussian;
mod mixer;
mod noise;
pub mod registers;
pub mod standalone;
mod voice;

pub use brr::{BRR_BLOCK_LEN, BrrHeader, SourceEntry};
pub use dsp::SDsp;
pub use envelope::EnvelopeStage;
pub use registers::{RegisterError, RegisterFile};
pub use voice::pitch_from_frequency;

/// Size of the RAM bank shared with the SPC700
pub const AUDIO_RAM_LEN: usize = 64 * 1024;

/// The S-DSP produces one stereo sample every 32 SPC700 cycles, i.e. at 32000 Hz
pub const SAMPLE_RATE: u32 = 32000;

/// Number of voices on the chip
pub const VOICE_COUNT: usize = 8;

pub type AudioRam = [u8; AUDIO_RAM_LEN];

/// Allocate a zeroed RAM bank directly on the heap
#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn new_audio_ram() -> Box<AudioRam> {
    vec![0; AUDIO_RAM_LEN].into_boxed_slice().try_into().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_ram_is_zeroed() {
        let ram = new_audio_ram();
        assert_eq!(AUDIO_RAM_LEN, ram.len());
        assert!(ram.iter().all(|&byte| byte == 0));
    }
}
