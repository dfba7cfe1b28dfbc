//! Stereo mixing: per-voice volumes, surround suppression, main/echo buses

use bincode::{Decode, Encode};
use s_dsp_common::num::ClampI16;

// A left*right volume product below the threshold counts as "surround" (opposite phases). No i8
// product reaches -0x7FFF, so the enabled threshold never triggers.
const SURROUND_ENABLED_THRESHOLD: i32 = -0x7FFF;
const SURROUND_DISABLED_THRESHOLD: i32 = 0;

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct Mixer {
    surround_threshold: i32,
}

impl Default for Mixer {
    fn default() -> Self {
        Self { surround_threshold: SURROUND_ENABLED_THRESHOLD }
    }
}

impl Mixer {
    pub fn disable_surround(&mut self, disable: bool) {
        self.surround_threshold =
            if disable { SURROUND_DISABLED_THRESHOLD } else { SURROUND_ENABLED_THRESHOLD };
    }

    #[cfg(test)]
    pub fn surround_disabled(&self) -> bool {
        self.surround_threshold == SURROUND_DISABLED_THRESHOLD
    }

    /// Effective voice volumes; with surround suppressed, whichever side is negative is inverted.
    pub fn voice_volume(&self, left: i8, right: i8) -> [i32; 2] {
        let (mut left, mut right) = (i32::from(left), i32::from(right));
        if left * right < self.surround_threshold {
            if left < 0 {
                left = -left;
            } else {
                right = -right;
            }
        }
        [left, right]
    }

    /// Effective main volumes; with surround suppressed, the right side is inverted.
    pub fn main_volume(&self, left: i8, right: i8) -> [i32; 2] {
        let (left, mut right) = (i32::from(left), i32::from(right));
        if left * right < self.surround_threshold {
            right = -right;
        }
        [left, right]
    }
}

/// Per-sample accumulators
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MixBus {
    main: [i32; 2],
    echo: [i32; 2],
}

impl MixBus {
    /// Add a voice's enveloped output at the given volumes.
    pub fn add_voice(&mut self, output: i32, volume: [i32; 2], to_echo: bool) {
        let contribution = volume.map(|volume| (volume * output) >> 7);

        for (channel, &sample) in contribution.iter().enumerate() {
            self.main[channel] += sample;
            if to_echo {
                self.echo[channel] += sample;
            }
        }
    }

    pub fn echo(&self) -> [i32; 2] {
        self.echo
    }

    /// Apply the main volume, add the echo return, and saturate to 16 bits.
    pub fn finish(self, main_volume: [i32; 2], echo_out: [i32; 2]) -> [i16; 2] {
        [0, 1].map(|channel| {
            let main = (self.main[channel] * main_volume[channel]) >> 7;
            (main + echo_out[channel]).clamp_i16()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surround_allowed_by_default() {
        let mixer = Mixer::default();
        assert!(!mixer.surround_disabled());
        assert_eq!([-128, 127], mixer.voice_volume(-128, 127));
        assert_eq!([127, -128], mixer.main_volume(127, -128));
    }

    #[test]
    fn surround_suppression_inverts_negative_side() {
        let mut mixer = Mixer::default();
        mixer.disable_surround(true);

        assert_eq!([64, 32], mixer.voice_volume(-64, 32));
        assert_eq!([64, 32], mixer.voice_volume(64, -32));
        assert_eq!([-64, -32], mixer.voice_volume(-64, -32), "both negative is not surround");
        assert_eq!([0, -32], mixer.voice_volume(0, -32), "zero product is not surround");

        // Main volume always inverts the right side
        assert_eq!([-64, -32], mixer.main_volume(-64, 32));
        assert_eq!([64, 32], mixer.main_volume(64, -32));

        mixer.disable_surround(false);
        assert_eq!([-64, 32], mixer.voice_volume(-64, 32));
    }

    #[test]
    fn buses_accumulate() {
        let mut bus = MixBus::default();
        bus.add_voice(1000, [64, -32], true);
        bus.add_voice(1000, [128, 0], false);

        assert_eq!([500, -250], bus.echo());
        assert_eq!([750, -125], bus.finish([64, 64], [0, 0]));
    }

    #[test]
    fn output_saturates() {
        let mut bus = MixBus::default();
        for _ in 0..8 {
            bus.add_voice(32766, [127, -128], false);
        }
        assert_eq!([i16::MAX, i16::MIN], bus.finish([127, 127], [0, 0]));
        assert_eq!([i16::MAX, i16::MIN], MixBus::default().finish([0, 0], [40000, -40000]));
    }
}
