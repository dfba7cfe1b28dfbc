//! Per-voice ADSR/GAIN envelope generator

use bincode::{Decode, Encode};
use s_dsp_common::num::GetBit;

/// Envelope levels are 11-bit
pub(crate) const ENVELOPE_RANGE: i32 = 0x800;
const ENVELOPE_MAX: i32 = ENVELOPE_RANGE - 1;

/// Every rate counter (envelope and noise) counts down from this value
pub(crate) const RATE_COUNTER_INITIAL: i32 = 0x7800;

/// Amount subtracted from a rate counter each sample, indexed by 5-bit rate. Rate 0 never fires.
pub(crate) const RATE_TABLE: [i32; 32] = [
    0, 15, 20, 24, 30, 40, 48, 60, 80, 96, 120, 160, 192, 240, 320, 384, 480, 640, 768, 960, 1280,
    1536, 1920, 2560, 3072, 3840, 5120, 6144, 7680, 10240, 15360, 30720,
];

const LINEAR_STEP: i32 = ENVELOPE_RANGE / 64;
pub(crate) const RELEASE_STEP: i32 = ENVELOPE_RANGE / 256;
const BENT_LINE_KNEE: i32 = ENVELOPE_RANGE * 3 / 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    #[default]
    Release,
}

fn exponential_decay(level: i32) -> i32 {
    level - (((level - 1) >> 8) + 1)
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct Envelope {
    stage: EnvelopeStage,
    level: i32,
    counter: i32,
}

impl Envelope {
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn key_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.level = 0;
        self.counter = RATE_COUNTER_INITIAL;
    }

    pub fn release(&mut self) {
        self.stage = EnvelopeStage::Release;
    }

    pub fn silence(&mut self) {
        self.level = 0;
    }

    /// Value for the ENVX register.
    ///
    /// During release the chip reports the top 3 bits of the level (`level >> 8`) rather than the
    /// usual 7 bits.
    pub fn envx(&self) -> u8 {
        match self.stage {
            EnvelopeStage::Release => (self.level >> 8) as u8,
            _ => (self.level >> 4) as u8,
        }
    }

    // Returns true when the counter expires, reloading it
    fn tick_counter(&mut self, rate: u8) -> bool {
        self.counter -= RATE_TABLE[(rate & 0x1F) as usize];
        if self.counter > 0 {
            return false;
        }

        self.counter = RATE_COUNTER_INITIAL;
        true
    }

    /// Advance the envelope by one sample.
    ///
    /// Returns the new level, or `None` if the release has finished and the voice should stop.
    pub fn clock(&mut self, adsr_1: u8, adsr_2: u8, gain: u8) -> Option<i32> {
        if self.stage == EnvelopeStage::Release {
            self.level -= RELEASE_STEP;
            if self.level <= 0 {
                self.level = 0;
                return None;
            }
            return Some(self.level);
        }

        if adsr_1.bit(7) {
            self.clock_adsr(adsr_1, adsr_2);
        } else {
            self.clock_gain(gain);
        }

        Some(self.level)
    }

    fn clock_adsr(&mut self, adsr_1: u8, adsr_2: u8) {
        match self.stage {
            EnvelopeStage::Attack => {
                let attack_rate = adsr_1 & 0x0F;
                if attack_rate == 0x0F {
                    self.level += ENVELOPE_RANGE / 2;
                } else {
                    if !self.tick_counter(attack_rate * 2 + 1) {
                        return;
                    }
                    self.level += LINEAR_STEP;
                }

                if self.level >= ENVELOPE_RANGE {
                    self.level = ENVELOPE_MAX;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                let decay_rate = ((adsr_1 >> 3) & 0x0E) + 0x10;
                if self.tick_counter(decay_rate) {
                    self.level = exponential_decay(self.level);
                }

                // Checked every sample, not only when the counter fires
                let sustain_level = i32::from(adsr_2 >> 5);
                if self.level <= (sustain_level + 1) * 0x100 {
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                if self.tick_counter(adsr_2 & 0x1F) {
                    self.level = exponential_decay(self.level);
                }
            }
            EnvelopeStage::Release => {}
        }
    }

    fn clock_gain(&mut self, gain: u8) {
        if !gain.bit(7) {
            // Direct: level jumps straight to the target
            self.level = i32::from(gain) << 4;
            return;
        }

        if !self.tick_counter(gain & 0x1F) {
            return;
        }

        match gain >> 5 {
            // Linear decrease
            4 => self.decrease_to(self.level - LINEAR_STEP),
            // Exponential decrease
            5 => self.decrease_to(exponential_decay(self.level)),
            // Linear increase
            6 => self.level = (self.level + LINEAR_STEP).min(ENVELOPE_MAX),
            // Bent line increase
            _ => {
                let step = if self.level < BENT_LINE_KNEE { LINEAR_STEP } else { RELEASE_STEP };
                self.level = (self.level + step).min(ENVELOPE_MAX);
            }
        }
    }

    fn decrease_to(&mut self, level: i32) {
        self.level = level;
        if self.level < 0 {
            self.level = 0;
            if self.stage == EnvelopeStage::Attack {
                self.stage = EnvelopeStage::Decay;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ADSR1 with ADSR mode enabled
    const ADSR_ON: u8 = 0x80;

    fn keyed_on() -> Envelope {
        let mut envelope = Envelope::default();
        envelope.key_on();
        envelope
    }

    #[test]
    fn fastest_attack_reaches_decay_in_two_samples() {
        let mut envelope = keyed_on();

        assert_eq!(Some(0x400), envelope.clock(ADSR_ON | 0x0F, 0x00, 0));
        assert_eq!(EnvelopeStage::Attack, envelope.stage());
        assert_eq!(0x40, envelope.envx());

        assert_eq!(Some(0x7FF), envelope.clock(ADSR_ON | 0x0F, 0x00, 0));
        assert_eq!(EnvelopeStage::Decay, envelope.stage());
        assert_eq!(0x7F, envelope.envx());
    }

    #[test]
    fn slowest_attack_steps_every_2048_samples() {
        let mut envelope = keyed_on();

        // Attack rate 0 uses table entry 1 (15); 0x7800 / 15 = 2048
        for sample in 1..2048 {
            assert_eq!(Some(0), envelope.clock(ADSR_ON, 0x00, 0), "sample {sample}");
        }
        assert_eq!(Some(32), envelope.clock(ADSR_ON, 0x00, 0));
    }

    #[test]
    fn decay_switches_to_sustain_at_sustain_level() {
        let mut envelope = keyed_on();
        envelope.clock(ADSR_ON | 0x0F, 0x00, 0);
        envelope.clock(ADSR_ON | 0x0F, 0x00, 0);
        assert_eq!(EnvelopeStage::Decay, envelope.stage());

        // Sustain level 7 => boundary (7 + 1) * 0x100 = 0x800, above every possible level
        envelope.clock(ADSR_ON | 0x0F, 0xE0, 0);
        assert_eq!(EnvelopeStage::Sustain, envelope.stage());

        // Sustain rate 0 never fires
        for _ in 0..10_000 {
            assert_eq!(Some(0x7FF), envelope.clock(ADSR_ON | 0x0F, 0xE0, 0));
        }
    }

    #[test]
    fn decay_is_exponential() {
        let mut envelope = keyed_on();
        envelope.clock(ADSR_ON | 0x7F, 0x00, 0);
        envelope.clock(ADSR_ON | 0x7F, 0x00, 0);

        // Decay rate 7 => table entry 0x1E (15360), fires every other sample
        assert_eq!(Some(0x7FF), envelope.clock(ADSR_ON | 0x7F, 0x00, 0));
        assert_eq!(Some(0x7F7), envelope.clock(ADSR_ON | 0x7F, 0x00, 0));
        assert_eq!(EnvelopeStage::Decay, envelope.stage());
    }

    #[test]
    fn release_steps_down_by_eight() {
        let mut envelope = keyed_on();
        envelope.clock(0x00, 0x00, 0x01);
        assert_eq!(0x10, envelope.level());

        envelope.release();
        assert_eq!(Some(0x08), envelope.clock(0x00, 0x00, 0x01));
        assert_eq!(0, envelope.envx(), "release reports level >> 8");
        assert_eq!(None, envelope.clock(0x00, 0x00, 0x01));
        assert_eq!(0, envelope.level());
    }

    #[test]
    fn release_envx_uses_top_bits() {
        let mut envelope = keyed_on();
        envelope.clock(0x00, 0x00, 0x7F);
        envelope.release();

        assert_eq!(Some(0x7E8), envelope.clock(0x00, 0x00, 0x7F));
        assert_eq!(0x07, envelope.envx());
    }

    #[test]
    fn gain_direct() {
        let mut envelope = keyed_on();
        assert_eq!(Some(0x400), envelope.clock(0x00, 0x00, 0x40));
        assert_eq!(0x40, envelope.envx());
        assert_eq!(Some(0x7F0), envelope.clock(0x00, 0x00, 0x7F));
        assert_eq!(Some(0), envelope.clock(0x00, 0x00, 0x00));
    }

    #[test]
    fn gain_linear_decrease_bottoms_out_and_leaves_attack() {
        let mut envelope = keyed_on();
        envelope.clock(0x00, 0x00, 0x04);
        assert_eq!(0x40, envelope.level());
        assert_eq!(EnvelopeStage::Attack, envelope.stage());

        // Rate 31 fires every sample
        assert_eq!(Some(0x20), envelope.clock(0x00, 0x00, 0x9F));
        assert_eq!(Some(0x00), envelope.clock(0x00, 0x00, 0x9F));
        assert_eq!(EnvelopeStage::Attack, envelope.stage());
        assert_eq!(Some(0x00), envelope.clock(0x00, 0x00, 0x9F));
        assert_eq!(EnvelopeStage::Decay, envelope.stage());
    }

    #[test]
    fn gain_exponential_decrease() {
        let mut envelope = keyed_on();
        envelope.clock(0x00, 0x00, 0x7F);

        assert_eq!(Some(0x7E8), envelope.clock(0x00, 0x00, 0xBF));
        assert_eq!(Some(0x7E0), envelope.clock(0x00, 0x00, 0xBF));
    }

    #[test]
    fn gain_linear_increase_clamps() {
        let mut envelope = keyed_on();
        envelope.clock(0x00, 0x00, 0x7E);
        assert_eq!(0x7E0, envelope.level());

        assert_eq!(Some(0x7FF), envelope.clock(0x00, 0x00, 0xDF));
        assert_eq!(Some(0x7FF), envelope.clock(0x00, 0x00, 0xDF));
    }

    #[test]
    fn gain_bent_line_slows_at_three_quarters() {
        let mut envelope = keyed_on();
        envelope.clock(0x00, 0x00, 0x5F);
        assert_eq!(0x5F0, envelope.level());

        assert_eq!(Some(0x610), envelope.clock(0x00, 0x00, 0xFF));
        assert_eq!(Some(0x618), envelope.clock(0x00, 0x00, 0xFF));
        assert_eq!(Some(0x620), envelope.clock(0x00, 0x00, 0xFF));
    }

    #[test]
    fn gain_rate_zero_holds() {
        let mut envelope = keyed_on();
        envelope.clock(0x00, 0x00, 0x20);
        for _ in 0..5000 {
            assert_eq!(Some(0x200), envelope.clock(0x00, 0x00, 0xC0));
        }
    }

    #[test]
    fn level_never_leaves_range() {
        for gain in 0x80..=0xFF_u8 {
            let mut envelope = keyed_on();
            for _ in 0..3000 {
                let level = envelope.clock(0x00, 0x00, gain).unwrap();
                assert!((0..ENVELOPE_RANGE).contains(&level), "gain {gain:02X}: level {level}");
            }
        }
    }
}
