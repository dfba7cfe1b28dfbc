use crate::envelope::{Envelope, EnvelopeStage};
use bincode::{Decode, Encode};

/// The chip's ADSR envelope generator driven by trigger and gate inputs instead of KON/KOF.
///
/// Parameters use the same encodings as the ADSR1/ADSR2 registers. Each call to
/// [`AdsrUnit::run`] is one 32 kHz sample.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct AdsrUnit {
    attack: u8,
    decay: u8,
    sustain_level: u8,
    sustain_rate: u8,
    amplitude: i8,
    envelope: Envelope,
    active: bool,
}

impl AdsrUnit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 4-bit attack rate; 15 reaches full level in 2 samples
    pub fn set_attack(&mut self, attack: u8) {
        self.attack = attack & 0x0F;
    }

    /// 3-bit decay rate
    pub fn set_decay(&mut self, decay: u8) {
        self.decay = decay & 0x07;
    }

    /// 3-bit sustain level; decay ends at `(level + 1) / 8` of full scale
    pub fn set_sustain_level(&mut self, sustain_level: u8) {
        self.sustain_level = sustain_level & 0x07;
    }

    /// 5-bit sustain rate; 0 holds the sustain level forever
    pub fn set_sustain_rate(&mut self, sustain_rate: u8) {
        self.sustain_rate = sustain_rate & 0x1F;
    }

    pub fn set_amplitude(&mut self, amplitude: i8) {
        self.amplitude = amplitude;
    }

    /// Current stage, or `None` if the unit is idle
    #[must_use]
    pub fn stage(&self) -> Option<EnvelopeStage> {
        self.active.then(|| self.envelope.stage())
    }

    fn registers(&self) -> (u8, u8) {
        let adsr_1 = 0x80 | (self.decay << 4) | self.attack;
        let adsr_2 = (self.sustain_level << 5) | self.sustain_rate;
        (adsr_1, adsr_2)
    }

    /// Advance one sample.
    ///
    /// A trigger restarts the attack from 0 regardless of the gate. Otherwise a low gate moves the
    /// envelope into release, and an idle unit outputs 0.
    pub fn run(&mut self, trigger: bool, gate: bool) -> i16 {
        if trigger {
            self.envelope.key_on();
            self.active = true;
        } else if !self.active {
            return 0;
        } else if !gate && self.envelope.stage() != EnvelopeStage::Release {
            log::trace!("ADSR gate released at level {:03X}", self.envelope.level());
            self.envelope.release();
        }

        let (adsr_1, adsr_2) = self.registers();
        if self.envelope.clock(adsr_1, adsr_2, 0).is_none() {
            self.active = false;
            return 0;
        }

        let envelope = i32::from(self.envelope.envx());
        ((envelope * i32::from(self.amplitude)) >> 7) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    // Instant attack into a sustain that never decays
    fn held_unit() -> AdsrUnit {
        let mut adsr = AdsrUnit::new();
        adsr.set_attack(15);
        adsr.set_decay(7);
        adsr.set_sustain_level(7);
        adsr.set_sustain_rate(0);
        adsr.set_amplitude(127);
        adsr
    }

    #[test]
    fn idle_until_triggered() {
        let mut adsr = held_unit();
        assert_eq!(None, adsr.stage());
        assert!((0..100).all(|_| adsr.run(false, true) == 0));
        assert_eq!(None, adsr.stage());
    }

    #[test]
    fn fast_attack_to_sustain() {
        let mut adsr = held_unit();

        // $400 -> $40 * 127 >> 7
        assert_eq!(63, adsr.run(true, true));
        assert_eq!(Some(EnvelopeStage::Attack), adsr.stage());

        assert_eq!(126, adsr.run(false, true));
        assert_eq!(Some(EnvelopeStage::Decay), adsr.stage());

        assert_eq!(126, adsr.run(false, true));
        assert_eq!(Some(EnvelopeStage::Sustain), adsr.stage());
        assert!((0..1000).all(|_| adsr.run(false, true) == 126));
    }

    #[test]
    fn slow_attack_steps_on_counter() {
        let mut adsr = held_unit();
        // Attack 0 uses rate 1, which subtracts 15 per sample: one step every 2048 samples
        adsr.set_attack(0);

        assert_eq!(0, adsr.run(true, true));
        for _ in 1..2047 {
            adsr.run(false, true);
        }
        assert_eq!(0, adsr.envelope.level());
        adsr.run(false, true);
        assert_eq!(0x20, adsr.envelope.level());
    }

    #[test]
    fn release_reports_top_bits_then_stops() {
        let mut adsr = held_unit();
        for _ in 0..10 {
            adsr.run(false, true);
        }
        adsr.run(true, true);
        adsr.run(false, true);
        adsr.run(false, true);

        // $7FF - 8 = $7F7; only level >> 8 reaches the output during release
        assert_eq!(6, adsr.run(false, false));
        assert_eq!(Some(EnvelopeStage::Release), adsr.stage());

        let outputs: Vec<_> = (0..255).map(|_| adsr.run(false, false)).collect();
        assert_eq!(0, *outputs.last().unwrap());
        assert_eq!(None, adsr.stage());

        // Gate high again does not restart without a trigger
        assert_eq!(0, adsr.run(false, true));
        assert_eq!(None, adsr.stage());
    }

    #[test]
    fn retrigger_during_release() {
        let mut adsr = held_unit();
        adsr.run(true, true);
        adsr.run(false, true);
        for _ in 0..50 {
            adsr.run(false, false);
        }

        assert_eq!(63, adsr.run(true, false));
        assert_eq!(Some(EnvelopeStage::Attack), adsr.stage());
    }

    #[test]
    fn negative_amplitude_inverts() {
        let mut adsr = held_unit();
        adsr.set_amplitude(-128);
        adsr.run(true, true);
        assert_eq!(-127, adsr.run(false, true));
    }

    #[test]
    fn parameters_are_masked() {
        let mut adsr = AdsrUnit::new();
        adsr.set_attack(0xFF);
        adsr.set_decay(0xFF);
        adsr.set_sustain_level(0xFF);
        adsr.set_sustain_rate(0xFF);
        assert_eq!((0xFF, 0xFF), adsr.registers());

        adsr.set_attack(0x12);
        adsr.set_decay(0x09);
        adsr.set_sustain_level(0x0A);
        adsr.set_sustain_rate(0x23);
        assert_eq!((0x92, 0x43), adsr.registers());
    }
}
