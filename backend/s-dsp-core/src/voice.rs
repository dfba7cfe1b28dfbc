use crate::brr::{BrrDecoder, SampleHistory, SourceEntry};
use crate::envelope::{Envelope, EnvelopeStage};
use crate::registers::VoiceRegisters;
use crate::{AudioRam, SAMPLE_RATE, gaussian};
use bincode::{Decode, Encode};

/// Samples between a KON bit being latched and the voice starting
pub(crate) const KEY_ON_DELAY: u8 = 8;

/// Pitch register value that plays a sample at its native 32 kHz rate
pub const PITCH_UNITY: u16 = 0x1000;

/// Convert a playback frequency relative to 32 kHz into a 14-bit pitch register value.
///
/// `frequency` is the rate, in Hz, at which the sample's own samples should be consumed, so
/// `32000.0` maps to [`PITCH_UNITY`]. Values wrap to 14 bits and negative inputs map to 0.
#[must_use]
pub fn pitch_from_frequency(frequency: f32) -> u16 {
    let pitch = f32::from(PITCH_UNITY) * frequency / SAMPLE_RATE as f32;
    (pitch as u32 & 0x3FFF) as u16
}

/// Everything outside the voice's own state that a voice step reads
#[derive(Debug, Clone, Copy)]
pub(crate) struct VoiceInput {
    pub registers: VoiceRegisters,
    pub key_on: bool,
    pub key_off: bool,
    pub pitch_modulation: bool,
    pub noise: bool,
    pub noise_output: i16,
    /// Output of the previous voice in this sample, used for pitch modulation
    pub previous_output: i32,
    pub directory_address: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct VoiceOutput {
    /// The voice latched its KON bit; the bit must be cleared in the register
    pub key_on_latched: bool,
    /// An end block finished; the voice's ENDX bit must be set
    pub end_flag_seen: bool,
    /// Enveloped sample, before volume
    pub sample: i32,
    pub envx: u8,
    pub outx: u8,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct Voice {
    keyed: bool,
    key_on_delay: u8,
    envelope: Envelope,
    decoder: BrrDecoder,
    history: SampleHistory,
    // 4.12 fixed point position between the 2nd and 3rd newest history samples
    fraction: u16,
}

impl Voice {
    pub fn reset(&mut self) {
        self.keyed = false;
        self.key_on_delay = 0;
        self.envelope.release();
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed
    }

    pub fn envelope_stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    pub fn envelope_level(&self) -> i32 {
        self.envelope.level()
    }

    fn start(&mut self, start_address: u16) {
        log::debug!("Voice keyed on at ${start_address:04X}");

        self.keyed = true;
        self.decoder.restart(start_address);
        self.envelope.key_on();
        // Forces 3 samples to decode on the first step
        self.fraction = 0x3FFF;
        self.history.clear();
    }

    /// Advance the voice by one sample.
    pub fn step(&mut self, ram: &AudioRam, input: &VoiceInput) -> VoiceOutput {
        let mut output = VoiceOutput::default();
        let registers = &input.registers;

        if self.key_on_delay != 0 {
            self.key_on_delay -= 1;
            if self.key_on_delay == 0 {
                let entry =
                    SourceEntry::read(ram, input.directory_address, registers.source_number);
                self.start(entry.start);
            }
        }

        if input.key_on && !input.key_off {
            output.key_on_latched = true;
            self.key_on_delay = KEY_ON_DELAY;
        }

        if self.keyed && input.key_off {
            log::debug!("Voice keyed off");
            self.envelope.release();
            self.key_on_delay = 0;
        }

        if !self.keyed {
            return output;
        }

        let Some(level) = self.envelope.clock(registers.adsr_1, registers.adsr_2, registers.gain)
        else {
            self.keyed = false;
            return output;
        };
        output.envx = self.envelope.envx();

        let entry = SourceEntry::read(ram, input.directory_address, registers.source_number);
        let decoded =
            self.decoder.decode(ram, entry.loop_address, self.fraction >> 12, &mut self.history);
        output.end_flag_seen = decoded.end_flag_seen;
        if decoded.voice_ended {
            log::debug!("Sample ended at ${:04X}", self.decoder.address());
            self.keyed = false;
            self.envelope.silence();
            output.envx = 0;
        }

        let mut rate = i32::from(registers.pitch);
        if input.pitch_modulation {
            rate = (rate * (input.previous_output + 32768)) >> 15;
        }

        let interpolated = gaussian::interpolate(self.fraction, &self.history);
        // At most $FFF + $7FFE
        self.fraction = (self.fraction & 0x0FFF) + rate as u16;

        let sample = if input.noise { input.noise_output } else { interpolated };

        // The level from before a mid-sample end still applies to this sample
        output.sample = ((i32::from(sample) * level) >> 11) & !1;
        output.outx = (output.sample >> 8) as u8;

        output
    }
}
