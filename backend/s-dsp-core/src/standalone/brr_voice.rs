use crate::brr::{BrrDecoder, SampleHistory, SourceEntry};
use crate::envelope::{ENVELOPE_RANGE, RELEASE_STEP};
use crate::voice::KEY_ON_DELAY;
use crate::{AudioRam, gaussian, pitch_from_frequency};
use bincode::{Decode, Encode};
use s_dsp_common::num::ClampI16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
enum GateStage {
    #[default]
    Off,
    On,
    Release,
}

/// A single chip voice playing BRR samples from a RAM bank, driven by trigger and gate inputs.
///
/// There is no ADSR: the level jumps to full when the voice starts and falls by 1/256 of full
/// scale per sample once the gate drops. The RAM is borrowed on each [`BrrVoice::run`] call.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct BrrVoice {
    directory_page: u8,
    source_number: u8,
    pitch: u16,
    volume: [i8; 2],
    key_on_delay: u8,
    stage: GateStage,
    level: i32,
    decoder: BrrDecoder,
    history: SampleHistory,
    fraction: u16,
}

impl BrrVoice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop playback and cancel a pending trigger. Settings are kept.
    pub fn reset(&mut self) {
        self.key_on_delay = 0;
        self.stage = GateStage::Off;
        self.level = 0;
        self.history.clear();
    }

    /// Page of the source directory, as written to DIR
    pub fn set_directory_page(&mut self, page: u8) {
        self.directory_page = page;
    }

    /// Directory entry read when the voice starts
    pub fn set_source_number(&mut self, source_number: u8) {
        self.source_number = source_number;
    }

    /// 14-bit pitch, $1000 plays samples at 32 kHz
    pub fn set_pitch(&mut self, pitch: u16) {
        self.pitch = pitch & 0x3FFF;
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.pitch = pitch_from_frequency(frequency);
    }

    pub fn set_volume_left(&mut self, volume: i8) {
        self.volume[0] = volume;
    }

    pub fn set_volume_right(&mut self, volume: i8) {
        self.volume[1] = volume;
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.stage != GateStage::Off
    }

    fn start(&mut self, ram: &AudioRam) {
        let directory_address = u16::from(self.directory_page) << 8;
        let entry = SourceEntry::read(ram, directory_address, self.source_number);
        log::trace!("BRR voice started at ${:04X}", entry.start);

        self.decoder.restart(entry.start);
        self.history.clear();
        self.fraction = 0x3FFF;
        self.stage = GateStage::On;
        self.level = 0;
    }

    // Returns the level to apply this sample, or None once the voice is silent
    fn clock_level(&mut self) -> Option<i32> {
        match self.stage {
            GateStage::Off => None,
            GateStage::On => {
                self.level = ENVELOPE_RANGE;
                Some(self.level)
            }
            GateStage::Release => {
                self.level -= RELEASE_STEP;
                if self.level <= 0 {
                    self.stage = GateStage::Off;
                    self.level = 0;
                    return None;
                }
                Some(self.level)
            }
        }
    }

    /// Advance one 32 kHz sample and return the panned stereo output.
    ///
    /// A trigger starts the voice 8 samples later unless the gate is low, which cancels the
    /// trigger and releases a playing voice. `phase_modulation` scales the pitch by
    /// `(phase_modulation + 32768) / 32768`, so 0 leaves it unchanged.
    pub fn run(
        &mut self,
        ram: &AudioRam,
        trigger: bool,
        gate: bool,
        phase_modulation: i16,
    ) -> [i16; 2] {
        if self.key_on_delay != 0 {
            self.key_on_delay -= 1;
            if self.key_on_delay == 0 {
                self.start(ram);
            }
        }

        if trigger {
            self.key_on_delay = KEY_ON_DELAY;
        }
        if !gate {
            if self.stage == GateStage::On {
                log::trace!("BRR voice gate released");
                self.stage = GateStage::Release;
            }
            self.key_on_delay = 0;
        }

        let Some(level) = self.clock_level() else {
            return [0; 2];
        };

        let directory_address = u16::from(self.directory_page) << 8;
        let entry = SourceEntry::read(ram, directory_address, self.source_number);
        let decoded =
            self.decoder.decode(ram, entry.loop_address, self.fraction >> 12, &mut self.history);
        if decoded.voice_ended {
            log::trace!("BRR voice sample ended at ${:04X}", self.decoder.address());
            self.stage = GateStage::Off;
            self.level = 0;
        }

        let rate = (i32::from(self.pitch) * (i32::from(phase_modulation) + 32768)) >> 15;
        let interpolated = gaussian::interpolate(self.fraction, &self.history);
        self.fraction = (self.fraction & 0x0FFF) + rate as u16;

        let output = ((i32::from(interpolated) * level) >> 11) & !1;
        self.volume.map(|volume| ((i32::from(volume) * output) >> 7).clamp_i16())
    }
}
