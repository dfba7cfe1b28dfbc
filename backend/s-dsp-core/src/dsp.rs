//! The S-DSP chip: register bank, 8 voices, noise, echo, and the per-sample mix


use crate::echo::EchoFilter;
use crate::envelope::EnvelopeStage;
use crate::mixer::{MixBus, Mixer};
use crate::noise::NoiseGenerator;
use crate::registers::{DspFlags, RegisterError, RegisterFile, global};
use crate::voice::{Voice, VoiceInput};
use crate::{AudioRam, VOICE_COUNT};
use bincode::{Decode, Encode};
use s_dsp_common::num::GetBit;
use std::array;

/// FLG value after a reset: soft reset held, output muted, echo writes disabled
const RESET_FLAGS: u8 = 0xE0;

#[derive(Debug, Clone, Encode, Decode)]
pub struct SDsp {
    registers: RegisterFile,
    voices: [Voice; VOICE_COUNT],
    noise: NoiseGenerator,
    echo: EchoFilter,
    mixer: Mixer,
}

impl Default for SDsp {
    fn default() -> Self {
        Self::new()
    }
}

impl SDsp {
    /// Create a chip with every register zeroed.
    ///
    /// Unlike [`SDsp::reset`], this leaves FLG clear, so the chip plays as soon as voices are
    /// keyed on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registers: RegisterFile::new(),
            voices: array::from_fn(|_| Voice::default()),
            noise: NoiseGenerator::new(),
            echo: EchoFilter::default(),
            mixer: Mixer::default(),
        }
    }

    /// Reset the chip the way the FLG soft reset bit does.
    ///
    /// Every voice goes silent, KON is cleared, and FLG is set to `$E0`, which keeps the chip
    /// muted and in reset until FLG is rewritten.
    pub fn reset(&mut self) {
        log::debug!("S-DSP reset");
        self.soft_reset();
    }

    fn soft_reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        self.noise = NoiseGenerator::new();
        self.echo.reset();

        self.registers.set_flags(RESET_FLAGS);
        self.registers.set_key_on(0);
    }

    /// Read a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::InvalidAddress`] if `address` is not in `$00-$7F`.
    pub fn read(&self, address: u8) -> Result<u8, RegisterError> {
        self.registers.read(address)
    }

    /// Write a register. KON and KOF writes take effect on the next [`SDsp::run`].
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::InvalidAddress`] if `address` is not in `$00-$7F`.
    pub fn write(&mut self, address: u8, value: u8) -> Result<(), RegisterError> {
        self.registers.write(address, value)?;

        match address {
            global::KEY_ON if value != 0 => log::debug!("KON write: {value:08b}"),
            global::KEY_OFF if value != 0 => log::debug!("KOF write: {value:08b}"),
            global::FLAGS => log::debug!("FLG write: {:?}", DspFlags::from_byte(value)),
            _ => {}
        }

        Ok(())
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Invert negative voice/main volumes whenever left and right have opposite signs.
    pub fn disable_surround(&mut self, disable: bool) {
        self.mixer.disable_surround(disable);
    }

    /// Whether a voice is currently playing.
    ///
    /// # Panics
    ///
    /// Panics if `voice` is 8 or more.
    #[must_use]
    pub fn is_voice_keyed(&self, voice: usize) -> bool {
        self.voices[voice].is_keyed()
    }

    /// # Panics
    ///
    /// Panics if `voice` is 8 or more.
    #[must_use]
    pub fn envelope_stage(&self, voice: usize) -> EnvelopeStage {
        self.voices[voice].envelope_stage()
    }

    /// Current 11-bit envelope level of a voice
    ///
    /// # Panics
    ///
    /// Panics if `voice` is 8 or more.
    #[must_use]
    pub fn envelope_level(&self, voice: usize) -> u16 {
        self.voices[voice].envelope_level() as u16
    }

    /// Advance the chip by one 32 kHz sample, optionally writing the stereo output.
    ///
    /// `ram` is only borrowed for this call; voices read samples and the source directory from
    /// it, and the echo buffer is read and written in place.
    pub fn run(&mut self, ram: &mut AudioRam, output: Option<&mut [i16; 2]>) {
        if self.registers.flags().soft_reset {
            self.soft_reset();
        }

        let mut key_on = self.registers.key_on();
        let mut endx = self.registers.endx() & !key_on;

        let flags = self.registers.flags();
        if self.registers.noise_enable() != 0 {
            self.noise.clock(flags.noise_period);
        }

        let key_off = self.registers.key_off();
        let pitch_modulation = self.registers.pitch_modulation();
        let noise_enable = self.registers.noise_enable();
        let echo_enable = self.registers.echo_enable();
        let directory_address = self.registers.source_directory_address();

        let mut bus = MixBus::default();
        let mut previous_output = 0;

        // Ascending order matters: pitch modulation reads the previous voice's output
        for (i, voice) in self.voices.iter_mut().enumerate() {
            let bit = i as u8;
            let voice_registers = self.registers.voice(i);

            let input = VoiceInput {
                registers: voice_registers,
                key_on: key_on.bit(bit),
                key_off: key_off.bit(bit),
                // Voice 0 modulates against silence
                pitch_modulation: pitch_modulation.bit(bit),
                noise: noise_enable.bit(bit),
                noise_output: self.noise.output(),
                previous_output,
                directory_address,
            };

            let voice_output = voice.step(ram, &input);
            if voice_output.key_on_latched {
                key_on &= !(1 << bit);
            }
            if voice_output.end_flag_seen {
                endx |= 1 << bit;
            }

            self.registers.set_envelope_out(i, voice_output.envx);
            self.registers.set_waveform_out(i, voice_output.outx);
            previous_output = voice_output.sample;

            let volume =
                self.mixer.voice_volume(voice_registers.volume_left, voice_registers.volume_right);
            bus.add_voice(voice_output.sample, volume, echo_enable.bit(bit));
        }

        self.registers.set_key_on(key_on);
        self.registers.set_endx(endx);

        let (main_volume_l, main_volume_r) = self.registers.main_volume();
        let main_volume = self.mixer.main_volume(main_volume_l, main_volume_r);
        let echo_out = self.echo.process(ram, &self.registers, bus.echo());

        let sample = if flags.mute { [0, 0] } else { bus.finish(main_volume, echo_out) };
        if let Some(output) = output {
            *output = sample;
        }
    }

    /// Run one sample per slot in `out`.
    pub fn run_many(&mut self, ram: &mut AudioRam, out: &mut [[i16; 2]]) {
        for frame in out {
            self.run(ram, Some(frame));
        }
    }
}
