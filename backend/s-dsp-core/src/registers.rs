//! S-DSP register bank
//!
//! The chip exposes 128 byte registers. The low nibble of an address selects a per-voice field
//! (`$x0`-`$x9`, `$xF`) or, for `$xC`/`$xD`, one of the global registers; the high nibble selects
//! the voice (or which global register).

use bincode::{Decode, Encode};
use s_dsp_common::num::{GetBit, U16Ext};
use thiserror::Error;

pub const NUM_REGISTERS: usize = 128;

/// Global register addresses
pub mod global {
    pub const MAIN_VOLUME_LEFT: u8 = 0x0C;
    pub const ECHO_FEEDBACK: u8 = 0x0D;
    pub const MAIN_VOLUME_RIGHT: u8 = 0x1C;
    pub const ECHO_VOLUME_LEFT: u8 = 0x2C;
    pub const PITCH_MODULATION: u8 = 0x2D;
    pub const ECHO_VOLUME_RIGHT: u8 = 0x3C;
    pub const NOISE_ENABLE: u8 = 0x3D;
    pub const KEY_ON: u8 = 0x4C;
    pub const ECHO_ENABLE: u8 = 0x4D;
    pub const KEY_OFF: u8 = 0x5C;
    pub const SOURCE_DIRECTORY: u8 = 0x5D;
    pub const FLAGS: u8 = 0x6C;
    pub const ECHO_BUFFER_START: u8 = 0x6D;
    pub const ENDX: u8 = 0x7C;
    pub const ECHO_DELAY: u8 = 0x7D;
}

/// Per-voice register offsets; OR with `voice << 4` (see [`voice::address`])
pub mod voice {
    pub const VOLUME_LEFT: u8 = 0x00;
    pub const VOLUME_RIGHT: u8 = 0x01;
    pub const PITCH_LOW: u8 = 0x02;
    pub const PITCH_HIGH: u8 = 0x03;
    pub const SOURCE_NUMBER: u8 = 0x04;
    pub const ADSR_1: u8 = 0x05;
    pub const ADSR_2: u8 = 0x06;
    pub const GAIN: u8 = 0x07;
    pub const ENVELOPE_OUT: u8 = 0x08;
    pub const WAVEFORM_OUT: u8 = 0x09;
    /// FIR coefficient N lives at `$NF`, alongside the voice N registers
    pub const FIR_COEFFICIENT: u8 = 0x0F;

    #[inline]
    #[must_use]
    pub const fn address(voice: usize, offset: u8) -> u8 {
        ((voice as u8) << 4) | offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("Invalid S-DSP register address ${address:02X}; valid addresses are $00-$7F")]
    InvalidAddress { address: u8 },
}

fn check_address(address: u8) -> Result<usize, RegisterError> {
    if usize::from(address) < NUM_REGISTERS {
        Ok(address.into())
    } else {
        Err(RegisterError::InvalidAddress { address })
    }
}

/// Decoded FLG register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DspFlags {
    pub noise_period: u8,
    pub echo_writes_disabled: bool,
    pub mute: bool,
    pub soft_reset: bool,
}

impl DspFlags {
    #[must_use]
    pub fn from_byte(value: u8) -> Self {
        Self {
            noise_period: value & 0x1F,
            echo_writes_disabled: value.bit(5),
            mute: value.bit(6),
            soft_reset: value.bit(7),
        }
    }
}

/// Snapshot of one voice's register group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceRegisters {
    pub volume_left: i8,
    pub volume_right: i8,
    /// 14-bit pitch; `$1000` plays the sample at 32 kHz
    pub pitch: u16,
    pub source_number: u8,
    pub adsr_1: u8,
    pub adsr_2: u8,
    pub gain: u8,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct RegisterFile {
    bytes: [u8; NUM_REGISTERS],
    // Sign-extended copies of the $xF registers
    fir_coefficients: [i16; 8],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: [0; NUM_REGISTERS], fir_coefficients: [0; 8] }
    }

    /// Read the last value written to a register, or the last value the chip stored there for
    /// ENVX/OUTX/ENDX.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::InvalidAddress`] if `address` is not in `$00-$7F`.
    pub fn read(&self, address: u8) -> Result<u8, RegisterError> {
        let idx = check_address(address)?;
        Ok(self.bytes[idx])
    }

    /// Write a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::InvalidAddress`] if `address` is not in `$00-$7F`; nothing is
    /// written in that case.
    pub fn write(&mut self, address: u8, value: u8) -> Result<(), RegisterError> {
        let idx = check_address(address)?;
        self.bytes[idx] = value;

        log::trace!("S-DSP register write: {address:02X} {value:02X}");

        if address & 0x0F == voice::FIR_COEFFICIENT {
            let coefficient_idx = (address >> 4) as usize;
            self.fir_coefficients[coefficient_idx] = (value as i8).into();
            log::trace!("  FIR coefficient {coefficient_idx}: {}", value as i8);
        }

        Ok(())
    }

    #[inline]
    fn byte(&self, address: u8) -> u8 {
        self.bytes[address as usize]
    }

    #[inline]
    fn signed(&self, address: u8) -> i8 {
        self.bytes[address as usize] as i8
    }

    #[must_use]
    pub fn voice(&self, voice_idx: usize) -> VoiceRegisters {
        let reg = |offset| self.byte(voice::address(voice_idx, offset));

        let mut pitch = 0_u16;
        pitch.set_lsb(reg(voice::PITCH_LOW));
        pitch.set_msb(reg(voice::PITCH_HIGH));

        VoiceRegisters {
            volume_left: reg(voice::VOLUME_LEFT) as i8,
            volume_right: reg(voice::VOLUME_RIGHT) as i8,
            pitch: pitch & 0x3FFF,
            source_number: reg(voice::SOURCE_NUMBER),
            adsr_1: reg(voice::ADSR_1),
            adsr_2: reg(voice::ADSR_2),
            gain: reg(voice::GAIN),
        }
    }

    #[must_use]
    pub fn main_volume(&self) -> (i8, i8) {
        (self.signed(global::MAIN_VOLUME_LEFT), self.signed(global::MAIN_VOLUME_RIGHT))
    }

    #[must_use]
    pub fn echo_volume(&self) -> (i8, i8) {
        (self.signed(global::ECHO_VOLUME_LEFT), self.signed(global::ECHO_VOLUME_RIGHT))
    }

    #[must_use]
    pub fn echo_feedback(&self) -> i8 {
        self.signed(global::ECHO_FEEDBACK)
    }

    #[must_use]
    pub fn pitch_modulation(&self) -> u8 {
        self.byte(global::PITCH_MODULATION)
    }

    #[must_use]
    pub fn noise_enable(&self) -> u8 {
        self.byte(global::NOISE_ENABLE)
    }

    #[must_use]
    pub fn echo_enable(&self) -> u8 {
        self.byte(global::ECHO_ENABLE)
    }

    #[must_use]
    pub fn key_on(&self) -> u8 {
        self.byte(global::KEY_ON)
    }

    #[must_use]
    pub fn key_off(&self) -> u8 {
        self.byte(global::KEY_OFF)
    }

    /// RAM address of the source directory (DIR is in 256-byte steps)
    #[must_use]
    pub fn source_directory_address(&self) -> u16 {
        u16::from_le_bytes([0x00, self.byte(global::SOURCE_DIRECTORY)])
    }

    /// RAM address of the echo ring buffer (ESA is in 256-byte steps)
    #[must_use]
    pub fn echo_buffer_address(&self) -> u16 {
        u16::from_le_bytes([0x00, self.byte(global::ECHO_BUFFER_START)])
    }

    #[must_use]
    pub fn echo_delay(&self) -> u8 {
        self.byte(global::ECHO_DELAY)
    }

    #[must_use]
    pub fn flags(&self) -> DspFlags {
        DspFlags::from_byte(self.byte(global::FLAGS))
    }

    #[must_use]
    pub fn endx(&self) -> u8 {
        self.byte(global::ENDX)
    }

    #[must_use]
    pub fn fir_coefficients(&self) -> &[i16; 8] {
        &self.fir_coefficients
    }

    // Chip-side updates; these bypass the address check because the addresses are fixed

    pub(crate) fn set_flags(&mut self, value: u8) {
        self.bytes[global::FLAGS as usize] = value;
    }

    pub(crate) fn set_key_on(&mut self, value: u8) {
        self.bytes[global::KEY_ON as usize] = value;
    }

    pub(crate) fn set_endx(&mut self, value: u8) {
        self.bytes[global::ENDX as usize] = value;
    }

    pub(crate) fn set_envelope_out(&mut self, voice_idx: usize, value: u8) {
        self.bytes[voice::address(voice_idx, voice::ENVELOPE_OUT) as usize] = value;
    }

    pub(crate) fn set_waveform_out(&mut self, voice_idx: usize, value: u8) {
        self.bytes[voice::address(voice_idx, voice::WAVEFORM_OUT) as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_address() {
        let mut registers = RegisterFile::new();
        for address in 0..0x80_u8 {
            let value = address.wrapping_mul(37) ^ 0x5A;
            registers.write(address, value).unwrap();
            assert_eq!(Ok(value), registers.read(address), "address {address:02X}");
        }
    }

    #[test]
    fn rejects_out_of_range_addresses() {
        let mut registers = RegisterFile::new();
        for address in 0x80..=0xFF_u8 {
            assert_eq!(Err(RegisterError::InvalidAddress { address }), registers.read(address));
            assert_eq!(
                Err(RegisterError::InvalidAddress { address }),
                registers.write(address, 0xFF)
            );
        }

        // Nothing adjacent was touched
        assert!((0..0x80).all(|address| registers.read(address) == Ok(0)));
    }

    #[test]
    fn fir_coefficients_are_sign_extended() {
        let mut registers = RegisterFile::new();
        registers.write(0x0F, 0x7F).unwrap();
        registers.write(0x3F, 0x80).unwrap();
        registers.write(0x7F, 0xFF).unwrap();

        assert_eq!(&[127, 0, 0, -128, 0, 0, 0, -1], registers.fir_coefficients());
    }

    #[test]
    fn voice_fields() {
        let mut registers = RegisterFile::new();
        registers.write(voice::address(3, voice::VOLUME_LEFT), 0x90).unwrap();
        registers.write(voice::address(3, voice::VOLUME_RIGHT), 0x40).unwrap();
        registers.write(voice::address(3, voice::PITCH_LOW), 0x34).unwrap();
        // Top 2 bits of the pitch are not part of the 14-bit value
        registers.write(voice::address(3, voice::PITCH_HIGH), 0xD2).unwrap();
        registers.write(voice::address(3, voice::SOURCE_NUMBER), 0x07).unwrap();

        let voice = registers.voice(3);
        assert_eq!(-112, voice.volume_left);
        assert_eq!(64, voice.volume_right);
        assert_eq!(0x1234, voice.pitch);
        assert_eq!(7, voice.source_number);

        // PITCHH still reads back the full byte
        assert_eq!(Ok(0xD2), registers.read(0x33));
    }

    #[test]
    fn flag_decoding() {
        let flags = DspFlags::from_byte(0xE0 | 0x1A);
        assert_eq!(0x1A, flags.noise_period);
        assert!(flags.echo_writes_disabled);
        assert!(flags.mute);
        assert!(flags.soft_reset);

        assert_eq!(
            DspFlags { noise_period: 0, echo_writes_disabled: false, mute: false, soft_reset: false },
            DspFlags::from_byte(0)
        );
    }

    #[test]
    fn page_registers() {
        let mut registers = RegisterFile::new();
        registers.write(global::SOURCE_DIRECTORY, 0x12).unwrap();
        registers.write(global::ECHO_BUFFER_START, 0xC0).unwrap();

        assert_eq!(0x1200, registers.source_directory_address());
        assert_eq!(0xC000, registers.echo_buffer_address());
    }
}
