//! BRR sample decoding
//!
//! A BRR block is 9 bytes: a header byte followed by 16 packed 4-bit deltas, high nibble first.

use crate::AudioRam;
use bincode::{Decode, Encode};
use s_dsp_common::num::{ClampI16, GetBit, read_u16_le, write_u16_le};

pub const BRR_BLOCK_LEN: u16 = 9;
const NIBBLES_PER_BLOCK: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct BrrHeader(pub u8);

impl BrrHeader {
    #[must_use]
    pub fn shift(self) -> u8 {
        self.0 >> 4
    }

    /// Prediction filter, 0-3
    #[must_use]
    pub fn filter(self) -> u8 {
        self.0.bits(2..=3)
    }

    #[must_use]
    pub fn loop_flag(self) -> bool {
        self.0.bit(1)
    }

    #[must_use]
    pub fn end_flag(self) -> bool {
        self.0.bit(0)
    }
}

/// Source directory entry: a sample's start address and the address playback jumps to when a
/// block with both end and loop flags finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEntry {
    pub start: u16,
    pub loop_address: u16,
}

impl SourceEntry {
    pub const LEN: u16 = 4;

    fn entry_address(directory_address: u16, source_number: u8) -> u16 {
        directory_address.wrapping_add(u16::from(source_number) * Self::LEN)
    }

    #[must_use]
    pub fn read(ram: &AudioRam, directory_address: u16, source_number: u8) -> Self {
        let entry_address = Self::entry_address(directory_address, source_number);
        Self {
            start: read_u16_le(ram, entry_address.into()),
            loop_address: read_u16_le(ram, entry_address.wrapping_add(2).into()),
        }
    }

    pub fn write(self, ram: &mut AudioRam, directory_address: u16, source_number: u8) {
        let entry_address = Self::entry_address(directory_address, source_number);
        write_u16_le(ram, entry_address.into(), self.start);
        write_u16_le(ram, entry_address.wrapping_add(2).into(), self.loop_address);
    }
}

/// The 4 most recently decoded samples, newest first. Values are stored doubled, as the
/// interpolator expects.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct SampleHistory([i16; 4]);

impl SampleHistory {
    pub fn push(&mut self, sample: i16) {
        self.0.copy_within(0..3, 1);
        self.0[0] = sample;
    }

    pub fn clear(&mut self) {
        self.0 = [0; 4];
    }

    /// `n` samples back from the newest
    pub fn get(&self, n: usize) -> i32 {
        self.0[n].into()
    }
}

/// Decode one 4-bit delta (already sign-extended to -8..=7) against the two previous samples.
///
/// `older` and `old` are the doubled samples from [`SampleHistory`]; the result is doubled the same
/// way, wrapping to 16 bits.
#[must_use]
pub fn decode_sample(nibble: i8, header: BrrHeader, old: i32, older: i32) -> i16 {
    let shift = header.shift();
    let mut delta = (i32::from(nibble) << shift) >> 1;
    if shift > 12 {
        // Invalid shifts: 0 for non-negative nibbles, -2048 for negative
        delta = (delta >> 14) & !0x7FF;
    }

    predict(delta, header.filter(), old, older)
}

/// Apply prediction filter `filter` (0-3) to `delta`, returning the doubled result.
pub(crate) fn predict(mut delta: i32, filter: u8, old: i32, older: i32) -> i16 {
    match filter & 0x03 {
        0 => {}
        1 => {
            delta += old >> 1;
            delta += (-old) >> 5;
        }
        2 => {
            delta += old;
            delta -= older >> 1;
            delta += (-old - (old >> 1)) >> 5;
            delta += older >> 5;
        }
        _ => {
            delta += old;
            delta -= older >> 1;
            delta += (-old * 13) >> 7;
            delta += (older + (older >> 1)) >> 4;
        }
    }

    (2 * i32::from(delta.clamp_i16())) as i16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct DecodeOutcome {
    /// A block with the end flag finished (sets the voice's ENDX bit)
    pub end_flag_seen: bool,
    /// The sample ended without looping; the voice must be keyed off
    pub voice_ended: bool,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct BrrDecoder {
    address: u16,
    block_remaining: u8,
    header: BrrHeader,
}

impl BrrDecoder {
    pub fn restart(&mut self, start_address: u16) {
        self.address = start_address;
        // The first decode step reads the header at the start address
        self.block_remaining = 1;
        self.header = BrrHeader(0);
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    /// Decode `count` samples into `history`.
    ///
    /// When the sample ends, the rest of the `count` slots are filled with silence.
    pub fn decode(
        &mut self,
        ram: &AudioRam,
        loop_address: u16,
        count: u16,
        history: &mut SampleHistory,
    ) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();

        for remaining in (0..count).rev() {
            self.block_remaining -= 1;
            if self.block_remaining == 0 {
                if self.header.end_flag() {
                    outcome.end_flag_seen = true;
                    if !self.header.loop_flag() {
                        return end_sample(outcome, remaining, history);
                    }
                    self.address = loop_address;
                }

                self.header = BrrHeader(ram[self.address as usize]);
                self.address = self.address.wrapping_add(1);
                self.block_remaining = NIBBLES_PER_BLOCK;
            }

            // Halfway through the block, peek at the next header: an end block without the loop
            // flag cuts this block short unless this block is itself end+loop
            if self.block_remaining == 9
                && ram[self.address.wrapping_add(5) as usize] & 0x03 == 0x01
                && self.header.0 & 0x03 != 0x03
            {
                outcome.end_flag_seen = true;
                return end_sample(outcome, remaining, history);
            }

            let byte = ram[self.address as usize];
            let nibble = if self.block_remaining.bit(0) {
                self.address = self.address.wrapping_add(1);
                ((byte << 4) as i8) >> 4
            } else {
                (byte as i8) >> 4
            };

            let sample = decode_sample(nibble, self.header, history.get(0), history.get(1));
            history.push(sample);
        }

        outcome
    }
}

fn end_sample(
    mut outcome: DecodeOutcome,
    remaining: u16,
    history: &mut SampleHistory,
) -> DecodeOutcome {
    for _ in 0..=remaining {
        history.push(0);
    }

    outcome.voice_ended = true;
    outcome
}
