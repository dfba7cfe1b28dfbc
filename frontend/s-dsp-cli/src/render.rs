//! Sets up the chip and audio RAM from a render config, then drives it sample by sample

use anyhow::{Context, anyhow};
use s_dsp_config::{RamImageFormat, RegisterEvent, RenderConfig, SampleConfig};
use s_dsp_core::registers::{NUM_REGISTERS, global};
use s_dsp_core::{
    AUDIO_RAM_LEN, AudioRam, BRR_BLOCK_LEN, BrrHeader, SAMPLE_RATE, SDsp, SourceEntry,
    new_audio_ram,
};
use std::fs;
use std::path::Path;

const SPC_SIGNATURE: &[u8] = b"SNES-SPC700 Sound File Data";
const SPC_RAM_OFFSET: usize = 0x100;
const SPC_DSP_REGISTERS_OFFSET: usize = SPC_RAM_OFFSET + AUDIO_RAM_LEN;

#[derive(Debug)]
pub struct RamImage {
    pub ram: Box<AudioRam>,
    /// DSP register snapshot, only present in SPC files
    pub dsp_registers: Option<[u8; NUM_REGISTERS]>,
}

impl RamImage {
    pub fn parse(bytes: &[u8], format: RamImageFormat) -> anyhow::Result<Self> {
        match format {
            RamImageFormat::Raw => {
                if bytes.len() != AUDIO_RAM_LEN {
                    return Err(anyhow!(
                        "Raw RAM image must be exactly {AUDIO_RAM_LEN} bytes, was {}",
                        bytes.len()
                    ));
                }

                let mut ram = new_audio_ram();
                ram.copy_from_slice(bytes);
                Ok(Self { ram, dsp_registers: None })
            }
            RamImageFormat::Spc => {
                let spc_len = SPC_DSP_REGISTERS_OFFSET + NUM_REGISTERS;
                if bytes.len() < spc_len {
                    return Err(anyhow!(
                        "SPC file must be at least {spc_len} bytes, was {}",
                        bytes.len()
                    ));
                }

                if !bytes.starts_with(SPC_SIGNATURE) {
                    log::warn!("SPC file signature not found; loading anyway");
                }

                let mut ram = new_audio_ram();
                ram.copy_from_slice(&bytes[SPC_RAM_OFFSET..SPC_DSP_REGISTERS_OFFSET]);

                let mut dsp_registers = [0; NUM_REGISTERS];
                dsp_registers.copy_from_slice(&bytes[SPC_DSP_REGISTERS_OFFSET..spc_len]);

                Ok(Self { ram, dsp_registers: Some(dsp_registers) })
            }
        }
    }

    fn load(path: &Path, format: RamImageFormat) -> anyhow::Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read RAM image from '{}'", path.display()))?;
        Self::parse(&bytes, format)
            .with_context(|| format!("Invalid RAM image '{}'", path.display()))
    }
}

/// Restore a register snapshot. KON is written last so every voice it starts sees its other
/// registers already in place.
fn restore_registers(dsp: &mut SDsp, registers: &[u8; NUM_REGISTERS]) -> anyhow::Result<()> {
    for (address, &value) in (0..).zip(registers) {
        if address != global::KEY_ON {
            dsp.write(address, value)?;
        }
    }
    dsp.write(global::KEY_ON, registers[usize::from(global::KEY_ON)])?;

    Ok(())
}

/// Copy a BRR sample into RAM and point its directory entry at it
pub fn place_sample(
    ram: &mut AudioRam,
    directory_address: u16,
    sample: &SampleConfig,
    data: &[u8],
) -> anyhow::Result<()> {
    let start = usize::from(sample.load_address);
    let end = start + data.len();
    if end > AUDIO_RAM_LEN {
        return Err(anyhow!(
            "Sample '{}' ({} bytes at ${start:04X}) runs past the end of audio RAM",
            sample.path.display(),
            data.len()
        ));
    }

    if !data.len().is_multiple_of(usize::from(BRR_BLOCK_LEN)) {
        log::warn!(
            "Sample '{}' length {} is not a whole number of BRR blocks",
            sample.path.display(),
            data.len()
        );
    }
    if !u16::try_from(data.len()).is_ok_and(|len| sample.loop_offset < len) {
        log::warn!(
            "Sample '{}' loop offset {} is outside the sample",
            sample.path.display(),
            sample.loop_offset
        );
    }
    let last_block = data.len().saturating_sub(usize::from(BRR_BLOCK_LEN));
    if !data.get(last_block).is_some_and(|&header| BrrHeader(header).end_flag()) {
        log::warn!("Sample '{}' does not end with an end block", sample.path.display());
    }

    ram[start..end].copy_from_slice(data);

    let entry = SourceEntry {
        start: sample.load_address,
        loop_address: sample.load_address.wrapping_add(sample.loop_offset),
    };
    entry.write(ram, directory_address, sample.directory_index);

    log::debug!(
        "Loaded sample '{}' at ${:04X} (loop ${:04X}) as source {}",
        sample.path.display(),
        entry.start,
        entry.loop_address,
        sample.directory_index
    );

    Ok(())
}

/// Leading frames that are silent in both channels are removed
#[must_use]
pub fn trim_leading_silence(frames: &[[i16; 2]]) -> &[[i16; 2]] {
    let first_sound = frames.iter().position(|&frame| frame != [0, 0]).unwrap_or(frames.len());
    &frames[first_sound..]
}

pub struct Renderer {
    dsp: SDsp,
    ram: Box<AudioRam>,
    events: Vec<RegisterEvent>,
    next_event: usize,
    position: u32,
}

impl Renderer {
    /// `events` must already be in application order.
    pub fn new(dsp: SDsp, ram: Box<AudioRam>, events: Vec<RegisterEvent>) -> Self {
        Self { dsp, ram, events, next_event: 0, position: 0 }
    }

    /// Load the RAM image, apply register snapshots and initial writes, then place samples in the
    /// source directory that DIR points to after those writes.
    pub fn from_config(config: &RenderConfig) -> anyhow::Result<Self> {
        let mut dsp = SDsp::new();
        dsp.disable_surround(config.surround.surround_disabled());

        let image = match (&config.ram_image, config.effective_ram_image_format()) {
            (Some(path), Some(format)) => {
                log::info!("Loading {format:?} RAM image from '{}'", path.display());
                RamImage::load(path, format)?
            }
            _ => RamImage { ram: new_audio_ram(), dsp_registers: None },
        };
        let mut ram = image.ram;

        if let Some(registers) = &image.dsp_registers {
            restore_registers(&mut dsp, registers)?;
        }

        for write in &config.registers {
            dsp.write(write.address, write.value)?;
        }

        let directory_address = dsp.registers().source_directory_address();
        for sample in &config.samples {
            let data = fs::read(&sample.path).with_context(|| {
                format!("Failed to read sample from '{}'", sample.path.display())
            })?;
            place_sample(&mut ram, directory_address, sample, &data)?;
        }

        Ok(Self::new(dsp, ram, config.sorted_events()))
    }

    #[cfg(test)]
    pub fn dsp(&self) -> &SDsp {
        &self.dsp
    }

    fn apply_due_events(&mut self) -> anyhow::Result<()> {
        while let Some(event) = self.events.get(self.next_event) {
            if event.at > self.position {
                break;
            }

            log::trace!(
                "Sample {}: writing ${:02X} to register ${:02X}",
                self.position,
                event.value,
                event.address
            );
            self.dsp.write(event.address, event.value).with_context(|| {
                format!("Register event at sample {} failed", event.at)
            })?;
            self.next_event += 1;
        }

        Ok(())
    }

    /// Render `samples` stereo frames, applying each event just before its sample.
    pub fn render(&mut self, samples: u32) -> anyhow::Result<Vec<[i16; 2]>> {
        let mut frames = Vec::with_capacity(samples as usize);
        for _ in 0..samples {
            self.apply_due_events()?;

            let mut frame = [0; 2];
            self.dsp.run(&mut self.ram, Some(&mut frame));
            frames.push(frame);
            self.position += 1;
        }

        let skipped = self.events.len() - self.next_event;
        if skipped != 0 {
            log::warn!("{skipped} register events are scheduled after sample {}", self.position);
        }

        Ok(frames)
    }
}

pub fn write_wav(path: &Path, frames: &[[i16; 2]]) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file '{}'", path.display()))?;
    for &[left, right] in frames {
        writer.write_sample(left)?;
        writer.write_sample(right)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;

    Ok(())
}
