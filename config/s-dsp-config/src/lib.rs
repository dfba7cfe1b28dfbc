//! Render configuration: which RAM image and samples to load, and which register writes to apply
//! when

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

/// One second at the chip's output rate
pub const DEFAULT_DURATION_SAMPLES: u32 = 32000;

/// DSP register addresses are 7-bit
const REGISTER_ADDRESS_LIMIT: u8 = 0x80;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error reading render config from '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Error parsing render config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{context}: register address ${address:02X} is out of range (must be < $80)")]
    InvalidRegister { context: &'static str, address: u8 },
    #[error("Samples '{first}' and '{second}' both use directory index {index}")]
    DuplicateDirectoryIndex { index: u8, first: String, second: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SurroundMode {
    /// Opposite-sign left/right volumes play as-is, producing the chip's phase-inverted surround
    #[default]
    Keep,
    /// Negative volumes are inverted whenever left and right volumes have opposite signs
    Disable,
}

impl SurroundMode {
    #[must_use]
    pub fn surround_disabled(self) -> bool {
        self == Self::Disable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum RamImageFormat {
    /// Exactly 64KB of audio RAM
    Raw,
    /// SPC snapshot: audio RAM at $100 and DSP registers at $10100
    Spc,
}

impl RamImageFormat {
    /// Guess the format from a file extension, defaulting to raw
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("spc") => Self::Spc,
            _ => Self::Raw,
        }
    }
}

/// A BRR sample file to copy into audio RAM, with its source directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    pub path: PathBuf,
    pub load_address: u16,
    pub directory_index: u8,
    /// Loop point in bytes from `load_address`; should be a multiple of 9
    #[serde(default)]
    pub loop_offset: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    pub address: u8,
    pub value: u8,
}

/// A register write applied just before the chip produces sample `at`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEvent {
    pub at: u32,
    pub address: u8,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_duration_samples")]
    pub duration_samples: u32,
    #[serde(default)]
    pub ram_image: Option<PathBuf>,
    #[serde(default)]
    pub ram_image_format: Option<RamImageFormat>,
    #[serde(default)]
    pub surround: SurroundMode,
    /// Drop output frames before the first non-silent one
    #[serde(default)]
    pub mute_leading_silence: bool,
    #[serde(default)]
    pub samples: Vec<SampleConfig>,
    /// Written in order before the first sample, after the RAM image is loaded
    #[serde(default)]
    pub registers: Vec<RegisterWrite>,
    #[serde(default)]
    pub events: Vec<RegisterEvent>,
}

fn default_duration_samples() -> u32 {
    DEFAULT_DURATION_SAMPLES
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            duration_samples: DEFAULT_DURATION_SAMPLES,
            ram_image: None,
            ram_image_format: None,
            surround: SurroundMode::default(),
            mute_leading_silence: false,
            samples: vec![],
            registers: vec![],
            events: vec![],
        }
    }
}

impl RenderConfig {
    /// Parse and validate a TOML render config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or if the config fails [`RenderConfig::validate`].
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML render config file.
    ///
    /// Relative sample and RAM image paths are resolved against the config file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if [`RenderConfig::from_toml_str`] fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;

        let mut config = Self::from_toml_str(&config_str)?;
        if let Some(base_dir) = path.parent() {
            config.resolve_paths(base_dir);
        }

        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };

        if let Some(ram_image) = &mut self.ram_image {
            resolve(ram_image);
        }
        for sample in &mut self.samples {
            resolve(&mut sample.path);
        }
    }

    /// Check register addresses and directory indices.
    ///
    /// # Errors
    ///
    /// Returns an error for any register address of `$80` or above, or if two samples share a
    /// directory index.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for write in &self.registers {
            check_address("Initial register write", write.address)?;
        }
        for event in &self.events {
            check_address("Register event", event.address)?;
        }

        let mut seen: HashSet<u8> = HashSet::new();
        for (i, sample) in self.samples.iter().enumerate() {
            if !seen.insert(sample.directory_index) {
                let first = self.samples[..i]
                    .iter()
                    .find(|other| other.directory_index == sample.directory_index)
                    .map(|other| other.path.display().to_string())
                    .unwrap_or_default();
                return Err(ConfigError::DuplicateDirectoryIndex {
                    index: sample.directory_index,
                    first,
                    second: sample.path.display().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Events in the order they should be applied: by sample, then by position in the file
    #[must_use]
    pub fn sorted_events(&self) -> Vec<RegisterEvent> {
        let mut events = self.events.clone();
        events.sort_by_key(|event| event.at);
        events
    }

    /// RAM image format, falling back to a guess from the image's file extension
    #[must_use]
    pub fn effective_ram_image_format(&self) -> Option<RamImageFormat> {
        self.ram_image_format.or_else(|| self.ram_image.as_deref().map(RamImageFormat::from_path))
    }
}

fn check_address(context: &'static str, address: u8) -> Result<(), ConfigError> {
    if address >= REGISTER_ADDRESS_LIMIT {
        return Err(ConfigError::InvalidRegister { context, address });
    }
    Ok(())
}
