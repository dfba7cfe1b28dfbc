mod render;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use s_dsp_config::{RamImageFormat, RenderConfig, SurroundMode};
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    /// Render config path (TOML)
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Output WAV path; audio is written as 16-bit stereo at 32000 Hz
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Override the config's duration, in 32 kHz samples
    #[arg(long)]
    duration_samples: Option<u32>,

    /// Override the config's RAM image path
    #[arg(long)]
    ram_image: Option<PathBuf>,

    /// RAM image format, will default based on file extension if not set
    #[arg(long)]
    ram_image_format: Option<RamImageFormat>,

    /// Override the config's surround handling
    #[arg(long)]
    surround: Option<SurroundMode>,

    /// Drop output before the first non-silent sample
    #[arg(long, default_value_t)]
    mute_leading_silence: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut RenderConfig) {
        if let Some(duration_samples) = self.duration_samples {
            config.duration_samples = duration_samples;
        }
        if let Some(ram_image) = &self.ram_image {
            config.ram_image = Some(ram_image.clone());
        }
        if let Some(ram_image_format) = self.ram_image_format {
            config.ram_image_format = Some(ram_image_format);
        }
        if let Some(surround) = self.surround {
            config.surround = surround;
        }
        config.mute_leading_silence |= self.mute_leading_silence;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = RenderConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from '{}'", args.config.display()))?;
    args.apply_overrides(&mut config);

    log::info!(
        "Rendering {} samples ({:.2}s) from '{}'",
        config.duration_samples,
        f64::from(config.duration_samples) / f64::from(s_dsp_core::SAMPLE_RATE),
        args.config.display()
    );

    let mut renderer = render::Renderer::from_config(&config)?;
    let frames = renderer.render(config.duration_samples)?;

    let frames = if config.mute_leading_silence {
        render::trim_leading_silence(&frames)
    } else {
        &frames[..]
    };

    render::write_wav(&args.output, frames)?;
    log::info!("Wrote {} frames to '{}'", frames.len(), args.output.display());

    Ok(())
}
