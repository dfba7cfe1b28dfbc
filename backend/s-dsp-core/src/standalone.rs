//! S-DSP building blocks that run outside the chip, driven directly by the host

mod adsr;
mod brr_voice;
mod echo;
mod gaussian;

pub use adsr::AdsrUnit;
pub use brr_voice::BrrVoice;
pub use echo::EchoUnit;
pub use gaussian::GaussianFilter;
