use crate::brr::{self, SampleHistory};
use crate::{gaussian, pitch_from_frequency};
use bincode::{Decode, Encode};

/// Filter 2 of the BRR decoder
const DEFAULT_FILTER: u8 = 2;

/// The chip's BRR prediction filter and Gaussian interpolator applied to an external 16-bit signal.
///
/// Each input passes through the selected prediction filter into a 4-sample history, which is
/// then interpolated at the current position. Pitch only moves that position; one input is always
/// consumed per call.
#[derive(Debug, Clone, Encode, Decode)]
pub struct GaussianFilter {
    history: SampleHistory,
    fraction: u16,
    pitch: u16,
    filter: u8,
}

impl Default for GaussianFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianFilter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: SampleHistory::default(),
            fraction: 0x3FFF,
            pitch: 0,
            filter: DEFAULT_FILTER,
        }
    }

    /// Clear the sample history and interpolation position. Settings are kept.
    pub fn reset(&mut self) {
        self.history.clear();
        self.fraction = 0x3FFF;
    }

    /// Prediction filter, 0-3 as in a BRR header; 0 passes input straight through
    pub fn set_filter(&mut self, filter: u8) {
        self.filter = filter & 0x03;
    }

    /// 14-bit pitch added to the interpolation position each sample
    pub fn set_pitch(&mut self, pitch: u16) {
        self.pitch = pitch & 0x3FFF;
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.pitch = pitch_from_frequency(frequency);
    }

    pub fn run(&mut self, input: i16) -> i16 {
        let predicted = brr::predict(
            input.into(),
            self.filter,
            self.history.get(0),
            self.history.get(1),
        );
        self.history.push(predicted);

        let output = gaussian::interpolate(self.fraction, &self.history);
        self.fraction = (self.fraction & 0x0FFF) + self.pitch;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn unfiltered() -> GaussianFilter {
        let mut filter = GaussianFilter::new();
        filter.set_filter(0);
        filter
    }

    #[test]
    fn silence_stays_silent() {
        let mut filter = GaussianFilter::new();
        assert!((0..100).all(|_| filter.run(0) == 0));
    }

    #[test]
    fn step_settles_at_doubled_input() {
        let mut filter = unfiltered();
        let out: Vec<_> = (0..6).map(|_| filter.run(1000)).collect();
        assert_eq!(vec![360, 1634, 1998, 1998, 1998, 1998], out);
    }

    #[test]
    fn unfiltered_impulse_dies_out() {
        let mut filter = unfiltered();
        filter.run(1000);
        let tail: Vec<_> = (0..10).map(|_| filter.run(0)).collect();
        assert_ne!(0, tail[0]);
        assert!(tail[3..].iter().all(|&sample| sample == 0));
    }

    #[test]
    fn default_filter_feeds_back() {
        let mut filter = GaussianFilter::new();
        filter.run(1000);
        let tail: Vec<_> = (0..10).map(|_| filter.run(0)).collect();
        assert!(tail[3..].iter().any(|&sample| sample != 0));
    }

    #[test]
    fn reset_clears_history() {
        let mut filter = unfiltered();
        for _ in 0..4 {
            filter.run(1000);
        }

        filter.reset();
        assert_eq!(0, filter.run(0));
        assert_eq!(360, filter.run(1000));
    }

    #[test]
    fn pitch_settings() {
        let mut filter = GaussianFilter::new();
        filter.set_frequency(16000.0);
        assert_eq!(0x0800, filter.pitch);
        filter.set_pitch(0xFFFF);
        assert_eq!(0x3FFF, filter.pitch);
        filter.set_filter(7);
        assert_eq!(3, filter.filter);
    }
}
