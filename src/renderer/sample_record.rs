use crate::core::color::Color;

/// Running statistics for one variance cell: Welford mean and second moment
/// of the luminance of every radiance estimate landing in the cell, plus the
/// progressive-sampling bookkeeping the driver needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleRecord {
    /// Samples taken so far, advanced by the driver at each pass.
    pub sample_index: u32,
    /// Samples scheduled for the upcoming pass.
    pub next_sample_count: u32,
    /// Samples accumulated into the statistics.
    pub sample_count: u32,
    pub mean: f32,
    pub m2: f32,
    /// Scratch for adaptive distribution; clamped and dilated in place.
    pub adaptive_weight: f32,
}

impl SampleRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, c: Color) {
        let l = c.luminance();
        self.sample_count += 1;
        let delta = l - self.mean;
        self.mean += delta / self.sample_count as f32;
        self.m2 += delta * (l - self.mean);
    }

    pub fn variance(&self) -> f32 {
        if self.sample_count < 2 {
            0.0
        } else {
            self.m2 / (self.sample_count - 1) as f32
        }
    }

    /// Relative standard error of the cell mean. Monotone in variance,
    /// decreasing in the sample count.
    pub fn error_estimate(&self) -> f32 {
        if self.sample_count < 2 {
            return 0.0;
        }
        (self.variance() / self.sample_count as f32).sqrt() / self.mean.max(1e-4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welford_matches_direct_formulas() {
        let samples = [0.5f32, 1.5, 0.25, 2.0, 0.75, 1.0];
        let mut record = SampleRecord::new();
        for &s in &samples {
            record.add_sample(Color::gray(s));
        }

        let lum: Vec<f32> = samples.iter().map(|&s| Color::gray(s).luminance()).collect();
        let mean = lum.iter().sum::<f32>() / lum.len() as f32;
        let var =
            lum.iter().map(|l| (l - mean) * (l - mean)).sum::<f32>() / (lum.len() - 1) as f32;

        assert!((record.mean - mean).abs() < 1e-5);
        assert!((record.variance() - var).abs() < 1e-5);
    }

    #[test]
    fn test_error_decreases_with_more_samples() {
        let mut record = SampleRecord::new();
        // Alternating bright and dark samples keep the variance positive.
        for i in 0..8 {
            record.add_sample(Color::gray(if i % 2 == 0 { 0.0 } else { 1.0 }));
        }
        let early = record.error_estimate();
        for i in 0..64 {
            record.add_sample(Color::gray(if i % 2 == 0 { 0.0 } else { 1.0 }));
        }
        let late = record.error_estimate();
        assert!(late < early);
    }

    #[test]
    fn test_constant_samples_have_zero_error() {
        let mut record = SampleRecord::new();
        for _ in 0..16 {
            record.add_sample(Color::gray(0.5));
        }
        assert!(record.error_estimate() < 1e-6);
    }

    #[test]
    fn test_black_cell_converges_immediately() {
        let mut record = SampleRecord::new();
        for _ in 0..16 {
            record.add_sample(Color::BLACK);
        }
        assert_eq!(record.error_estimate(), 0.0);
    }
}
