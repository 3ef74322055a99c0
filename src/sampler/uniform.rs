use rand::{Rng, SeedableRng};

use super::SamplerT;

/// Plain pseudo-random stream. Seeded once per tile; reproducible for a fixed
/// tile decomposition but not addressable per pixel.
pub struct UniformSampler {
    rng: rand::rngs::SmallRng,
}

impl UniformSampler {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: rand::rngs::SmallRng::seed_from_u64(u64::from(seed)),
        }
    }

    /// Raw integer draw, used by the driver to derive per-tile seeds.
    pub fn next_seed(&mut self) -> u32 {
        self.rng.gen()
    }
}

impl SamplerT for UniformSampler {
    fn setup(&mut self, _pixel_index: u32, _sample_index: u32) {}

    fn next_1d(&mut self) -> f32 {
        self.rng.gen()
    }

    fn next_2d(&mut self) -> glam::Vec2 {
        glam::Vec2::new(self.rng.gen(), self.rng.gen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = UniformSampler::new(42);
        let mut b = UniformSampler::new(42);
        for _ in 0..64 {
            assert_eq!(a.next_1d().to_bits(), b.next_1d().to_bits());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = UniformSampler::new(1);
        let mut b = UniformSampler::new(2);
        let same = (0..16).filter(|_| a.next_1d() == b.next_1d()).count();
        assert!(same < 16);
    }
}
