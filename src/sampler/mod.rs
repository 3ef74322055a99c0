mod sobol;
mod uniform;

pub use sobol::*;
pub use uniform::*;

/// Stream of canonical uniform variates addressed by (pixel, sample index).
///
/// `setup` positions the stream; for a fixed (pixel_index, sample_index) the
/// sequence of `next_1d`/`next_2d` calls afterwards is reproducible across
/// runs and thread counts. The uniform variant only honors its per-tile seed
/// and treats `setup` as a no-op.
#[enum_dispatch::enum_dispatch(Sampler)]
pub trait SamplerT {
    fn setup(&mut self, pixel_index: u32, sample_index: u32);

    fn next_1d(&mut self) -> f32;

    fn next_2d(&mut self) -> glam::Vec2;
}

#[enum_dispatch::enum_dispatch]
pub enum Sampler {
    UniformSampler,
    SobolSampler,
}

/// Wang's 32-bit integer mix; used wherever a cheap decorrelating hash of an
/// index is needed (tile seeds, per-pixel scrambles).
pub fn hash32(mut x: u32) -> u32 {
    x = (x ^ 61) ^ (x >> 16);
    x = x.wrapping_mul(9);
    x ^= x >> 4;
    x = x.wrapping_mul(0x27d4_eb2d);
    x ^= x >> 15;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_differs_on_adjacent_inputs() {
        assert_ne!(hash32(0), hash32(1));
        assert_ne!(hash32(1), hash32(2));
    }

    #[test]
    fn test_outputs_in_unit_interval() {
        let mut samplers = [
            Sampler::from(UniformSampler::new(7)),
            Sampler::from(SobolSampler::new()),
        ];
        for sampler in &mut samplers {
            sampler.setup(123, 45);
            for _ in 0..256 {
                let a = sampler.next_1d();
                assert!((0.0..1.0).contains(&a));
                let b = sampler.next_2d();
                assert!((0.0..1.0).contains(&b.x));
                assert!((0.0..1.0).contains(&b.y));
            }
        }
    }
}
