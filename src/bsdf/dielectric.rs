use std::sync::Arc;

use crate::{
    core::color::Color,
    sampler::{Sampler, SamplerT},
    texture::{Texture, TextureT},
};

use super::{fresnel, BsdfLobes, BsdfT, SurfaceScatterEvent};

/// Smooth dielectric interface (glass). Both lobes are delta distributions;
/// when both are requested the branch is chosen with probability equal to the
/// Fresnel reflectance, which cancels out of the throughput.
#[derive(Debug)]
pub struct DielectricBsdf {
    albedo: Arc<Texture>,
    ior: f32,
}

impl DielectricBsdf {
    pub fn new(albedo: Arc<Texture>, ior: f32) -> Self {
        Self { albedo, ior }
    }
}

impl BsdfT for DielectricBsdf {
    fn lobes(&self) -> BsdfLobes {
        BsdfLobes::SPECULAR_REFLECTION | BsdfLobes::SPECULAR_TRANSMISSION
    }

    fn sample(&self, event: &mut SurfaceScatterEvent, sampler: &mut Sampler) -> bool {
        let sample_r = event.requested_lobe.test(BsdfLobes::SPECULAR_REFLECTION);
        let sample_t = event.requested_lobe.test(BsdfLobes::SPECULAR_TRANSMISSION);
        if !sample_r && !sample_t {
            return false;
        }

        let wi = event.wi;
        let eta = if wi.z < 0.0 { self.ior } else { 1.0 / self.ior };
        let (f, cos_theta_t) = fresnel::dielectric_reflectance_full(eta, wi.z.abs());

        let reflect = if sample_r && sample_t {
            sampler.next_1d() < f
        } else if sample_r {
            true
        } else {
            // Transmission-only request under total internal reflection
            // cannot be satisfied.
            if f >= 1.0 {
                return false;
            }
            false
        };

        event.pdf = 0.0;
        let albedo = self.albedo.lookup(event.uv);
        if reflect {
            event.wo = glam::Vec3A::new(-wi.x, -wi.y, wi.z);
            event.sampled_lobe = BsdfLobes::SPECULAR_REFLECTION;
            event.throughput = if sample_t { albedo } else { albedo * f };
        } else {
            event.wo = glam::Vec3A::new(
                -wi.x * eta,
                -wi.y * eta,
                -cos_theta_t.copysign(wi.z),
            );
            event.sampled_lobe = BsdfLobes::SPECULAR_TRANSMISSION;
            event.throughput = if sample_r { albedo } else { albedo * (1.0 - f) };
        }
        true
    }

    fn eval(&self, _event: &SurfaceScatterEvent) -> Color {
        Color::BLACK
    }

    fn pdf(&self, _event: &SurfaceScatterEvent) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::ConstantTexture;

    fn glass() -> DielectricBsdf {
        DielectricBsdf::new(Arc::new(ConstantTexture::new(Color::WHITE).into()), 1.5)
    }

    #[test]
    fn test_refracted_direction_obeys_snell() {
        let bsdf = glass();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(3));
        let wi = glam::Vec3A::new(0.4, 0.0, (1.0f32 - 0.16).sqrt());
        let mut event = SurfaceScatterEvent::new(
            wi,
            glam::Vec2::ZERO,
            BsdfLobes::SPECULAR_TRANSMISSION,
        );
        assert!(bsdf.sample(&mut event, &mut sampler));
        assert!(event.wo.z < 0.0);
        // sin(theta_t) = sin(theta_i) / ior
        let sin_i = wi.x;
        let sin_t = (event.wo.x * event.wo.x + event.wo.y * event.wo.y).sqrt();
        assert!((sin_t - sin_i / 1.5).abs() < 1e-5);
        assert_eq!(event.pdf, 0.0);
    }

    #[test]
    fn test_tir_from_dense_side() {
        let bsdf = glass();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(3));
        // Leaving the glass at a grazing angle beyond the critical angle.
        let wi = glam::Vec3A::new(0.9, 0.0, -(1.0f32 - 0.81).sqrt());
        let mut event = SurfaceScatterEvent::new(
            wi,
            glam::Vec2::ZERO,
            BsdfLobes::SPECULAR_TRANSMISSION,
        );
        assert!(!bsdf.sample(&mut event, &mut sampler));

        let mut event = SurfaceScatterEvent::new(wi, glam::Vec2::ZERO, BsdfLobes::ALL);
        assert!(bsdf.sample(&mut event, &mut sampler));
        assert_eq!(event.sampled_lobe, BsdfLobes::SPECULAR_REFLECTION);
    }

    #[test]
    fn test_branch_weights_with_single_lobe_requested() {
        let bsdf = glass();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(3));
        let wi = glam::Vec3A::Z;
        let f0 = ((1.0 - 1.5f32) / (1.0 + 1.5)).powi(2);

        let mut event = SurfaceScatterEvent::new(
            wi,
            glam::Vec2::ZERO,
            BsdfLobes::SPECULAR_REFLECTION,
        );
        assert!(bsdf.sample(&mut event, &mut sampler));
        assert!((event.throughput.r - f0).abs() < 1e-4);

        let mut event = SurfaceScatterEvent::new(
            wi,
            glam::Vec2::ZERO,
            BsdfLobes::SPECULAR_TRANSMISSION,
        );
        assert!(bsdf.sample(&mut event, &mut sampler));
        assert!((event.throughput.r - (1.0 - f0)).abs() < 1e-4);
    }
}
