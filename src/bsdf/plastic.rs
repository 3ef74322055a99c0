use std::sync::Arc;

use crate::{
    core::{color::Color, warp},
    sampler::{Sampler, SamplerT},
    texture::{Texture, TextureT},
};

use super::{fresnel, BsdfLobes, BsdfT, SurfaceScatterEvent};

const DIFFUSE_FRESNEL_SAMPLES: u32 = 1_000_000;

/// Diffuse substrate under a smooth dielectric coat, with optional absorption
/// inside the coat.
#[derive(Debug)]
pub struct PlasticBsdf {
    albedo: Arc<Texture>,
    ior: f32,
    thickness: f32,
    sigma_a: Color,

    scaled_sigma_a: Color,
    avg_transmittance: f32,
    diffuse_fresnel: f32,
}

impl PlasticBsdf {
    pub fn new(albedo: Arc<Texture>, ior: f32, thickness: f32, sigma_a: Color) -> Self {
        let scaled_sigma_a = sigma_a * thickness;
        let avg_transmittance = (-2.0 * scaled_sigma_a.avg()).exp();
        let diffuse_fresnel = fresnel::diffuse_reflectance(ior, DIFFUSE_FRESNEL_SAMPLES);
        Self {
            albedo,
            ior,
            thickness,
            sigma_a,
            scaled_sigma_a,
            avg_transmittance,
            diffuse_fresnel,
        }
    }

    pub fn thickness(&self) -> f32 {
        self.thickness
    }

    pub fn sigma_a(&self) -> Color {
        self.sigma_a
    }

    fn specular_probability(&self, cos_theta_i: f32) -> f32 {
        let fi = fresnel::dielectric_reflectance(1.0 / self.ior, cos_theta_i);
        let substrate_weight = self.avg_transmittance * (1.0 - fi);
        fi / (fi + substrate_weight)
    }
}

impl BsdfT for PlasticBsdf {
    fn lobes(&self) -> BsdfLobes {
        BsdfLobes::SPECULAR_REFLECTION | BsdfLobes::DIFFUSE_REFLECTION
    }

    fn sample(&self, event: &mut SurfaceScatterEvent, sampler: &mut Sampler) -> bool {
        if event.wi.z <= 0.0 {
            return false;
        }

        let sample_specular = event.requested_lobe.test(BsdfLobes::SPECULAR_REFLECTION);
        let sample_diffuse = event.requested_lobe.test(BsdfLobes::DIFFUSE_REFLECTION);
        if !sample_specular && !sample_diffuse {
            return false;
        }

        let wi = event.wi;
        let eta = 1.0 / self.ior;
        let fi = fresnel::dielectric_reflectance(eta, wi.z);
        let substrate_weight = self.avg_transmittance * (1.0 - fi);
        let specular_weight = fi;
        let specular_probability = specular_weight / (specular_weight + substrate_weight);

        if sample_specular && (sampler.next_1d() < specular_probability || !sample_diffuse) {
            event.wo = glam::Vec3A::new(-wi.x, -wi.y, wi.z);
            event.pdf = 0.0;
            event.throughput = if sample_diffuse {
                Color::gray(fi / specular_probability)
            } else {
                Color::gray(fi)
            };
            event.sampled_lobe = BsdfLobes::SPECULAR_REFLECTION;
        } else {
            let wo = warp::cosine_hemisphere(sampler.next_2d());
            let fo = fresnel::dielectric_reflectance(eta, wo.z);
            let diffuse_albedo = self.albedo.lookup(event.uv);

            event.wo = wo;
            event.throughput = ((1.0 - fi) * (1.0 - fo) * eta * eta)
                * (diffuse_albedo / (Color::WHITE - diffuse_albedo * self.diffuse_fresnel));
            if self.scaled_sigma_a.max_component() > 0.0 {
                event.throughput *=
                    (self.scaled_sigma_a * (-1.0 / wo.z - 1.0 / wi.z)).exp();
            }
            event.pdf = warp::cosine_hemisphere_pdf(wo);
            if sample_specular {
                event.pdf *= 1.0 - specular_probability;
                event.throughput /= 1.0 - specular_probability;
            }
            event.sampled_lobe = BsdfLobes::DIFFUSE_REFLECTION;
        }
        true
    }

    fn eval(&self, event: &SurfaceScatterEvent) -> Color {
        if !event.requested_lobe.test(BsdfLobes::DIFFUSE_REFLECTION) {
            return Color::BLACK;
        }
        if event.wi.z <= 0.0 || event.wo.z <= 0.0 {
            return Color::BLACK;
        }

        let eta = 1.0 / self.ior;
        let fi = fresnel::dielectric_reflectance(eta, event.wi.z);
        let fo = fresnel::dielectric_reflectance(eta, event.wo.z);
        let diffuse_albedo = self.albedo.lookup(event.uv);

        let mut brdf = ((1.0 - fi) * (1.0 - fo) * eta * eta
            * event.wo.z
            * std::f32::consts::FRAC_1_PI)
            * (diffuse_albedo / (Color::WHITE - diffuse_albedo * self.diffuse_fresnel));

        if self.scaled_sigma_a.max_component() > 0.0 {
            brdf *= (self.scaled_sigma_a * (-1.0 / event.wo.z - 1.0 / event.wi.z)).exp();
        }
        brdf
    }

    fn pdf(&self, event: &SurfaceScatterEvent) -> f32 {
        if event.wi.z <= 0.0 || event.wo.z <= 0.0 {
            return 0.0;
        }

        let sample_specular = event.requested_lobe.test(BsdfLobes::SPECULAR_REFLECTION);
        let sample_diffuse = event.requested_lobe.test(BsdfLobes::DIFFUSE_REFLECTION);
        if !sample_diffuse {
            return 0.0;
        }

        let mut pdf = warp::cosine_hemisphere_pdf(event.wo);
        if sample_specular {
            pdf *= 1.0 - self.specular_probability(event.wi.z);
        }
        pdf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::ConstantTexture;

    fn white_plastic() -> PlasticBsdf {
        PlasticBsdf::new(
            Arc::new(ConstantTexture::new(Color::WHITE).into()),
            1.5,
            0.0,
            Color::BLACK,
        )
    }

    #[test]
    fn test_specular_only_request_is_delta() {
        let bsdf = white_plastic();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(9));
        let wi = glam::Vec3A::new(0.3, 0.1, 0.95).normalize();
        let mut event = SurfaceScatterEvent::new(
            wi,
            glam::Vec2::ZERO,
            BsdfLobes::SPECULAR_REFLECTION,
        );
        assert!(bsdf.sample(&mut event, &mut sampler));
        assert_eq!(event.sampled_lobe, BsdfLobes::SPECULAR_REFLECTION);
        assert_eq!(event.pdf, 0.0);
        assert!(event.throughput.r > 0.0);
        // Mirror direction.
        assert!((event.wo.x + wi.x).abs() < 1e-6);
        assert!((event.wo.z - wi.z).abs() < 1e-6);
    }

    #[test]
    fn test_diffuse_only_request_is_cosine_weighted() {
        let bsdf = white_plastic();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(9));
        let wi = glam::Vec3A::new(0.3, 0.1, 0.95).normalize();
        for _ in 0..64 {
            let mut event = SurfaceScatterEvent::new(
                wi,
                glam::Vec2::ZERO,
                BsdfLobes::DIFFUSE_REFLECTION,
            );
            assert!(bsdf.sample(&mut event, &mut sampler));
            assert_eq!(event.sampled_lobe, BsdfLobes::DIFFUSE_REFLECTION);
            assert!(event.wo.z > 0.0);
            let expected = warp::cosine_hemisphere_pdf(event.wo);
            assert!((event.pdf - expected).abs() <= f32::EPSILON * expected);
        }
    }

    #[test]
    fn test_sample_pdf_matches_pdf_query() {
        let bsdf = white_plastic();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(21));
        let wi = glam::Vec3A::new(-0.2, 0.5, 0.84).normalize();
        for _ in 0..256 {
            let mut event = SurfaceScatterEvent::new(wi, glam::Vec2::ZERO, BsdfLobes::ALL);
            assert!(bsdf.sample(&mut event, &mut sampler));
            if event.sampled_lobe == BsdfLobes::SPECULAR_REFLECTION {
                assert_eq!(event.pdf, 0.0);
                continue;
            }
            let check =
                SurfaceScatterEvent::for_directions(wi, event.wo, glam::Vec2::ZERO, BsdfLobes::ALL);
            let pdf = bsdf.pdf(&check);
            assert!(
                (pdf - event.pdf).abs() <= 2.0 * f32::EPSILON * pdf,
                "pdf mismatch: {} vs {}",
                pdf,
                event.pdf
            );
            let ratio = bsdf.eval(&check).r / pdf;
            assert!(
                (ratio - event.throughput.r).abs() < 1e-3,
                "throughput mismatch: {} vs {}",
                ratio,
                event.throughput.r
            );
        }
    }

    #[test]
    fn test_wrong_hemisphere_rejected() {
        let bsdf = white_plastic();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(1));
        let mut event = SurfaceScatterEvent::new(
            glam::Vec3A::new(0.0, 0.0, -1.0),
            glam::Vec2::ZERO,
            BsdfLobes::ALL,
        );
        assert!(!bsdf.sample(&mut event, &mut sampler));
    }

    #[test]
    fn test_absorption_darkens_grazing_paths() {
        let absorbing = PlasticBsdf::new(
            Arc::new(ConstantTexture::new(Color::WHITE).into()),
            1.5,
            1.0,
            Color::gray(0.5),
        );
        let clear = white_plastic();
        let wi = glam::Vec3A::new(0.0, 0.0, 1.0);
        let wo = glam::Vec3A::new(0.7, 0.0, (1.0f32 - 0.49).sqrt());
        let event =
            SurfaceScatterEvent::for_directions(wi, wo, glam::Vec2::ZERO, BsdfLobes::ALL);
        assert!(absorbing.eval(&event).r < clear.eval(&event).r);
    }
}
