use std::f32::consts::FRAC_1_PI;
use std::sync::Arc;

use crate::{
    core::{color::Color, warp},
    sampler::{Sampler, SamplerT},
    texture::{Texture, TextureT},
};

use super::{BsdfLobes, BsdfT, SurfaceScatterEvent};

/// Ideal diffuse reflector.
#[derive(Debug)]
pub struct LambertBsdf {
    albedo: Arc<Texture>,
}

impl LambertBsdf {
    pub fn new(albedo: Arc<Texture>) -> Self {
        Self { albedo }
    }
}

impl BsdfT for LambertBsdf {
    fn lobes(&self) -> BsdfLobes {
        BsdfLobes::DIFFUSE_REFLECTION
    }

    fn sample(&self, event: &mut SurfaceScatterEvent, sampler: &mut Sampler) -> bool {
        if !event.requested_lobe.test(BsdfLobes::DIFFUSE_REFLECTION) {
            return false;
        }
        if event.wi.z <= 0.0 {
            return false;
        }
        event.wo = warp::cosine_hemisphere(sampler.next_2d());
        event.pdf = warp::cosine_hemisphere_pdf(event.wo);
        event.throughput = self.albedo.lookup(event.uv);
        event.sampled_lobe = BsdfLobes::DIFFUSE_REFLECTION;
        true
    }

    fn eval(&self, event: &SurfaceScatterEvent) -> Color {
        if !event.requested_lobe.test(BsdfLobes::DIFFUSE_REFLECTION) {
            return Color::BLACK;
        }
        if event.wi.z <= 0.0 || event.wo.z <= 0.0 {
            return Color::BLACK;
        }
        self.albedo.lookup(event.uv) * (FRAC_1_PI * event.wo.z)
    }

    fn pdf(&self, event: &SurfaceScatterEvent) -> f32 {
        if !event.requested_lobe.test(BsdfLobes::DIFFUSE_REFLECTION) {
            return 0.0;
        }
        if event.wi.z <= 0.0 || event.wo.z <= 0.0 {
            return 0.0;
        }
        warp::cosine_hemisphere_pdf(event.wo)
    }
}
