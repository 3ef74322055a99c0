use std::sync::Arc;

use crate::{
    core::color::Color,
    sampler::Sampler,
    texture::{Texture, TextureT},
};

use super::{BsdfLobes, BsdfT, SurfaceScatterEvent};

/// Perfect specular reflector.
#[derive(Debug)]
pub struct MirrorBsdf {
    albedo: Arc<Texture>,
}

impl MirrorBsdf {
    pub fn new(albedo: Arc<Texture>) -> Self {
        Self { albedo }
    }
}

impl BsdfT for MirrorBsdf {
    fn lobes(&self) -> BsdfLobes {
        BsdfLobes::SPECULAR_REFLECTION
    }

    fn sample(&self, event: &mut SurfaceScatterEvent, _sampler: &mut Sampler) -> bool {
        if !event.requested_lobe.test(BsdfLobes::SPECULAR_REFLECTION) {
            return false;
        }
        if event.wi.z <= 0.0 {
            return false;
        }
        event.wo = glam::Vec3A::new(-event.wi.x, -event.wi.y, event.wi.z);
        event.pdf = 0.0;
        event.throughput = self.albedo.lookup(event.uv);
        event.sampled_lobe = BsdfLobes::SPECULAR_REFLECTION;
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

    #[test]
    fn test_mirrors_incident_direction() {
        let bsdf = MirrorBsdf::new(Arc::new(ConstantTexture::new(Color::WHITE).into()));
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(1));
        let wi = glam::Vec3A::new(0.5, -0.2, 0.84).normalize();
        let mut event = SurfaceScatterEvent::new(wi, glam::Vec2::ZERO, BsdfLobes::ALL);
        assert!(bsdf.sample(&mut event, &mut sampler));
        assert_eq!(event.pdf, 0.0);
        assert!((event.wo.x + wi.x).abs() < 1e-6);
        assert!((event.wo.y + wi.y).abs() < 1e-6);
        assert!((event.wo.z - wi.z).abs() < 1e-6);
        assert!(bsdf.eval(&event).is_black());
    }
}
