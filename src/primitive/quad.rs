use std::sync::Arc;

use crate::{
    core::{bbox::Bbox, coord::Coordinate, ray::Ray, warp},
    sampler::{Sampler, SamplerT},
    texture::{Texture, TextureT},
};

use super::{Hit, InboundSample, IntersectionInfo, OutboundSample, PrimitiveT};

/// Planar parallelogram spanned by two edges from a base corner.
#[derive(Debug)]
pub struct Quad {
    base: glam::Vec3A,
    edge0: glam::Vec3A,
    edge1: glam::Vec3A,
    bsdf: usize,
    emission: Option<Arc<Texture>>,
    samplable: bool,
}

impl Quad {
    pub fn new(base: glam::Vec3A, edge0: glam::Vec3A, edge1: glam::Vec3A, bsdf: usize) -> Self {
        Self {
            base,
            edge0,
            edge1,
            bsdf,
            emission: None,
            samplable: false,
        }
    }

    pub fn with_emission(mut self, emission: Arc<Texture>) -> Self {
        self.emission = Some(emission);
        self
    }

    fn unnormalized_normal(&self) -> glam::Vec3A {
        self.edge0.cross(self.edge1)
    }

    fn area(&self) -> f32 {
        self.unnormalized_normal().length()
    }
}

impl PrimitiveT for Quad {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let ng = self.unnormalized_normal();
        let denom = ray.direction.dot(ng);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = (self.base - ray.origin).dot(ng) / denom;
        if t <= ray.t_min || t >= t_max {
            return None;
        }
        let q = ray.point_at(t) - self.base;
        let u = q.dot(self.edge0) / self.edge0.length_squared();
        let v = q.dot(self.edge1) / self.edge1.length_squared();
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return None;
        }
        Some(Hit {
            t,
            u,
            v,
            prim: 0,
            ng,
            back_side: denom > 0.0,
        })
    }

    fn occluded(&self, ray: &Ray, t_max: f32) -> bool {
        self.intersect(ray, t_max).is_some()
    }

    fn intersection_info(&self, hit: &Hit) -> IntersectionInfo {
        let ng = hit.ng.normalize();
        IntersectionInfo {
            p: self.base + hit.u * self.edge0 + hit.v * self.edge1,
            ng,
            ns: ng,
            uv: glam::Vec2::new(hit.u, hit.v),
            bsdf: Some(self.bsdf),
        }
    }

    fn tangent_space(&self, _hit: &Hit) -> Option<(glam::Vec3A, glam::Vec3A)> {
        if self.area() < 1e-6 {
            return None;
        }
        Some((self.edge0, self.edge1))
    }

    fn bounds(&self) -> Bbox {
        let mut bounds = Bbox::empty();
        bounds.grow(self.base);
        bounds.grow(self.base + self.edge0);
        bounds.grow(self.base + self.edge1);
        bounds.grow(self.base + self.edge0 + self.edge1);
        bounds
    }

    fn is_samplable(&self) -> bool {
        self.samplable
    }

    fn make_samplable(&mut self) {
        self.samplable = true;
    }

    fn sample_inbound(&self, p: glam::Vec3A, sampler: &mut Sampler) -> Option<InboundSample> {
        let u = sampler.next_2d();
        let q = self.base + u.x * self.edge0 + u.y * self.edge1;
        let normal = self.unnormalized_normal().normalize();

        let l = q - p;
        let r_sq = l.length_squared();
        let dist = r_sq.sqrt();
        let d = l / dist;
        let cos_theta = -normal.dot(d);
        if cos_theta <= 0.0 {
            return None;
        }
        Some(InboundSample {
            d,
            dist,
            pdf: r_sq / (cos_theta * self.area()),
        })
    }

    fn sample_outbound(&self, sampler: &mut Sampler) -> Option<OutboundSample> {
        let u = sampler.next_2d();
        let p = self.base + u.x * self.edge0 + u.y * self.edge1;
        let frame = Coordinate::from_normal(self.unnormalized_normal().normalize());
        let d_local = warp::cosine_hemisphere(sampler.next_2d());
        Some(OutboundSample {
            p,
            d: frame.to_world(d_local),
            pdf: warp::cosine_hemisphere_pdf(d_local) / self.area(),
        })
    }

    fn inbound_pdf(
        &self,
        _hit: &Hit,
        info: &IntersectionInfo,
        p: glam::Vec3A,
        d: glam::Vec3A,
    ) -> f32 {
        (p - info.p).length_squared() / (-d.dot(info.ng) * self.area())
    }

    fn approximate_radiance(&self, p: glam::Vec3A) -> f32 {
        let lum = match &self.emission {
            Some(e) => e.average().luminance(),
            None => return 0.0,
        };
        let center = self.base + (self.edge0 + self.edge1) * 0.5;
        let d_sq = (p - center).length_squared().max(1e-6);
        lum * self.area() / d_sq
    }

    fn is_infinite(&self) -> bool {
        false
    }

    fn is_delta(&self) -> bool {
        self.area() < 1e-12
    }

    fn emission(&self) -> Option<&Arc<Texture>> {
        self.emission.as_ref()
    }

    fn prepare_for_render(&mut self) {}

    fn cleanup_after_render(&mut self) {
        self.samplable = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::color::Color;
    use crate::texture::ConstantTexture;

    fn unit_quad() -> Quad {
        Quad::new(
            glam::Vec3A::new(-0.5, -0.5, 0.0),
            glam::Vec3A::new(1.0, 0.0, 0.0),
            glam::Vec3A::new(0.0, 1.0, 0.0),
            0,
        )
    }

    #[test]
    fn test_intersect_inside_bounds_only() {
        let quad = unit_quad();
        let hit_ray = Ray::new(glam::Vec3A::new(0.2, 0.2, 1.0), -glam::Vec3A::Z);
        assert!(quad.intersect(&hit_ray, f32::MAX).is_some());
        let miss_ray = Ray::new(glam::Vec3A::new(0.8, 0.2, 1.0), -glam::Vec3A::Z);
        assert!(quad.intersect(&miss_ray, f32::MAX).is_none());
    }

    #[test]
    fn test_uv_parameterization() {
        let quad = unit_quad();
        let ray = Ray::new(glam::Vec3A::new(0.25, -0.25, 1.0), -glam::Vec3A::Z);
        let hit = quad.intersect(&ray, f32::MAX).unwrap();
        let info = quad.intersection_info(&hit);
        assert!((info.uv.x - 0.75).abs() < 1e-5);
        assert!((info.uv.y - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_inbound_rejected_from_behind() {
        let mut quad = unit_quad();
        quad.make_samplable();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(7));
        // Receiver behind the quad relative to its normal (+z).
        let p = glam::Vec3A::new(0.0, 0.0, -1.0);
        for _ in 0..32 {
            assert!(quad.sample_inbound(p, &mut sampler).is_none());
        }
    }

    #[test]
    fn test_approximate_radiance_falls_off() {
        let quad = unit_quad()
            .with_emission(Arc::new(ConstantTexture::new(Color::WHITE).into()));
        let near = quad.approximate_radiance(glam::Vec3A::new(0.0, 0.0, 1.0));
        let far = quad.approximate_radiance(glam::Vec3A::new(0.0, 0.0, 4.0));
        assert!(near > far);
        assert!(far > 0.0);
    }
}
