use std::f32::consts::PI;
use std::sync::Arc;

use crate::{
    core::{bbox::Bbox, coord::Coordinate, ray::Ray, warp},
    sampler::{Sampler, SamplerT},
    texture::{Texture, TextureT},
};

use super::{Hit, InboundSample, IntersectionInfo, OutboundSample, PrimitiveT};

#[derive(Debug)]
pub struct Disk {
    center: glam::Vec3A,
    normal: glam::Vec3A,
    radius: f32,
    frame: Coordinate,
    bsdf: usize,
    emission: Option<Arc<Texture>>,
    samplable: bool,
}

impl Disk {
    pub fn new(center: glam::Vec3A, normal: glam::Vec3A, radius: f32, bsdf: usize) -> Self {
        let normal = normal.normalize();
        Self {
            center,
            normal,
            radius,
            frame: Coordinate::from_normal(normal),
            bsdf,
            emission: None,
            samplable: false,
        }
    }

    pub fn with_emission(mut self, emission: Arc<Texture>) -> Self {
        self.emission = Some(emission);
        self
    }

    fn area(&self) -> f32 {
        PI * self.radius * self.radius
    }
}

impl PrimitiveT for Disk {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let denom = ray.direction.dot(self.normal);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = (self.center - ray.origin).dot(self.normal) / denom;
        if t <= ray.t_min || t >= t_max {
            return None;
        }
        let q = ray.point_at(t) - self.center;
        let r = q.length();
        if r > self.radius {
            return None;
        }
        let local = self.frame.to_local(q);
        let phi = local.y.atan2(local.x);
        Some(Hit {
            t,
            u: (phi + PI) * (0.5 / PI),
            v: r / self.radius,
            prim: 0,
            ng: self.normal,
            back_side: denom > 0.0,
        })
    }

    fn occluded(&self, ray: &Ray, t_max: f32) -> bool {
        self.intersect(ray, t_max).is_some()
    }

    fn intersection_info(&self, hit: &Hit) -> IntersectionInfo {
        let phi = hit.u * 2.0 * PI - PI;
        let r = hit.v * self.radius;
        let local = glam::Vec3A::new(r * phi.cos(), r * phi.sin(), 0.0);
        IntersectionInfo {
            p: self.center + self.frame.to_world(local),
            ng: self.normal,
            ns: self.normal,
            uv: glam::Vec2::new(hit.u, hit.v),
            bsdf: Some(self.bsdf),
        }
    }

    fn tangent_space(&self, hit: &Hit) -> Option<(glam::Vec3A, glam::Vec3A)> {
        if hit.v * self.radius < 1e-6 {
            // The polar parameterization collapses at the center.
            return None;
        }
        let phi = hit.u * 2.0 * PI - PI;
        let radial = self.frame.to_world(glam::Vec3A::new(phi.cos(), phi.sin(), 0.0));
        Some((self.normal.cross(radial), radial))
    }

    fn bounds(&self) -> Bbox {
        Bbox::new(
            self.center - glam::Vec3A::splat(self.radius),
            self.center + glam::Vec3A::splat(self.radius),
        )
    }

    fn is_samplable(&self) -> bool {
        self.samplable
    }

    fn make_samplable(&mut self) {
        self.samplable = true;
    }

    fn sample_inbound(&self, p: glam::Vec3A, sampler: &mut Sampler) -> Option<InboundSample> {
        let disk = warp::uniform_disk(sampler.next_2d()) * self.radius;
        let q = self.center + self.frame.to_world(glam::Vec3A::new(disk.x, disk.y, 0.0));

        let l = q - p;
        let r_sq = l.length_squared();
        let dist = r_sq.sqrt();
        let d = l / dist;
        let cos_theta = -self.normal.dot(d);
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
        let disk = warp::uniform_disk(sampler.next_2d()) * self.radius;
        let p = self.center + self.frame.to_world(glam::Vec3A::new(disk.x, disk.y, 0.0));
        let d_local = warp::cosine_hemisphere(sampler.next_2d());
        Some(OutboundSample {
            p,
            d: self.frame.to_world(d_local),
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
        let d_sq = (p - self.center).length_squared().max(1e-6);
        lum * self.area() / d_sq
    }

    fn is_infinite(&self) -> bool {
        false
    }

    fn is_delta(&self) -> bool {
        self.radius <= 0.0
    }

    fn emission(&self) -> Option<&Arc<Texture>> {
        self.emission.as_ref()
    }

    fn prepare_for_render(&mut self) {}

    fn cleanup_after_render(&mut self) {
        self.samplable = false;
    }
}
