use std::f32::consts::PI;
use std::sync::Arc;

use crate::{
    core::{bbox::Bbox, coord::Coordinate, ray::Ray, warp},
    sampler::{Sampler, SamplerT},
    texture::{Texture, TextureT},
};

use super::{direction_to_uv, Hit, InboundSample, IntersectionInfo, OutboundSample, PrimitiveT};

#[derive(Debug)]
pub struct Sphere {
    center: glam::Vec3A,
    radius: f32,
    bsdf: usize,
    emission: Option<Arc<Texture>>,
    samplable: bool,
}

impl Sphere {
    pub fn new(center: glam::Vec3A, radius: f32, bsdf: usize) -> Self {
        Self {
            center,
            radius,
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
        4.0 * PI * self.radius * self.radius
    }
}

impl PrimitiveT for Sphere {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let o = ray.origin - self.center;
        let b = o.dot(ray.direction);
        let c = o.length_squared() - self.radius * self.radius;
        let disc = b * b - ray.direction.length_squared() * c;
        if disc < 0.0 {
            return None;
        }
        let sqrt_disc = disc.sqrt();
        let inv_a = 1.0 / ray.direction.length_squared();
        let t0 = (-b - sqrt_disc) * inv_a;
        let t1 = (-b + sqrt_disc) * inv_a;
        let t = if t0 > ray.t_min && t0 < t_max {
            t0
        } else if t1 > ray.t_min && t1 < t_max {
            t1
        } else {
            return None;
        };

        let ng = ray.point_at(t) - self.center;
        let uv = direction_to_uv(ng.normalize());
        Some(Hit {
            t,
            u: uv.x,
            v: uv.y,
            prim: 0,
            ng,
            back_side: ng.dot(ray.direction) > 0.0,
        })
    }

    fn occluded(&self, ray: &Ray, t_max: f32) -> bool {
        self.intersect(ray, t_max).is_some()
    }

    fn intersection_info(&self, hit: &Hit) -> IntersectionInfo {
        let ng = hit.ng.normalize();
        IntersectionInfo {
            p: self.center + ng * self.radius,
            ng,
            ns: ng,
            uv: glam::Vec2::new(hit.u, hit.v),
            bsdf: Some(self.bsdf),
        }
    }

    fn tangent_space(&self, hit: &Hit) -> Option<(glam::Vec3A, glam::Vec3A)> {
        let n = hit.ng.normalize();
        // d(position)/d(phi); degenerate at the poles where the mapping
        // pinches.
        let sin_theta_sq = n.x * n.x + n.z * n.z;
        if sin_theta_sq < 1e-12 {
            return None;
        }
        let tangent = glam::Vec3A::new(-n.z, 0.0, n.x).normalize() * self.radius;
        let bitangent = n.cross(tangent);
        Some((tangent, bitangent))
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
        let n = warp::uniform_sphere(sampler.next_2d());
        let q = self.center + n * self.radius;
        let l = q - p;
        let r_sq = l.length_squared();
        let dist = r_sq.sqrt();
        let d = l / dist;
        let cos_theta = -n.dot(d);
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
        let n = warp::uniform_sphere(sampler.next_2d());
        let frame = Coordinate::from_normal(n);
        let d_local = warp::cosine_hemisphere(sampler.next_2d());
        Some(OutboundSample {
            p: self.center + n * self.radius,
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
        let d_sq = (p - self.center).length_squared();
        let r_sq = self.radius * self.radius;
        let solid_angle = if d_sq <= r_sq {
            4.0 * PI
        } else {
            2.0 * PI * (1.0 - (1.0 - r_sq / d_sq).sqrt())
        };
        solid_angle * lum
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
