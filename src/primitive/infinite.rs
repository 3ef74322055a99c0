use std::f32::consts::PI;
use std::sync::Arc;

use crate::{
    core::{bbox::Bbox, coord::Coordinate, ray::Ray, warp},
    sampler::{Sampler, SamplerT},
    texture::{MapJacobian, Texture, TextureT},
};

use super::{Hit, InboundSample, IntersectionInfo, OutboundSample, PrimitiveT};

/// Latitude-longitude mapping between unit directions (y-up) and unit UV.
/// Texel row 0 (v = 1) is the +y pole, matching the `v' = 1 - v` lookup
/// convention and the sin-weighted spherical sampling rows.
pub fn direction_to_uv(d: glam::Vec3A) -> glam::Vec2 {
    let theta = d.y.clamp(-1.0, 1.0).acos();
    let phi = d.z.atan2(d.x);
    glam::Vec2::new((phi + PI) * (0.5 / PI), 1.0 - theta / PI)
}

pub fn uv_to_direction(uv: glam::Vec2) -> glam::Vec3A {
    let theta = (1.0 - uv.y) * PI;
    let phi = uv.x * 2.0 * PI - PI;
    let sin_theta = theta.sin();
    glam::Vec3A::new(sin_theta * phi.cos(), theta.cos(), sin_theta * phi.sin())
}

/// Environment dome at infinity. Importance-samples its emission map when one
/// is present.
#[derive(Debug)]
pub struct InfiniteSphere {
    emission: Arc<Texture>,
    samplable: bool,
}

impl InfiniteSphere {
    pub fn new(emission: Arc<Texture>) -> Self {
        Self {
            emission,
            samplable: false,
        }
    }

    fn sample_texture(&self) -> bool {
        !self.emission.is_constant()
    }

    fn direction_pdf(&self, d: glam::Vec3A) -> f32 {
        if self.sample_texture() {
            let uv = direction_to_uv(d);
            let sin_theta = ((1.0 - uv.y) * PI).sin();
            if sin_theta <= 0.0 {
                return 0.0;
            }
            // Unit-square density divided by the (u, v) -> direction
            // jacobian.
            self.emission.pdf(MapJacobian::Spherical, uv)
                / (2.0 * PI * PI * sin_theta)
        } else {
            warp::uniform_sphere_pdf()
        }
    }
}

impl PrimitiveT for InfiniteSphere {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        if t_max < Ray::T_INFINITE {
            return None;
        }
        let uv = direction_to_uv(ray.direction.normalize());
        Some(Hit {
            t: Ray::T_INFINITE,
            u: uv.x,
            v: uv.y,
            prim: 0,
            ng: -ray.direction,
            back_side: false,
        })
    }

    // The dome never blocks a finite shadow ray.
    fn occluded(&self, _ray: &Ray, _t_max: f32) -> bool {
        false
    }

    fn intersection_info(&self, hit: &Hit) -> IntersectionInfo {
        let ng = hit.ng.normalize();
        IntersectionInfo {
            p: -ng * Ray::T_INFINITE,
            ng,
            ns: ng,
            uv: glam::Vec2::new(hit.u, hit.v),
            bsdf: None,
        }
    }

    fn tangent_space(&self, _hit: &Hit) -> Option<(glam::Vec3A, glam::Vec3A)> {
        None
    }

    fn bounds(&self) -> Bbox {
        Bbox::empty()
    }

    fn is_samplable(&self) -> bool {
        self.samplable
    }

    fn make_samplable(&mut self) {
        if self.sample_texture() {
            self.emission.make_samplable(MapJacobian::Spherical);
        }
        self.samplable = true;
    }

    fn sample_inbound(&self, _p: glam::Vec3A, sampler: &mut Sampler) -> Option<InboundSample> {
        if self.sample_texture() {
            let uv = self.emission.sample(MapJacobian::Spherical, sampler.next_2d());
            let d = uv_to_direction(uv);
            let pdf = self.direction_pdf(d);
            if pdf <= 0.0 {
                return None;
            }
            Some(InboundSample {
                d,
                dist: Ray::T_INFINITE,
                pdf,
            })
        } else {
            Some(InboundSample {
                d: warp::uniform_sphere(sampler.next_2d()),
                dist: Ray::T_INFINITE,
                pdf: warp::uniform_sphere_pdf(),
            })
        }
    }

    fn sample_outbound(&self, _sampler: &mut Sampler) -> Option<OutboundSample> {
        None
    }

    fn inbound_pdf(
        &self,
        _hit: &Hit,
        _info: &IntersectionInfo,
        _p: glam::Vec3A,
        d: glam::Vec3A,
    ) -> f32 {
        self.direction_pdf(d)
    }

    fn approximate_radiance(&self, _p: glam::Vec3A) -> f32 {
        4.0 * PI * self.emission.average().luminance()
    }

    fn is_infinite(&self) -> bool {
        true
    }

    fn is_delta(&self) -> bool {
        false
    }

    fn emission(&self) -> Option<&Arc<Texture>> {
        Some(&self.emission)
    }

    fn prepare_for_render(&mut self) {}

    fn cleanup_after_render(&mut self) {
        self.samplable = false;
    }
}

/// Cone-shaped dome emitter at infinity; the usual stand-in for a sun or
/// directional light with a finite angular radius.
#[derive(Debug)]
pub struct InfiniteSphereCap {
    emission: Arc<Texture>,
    direction: glam::Vec3A,
    cap_angle_deg: f32,
    cos_cap_angle: f32,
    frame: Coordinate,
    samplable: bool,
}

impl InfiniteSphereCap {
    pub fn new(emission: Arc<Texture>, direction: glam::Vec3A, cap_angle_deg: f32) -> Self {
        let direction = direction.normalize();
        let cos_cap_angle = cap_angle_deg.to_radians().cos();
        Self {
            emission,
            direction,
            cap_angle_deg,
            cos_cap_angle,
            frame: Coordinate::from_normal(direction),
            samplable: false,
        }
    }

    pub fn cap_angle_deg(&self) -> f32 {
        self.cap_angle_deg
    }

    fn solid_angle(&self) -> f32 {
        2.0 * PI * (1.0 - self.cos_cap_angle)
    }
}

impl PrimitiveT for InfiniteSphereCap {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        if t_max < Ray::T_INFINITE {
            return None;
        }
        let d = ray.direction.normalize();
        if d.dot(self.direction) < self.cos_cap_angle {
            return None;
        }
        Some(Hit {
            t: Ray::T_INFINITE,
            u: 0.0,
            v: 0.0,
            prim: 0,
            ng: -ray.direction,
            back_side: false,
        })
    }

    fn occluded(&self, _ray: &Ray, _t_max: f32) -> bool {
        false
    }

    fn intersection_info(&self, hit: &Hit) -> IntersectionInfo {
        let ng = hit.ng.normalize();
        IntersectionInfo {
            p: -ng * Ray::T_INFINITE,
            ng,
            ns: ng,
            uv: glam::Vec2::ZERO,
            bsdf: None,
        }
    }

    fn tangent_space(&self, _hit: &Hit) -> Option<(glam::Vec3A, glam::Vec3A)> {
        None
    }

    fn bounds(&self) -> Bbox {
        Bbox::empty()
    }

    fn is_samplable(&self) -> bool {
        self.samplable
    }

    fn make_samplable(&mut self) {
        self.samplable = true;
    }

    fn sample_inbound(&self, _p: glam::Vec3A, sampler: &mut Sampler) -> Option<InboundSample> {
        let local = warp::uniform_sphere_cap(sampler.next_2d(), self.cos_cap_angle);
        Some(InboundSample {
            d: self.frame.to_world(local),
            dist: Ray::T_INFINITE,
            pdf: warp::uniform_sphere_cap_pdf(self.cos_cap_angle),
        })
    }

    fn sample_outbound(&self, _sampler: &mut Sampler) -> Option<OutboundSample> {
        None
    }

    fn inbound_pdf(
        &self,
        _hit: &Hit,
        _info: &IntersectionInfo,
        _p: glam::Vec3A,
        d: glam::Vec3A,
    ) -> f32 {
        if d.dot(self.direction) < self.cos_cap_angle {
            0.0
        } else {
            warp::uniform_sphere_cap_pdf(self.cos_cap_angle)
        }
    }

    fn approximate_radiance(&self, _p: glam::Vec3A) -> f32 {
        self.solid_angle() * self.emission.average().luminance()
    }

    fn is_infinite(&self) -> bool {
        true
    }

    fn is_delta(&self) -> bool {
        false
    }

    fn emission(&self) -> Option<&Arc<Texture>> {
        Some(&self.emission)
    }

    fn prepare_for_render(&mut self) {}

    fn cleanup_after_render(&mut self) {
        self.samplable = false;
    }
}
