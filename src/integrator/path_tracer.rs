use crate::{
    bsdf::{BsdfLobes, BsdfT, SurfaceScatterEvent},
    core::{color::Color, coord::Coordinate, ray::Ray},
    sampler::{Sampler, SamplerT},
    scene::Scene,
    texture::TextureT,
};

use crate::primitive::PrimitiveT;

/// Forward path tracing with next-event estimation and multiple importance
/// sampling.
#[derive(Clone)]
pub struct PathTracer {
    max_bounces: u32,
}

impl PathTracer {
    const CUTOFF_LUMINANCE: f32 = 0.001;
    const RR_START_BOUNCE: u32 = 2;
    const SHADOW_EPS: f32 = 1e-3;

    pub fn new(max_bounces: u32) -> Self {
        Self { max_bounces }
    }

    fn direct_light(
        &self,
        scene: &Scene,
        p: glam::Vec3A,
        ng: glam::Vec3A,
        wi: glam::Vec3A,
        uv: glam::Vec2,
        frame: &Coordinate,
        bsdf: &crate::bsdf::Bsdf,
        sampler: &mut Sampler,
        supplemental: &mut Sampler,
    ) -> Color {
        let (light_idx, pick_pdf) = match scene.pick_light(p, supplemental.next_1d()) {
            Some(pick) => pick,
            None => return Color::BLACK,
        };
        let light = &scene.primitives[light_idx];

        let light_sample = match light.sample_inbound(p, sampler) {
            Some(s) => s,
            None => return Color::BLACK,
        };

        let event = SurfaceScatterEvent::for_directions(
            wi,
            frame.to_local(light_sample.d),
            uv,
            BsdfLobes::ALL,
        );
        let f = bsdf.eval(&event);
        if f.is_black() {
            return Color::BLACK;
        }

        let offset = (if light_sample.d.dot(ng) >= 0.0 { ng } else { -ng }) * Self::SHADOW_EPS;
        let shadow = Ray::new(p + offset, light_sample.d);
        if scene.occluded(&shadow, light_sample.dist * (1.0 - Self::SHADOW_EPS)) {
            return Color::BLACK;
        }

        // Radiance arriving from the sampled light along d.
        let light_ray = Ray::new(p + offset, light_sample.d);
        let radiance = match light.intersect(&light_ray, f32::MAX) {
            Some(hit) if !hit.back_side => {
                let info = light.intersection_info(&hit);
                match light.emission() {
                    Some(em) => em.lookup(info.uv),
                    None => return Color::BLACK,
                }
            }
            _ => return Color::BLACK,
        };

        let light_pdf = light_sample.pdf * pick_pdf;
        if light_pdf <= 0.0 || !light_pdf.is_finite() {
            return Color::BLACK;
        }
        let weight = power_heuristic(light_pdf, bsdf.pdf(&event));
        radiance * f * (weight / light_pdf)
    }
}

impl super::IntegratorT for PathTracer {
    fn trace_sample(
        &mut self,
        scene: &Scene,
        pixel: glam::UVec2,
        sampler: &mut Sampler,
        supplemental: &mut Sampler,
    ) -> Color {
        let mut ray = scene.camera.generate_ray(pixel, sampler.next_2d());

        let mut result = Color::BLACK;
        let mut throughput = Color::WHITE;
        // The camera is a delta "lobe": the first emission hit is always
        // counted in full, as is anything reached through a specular bounce.
        let mut specular_bounce = true;
        let mut prev_pdf = 0.0;
        let mut prev_p = ray.origin;

        for bounce in 0..self.max_bounces {
            let (prim_idx, hit) = match scene.intersect(&ray) {
                Some(found) => found,
                None => break,
            };
            let prim = &scene.primitives[prim_idx];
            let info = prim.intersection_info(&hit);

            if let Some(emission) = prim.emission() {
                if !hit.back_side {
                    let radiance = emission.lookup(info.uv);
                    if specular_bounce {
                        result += throughput * radiance;
                    } else {
                        let light_pdf = prim.inbound_pdf(&hit, &info, prev_p, ray.direction)
                            * scene.light_pick_pdf(prev_p, prim_idx);
                        result += throughput * radiance * power_heuristic(prev_pdf, light_pdf);
                    }
                }
            }

            let bsdf = match info.bsdf {
                Some(idx) => &scene.bsdfs[idx],
                // Pure emitters (environment geometry) end the path.
                None => break,
            };

            let frame = match prim.tangent_space(&hit) {
                Some((tangent, _)) => Coordinate::from_tangent_normal(tangent, info.ns),
                None => Coordinate::from_normal(info.ns),
            };
            let wi = frame.to_local(-ray.direction);

            result += throughput
                * self.direct_light(
                    scene,
                    info.p,
                    info.ng,
                    wi,
                    info.uv,
                    &frame,
                    bsdf,
                    sampler,
                    supplemental,
                );

            let mut event = SurfaceScatterEvent::new(wi, info.uv, BsdfLobes::ALL);
            if !bsdf.sample(&mut event, sampler) {
                break;
            }
            if event.throughput.is_black() {
                break;
            }

            throughput *= event.throughput;
            specular_bounce = event.sampled_lobe.is_pure_specular();
            prev_pdf = event.pdf;
            prev_p = info.p;

            let wo_world = frame.to_world(event.wo);
            let offset = (if wo_world.dot(info.ng) >= 0.0 { info.ng } else { -info.ng })
                * Self::SHADOW_EPS;
            ray = Ray::new(info.p + offset, wo_world);

            if bounce >= Self::RR_START_BOUNCE {
                let survival = throughput.luminance().clamp(Self::CUTOFF_LUMINANCE, 1.0);
                if supplemental.next_1d() > survival {
                    break;
                }
                throughput /= survival;
            }
        }

        result
    }
}

fn power_heuristic(p0: f32, p1: f32) -> f32 {
    (p0 * p0) / (p0 * p0 + p1 * p1)
}
