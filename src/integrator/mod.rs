mod path_tracer;

pub use path_tracer::*;

use crate::{core::color::Color, sampler::Sampler, scene::Scene};

/// Per-ray radiance estimator. Stateless between calls apart from scratch
/// buffers; cloned once per worker so samplers and scratch are never shared.
#[enum_dispatch::enum_dispatch(Integrator)]
pub trait IntegratorT {
    fn trace_sample(
        &mut self,
        scene: &Scene,
        pixel: glam::UVec2,
        sampler: &mut Sampler,
        supplemental: &mut Sampler,
    ) -> Color;
}

#[enum_dispatch::enum_dispatch]
#[derive(Clone)]
pub enum Integrator {
    PathTracer,
}
