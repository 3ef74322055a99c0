#[macro_use]
extern crate lazy_static;

pub mod accel;
pub mod bsdf;
pub mod camera;
pub mod core;
pub mod film;
pub mod integrator;
pub mod loader;
pub mod primitive;
pub mod renderer;
pub mod sampler;
pub mod scene;
pub mod texture;
pub mod thread_pool;
