use crate::{core::color::Color, core::ray::Ray, film::Film};

#[derive(Debug, Clone, Copy)]
pub struct CameraParameters {
    pub eye: glam::Vec3A,
    pub forward: glam::Vec3A,
    pub up: glam::Vec3A,
    pub fov_deg: f32,
    pub resolution: glam::UVec2,
}

/// Pinhole camera owning the radiance accumulation buffer.
#[derive(Debug)]
pub struct Camera {
    eye: glam::Vec3A,
    forward: glam::Vec3A,
    up: glam::Vec3A,
    right: glam::Vec3A,
    half_cot_half_fov: f32,
    resolution: glam::UVec2,
    aspect: f32,
    film: Film,
}

impl Camera {
    pub fn new(params: CameraParameters) -> Self {
        let forward = params.forward.normalize();
        let right = forward.cross(params.up).normalize();
        let up = right.cross(forward);
        let fov = params.fov_deg.to_radians();
        Self {
            eye: params.eye,
            forward,
            up,
            right,
            half_cot_half_fov: 0.5 / (fov * 0.5).tan(),
            resolution: params.resolution,
            aspect: params.resolution.x as f32 / params.resolution.y as f32,
            film: Film::new(params.resolution.x, params.resolution.y),
        }
    }

    pub fn resolution(&self) -> glam::UVec2 {
        self.resolution
    }

    pub fn film(&self) -> &Film {
        &self.film
    }

    /// Primary ray through `pixel`, jittered by `offset` in [0,1)^2. Pixel
    /// row 0 is the top of the image.
    pub fn generate_ray(&self, pixel: glam::UVec2, offset: glam::Vec2) -> Ray {
        let x = ((pixel.x as f32 + offset.x) / self.resolution.x as f32 - 0.5) * self.aspect;
        let y = 0.5 - (pixel.y as f32 + offset.y) / self.resolution.y as f32;
        let direction =
            (self.forward * self.half_cot_half_fov + self.right * x + self.up * y).normalize();
        Ray::new(self.eye, direction)
    }

    pub fn add_samples(&self, x: u32, y: u32, sum: Color, count: u32) {
        self.film.add_samples(x, y, sum, count);
    }
}
