//! Mappings from uniform unit-square variates to directions and surface
//! points, together with their densities.

use std::f32::consts::{FRAC_1_PI, PI};

pub fn cosine_hemisphere(u: glam::Vec2) -> glam::Vec3A {
    let phi = u.x * 2.0 * PI;
    let (sin_phi, cos_phi) = phi.sin_cos();
    let sin_theta = u.y.sqrt();
    let cos_theta = (1.0 - u.y).max(0.0).sqrt();
    glam::Vec3A::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

pub fn cosine_hemisphere_pdf(d: glam::Vec3A) -> f32 {
    d.z.abs() * FRAC_1_PI
}

pub fn uniform_sphere(u: glam::Vec2) -> glam::Vec3A {
    let phi = u.x * 2.0 * PI;
    let (sin_phi, cos_phi) = phi.sin_cos();
    let cos_theta = 1.0 - 2.0 * u.y;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    glam::Vec3A::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

pub fn uniform_sphere_pdf() -> f32 {
    0.25 * FRAC_1_PI
}

/// Uniform direction inside the cone around +Z with `cos_theta_max` aperture.
pub fn uniform_sphere_cap(u: glam::Vec2, cos_theta_max: f32) -> glam::Vec3A {
    let phi = u.x * 2.0 * PI;
    let (sin_phi, cos_phi) = phi.sin_cos();
    let cos_theta = 1.0 - u.y * (1.0 - cos_theta_max);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    glam::Vec3A::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

pub fn uniform_sphere_cap_pdf(cos_theta_max: f32) -> f32 {
    0.5 * FRAC_1_PI / (1.0 - cos_theta_max)
}

pub fn uniform_disk(u: glam::Vec2) -> glam::Vec2 {
    let phi = u.x * 2.0 * PI;
    let r = u.y.sqrt();
    glam::Vec2::new(r * phi.cos(), r * phi.sin())
}

pub fn uniform_triangle(
    u: glam::Vec2,
    p0: glam::Vec3A,
    p1: glam::Vec3A,
    p2: glam::Vec3A,
) -> glam::Vec3A {
    let mut a = u.x;
    let mut b = u.y;
    if a + b > 1.0 {
        a = 1.0 - a;
        b = 1.0 - b;
    }
    p0 + (p1 - p0) * a + (p2 - p0) * b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_hemisphere_stays_upper() {
        for i in 0..64 {
            let u = glam::Vec2::new((i as f32 + 0.5) / 64.0, ((i * 7) % 64) as f32 / 64.0);
            let d = cosine_hemisphere(u);
            assert!(d.z >= 0.0);
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_sphere_cap_within_aperture() {
        let cos_max = (30.0f32).to_radians().cos();
        for i in 0..64 {
            let u = glam::Vec2::new((i as f32 + 0.5) / 64.0, ((i * 13) % 64) as f32 / 64.0);
            let d = uniform_sphere_cap(u, cos_max);
            assert!(d.z >= cos_max - 1e-5);
        }
    }

    #[test]
    fn test_triangle_sample_inside() {
        let p0 = glam::Vec3A::ZERO;
        let p1 = glam::Vec3A::X;
        let p2 = glam::Vec3A::Y;
        for i in 0..32 {
            let u = glam::Vec2::new((i as f32 + 0.5) / 32.0, ((i * 11) % 32) as f32 / 32.0);
            let p = uniform_triangle(u, p0, p1, p2);
            assert!(p.x >= -1e-6 && p.y >= -1e-6 && p.x + p.y <= 1.0 + 1e-6);
        }
    }
}
