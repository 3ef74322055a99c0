use crate::core::color::Color;

use super::{MapJacobian, TextureT};

/// Procedural checkerboard.
#[derive(Debug)]
pub struct CheckerTexture {
    on_color: Color,
    off_color: Color,
    res_u: u32,
    res_v: u32,
}

impl CheckerTexture {
    pub fn new(on_color: Color, off_color: Color, res_u: u32, res_v: u32) -> Self {
        Self {
            on_color,
            off_color,
            res_u: res_u.max(1),
            res_v: res_v.max(1),
        }
    }
}

impl TextureT for CheckerTexture {
    fn lookup(&self, uv: glam::Vec2) -> Color {
        let iu = (uv.x * self.res_u as f32).floor() as i64;
        let iv = (uv.y * self.res_v as f32).floor() as i64;
        if (iu + iv).rem_euclid(2) == 0 {
            self.on_color
        } else {
            self.off_color
        }
    }

    fn derivatives(&self, _uv: glam::Vec2) -> glam::Vec2 {
        // Piecewise constant; the central difference is zero almost
        // everywhere.
        glam::Vec2::ZERO
    }

    fn minimum(&self) -> Color {
        self.on_color.min_elementwise(self.off_color)
    }

    fn maximum(&self) -> Color {
        self.on_color.max_elementwise(self.off_color)
    }

    fn average(&self) -> Color {
        (self.on_color + self.off_color) * 0.5
    }

    fn is_constant(&self) -> bool {
        false
    }

    fn make_samplable(&self, _jacobian: MapJacobian) {}

    fn sample(&self, _jacobian: MapJacobian, u: glam::Vec2) -> glam::Vec2 {
        u
    }

    fn pdf(&self, _jacobian: MapJacobian, _uv: glam::Vec2) -> f32 {
        1.0
    }
}
