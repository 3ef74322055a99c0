use crate::core::color::Color;

use super::{MapJacobian, TextureT};

#[derive(Debug)]
pub struct ConstantTexture {
    value: Color,
}

impl ConstantTexture {
    pub fn new(value: Color) -> Self {
        Self { value }
    }
}

impl TextureT for ConstantTexture {
    fn lookup(&self, _uv: glam::Vec2) -> Color {
        self.value
    }

    fn derivatives(&self, _uv: glam::Vec2) -> glam::Vec2 {
        glam::Vec2::ZERO
    }

    fn minimum(&self) -> Color {
        self.value
    }

    fn maximum(&self) -> Color {
        self.value
    }

    fn average(&self) -> Color {
        self.value
    }

    fn is_constant(&self) -> bool {
        true
    }

    fn make_samplable(&self, _jacobian: MapJacobian) {}

    fn sample(&self, _jacobian: MapJacobian, u: glam::Vec2) -> glam::Vec2 {
        u
    }

    fn pdf(&self, _jacobian: MapJacobian, _uv: glam::Vec2) -> f32 {
        1.0
    }
}
