mod bitmap;
mod checker;
mod constant;

pub use bitmap::*;
pub use checker::*;
pub use constant::*;

use crate::core::color::Color;

/// Measure transform under which a texture is importance sampled: flat over
/// the unit square, or over the sphere parameterized by (u, v) where rows
/// pick up a sin(theta) weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapJacobian {
    Planar,
    Spherical,
}

impl MapJacobian {
    pub(crate) fn index(self) -> usize {
        match self {
            MapJacobian::Planar => 0,
            MapJacobian::Spherical => 1,
        }
    }
}

/// 2D sampleable function over unit UV.
///
/// `lookup` uses the convention `v' = 1 - v`: texel row 0 maps to v = 1.
/// `sample`/`pdf` are only meaningful after `make_samplable` for the same
/// jacobian; non-bitmap variants are uniform and need no preparation.
#[enum_dispatch::enum_dispatch(Texture)]
pub trait TextureT {
    fn lookup(&self, uv: glam::Vec2) -> Color;

    /// Central-difference filter footprint of the texture at `uv`, scaled by
    /// the resolution, for filtered lookups and bump mapping.
    fn derivatives(&self, uv: glam::Vec2) -> glam::Vec2;

    fn minimum(&self) -> Color;

    fn maximum(&self) -> Color;

    fn average(&self) -> Color;

    fn is_constant(&self) -> bool;

    fn make_samplable(&self, jacobian: MapJacobian);

    fn sample(&self, jacobian: MapJacobian, u: glam::Vec2) -> glam::Vec2;

    fn pdf(&self, jacobian: MapJacobian, uv: glam::Vec2) -> f32;
}

#[enum_dispatch::enum_dispatch]
#[derive(Debug)]
pub enum Texture {
    ConstantTexture,
    BitmapTexture,
    CheckerTexture,
}
