mod dielectric;
mod fresnel;
mod lambert;
mod mirror;
mod plastic;

pub use dielectric::*;
pub use fresnel::*;
pub use lambert::*;
pub use mirror::*;
pub use plastic::*;

use std::ops::BitOr;

use crate::{
    core::color::Color,
    sampler::Sampler,
};

/// Mask of scattering lobes a BSDF may produce, and of lobes a caller is
/// asking for. Specular lobes are delta distributions: they carry no
/// measurable density, so `eval` ignores them and `sample` reports `pdf = 0`
/// when one is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BsdfLobes(u32);

impl BsdfLobes {
    pub const NONE: Self = Self(0);
    pub const DIFFUSE_REFLECTION: Self = Self(1 << 0);
    pub const GLOSSY_REFLECTION: Self = Self(1 << 1);
    pub const SPECULAR_REFLECTION: Self = Self(1 << 2);
    pub const DIFFUSE_TRANSMISSION: Self = Self(1 << 3);
    pub const GLOSSY_TRANSMISSION: Self = Self(1 << 4);
    pub const SPECULAR_TRANSMISSION: Self = Self(1 << 5);

    pub const ALL_SPECULAR: Self =
        Self(Self::SPECULAR_REFLECTION.0 | Self::SPECULAR_TRANSMISSION.0);
    pub const ALL: Self = Self((1 << 6) - 1);

    /// True when any lobe is shared between the two masks.
    pub fn test(self, other: BsdfLobes) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_pure_specular(self) -> bool {
        self.0 != 0 && self.0 & !Self::ALL_SPECULAR.0 == 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for BsdfLobes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// One scattering interaction at a surface point, in the local shading frame
/// (shading normal = +Z). `wi` points away from the surface toward the
/// previous path vertex.
pub struct SurfaceScatterEvent {
    pub wi: glam::Vec3A,
    pub wo: glam::Vec3A,
    pub uv: glam::Vec2,
    pub requested_lobe: BsdfLobes,
    pub sampled_lobe: BsdfLobes,
    pub throughput: Color,
    pub pdf: f32,
}

impl SurfaceScatterEvent {
    pub fn new(wi: glam::Vec3A, uv: glam::Vec2, requested_lobe: BsdfLobes) -> Self {
        Self {
            wi,
            wo: glam::Vec3A::Z,
            uv,
            requested_lobe,
            sampled_lobe: BsdfLobes::NONE,
            throughput: Color::WHITE,
            pdf: 0.0,
        }
    }

    /// Event with both directions fixed, for `eval`/`pdf` queries.
    pub fn for_directions(
        wi: glam::Vec3A,
        wo: glam::Vec3A,
        uv: glam::Vec2,
        requested_lobe: BsdfLobes,
    ) -> Self {
        let mut event = Self::new(wi, uv, requested_lobe);
        event.wo = wo;
        event
    }
}

/// Directional scattering model.
///
/// The three operations are mutually consistent: for non-specular lobes,
/// `eval(e) / pdf(e)` matches the `throughput` that `sample` reports for the
/// same pair of directions, up to the stochastic sub-lobe selection.
#[enum_dispatch::enum_dispatch(Bsdf)]
pub trait BsdfT {
    fn lobes(&self) -> BsdfLobes;

    /// Draws `wo` for the event's `wi`, filling `wo`, `throughput`, `pdf` and
    /// `sampled_lobe`. Returns false when the event cannot be satisfied.
    fn sample(&self, event: &mut SurfaceScatterEvent, sampler: &mut Sampler) -> bool;

    /// BSDF value times |cos(wo)| for the requested non-specular lobes.
    fn eval(&self, event: &SurfaceScatterEvent) -> Color;

    /// Density with which `sample` would have produced `event.wo`, restricted
    /// to the requested lobes.
    fn pdf(&self, event: &SurfaceScatterEvent) -> f32;
}

#[enum_dispatch::enum_dispatch]
#[derive(Debug)]
pub enum Bsdf {
    LambertBsdf,
    MirrorBsdf,
    DielectricBsdf,
    PlasticBsdf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobe_mask_operations() {
        let lobes = BsdfLobes::SPECULAR_REFLECTION | BsdfLobes::DIFFUSE_REFLECTION;
        assert!(lobes.test(BsdfLobes::SPECULAR_REFLECTION));
        assert!(lobes.test(BsdfLobes::DIFFUSE_REFLECTION));
        assert!(!lobes.test(BsdfLobes::DIFFUSE_TRANSMISSION));
        assert!(!lobes.is_pure_specular());
        assert!(BsdfLobes::ALL_SPECULAR.is_pure_specular());
        assert!(!BsdfLobes::NONE.is_pure_specular());
    }
}
