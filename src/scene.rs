use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    bsdf::Bsdf,
    camera::Camera,
    core::ray::Ray,
    primitive::{Hit, Primitive, PrimitiveT},
    texture::Texture,
};

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub spp: u32,
    pub use_sobol: bool,
    pub use_adaptive_sampling: bool,
    pub max_bounces: u32,
    pub output_path: PathBuf,
    pub hdr_output_path: Option<PathBuf>,
    pub variance_output_path: Option<PathBuf>,
    pub resume_file: Option<PathBuf>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            spp: 64,
            use_sobol: true,
            use_adaptive_sampling: true,
            max_bounces: 16,
            output_path: PathBuf::from("render.png"),
            hdr_output_path: None,
            variance_output_path: None,
            resume_file: None,
        }
    }
}

/// The fully materialized world: flat arenas of BSDFs and textures, the
/// primitives indexing into them, one camera and the render settings.
/// Immutable and freely shared across workers once prepared.
#[derive(Debug)]
pub struct Scene {
    pub primitives: Vec<Primitive>,
    pub bsdfs: Vec<Arc<Bsdf>>,
    pub textures: Vec<Arc<Texture>>,
    pub camera: Camera,
    pub settings: RendererSettings,
    lights: Vec<usize>,
}

impl Scene {
    pub fn new(
        primitives: Vec<Primitive>,
        bsdfs: Vec<Arc<Bsdf>>,
        textures: Vec<Arc<Texture>>,
        camera: Camera,
        settings: RendererSettings,
    ) -> Self {
        Self {
            primitives,
            bsdfs,
            textures,
            camera,
            settings,
            lights: Vec::new(),
        }
    }

    /// Builds acceleration structures and sampling tables. Single-threaded by
    /// construction; everything it publishes is read-only afterwards.
    pub fn prepare_for_render(&mut self) {
        self.lights.clear();
        for (i, prim) in self.primitives.iter_mut().enumerate() {
            prim.prepare_for_render();
            if prim.emission().is_some() && !prim.is_delta() {
                prim.make_samplable();
                self.lights.push(i);
            }
        }
    }

    pub fn cleanup_after_render(&mut self) {
        for prim in &mut self.primitives {
            prim.cleanup_after_render();
        }
        self.lights.clear();
    }

    /// Indices of samplable emissive primitives.
    pub fn lights(&self) -> &[usize] {
        &self.lights
    }

    /// Closest hit across all primitives.
    pub fn intersect(&self, ray: &Ray) -> Option<(usize, Hit)> {
        let mut t_max = f32::MAX;
        let mut best = None;
        for (i, prim) in self.primitives.iter().enumerate() {
            if let Some(hit) = prim.intersect(ray, t_max) {
                t_max = hit.t;
                best = Some((i, hit));
            }
        }
        best
    }

    pub fn occluded(&self, ray: &Ray, t_max: f32) -> bool {
        self.primitives
            .iter()
            .any(|prim| prim.occluded(ray, t_max))
    }

    /// Picks a light for next-event estimation, weighted by each light's
    /// radiance estimate toward `p` when every light can provide one. Any
    /// light answering with the "unknown" sentinel drops the whole selection
    /// back to uniform. Returns the light's primitive index and its selection
    /// probability.
    pub fn pick_light(&self, p: glam::Vec3A, u: f32) -> Option<(usize, f32)> {
        if self.lights.is_empty() {
            return None;
        }

        match self.light_weight_total(p) {
            Some(total) => {
                let target = u * total;
                let mut acc = 0.0;
                for &i in &self.lights {
                    let w = self.primitives[i].approximate_radiance(p);
                    acc += w;
                    if target < acc {
                        return Some((i, w / total));
                    }
                }
                let last = *self.lights.last().unwrap();
                Some((
                    last,
                    self.primitives[last].approximate_radiance(p) / total,
                ))
            }
            None => {
                let n = self.lights.len();
                let idx = ((u * n as f32) as usize).min(n - 1);
                Some((self.lights[idx], 1.0 / n as f32))
            }
        }
    }

    /// Probability with which `pick_light` would select the given primitive.
    pub fn light_pick_pdf(&self, p: glam::Vec3A, prim_index: usize) -> f32 {
        if !self.lights.contains(&prim_index) {
            return 0.0;
        }
        match self.light_weight_total(p) {
            Some(total) => self.primitives[prim_index].approximate_radiance(p) / total,
            None => 1.0 / self.lights.len() as f32,
        }
    }

    fn light_weight_total(&self, p: glam::Vec3A) -> Option<f32> {
        let mut total = 0.0;
        for &i in &self.lights {
            let w = self.primitives[i].approximate_radiance(p);
            if w < 0.0 {
                return None;
            }
            total += w;
        }
        if total > 0.0 {
            Some(total)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraParameters;
    use crate::core::color::Color;
    use crate::primitive::{InfiniteSphereCap, Quad, Sphere, TriangleMesh, TriangleI, Vertex};
    use crate::texture::ConstantTexture;

    fn test_camera() -> Camera {
        Camera::new(CameraParameters {
            eye: glam::Vec3A::ZERO,
            forward: -glam::Vec3A::Z,
            up: glam::Vec3A::Y,
            fov_deg: 60.0,
            resolution: glam::UVec2::new(4, 4),
        })
    }

    fn white_tex() -> Arc<Texture> {
        Arc::new(ConstantTexture::new(Color::WHITE).into())
    }

    #[test]
    fn test_prepare_collects_emissive_primitives() {
        let emissive = Quad::new(
            glam::Vec3A::new(-1.0, -1.0, -2.0),
            glam::Vec3A::new(2.0, 0.0, 0.0),
            glam::Vec3A::new(0.0, 2.0, 0.0),
            0,
        )
        .with_emission(white_tex());
        let dark = Sphere::new(glam::Vec3A::new(0.0, 0.0, -5.0), 1.0, 0);

        let mut scene = Scene::new(
            vec![emissive.into(), dark.into()],
            Vec::new(),
            Vec::new(),
            test_camera(),
            RendererSettings::default(),
        );
        scene.prepare_for_render();
        assert_eq!(scene.lights(), &[0]);
        assert!(scene.primitives[0].is_samplable());
    }

    #[test]
    fn test_cleanup_releases_render_state() {
        let emissive = Quad::new(
            glam::Vec3A::new(-1.0, -1.0, -2.0),
            glam::Vec3A::new(2.0, 0.0, 0.0),
            glam::Vec3A::new(0.0, 2.0, 0.0),
            0,
        )
        .with_emission(white_tex());
        let mut scene = Scene::new(
            vec![emissive.into()],
            Vec::new(),
            Vec::new(),
            test_camera(),
            RendererSettings::default(),
        );
        scene.prepare_for_render();
        assert!(!scene.lights().is_empty());

        scene.cleanup_after_render();
        assert!(scene.lights().is_empty());
        assert!(!scene.primitives[0].is_samplable());
    }

    #[test]
    fn test_intersect_returns_closest() {
        let near = Sphere::new(glam::Vec3A::new(0.0, 0.0, -2.0), 0.5, 0);
        let far = Sphere::new(glam::Vec3A::new(0.0, 0.0, -6.0), 0.5, 0);
        let mut scene = Scene::new(
            vec![far.into(), near.into()],
            Vec::new(),
            Vec::new(),
            test_camera(),
            RendererSettings::default(),
        );
        scene.prepare_for_render();

        let ray = Ray::new(glam::Vec3A::ZERO, -glam::Vec3A::Z);
        let (idx, hit) = scene.intersect(&ray).unwrap();
        assert_eq!(idx, 1);
        assert!((hit.t - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_unknown_radiance_forces_uniform_selection() {
        // A mesh light reports the unknown sentinel, so selection must not
        // trust the other light's estimate either.
        let verts = vec![
            Vertex::at(glam::Vec3A::new(0.0, 0.0, -3.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(1.0, 0.0, -3.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(0.0, 1.0, -3.0), glam::Vec2::ZERO),
        ];
        let mesh = TriangleMesh::new(verts, vec![TriangleI::new(0, 1, 2)], vec![0], false, false)
            .with_emission(white_tex());
        let cap = InfiniteSphereCap::new(white_tex(), glam::Vec3A::Y, 5.0);

        let mut scene = Scene::new(
            vec![mesh.into(), cap.into()],
            Vec::new(),
            Vec::new(),
            test_camera(),
            RendererSettings::default(),
        );
        scene.prepare_for_render();
        assert_eq!(scene.lights().len(), 2);

        let p = glam::Vec3A::ZERO;
        assert_eq!(scene.light_pick_pdf(p, 0), 0.5);
        assert_eq!(scene.light_pick_pdf(p, 1), 0.5);
    }
}
