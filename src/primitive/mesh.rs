use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    accel::Bvh,
    core::{bbox::Bbox, distribution::Distribution1D, ray::Ray, warp},
    core::coord::Coordinate,
    sampler::{Sampler, SamplerT},
    texture::Texture,
};

use super::{Hit, InboundSample, IntersectionInfo, OutboundSample, PrimitiveT};

/// Dihedral limit below which smoothed vertex normals split instead of
/// averaging.
pub const DEFAULT_SMOOTHING_THRESHOLD: f32 = 0.891006524; // cos(pi * 0.15)

#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub pos: glam::Vec3A,
    pub normal: glam::Vec3A,
    pub uv: glam::Vec2,
}

impl Vertex {
    pub fn new(pos: glam::Vec3A, normal: glam::Vec3A, uv: glam::Vec2) -> Self {
        Self { pos, normal, uv }
    }

    pub fn at(pos: glam::Vec3A, uv: glam::Vec2) -> Self {
        Self::new(pos, glam::Vec3A::Z, uv)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TriangleI {
    pub vs: [u32; 3],
    /// Index into the mesh's BSDF list (not the scene arena).
    pub material: u32,
}

impl TriangleI {
    pub fn new(v0: u32, v1: u32, v2: u32) -> Self {
        Self {
            vs: [v0, v1, v2],
            material: 0,
        }
    }
}

#[derive(Debug)]
pub struct TriangleMesh {
    verts: Vec<Vertex>,
    tris: Vec<TriangleI>,
    /// Scene BSDF arena indices addressed by `TriangleI::material`.
    bsdfs: Vec<usize>,
    emission: Option<Arc<Texture>>,
    transform: glam::Affine3A,
    smoothed: bool,
    backface_culling: bool,
    smoothing_threshold: f32,
    normals_computed: bool,

    // State owned by a render job, built in prepare_for_render.
    tf_verts: Vec<Vertex>,
    bounds: Bbox,
    total_area: f32,
    bvh: Option<Bvh>,
    tri_sampler: Option<Distribution1D>,
}

impl TriangleMesh {
    pub fn new(
        verts: Vec<Vertex>,
        tris: Vec<TriangleI>,
        bsdfs: Vec<usize>,
        smoothed: bool,
        backface_culling: bool,
    ) -> Self {
        Self {
            verts,
            tris,
            bsdfs,
            emission: None,
            transform: glam::Affine3A::IDENTITY,
            smoothed,
            backface_culling,
            smoothing_threshold: DEFAULT_SMOOTHING_THRESHOLD,
            normals_computed: false,
            tf_verts: Vec::new(),
            bounds: Bbox::empty(),
            total_area: 0.0,
            bvh: None,
            tri_sampler: None,
        }
    }

    pub fn with_transform(mut self, transform: glam::Affine3A) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_emission(mut self, emission: Arc<Texture>) -> Self {
        self.emission = Some(emission);
        self
    }

    pub fn with_smoothing_threshold(mut self, cos_dihedral: f32) -> Self {
        self.smoothing_threshold = cos_dihedral;
        self
    }

    pub fn triangle_count(&self) -> usize {
        self.tris.len()
    }

    pub fn vertex(&self, index: usize) -> &Vertex {
        &self.verts[index]
    }

    fn unnormalized_geometric_normal_at(&self, triangle: usize) -> glam::Vec3A {
        let t = &self.tris[triangle];
        let p0 = self.tf_verts[t.vs[0] as usize].pos;
        let p1 = self.tf_verts[t.vs[1] as usize].pos;
        let p2 = self.tf_verts[t.vs[2] as usize].pos;
        (p1 - p0).cross(p2 - p0)
    }

    fn normal_at(&self, triangle: usize, u: f32, v: f32) -> glam::Vec3A {
        let t = &self.tris[triangle];
        let n0 = self.tf_verts[t.vs[0] as usize].normal;
        let n1 = self.tf_verts[t.vs[1] as usize].normal;
        let n2 = self.tf_verts[t.vs[2] as usize].normal;
        ((1.0 - u - v) * n0 + u * n1 + v * n2).normalize()
    }

    fn uv_at(&self, triangle: usize, u: f32, v: f32) -> glam::Vec2 {
        let t = &self.tris[triangle];
        let uv0 = self.tf_verts[t.vs[0] as usize].uv;
        let uv1 = self.tf_verts[t.vs[1] as usize].uv;
        let uv2 = self.tf_verts[t.vs[2] as usize].uv;
        (1.0 - u - v) * uv0 + u * uv1 + v * uv2
    }

    fn triangle_positions(&self, triangle: usize) -> [glam::Vec3A; 3] {
        let t = &self.tris[triangle];
        [
            self.tf_verts[t.vs[0] as usize].pos,
            self.tf_verts[t.vs[1] as usize].pos,
            self.tf_verts[t.vs[2] as usize].pos,
        ]
    }

    /// Averages face normals into vertex normals, splitting vertices where
    /// adjacent faces disagree by more than the dihedral threshold.
    pub fn calc_smooth_vertex_normals(&mut self) {
        let split_limit = self.smoothing_threshold;

        let mut geometric_n = vec![glam::Vec3A::ZERO; self.verts.len()];
        let mut pos_to_vert: HashMap<[u32; 3], Vec<u32>> = HashMap::new();
        for (i, vert) in self.verts.iter_mut().enumerate() {
            vert.normal = glam::Vec3A::ZERO;
            pos_to_vert
                .entry(pos_key(vert.pos))
                .or_default()
                .push(i as u32);
        }

        // First pass: assign a representative face normal per vertex and
        // split where faces disagree.
        for ti in 0..self.tris.len() {
            let [p0, p1, p2] = {
                let t = &self.tris[ti];
                [
                    self.verts[t.vs[0] as usize].pos,
                    self.verts[t.vs[1] as usize].pos,
                    self.verts[t.vs[2] as usize].pos,
                ]
            };
            let mut normal = (p1 - p0).cross(p2 - p0);
            if normal == glam::Vec3A::ZERO {
                normal = glam::Vec3A::Y;
            } else {
                normal = normal.normalize();
            }

            for i in 0..3 {
                let vi = self.tris[ti].vs[i] as usize;
                let n = geometric_n[vi];
                if n == glam::Vec3A::ZERO {
                    geometric_n[vi] = normal;
                } else if n.dot(normal) < split_limit {
                    self.verts.push(self.verts[vi]);
                    geometric_n.push(normal);
                    self.tris[ti].vs[i] = (self.verts.len() - 1) as u32;
                }
            }
        }

        // Second pass: accumulate area-weighted face normals into every
        // original vertex at the same position whose representative normal
        // agrees.
        for ti in 0..self.tris.len() {
            let t = self.tris[ti];
            let p0 = self.verts[t.vs[0] as usize].pos;
            let p1 = self.verts[t.vs[1] as usize].pos;
            let p2 = self.verts[t.vs[2] as usize].pos;
            let normal = (p1 - p0).cross(p2 - p0);
            let normalized = normal.normalize_or_zero();

            for i in 0..3 {
                let pos = self.verts[t.vs[i] as usize].pos;
                if let Some(shared) = pos_to_vert.get(&pos_key(pos)) {
                    for &other in shared {
                        if geometric_n[other as usize].dot(normalized) >= split_limit {
                            self.verts[other as usize].normal += normal;
                        }
                    }
                }
            }
        }

        for (i, vert) in self.verts.iter_mut().enumerate() {
            if vert.normal == glam::Vec3A::ZERO {
                vert.normal = geometric_n[i];
            } else {
                vert.normal = vert.normal.normalize();
            }
        }
    }
}

fn pos_key(p: glam::Vec3A) -> [u32; 3] {
    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
}

fn triangle_area(p0: glam::Vec3A, p1: glam::Vec3A, p2: glam::Vec3A) -> f32 {
    (p1 - p0).cross(p2 - p0).length() * 0.5
}

impl PrimitiveT for TriangleMesh {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let bvh = self.bvh.as_ref()?;
        let mesh_hit = bvh.intersect(ray, t_max, self.backface_culling)?;
        let ng = self.unnormalized_geometric_normal_at(mesh_hit.tri as usize);
        Some(Hit {
            t: mesh_hit.t,
            u: mesh_hit.u,
            v: mesh_hit.v,
            prim: mesh_hit.tri,
            ng,
            back_side: ng.dot(ray.direction) > 0.0,
        })
    }

    fn occluded(&self, ray: &Ray, t_max: f32) -> bool {
        match &self.bvh {
            Some(bvh) => bvh.occluded(ray, t_max, self.backface_culling),
            None => false,
        }
    }

    fn intersection_info(&self, hit: &Hit) -> IntersectionInfo {
        let tri = hit.prim as usize;
        let ng = hit.ng.normalize();
        let ns = if self.smoothed {
            self.normal_at(tri, hit.u, hit.v)
        } else {
            ng
        };
        let [p0, p1, p2] = self.triangle_positions(tri);
        IntersectionInfo {
            p: (1.0 - hit.u - hit.v) * p0 + hit.u * p1 + hit.v * p2,
            ng,
            ns,
            uv: self.uv_at(tri, hit.u, hit.v),
            bsdf: Some(self.bsdfs[self.tris[tri].material as usize]),
        }
    }

    fn tangent_space(&self, hit: &Hit) -> Option<(glam::Vec3A, glam::Vec3A)> {
        let t = &self.tris[hit.prim as usize];
        let p0 = self.tf_verts[t.vs[0] as usize].pos;
        let p1 = self.tf_verts[t.vs[1] as usize].pos;
        let p2 = self.tf_verts[t.vs[2] as usize].pos;
        let uv0 = self.tf_verts[t.vs[0] as usize].uv;
        let uv1 = self.tf_verts[t.vs[1] as usize].uv;
        let uv2 = self.tf_verts[t.vs[2] as usize].uv;

        let q1 = p1 - p0;
        let q2 = p2 - p0;
        let s1 = uv1.x - uv0.x;
        let t1 = uv1.y - uv0.y;
        let s2 = uv2.x - uv0.x;
        let t2 = uv2.y - uv0.y;
        let det = s1 * t2 - s2 * t1;
        if det.abs() < 1e-6 {
            return None;
        }
        let inv_det = 1.0 / det;
        let tangent = inv_det * (q1 * t2 - t1 * q2);
        let bitangent = inv_det * (q2 * s1 - s2 * q1);
        Some((tangent, bitangent))
    }

    fn bounds(&self) -> Bbox {
        self.bounds
    }

    fn is_samplable(&self) -> bool {
        self.tri_sampler.is_some()
    }

    fn make_samplable(&mut self) {
        if self.tri_sampler.is_some() {
            return;
        }
        let areas: Vec<f32> = (0..self.tris.len())
            .map(|i| {
                let [p0, p1, p2] = self.triangle_positions(i);
                triangle_area(p0, p1, p2)
            })
            .collect();
        self.total_area = areas.iter().sum();
        self.tri_sampler = Some(Distribution1D::new(areas));
    }

    fn sample_inbound(&self, p: glam::Vec3A, sampler: &mut Sampler) -> Option<InboundSample> {
        let tri_sampler = self.tri_sampler.as_ref()?;
        let mut u = sampler.next_1d();
        let idx = tri_sampler.warp(&mut u);

        let [p0, p1, p2] = self.triangle_positions(idx);
        let normal = (p1 - p0).cross(p2 - p0).normalize();

        let q = warp::uniform_triangle(sampler.next_2d(), p0, p1, p2);
        let l = q - p;
        let r_sq = l.length_squared();
        let dist = r_sq.sqrt();
        let d = l / dist;
        let cos_theta = -normal.dot(d);
        if cos_theta <= 0.0 {
            return None;
        }
        Some(InboundSample {
            d,
            dist,
            pdf: r_sq / (cos_theta * self.total_area),
        })
    }

    fn sample_outbound(&self, sampler: &mut Sampler) -> Option<OutboundSample> {
        let tri_sampler = self.tri_sampler.as_ref()?;
        let mut u = sampler.next_1d();
        let idx = tri_sampler.warp(&mut u);

        let [p0, p1, p2] = self.triangle_positions(idx);
        let normal = (p1 - p0).cross(p2 - p0).normalize();
        let frame = Coordinate::from_normal(normal);

        let p = warp::uniform_triangle(sampler.next_2d(), p0, p1, p2);
        let d_local = warp::cosine_hemisphere(sampler.next_2d());
        Some(OutboundSample {
            p,
            d: frame.to_world(d_local),
            pdf: warp::cosine_hemisphere_pdf(d_local) / self.total_area,
        })
    }

    fn inbound_pdf(
        &self,
        _hit: &Hit,
        info: &IntersectionInfo,
        p: glam::Vec3A,
        d: glam::Vec3A,
    ) -> f32 {
        (p - info.p).length_squared() / (-d.dot(info.ng) * self.total_area)
    }

    // There is no cheap reliable estimate for an arbitrary mesh.
    fn approximate_radiance(&self, _p: glam::Vec3A) -> f32 {
        -1.0
    }

    fn is_infinite(&self) -> bool {
        false
    }

    fn is_delta(&self) -> bool {
        self.verts.is_empty() || self.tris.is_empty()
    }

    fn emission(&self) -> Option<&Arc<Texture>> {
        self.emission.as_ref()
    }

    fn prepare_for_render(&mut self) {
        if self.smoothed && !self.normals_computed {
            self.calc_smooth_vertex_normals();
            self.normals_computed = true;
        }

        let bsdf_count = self.bsdfs.len().max(1);
        for t in &mut self.tris {
            t.material = t.material.min(bsdf_count as u32 - 1);
        }

        let normal_transform = glam::Mat3A::from(
            glam::Mat3::from_mat4(glam::Mat4::from(self.transform))
                .inverse()
                .transpose(),
        );
        self.tf_verts = self
            .verts
            .iter()
            .map(|v| Vertex {
                pos: self.transform.transform_point3a(v.pos),
                normal: (normal_transform * v.normal).normalize_or_zero(),
                uv: v.uv,
            })
            .collect();

        let mut bounds = Bbox::empty();
        for v in &self.tf_verts {
            bounds.grow(v.pos);
        }
        self.bounds = bounds;

        self.total_area = (0..self.tris.len())
            .map(|i| {
                let [p0, p1, p2] = self.triangle_positions(i);
                triangle_area(p0, p1, p2)
            })
            .sum();

        let tris: Vec<[glam::Vec3A; 3]> = (0..self.tris.len())
            .map(|i| self.triangle_positions(i))
            .collect();
        self.bvh = Some(Bvh::build(tris));
    }

    fn cleanup_after_render(&mut self) {
        self.bvh = None;
        self.tri_sampler = None;
        self.tf_verts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveT;

    fn quad_mesh() -> TriangleMesh {
        let verts = vec![
            Vertex::at(glam::Vec3A::new(-1.0, -1.0, 0.0), glam::Vec2::new(0.0, 0.0)),
            Vertex::at(glam::Vec3A::new(1.0, -1.0, 0.0), glam::Vec2::new(1.0, 0.0)),
            Vertex::at(glam::Vec3A::new(1.0, 1.0, 0.0), glam::Vec2::new(1.0, 1.0)),
            Vertex::at(glam::Vec3A::new(-1.0, 1.0, 0.0), glam::Vec2::new(0.0, 1.0)),
        ];
        let tris = vec![TriangleI::new(0, 1, 2), TriangleI::new(0, 2, 3)];
        let mut mesh = TriangleMesh::new(verts, tris, vec![0], false, false);
        mesh.prepare_for_render();
        mesh
    }

    #[test]
    fn test_intersect_reports_backside() {
        let mesh = quad_mesh();
        let front = Ray::new(glam::Vec3A::new(0.2, 0.1, 1.0), -glam::Vec3A::Z);
        let hit = mesh.intersect(&front, f32::MAX).unwrap();
        assert!(!hit.back_side);

        let behind = Ray::new(glam::Vec3A::new(0.2, 0.1, -1.0), glam::Vec3A::Z);
        let hit = mesh.intersect(&behind, f32::MAX).unwrap();
        assert!(hit.back_side);
    }

    #[test]
    fn test_intersection_info_interpolates_uv() {
        let mesh = quad_mesh();
        let ray = Ray::new(glam::Vec3A::new(0.5, -0.5, 1.0), -glam::Vec3A::Z);
        let hit = mesh.intersect(&ray, f32::MAX).unwrap();
        let info = mesh.intersection_info(&hit);
        assert!((info.uv.x - 0.75).abs() < 1e-4);
        assert!((info.uv.y - 0.25).abs() < 1e-4);
        assert!((info.p - glam::Vec3A::new(0.5, -0.5, 0.0)).length() < 1e-4);
        assert_eq!(info.bsdf, Some(0));
    }

    #[test]
    fn test_tangent_space_follows_uv_gradients() {
        let mesh = quad_mesh();
        let ray = Ray::new(glam::Vec3A::new(0.0, 0.0, 1.0), -glam::Vec3A::Z);
        let hit = mesh.intersect(&ray, f32::MAX).unwrap();
        let (t, b) = mesh.tangent_space(&hit).unwrap();
        // u grows along +x, v along +y, both spanning 2 world units.
        assert!((t.normalize() - glam::Vec3A::X).length() < 1e-4);
        assert!((b.normalize() - glam::Vec3A::Y).length() < 1e-4);
    }

    #[test]
    fn test_degenerate_uv_has_no_tangent_space() {
        let verts = vec![
            Vertex::at(glam::Vec3A::new(0.0, 0.0, 0.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(1.0, 0.0, 0.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(0.0, 1.0, 0.0), glam::Vec2::ZERO),
        ];
        let mut mesh = TriangleMesh::new(verts, vec![TriangleI::new(0, 1, 2)], vec![0], false, false);
        mesh.prepare_for_render();
        let ray = Ray::new(glam::Vec3A::new(0.2, 0.2, 1.0), -glam::Vec3A::Z);
        let hit = mesh.intersect(&ray, f32::MAX).unwrap();
        assert!(mesh.tangent_space(&hit).is_none());
    }

    #[test]
    fn test_smooth_normals_average_on_gentle_edges() {
        // Two triangles meeting at a very shallow angle share smoothed
        // normals across the seam.
        let tilt = 0.05f32;
        let verts = vec![
            Vertex::at(glam::Vec3A::new(-1.0, 0.0, 0.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(0.0, -1.0, 0.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(0.0, 1.0, 0.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(1.0, 0.0, tilt), glam::Vec2::ZERO),
        ];
        let tris = vec![TriangleI::new(0, 1, 2), TriangleI::new(1, 3, 2)];
        let mut mesh = TriangleMesh::new(verts, tris, vec![0], true, false);
        mesh.prepare_for_render();

        // No vertex split happened.
        assert_eq!(mesh.verts.len(), 4);
        // Shared vertices blend both face normals.
        let n = mesh.verts[1].normal;
        assert!(n.x.abs() > 1e-4);
        assert!(n.z > 0.9);
    }

    #[test]
    fn test_smooth_normals_split_on_hard_edges() {
        // A right-angle fold must not smooth across the crease.
        let verts = vec![
            Vertex::at(glam::Vec3A::new(-1.0, 0.0, 0.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(0.0, -1.0, 0.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(0.0, 1.0, 0.0), glam::Vec2::ZERO),
            Vertex::at(glam::Vec3A::new(0.0, 0.0, 1.0), glam::Vec2::ZERO),
        ];
        let tris = vec![TriangleI::new(0, 1, 2), TriangleI::new(1, 3, 2)];
        let mut mesh = TriangleMesh::new(verts, tris, vec![0], true, false);
        mesh.prepare_for_render();

        // The crease vertices were duplicated.
        assert!(mesh.verts.len() > 4);
    }

    #[test]
    fn test_area_sampling_pdf_consistency() {
        let mut mesh = quad_mesh();
        mesh.make_samplable();
        let mut sampler = Sampler::from(crate::sampler::UniformSampler::new(3));
        let p = glam::Vec3A::new(0.0, 0.0, 2.0);

        for _ in 0..256 {
            let sample = match mesh.sample_inbound(p, &mut sampler) {
                Some(s) => s,
                None => continue,
            };
            // pdf = r^2 / (cos * area), area = 4.
            let q = p + sample.d * sample.dist;
            let r_sq = (q - p).length_squared();
            let cos_theta = -glam::Vec3A::Z.dot(sample.d);
            let expected = r_sq / (cos_theta * 4.0);
            assert!(
                (sample.pdf - expected).abs() < 1e-3 * expected,
                "pdf {} vs {}",
                sample.pdf,
                expected
            );

            // And inbound_pdf agrees with the sample's pdf.
            let ray = Ray::new(p, sample.d);
            let hit = mesh.intersect(&ray, f32::MAX).unwrap();
            let info = mesh.intersection_info(&hit);
            let pdf = mesh.inbound_pdf(&hit, &info, p, sample.d);
            assert!((pdf - sample.pdf).abs() < 1e-2 * sample.pdf);
        }
    }

    #[test]
    fn test_empty_mesh_is_delta() {
        let mesh = TriangleMesh::new(Vec::new(), Vec::new(), vec![0], false, false);
        assert!(mesh.is_delta());
    }
}
