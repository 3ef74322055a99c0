use crate::core::{bbox::Bbox, ray::Ray};

/// Triangle-level intersection result, in barycentric coordinates
/// (`u` weights vertex 1, `v` weights vertex 2).
#[derive(Debug, Clone, Copy)]
pub struct MeshHit {
    pub t: f32,
    pub tri: u32,
    pub u: f32,
    pub v: f32,
}

/// Bounding-volume hierarchy over a triangle soup. The only consumer is the
/// triangle-mesh primitive; everything else sees rays and hits.
#[derive(Debug)]
pub struct Bvh {
    root: Option<Box<Node>>,
    // Triangle vertex positions in traversal order.
    tris: Vec<[glam::Vec3A; 3]>,
    // Maps traversal order back to input triangle indices.
    ids: Vec<u32>,
}

#[derive(Debug)]
struct Node {
    bbox: Bbox,
    lc: Option<Box<Node>>,
    rc: Option<Box<Node>>,
    start: usize,
    end: usize,
}

const MAX_LEAF_SIZE: usize = 4;
const BUCKET_COUNT: usize = 12;

impl Bvh {
    pub fn build(tris: Vec<[glam::Vec3A; 3]>) -> Self {
        if tris.is_empty() {
            return Self {
                root: None,
                tris,
                ids: Vec::new(),
            };
        }

        let mut order: Vec<u32> = (0..tris.len() as u32).collect();
        let bboxes: Vec<Bbox> = tris.iter().map(|t| Bbox::from_points(t)).collect();

        let mut total = Bbox::empty();
        for b in &bboxes {
            total = total.merge(*b);
        }

        let root = Some(Self::build_node(&bboxes, &mut order, 0, tris.len(), total));

        let ordered_tris = order.iter().map(|&i| tris[i as usize]).collect();
        Self {
            root,
            tris: ordered_tris,
            ids: order,
        }
    }

    fn build_node(
        bboxes: &[Bbox],
        order: &mut [u32],
        start: usize,
        end: usize,
        bbox: Bbox,
    ) -> Box<Node> {
        let mut node = Box::new(Node {
            bbox,
            lc: None,
            rc: None,
            start,
            end,
        });
        if end - start <= MAX_LEAF_SIZE {
            return node;
        }

        // Bucketed surface-area-heuristic split along the widest centroid
        // axis.
        let mut centroid_bounds = Bbox::empty();
        for &i in &order[start..end] {
            centroid_bounds.grow(bboxes[i as usize].centroid());
        }
        let axis = centroid_bounds.max_extent_axis();
        let extent = centroid_bounds.p_max[axis] - centroid_bounds.p_min[axis];
        if extent < 1e-6 {
            return node;
        }

        let bucket_of = |i: u32| -> usize {
            let c = bboxes[i as usize].centroid()[axis];
            let f = (c - centroid_bounds.p_min[axis]) / extent * BUCKET_COUNT as f32;
            (f as usize).min(BUCKET_COUNT - 1)
        };

        let mut bucket_bounds = [Bbox::empty(); BUCKET_COUNT];
        let mut bucket_counts = [0usize; BUCKET_COUNT];
        for &i in &order[start..end] {
            let b = bucket_of(i);
            bucket_bounds[b] = bucket_bounds[b].merge(bboxes[i as usize]);
            bucket_counts[b] += 1;
        }

        let mut best_cost = f32::MAX;
        let mut best_split = 0;
        for split in 1..BUCKET_COUNT {
            let mut left = Bbox::empty();
            let mut right = Bbox::empty();
            let mut left_count = 0;
            for b in 0..split {
                left = left.merge(bucket_bounds[b]);
                left_count += bucket_counts[b];
            }
            for b in split..BUCKET_COUNT {
                right = right.merge(bucket_bounds[b]);
            }
            let right_count = (end - start) - left_count;
            if left_count == 0 || right_count == 0 {
                continue;
            }
            let cost = left.surface_area() * left_count as f32
                + right.surface_area() * right_count as f32;
            if cost < best_cost {
                best_cost = cost;
                best_split = split;
            }
        }
        if best_split == 0 {
            return node;
        }

        let mid = start + partition(&mut order[start..end], |i| bucket_of(i) < best_split);
        if mid == start || mid == end {
            return node;
        }

        let mut left_bbox = Bbox::empty();
        for &i in &order[start..mid] {
            left_bbox = left_bbox.merge(bboxes[i as usize]);
        }
        let mut right_bbox = Bbox::empty();
        for &i in &order[mid..end] {
            right_bbox = right_bbox.merge(bboxes[i as usize]);
        }

        node.lc = Some(Self::build_node(bboxes, order, start, mid, left_bbox));
        node.rc = Some(Self::build_node(bboxes, order, mid, end, right_bbox));
        node
    }

    /// Closest hit with `t` in `(ray.t_min, t_max)`. Back-facing triangles
    /// are skipped when `cull_backfaces` is set.
    pub fn intersect(&self, ray: &Ray, t_max: f32, cull_backfaces: bool) -> Option<MeshHit> {
        let root = self.root.as_ref()?;

        let mut best: Option<MeshHit> = None;
        let mut t_far = t_max;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !node.bbox.intersect_test(ray, t_far) {
                continue;
            }
            if node.lc.is_none() {
                for i in node.start..node.end {
                    if let Some((t, u, v)) =
                        intersect_triangle(ray, &self.tris[i], cull_backfaces)
                    {
                        if t > ray.t_min && t < t_far {
                            t_far = t;
                            best = Some(MeshHit {
                                t,
                                tri: self.ids[i],
                                u,
                                v,
                            });
                        }
                    }
                }
            } else {
                stack.push(node.lc.as_ref().unwrap());
                stack.push(node.rc.as_ref().unwrap());
            }
        }
        best
    }

    /// Any-hit query, cheaper than `intersect`.
    pub fn occluded(&self, ray: &Ray, t_max: f32, cull_backfaces: bool) -> bool {
        let root = match &self.root {
            Some(root) => root,
            None => return false,
        };

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !node.bbox.intersect_test(ray, t_max) {
                continue;
            }
            if node.lc.is_none() {
                for i in node.start..node.end {
                    if let Some((t, _, _)) =
                        intersect_triangle(ray, &self.tris[i], cull_backfaces)
                    {
                        if t > ray.t_min && t < t_max {
                            return true;
                        }
                    }
                }
            } else {
                stack.push(node.lc.as_ref().unwrap());
                stack.push(node.rc.as_ref().unwrap());
            }
        }
        false
    }
}

/// Moeller-Trumbore. Returns (t, u, v) with u weighting vertex 1 and v
/// weighting vertex 2.
fn intersect_triangle(
    ray: &Ray,
    tri: &[glam::Vec3A; 3],
    cull_backfaces: bool,
) -> Option<(f32, f32, f32)> {
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let p = ray.direction.cross(e2);
    let det = e1.dot(p);
    // det < 0 means the geometric normal faces along the ray.
    if cull_backfaces {
        if det < 1e-9 {
            return None;
        }
    } else if det.abs() < 1e-9 {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - tri[0];
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    Some((t, u, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad_tris() -> Vec<[glam::Vec3A; 3]> {
        let p = [
            glam::Vec3A::new(-1.0, -1.0, 0.0),
            glam::Vec3A::new(1.0, -1.0, 0.0),
            glam::Vec3A::new(1.0, 1.0, 0.0),
            glam::Vec3A::new(-1.0, 1.0, 0.0),
        ];
        vec![[p[0], p[1], p[2]], [p[0], p[2], p[3]]]
    }

    #[test]
    fn test_hits_closest_triangle() {
        let mut tris = unit_quad_tris();
        // A second quad behind the first.
        for tri in unit_quad_tris() {
            tris.push(tri.map(|p| p + glam::Vec3A::new(0.0, 0.0, -1.0)));
        }
        let bvh = Bvh::build(tris);
        let ray = Ray::new(glam::Vec3A::new(0.2, 0.3, 2.0), -glam::Vec3A::Z);
        let hit = bvh.intersect(&ray, f32::MAX, false).unwrap();
        assert!((hit.t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_occlusion_respects_range() {
        let bvh = Bvh::build(unit_quad_tris());
        let ray = Ray::new(glam::Vec3A::new(0.0, 0.0, 2.0), -glam::Vec3A::Z);
        assert!(bvh.occluded(&ray, f32::MAX, false));
        assert!(!bvh.occluded(&ray, 1.5, false));
    }

    #[test]
    fn test_backface_culling() {
        let bvh = Bvh::build(unit_quad_tris());
        // Both triangles wind counter-clockwise seen from +Z, so a ray from
        // behind sees only back faces.
        let front = Ray::new(glam::Vec3A::new(0.0, 0.0, 2.0), -glam::Vec3A::Z);
        let behind = Ray::new(glam::Vec3A::new(0.0, 0.0, -2.0), glam::Vec3A::Z);
        assert!(bvh.intersect(&front, f32::MAX, true).is_some());
        assert!(bvh.intersect(&behind, f32::MAX, true).is_none());
        assert!(bvh.intersect(&behind, f32::MAX, false).is_some());
    }

    #[test]
    fn test_many_triangles_match_linear_scan() {
        // A small grid of disjoint triangles; every cell must be reachable.
        let mut tris = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                let o = glam::Vec3A::new(x as f32, y as f32, 0.0);
                tris.push([
                    o,
                    o + glam::Vec3A::new(0.8, 0.0, 0.0),
                    o + glam::Vec3A::new(0.0, 0.8, 0.0),
                ]);
            }
        }
        let bvh = Bvh::build(tris);
        for y in 0..8 {
            for x in 0..8 {
                let ray = Ray::new(
                    glam::Vec3A::new(x as f32 + 0.2, y as f32 + 0.2, 1.0),
                    -glam::Vec3A::Z,
                );
                let hit = bvh.intersect(&ray, f32::MAX, false).unwrap();
                assert_eq!(hit.tri, (x + y * 8) as u32);
            }
        }
    }
}

fn partition<T, F: FnMut(T) -> bool>(slice: &mut [T], mut pred: F) -> usize
where
    T: Copy,
{
    let mut first = 0;
    for i in 0..slice.len() {
        if pred(slice[i]) {
            slice.swap(first, i);
            first += 1;
        }
    }
    first
}
