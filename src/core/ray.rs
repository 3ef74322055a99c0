#[derive(Debug, Copy, Clone)]
pub struct Ray {
    pub origin: glam::Vec3A,
    pub direction: glam::Vec3A,
    pub t_min: f32,
}

impl Ray {
    pub const T_MIN_EPS: f32 = 0.0001;

    /// Far distance used for directions that never land on finite geometry.
    pub const T_INFINITE: f32 = 1.0e30;

    pub fn new(origin: glam::Vec3A, direction: glam::Vec3A) -> Self {
        Self {
            origin,
            direction,
            t_min: Self::T_MIN_EPS,
        }
    }

    pub fn with_t_min(origin: glam::Vec3A, direction: glam::Vec3A, t_min: f32) -> Self {
        Self {
            origin,
            direction,
            t_min,
        }
    }

    pub fn point_at(&self, t: f32) -> glam::Vec3A {
        self.origin + self.direction * t
    }
}
