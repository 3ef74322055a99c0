/// Orthonormal shading frame. BSDFs work in the local space where the
/// shading normal is +Z.
#[derive(Copy, Clone)]
#[derive(Debug)]
pub struct Coordinate {
    local_to_world: glam::Mat3A,
    world_to_local: glam::Mat3A,
}

impl Coordinate {
    pub fn from_normal(n: glam::Vec3A) -> Self {
        // Pixar's branchless frame construction.
        let sign = 1.0_f32.copysign(n.z);
        let a = -1.0 / (sign + n.z);
        let b = n.x * n.y * a;
        let t = glam::Vec3A::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
        let bt = glam::Vec3A::new(b, sign + n.y * n.y * a, -n.y);
        Self::from_frame(t, bt, n)
    }

    pub fn from_tangent_normal(t: glam::Vec3A, n: glam::Vec3A) -> Self {
        let z_world = n;
        let y_world = z_world.cross(t).normalize();
        let x_world = y_world.cross(z_world);
        Self::from_frame(x_world, y_world, z_world)
    }

    fn from_frame(x: glam::Vec3A, y: glam::Vec3A, z: glam::Vec3A) -> Self {
        let local_to_world = glam::Mat3A::from_cols(x, y, z);
        let world_to_local = local_to_world.transpose();
        Self {
            local_to_world,
            world_to_local,
        }
    }

    pub fn normal(&self) -> glam::Vec3A {
        self.local_to_world.z_axis
    }

    pub fn to_local(&self, world: glam::Vec3A) -> glam::Vec3A {
        self.world_to_local * world
    }

    pub fn to_world(&self, local: glam::Vec3A) -> glam::Vec3A {
        self.local_to_world * local
    }
}
