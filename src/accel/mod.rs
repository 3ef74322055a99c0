mod bvh;

pub use bvh::*;
