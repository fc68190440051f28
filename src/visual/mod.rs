//! Frequency-reactive visual
//!
//! A noise-deformed icosphere whose displacement follows the energy in the
//! graph's analysis tap.

pub mod deform;
pub mod mesh;
pub mod noise;

use num_traits::Float;

pub use deform::{FrameStats, FrequencyDeformer, MeshTransform};
pub use mesh::{Mesh, Vec3};
pub use noise::Simplex4;

/// Linear interpolation from `a` to `b` by `t`
#[inline]
pub fn lerp<T: Float>(a: T, b: T, t: T) -> T {
    a + (b - a) * t
}
