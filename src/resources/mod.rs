//! Resource management
//!
//! Geometry the renderer owns itself: light volumes and full-screen quads.

mod mesh;

pub use mesh::*;
