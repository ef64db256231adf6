//! Geometry buffer debug views

use bytemuck::{Pod, Zeroable};

/// Channel shown instead of the lit scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum DebugMode {
    /// Regular lit output, debug view disabled
    #[default]
    Lit = 0,
    Distance = 1,
    Normal = 2,
    ViewNormal = 3,
    Albedo = 4,
    Specular = 5,
    Roughness = 6,
    Position = 7,
}

impl DebugMode {
    pub const COUNT: u32 = 8;

    pub fn from_index(index: u32) -> Option<Self> {
        let mode = match index {
            0 => DebugMode::Lit,
            1 => DebugMode::Distance,
            2 => DebugMode::Normal,
            3 => DebugMode::ViewNormal,
            4 => DebugMode::Albedo,
            5 => DebugMode::Specular,
            6 => DebugMode::Roughness,
            7 => DebugMode::Position,
            _ => return None,
        };
        Some(mode)
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Next mode, wrapping back to [`DebugMode::Lit`]
    pub fn next(self) -> Self {
        Self::from_index((self.index() + 1) % Self::COUNT).unwrap_or_default()
    }

    pub fn is_active(self) -> bool {
        self != DebugMode::Lit
    }
}

/// Uniform block of the debug shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct DebugUniforms {
    pub mode: u32,
    pub _padding: [u32; 3],
}

impl DebugUniforms {
    pub fn new(mode: DebugMode) -> Self {
        Self {
            mode: mode.index(),
            _padding: [0; 3],
        }
    }
}
