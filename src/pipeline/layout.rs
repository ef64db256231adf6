//! Typed material parameters and their packed layout.
//!
//! A [`ParameterLayout`] is the CPU-side description of a material's uniform
//! block and texture slots. Offsets follow declaration order with each field
//! taking its native size, so the block can be uploaded without repacking.

/// Type of a material parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    Bool,
    Int,
    Uint,
    Float,
    Double,
    BVec2,
    BVec3,
    BVec4,
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    Vec2,
    Vec3,
    Vec4,
    DVec2,
    DVec3,
    DVec4,
    Texture,
    Cubemap,
}

/// Scalar family of a parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Bool,
    Int,
    Uint,
    Float,
    Double,
    Sampler,
}

impl ParameterType {
    /// Parse a type keyword as written in descriptors.
    ///
    /// `boolean` and `bool` are accepted for booleans, `color` is a `vec4`
    /// and `constant` is a `float`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let ty = match keyword {
            "bool" | "boolean" => ParameterType::Bool,
            "int" => ParameterType::Int,
            "uint" => ParameterType::Uint,
            "float" | "constant" => ParameterType::Float,
            "double" => ParameterType::Double,
            "bvec2" => ParameterType::BVec2,
            "bvec3" => ParameterType::BVec3,
            "bvec4" => ParameterType::BVec4,
            "ivec2" => ParameterType::IVec2,
            "ivec3" => ParameterType::IVec3,
            "ivec4" => ParameterType::IVec4,
            "uvec2" => ParameterType::UVec2,
            "uvec3" => ParameterType::UVec3,
            "uvec4" => ParameterType::UVec4,
            "vec2" => ParameterType::Vec2,
            "vec3" => ParameterType::Vec3,
            "vec4" | "color" => ParameterType::Vec4,
            "dvec2" => ParameterType::DVec2,
            "dvec3" => ParameterType::DVec3,
            "dvec4" => ParameterType::DVec4,
            "texture" => ParameterType::Texture,
            "cubemap" => ParameterType::Cubemap,
            _ => return None,
        };
        Some(ty)
    }

    fn scalar(&self) -> Scalar {
        use ParameterType::*;
        match self {
            Bool | BVec2 | BVec3 | BVec4 => Scalar::Bool,
            Int | IVec2 | IVec3 | IVec4 => Scalar::Int,
            Uint | UVec2 | UVec3 | UVec4 => Scalar::Uint,
            Float | Vec2 | Vec3 | Vec4 => Scalar::Float,
            Double | DVec2 | DVec3 | DVec4 => Scalar::Double,
            Texture | Cubemap => Scalar::Sampler,
        }
    }

    /// Number of components (1 for scalars and samplers)
    pub fn components(&self) -> usize {
        use ParameterType::*;
        match self {
            BVec2 | IVec2 | UVec2 | Vec2 | DVec2 => 2,
            BVec3 | IVec3 | UVec3 | Vec3 | DVec3 => 3,
            BVec4 | IVec4 | UVec4 | Vec4 | DVec4 => 4,
            _ => 1,
        }
    }

    /// Bytes this parameter occupies in the packed block.
    ///
    /// Booleans take 4 bytes for alignment, boolean vectors pack into a
    /// single 4-byte word, and samplers take no space.
    pub fn size(&self) -> u32 {
        match self.scalar() {
            Scalar::Bool => 4,
            Scalar::Int | Scalar::Uint | Scalar::Float => 4 * self.components() as u32,
            Scalar::Double => 8 * self.components() as u32,
            Scalar::Sampler => 0,
        }
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, ParameterType::Texture | ParameterType::Cubemap)
    }

    /// Build a value of this type from up to four numeric components.
    ///
    /// Returns `None` when fewer components than required are supplied.
    pub fn value_from_components(&self, components: &[f64]) -> Option<ParameterValue> {
        let count = self.components();
        if self.is_texture() || components.len() < count {
            return None;
        }
        let mut staged = [0.0f64; 4];
        staged[..count].copy_from_slice(&components[..count]);

        let value = match self.scalar() {
            Scalar::Bool => ParameterValue::Bool(staged.map(|c| c != 0.0)),
            Scalar::Int => ParameterValue::Int(staged.map(|c| c as i32)),
            Scalar::Uint => ParameterValue::Uint(staged.map(|c| c.max(0.0) as u32)),
            Scalar::Float => ParameterValue::Float(staged.map(|c| c as f32)),
            Scalar::Double => ParameterValue::Double(staged),
            Scalar::Sampler => return None,
        };
        Some(value)
    }
}

/// A parameter value staged in a 4-component buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Bool([bool; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
    Float([f32; 4]),
    Double([f64; 4]),
}

impl ParameterValue {
    /// Zero value of a type
    pub fn zero(ty: ParameterType) -> Option<Self> {
        ty.value_from_components(&[0.0; 4])
    }

    /// Write the value in the packed layout of `ty` into `out`.
    ///
    /// `out` must be at least `ty.size()` bytes long. Values whose scalar
    /// family differs from `ty` are converted component-wise.
    pub fn write_to(&self, ty: ParameterType, out: &mut [u8]) {
        let count = ty.components();
        let components = self.as_f64();
        match ty.scalar() {
            Scalar::Bool => {
                let mut bits = 0u32;
                for (i, c) in components.iter().take(count).enumerate() {
                    if *c != 0.0 {
                        bits |= 1 << i;
                    }
                }
                out[..4].copy_from_slice(&bits.to_le_bytes());
            }
            Scalar::Int => {
                for (i, c) in components.iter().take(count).enumerate() {
                    out[i * 4..i * 4 + 4].copy_from_slice(&(*c as i32).to_le_bytes());
                }
            }
            Scalar::Uint => {
                for (i, c) in components.iter().take(count).enumerate() {
                    out[i * 4..i * 4 + 4].copy_from_slice(&(c.max(0.0) as u32).to_le_bytes());
                }
            }
            Scalar::Float => {
                for (i, c) in components.iter().take(count).enumerate() {
                    out[i * 4..i * 4 + 4].copy_from_slice(&(*c as f32).to_le_bytes());
                }
            }
            Scalar::Double => {
                for (i, c) in components.iter().take(count).enumerate() {
                    out[i * 8..i * 8 + 8].copy_from_slice(&c.to_le_bytes());
                }
            }
            Scalar::Sampler => {}
        }
    }

    fn as_f64(&self) -> [f64; 4] {
        match self {
            ParameterValue::Bool(v) => v.map(|b| if b { 1.0 } else { 0.0 }),
            ParameterValue::Int(v) => v.map(f64::from),
            ParameterValue::Uint(v) => v.map(f64::from),
            ParameterValue::Float(v) => v.map(f64::from),
            ParameterValue::Double(v) => *v,
        }
    }
}

/// A uniform field of a material
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    /// Identifier used by material files
    pub name: String,
    /// Human readable name shown by tools
    pub display_name: String,
    pub ty: ParameterType,
    /// Byte offset inside the packed block
    pub offset: u32,
    pub default: Option<ParameterValue>,
}

/// A texture input of a material
#[derive(Debug, Clone, PartialEq)]
pub struct TextureParameterDescriptor {
    pub parameter: ParameterDescriptor,
    /// Dense slot index, assigned in first-seen order
    pub slot: u32,
}

/// Packed layout of a material's parameters and textures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterLayout {
    parameters: Vec<ParameterDescriptor>,
    textures: Vec<TextureParameterDescriptor>,
    size: u32,
}

impl ParameterLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a uniform field at the end of the block.
    ///
    /// A name that is already declared keeps its first declaration.
    pub fn push_parameter(
        &mut self,
        name: &str,
        display_name: &str,
        ty: ParameterType,
        default: Option<ParameterValue>,
    ) -> &ParameterDescriptor {
        if let Some(index) = self.parameters.iter().position(|p| p.name == name) {
            log::warn!("parameter '{}' declared twice, keeping the first", name);
            return &self.parameters[index];
        }

        let offset = self.size;
        self.size += ty.size();
        self.parameters.push(ParameterDescriptor {
            name: name.to_string(),
            display_name: display_name.to_string(),
            ty,
            offset,
            default,
        });
        let last = self.parameters.len() - 1;
        &self.parameters[last]
    }

    /// Register a texture input; duplicates keep their first slot.
    pub fn push_texture(
        &mut self,
        name: &str,
        display_name: &str,
        ty: ParameterType,
        default: Option<ParameterValue>,
    ) -> &TextureParameterDescriptor {
        if let Some(index) = self.textures.iter().position(|t| t.parameter.name == name) {
            return &self.textures[index];
        }
        let slot = self.textures.len() as u32;
        self.textures.push(TextureParameterDescriptor {
            parameter: ParameterDescriptor {
                name: name.to_string(),
                display_name: display_name.to_string(),
                ty,
                offset: 0,
                default,
            },
            slot,
        });
        &self.textures[slot as usize]
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn textures(&self) -> &[TextureParameterDescriptor] {
        &self.textures
    }

    /// Size of the packed parameter block in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn texture(&self, name: &str) -> Option<&TextureParameterDescriptor> {
        self.textures.iter().find(|t| t.parameter.name == name)
    }

    /// Packed block holding every parameter's default (zero when unset)
    pub fn default_block(&self) -> Vec<u8> {
        let mut block = vec![0u8; self.size as usize];
        for parameter in &self.parameters {
            if let Some(default) = parameter.default {
                let start = parameter.offset as usize;
                let end = start + parameter.ty.size() as usize;
                default.write_to(parameter.ty, &mut block[start..end]);
            }
        }
        block
    }

    /// Write one value into a packed block. Returns `false` for unknown names.
    pub fn write_value(&self, block: &mut [u8], name: &str, value: ParameterValue) -> bool {
        let Some(parameter) = self.parameter(name) else {
            return false;
        };
        let start = parameter.offset as usize;
        let end = start + parameter.ty.size() as usize;
        if end > block.len() {
            return false;
        }
        value.write_to(parameter.ty, &mut block[start..end]);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_sizes() {
        assert_eq!(ParameterType::Bool.size(), 4);
        assert_eq!(ParameterType::BVec3.size(), 4);
        assert_eq!(ParameterType::Int.size(), 4);
        assert_eq!(ParameterType::Double.size(), 8);
        assert_eq!(ParameterType::Vec3.size(), 12);
        assert_eq!(ParameterType::UVec4.size(), 16);
        assert_eq!(ParameterType::DVec3.size(), 24);
        assert_eq!(ParameterType::Texture.size(), 0);
    }

    #[test]
    fn test_keyword_aliases() {
        assert_eq!(ParameterType::from_keyword("color"), Some(ParameterType::Vec4));
        assert_eq!(ParameterType::from_keyword("constant"), Some(ParameterType::Float));
        assert_eq!(ParameterType::from_keyword("boolean"), Some(ParameterType::Bool));
        assert_eq!(ParameterType::from_keyword("mat4"), None);
    }

    #[test]
    fn test_offsets_follow_declaration_order() {
        let mut layout = ParameterLayout::new();
        layout.push_parameter("roughness", "Roughness", ParameterType::Float, None);
        layout.push_parameter("tint", "Tint", ParameterType::Vec4, None);
        layout.push_parameter("layers", "Layers", ParameterType::Int, None);

        let offsets: Vec<u32> = layout.parameters().iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![0, 4, 20]);
        assert_eq!(layout.size(), 24);
    }

    #[test]
    fn test_texture_slots_are_dense() {
        let mut layout = ParameterLayout::new();
        layout.push_texture("albedo", "Albedo", ParameterType::Texture, None);
        layout.push_texture("normal", "Normal", ParameterType::Texture, None);
        layout.push_texture("albedo", "Albedo again", ParameterType::Texture, None);
        layout.push_texture("sky", "Sky", ParameterType::Cubemap, None);

        let slots: Vec<u32> = layout.textures().iter().map(|t| t.slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);
        assert_eq!(layout.texture("sky").unwrap().slot, 2);
        assert_eq!(layout.size(), 0);
    }

    #[test]
    fn test_default_block_packing() {
        let mut layout = ParameterLayout::new();
        layout.push_parameter(
            "scale",
            "Scale",
            ParameterType::Float,
            ParameterType::Float.value_from_components(&[2.5]),
        );
        layout.push_parameter(
            "flags",
            "Flags",
            ParameterType::BVec3,
            ParameterType::BVec3.value_from_components(&[1.0, 0.0, 1.0]),
        );
        let block = layout.default_block();
        assert_eq!(block.len(), 8);
        assert_eq!(f32::from_le_bytes(block[0..4].try_into().unwrap()), 2.5);
        assert_eq!(u32::from_le_bytes(block[4..8].try_into().unwrap()), 0b101);
    }

    #[test]
    fn test_short_vector_is_not_committed() {
        assert!(ParameterType::Vec3.value_from_components(&[1.0, 2.0]).is_none());
        assert_eq!(
            ParameterType::Vec3.value_from_components(&[1.0, 2.0, 3.0]),
            Some(ParameterValue::Float([1.0, 2.0, 3.0, 0.0]))
        );
    }

    #[test]
    fn test_write_value_unknown_name() {
        let mut layout = ParameterLayout::new();
        layout.push_parameter("a", "A", ParameterType::Uint, None);
        let mut block = layout.default_block();
        assert!(!layout.write_value(&mut block, "b", ParameterValue::Uint([1; 4])));
        assert!(layout.write_value(&mut block, "a", ParameterValue::Uint([7, 0, 0, 0])));
        assert_eq!(u32::from_le_bytes(block[0..4].try_into().unwrap()), 7);
    }
}
