//! Material instances and the material file format.
//!
//! A material binds concrete textures and parameter values to a pipeline.
//! Material files are line oriented:
//!
//! ```text
//! shader: ../shaders/standard/standard.json
//! # comments start with '#' or '//'
//! albedoTexture: textures/stone_albedo.png
//! albedoConstant: 1 0.9 0.8 1
//! hasAlbedoTexture: true
//! roughnessConstant: 0.4
//! ```
//!
//! Paths are resolved relative to the directory of the material file.

use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::{normalize, parent_dir};
use crate::backend::{
    BindGroupEntry, BindGroupHandle, BindGroupLayoutHandle, BufferDescriptor, BufferHandle,
    GraphicsDevice, IndexFormat, TextureHandle,
};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{ParameterLayout, ParameterValue, PipelineReference};

/// Stable reference to a material: its pipeline and its index in the
/// pipeline's material arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialReference {
    pub pipeline: PipelineReference,
    pub material: usize,
}

/// Identifier of a drawable owned outside the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u64);

/// GPU geometry drawn with a material. The buffers are owned by the mesh
/// system; the material only records them.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawableMesh {
    pub id: MeshId,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<(BufferHandle, IndexFormat)>,
    /// Index count when indexed, vertex count otherwise
    pub element_count: u32,
    pub base_vertex: i32,
}

impl DrawableMesh {
    fn draw(&self, device: &dyn GraphicsDevice) {
        device.set_vertex_buffer(0, self.vertex_buffer, 0);
        match self.index_buffer {
            Some((buffer, format)) => {
                device.set_index_buffer(buffer, 0, format);
                device.draw_indexed(0..self.element_count, self.base_vertex, 0..1);
            }
            None => device.draw(0..self.element_count, 0..1),
        }
    }
}

/// Resolves texture paths named by material files to device textures.
///
/// Image decoding lives outside the renderer; the provider returns `None` for
/// textures it cannot supply and the slot stays unbound.
pub trait TextureProvider {
    fn texture(&self, path: &str) -> Option<TextureHandle>;
}

impl TextureProvider for HashMap<String, TextureHandle> {
    fn texture(&self, path: &str) -> Option<TextureHandle> {
        self.get(path).copied()
    }
}

/// Parsed material file
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDefinition {
    /// Path of the material file, used as its name and cache key
    pub path: String,
    /// Resolved path of the pipeline descriptor
    pub shader: String,
    /// `key: value` pairs in file order
    pub values: Vec<(String, String)>,
}

impl MaterialDefinition {
    pub fn parse(path: &str, text: &str) -> RenderResult<Self> {
        let directory = parent_dir(path);
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("//"));

        let shader = match lines.next().and_then(|line| line.split_once(':')) {
            Some((key, value)) if key.trim() == "shader" && !value.trim().is_empty() => {
                normalize(&format!("{}{}", directory, value.trim()))
            }
            _ => {
                return Err(RenderError::InvalidMaterial {
                    path: path.to_string(),
                    reason: "first line must be 'shader: <path>'".to_string(),
                })
            }
        };

        let mut values = Vec::new();
        for line in lines {
            match line.split_once(':') {
                Some((key, value)) => {
                    values.push((key.trim().to_string(), value.trim().to_string()));
                }
                None => log::warn!("{}: ignoring line without ':' separator: {}", path, line),
            }
        }

        Ok(Self {
            path: path.to_string(),
            shader,
            values,
        })
    }

    /// Directory texture paths are resolved against
    pub fn directory(&self) -> &str {
        parent_dir(&self.path)
    }
}

/// Parse a whitespace or comma separated list of numbers and booleans.
pub(crate) fn parse_components(text: &str) -> Option<Vec<f64>> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| match token {
            "true" => Some(1.0),
            "false" => Some(0.0),
            number => number.parse::<f64>().ok(),
        })
        .collect()
}

/// A concrete binding of textures and parameter values to a pipeline.
///
/// Owns its uniform buffer and binding set; both are released on drop.
pub struct MaterialInstance {
    device: Arc<dyn GraphicsDevice>,
    reference: MaterialReference,
    name: String,
    textures: Vec<Option<TextureHandle>>,
    texture_binding: Option<BindGroupHandle>,
    parameters: Option<Vec<u8>>,
    uniform_buffer: Option<BufferHandle>,
    draw_count: u32,
    meshes: Vec<DrawableMesh>,
}

impl MaterialInstance {
    /// Upload the parameter block and create the binding set.
    ///
    /// Binding 0 holds the parameter block, texture slot `n` sits at
    /// binding `n + 1`.
    pub(crate) fn new(
        device: Arc<dyn GraphicsDevice>,
        reference: MaterialReference,
        name: &str,
        binding_layout: Option<BindGroupLayoutHandle>,
        parameters: Option<Vec<u8>>,
        textures: Vec<Option<TextureHandle>>,
    ) -> RenderResult<Self> {
        let uniform_buffer = match &parameters {
            Some(block) => Some(device.create_buffer_init(
                &BufferDescriptor::uniform(&format!("{} parameters", name), block.len() as u64),
                block,
            )?),
            None => None,
        };

        let mut material = Self {
            device,
            reference,
            name: name.to_string(),
            textures,
            texture_binding: None,
            parameters,
            uniform_buffer,
            draw_count: 0,
            meshes: Vec::new(),
        };

        if let Some(layout) = binding_layout {
            let mut entries = Vec::new();
            if let Some(buffer) = material.uniform_buffer {
                entries.push((
                    0,
                    BindGroupEntry::Buffer {
                        buffer,
                        offset: 0,
                        size: None,
                    },
                ));
            }
            for (slot, texture) in material.textures.iter().enumerate() {
                if let Some(texture) = texture {
                    entries.push((slot as u32 + 1, BindGroupEntry::Texture(*texture)));
                }
            }
            material.texture_binding = Some(material.device.create_bind_group(layout, &entries)?);
        }

        log::debug!("Created material {} ({:?})", material.name, reference);
        Ok(material)
    }

    pub fn reference(&self) -> MaterialReference {
        self.reference
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn textures(&self) -> &[Option<TextureHandle>] {
        &self.textures
    }

    pub fn parameters(&self) -> Option<&[u8]> {
        self.parameters.as_deref()
    }

    pub fn uniform_buffer(&self) -> Option<BufferHandle> {
        self.uniform_buffer
    }

    pub fn texture_binding(&self) -> Option<BindGroupHandle> {
        self.texture_binding
    }

    /// Write one parameter into the packed block and upload the block.
    ///
    /// Unknown names are logged and leave the block untouched.
    pub fn set_parameter(&mut self, layout: &ParameterLayout, name: &str, value: ParameterValue) -> bool {
        let Some(block) = self.parameters.as_mut() else {
            log::warn!("{}: material has no parameters, cannot set '{}'", self.name, name);
            return false;
        };
        if !layout.write_value(block, name, value) {
            log::warn!("{}: unknown parameter '{}'", self.name, name);
            return false;
        }
        if let Some(buffer) = self.uniform_buffer {
            self.device.write_buffer(buffer, 0, block);
        }
        true
    }

    pub fn add_mesh(&mut self, mesh: DrawableMesh) {
        self.meshes.push(mesh);
    }

    /// Remove every entry of `id`. Returns whether anything was removed.
    pub fn remove_mesh(&mut self, id: MeshId) -> bool {
        let before = self.meshes.len();
        self.meshes.retain(|mesh| mesh.id != id);
        self.meshes.len() != before
    }

    pub fn meshes(&self) -> &[DrawableMesh] {
        &self.meshes
    }

    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    pub fn increment_draw_count(&mut self) {
        self.draw_count += 1;
    }

    pub(crate) fn reset_draw_count(&mut self) {
        self.draw_count = 0;
    }

    /// Bind the material and draw every mesh with the bound pipeline.
    pub fn draw(&self, device: &dyn GraphicsDevice) {
        if let Some(binding) = self.texture_binding {
            device.set_bind_group(1, binding);
        }
        for mesh in &self.meshes {
            mesh.draw(device);
        }
    }

    /// Draw every mesh into a shadow map with the bound shadow pipeline.
    pub fn draw_shadow(&self, device: &dyn GraphicsDevice) {
        self.draw(device);
    }
}

impl Drop for MaterialInstance {
    fn drop(&mut self) {
        if let Some(binding) = self.texture_binding.take() {
            self.device.destroy_bind_group(binding);
        }
        if let Some(buffer) = self.uniform_buffer.take() {
            self.device.destroy_buffer(buffer);
        }
        log::trace!("Released material {}", self.name);
    }
}

impl std::fmt::Debug for MaterialInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialInstance")
            .field("reference", &self.reference)
            .field("name", &self.name)
            .field("textures", &self.textures)
            .field("draw_count", &self.draw_count)
            .field("meshes", &self.meshes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_material_file() {
        let text = "shader: ../shaders/standard.json\n\
                    # base color\n\
                    albedoConstant: 1 0.5, 0.25 1\n\
                    // texture\n\
                    albedoTexture: textures/a.png\n\
                    \n\
                    hasAlbedoTexture: true\n";
        let definition = MaterialDefinition::parse("materials/stone.mat", text).unwrap();
        assert_eq!(definition.shader, "shaders/standard.json");
        assert_eq!(definition.directory(), "materials/");
        assert_eq!(definition.values.len(), 3);
        assert_eq!(definition.values[0].0, "albedoConstant");
        assert_eq!(definition.values[1].1, "textures/a.png");
    }

    #[test]
    fn test_missing_shader_header() {
        let err = MaterialDefinition::parse("a.mat", "roughness: 0.5\n").unwrap_err();
        assert!(matches!(err, RenderError::InvalidMaterial { .. }));
        assert!(MaterialDefinition::parse("a.mat", "").is_err());
    }

    #[test]
    fn test_parse_components() {
        assert_eq!(parse_components("1 0.5, 0.25 1"), Some(vec![1.0, 0.5, 0.25, 1.0]));
        assert_eq!(parse_components("true"), Some(vec![1.0]));
        assert_eq!(parse_components("textures/a.png"), None);
    }
}
