//! Engine shader programs.
//!
//! Built-in programs (light volumes, debug view, post effects) live under a
//! configurable root as `<root>/<program>.<stage>.<ext>`, where the extension
//! depends on the active graphics API.

use crate::assets::{normalize, AssetSource};
use crate::backend::{GraphicsApi, ShaderSource, ShaderStage};
use crate::error::{RenderError, RenderResult};

/// Vertex and fragment stages, the shape of every built-in program
pub const VERTEX_FRAGMENT: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Fragment];

fn stage_suffix(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vert",
        ShaderStage::Fragment => "frag",
        ShaderStage::Geometry => "geom",
        ShaderStage::TessellationEvaluation => "tese",
        ShaderStage::TessellationControl => "tesc",
        ShaderStage::Compute => "comp",
    }
}

/// Locates built-in shader programs for one graphics API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderLibrary {
    root: String,
    api: GraphicsApi,
}

impl ShaderLibrary {
    pub fn new(root: &str, api: GraphicsApi) -> Self {
        Self {
            root: normalize(root),
            api,
        }
    }

    pub fn api(&self) -> GraphicsApi {
        self.api
    }

    /// Path of one stage of a program
    pub fn stage_path(&self, program: &str, stage: ShaderStage) -> String {
        let file = format!("{}.{}.{}", program, stage_suffix(stage), self.api.shader_extension());
        if self.root.is_empty() {
            file
        } else {
            format!("{}/{}", self.root, file)
        }
    }

    /// Read every stage of a program.
    ///
    /// A stage file that does not exist is reported as
    /// [`RenderError::MissingShaderStage`] naming the program.
    pub fn load(
        &self,
        assets: &dyn AssetSource,
        program: &str,
        stages: &[ShaderStage],
    ) -> RenderResult<Vec<ShaderSource>> {
        stages
            .iter()
            .map(|stage| {
                let path = self.stage_path(program, *stage);
                match assets.read(&path) {
                    Ok(code) => Ok(ShaderSource {
                        stage: *stage,
                        path,
                        code,
                    }),
                    Err(RenderError::AssetNotFound { .. }) => Err(RenderError::MissingShaderStage {
                        effect: program.to_string(),
                        stage: *stage,
                    }),
                    Err(err) => Err(err),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;

    #[test]
    fn test_stage_paths_follow_api() {
        let gl = ShaderLibrary::new("shaders/", GraphicsApi::OpenGl);
        assert_eq!(gl.stage_path("lights/point", ShaderStage::Vertex), "shaders/lights/point.vert.glsl");
        let vk = ShaderLibrary::new("shaders", GraphicsApi::Vulkan);
        assert_eq!(vk.stage_path("tonemap", ShaderStage::Fragment), "shaders/tonemap.frag.spv");
        let dx = ShaderLibrary::new("", GraphicsApi::DirectX);
        assert_eq!(dx.stage_path("ssao", ShaderStage::Fragment), "ssao.frag.fxc");
    }

    #[test]
    fn test_missing_stage_names_program() {
        let assets = MemorySource::new();
        assets.insert("shaders/bloom.vert.glsl", "vs");
        let library = ShaderLibrary::new("shaders", GraphicsApi::OpenGl);
        let err = library.load(&assets, "bloom", &VERTEX_FRAGMENT).unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingShaderStage { ref effect, stage: ShaderStage::Fragment } if effect == "bloom"
        ));

        assets.insert("shaders/bloom.frag.glsl", "fs");
        assert_eq!(library.load(&assets, "bloom", &VERTEX_FRAGMENT).unwrap().len(), 2);
    }
}
