//! Renderer configuration

use serde::Deserialize;

use crate::backend::GraphicsApi;
use crate::error::RenderResult;
use crate::postprocess::TonemapOperator;

/// Configuration for a camera's render path and post chain
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Which graphics API shaders are selected for
    pub api: GraphicsApi,
    /// Initial viewport width
    pub width: u32,
    /// Initial viewport height
    pub height: u32,
    /// Directory holding the built-in shader programs
    pub shader_root: String,
    /// Geometry buffer debug view, 0 renders the lit scene
    pub debug_mode: u32,
    pub enable_ssr: bool,
    pub enable_ssao: bool,
    pub enable_bloom: bool,
    pub enable_auto_exposure: bool,
    /// Render into an owned LDR target instead of the default framebuffer
    pub use_final_framebuffer: bool,
    pub tonemap: TonemapOperator,
    pub gamma: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            api: GraphicsApi::OpenGl,
            width: 1280,
            height: 720,
            shader_root: "shaders".to_string(),
            debug_mode: 0,
            enable_ssr: false,
            enable_ssao: true,
            enable_bloom: true,
            enable_auto_exposure: true,
            use_final_framebuffer: false,
            tonemap: TonemapOperator::Aces,
            gamma: 2.2,
        }
    }
}

impl RendererConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> RenderResult<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            api = "vulkan"
            width = 800
            tonemap = "reinhard"
            enable_ssr = true
            "#,
        )
        .unwrap();
        assert_eq!(config.api, GraphicsApi::Vulkan);
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 720);
        assert_eq!(config.tonemap, TonemapOperator::Reinhard);
        assert!(config.enable_ssr);
        assert_eq!(config.gamma, 2.2);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(RendererConfig::from_toml_str("api = \"metal\"").is_err());
    }
}
