//! Ember Render - a deferred rendering core over a backend-agnostic device
//!
//! The crate turns declarative pipeline descriptors and material files into
//! GPU pipelines and renders them through a deferred path per camera:
//!
//! - [`PipelineCatalog`]: path-keyed cache of compiled pipelines, sorted into
//!   draw buckets, each owning its material instances
//! - [`DeferredRenderPath`]: geometry buffer fill, light accumulation, unlit
//!   and transparent overlay, debug views
//! - [`PostEffectChain`]: validated chain of post effects with automatic
//!   ping-pong targets
//! - [`Camera`]: owns the targets of one viewpoint and drives the above
//!
//! Every component receives an `Arc<dyn GraphicsDevice>` at construction.
//! [`backend::RecordingDevice`] is a headless device that records commands,
//! used by the tests and by offline tooling.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_render::{
//!     assets::FileSystemSource, backend::{standard_vertex_layout, GraphicsApi, RecordingDevice},
//!     Camera, PipelineCatalog, RendererConfig,
//! };
//!
//! # fn main() -> ember_render::RenderResult<()> {
//! let device = Arc::new(RecordingDevice::new(GraphicsApi::OpenGl));
//! let mut catalog = PipelineCatalog::new(device, Arc::new(FileSystemSource::new("assets")))?;
//! let pipeline = catalog.create_pipeline(&standard_vertex_layout(), "materials/standard.json", false)?;
//!
//! let mut camera = Camera::new(&catalog, &RendererConfig::default())?;
//! camera.render(&catalog, 0.0);
//! # let _ = pipeline;
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod lighting;
pub mod material;
pub mod pipeline;
pub mod postprocess;
pub mod render_path;
pub mod render_target;
pub mod resources;
pub mod shaders;

pub use camera::{Camera, FrameUniforms, PhysicalExposure, Projection};
pub use config::RendererConfig;
pub use error::{RenderError, RenderResult};
pub use lighting::{
    DirectionalLight, Light, LightAccumulator, LightKind, PointLight, ShadowInput, SpotLight,
};
pub use material::{
    MaterialDefinition, MaterialInstance, MaterialReference, MeshId, TextureProvider,
};
pub use pipeline::{Bucket, ParameterLayout, PipelineCatalog, PipelineReference};
pub use postprocess::{PostEffect, PostEffectChain, StreamFormat, TonemapOperator};
pub use render_path::{DebugMode, DeferredRenderPath};
pub use render_target::{RenderTargetContainer, RenderTargetSpec, SharedRenderTarget};
