//! Core device abstraction trait
//!
//! Every component of the renderer receives an `Arc<dyn GraphicsDevice>` at
//! construction and issues resource creation and draw commands through it.

use crate::backend::types::*;
use std::ops::Range;
use thiserror::Error;

/// Device error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create bind group: {0}")]
    BindGroupCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Feature not supported: {0}")]
    Unsupported(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a framebuffer (a set of attachments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a render pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineHandle(pub(crate) u64);

/// Handle to a bind group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(pub(crate) u64);

/// Handle to a bind group layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutHandle(pub(crate) u64);

/// Capability interface of a graphics device.
///
/// The renderer is single threaded: commands are recorded in call order and
/// every call blocks until the device has accepted it. Methods take `&self`
/// so the device can be shared between the catalog, render paths, post
/// effects and cameras; implementations use interior mutability.
pub trait GraphicsDevice: Send + Sync {
    /// The API this device drives
    fn api(&self) -> GraphicsApi;

    // Resource creation

    /// Create a buffer
    fn create_buffer(&self, desc: &BufferDescriptor) -> DeviceResult<BufferHandle>;

    /// Create a buffer with initial data
    fn create_buffer_init(&self, desc: &BufferDescriptor, data: &[u8])
        -> DeviceResult<BufferHandle>;

    /// Write data to a buffer
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Create a texture
    fn create_texture(&self, desc: &TextureDescriptor) -> DeviceResult<TextureHandle>;

    /// Create a framebuffer from existing attachments
    fn create_framebuffer(&self, desc: &FramebufferDescriptor) -> DeviceResult<FramebufferHandle>;

    /// Create a bind group layout
    fn create_bind_group_layout(
        &self,
        entries: &[BindGroupLayoutEntry],
    ) -> DeviceResult<BindGroupLayoutHandle>;

    /// Create a bind group
    fn create_bind_group(
        &self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> DeviceResult<BindGroupHandle>;

    /// Create a render pipeline
    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> DeviceResult<RenderPipelineHandle>;

    // Command recording

    /// Begin a render pass
    fn begin_render_pass(&self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&self);

    /// Set the render pipeline
    fn set_render_pipeline(&self, pipeline: RenderPipelineHandle);

    /// Set a bind group
    fn set_bind_group(&self, index: u32, bind_group: BindGroupHandle);

    /// Set vertex buffer
    fn set_vertex_buffer(&self, slot: u32, buffer: BufferHandle, offset: u64);

    /// Set index buffer
    fn set_index_buffer(&self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    /// Set viewport
    fn set_viewport(&self, viewport: Viewport);

    /// Set blending for subsequent draws
    fn set_blend_mode(&self, mode: BlendMode);

    /// Set depth test/write for subsequent draws
    fn set_depth_state(&self, state: DepthState);

    /// Copy the depth attachment of `source` into the depth buffer of `destination`
    fn blit_depth(&self, source: FramebufferHandle, destination: RenderTarget, width: u32, height: u32);

    /// Draw primitives
    fn draw(&self, vertices: Range<u32>, instances: Range<u32>);

    /// Draw indexed primitives
    fn draw_indexed(&self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Average of one channel over the whole texture (used for exposure metering)
    fn average_value(&self, texture: TextureHandle, channel: u32) -> f32;

    // Resource cleanup

    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&self, texture: TextureHandle);

    /// Destroy a framebuffer (attachments are destroyed separately)
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    /// Destroy a bind group layout
    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutHandle);

    /// Destroy a bind group
    fn destroy_bind_group(&self, bind_group: BindGroupHandle);

    /// Destroy a render pipeline
    fn destroy_render_pipeline(&self, pipeline: RenderPipelineHandle);
}
