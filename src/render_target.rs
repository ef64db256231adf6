//! Render target containers.
//!
//! A container is a framebuffer plus its color and depth attachments. Owners
//! share containers as [`SharedRenderTarget`]; only the owner resizes them.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{
    FramebufferDescriptor, FramebufferHandle, GraphicsDevice, RenderTarget, TextureDescriptor,
    TextureFormat, TextureHandle,
};
use crate::error::RenderResult;

/// Format of the geometry buffer attachments
pub const GBUFFER_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
/// Number of geometry buffer color attachments
pub const GBUFFER_ATTACHMENTS: usize = 4;
/// Format of lit scene color
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
/// Format of tonemapped color
pub const LDR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
/// Depth format of scene targets
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;
/// Depth format of shadow maps
pub const SHADOW_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Attachment layout of a render target
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetSpec {
    pub label: String,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

impl RenderTargetSpec {
    pub fn new(label: &str, color_formats: &[TextureFormat], depth_format: Option<TextureFormat>) -> Self {
        Self {
            label: label.to_string(),
            color_formats: color_formats.to_vec(),
            depth_format,
        }
    }

    /// Four RGBA16F attachments and a depth-stencil buffer
    pub fn gbuffer() -> Self {
        Self::new("gbuffer", &[GBUFFER_FORMAT; GBUFFER_ATTACHMENTS], Some(DEPTH_FORMAT))
    }

    pub fn hdr(label: &str) -> Self {
        Self::new(label, &[HDR_FORMAT], Some(DEPTH_FORMAT))
    }

    pub fn ldr(label: &str) -> Self {
        Self::new(label, &[LDR_FORMAT], None)
    }
}

struct Attachments {
    framebuffer: FramebufferHandle,
    colors: Vec<TextureHandle>,
    depth: Option<TextureHandle>,
}

impl Attachments {
    fn create(
        device: &dyn GraphicsDevice,
        spec: &RenderTargetSpec,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let mut colors = Vec::with_capacity(spec.color_formats.len());
        for (i, format) in spec.color_formats.iter().enumerate() {
            let label = format!("{} color {}", spec.label, i);
            match device.create_texture(&TextureDescriptor::render_target(&label, width, height, *format)) {
                Ok(texture) => colors.push(texture),
                Err(err) => {
                    colors.into_iter().for_each(|t| device.destroy_texture(t));
                    return Err(err.into());
                }
            }
        }

        let depth = match spec.depth_format {
            Some(format) => {
                let label = format!("{} depth", spec.label);
                match device.create_texture(&TextureDescriptor::render_target(&label, width, height, format)) {
                    Ok(texture) => Some(texture),
                    Err(err) => {
                        colors.into_iter().for_each(|t| device.destroy_texture(t));
                        return Err(err.into());
                    }
                }
            }
            None => None,
        };

        let framebuffer = device.create_framebuffer(&FramebufferDescriptor {
            label: Some(spec.label.clone()),
            color_attachments: colors.clone(),
            depth_attachment: depth,
            width,
            height,
        });
        match framebuffer {
            Ok(framebuffer) => Ok(Self {
                framebuffer,
                colors,
                depth,
            }),
            Err(err) => {
                colors.into_iter().chain(depth).for_each(|t| device.destroy_texture(t));
                Err(err.into())
            }
        }
    }

    fn release(self, device: &dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        for texture in self.colors.into_iter().chain(self.depth) {
            device.destroy_texture(texture);
        }
    }
}

/// A framebuffer with its attachments
pub struct RenderTargetContainer {
    device: Arc<dyn GraphicsDevice>,
    spec: RenderTargetSpec,
    width: u32,
    height: u32,
    attachments: Option<Attachments>,
}

impl RenderTargetContainer {
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        spec: RenderTargetSpec,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let attachments = Attachments::create(device.as_ref(), &spec, width, height)?;
        log::debug!("Created render target {} ({}x{})", spec.label, width, height);
        Ok(Self {
            device,
            spec,
            width,
            height,
            attachments: Some(attachments),
        })
    }

    /// Wrap into a shareable handle
    pub fn into_shared(self) -> SharedRenderTarget {
        Arc::new(RwLock::new(self))
    }

    /// Recreate every attachment at the new size.
    ///
    /// The new attachments are created before the old ones are released, so
    /// a failed resize leaves the container untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let fresh = Attachments::create(self.device.as_ref(), &self.spec, width, height)?;
        if let Some(old) = self.attachments.replace(fresh) {
            old.release(self.device.as_ref());
        }
        self.width = width;
        self.height = height;
        log::debug!("Resized render target {} to {}x{}", self.spec.label, width, height);
        Ok(())
    }

    pub fn spec(&self) -> &RenderTargetSpec {
        &self.spec
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_format(&self, index: usize) -> Option<TextureFormat> {
        self.spec.color_formats.get(index).copied()
    }

    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.attachments.as_ref().map(|a| a.framebuffer)
    }

    /// Render pass target for this container
    pub fn target(&self) -> RenderTarget {
        match self.framebuffer() {
            Some(framebuffer) => RenderTarget::Framebuffer(framebuffer),
            None => RenderTarget::Default,
        }
    }

    pub fn colors(&self) -> &[TextureHandle] {
        self.attachments
            .as_ref()
            .map(|a| a.colors.as_slice())
            .unwrap_or_default()
    }

    pub fn color(&self, index: usize) -> Option<TextureHandle> {
        self.colors().get(index).copied()
    }

    pub fn depth(&self) -> Option<TextureHandle> {
        self.attachments.as_ref().and_then(|a| a.depth)
    }
}

impl Drop for RenderTargetContainer {
    fn drop(&mut self) {
        if let Some(attachments) = self.attachments.take() {
            attachments.release(self.device.as_ref());
        }
        log::trace!("Released render target {}", self.spec.label);
    }
}

/// Render target shared between a camera, its render path and its post chain
pub type SharedRenderTarget = Arc<RwLock<RenderTargetContainer>>;
