//! Camera
//!
//! A camera owns everything one viewpoint needs to produce a frame: its HDR
//! and final targets, a deferred render path, a post-effect chain and the
//! per-frame uniform buffer every pipeline reads at group 0.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::{
    BindGroupEntry, BindGroupHandle, BufferDescriptor, BufferHandle, GraphicsApi, GraphicsDevice,
    RenderTarget,
};
use crate::config::RendererConfig;
use crate::error::RenderResult;
use crate::lighting::LightingFrame;
use crate::pipeline::PipelineCatalog;
use crate::postprocess::{
    AutoExposureEffect, BloomEffect, ColorGradingEffect, PostEffectChain, PostInputs, SsaoEffect,
    SsrEffect, TonemapEffect,
};
use crate::render_path::{DeferredRenderPath, FrameInputs, RenderOutput};
use crate::render_target::{RenderTargetContainer, RenderTargetSpec, SharedRenderTarget};
use crate::shaders::ShaderLibrary;

/// Seed of the ambient occlusion sample pattern
const SSAO_SEED: u64 = 0x5eed;

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: 1.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Projection {
    /// Matrix with OpenGL clip conventions: right handed, depth in -1..1
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        match *self {
            Projection::Perspective { fov_y, near, far } => {
                Mat4::perspective_rh_gl(fov_y, aspect, near, far)
            }
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        }
    }
}

/// Maps OpenGL depth (-1..1) to DirectX depth (0..1)
const DIRECTX_DEPTH_RESCALE: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.5, 0.0),
    Vec4::new(0.0, 0.0, 0.5, 1.0),
);

/// Apply the clip-space convention of `api` to an OpenGL projection.
///
/// Exactly one correction is applied: Vulkan flips Y, DirectX rescales
/// depth, OpenGL is left unchanged.
pub fn correct_projection(api: GraphicsApi, projection: Mat4) -> Mat4 {
    match api {
        GraphicsApi::OpenGl => projection,
        GraphicsApi::Vulkan => {
            let mut corrected = projection;
            corrected.y_axis.y = -corrected.y_axis.y;
            corrected
        }
        GraphicsApi::DirectX => DIRECTX_DEPTH_RESCALE * projection,
    }
}

/// Physical camera settings driving exposure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalExposure {
    /// f-number
    pub aperture: f32,
    /// Seconds
    pub shutter_speed: f32,
    pub iso: f32,
}

impl Default for PhysicalExposure {
    fn default() -> Self {
        Self {
            aperture: 16.0,
            shutter_speed: 1.0 / 200.0,
            iso: 200.0,
        }
    }
}

impl PhysicalExposure {
    /// Exposure value at ISO 100
    pub fn ev100(&self) -> f32 {
        ((self.aperture * self.aperture) / self.shutter_speed * 100.0 / self.iso).log2()
    }

    /// Scale applied to scene luminance before tonemapping
    pub fn exposure(&self) -> f32 {
        1.0 / (1.2 * 2f32.powf(self.ev100()))
    }
}

/// Per-frame uniform block bound at group 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub proj_view: Mat4,
    /// Eye position in xyz, time in seconds in w
    pub eye_time: Vec4,
    pub inv_proj: Mat4,
    pub inv_view: Mat4,
    /// Viewport size in xy
    pub resolution: Vec4,
}

/// Where the post chain writes the finished frame
enum FinalTarget {
    /// The device's default framebuffer
    Default,
    Owned(RenderTargetContainer),
    /// Supplied by the caller; never resized or released here
    Custom(RenderTarget),
}

impl FinalTarget {
    fn target(&self) -> RenderTarget {
        match self {
            FinalTarget::Default => RenderTarget::Default,
            FinalTarget::Owned(container) => container.target(),
            FinalTarget::Custom(target) => *target,
        }
    }
}

/// Viewpoint that renders the scene held by a [`PipelineCatalog`]
pub struct Camera {
    device: Arc<dyn GraphicsDevice>,
    api: GraphicsApi,
    width: u32,
    height: u32,
    projection: Projection,
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    view: Mat4,
    projection_matrix: Mat4,
    view_dirty: bool,
    projection_dirty: bool,
    physical: PhysicalExposure,
    post: PostEffectChain,
    render_path: DeferredRenderPath,
    hdr: SharedRenderTarget,
    final_target: FinalTarget,
    frame_buffer: BufferHandle,
    frame_binding: BindGroupHandle,
    enabled: bool,
    generation: u64,
    last_exposure: f32,
}

impl Camera {
    /// Build a camera with its targets, render path and post chain.
    pub fn new(catalog: &PipelineCatalog, config: &RendererConfig) -> RenderResult<Self> {
        let device = catalog.device().clone();
        let shaders = ShaderLibrary::new(&config.shader_root, config.api);
        let (width, height) = (config.width.max(1), config.height.max(1));

        let frame_buffer = device.create_buffer(&BufferDescriptor::uniform(
            "frame uniforms",
            std::mem::size_of::<FrameUniforms>() as u64,
        ))?;
        let frame_binding = device.create_bind_group(
            catalog.frame_layout(),
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer: frame_buffer,
                    offset: 0,
                    size: None,
                },
            )],
        )?;

        let hdr = RenderTargetContainer::new(device.clone(), RenderTargetSpec::hdr("hdr"), width, height)?
            .into_shared();
        let final_target = if config.use_final_framebuffer {
            FinalTarget::Owned(RenderTargetContainer::new(
                device.clone(),
                RenderTargetSpec::ldr("final"),
                width,
                height,
            )?)
        } else {
            FinalTarget::Default
        };

        let mut render_path = DeferredRenderPath::new(
            device.clone(),
            catalog.assets().as_ref(),
            &shaders,
            catalog.frame_layout(),
            width,
            height,
        )?;
        if !render_path.set_debug_mode(config.debug_mode) {
            log::warn!("Configured debug mode {} is out of range", config.debug_mode);
        }

        let mut post = PostEffectChain::new(
            device.clone(),
            catalog.assets().clone(),
            shaders,
            catalog.frame_layout(),
            Some(render_path.gbuffer_layout()),
            hdr.clone(),
        )?;
        let resources = post.resources().clone();
        if config.enable_ssr {
            post.add_effect(Box::new(SsrEffect::new(&resources)?))?;
        }
        if config.enable_ssao {
            post.add_effect(Box::new(SsaoEffect::new(&resources, SSAO_SEED)?))?;
        }
        if config.enable_auto_exposure {
            post.add_effect(Box::new(AutoExposureEffect::new(&resources)?))?;
        }
        if config.enable_bloom {
            post.add_effect(Box::new(BloomEffect::new(&resources, 1.0, 0.5)?))?;
        }
        post.add_effect(Box::new(TonemapEffect::new(&resources, config.tonemap, config.gamma)?))?;
        post.add_effect(Box::new(ColorGradingEffect::new(&resources, 1.0)?))?;
        log::info!(
            "Camera {}x{} on {} with post chain {:?}",
            width,
            height,
            config.api,
            post.effect_names()
        );

        let physical = PhysicalExposure::default();
        Ok(Self {
            device,
            api: config.api,
            width,
            height,
            projection: Projection::default(),
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            view: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_dirty: true,
            projection_dirty: true,
            last_exposure: physical.exposure(),
            physical,
            post,
            render_path,
            hdr,
            final_target,
            frame_buffer,
            frame_binding,
            enabled: true,
            generation: 0,
        })
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize the viewport.
    ///
    /// Unchanged dimensions are a no-op. Otherwise every owned target is
    /// recreated synchronously, together with the render path's geometry
    /// buffer and the post chain's intermediates.
    pub fn set_viewport(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.width && height == self.height {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        self.projection_dirty = true;

        self.hdr.write().resize(width, height)?;
        if let FinalTarget::Owned(container) = &mut self.final_target {
            container.resize(width, height)?;
        }
        self.render_path.resize(width, height)?;
        self.post.resize_buffers(width, height)?;
        self.generation += 1;
        log::debug!("Camera viewport {}x{}", width, height);
        Ok(())
    }

    /// How often the targets were recreated by [`Camera::set_viewport`]
    pub fn target_generation(&self) -> u64 {
        self.generation
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn set_perspective(&mut self, fov_y: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective { fov_y, near, far };
        self.projection_dirty = true;
    }

    pub fn set_orthographic(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.projection = Projection::Orthographic {
            left,
            right,
            bottom,
            top,
            near,
            far,
        };
        self.projection_dirty = true;
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.view_dirty = true;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Point the camera along `forward` with the given up vector.
    pub fn look_to(&mut self, forward: Vec3, up: Vec3) {
        self.forward = forward.normalize_or_zero();
        self.up = up.normalize_or_zero();
        self.view_dirty = true;
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    /// Projection with the API's clip-space correction applied
    pub fn build_projection(&self) -> Mat4 {
        correct_projection(self.api, self.projection.matrix(self.aspect()))
    }

    pub fn build_view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    fn update_matrices(&mut self) {
        if self.projection_dirty {
            self.projection_matrix = self.build_projection();
            self.projection_dirty = false;
        }
        if self.view_dirty {
            self.view = self.build_view();
            self.view_dirty = false;
        }
    }

    pub fn view_matrix(&mut self) -> Mat4 {
        self.update_matrices();
        self.view
    }

    pub fn projection_matrix(&mut self) -> Mat4 {
        self.update_matrices();
        self.projection_matrix
    }

    /// Render into an external target instead of an owned one.
    ///
    /// Any owned final target is released; the custom target is never
    /// resized by the camera.
    pub fn set_custom_final_target(&mut self, target: RenderTarget) {
        self.final_target = FinalTarget::Custom(target);
    }

    pub fn final_target(&self) -> RenderTarget {
        self.final_target.target()
    }

    pub fn hdr_target(&self) -> &SharedRenderTarget {
        &self.hdr
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn physical_exposure(&self) -> PhysicalExposure {
        self.physical
    }

    pub fn set_physical_exposure(&mut self, physical: PhysicalExposure) {
        self.physical = physical;
    }

    /// Exposure derived from aperture, shutter speed and ISO
    pub fn exposure(&self) -> f32 {
        self.physical.exposure()
    }

    /// Exposure the post chain used on the last rendered frame
    pub fn last_exposure(&self) -> f32 {
        self.last_exposure
    }

    pub fn frame_binding(&self) -> BindGroupHandle {
        self.frame_binding
    }

    pub fn render_path(&self) -> &DeferredRenderPath {
        &self.render_path
    }

    pub fn render_path_mut(&mut self) -> &mut DeferredRenderPath {
        &mut self.render_path
    }

    pub fn post_chain(&self) -> &PostEffectChain {
        &self.post
    }

    pub fn post_chain_mut(&mut self) -> &mut PostEffectChain {
        &mut self.post
    }

    /// Rebuild every post effect, rereading their shaders.
    pub fn reload_graphics(&mut self) -> RenderResult<()> {
        self.post.reload_graphics(self.width, self.height)
    }

    /// Render one frame of the scene in `catalog`.
    ///
    /// In a debug view the render path writes straight into the final
    /// target and the post chain is skipped.
    pub fn render(&mut self, catalog: &PipelineCatalog, time: f32) {
        if !self.enabled {
            return;
        }
        self.update_matrices();

        let proj_view = self.projection_matrix * self.view;
        let resolution = Vec2::new(self.width as f32, self.height as f32);
        let uniforms = FrameUniforms {
            proj_view,
            eye_time: self.position.extend(time),
            inv_proj: self.projection_matrix.inverse(),
            inv_view: self.view.inverse(),
            resolution: Vec4::new(resolution.x, resolution.y, 0.0, 0.0),
        };
        self.device
            .write_buffer(self.frame_buffer, 0, bytemuck::bytes_of(&uniforms));

        let in_debug = self.render_path.debug_mode().is_active();
        let output = if in_debug {
            self.final_target.target()
        } else {
            self.hdr.read().target()
        };
        let frame = FrameInputs {
            frame_binding: self.frame_binding,
            lighting: LightingFrame {
                proj_view,
                eye_position: self.position,
                resolution,
            },
        };
        self.render_path.render(
            catalog,
            RenderOutput {
                target: output,
                width: self.width,
                height: self.height,
            },
            &frame,
        );

        if !in_debug {
            self.last_exposure = self.post.process(&PostInputs {
                frame_binding: self.frame_binding,
                gbuffer_binding: Some(self.render_path.gbuffer_binding()),
                output: self.final_target.target(),
                exposure: self.physical.exposure(),
            });
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.device.destroy_bind_group(self.frame_binding);
        self.device.destroy_buffer(self.frame_buffer);
    }
}
