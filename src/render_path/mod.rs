//! Deferred render path
//!
//! One frame is a strict sequence of passes:
//! 1. Geometry - opaque materials fill the geometry buffer
//! 2. Debug - a single full-screen view of one geometry buffer channel,
//!    replacing the remaining passes when a debug mode is active
//! 3. Lighting - light volumes accumulate additively into the output
//! 4. Forward - unlit and transparent materials over the lit scene, depth
//!    tested against the geometry buffer depth

mod debug;

pub use debug::DebugMode;

use std::sync::Arc;

use crate::assets::AssetSource;
use crate::backend::{
    BindGroupEntry, BindGroupHandle, BindGroupLayoutEntry, BindGroupLayoutHandle, BindingType,
    BlendMode, BufferDescriptor, BufferHandle, DepthState, GraphicsDevice, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineHandle, RenderTarget, ShaderStageFlags, TextureKind,
    Viewport,
};
use crate::error::RenderResult;
use crate::lighting::{LightAccumulator, LightingFrame, LightingLayouts};
use crate::pipeline::PipelineCatalog;
use crate::render_target::{RenderTargetContainer, RenderTargetSpec, SharedRenderTarget, LDR_FORMAT};
use crate::resources::{GpuMesh, VolumeMesh};
use crate::shaders::{ShaderLibrary, VERTEX_FRAGMENT};
use debug::DebugUniforms;

/// Bind group slot of the per-frame uniforms
pub const FRAME_GROUP: u32 = 0;
/// Bind group slot of the geometry buffer textures
pub const GBUFFER_GROUP: u32 = 1;
const DEBUG_GROUP: u32 = 2;

/// Per-frame inputs of the render path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    /// Binding set of the camera's frame uniforms
    pub frame_binding: BindGroupHandle,
    pub lighting: LightingFrame,
}

/// Where the lit scene is written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOutput {
    pub target: RenderTarget,
    pub width: u32,
    pub height: u32,
}

/// Geometry buffer, lighting and debug view of one camera
pub struct DeferredRenderPath {
    device: Arc<dyn GraphicsDevice>,
    gbuffer: SharedRenderTarget,
    gbuffer_layout: BindGroupLayoutHandle,
    gbuffer_binding: BindGroupHandle,
    lights: LightAccumulator,
    debug_layout: BindGroupLayoutHandle,
    debug_buffer: BufferHandle,
    debug_binding: BindGroupHandle,
    debug_pipeline: Option<RenderPipelineHandle>,
    quad: GpuMesh,
    debug_mode: DebugMode,
}

impl DeferredRenderPath {
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        assets: &dyn AssetSource,
        shaders: &ShaderLibrary,
        frame_layout: BindGroupLayoutHandle,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let gbuffer =
            RenderTargetContainer::new(device.clone(), RenderTargetSpec::gbuffer(), width, height)?;

        // attachments 0..3 followed by depth
        let mut entries: Vec<BindGroupLayoutEntry> = (0..4)
            .map(|binding| BindGroupLayoutEntry {
                binding,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    kind: TextureKind::D2,
                    depth: false,
                },
            })
            .collect();
        entries.push(BindGroupLayoutEntry {
            binding: 4,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                kind: TextureKind::D2,
                depth: true,
            },
        });
        let gbuffer_layout = device.create_bind_group_layout(&entries)?;
        let gbuffer_binding = create_gbuffer_binding(device.as_ref(), gbuffer_layout, &gbuffer)?;

        let lights = LightAccumulator::new(
            device.clone(),
            assets,
            shaders,
            LightingLayouts {
                frame: frame_layout,
                gbuffer: gbuffer_layout,
            },
        )?;

        let debug_layout = device.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;
        let debug_buffer = device.create_buffer_init(
            &BufferDescriptor::uniform("debug view", std::mem::size_of::<DebugUniforms>() as u64),
            bytemuck::bytes_of(&DebugUniforms::new(DebugMode::Lit)),
        )?;
        let debug_binding = device.create_bind_group(
            debug_layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer: debug_buffer,
                    offset: 0,
                    size: None,
                },
            )],
        )?;

        let debug_pipeline = match shaders.load(assets, "debug", &VERTEX_FRAGMENT) {
            Ok(stages) => {
                let mut desc = RenderPipelineDescriptor::fullscreen("debug", stages, LDR_FORMAT);
                desc.bind_group_layouts = vec![frame_layout, gbuffer_layout, debug_layout];
                Some(device.create_render_pipeline(&desc)?)
            }
            Err(err) => {
                log::warn!("Debug view unavailable: {}", err);
                None
            }
        };

        Ok(Self {
            quad: GpuMesh::upload(device.clone(), &VolumeMesh::fullscreen_quad())?,
            device,
            gbuffer: gbuffer.into_shared(),
            gbuffer_layout,
            gbuffer_binding,
            lights,
            debug_layout,
            debug_buffer,
            debug_binding,
            debug_pipeline,
            debug_mode: DebugMode::Lit,
        })
    }

    /// Geometry buffer, for effects that sample it
    pub fn gbuffer(&self) -> &SharedRenderTarget {
        &self.gbuffer
    }

    pub fn gbuffer_layout(&self) -> BindGroupLayoutHandle {
        self.gbuffer_layout
    }

    pub fn gbuffer_binding(&self) -> BindGroupHandle {
        self.gbuffer_binding
    }

    pub fn lights(&self) -> &LightAccumulator {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightAccumulator {
        &mut self.lights
    }

    pub fn debug_mode(&self) -> DebugMode {
        self.debug_mode
    }

    /// Select a debug view by index. Values outside `0..=7` are rejected
    /// and leave the current mode unchanged.
    pub fn set_debug_mode(&mut self, index: u32) -> bool {
        match DebugMode::from_index(index) {
            Some(mode) => {
                self.apply_debug_mode(mode);
                true
            }
            None => {
                log::warn!("Ignoring invalid debug mode {}", index);
                false
            }
        }
    }

    /// Advance to the next debug view, wrapping back to the lit scene.
    pub fn cycle_debug_mode(&mut self) -> DebugMode {
        self.apply_debug_mode(self.debug_mode.next());
        self.debug_mode
    }

    fn apply_debug_mode(&mut self, mode: DebugMode) {
        self.debug_mode = mode;
        self.device.write_buffer(
            self.debug_buffer,
            0,
            bytemuck::bytes_of(&DebugUniforms::new(mode)),
        );
        log::debug!("Debug mode {:?}", mode);
    }

    /// Recreate the geometry buffer at a new size.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let mut gbuffer = self.gbuffer.write();
        gbuffer.resize(width, height)?;
        let binding = create_gbuffer_binding(self.device.as_ref(), self.gbuffer_layout, &gbuffer)?;
        self.device.destroy_bind_group(std::mem::replace(&mut self.gbuffer_binding, binding));
        Ok(())
    }

    /// Render one frame into `output`.
    pub fn render(&self, catalog: &PipelineCatalog, output: RenderOutput, frame: &FrameInputs) {
        let device = self.device.as_ref();
        let gbuffer = self.gbuffer.read();
        let viewport = Viewport::new(0, 0, output.width, output.height);

        // geometry
        device.begin_render_pass(&RenderPassDescriptor::clear("geometry", gbuffer.target()));
        device.set_viewport(viewport);
        device.set_blend_mode(BlendMode::Disabled);
        device.set_depth_state(DepthState::READ_WRITE);
        device.set_bind_group(FRAME_GROUP, frame.frame_binding);
        catalog.draw_deferred();
        device.end_render_pass();

        if self.debug_mode.is_active() {
            device.begin_render_pass(&RenderPassDescriptor::clear("debug", output.target));
            device.set_viewport(viewport);
            if let Some(pipeline) = self.debug_pipeline {
                device.set_depth_state(DepthState::DISABLED);
                device.set_render_pipeline(pipeline);
                device.set_bind_group(FRAME_GROUP, frame.frame_binding);
                device.set_bind_group(GBUFFER_GROUP, self.gbuffer_binding);
                device.set_bind_group(DEBUG_GROUP, self.debug_binding);
                self.quad.draw(device);
            }
            device.end_render_pass();
            return;
        }

        // lighting
        device.begin_render_pass(&RenderPassDescriptor::clear("lighting", output.target));
        device.set_viewport(viewport);
        device.set_depth_state(DepthState::DISABLED);
        device.set_blend_mode(BlendMode::Additive);
        device.set_bind_group(FRAME_GROUP, frame.frame_binding);
        device.set_bind_group(GBUFFER_GROUP, self.gbuffer_binding);
        self.lights.accumulate(&frame.lighting);
        device.end_render_pass();

        // forward
        if let Some(framebuffer) = gbuffer.framebuffer() {
            device.blit_depth(framebuffer, output.target, output.width, output.height);
        }
        device.begin_render_pass(&RenderPassDescriptor::load("forward", output.target));
        device.set_viewport(viewport);
        device.set_bind_group(FRAME_GROUP, frame.frame_binding);
        device.set_depth_state(DepthState::READ_WRITE);
        device.set_blend_mode(BlendMode::Disabled);
        catalog.draw_unlit();
        device.set_depth_state(DepthState::READ_ONLY);
        device.set_blend_mode(BlendMode::AdditiveAlpha);
        catalog.draw_forward();
        device.end_render_pass();
        device.set_blend_mode(BlendMode::Disabled);
    }

    /// Render shadow casters into a square depth map.
    ///
    /// `frame_binding` holds the light's view-projection in the frame
    /// uniform layout.
    pub fn render_shadow_map(
        &self,
        catalog: &PipelineCatalog,
        target: RenderTarget,
        size: u32,
        frame_binding: BindGroupHandle,
    ) {
        let device = self.device.as_ref();
        device.begin_render_pass(&RenderPassDescriptor::clear("shadow", target));
        device.set_blend_mode(BlendMode::Disabled);
        device.set_depth_state(DepthState::READ_WRITE);
        device.set_bind_group(FRAME_GROUP, frame_binding);
        catalog.draw_shadows(Viewport::new(0, 0, size, size));
        device.end_render_pass();
    }
}

impl Drop for DeferredRenderPath {
    fn drop(&mut self) {
        if let Some(pipeline) = self.debug_pipeline.take() {
            self.device.destroy_render_pipeline(pipeline);
        }
        self.device.destroy_bind_group(self.debug_binding);
        self.device.destroy_buffer(self.debug_buffer);
        self.device.destroy_bind_group_layout(self.debug_layout);
        self.device.destroy_bind_group(self.gbuffer_binding);
        self.device.destroy_bind_group_layout(self.gbuffer_layout);
    }
}

fn create_gbuffer_binding(
    device: &dyn GraphicsDevice,
    layout: BindGroupLayoutHandle,
    gbuffer: &RenderTargetContainer,
) -> RenderResult<BindGroupHandle> {
    let entries: Vec<(u32, BindGroupEntry)> = gbuffer
        .colors()
        .iter()
        .copied()
        .chain(gbuffer.depth())
        .enumerate()
        .map(|(binding, texture)| (binding as u32, BindGroupEntry::Texture(texture)))
        .collect();
    Ok(device.create_bind_group(layout, &entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::backend::{DeviceCommand, GraphicsApi, RecordingDevice, ResourceKind};
    use glam::{Mat4, Vec2, Vec3};

    fn setup(with_debug: bool) -> (Arc<RecordingDevice>, DeferredRenderPath, BindGroupLayoutHandle) {
        let device = Arc::new(RecordingDevice::new(GraphicsApi::OpenGl));
        let assets = MemorySource::new();
        if with_debug {
            assets.insert("shaders/debug.vert.glsl", "vs");
            assets.insert("shaders/debug.frag.glsl", "fs");
        }
        let shaders = ShaderLibrary::new("shaders", GraphicsApi::OpenGl);
        let frame_layout = device.create_bind_group_layout(&[]).unwrap();
        let path = DeferredRenderPath::new(device.clone(), &assets, &shaders, frame_layout, 320, 240).unwrap();
        (device, path, frame_layout)
    }

    #[test]
    fn test_debug_mode_clamp() {
        let (_, mut path, _) = setup(false);
        assert!(path.set_debug_mode(3));
        assert!(!path.set_debug_mode(8));
        assert_eq!(path.debug_mode(), DebugMode::ViewNormal);
        assert!(path.set_debug_mode(0));
        assert_eq!(path.cycle_debug_mode(), DebugMode::Distance);
    }

    #[test]
    fn test_debug_pass_replaces_lighting() {
        let (device, mut path, frame_layout) = setup(true);
        let frame_buffer = device.create_buffer(&BufferDescriptor::uniform("frame", 16)).unwrap();
        let frame_binding = device
            .create_bind_group(
                frame_layout,
                &[(0, BindGroupEntry::Buffer { buffer: frame_buffer, offset: 0, size: None })],
            )
            .unwrap();
        let assets = MemorySource::new();
        let catalog = PipelineCatalog::new(device.clone(), Arc::new(assets)).unwrap();
        let inputs = FrameInputs {
            frame_binding,
            lighting: LightingFrame {
                proj_view: Mat4::IDENTITY,
                eye_position: Vec3::ZERO,
                resolution: Vec2::new(320.0, 240.0),
            },
        };
        let output = RenderOutput {
            target: RenderTarget::Default,
            width: 320,
            height: 240,
        };

        path.set_debug_mode(4);
        device.clear_commands();
        path.render(&catalog, output, &inputs);
        let passes: Vec<String> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::BeginRenderPass(desc) => desc.label.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(passes, vec!["geometry", "debug"]);
        assert_eq!(device.bind_count_by_label("debug"), 1);
        // the debug view writes the display-ready final target
        let debug = path.debug_pipeline.unwrap();
        assert_eq!(device.pipeline_formats(debug), Some(vec![LDR_FORMAT]));

        path.set_debug_mode(0);
        device.clear_commands();
        path.render(&catalog, output, &inputs);
        let commands = device.commands();
        assert!(commands.contains(&DeviceCommand::SetBlendMode(BlendMode::Additive)));
        assert!(commands.iter().any(|c| matches!(c, DeviceCommand::BlitDepth { .. })));
        assert_eq!(device.bind_count_by_label("debug"), 0);
    }

    #[test]
    fn test_resize_recreates_gbuffer() {
        let (device, mut path, _) = setup(false);
        let before = path.gbuffer_binding();
        path.resize(640, 480).unwrap();
        assert_ne!(path.gbuffer_binding(), before);
        assert_eq!(path.gbuffer().read().width(), 640);
        // 4 color attachments + depth stay alive, the old ones are gone
        assert_eq!(device.live_count(ResourceKind::Texture), 5);
    }
}
