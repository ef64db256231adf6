//! Post-processing effects
//!
//! A [`PostEffectChain`] is an explicit directed chain: every effect declares
//! the color stream it reads and what it produces, the chain rejects effects
//! whose input does not match the stream built so far, and source/target
//! containers are assigned automatically. Intermediate targets ping-pong per
//! stream format; the last stream-producing effect writes the final output.

mod auto_exposure;
mod bloom;
mod color_grading;
mod ssao;
mod ssr;
mod tonemap;

pub use auto_exposure::{AutoExposureEffect, LUMINANCE_SIZE};
pub use bloom::BloomEffect;
pub use color_grading::ColorGradingEffect;
pub use ssao::{SsaoEffect, SSAO_KERNEL_SIZE, SSAO_NOISE_DIM};
pub use ssr::SsrEffect;
pub use tonemap::{TonemapEffect, TonemapOperator};

use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::AssetSource;
use crate::backend::{
    BindGroupEntry, BindGroupHandle, BindGroupLayoutEntry, BindGroupLayoutHandle, BindingType,
    BlendMode, BufferDescriptor, BufferHandle, DepthState, GraphicsDevice, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineHandle, RenderTarget, ShaderStageFlags, TextureFormat,
    TextureKind, Viewport,
};
use crate::error::{RenderError, RenderResult};
use crate::render_target::{RenderTargetContainer, RenderTargetSpec, SharedRenderTarget, HDR_FORMAT, LDR_FORMAT};
use crate::resources::{GpuMesh, VolumeMesh};
use crate::shaders::{ShaderLibrary, VERTEX_FRAGMENT};

/// Bind group slots shared by every post effect pipeline
pub const FRAME_GROUP: u32 = 0;
pub const STREAM_GROUP: u32 = 1;
pub const GBUFFER_GROUP: u32 = 2;
pub const EFFECT_GROUP: u32 = 3;

/// Format of the color stream flowing through the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFormat {
    /// Linear high dynamic range color
    Hdr,
    /// Display-ready low dynamic range color
    Ldr,
}

impl StreamFormat {
    pub fn texture_format(&self) -> TextureFormat {
        match self {
            StreamFormat::Hdr => HDR_FORMAT,
            StreamFormat::Ldr => LDR_FORMAT,
        }
    }
}

/// What an effect produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutput {
    /// A new color stream of the given format
    Stream(StreamFormat),
    /// Only side data (for example a measured exposure); the stream passes through
    Side,
}

/// Declared inputs and output of an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectIo {
    pub input: StreamFormat,
    pub output: EffectOutput,
    /// Samples the geometry buffer; only bound for effects that declare it
    pub needs_gbuffer: bool,
}

impl EffectIo {
    pub fn stream(input: StreamFormat, output: StreamFormat) -> Self {
        Self {
            input,
            output: EffectOutput::Stream(output),
            needs_gbuffer: false,
        }
    }

    pub fn side(input: StreamFormat) -> Self {
        Self {
            input,
            output: EffectOutput::Side,
            needs_gbuffer: false,
        }
    }

    pub fn with_gbuffer(mut self) -> Self {
        self.needs_gbuffer = true;
        self
    }
}

/// State handed to an effect while the chain runs
pub struct PostContext<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub quad: &'a GpuMesh,
    pub frame_binding: BindGroupHandle,
    /// Set only while an effect that declared the geometry buffer runs
    pub gbuffer_binding: Option<BindGroupHandle>,
    /// Binding set sampling the current color stream
    pub source: BindGroupHandle,
    /// Where a stream-producing effect writes; `None` for side-output effects
    pub target: Option<RenderTarget>,
    pub width: u32,
    pub height: u32,
    /// Exposure applied by tonemapping; effects may replace it
    pub exposure: f32,
}

/// Inputs of one chain run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostInputs {
    pub frame_binding: BindGroupHandle,
    pub gbuffer_binding: Option<BindGroupHandle>,
    /// Final output of the chain
    pub output: RenderTarget,
    /// Exposure before any effect adjusts it
    pub exposure: f32,
}

/// A post-processing stage
pub trait PostEffect {
    fn name(&self) -> &str;

    /// Declared inputs and output, checked when the effect is chained
    fn io(&self) -> EffectIo;

    /// Run the effect inside its own render pass.
    fn process(&mut self, ctx: &mut PostContext<'_>);

    /// Recreate every GPU object, rereading shader files.
    fn reload_graphics(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// Release every GPU object; the effect is inert until reloaded.
    fn destroy_graphics(&mut self);

    /// Recreate size-dependent buffers.
    fn resize_buffers(&mut self, _width: u32, _height: u32) -> RenderResult<()> {
        Ok(())
    }
}

/// Layouts and sources every effect builds its pipelines from
#[derive(Clone)]
pub struct PostResources {
    pub device: Arc<dyn GraphicsDevice>,
    pub assets: Arc<dyn AssetSource>,
    pub shaders: ShaderLibrary,
    pub frame_layout: BindGroupLayoutHandle,
    pub stream_layout: BindGroupLayoutHandle,
    /// `None` when the chain runs without a geometry buffer
    pub gbuffer_layout: Option<BindGroupLayoutHandle>,
    /// Empty layout filling the geometry buffer group when there is none
    pub placeholder_layout: BindGroupLayoutHandle,
}

/// Full-screen pipeline of one effect, rebuilt on reload
pub(crate) struct FullscreenPass {
    resources: PostResources,
    program: &'static str,
    effect_layout: Option<BindGroupLayoutHandle>,
    format: TextureFormat,
    pipeline: Option<RenderPipelineHandle>,
}

impl FullscreenPass {
    pub fn new(
        resources: &PostResources,
        program: &'static str,
        effect_layout: Option<BindGroupLayoutHandle>,
        format: TextureFormat,
    ) -> RenderResult<Self> {
        let mut pass = Self {
            resources: resources.clone(),
            program,
            effect_layout,
            format,
            pipeline: None,
        };
        pass.build()?;
        Ok(pass)
    }

    /// Build the pipeline; a missing stage file fails with
    /// [`RenderError::MissingShaderStage`].
    pub fn build(&mut self) -> RenderResult<()> {
        let resources = &self.resources;
        let stages = resources
            .shaders
            .load(resources.assets.as_ref(), self.program, &VERTEX_FRAGMENT)?;
        let mut desc = RenderPipelineDescriptor::fullscreen(self.program, stages, self.format);
        desc.bind_group_layouts = vec![
            resources.frame_layout,
            resources.stream_layout,
            resources.gbuffer_layout.unwrap_or(resources.placeholder_layout),
        ];
        desc.bind_group_layouts.extend(self.effect_layout);
        let pipeline = resources.device.create_render_pipeline(&desc)?;
        self.destroy();
        self.pipeline = Some(pipeline);
        Ok(())
    }

    pub fn destroy(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            self.resources.device.destroy_render_pipeline(pipeline);
        }
    }

    pub fn is_built(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Draw one full-screen quad into `target`.
    pub fn run(&self, ctx: &PostContext<'_>, target: RenderTarget, width: u32, height: u32, effect: Option<BindGroupHandle>) {
        let Some(pipeline) = self.pipeline else {
            return;
        };
        let device = ctx.device;
        device.begin_render_pass(&RenderPassDescriptor::clear(self.program, target));
        device.set_viewport(Viewport::new(0, 0, width, height));
        device.set_depth_state(DepthState::DISABLED);
        device.set_blend_mode(BlendMode::Disabled);
        device.set_render_pipeline(pipeline);
        device.set_bind_group(FRAME_GROUP, ctx.frame_binding);
        device.set_bind_group(STREAM_GROUP, ctx.source);
        if let Some(gbuffer) = ctx.gbuffer_binding {
            device.set_bind_group(GBUFFER_GROUP, gbuffer);
        }
        if let Some(effect) = effect {
            device.set_bind_group(EFFECT_GROUP, effect);
        }
        ctx.quad.draw(device);
        device.end_render_pass();
    }
}

impl Drop for FullscreenPass {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Uniform block owned by one effect
pub(crate) struct UniformBlock {
    device: Arc<dyn GraphicsDevice>,
    layout: BindGroupLayoutHandle,
    buffer: BufferHandle,
    binding: BindGroupHandle,
}

impl UniformBlock {
    pub fn new(device: Arc<dyn GraphicsDevice>, label: &str, data: &[u8]) -> RenderResult<Self> {
        let layout = device.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;
        let buffer = device.create_buffer_init(&BufferDescriptor::uniform(label, data.len() as u64), data)?;
        let binding = device.create_bind_group(
            layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer,
                    offset: 0,
                    size: None,
                },
            )],
        )?;
        Ok(Self {
            device,
            layout,
            buffer,
            binding,
        })
    }

    pub fn layout(&self) -> BindGroupLayoutHandle {
        self.layout
    }

    pub fn binding(&self) -> BindGroupHandle {
        self.binding
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn write(&self, data: &[u8]) {
        self.device.write_buffer(self.buffer, 0, data);
    }
}

impl Drop for UniformBlock {
    fn drop(&mut self) {
        self.device.destroy_bind_group(self.binding);
        self.device.destroy_buffer(self.buffer);
        self.device.destroy_bind_group_layout(self.layout);
    }
}

/// Ping-pong slot: stream format and alternating index
type Slot = (StreamFormat, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    Intermediate(Slot),
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Route {
    /// `None` reads the chain input
    source: Option<Slot>,
    /// `None` for side-output effects
    target: Option<Destination>,
}

struct Stage {
    effect: Box<dyn PostEffect>,
    io: EffectIo,
    route: Route,
}

struct Intermediate {
    device: Arc<dyn GraphicsDevice>,
    target: RenderTargetContainer,
    binding: BindGroupHandle,
}

impl Intermediate {
    fn new(device: Arc<dyn GraphicsDevice>, layout: BindGroupLayoutHandle, slot: Slot, width: u32, height: u32) -> RenderResult<Self> {
        let label = format!("post {:?} {}", slot.0, slot.1);
        let target = RenderTargetContainer::new(
            device.clone(),
            RenderTargetSpec::new(&label, &[slot.0.texture_format()], None),
            width,
            height,
        )?;
        let binding = stream_binding(device.as_ref(), layout, &target)?;
        Ok(Self {
            device,
            target,
            binding,
        })
    }

    fn resize(&mut self, layout: BindGroupLayoutHandle, width: u32, height: u32) -> RenderResult<()> {
        self.target.resize(width, height)?;
        let binding = stream_binding(self.device.as_ref(), layout, &self.target)?;
        self.device.destroy_bind_group(std::mem::replace(&mut self.binding, binding));
        Ok(())
    }
}

impl Drop for Intermediate {
    fn drop(&mut self) {
        self.device.destroy_bind_group(self.binding);
    }
}

fn stream_binding(
    device: &dyn GraphicsDevice,
    layout: BindGroupLayoutHandle,
    target: &RenderTargetContainer,
) -> RenderResult<BindGroupHandle> {
    let entries: Vec<(u32, BindGroupEntry)> = target
        .color(0)
        .map(|texture| (0, BindGroupEntry::Texture(texture)))
        .into_iter()
        .collect();
    Ok(device.create_bind_group(layout, &entries)?)
}

/// Ordered post effects of one camera
pub struct PostEffectChain {
    resources: PostResources,
    input: SharedRenderTarget,
    input_binding: BindGroupHandle,
    quad: GpuMesh,
    stages: Vec<Stage>,
    intermediates: HashMap<Slot, Intermediate>,
    stream: StreamFormat,
    width: u32,
    height: u32,
}

impl PostEffectChain {
    /// Create an empty chain reading the HDR color of `input`.
    ///
    /// Without a `gbuffer_layout`, effects that sample the geometry buffer
    /// are rejected by [`PostEffectChain::add_effect`].
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        assets: Arc<dyn AssetSource>,
        shaders: ShaderLibrary,
        frame_layout: BindGroupLayoutHandle,
        gbuffer_layout: Option<BindGroupLayoutHandle>,
        input: SharedRenderTarget,
    ) -> RenderResult<Self> {
        let stream_layout = device.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                kind: TextureKind::D2,
                depth: false,
            },
        }])?;
        let placeholder_layout = device.create_bind_group_layout(&[])?;
        let (input_binding, width, height) = {
            let input = input.read();
            (
                stream_binding(device.as_ref(), stream_layout, &input)?,
                input.width(),
                input.height(),
            )
        };
        Ok(Self {
            quad: GpuMesh::upload(device.clone(), &VolumeMesh::fullscreen_quad())?,
            resources: PostResources {
                device,
                assets,
                shaders,
                frame_layout,
                stream_layout,
                gbuffer_layout,
                placeholder_layout,
            },
            input,
            input_binding,
            stages: Vec::new(),
            intermediates: HashMap::new(),
            stream: StreamFormat::Hdr,
            width,
            height,
        })
    }

    /// Layouts and sources effects for this chain are built from
    pub fn resources(&self) -> &PostResources {
        &self.resources
    }

    /// Whether effects sampling the geometry buffer can be chained
    pub fn has_gbuffer(&self) -> bool {
        self.resources.gbuffer_layout.is_some()
    }

    /// Format of the stream after the last chained effect
    pub fn output_format(&self) -> StreamFormat {
        self.stream
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn effect_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.effect.name()).collect()
    }

    /// Number of ping-pong targets currently allocated
    pub fn intermediate_count(&self) -> usize {
        self.intermediates.len()
    }

    /// Append an effect.
    ///
    /// Fails with [`RenderError::IncompatibleEffect`] when the effect's
    /// input format differs from the current stream format or it needs a
    /// geometry buffer the chain does not have. A failed append leaves the
    /// chain untouched.
    pub fn add_effect(&mut self, effect: Box<dyn PostEffect>) -> RenderResult<()> {
        let io = effect.io();
        if io.input != self.stream {
            return Err(RenderError::IncompatibleEffect {
                effect: effect.name().to_string(),
                reason: format!("expects {:?} input, chain produces {:?}", io.input, self.stream),
            });
        }
        if io.needs_gbuffer && !self.has_gbuffer() {
            return Err(RenderError::IncompatibleEffect {
                effect: effect.name().to_string(),
                reason: "samples the geometry buffer, chain has none".to_string(),
            });
        }

        let outputs: Vec<EffectOutput> = self
            .stages
            .iter()
            .map(|s| s.io.output)
            .chain(std::iter::once(io.output))
            .collect();
        let (routes, needed) = plan_routes(&outputs);
        let mut created = HashMap::new();
        for slot in needed.iter().copied() {
            if self.intermediates.contains_key(&slot) || created.contains_key(&slot) {
                continue;
            }
            let intermediate = Intermediate::new(
                self.resources.device.clone(),
                self.resources.stream_layout,
                slot,
                self.width,
                self.height,
            )?;
            created.insert(slot, intermediate);
        }

        self.intermediates.retain(|slot, _| needed.contains(slot));
        self.intermediates.extend(created);
        for (stage, route) in self.stages.iter_mut().zip(&routes) {
            stage.route = *route;
        }
        let route = routes[self.stages.len()];
        if let EffectOutput::Stream(format) = io.output {
            self.stream = format;
        }
        log::debug!("Chained post effect {} ({:?})", effect.name(), io);
        self.stages.push(Stage { effect, io, route });
        Ok(())
    }

    /// Run every effect in registration order and return the exposure the
    /// chain ended with.
    pub fn process(&mut self, inputs: &PostInputs) -> f32 {
        let device = self.resources.device.clone();
        let mut ctx = PostContext {
            device: device.as_ref(),
            quad: &self.quad,
            frame_binding: inputs.frame_binding,
            gbuffer_binding: None,
            source: self.input_binding,
            target: None,
            width: self.width,
            height: self.height,
            exposure: inputs.exposure,
        };

        for stage in &mut self.stages {
            ctx.source = stage
                .route
                .source
                .and_then(|slot| self.intermediates.get(&slot))
                .map_or(self.input_binding, |i| i.binding);
            ctx.target = match stage.route.target {
                Some(Destination::Output) => Some(inputs.output),
                Some(Destination::Intermediate(slot)) => {
                    self.intermediates.get(&slot).map(|i| i.target.target())
                }
                None => None,
            };
            ctx.gbuffer_binding = if stage.io.needs_gbuffer {
                if inputs.gbuffer_binding.is_none() {
                    log::warn!("{} runs without a geometry buffer", stage.effect.name());
                }
                inputs.gbuffer_binding
            } else {
                None
            };
            stage.effect.process(&mut ctx);
        }
        ctx.exposure
    }

    /// Recreate intermediates and every effect's size-dependent buffers.
    ///
    /// The input container must already have its new size.
    pub fn resize_buffers(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.width = width;
        self.height = height;
        let binding = stream_binding(
            self.resources.device.as_ref(),
            self.resources.stream_layout,
            &self.input.read(),
        )?;
        self.resources
            .device
            .destroy_bind_group(std::mem::replace(&mut self.input_binding, binding));
        for intermediate in self.intermediates.values_mut() {
            intermediate.resize(self.resources.stream_layout, width, height)?;
        }
        for stage in &mut self.stages {
            stage.effect.resize_buffers(width, height)?;
        }
        Ok(())
    }

    /// Rebuild every effect's GPU objects.
    pub fn reload_graphics(&mut self, width: u32, height: u32) -> RenderResult<()> {
        for stage in &mut self.stages {
            stage.effect.reload_graphics(width, height)?;
        }
        Ok(())
    }

    /// Release every effect's GPU objects.
    pub fn destroy_graphics(&mut self) {
        for stage in &mut self.stages {
            stage.effect.destroy_graphics();
        }
    }
}

impl Drop for PostEffectChain {
    fn drop(&mut self) {
        self.stages.clear();
        self.intermediates.clear();
        self.resources.device.destroy_bind_group(self.input_binding);
        self.resources
            .device
            .destroy_bind_group_layout(self.resources.stream_layout);
        self.resources
            .device
            .destroy_bind_group_layout(self.resources.placeholder_layout);
    }
}

/// Assign sources and targets for effects with the given outputs.
///
/// The last stream-producing effect writes the chain output; every other one
/// alternates between two intermediates of its format. Returns one route per
/// effect and the intermediate slots written.
fn plan_routes(outputs: &[EffectOutput]) -> (Vec<Route>, Vec<Slot>) {
    let last_stream = outputs
        .iter()
        .rposition(|output| matches!(output, EffectOutput::Stream(_)));

    let mut source: Option<Slot> = None;
    let mut needed = Vec::new();
    let mut routes = Vec::with_capacity(outputs.len());
    for (index, output) in outputs.iter().enumerate() {
        let target = match *output {
            EffectOutput::Side => None,
            EffectOutput::Stream(_) if Some(index) == last_stream => Some(Destination::Output),
            EffectOutput::Stream(format) => {
                let slot = match source {
                    Some((current, used)) if current == format => (format, 1 - used),
                    _ => (format, 0),
                };
                needed.push(slot);
                Some(Destination::Intermediate(slot))
            }
        };
        routes.push(Route { source, target });
        if let Some(Destination::Intermediate(slot)) = target {
            source = Some(slot);
        }
    }
    (routes, needed)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::assets::MemorySource;
    use crate::backend::{GraphicsApi, RecordingDevice};

    pub const PROGRAMS: [&str; 7] = [
        "post/tonemap",
        "post/color_grading",
        "post/bloom",
        "post/ssr",
        "post/ssao",
        "post/luminance",
        "debug",
    ];

    pub struct Fixture {
        pub device: Arc<RecordingDevice>,
        pub assets: Arc<MemorySource>,
        pub input: SharedRenderTarget,
        pub chain: PostEffectChain,
    }

    pub fn fixture() -> Fixture {
        fixture_with_gbuffer(true)
    }

    pub fn fixture_with_gbuffer(gbuffer: bool) -> Fixture {
        let device = Arc::new(RecordingDevice::new(GraphicsApi::OpenGl));
        let assets = Arc::new(MemorySource::new());
        for program in PROGRAMS {
            assets.insert(&format!("shaders/{}.vert.glsl", program), "vs");
            assets.insert(&format!("shaders/{}.frag.glsl", program), "fs");
        }
        let frame_layout = device.create_bind_group_layout(&[]).unwrap();
        let gbuffer_layout = device.create_bind_group_layout(&[]).unwrap();
        let input = RenderTargetContainer::new(device.clone(), RenderTargetSpec::hdr("hdr"), 64, 32)
            .unwrap()
            .into_shared();
        let chain = PostEffectChain::new(
            device.clone(),
            assets.clone(),
            ShaderLibrary::new("shaders", GraphicsApi::OpenGl),
            frame_layout,
            gbuffer.then_some(gbuffer_layout),
            input.clone(),
        )
        .unwrap();
        Fixture {
            device,
            assets,
            input,
            chain,
        }
    }

    pub fn inputs(device: &RecordingDevice) -> PostInputs {
        let layout = device.create_bind_group_layout(&[]).unwrap();
        let frame_binding = device.create_bind_group(layout, &[]).unwrap();
        PostInputs {
            frame_binding,
            gbuffer_binding: Some(frame_binding),
            output: RenderTarget::Default,
            exposure: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::backend::{DeviceCommand, ResourceKind};

    fn pass_targets(device: &crate::backend::RecordingDevice) -> Vec<(String, RenderTarget)> {
        device
            .commands()
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::BeginRenderPass(desc) => Some((desc.label.clone()?, desc.target)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rejects_mismatched_input() {
        let mut f = fixture();
        let grading = ColorGradingEffect::new(f.chain.resources(), 1.0).unwrap();
        let err = f.chain.add_effect(Box::new(grading)).unwrap_err();
        assert!(matches!(err, RenderError::IncompatibleEffect { ref effect, .. } if effect == "ColorGrading"));
        assert!(f.chain.is_empty());

        let tonemap = TonemapEffect::new(f.chain.resources(), TonemapOperator::Aces, 2.2).unwrap();
        f.chain.add_effect(Box::new(tonemap)).unwrap();
        assert_eq!(f.chain.output_format(), StreamFormat::Ldr);

        let bloom = BloomEffect::new(f.chain.resources(), 1.0, 0.5).unwrap();
        assert!(f.chain.add_effect(Box::new(bloom)).is_err());
    }

    #[test]
    fn test_gbuffer_effects_need_gbuffer() {
        let mut f = fixture_with_gbuffer(false);
        assert!(!f.chain.has_gbuffer());
        let ssr = SsrEffect::new(f.chain.resources()).unwrap();
        let err = f.chain.add_effect(Box::new(ssr)).unwrap_err();
        assert!(matches!(err, RenderError::IncompatibleEffect { ref effect, .. } if effect == "Ssr"));
        assert!(f.chain.is_empty());

        let bloom = BloomEffect::new(f.chain.resources(), 1.0, 0.5).unwrap();
        f.chain.add_effect(Box::new(bloom)).unwrap();
        assert_eq!(f.chain.len(), 1);
    }

    #[test]
    fn test_gbuffer_bound_only_where_declared() {
        let mut f = fixture();
        let resources = f.chain.resources().clone();
        f.chain.add_effect(Box::new(SsaoEffect::new(&resources, 7).unwrap())).unwrap();
        f.chain.add_effect(Box::new(TonemapEffect::new(&resources, TonemapOperator::Aces, 2.2).unwrap())).unwrap();
        f.device.clear_commands();
        f.chain.process(&inputs(&f.device));

        let commands = f.device.commands();
        let passes: Vec<usize> = commands
            .iter()
            .enumerate()
            .filter_map(|(i, c)| matches!(c, DeviceCommand::BeginRenderPass(_)).then_some(i))
            .collect();
        assert_eq!(passes.len(), 2);
        let binds_gbuffer = |range: &[DeviceCommand]| {
            range
                .iter()
                .any(|c| matches!(c, DeviceCommand::SetBindGroup { index, .. } if *index == GBUFFER_GROUP))
        };
        assert!(binds_gbuffer(&commands[passes[0]..passes[1]]));
        assert!(!binds_gbuffer(&commands[passes[1]..]));
    }

    #[test]
    fn test_failed_append_leaves_chain_untouched() {
        let mut f = fixture();
        let resources = f.chain.resources().clone();
        f.chain.add_effect(Box::new(TonemapEffect::new(&resources, TonemapOperator::Aces, 2.2).unwrap())).unwrap();
        // no intermediates yet, so a zero extent is accepted
        f.chain.resize_buffers(0, 0).unwrap();

        // grading pushes tonemap into an ldr intermediate, which cannot be created
        let grading = ColorGradingEffect::new(&resources, 0.5).unwrap();
        assert!(f.chain.add_effect(Box::new(grading)).is_err());
        assert_eq!(f.chain.len(), 1);
        assert_eq!(f.chain.output_format(), StreamFormat::Ldr);
        assert_eq!(f.chain.intermediate_count(), 0);

        f.device.clear_commands();
        f.chain.process(&inputs(&f.device));
        let targets = pass_targets(&f.device);
        assert_eq!(targets, vec![("post/tonemap".to_string(), RenderTarget::Default)]);
    }

    #[test]
    fn test_ping_pong_routing() {
        let mut f = fixture();
        let resources = f.chain.resources().clone();
        f.chain.add_effect(Box::new(SsaoEffect::new(&resources, 7).unwrap())).unwrap();
        f.chain.add_effect(Box::new(BloomEffect::new(&resources, 1.0, 0.5).unwrap())).unwrap();
        f.chain.add_effect(Box::new(TonemapEffect::new(&resources, TonemapOperator::Aces, 2.2).unwrap())).unwrap();
        f.chain.add_effect(Box::new(ColorGradingEffect::new(&resources, 0.5).unwrap())).unwrap();
        // ssao -> hdr 0, bloom -> hdr 1, tonemap -> ldr 0, grading -> output
        assert_eq!(f.chain.intermediate_count(), 3);

        let inputs = inputs(&f.device);
        f.device.clear_commands();
        f.chain.process(&inputs);

        let targets = pass_targets(&f.device);
        let labels: Vec<&str> = targets.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["post/ssao", "post/bloom", "post/tonemap", "post/color_grading"]);
        assert_ne!(targets[0].1, targets[1].1);
        assert_ne!(targets[1].1, targets[2].1);
        assert_eq!(targets[3].1, RenderTarget::Default);
        assert!(targets[..3].iter().all(|(_, t)| *t != RenderTarget::Default));
        assert_ne!(targets[0].1, f.input.read().target());
    }

    #[test]
    fn test_side_output_keeps_stream() {
        let mut f = fixture();
        let resources = f.chain.resources().clone();
        f.chain.add_effect(Box::new(AutoExposureEffect::new(&resources).unwrap())).unwrap();
        assert_eq!(f.chain.output_format(), StreamFormat::Hdr);
        f.chain.add_effect(Box::new(TonemapEffect::new(&resources, TonemapOperator::Reinhard, 2.2).unwrap())).unwrap();
        assert_eq!(f.chain.intermediate_count(), 0);

        f.device.set_average_value(0.09);
        let exposure = f.chain.process(&inputs(&f.device));
        assert!((exposure - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_resize_and_drop_release_everything() {
        let mut f = fixture();
        let resources = f.chain.resources().clone();
        f.chain.add_effect(Box::new(BloomEffect::new(&resources, 1.0, 0.5).unwrap())).unwrap();
        f.chain.add_effect(Box::new(TonemapEffect::new(&resources, TonemapOperator::Aces, 2.2).unwrap())).unwrap();
        drop(resources);

        f.input.write().resize(128, 64).unwrap();
        f.chain.resize_buffers(128, 64).unwrap();
        let textures = f.device.live_count(ResourceKind::Texture);
        // hdr input color + depth, one hdr intermediate
        assert_eq!(textures, 3);

        drop(f.chain);
        assert_eq!(f.device.live_count(ResourceKind::RenderPipeline), 0);
        assert_eq!(f.device.live_count(ResourceKind::Texture), 2);
    }

    #[test]
    fn test_destroy_and_reload_broadcast() {
        let mut f = fixture();
        let resources = f.chain.resources().clone();
        f.chain.add_effect(Box::new(BloomEffect::new(&resources, 1.0, 0.5).unwrap())).unwrap();
        f.chain.add_effect(Box::new(TonemapEffect::new(&resources, TonemapOperator::Aces, 2.2).unwrap())).unwrap();
        assert_eq!(f.device.live_count(ResourceKind::RenderPipeline), 2);

        f.chain.destroy_graphics();
        assert_eq!(f.device.live_count(ResourceKind::RenderPipeline), 0);
        f.device.clear_commands();
        f.chain.process(&inputs(&f.device));
        assert_eq!(f.device.draw_count(), 0);

        f.chain.reload_graphics(64, 32).unwrap();
        assert_eq!(f.device.live_count(ResourceKind::RenderPipeline), 2);

        f.assets.remove("shaders/post/bloom.frag.glsl");
        assert!(matches!(
            f.chain.reload_graphics(64, 32),
            Err(RenderError::MissingShaderStage { .. })
        ));
    }
}
