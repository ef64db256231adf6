//! Headless recording device.
//!
//! Allocates handles, tracks which objects are alive and keeps the full
//! command stream in memory. No GPU work is performed, which makes it the
//! device of choice for tests and offline tools.

use std::collections::HashMap;
use std::ops::Range;

use parking_lot::Mutex;

use super::traits::*;
use super::types::*;

/// Kind of object a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Framebuffer,
    BindGroupLayout,
    BindGroup,
    RenderPipeline,
}

/// A command recorded by [`RecordingDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    SetRenderPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
    },
    SetViewport(Viewport),
    SetBlendMode(BlendMode),
    SetDepthState(DepthState),
    BlitDepth {
        source: FramebufferHandle,
        destination: RenderTarget,
    },
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: usize,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

impl DeviceCommand {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DeviceCommand::Draw { .. } | DeviceCommand::DrawIndexed { .. }
        )
    }
}

#[derive(Default)]
struct RecordingState {
    next_handle: u64,
    commands: Vec<DeviceCommand>,
    live: HashMap<u64, ResourceKind>,
    labels: HashMap<u64, String>,
    created: HashMap<ResourceKind, usize>,
    buffers: HashMap<u64, Vec<u8>>,
    /// Color formats of textures, framebuffers and pipelines
    formats: HashMap<u64, Vec<TextureFormat>>,
    texture_usage: HashMap<u64, TextureUsage>,
    buffer_usage: HashMap<u64, BufferUsage>,
    average_value: f32,
}

impl RecordingState {
    fn allocate(&mut self, kind: ResourceKind, label: Option<&str>) -> u64 {
        self.next_handle += 1;
        let id = self.next_handle;
        self.live.insert(id, kind);
        if let Some(label) = label {
            self.labels.insert(id, label.to_string());
        }
        *self.created.entry(kind).or_insert(0) += 1;
        id
    }

    fn release(&mut self, id: u64, kind: ResourceKind) {
        match self.live.get(&id) {
            Some(live_kind) if *live_kind == kind => {
                self.live.remove(&id);
                self.buffers.remove(&id);
                self.formats.remove(&id);
                self.texture_usage.remove(&id);
                self.buffer_usage.remove(&id);
            }
            _ => log::warn!("RecordingDevice: destroying unknown {:?} handle {}", kind, id),
        }
    }
}

/// Graphics device that records commands instead of executing them
pub struct RecordingDevice {
    api: GraphicsApi,
    state: Mutex<RecordingState>,
}

impl RecordingDevice {
    pub fn new(api: GraphicsApi) -> Self {
        Self {
            api,
            state: Mutex::new(RecordingState {
                average_value: 0.18,
                ..Default::default()
            }),
        }
    }

    /// Snapshot of every command recorded so far
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.state.lock().commands.clone()
    }

    /// Forget recorded commands (live objects are kept)
    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Number of objects of `kind` created over the device lifetime
    pub fn created_count(&self, kind: ResourceKind) -> usize {
        self.state.lock().created.get(&kind).copied().unwrap_or(0)
    }

    /// Number of objects of `kind` currently alive
    pub fn live_count(&self, kind: ResourceKind) -> usize {
        self.state
            .lock()
            .live
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    /// Label a pipeline was created with
    pub fn pipeline_label(&self, pipeline: RenderPipelineHandle) -> Option<String> {
        self.state.lock().labels.get(&pipeline.0).cloned()
    }

    /// Color attachment formats a pipeline was created for
    pub fn pipeline_formats(&self, pipeline: RenderPipelineHandle) -> Option<Vec<TextureFormat>> {
        self.state.lock().formats.get(&pipeline.0).cloned()
    }

    /// Color formats of an offscreen target; `None` for the default framebuffer
    pub fn target_formats(&self, target: RenderTarget) -> Option<Vec<TextureFormat>> {
        match target {
            RenderTarget::Framebuffer(framebuffer) => {
                self.state.lock().formats.get(&framebuffer.0).cloned()
            }
            RenderTarget::Default => None,
        }
    }

    /// How often `pipeline` was bound in the recorded commands
    pub fn bind_count(&self, pipeline: RenderPipelineHandle) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| **c == DeviceCommand::SetRenderPipeline(pipeline))
            .count()
    }

    /// How often any pipeline whose label starts with `prefix` was bound
    pub fn bind_count_by_label(&self, prefix: &str) -> usize {
        let state = self.state.lock();
        state
            .commands
            .iter()
            .filter(|c| match c {
                DeviceCommand::SetRenderPipeline(handle) => state
                    .labels
                    .get(&handle.0)
                    .is_some_and(|label| label.starts_with(prefix)),
                _ => false,
            })
            .count()
    }

    /// Number of draw calls recorded
    pub fn draw_count(&self) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| c.is_draw())
            .count()
    }

    /// Draw calls recorded inside every pass labelled `label`
    pub fn draw_count_in_pass(&self, label: &str) -> usize {
        let state = self.state.lock();
        let mut inside = false;
        let mut count = 0;
        for command in &state.commands {
            match command {
                DeviceCommand::BeginRenderPass(desc) => {
                    inside = desc.label.as_deref() == Some(label);
                }
                DeviceCommand::EndRenderPass => inside = false,
                c if inside && c.is_draw() => count += 1,
                _ => {}
            }
        }
        count
    }

    /// Current contents of a buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer.0).cloned()
    }

    /// Value returned by [`GraphicsDevice::average_value`]
    pub fn set_average_value(&self, value: f32) {
        self.state.lock().average_value = value;
    }

    fn record(&self, command: DeviceCommand) {
        self.state.lock().commands.push(command);
    }
}

impl GraphicsDevice for RecordingDevice {
    fn api(&self) -> GraphicsApi {
        self.api
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> DeviceResult<BufferHandle> {
        log::trace!(
            "RecordingDevice: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let mut state = self.state.lock();
        let id = state.allocate(ResourceKind::Buffer, desc.label.as_deref());
        state.buffers.insert(id, vec![0; desc.size as usize]);
        state.buffer_usage.insert(id, desc.usage);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> DeviceResult<BufferHandle> {
        if data.len() as u64 > desc.size {
            return Err(DeviceError::BufferCreationFailed(format!(
                "{} bytes of data exceed buffer size {}",
                data.len(),
                desc.size
            )));
        }
        let handle = self.create_buffer(desc)?;
        if let Some(contents) = self.state.lock().buffers.get_mut(&handle.0) {
            contents[..data.len()].copy_from_slice(data);
        }
        Ok(handle)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let mut state = self.state.lock();
        let writable = state
            .buffer_usage
            .get(&buffer.0)
            .is_some_and(|usage| usage.contains(BufferUsage::COPY_DST));
        if !writable {
            log::warn!("RecordingDevice: buffer {} is not a copy destination", buffer.0);
            return;
        }
        match state.buffers.get_mut(&buffer.0) {
            Some(contents) => {
                let start = offset as usize;
                let end = start + data.len();
                if end > contents.len() {
                    contents.resize(end, 0);
                }
                contents[start..end].copy_from_slice(data);
            }
            None => log::warn!("RecordingDevice: write to unknown buffer {}", buffer.0),
        }
        state.commands.push(DeviceCommand::WriteBuffer {
            buffer,
            offset,
            size: data.len(),
        });
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> DeviceResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::TextureCreationFailed(format!(
                "{:?} has zero extent {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        log::trace!(
            "RecordingDevice: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let mut state = self.state.lock();
        let id = state.allocate(ResourceKind::Texture, desc.label.as_deref());
        state.formats.insert(id, vec![desc.format]);
        state.texture_usage.insert(id, desc.usage);
        Ok(TextureHandle(id))
    }

    fn create_framebuffer(&self, desc: &FramebufferDescriptor) -> DeviceResult<FramebufferHandle> {
        let mut state = self.state.lock();
        let attachments = desc
            .color_attachments
            .iter()
            .chain(desc.depth_attachment.iter());
        for attachment in attachments {
            if state.live.get(&attachment.0) != Some(&ResourceKind::Texture) {
                return Err(DeviceError::FramebufferCreationFailed(format!(
                    "{:?} references dead texture {}",
                    desc.label, attachment.0
                )));
            }
            let renderable = state
                .texture_usage
                .get(&attachment.0)
                .is_some_and(|usage| usage.contains(TextureUsage::RENDER_ATTACHMENT));
            if !renderable {
                return Err(DeviceError::FramebufferCreationFailed(format!(
                    "{:?}: texture {} is not a render attachment",
                    desc.label, attachment.0
                )));
            }
        }
        let is_depth = |texture: &TextureHandle| {
            state
                .formats
                .get(&texture.0)
                .is_some_and(|formats| formats.iter().any(TextureFormat::is_depth))
        };
        if desc.color_attachments.iter().any(is_depth) || desc.depth_attachment.iter().any(|d| !is_depth(d)) {
            return Err(DeviceError::FramebufferCreationFailed(format!(
                "{:?}: attachment formats do not match their slots",
                desc.label
            )));
        }
        let formats = desc
            .color_attachments
            .iter()
            .filter_map(|texture| state.formats.get(&texture.0))
            .flatten()
            .copied()
            .collect();
        let id = state.allocate(ResourceKind::Framebuffer, desc.label.as_deref());
        state.formats.insert(id, formats);
        Ok(FramebufferHandle(id))
    }

    fn create_bind_group_layout(
        &self,
        _entries: &[BindGroupLayoutEntry],
    ) -> DeviceResult<BindGroupLayoutHandle> {
        let id = self
            .state
            .lock()
            .allocate(ResourceKind::BindGroupLayout, None);
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &self,
        layout: BindGroupLayoutHandle,
        _entries: &[(u32, BindGroupEntry)],
    ) -> DeviceResult<BindGroupHandle> {
        let mut state = self.state.lock();
        if state.live.get(&layout.0) != Some(&ResourceKind::BindGroupLayout) {
            return Err(DeviceError::BindGroupCreationFailed(format!(
                "unknown layout {}",
                layout.0
            )));
        }
        let id = state.allocate(ResourceKind::BindGroup, None);
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> DeviceResult<RenderPipelineHandle> {
        if !desc.stages.iter().any(|s| s.stage == ShaderStage::Vertex) {
            return Err(DeviceError::PipelineCreationFailed(format!(
                "{:?} has no vertex stage",
                desc.label
            )));
        }
        log::trace!(
            "RecordingDevice: creating pipeline {:?} ({} stages)",
            desc.label,
            desc.stages.len()
        );
        let mut state = self.state.lock();
        let id = state.allocate(ResourceKind::RenderPipeline, desc.label.as_deref());
        state.formats.insert(id, desc.color_formats.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&self, desc: &RenderPassDescriptor) {
        self.record(DeviceCommand::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&self) {
        self.record(DeviceCommand::EndRenderPass);
    }

    fn set_render_pipeline(&self, pipeline: RenderPipelineHandle) {
        self.record(DeviceCommand::SetRenderPipeline(pipeline));
    }

    fn set_bind_group(&self, index: u32, bind_group: BindGroupHandle) {
        self.record(DeviceCommand::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.record(DeviceCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&self, buffer: BufferHandle, _offset: u64, format: IndexFormat) {
        self.record(DeviceCommand::SetIndexBuffer { buffer, format });
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.record(DeviceCommand::SetViewport(viewport));
    }

    fn set_blend_mode(&self, mode: BlendMode) {
        self.record(DeviceCommand::SetBlendMode(mode));
    }

    fn set_depth_state(&self, state: DepthState) {
        self.record(DeviceCommand::SetDepthState(state));
    }

    fn blit_depth(
        &self,
        source: FramebufferHandle,
        destination: RenderTarget,
        _width: u32,
        _height: u32,
    ) {
        self.record(DeviceCommand::BlitDepth {
            source,
            destination,
        });
    }

    fn draw(&self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(DeviceCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record(DeviceCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn average_value(&self, _texture: TextureHandle, _channel: u32) -> f32 {
        self.state.lock().average_value
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.state.lock().release(buffer.0, ResourceKind::Buffer);
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        self.state.lock().release(texture.0, ResourceKind::Texture);
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.state
            .lock()
            .release(framebuffer.0, ResourceKind::Framebuffer);
    }

    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutHandle) {
        self.state
            .lock()
            .release(layout.0, ResourceKind::BindGroupLayout);
    }

    fn destroy_bind_group(&self, bind_group: BindGroupHandle) {
        self.state
            .lock()
            .release(bind_group.0, ResourceKind::BindGroup);
    }

    fn destroy_render_pipeline(&self, pipeline: RenderPipelineHandle) {
        self.state
            .lock()
            .release(pipeline.0, ResourceKind::RenderPipeline);
    }
}
