//! Light types and deferred light accumulation.
//!
//! Positions and directions are resolved by the caller from whatever
//! transform system owns the light. Lights are re-submitted every frame.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::assets::AssetSource;
use crate::backend::{
    BindGroupEntry, BindGroupHandle, BindGroupLayoutEntry, BindGroupLayoutHandle, BindingType,
    BufferDescriptor, BufferHandle, CullMode, GraphicsDevice, PrimitiveTopology,
    RenderPipelineDescriptor, RenderPipelineHandle, ShaderStageFlags, TextureKind,
    VertexBufferLayout,
};
use crate::error::RenderResult;
use crate::render_target::HDR_FORMAT;
use crate::resources::{GpuMesh, VolumeMesh};
use crate::shaders::{ShaderLibrary, VERTEX_FRAGMENT};

/// Bind group slot of the per-light uniforms
pub const LIGHT_GROUP: u32 = 2;
/// Bind group slot of the shadow map
pub const SHADOW_GROUP: u32 = 3;
/// Texture unit of the shadow map
pub const SHADOW_SLOT: i32 = 4;

/// Geometry a light is rasterized with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightVolume {
    /// Unit sphere scaled to the light radius
    Sphere,
    FullscreenQuad,
}

/// Kind of light, drawn in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Point,
    Spot,
    Directional,
}

impl LightKind {
    pub const ALL: [LightKind; 3] = [LightKind::Point, LightKind::Spot, LightKind::Directional];

    fn index(self) -> usize {
        match self {
            LightKind::Point => 0,
            LightKind::Spot => 1,
            LightKind::Directional => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LightKind::Point => "point",
            LightKind::Spot => "spot",
            LightKind::Directional => "directional",
        }
    }

    /// Shader program of the regular or shadowed variant
    pub fn program(&self, shadowed: bool) -> String {
        if shadowed {
            format!("lights/{}_shadow", self.name())
        } else {
            format!("lights/{}", self.name())
        }
    }

    pub fn volume(&self) -> LightVolume {
        match self {
            LightKind::Point | LightKind::Spot => LightVolume::Sphere,
            LightKind::Directional => LightVolume::FullscreenQuad,
        }
    }
}

/// Shadow map produced for a light by the shadow pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowInput {
    /// Binding set holding the depth map
    pub map: BindGroupHandle,
    /// Light view-projection the map was rendered with
    pub matrix: Mat4,
    /// Edge length of the map in pixels
    pub resolution: f32,
}

impl ShadowInput {
    /// Light matrix remapped from clip space to texture space
    pub fn biased_matrix(&self) -> Mat4 {
        Mat4::from_translation(Vec3::splat(0.5)) * Mat4::from_scale(Vec3::splat(0.5)) * self.matrix
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Attenuation radius, also the size of the light volume
    pub radius: f32,
    pub shadow: Option<ShadowInput>,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            shadow: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub inner_angle: f32, // radians
    pub outer_angle: f32, // radians
    pub shadow: Option<ShadowInput>,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: -Vec3::Y,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
            shadow: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Angular size of the source, softens shadows
    pub source_radius: f32,
    pub shadow: Option<ShadowInput>,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            source_radius: 0.0,
            shadow: None,
        }
    }
}

/// A light submitted for this frame
#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Point(PointLight),
    Spot(SpotLight),
    Directional(DirectionalLight),
}

/// Camera state the light uniforms depend on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingFrame {
    pub proj_view: Mat4,
    pub eye_position: Vec3,
    pub resolution: Vec2,
}

impl Light {
    pub fn kind(&self) -> LightKind {
        match self {
            Light::Point(_) => LightKind::Point,
            Light::Spot(_) => LightKind::Spot,
            Light::Directional(_) => LightKind::Directional,
        }
    }

    pub fn shadow(&self) -> Option<&ShadowInput> {
        match self {
            Light::Point(light) => light.shadow.as_ref(),
            Light::Spot(light) => light.shadow.as_ref(),
            Light::Directional(light) => light.shadow.as_ref(),
        }
    }

    /// Encode the light for the lighting shaders
    pub fn uniforms(&self, frame: &LightingFrame) -> LightUniforms {
        let mut uniforms = LightUniforms {
            eye_position: frame.eye_position.extend(self.shadow().is_some() as u32 as f32),
            angles_resolution: Vec4::new(0.0, 0.0, frame.resolution.x, frame.resolution.y),
            shadow_matrix: self
                .shadow()
                .map(ShadowInput::biased_matrix)
                .unwrap_or(Mat4::IDENTITY),
            ..LightUniforms::default()
        };

        match self {
            Light::Point(light) => {
                uniforms.wvp = volume_transform(frame, light.position, light.radius);
                uniforms.position_radius = light.position.extend(light.radius);
                uniforms.color_intensity = light.color.extend(light.intensity);
            }
            Light::Spot(light) => {
                uniforms.wvp = volume_transform(frame, light.position, light.radius);
                uniforms.position_radius = light.position.extend(light.radius);
                uniforms.direction_source = light.direction.normalize_or_zero().extend(0.0);
                uniforms.color_intensity = light.color.extend(light.intensity);
                uniforms.angles_resolution.x = light.inner_angle.cos();
                uniforms.angles_resolution.y = light.outer_angle.cos();
            }
            Light::Directional(light) => {
                uniforms.direction_source = light.direction.normalize_or_zero().extend(light.source_radius);
                uniforms.color_intensity = light.color.extend(light.intensity);
            }
        }
        uniforms
    }
}

fn volume_transform(frame: &LightingFrame, position: Vec3, radius: f32) -> Mat4 {
    frame.proj_view * Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(radius))
}

/// Uniform block shared by every lighting shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightUniforms {
    /// Light volume to clip space
    pub wvp: Mat4,
    /// World to shadow map texture space
    pub shadow_matrix: Mat4,
    /// xyz = eye position, w = 1 when a shadow map is bound
    pub eye_position: Vec4,
    /// xyz = position, w = attenuation radius
    pub position_radius: Vec4,
    /// xyz = direction, w = source radius
    pub direction_source: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// x = cos(inner), y = cos(outer), zw = viewport resolution
    pub angles_resolution: Vec4,
    /// Texture units of the geometry buffer attachments
    pub gbuffer_slots: [i32; 4],
    /// x = texture unit of the shadow map
    pub shadow_slot: [i32; 4],
}

impl Default for LightUniforms {
    fn default() -> Self {
        Self {
            wvp: Mat4::IDENTITY,
            shadow_matrix: Mat4::IDENTITY,
            eye_position: Vec4::ZERO,
            position_radius: Vec4::ZERO,
            direction_source: Vec4::ZERO,
            color_intensity: Vec4::ZERO,
            angles_resolution: Vec4::ZERO,
            gbuffer_slots: [0, 1, 2, 3],
            shadow_slot: [SHADOW_SLOT, 0, 0, 0],
        }
    }
}

/// Layouts the light pipelines are built against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightingLayouts {
    pub frame: BindGroupLayoutHandle,
    pub gbuffer: BindGroupLayoutHandle,
}

#[derive(Default)]
struct KindPipelines {
    regular: Option<RenderPipelineHandle>,
    shadow: Option<RenderPipelineHandle>,
}

impl KindPipelines {
    fn variant(&self, shadowed: bool) -> Option<RenderPipelineHandle> {
        if shadowed {
            self.shadow
        } else {
            self.regular
        }
    }
}

/// Per-kind lighting pipelines and the lights submitted this frame
pub struct LightAccumulator {
    device: Arc<dyn GraphicsDevice>,
    light_layout: BindGroupLayoutHandle,
    shadow_layout: BindGroupLayoutHandle,
    uniform_buffer: BufferHandle,
    uniform_binding: BindGroupHandle,
    pipelines: [KindPipelines; 3],
    sphere: GpuMesh,
    quad: GpuMesh,
    lights: Vec<Light>,
}

impl LightAccumulator {
    /// Build every light pipeline.
    ///
    /// A kind whose shader program is missing is logged and left without a
    /// pipeline; its lights are skipped during accumulation.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        assets: &dyn AssetSource,
        shaders: &ShaderLibrary,
        layouts: LightingLayouts,
    ) -> RenderResult<Self> {
        let light_layout = device.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;
        let shadow_layout = device.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                kind: TextureKind::D2,
                depth: true,
            },
        }])?;
        let uniform_buffer = device.create_buffer(&BufferDescriptor::uniform(
            "light uniforms",
            std::mem::size_of::<LightUniforms>() as u64,
        ))?;
        let uniform_binding = device.create_bind_group(
            light_layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer: uniform_buffer,
                    offset: 0,
                    size: None,
                },
            )],
        )?;

        let mut accumulator = Self {
            sphere: GpuMesh::upload(device.clone(), &VolumeMesh::sphere(24, 16))?,
            quad: GpuMesh::upload(device.clone(), &VolumeMesh::fullscreen_quad())?,
            device,
            light_layout,
            shadow_layout,
            uniform_buffer,
            uniform_binding,
            pipelines: Default::default(),
            lights: Vec::new(),
        };

        for kind in LightKind::ALL {
            let regular = accumulator.build_pipeline(assets, shaders, layouts, kind, false)?;
            accumulator.pipelines[kind.index()].regular = regular;
            let shadow = accumulator.build_pipeline(assets, shaders, layouts, kind, true)?;
            accumulator.pipelines[kind.index()].shadow = shadow;
        }
        Ok(accumulator)
    }

    fn build_pipeline(
        &self,
        assets: &dyn AssetSource,
        shaders: &ShaderLibrary,
        layouts: LightingLayouts,
        kind: LightKind,
        shadowed: bool,
    ) -> RenderResult<Option<RenderPipelineHandle>> {
        let program = kind.program(shadowed);
        let stages = match shaders.load(assets, &program, &VERTEX_FRAGMENT) {
            Ok(stages) => stages,
            Err(err) => {
                log::warn!("Light pipeline {} unavailable: {}", program, err);
                return Ok(None);
            }
        };

        let mut bind_group_layouts = vec![layouts.frame, layouts.gbuffer, self.light_layout];
        if shadowed {
            bind_group_layouts.push(self.shadow_layout);
        }
        let (vertex_layout, topology, cull_mode) = match kind.volume() {
            LightVolume::Sphere => (
                VertexBufferLayout::position_only(),
                PrimitiveTopology::TriangleList,
                CullMode::Front,
            ),
            LightVolume::FullscreenQuad => (
                VertexBufferLayout::planar(),
                PrimitiveTopology::TriangleList,
                CullMode::None,
            ),
        };

        let pipeline = self.device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(program),
            stages,
            vertex_layouts: vec![vertex_layout],
            bind_group_layouts,
            primitive_topology: topology,
            cull_mode,
            depth_stencil: None,
            color_formats: vec![HDR_FORMAT],
        })?;
        Ok(Some(pipeline))
    }

    pub fn push(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn clear(&mut self) {
        self.lights.clear();
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Number of submitted lights of a kind
    pub fn count(&self, kind: LightKind) -> usize {
        self.lights.iter().filter(|l| l.kind() == kind).count()
    }

    /// Whether the regular and shadowed pipelines of a kind were built
    pub fn has_pipelines(&self, kind: LightKind) -> (bool, bool) {
        let pipelines = &self.pipelines[kind.index()];
        (pipelines.regular.is_some(), pipelines.shadow.is_some())
    }

    /// Draw every submitted light into the bound target.
    ///
    /// Expects the frame uniforms and geometry buffer bound at groups 0 and
    /// 1 and additive blending enabled. Each kind binds its pipeline once
    /// per variant in use; kinds without lights are never bound.
    pub fn accumulate(&self, frame: &LightingFrame) {
        let device = self.device.as_ref();
        for kind in LightKind::ALL {
            let volume = match kind.volume() {
                LightVolume::Sphere => &self.sphere,
                LightVolume::FullscreenQuad => &self.quad,
            };
            for shadowed in [false, true] {
                let mut batch = self
                    .lights
                    .iter()
                    .filter(|l| l.kind() == kind && l.shadow().is_some() == shadowed)
                    .peekable();
                if batch.peek().is_none() {
                    continue;
                }
                let Some(pipeline) = self.pipelines[kind.index()].variant(shadowed) else {
                    continue;
                };

                device.set_render_pipeline(pipeline);
                device.set_bind_group(LIGHT_GROUP, self.uniform_binding);
                for light in batch {
                    let uniforms = light.uniforms(frame);
                    device.write_buffer(self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
                    if let Some(shadow) = light.shadow() {
                        device.set_bind_group(SHADOW_GROUP, shadow.map);
                    }
                    volume.draw(device);
                }
            }
        }
    }

    /// Layout shadow map binding sets must be created with
    pub fn shadow_layout(&self) -> BindGroupLayoutHandle {
        self.shadow_layout
    }
}

impl Drop for LightAccumulator {
    fn drop(&mut self) {
        for pipelines in &self.pipelines {
            for pipeline in [pipelines.regular, pipelines.shadow].into_iter().flatten() {
                self.device.destroy_render_pipeline(pipeline);
            }
        }
        self.device.destroy_bind_group(self.uniform_binding);
        self.device.destroy_buffer(self.uniform_buffer);
        self.device.destroy_bind_group_layout(self.light_layout);
        self.device.destroy_bind_group_layout(self.shadow_layout);
    }
}
