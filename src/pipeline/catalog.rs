//! Pipeline catalog.
//!
//! Builds one compiled pipeline (plus an optional shadow variant) per unique
//! descriptor path, groups pipelines into draw buckets and owns the materials
//! created against them. Pipelines and materials live in index arenas, so a
//! [`PipelineReference`] or [`MaterialReference`] stays valid until that exact
//! entry is removed.

use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::{PipelineDescriptor, StageTable};
use super::layout::ParameterLayout;
use crate::assets::{normalize, AssetSource};
use crate::backend::{
    BindGroupLayoutEntry, BindGroupLayoutHandle, BindingType, CompareFunction, CullMode,
    DepthStencilState, GraphicsDevice, PrimitiveTopology, RenderPipelineDescriptor,
    RenderPipelineHandle, ShaderSource, ShaderStageFlags, TextureFormat, TextureKind,
    VertexLayout, Viewport,
};
use crate::error::{RenderError, RenderResult};
use crate::material::{
    parse_components, DrawableMesh, MaterialDefinition, MaterialInstance, MaterialReference,
    MeshId, TextureProvider,
};
use crate::render_target::{
    DEPTH_FORMAT, GBUFFER_ATTACHMENTS, GBUFFER_FORMAT, HDR_FORMAT, SHADOW_FORMAT,
};

/// Render phase that draws a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Unlit,
    /// Drawn into the geometry buffer
    Opaque,
    /// Drawn forward over the lit scene
    Transparent,
    /// Registered but never drawn by a scene phase
    Misc,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Bucket::Unlit, Bucket::Opaque, Bucket::Transparent, Bucket::Misc];

    fn index(self) -> usize {
        match self {
            Bucket::Unlit => 0,
            Bucket::Opaque => 1,
            Bucket::Transparent => 2,
            Bucket::Misc => 3,
        }
    }
}

/// Stable reference to a pipeline in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineReference {
    pub render_pass: usize,
    pub bucket: Bucket,
    pub index: usize,
}

/// Output configuration pipelines of a render pass are built against
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutputs {
    pub gbuffer_formats: Vec<TextureFormat>,
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    pub shadow_format: TextureFormat,
}

impl Default for PassOutputs {
    fn default() -> Self {
        Self {
            gbuffer_formats: vec![GBUFFER_FORMAT; GBUFFER_ATTACHMENTS],
            color_format: HDR_FORMAT,
            depth_format: DEPTH_FORMAT,
            shadow_format: SHADOW_FORMAT,
        }
    }
}

/// Result of removing a mesh from a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshRemoval {
    /// The material lost its last mesh and was destroyed
    pub material_destroyed: bool,
    /// The pipeline has no materials left. Pipelines are kept until removed
    /// explicitly.
    pub pipeline_empty: bool,
}

/// A compiled pipeline, its shadow variant and its materials
pub struct PipelineContainer {
    device: Arc<dyn GraphicsDevice>,
    reference: PipelineReference,
    name: String,
    path: String,
    vertex_layout: VertexLayout,
    stages: StageTable,
    shadow_stages: StageTable,
    layout: ParameterLayout,
    material_layout: Option<BindGroupLayoutHandle>,
    pipeline: Option<RenderPipelineHandle>,
    shadow_pipeline: Option<RenderPipelineHandle>,
    materials: Vec<Option<MaterialInstance>>,
    draw_count: u32,
}

impl PipelineContainer {
    #[allow(clippy::too_many_arguments)]
    fn new(
        device: Arc<dyn GraphicsDevice>,
        assets: &dyn AssetSource,
        outputs: &PassOutputs,
        frame_layout: BindGroupLayoutHandle,
        reference: PipelineReference,
        path: String,
        descriptor: PipelineDescriptor,
        vertex_layout: VertexLayout,
    ) -> RenderResult<Self> {
        let material_layout = create_material_layout(device.as_ref(), &descriptor.layout)?;
        let mut container = Self {
            device,
            reference,
            name: descriptor.name,
            path,
            vertex_layout,
            stages: descriptor.stages,
            shadow_stages: descriptor.shadow_stages,
            layout: descriptor.layout,
            material_layout,
            pipeline: None,
            shadow_pipeline: None,
            materials: Vec::new(),
            draw_count: 0,
        };
        // on error the partially built container drops and releases its layout
        let (pipeline, shadow_pipeline) = container.build(assets, outputs, frame_layout)?;
        container.pipeline = pipeline;
        container.shadow_pipeline = shadow_pipeline;
        Ok(container)
    }

    fn build(
        &self,
        assets: &dyn AssetSource,
        outputs: &PassOutputs,
        frame_layout: BindGroupLayoutHandle,
    ) -> RenderResult<(Option<RenderPipelineHandle>, Option<RenderPipelineHandle>)> {
        let mut bind_group_layouts = vec![frame_layout];
        bind_group_layouts.extend(self.material_layout);

        let pipeline = if self.stages.is_empty() {
            log::warn!(
                "{}: no shader stages for {}, pipeline will not draw",
                self.path,
                self.device.api()
            );
            None
        } else {
            let sources = read_stages(assets, &self.stages)?;
            let desc = regular_pipeline_descriptor(
                &self.path,
                self.reference.bucket,
                sources,
                &self.vertex_layout,
                bind_group_layouts.clone(),
                outputs,
            );
            Some(self.device.create_render_pipeline(&desc)?)
        };

        let shadow_pipeline = if self.shadow_stages.is_empty() {
            None
        } else {
            match read_stages(assets, &self.shadow_stages) {
                Ok(sources) => {
                    let desc = RenderPipelineDescriptor {
                        label: Some(format!("{} (shadow)", self.path)),
                        stages: sources,
                        vertex_layouts: self.vertex_layout.clone(),
                        bind_group_layouts,
                        primitive_topology: PrimitiveTopology::TriangleList,
                        cull_mode: CullMode::Front,
                        depth_stencil: Some(DepthStencilState {
                            format: outputs.shadow_format,
                            depth_write_enabled: true,
                            depth_compare: CompareFunction::Less,
                        }),
                        color_formats: Vec::new(),
                    };
                    match self.device.create_render_pipeline(&desc) {
                        Ok(handle) => Some(handle),
                        Err(err) => {
                            if let Some(pipeline) = pipeline {
                                self.device.destroy_render_pipeline(pipeline);
                            }
                            return Err(err.into());
                        }
                    }
                }
                Err(err) => {
                    log::warn!("{}: shadow variant skipped: {}", self.path, err);
                    None
                }
            }
        };

        Ok((pipeline, shadow_pipeline))
    }

    /// Re-read the stage files and swap in freshly compiled pipelines.
    fn rebuild(
        &mut self,
        assets: &dyn AssetSource,
        outputs: &PassOutputs,
        frame_layout: BindGroupLayoutHandle,
    ) -> RenderResult<()> {
        let (pipeline, shadow_pipeline) = self.build(assets, outputs, frame_layout)?;
        for old in [self.pipeline.take(), self.shadow_pipeline.take()].into_iter().flatten() {
            self.device.destroy_render_pipeline(old);
        }
        self.pipeline = pipeline;
        self.shadow_pipeline = shadow_pipeline;
        Ok(())
    }

    pub fn reference(&self) -> PipelineReference {
        self.reference
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized descriptor path
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bucket(&self) -> Bucket {
        self.reference.bucket
    }

    /// Stage files of the regular pipeline
    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    /// Stage files of the shadow variant
    pub fn shadow_stages(&self) -> &StageTable {
        &self.shadow_stages
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn pipeline(&self) -> Option<RenderPipelineHandle> {
        self.pipeline
    }

    pub fn shadow_pipeline(&self) -> Option<RenderPipelineHandle> {
        self.shadow_pipeline
    }

    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    pub fn increment_draw_count(&mut self) {
        self.draw_count += 1;
    }

    /// Live materials in creation order
    pub fn materials(&self) -> impl Iterator<Item = &MaterialInstance> {
        self.materials.iter().flatten()
    }

    pub fn material_count(&self) -> usize {
        self.materials().count()
    }

    pub fn material(&self, index: usize) -> Option<&MaterialInstance> {
        self.materials.get(index).and_then(Option::as_ref)
    }

    pub fn material_mut(&mut self, index: usize) -> Option<&mut MaterialInstance> {
        self.materials.get_mut(index).and_then(Option::as_mut)
    }

    fn add_material(
        &mut self,
        name: &str,
        parameters: Option<Vec<u8>>,
        textures: Vec<Option<crate::backend::TextureHandle>>,
    ) -> RenderResult<MaterialReference> {
        let reference = MaterialReference {
            pipeline: self.reference,
            material: self.materials.len(),
        };
        let material = MaterialInstance::new(
            self.device.clone(),
            reference,
            name,
            self.material_layout,
            parameters,
            textures,
        )?;
        self.materials.push(Some(material));
        Ok(reference)
    }

    fn reset_draw_counts(&mut self) {
        self.draw_count = 0;
        for material in self.materials.iter_mut().flatten() {
            material.reset_draw_count();
        }
    }
}

impl Drop for PipelineContainer {
    fn drop(&mut self) {
        self.materials.clear();
        for pipeline in [self.pipeline.take(), self.shadow_pipeline.take()].into_iter().flatten() {
            self.device.destroy_render_pipeline(pipeline);
        }
        if let Some(layout) = self.material_layout.take() {
            self.device.destroy_bind_group_layout(layout);
        }
        log::trace!("Released pipeline {}", self.path);
    }
}

impl std::fmt::Debug for PipelineContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContainer")
            .field("reference", &self.reference)
            .field("path", &self.path)
            .field("stages", &self.stages)
            .field("shadow_stages", &self.shadow_stages)
            .field("materials", &self.material_count())
            .field("draw_count", &self.draw_count)
            .finish()
    }
}

/// Buckets of pipelines sharing one output configuration
pub struct RenderPassContainer {
    id: usize,
    outputs: PassOutputs,
    buckets: [Vec<Option<PipelineContainer>>; 4],
}

impl RenderPassContainer {
    fn new(id: usize, outputs: PassOutputs) -> Self {
        Self {
            id,
            outputs,
            buckets: Default::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn outputs(&self) -> &PassOutputs {
        &self.outputs
    }

    /// Live pipelines of a bucket in creation order
    pub fn pipelines(&self, bucket: Bucket) -> impl Iterator<Item = &PipelineContainer> {
        self.buckets[bucket.index()].iter().flatten()
    }

    fn slot(&self, reference: PipelineReference) -> Option<&PipelineContainer> {
        self.buckets[reference.bucket.index()]
            .get(reference.index)
            .and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, reference: PipelineReference) -> Option<&mut PipelineContainer> {
        self.buckets[reference.bucket.index()]
            .get_mut(reference.index)
            .and_then(Option::as_mut)
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut PipelineContainer> {
        self.buckets.iter_mut().flat_map(|b| b.iter_mut().flatten())
    }
}

/// Index of the primary render pass
pub const PRIMARY_PASS: usize = 0;

/// Path-keyed cache of pipelines and materials
pub struct PipelineCatalog {
    device: Arc<dyn GraphicsDevice>,
    assets: Arc<dyn AssetSource>,
    frame_layout: BindGroupLayoutHandle,
    render_passes: Vec<RenderPassContainer>,
    pipelines_by_path: HashMap<String, PipelineReference>,
    materials_by_path: HashMap<String, MaterialReference>,
}

impl PipelineCatalog {
    pub fn new(device: Arc<dyn GraphicsDevice>, assets: Arc<dyn AssetSource>) -> RenderResult<Self> {
        let frame_layout = device.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;
        Ok(Self {
            device,
            assets,
            frame_layout,
            render_passes: vec![RenderPassContainer::new(PRIMARY_PASS, PassOutputs::default())],
            pipelines_by_path: HashMap::new(),
            materials_by_path: HashMap::new(),
        })
    }

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn assets(&self) -> &Arc<dyn AssetSource> {
        &self.assets
    }

    /// Layout of the per-frame uniform binding at group 0 of every pipeline
    pub fn frame_layout(&self) -> BindGroupLayoutHandle {
        self.frame_layout
    }

    /// Resolve a descriptor path to a pipeline, compiling it on first use.
    ///
    /// A path that was resolved before returns the cached reference without
    /// reading or compiling anything.
    pub fn create_pipeline(
        &mut self,
        vertex_layout: &VertexLayout,
        path: &str,
        misc: bool,
    ) -> RenderResult<PipelineReference> {
        let path = normalize(path);
        if let Some(reference) = self.pipelines_by_path.get(&path) {
            return Ok(*reference);
        }

        let text = self.assets.read_to_string(&path)?;
        let descriptor = PipelineDescriptor::parse(&path, &text, self.device.api(), misc)?;

        let pass = &mut self.render_passes[PRIMARY_PASS];
        let bucket = descriptor.bucket;
        let reference = PipelineReference {
            render_pass: PRIMARY_PASS,
            bucket,
            index: pass.buckets[bucket.index()].len(),
        };
        let container = PipelineContainer::new(
            self.device.clone(),
            self.assets.as_ref(),
            &pass.outputs,
            self.frame_layout,
            reference,
            path.clone(),
            descriptor,
            vertex_layout.clone(),
        )?;
        log::info!(
            "Created pipeline {} ({:?}, {} stages, shadow: {})",
            path,
            bucket,
            container.stages.len(),
            container.shadow_pipeline.is_some()
        );
        pass.buckets[bucket.index()].push(Some(container));
        self.pipelines_by_path.insert(path, reference);
        Ok(reference)
    }

    pub fn get_pipeline(&self, reference: PipelineReference) -> Option<&PipelineContainer> {
        self.render_passes
            .get(reference.render_pass)
            .and_then(|pass| pass.slot(reference))
    }

    pub fn get_pipeline_mut(&mut self, reference: PipelineReference) -> Option<&mut PipelineContainer> {
        self.render_passes
            .get_mut(reference.render_pass)
            .and_then(|pass| pass.slot_mut(reference))
    }

    pub fn get_render_pass(&self, id: usize) -> Option<&RenderPassContainer> {
        self.render_passes.get(id)
    }

    /// Number of live pipelines
    pub fn pipeline_count(&self) -> usize {
        self.render_passes
            .iter()
            .map(|pass| Bucket::ALL.iter().map(|b| pass.pipelines(*b).count()).sum::<usize>())
            .sum()
    }

    /// Re-read every stage file and rebuild all pipelines in place.
    ///
    /// References stay valid. A stage file that fails to load aborts the
    /// reload; pipelines rebuilt before the failure keep their new version.
    pub fn reload_pipelines(&mut self) -> RenderResult<()> {
        let assets = self.assets.clone();
        let frame_layout = self.frame_layout;
        for pass in &mut self.render_passes {
            let outputs = pass.outputs.clone();
            for container in pass.all_mut() {
                container.rebuild(assets.as_ref(), &outputs, frame_layout)?;
                log::debug!("Reloaded pipeline {}", container.path);
            }
        }
        Ok(())
    }

    /// Destroy a pipeline and all of its materials.
    ///
    /// The arena slot is left empty, so references to other pipelines stay
    /// valid. The path may be resolved again afterwards.
    pub fn remove_pipeline(&mut self, reference: PipelineReference) -> RenderResult<()> {
        let container = self
            .render_passes
            .get_mut(reference.render_pass)
            .and_then(|pass| pass.buckets[reference.bucket.index()].get_mut(reference.index))
            .and_then(Option::take)
            .ok_or(RenderError::UnknownPipeline)?;

        self.pipelines_by_path.retain(|_, r| *r != reference);
        self.materials_by_path.retain(|_, m| m.pipeline != reference);
        log::info!("Removed pipeline {}", container.path);
        Ok(())
    }

    /// Instantiate a material of `pipeline` from a parsed material file.
    ///
    /// Keys that name neither a parameter nor a texture of the pipeline are
    /// logged and skipped.
    pub fn create_material(
        &mut self,
        pipeline: PipelineReference,
        definition: &MaterialDefinition,
        textures: &dyn TextureProvider,
    ) -> RenderResult<MaterialReference> {
        let container = self
            .get_pipeline_mut(pipeline)
            .ok_or(RenderError::UnknownPipeline)?;
        let layout = &container.layout;

        let mut block = (layout.size() > 0).then(|| layout.default_block());
        let mut bound = vec![None; layout.textures().len()];

        for (key, value) in &definition.values {
            if let Some(texture) = layout.texture(key) {
                let path = normalize(&format!("{}{}", definition.directory(), value));
                match textures.texture(&path) {
                    Some(handle) => bound[texture.slot as usize] = Some(handle),
                    None => log::warn!("{}: texture {} is not available", definition.path, path),
                }
            } else if let Some(parameter) = layout.parameter(key) {
                let parsed = parse_components(value)
                    .and_then(|components| parameter.ty.value_from_components(&components));
                match (parsed, block.as_mut()) {
                    (Some(parsed), Some(block)) => {
                        layout.write_value(block, key, parsed);
                    }
                    _ => log::warn!(
                        "{}: invalid value '{}' for parameter '{}'",
                        definition.path,
                        value,
                        key
                    ),
                }
            } else {
                log::warn!("{}: unknown material key '{}'", definition.path, key);
            }
        }

        container.add_material(&definition.path, block, bound)
    }

    /// Load a material file, its pipeline and its textures.
    ///
    /// Materials are cached by path.
    pub fn load_material(
        &mut self,
        vertex_layout: &VertexLayout,
        path: &str,
        textures: &dyn TextureProvider,
    ) -> RenderResult<MaterialReference> {
        let path = normalize(path);
        if let Some(reference) = self.materials_by_path.get(&path) {
            return Ok(*reference);
        }

        let text = self.assets.read_to_string(&path)?;
        let definition = MaterialDefinition::parse(&path, &text)?;
        let pipeline = self.create_pipeline(vertex_layout, &definition.shader, false)?;
        let reference = self.create_material(pipeline, &definition, textures)?;
        self.materials_by_path.insert(path, reference);
        Ok(reference)
    }

    pub fn get_material(&self, reference: MaterialReference) -> Option<&MaterialInstance> {
        self.get_pipeline(reference.pipeline)
            .and_then(|container| container.material(reference.material))
    }

    pub fn get_material_mut(&mut self, reference: MaterialReference) -> Option<&mut MaterialInstance> {
        self.get_pipeline_mut(reference.pipeline)
            .and_then(|container| container.material_mut(reference.material))
    }

    /// Set a material parameter and upload the packed block.
    pub fn set_material_parameter(
        &mut self,
        reference: MaterialReference,
        name: &str,
        value: super::ParameterValue,
    ) -> RenderResult<bool> {
        let container = self
            .get_pipeline_mut(reference.pipeline)
            .ok_or(RenderError::UnknownPipeline)?;
        let PipelineContainer {
            layout, materials, ..
        } = container;
        let material = materials
            .get_mut(reference.material)
            .and_then(Option::as_mut)
            .ok_or(RenderError::UnknownMaterial)?;
        Ok(material.set_parameter(layout, name, value))
    }

    pub fn add_mesh(&mut self, reference: MaterialReference, mesh: DrawableMesh) -> RenderResult<()> {
        self.get_material_mut(reference)
            .ok_or(RenderError::UnknownMaterial)?
            .add_mesh(mesh);
        Ok(())
    }

    /// Remove a mesh; a material left without meshes is destroyed.
    ///
    /// A mesh the material does not hold changes nothing.
    pub fn remove_mesh(&mut self, reference: MaterialReference, mesh: MeshId) -> RenderResult<MeshRemoval> {
        let material = self
            .get_material_mut(reference)
            .ok_or(RenderError::UnknownMaterial)?;
        if !material.remove_mesh(mesh) || !material.meshes().is_empty() {
            return Ok(MeshRemoval::default());
        }

        self.remove_material(reference)?;
        let pipeline_empty = self
            .get_pipeline(reference.pipeline)
            .is_some_and(|container| container.material_count() == 0);
        if pipeline_empty {
            if let Some(container) = self.get_pipeline(reference.pipeline) {
                log::info!("Pipeline {} has no materials left", container.path);
            }
        }
        Ok(MeshRemoval {
            material_destroyed: true,
            pipeline_empty,
        })
    }

    /// Destroy a material and release its GPU resources.
    pub fn remove_material(&mut self, reference: MaterialReference) -> RenderResult<()> {
        let container = self
            .get_pipeline_mut(reference.pipeline)
            .ok_or(RenderError::UnknownPipeline)?;
        let material = container
            .materials
            .get_mut(reference.material)
            .and_then(Option::take)
            .ok_or(RenderError::UnknownMaterial)?;
        log::debug!("Removed material {}", material.name());
        self.materials_by_path.retain(|_, m| *m != reference);
        Ok(())
    }

    /// Mark a material visible this frame.
    pub fn increment_draw_count(&mut self, reference: MaterialReference) -> RenderResult<()> {
        let container = self
            .get_pipeline_mut(reference.pipeline)
            .ok_or(RenderError::UnknownPipeline)?;
        container
            .material_mut(reference.material)
            .ok_or(RenderError::UnknownMaterial)?
            .increment_draw_count();
        container.increment_draw_count();
        Ok(())
    }

    /// Zero every pipeline and material draw counter.
    pub fn reset_draw_counts(&mut self) {
        for pass in &mut self.render_passes {
            for container in pass.all_mut() {
                container.reset_draw_counts();
            }
        }
    }

    /// Draw visible materials of the unlit bucket.
    pub fn draw_unlit(&self) {
        self.draw_bucket(Bucket::Unlit, true);
    }

    /// Draw visible materials of the opaque bucket into the geometry buffer.
    ///
    /// Every opaque pipeline is bound, even when none of its materials is
    /// visible.
    pub fn draw_deferred(&self) {
        self.draw_bucket(Bucket::Opaque, false);
    }

    /// Draw visible materials of the transparent bucket.
    pub fn draw_forward(&self) {
        self.draw_bucket(Bucket::Transparent, true);
    }

    /// Draw shadow casters with their shadow variants.
    ///
    /// Opaque materials cast shadows whether or not they were marked visible;
    /// unlit materials only when visible.
    pub fn draw_shadows(&self, viewport: Viewport) {
        let device = self.device.as_ref();
        for pass in &self.render_passes {
            for container in pass.pipelines(Bucket::Opaque) {
                let Some(shadow) = container.shadow_pipeline else {
                    continue;
                };
                device.set_render_pipeline(shadow);
                device.set_viewport(viewport);
                for material in container.materials() {
                    material.draw_shadow(device);
                }
            }

            for container in pass.pipelines(Bucket::Unlit) {
                if container.draw_count == 0 {
                    continue;
                }
                let Some(shadow) = container.shadow_pipeline else {
                    continue;
                };
                device.set_render_pipeline(shadow);
                device.set_viewport(viewport);
                for material in container.materials().filter(|m| m.draw_count() > 0) {
                    material.draw_shadow(device);
                }
            }
        }
    }

    fn draw_bucket(&self, bucket: Bucket, skip_idle_pipelines: bool) {
        let device = self.device.as_ref();
        for pass in &self.render_passes {
            for container in pass.pipelines(bucket) {
                if skip_idle_pipelines && container.draw_count == 0 {
                    continue;
                }
                let Some(pipeline) = container.pipeline else {
                    continue;
                };
                device.set_render_pipeline(pipeline);
                for material in container.materials().filter(|m| m.draw_count() > 0) {
                    material.draw(device);
                }
            }
        }
    }
}

impl Drop for PipelineCatalog {
    fn drop(&mut self) {
        self.render_passes.clear();
        self.device.destroy_bind_group_layout(self.frame_layout);
    }
}

fn read_stages(assets: &dyn AssetSource, stages: &StageTable) -> RenderResult<Vec<ShaderSource>> {
    stages
        .iter()
        .map(|(stage, path)| {
            Ok(ShaderSource {
                stage: *stage,
                path: path.clone(),
                code: assets.read(path)?,
            })
        })
        .collect()
}

/// Binding 0 holds the parameter block, texture slot `n` sits at binding `n + 1`.
fn create_material_layout(
    device: &dyn GraphicsDevice,
    layout: &ParameterLayout,
) -> RenderResult<Option<BindGroupLayoutHandle>> {
    let mut entries = Vec::new();
    if layout.size() > 0 {
        entries.push(BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        });
    }
    for texture in layout.textures() {
        let kind = match texture.parameter.ty {
            super::ParameterType::Cubemap => TextureKind::Cube,
            _ => TextureKind::D2,
        };
        entries.push(BindGroupLayoutEntry {
            binding: texture.slot + 1,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture { kind, depth: false },
        });
    }
    if entries.is_empty() {
        return Ok(None);
    }
    Ok(Some(device.create_bind_group_layout(&entries)?))
}

fn regular_pipeline_descriptor(
    label: &str,
    bucket: Bucket,
    stages: Vec<ShaderSource>,
    vertex_layout: &VertexLayout,
    bind_group_layouts: Vec<BindGroupLayoutHandle>,
    outputs: &PassOutputs,
) -> RenderPipelineDescriptor {
    let (color_formats, depth_write_enabled, depth_compare, cull_mode) = match bucket {
        Bucket::Opaque => (outputs.gbuffer_formats.clone(), true, CompareFunction::Less, CullMode::Back),
        Bucket::Transparent => (
            vec![outputs.color_format],
            false,
            CompareFunction::LessEqual,
            CullMode::None,
        ),
        Bucket::Unlit | Bucket::Misc => (
            vec![outputs.color_format],
            true,
            CompareFunction::LessEqual,
            CullMode::Back,
        ),
    };
    RenderPipelineDescriptor {
        label: Some(label.to_string()),
        stages,
        vertex_layouts: vertex_layout.clone(),
        bind_group_layouts,
        primitive_topology: PrimitiveTopology::TriangleList,
        cull_mode,
        depth_stencil: Some(DepthStencilState {
            format: outputs.depth_format,
            depth_write_enabled,
            depth_compare,
        }),
        color_formats,
    }
}
