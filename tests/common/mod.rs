//! Common utilities for renderer integration tests.
//!
//! Every test runs against the headless [`RecordingDevice`] and an
//! in-memory asset tree, so assertions are made on the recorded command
//! stream and on resource liveness.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use ember_render::assets::MemorySource;
use ember_render::backend::{
    standard_vertex_layout, BufferDescriptor, BufferUsage, DeviceCommand, GraphicsApi,
    GraphicsDevice, RecordingDevice, TextureHandle,
};
use ember_render::material::DrawableMesh;
use ember_render::{MeshId, PipelineCatalog, PipelineReference, RendererConfig};

/// Engine programs every camera loads
pub const ENGINE_PROGRAMS: [&str; 13] = [
    "debug",
    "lights/point",
    "lights/point_shadow",
    "lights/spot",
    "lights/spot_shadow",
    "lights/directional",
    "lights/directional_shadow",
    "post/ssr",
    "post/ssao",
    "post/luminance",
    "post/bloom",
    "post/tonemap",
    "post/color_grading",
];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Descriptor with vertex and fragment stages for every API, plus an
/// optional shadow vertex stage.
pub fn descriptor(bucket: &str, program: &str, shadow: bool) -> String {
    let stages = |suffix: &str| {
        format!(
            r#"{{ "vertex": "{program}{suffix}.vert", "fragment": "{program}{suffix}.frag" }}"#
        )
    };
    let mut shaders = format!(
        r#""deferred": {{ "opengl": {gl}, "vulkan": {gl}, "directx": {gl} }}"#,
        gl = stages("")
    );
    if shadow {
        shaders.push_str(&format!(
            r#", "shadow": {{ "opengl": {s}, "vulkan": {s}, "directx": {s} }}"#,
            s = format!(r#"{{ "vertex": "{program}_shadow.vert" }}"#)
        ));
    }
    format!(
        r#"{{
            "name": "{program}",
            "type": "{bucket}",
            "shaders": {{ {shaders} }},
            "properties": [
                {{ "name": "roughness", "type": "float", "default": 0.5 }},
                {{ "name": "tint", "type": "vec4", "default": [1, 1, 1, 1] }},
                {{ "name": "scale", "type": "vec2", "default": [1, 1] }}
            ],
            "textures": [
                {{ "name": "albedo", "type": "texture" }},
                {{ "name": "normal", "type": "texture" }}
            ]
        }}"#
    )
}

pub struct TestContext {
    pub device: Arc<RecordingDevice>,
    pub assets: Arc<MemorySource>,
    pub catalog: PipelineCatalog,
    next_mesh: u64,
}

impl TestContext {
    pub fn new(api: GraphicsApi) -> Self {
        init_logging();
        let device = Arc::new(RecordingDevice::new(api));
        let assets = Arc::new(MemorySource::new());
        let catalog = PipelineCatalog::new(device.clone(), assets.clone())
            .expect("catalog creation cannot fail on a recording device");
        Self {
            device,
            assets,
            catalog,
            next_mesh: 0,
        }
    }

    /// Write every built-in program for the device's API.
    pub fn install_engine_shaders(&self) {
        let ext = self.device.api().shader_extension();
        for program in ENGINE_PROGRAMS {
            self.assets
                .insert(&format!("shaders/{}.vert.{}", program, ext), "vs");
            self.assets
                .insert(&format!("shaders/{}.frag.{}", program, ext), "fs");
        }
    }

    /// Write a descriptor and the stage files it names under `materials/`.
    pub fn add_descriptor(&self, name: &str, bucket: &str, shadow: bool) -> String {
        let path = format!("materials/{}.json", name);
        self.assets.insert(&path, descriptor(bucket, name, shadow));
        self.assets.insert(&format!("materials/{}.vert", name), "vs");
        self.assets.insert(&format!("materials/{}.frag", name), "fs");
        if shadow {
            self.assets
                .insert(&format!("materials/{}_shadow.vert", name), "shadow vs");
        }
        path
    }

    pub fn create_pipeline(&mut self, name: &str, bucket: &str, shadow: bool) -> PipelineReference {
        let path = self.add_descriptor(name, bucket, shadow);
        self.catalog
            .create_pipeline(&standard_vertex_layout(), &path, false)
            .expect("pipeline creation")
    }

    pub fn mesh(&mut self) -> DrawableMesh {
        self.next_mesh += 1;
        let buffer = self
            .device
            .create_buffer(&BufferDescriptor {
                label: Some("mesh".to_string()),
                size: 64,
                usage: BufferUsage::VERTEX,
            })
            .expect("buffer creation");
        DrawableMesh {
            id: MeshId(self.next_mesh),
            vertex_buffer: buffer,
            index_buffer: None,
            element_count: 3,
            base_vertex: 0,
        }
    }

    pub fn config(&self) -> RendererConfig {
        RendererConfig {
            api: self.device.api(),
            width: 320,
            height: 180,
            ..RendererConfig::default()
        }
    }

    /// Labels of the render passes recorded since the last clear
    pub fn pass_labels(&self) -> Vec<String> {
        self.device
            .commands()
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::BeginRenderPass(desc) => desc.label.clone(),
                _ => None,
            })
            .collect()
    }
}

pub fn no_textures() -> HashMap<String, TextureHandle> {
    HashMap::new()
}
