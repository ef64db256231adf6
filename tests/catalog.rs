//! Integration tests for the pipeline catalog and material instances.

mod common;

use std::collections::HashMap;

use rstest::rstest;

use common::{no_textures, TestContext};
use ember_render::backend::{
    standard_vertex_layout, GraphicsApi, GraphicsDevice, ResourceKind, TextureDescriptor,
};
use ember_render::pipeline::ParameterValue;
use ember_render::{Bucket, RenderError};

#[rstest]
#[case::opengl(GraphicsApi::OpenGl)]
#[case::vulkan(GraphicsApi::Vulkan)]
#[case::directx(GraphicsApi::DirectX)]
fn test_pipeline_cache_is_idempotent(#[case] api: GraphicsApi) {
    let mut ctx = TestContext::new(api);
    let path = ctx.add_descriptor("stone", "opaque", true);

    let first = ctx
        .catalog
        .create_pipeline(&standard_vertex_layout(), &path, false)
        .unwrap();
    let created = ctx.device.created_count(ResourceKind::RenderPipeline);
    assert_eq!(created, 2);

    // a cached path is neither re-read nor recompiled
    ctx.assets.remove(&path);
    let second = ctx
        .catalog
        .create_pipeline(&standard_vertex_layout(), "materials/./stone.json", false)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.device.created_count(ResourceKind::RenderPipeline), created);
    assert_eq!(ctx.catalog.pipeline_count(), 1);
}

#[test]
fn test_parameter_block_size_and_slots() {
    let mut ctx = TestContext::new(GraphicsApi::OpenGl);
    let reference = ctx.create_pipeline("stone", "opaque", false);
    let layout = ctx.catalog.get_pipeline(reference).unwrap().layout();

    // float + vec4 + vec2, tightly packed in declaration order
    assert_eq!(layout.size(), 4 + 16 + 8);
    let offsets: Vec<u32> = layout.parameters().iter().map(|p| p.offset).collect();
    assert_eq!(offsets, vec![0, 4, 20]);

    let slots: Vec<u32> = layout.textures().iter().map(|t| t.slot).collect();
    assert_eq!(slots, vec![0, 1]);
}

#[rstest]
#[case::opaque("opaque", Bucket::Opaque)]
#[case::unlit("unlit", Bucket::Unlit)]
#[case::transparent("transparent", Bucket::Transparent)]
#[case::unknown("volumetric", Bucket::Misc)]
fn test_bucket_routing(#[case] keyword: &str, #[case] expected: Bucket) {
    let mut ctx = TestContext::new(GraphicsApi::OpenGl);
    let reference = ctx.create_pipeline("shape", keyword, false);
    assert_eq!(reference.bucket, expected);
    let pass = ctx.catalog.get_render_pass(reference.render_pass).unwrap();
    assert_eq!(pass.pipelines(expected).count(), 1);
}

#[rstest]
#[case::opengl(GraphicsApi::OpenGl)]
#[case::vulkan(GraphicsApi::Vulkan)]
fn test_two_stage_pipeline_without_shadow(#[case] api: GraphicsApi) {
    let mut ctx = TestContext::new(api);
    let reference = ctx.create_pipeline("plain", "opaque", false);
    let container = ctx.catalog.get_pipeline(reference).unwrap();

    assert_eq!(container.stages().len(), 2);
    assert!(container.shadow_stages().is_empty());
    assert!(container.pipeline().is_some());
    assert!(container.shadow_pipeline().is_none());
    assert_eq!(ctx.device.created_count(ResourceKind::RenderPipeline), 1);
}

#[test]
fn test_missing_stage_file_fails_creation() {
    let mut ctx = TestContext::new(GraphicsApi::OpenGl);
    let path = ctx.add_descriptor("broken", "opaque", false);
    ctx.assets.remove("materials/broken.frag");

    let err = ctx
        .catalog
        .create_pipeline(&standard_vertex_layout(), &path, false)
        .unwrap_err();
    assert!(matches!(err, RenderError::AssetNotFound { ref path } if path == "materials/broken.frag"));
    assert_eq!(ctx.catalog.pipeline_count(), 0);
}

#[test]
fn test_material_file_round_trip() {
    let mut ctx = TestContext::new(GraphicsApi::OpenGl);
    ctx.add_descriptor("stone", "opaque", true);
    ctx.assets.insert(
        "materials/mossy.mat",
        "# mossy stone\nshader: stone.json\nroughness: 0.25\ntint: 0.5, 0.5, 0.5, 1\nalbedo: textures/moss.png\nshininess: 3\n",
    );
    let albedo = ctx.device.create_texture(&TextureDescriptor::default()).unwrap();
    let mut textures = HashMap::new();
    textures.insert("materials/textures/moss.png".to_string(), albedo);

    let material = ctx
        .catalog
        .load_material(&standard_vertex_layout(), "materials/mossy.mat", &textures)
        .unwrap();
    let again = ctx
        .catalog
        .load_material(&standard_vertex_layout(), "materials/mossy.mat", &no_textures())
        .unwrap();
    assert_eq!(material, again);

    let instance = ctx.catalog.get_material(material).unwrap();
    assert_eq!(instance.textures(), &[Some(albedo), None]);
    let block = instance.parameters().unwrap();
    assert_eq!(&block[0..4], &0.25f32.to_le_bytes());
    assert_eq!(&block[4..8], &0.5f32.to_le_bytes());

    assert!(ctx
        .catalog
        .set_material_parameter(material, "roughness", ParameterValue::Float([0.75, 0.0, 0.0, 0.0]))
        .unwrap());
    assert!(!ctx
        .catalog
        .set_material_parameter(material, "missing", ParameterValue::Float([1.0; 4]))
        .unwrap());
    let buffer = ctx.catalog.get_material(material).unwrap().uniform_buffer().unwrap();
    let uploaded = ctx.device.buffer_contents(buffer).unwrap();
    assert_eq!(&uploaded[0..4], &0.75f32.to_le_bytes());
}

#[test]
fn test_last_mesh_removal_destroys_material() {
    let mut ctx = TestContext::new(GraphicsApi::OpenGl);
    let pipeline = ctx.create_pipeline("stone", "opaque", false);
    ctx.assets
        .insert("materials/a.mat", "shader: stone.json\nroughness: 1\n");
    let material = ctx
        .catalog
        .load_material(&standard_vertex_layout(), "materials/a.mat", &no_textures())
        .unwrap();
    let (first, second) = (ctx.mesh(), ctx.mesh());
    let (first_id, second_id) = (first.id, second.id);
    ctx.catalog.add_mesh(material, first).unwrap();
    ctx.catalog.add_mesh(material, second).unwrap();

    let removal = ctx.catalog.remove_mesh(material, first_id).unwrap();
    assert!(!removal.material_destroyed);

    let removal = ctx.catalog.remove_mesh(material, second_id).unwrap();
    assert!(removal.material_destroyed);
    assert!(removal.pipeline_empty);
    assert!(ctx.catalog.get_material(material).is_none());
    // the pipeline itself stays until removed explicitly
    assert!(ctx.catalog.get_pipeline(pipeline).is_some());

    ctx.catalog.remove_pipeline(pipeline).unwrap();
    assert_eq!(ctx.device.live_count(ResourceKind::RenderPipeline), 0);
    assert!(matches!(
        ctx.catalog.remove_pipeline(pipeline),
        Err(RenderError::UnknownPipeline)
    ));
}
