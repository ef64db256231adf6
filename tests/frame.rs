//! Frame-level integration tests: cameras driving the deferred path and the
//! post chain against a recording device.

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{no_textures, TestContext};
use ember_render::backend::{
    standard_vertex_layout, BlendMode, DeviceCommand, GraphicsApi, RenderTarget, ResourceKind,
    Viewport,
};
use ember_render::{
    Camera, DebugMode, Light, LightKind, PointLight, RenderError, RendererConfig, SpotLight,
};

fn camera(ctx: &TestContext) -> Camera {
    ctx.install_engine_shaders();
    Camera::new(&ctx.catalog, &ctx.config()).expect("camera creation")
}

#[rstest]
#[case::opengl(GraphicsApi::OpenGl)]
#[case::vulkan(GraphicsApi::Vulkan)]
#[case::directx(GraphicsApi::DirectX)]
fn test_frame_pass_order(#[case] api: GraphicsApi) {
    let ctx = TestContext::new(api);
    let mut camera = camera(&ctx);
    ctx.device.clear_commands();

    camera.render(&ctx.catalog, 0.5);
    assert_eq!(
        ctx.pass_labels(),
        vec![
            "geometry",
            "lighting",
            "forward",
            "post/ssao",
            "post/luminance",
            "post/bloom",
            "post/tonemap",
            "post/color_grading",
        ]
    );
}

#[test]
fn test_no_point_lights_never_binds_point_pipeline() {
    let ctx = TestContext::new(GraphicsApi::OpenGl);
    let mut camera = camera(&ctx);
    camera.render_path_mut().lights_mut().push(Light::Spot(SpotLight {
        position: Vec3::new(0.0, 3.0, 0.0),
        direction: Vec3::NEG_Y,
        ..SpotLight::default()
    }));
    ctx.device.clear_commands();

    camera.render(&ctx.catalog, 0.0);
    assert_eq!(camera.render_path().lights().count(LightKind::Point), 0);
    assert_eq!(ctx.device.bind_count_by_label("lights/point"), 0);
    assert_eq!(ctx.device.bind_count_by_label("lights/spot"), 1);
}

#[test]
fn test_each_light_kind_bound_once_per_frame() {
    let ctx = TestContext::new(GraphicsApi::OpenGl);
    let mut camera = camera(&ctx);
    let lights = camera.render_path_mut().lights_mut();
    for x in 0..3 {
        lights.push(Light::Point(PointLight {
            position: Vec3::new(x as f32, 1.0, 0.0),
            radius: 4.0,
            ..PointLight::default()
        }));
    }
    ctx.device.clear_commands();

    camera.render(&ctx.catalog, 0.0);
    assert_eq!(ctx.device.bind_count_by_label("lights/point"), 1);

    // one sphere draw per light inside the lighting pass
    assert_eq!(ctx.device.draw_count_in_pass("lighting"), 3);
    assert!(ctx
        .device
        .commands()
        .contains(&DeviceCommand::SetBlendMode(BlendMode::Additive)));
}

#[test]
fn test_debug_mode_skips_lighting_and_post() {
    let ctx = TestContext::new(GraphicsApi::OpenGl);
    let mut camera = camera(&ctx);

    assert!(!camera.render_path_mut().set_debug_mode(8));
    assert_eq!(camera.render_path().debug_mode(), DebugMode::Lit);
    assert!(camera.render_path_mut().set_debug_mode(2));
    ctx.device.clear_commands();

    camera.render(&ctx.catalog, 0.0);
    assert_eq!(ctx.pass_labels(), vec!["geometry", "debug"]);

    // cycling through every view returns to the lit scene
    for _ in 0..6 {
        camera.render_path_mut().cycle_debug_mode();
    }
    assert_eq!(camera.render_path().debug_mode(), DebugMode::Lit);
}

#[test]
fn test_debug_pipeline_matches_final_attachment() {
    let ctx = TestContext::new(GraphicsApi::OpenGl);
    ctx.install_engine_shaders();
    let config = RendererConfig {
        use_final_framebuffer: true,
        debug_mode: 4,
        ..ctx.config()
    };
    let mut camera = Camera::new(&ctx.catalog, &config).unwrap();
    ctx.device.clear_commands();
    camera.render(&ctx.catalog, 0.0);

    let commands = ctx.device.commands();
    let begin = commands
        .iter()
        .position(|c| matches!(c, DeviceCommand::BeginRenderPass(d) if d.label.as_deref() == Some("debug")))
        .unwrap();
    let DeviceCommand::BeginRenderPass(desc) = &commands[begin] else {
        unreachable!()
    };
    assert_eq!(desc.target, camera.final_target());
    let pipeline = commands[begin..]
        .iter()
        .find_map(|c| match c {
            DeviceCommand::SetRenderPipeline(p) => Some(*p),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        ctx.device.pipeline_formats(pipeline),
        ctx.device.target_formats(camera.final_target())
    );
}

#[test]
fn test_viewport_resize_recreates_targets_once() {
    let ctx = TestContext::new(GraphicsApi::OpenGl);
    let mut camera = camera(&ctx);
    let live = ctx.device.live_count(ResourceKind::Texture);
    let created = ctx.device.created_count(ResourceKind::Texture);

    camera.set_viewport(320, 180).unwrap();
    assert_eq!(camera.target_generation(), 0);
    assert_eq!(ctx.device.created_count(ResourceKind::Texture), created);

    camera.set_viewport(640, 360).unwrap();
    assert_eq!(camera.target_generation(), 1);
    assert_eq!(camera.viewport(), (640, 360));
    // hdr color + depth, 4 geometry attachments + depth, three ping-pong targets
    assert_eq!(ctx.device.created_count(ResourceKind::Texture), created + 2 + 5 + 3);
    assert_eq!(ctx.device.live_count(ResourceKind::Texture), live);
    assert_eq!(camera.hdr_target().read().width(), 640);
}

#[test]
fn test_projection_correction_per_api() {
    let gl = TestContext::new(GraphicsApi::OpenGl);
    let vk = TestContext::new(GraphicsApi::Vulkan);
    let mut gl_camera = camera(&gl);
    let mut vk_camera = camera(&vk);

    let gl_projection = gl_camera.projection_matrix();
    let vk_projection = vk_camera.projection_matrix();
    assert_eq!(vk_projection.y_axis.y, -gl_projection.y_axis.y);
    assert_eq!(vk_projection.x_axis, gl_projection.x_axis);
    assert_eq!(vk_projection.z_axis, gl_projection.z_axis);
}

#[test]
fn test_disabled_camera_records_nothing() {
    let ctx = TestContext::new(GraphicsApi::OpenGl);
    let mut camera = camera(&ctx);
    camera.set_enabled(false);
    ctx.device.clear_commands();
    camera.render(&ctx.catalog, 0.0);
    assert!(ctx.device.commands().is_empty());
}

#[test]
fn test_only_counted_materials_drawn() {
    let mut ctx = TestContext::new(GraphicsApi::OpenGl);
    let mut camera = camera(&ctx);
    ctx.create_pipeline("stone", "opaque", false);
    ctx.create_pipeline("glass", "transparent", false);
    ctx.assets.insert("materials/stone.mat", "shader: stone.json\n");
    ctx.assets.insert("materials/glass.mat", "shader: glass.json\n");
    let layout = standard_vertex_layout();
    let stone = ctx.catalog.load_material(&layout, "materials/stone.mat", &no_textures()).unwrap();
    let glass = ctx.catalog.load_material(&layout, "materials/glass.mat", &no_textures()).unwrap();
    let (a, b) = (ctx.mesh(), ctx.mesh());
    ctx.catalog.add_mesh(stone, a).unwrap();
    ctx.catalog.add_mesh(glass, b).unwrap();

    // opaque pipelines are always bound, idle overlay pipelines never
    ctx.device.clear_commands();
    camera.render(&ctx.catalog, 0.0);
    assert_eq!(ctx.device.bind_count_by_label("materials/stone"), 1);
    assert_eq!(ctx.device.bind_count_by_label("materials/glass"), 0);
    assert_eq!(ctx.device.draw_count_in_pass("geometry"), 0);

    ctx.catalog.increment_draw_count(stone).unwrap();
    ctx.catalog.increment_draw_count(glass).unwrap();
    assert_eq!(ctx.catalog.get_pipeline(glass.pipeline).unwrap().draw_count(), 1);
    ctx.device.clear_commands();
    camera.render(&ctx.catalog, 0.0);
    assert_eq!(ctx.device.bind_count_by_label("materials/glass"), 1);
    assert_eq!(ctx.device.draw_count_in_pass("geometry"), 1);

    ctx.catalog.reset_draw_counts();
    ctx.device.clear_commands();
    camera.render(&ctx.catalog, 0.0);
    assert_eq!(ctx.device.bind_count_by_label("materials/glass"), 0);
}

#[test]
fn test_missing_post_shader_fails_camera() {
    let ctx = TestContext::new(GraphicsApi::OpenGl);
    ctx.install_engine_shaders();
    ctx.assets.remove("shaders/post/tonemap.frag.glsl");
    let err = Camera::new(&ctx.catalog, &ctx.config()).err().unwrap();
    assert!(matches!(
        err,
        RenderError::MissingShaderStage { ref effect, .. } if effect == "post/tonemap"
    ));
}

#[test]
fn test_shadow_map_draws_opaque_casters() {
    let mut ctx = TestContext::new(GraphicsApi::OpenGl);
    let camera = camera(&ctx);
    ctx.create_pipeline("stone", "opaque", true);
    ctx.assets.insert("materials/stone.mat", "shader: stone.json\n");
    let stone = ctx
        .catalog
        .load_material(&standard_vertex_layout(), "materials/stone.mat", &no_textures())
        .unwrap();
    let mesh = ctx.mesh();
    ctx.catalog.add_mesh(stone, mesh).unwrap();
    ctx.device.clear_commands();

    // not marked visible, still casts
    camera
        .render_path()
        .render_shadow_map(&ctx.catalog, RenderTarget::Default, 512, camera.frame_binding());
    assert_eq!(ctx.pass_labels(), vec!["shadow"]);
    assert_eq!(ctx.device.bind_count_by_label("materials/stone.json (shadow)"), 1);
    assert_eq!(ctx.device.draw_count_in_pass("shadow"), 1);
    assert!(ctx
        .device
        .commands()
        .contains(&DeviceCommand::SetViewport(Viewport::new(0, 0, 512, 512))));
}
