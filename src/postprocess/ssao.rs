//! Screen-space ambient occlusion
//!
//! The sample kernel is a hemisphere of [`SSAO_KERNEL_SIZE`] vectors whose
//! length grows quadratically, concentrating samples near the shaded point.
//! A small tile of random rotations around the normal is repeated across the
//! screen. Both come from a seeded generator so a given seed always produces
//! the same pattern.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{EffectIo, FullscreenPass, PostContext, PostEffect, PostResources, StreamFormat, UniformBlock};
use crate::error::RenderResult;
use crate::render_target::HDR_FORMAT;

pub const SSAO_KERNEL_SIZE: usize = 32;
/// Side of the rotation noise tile
pub const SSAO_NOISE_DIM: usize = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SsaoUniforms {
    kernel: [[f32; 4]; SSAO_KERNEL_SIZE],
    noise: [[f32; 4]; SSAO_NOISE_DIM * SSAO_NOISE_DIM],
    radius: f32,
    bias: f32,
    noise_scale: [f32; 2],
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn generate_kernel(rng: &mut StdRng) -> Vec<Vec3> {
    (0..SSAO_KERNEL_SIZE)
        .map(|i| {
            let sample = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.0..1.0),
            )
            .normalize_or_zero();
            let t = i as f32 / SSAO_KERNEL_SIZE as f32;
            sample * lerp(0.1, 1.0, t * t)
        })
        .collect()
}

fn generate_noise(rng: &mut StdRng) -> Vec<Vec2> {
    (0..SSAO_NOISE_DIM * SSAO_NOISE_DIM)
        .map(|_| Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)).normalize_or_zero())
        .collect()
}

/// Darkens the HDR stream where nearby geometry occludes ambient light
pub struct SsaoEffect {
    pub radius: f32,
    pub bias: f32,
    kernel: Vec<Vec3>,
    noise: Vec<Vec2>,
    pass: FullscreenPass,
    uniforms: UniformBlock,
}

impl SsaoEffect {
    pub fn new(resources: &PostResources, seed: u64) -> RenderResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let kernel = generate_kernel(&mut rng);
        let noise = generate_noise(&mut rng);

        let mut block = SsaoUniforms::zeroed();
        block.radius = 0.8;
        block.bias = 0.025;
        let uniforms = UniformBlock::new(resources.device.clone(), "ssao", bytemuck::bytes_of(&block))?;
        let mut effect = Self {
            radius: block.radius,
            bias: block.bias,
            kernel,
            noise,
            pass: FullscreenPass::new(resources, "post/ssao", Some(uniforms.layout()), HDR_FORMAT)?,
            uniforms,
        };
        effect.upload(1, 1);
        Ok(effect)
    }

    pub fn kernel(&self) -> &[Vec3] {
        &self.kernel
    }

    pub fn noise(&self) -> &[Vec2] {
        &self.noise
    }

    fn upload(&mut self, width: u32, height: u32) {
        let mut block = SsaoUniforms::zeroed();
        for (slot, sample) in block.kernel.iter_mut().zip(&self.kernel) {
            *slot = sample.extend(0.0).to_array();
        }
        for (slot, rotation) in block.noise.iter_mut().zip(&self.noise) {
            *slot = [rotation.x, rotation.y, 0.0, 0.0];
        }
        block.radius = self.radius;
        block.bias = self.bias;
        let tile = SSAO_NOISE_DIM as f32;
        block.noise_scale = [width as f32 / tile, height as f32 / tile];
        self.uniforms.write(bytemuck::bytes_of(&block));
    }
}

impl PostEffect for SsaoEffect {
    fn name(&self) -> &str {
        "Ssao"
    }

    fn io(&self) -> EffectIo {
        EffectIo::stream(StreamFormat::Hdr, StreamFormat::Hdr).with_gbuffer()
    }

    fn process(&mut self, ctx: &mut PostContext<'_>) {
        let Some(target) = ctx.target else {
            return;
        };
        self.upload(ctx.width, ctx.height);
        self.pass
            .run(ctx, target, ctx.width, ctx.height, Some(self.uniforms.binding()));
    }

    fn reload_graphics(&mut self, _width: u32, _height: u32) -> RenderResult<()> {
        self.pass.build()
    }

    fn destroy_graphics(&mut self) {
        self.pass.destroy();
    }
}
