//! Bloom post-processing effect

use bytemuck::{Pod, Zeroable};

use super::{EffectIo, FullscreenPass, PostContext, PostEffect, PostResources, StreamFormat, UniformBlock};
use crate::error::RenderResult;
use crate::render_target::HDR_FORMAT;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BloomUniforms {
    threshold: f32,
    intensity: f32,
    texel_size: [f32; 2],
}

/// Adds the bright parts of the HDR stream back as a glow
pub struct BloomEffect {
    /// Luminance above which pixels bloom
    pub threshold: f32,
    pub intensity: f32,
    pass: FullscreenPass,
    uniforms: UniformBlock,
}

impl BloomEffect {
    pub fn new(resources: &PostResources, threshold: f32, intensity: f32) -> RenderResult<Self> {
        let uniforms = UniformBlock::new(
            resources.device.clone(),
            "bloom",
            bytemuck::bytes_of(&BloomUniforms {
                threshold,
                intensity,
                texel_size: [0.0; 2],
            }),
        )?;
        Ok(Self {
            threshold,
            intensity,
            pass: FullscreenPass::new(resources, "post/bloom", Some(uniforms.layout()), HDR_FORMAT)?,
            uniforms,
        })
    }
}

impl PostEffect for BloomEffect {
    fn name(&self) -> &str {
        "Bloom"
    }

    fn io(&self) -> EffectIo {
        EffectIo::stream(StreamFormat::Hdr, StreamFormat::Hdr)
    }

    fn process(&mut self, ctx: &mut PostContext<'_>) {
        let Some(target) = ctx.target else {
            return;
        };
        self.uniforms.write(bytemuck::bytes_of(&BloomUniforms {
            threshold: self.threshold,
            intensity: self.intensity,
            texel_size: [1.0 / ctx.width.max(1) as f32, 1.0 / ctx.height.max(1) as f32],
        }));
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
