//! Screen-space reflections

use bytemuck::{Pod, Zeroable};

use super::{EffectIo, FullscreenPass, PostContext, PostEffect, PostResources, StreamFormat, UniformBlock};
use crate::error::RenderResult;
use crate::render_target::HDR_FORMAT;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SsrUniforms {
    max_distance: f32,
    thickness: f32,
    steps: u32,
    _padding: u32,
}

/// Ray marches the geometry buffer depth and adds reflected color
pub struct SsrEffect {
    pub max_distance: f32,
    pub thickness: f32,
    pub steps: u32,
    pass: FullscreenPass,
    uniforms: UniformBlock,
}

impl SsrEffect {
    pub fn new(resources: &PostResources) -> RenderResult<Self> {
        let defaults = SsrUniforms {
            max_distance: 50.0,
            thickness: 0.5,
            steps: 64,
            _padding: 0,
        };
        let uniforms = UniformBlock::new(resources.device.clone(), "ssr", bytemuck::bytes_of(&defaults))?;
        Ok(Self {
            max_distance: defaults.max_distance,
            thickness: defaults.thickness,
            steps: defaults.steps,
            pass: FullscreenPass::new(resources, "post/ssr", Some(uniforms.layout()), HDR_FORMAT)?,
            uniforms,
        })
    }
}

impl PostEffect for SsrEffect {
    fn name(&self) -> &str {
        "Ssr"
    }

    fn io(&self) -> EffectIo {
        EffectIo::stream(StreamFormat::Hdr, StreamFormat::Hdr).with_gbuffer()
    }

    fn process(&mut self, ctx: &mut PostContext<'_>) {
        let Some(target) = ctx.target else {
            return;
        };
        self.uniforms.write(bytemuck::bytes_of(&SsrUniforms {
            max_distance: self.max_distance,
            thickness: self.thickness,
            steps: self.steps,
            _padding: 0,
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
