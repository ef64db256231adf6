//! Color grading on the LDR stream

use bytemuck::{Pod, Zeroable};

use super::{EffectIo, FullscreenPass, PostContext, PostEffect, PostResources, StreamFormat, UniformBlock};
use crate::error::RenderResult;
use crate::render_target::LDR_FORMAT;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GradingUniforms {
    strength: f32,
    contrast: f32,
    saturation: f32,
    _padding: f32,
}

/// Blends the graded image over the input by `strength`
pub struct ColorGradingEffect {
    pub strength: f32,
    pub contrast: f32,
    pub saturation: f32,
    pass: FullscreenPass,
    uniforms: UniformBlock,
}

impl ColorGradingEffect {
    pub fn new(resources: &PostResources, strength: f32) -> RenderResult<Self> {
        let initial = GradingUniforms {
            strength: strength.clamp(0.0, 1.0),
            contrast: 1.0,
            saturation: 1.0,
            _padding: 0.0,
        };
        let uniforms = UniformBlock::new(resources.device.clone(), "color grading", bytemuck::bytes_of(&initial))?;
        Ok(Self {
            strength: initial.strength,
            contrast: initial.contrast,
            saturation: initial.saturation,
            pass: FullscreenPass::new(resources, "post/color_grading", Some(uniforms.layout()), LDR_FORMAT)?,
            uniforms,
        })
    }
}

impl PostEffect for ColorGradingEffect {
    fn name(&self) -> &str {
        "ColorGrading"
    }

    fn io(&self) -> EffectIo {
        EffectIo::stream(StreamFormat::Ldr, StreamFormat::Ldr)
    }

    fn process(&mut self, ctx: &mut PostContext<'_>) {
        let Some(target) = ctx.target else {
            return;
        };
        self.uniforms.write(bytemuck::bytes_of(&GradingUniforms {
            strength: self.strength.clamp(0.0, 1.0),
            contrast: self.contrast,
            saturation: self.saturation,
            _padding: 0.0,
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
