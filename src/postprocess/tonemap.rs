//! Tonemapping: HDR stream to display-ready LDR

use bytemuck::{Pod, Zeroable};
use serde::Deserialize;

use super::{EffectIo, FullscreenPass, PostContext, PostEffect, PostResources, StreamFormat, UniformBlock};
use crate::error::RenderResult;
use crate::render_target::LDR_FORMAT;

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    Uncharted2,
    None,
}

impl TonemapOperator {
    /// Value of the `operator` uniform
    pub fn index(&self) -> u32 {
        match self {
            TonemapOperator::Reinhard => 0,
            TonemapOperator::Aces => 1,
            TonemapOperator::Uncharted2 => 2,
            TonemapOperator::None => 3,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TonemapUniforms {
    exposure: f32,
    gamma: f32,
    operator: u32,
    _padding: u32,
}

/// Maps the HDR stream into LDR with the chain's current exposure
pub struct TonemapEffect {
    pub operator: TonemapOperator,
    pub gamma: f32,
    uniforms: UniformBlock,
    pass: FullscreenPass,
}

impl TonemapEffect {
    pub fn new(resources: &PostResources, operator: TonemapOperator, gamma: f32) -> RenderResult<Self> {
        let initial = TonemapUniforms {
            exposure: 1.0,
            gamma,
            operator: operator.index(),
            _padding: 0,
        };
        let uniforms = UniformBlock::new(resources.device.clone(), "tonemap", bytemuck::bytes_of(&initial))?;
        let pass = FullscreenPass::new(resources, "post/tonemap", Some(uniforms.layout()), LDR_FORMAT)?;
        Ok(Self {
            operator,
            gamma,
            uniforms,
            pass,
        })
    }
}

impl PostEffect for TonemapEffect {
    fn name(&self) -> &str {
        "Tonemap"
    }

    fn io(&self) -> EffectIo {
        EffectIo::stream(StreamFormat::Hdr, StreamFormat::Ldr)
    }

    fn process(&mut self, ctx: &mut PostContext<'_>) {
        let Some(target) = ctx.target else {
            return;
        };
        self.uniforms.write(bytemuck::bytes_of(&TonemapUniforms {
            exposure: ctx.exposure,
            gamma: self.gamma,
            operator: self.operator.index(),
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

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_exposure_uploaded_each_frame() {
        let mut f = fixture();
        let resources = f.chain.resources().clone();
        let tonemap = TonemapEffect::new(&resources, TonemapOperator::Uncharted2, 2.2).unwrap();
        let buffer = tonemap.uniforms.buffer();
        f.chain.add_effect(Box::new(tonemap)).unwrap();

        let mut inputs = inputs(&f.device);
        inputs.exposure = 0.5;
        f.chain.process(&inputs);

        let bytes = f.device.buffer_contents(buffer).unwrap();
        let uniforms: TonemapUniforms = bytemuck::pod_read_unaligned(&bytes[..16]);
        assert_eq!(uniforms.exposure, 0.5);
        assert_eq!(uniforms.operator, 2);
        assert_eq!(uniforms.gamma, 2.2);
    }

    #[test]
    fn test_operator_from_config_key() {
        #[derive(Deserialize)]
        struct Wrapper {
            op: TonemapOperator,
        }
        let w: Wrapper = toml::from_str("op = \"uncharted2\"").unwrap();
        assert_eq!(w.op, TonemapOperator::Uncharted2);
        assert_eq!(TonemapOperator::default(), TonemapOperator::Aces);
    }
}
