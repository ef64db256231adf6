//! Exposure metering
//!
//! Renders the luminance of the HDR stream into a fixed-size single channel
//! target and derives the exposure that maps its average to middle grey.

use std::sync::Arc;

use super::{EffectIo, FullscreenPass, PostContext, PostEffect, PostResources, StreamFormat};
use crate::backend::{GraphicsDevice, TextureFormat};
use crate::error::RenderResult;
use crate::render_target::{RenderTargetContainer, RenderTargetSpec};

/// Side of the square luminance target
pub const LUMINANCE_SIZE: u32 = 1024;

const MIDDLE_GREY: f32 = 0.18;
const MIN_EXPOSURE: f32 = 0.05;
const MAX_EXPOSURE: f32 = 16.0;

/// Exposure that maps `average` luminance to middle grey
pub fn exposure_for(average: f32) -> f32 {
    (MIDDLE_GREY / average.max(1e-4)).clamp(MIN_EXPOSURE, MAX_EXPOSURE)
}

/// Measures scene luminance and publishes an exposure to later effects
pub struct AutoExposureEffect {
    device: Arc<dyn GraphicsDevice>,
    pass: FullscreenPass,
    luminance: Option<RenderTargetContainer>,
    exposure: f32,
}

impl AutoExposureEffect {
    pub fn new(resources: &PostResources) -> RenderResult<Self> {
        let mut effect = Self {
            device: resources.device.clone(),
            pass: FullscreenPass::new(resources, "post/luminance", None, TextureFormat::R8Unorm)?,
            luminance: None,
            exposure: 1.0,
        };
        effect.create_luminance()?;
        Ok(effect)
    }

    fn create_luminance(&mut self) -> RenderResult<()> {
        self.luminance = None;
        self.luminance = Some(RenderTargetContainer::new(
            self.device.clone(),
            RenderTargetSpec::new("luminance", &[TextureFormat::R8Unorm], None),
            LUMINANCE_SIZE,
            LUMINANCE_SIZE,
        )?);
        Ok(())
    }

    /// Exposure measured on the last processed frame
    pub fn exposure(&self) -> f32 {
        self.exposure
    }
}

impl PostEffect for AutoExposureEffect {
    fn name(&self) -> &str {
        "AutoExposure"
    }

    fn io(&self) -> EffectIo {
        EffectIo::side(StreamFormat::Hdr)
    }

    fn process(&mut self, ctx: &mut PostContext<'_>) {
        let Some(luminance) = &self.luminance else {
            return;
        };
        if !self.pass.is_built() {
            return;
        }
        self.pass
            .run(ctx, luminance.target(), LUMINANCE_SIZE, LUMINANCE_SIZE, None);
        if let Some(texture) = luminance.color(0) {
            let average = ctx.device.average_value(texture, 0);
            self.exposure = exposure_for(average);
            log::trace!("Average luminance {:.4}, exposure {:.3}", average, self.exposure);
        }
        ctx.exposure = self.exposure;
    }

    fn reload_graphics(&mut self, _width: u32, _height: u32) -> RenderResult<()> {
        self.pass.build()?;
        if self.luminance.is_none() {
            self.create_luminance()?;
        }
        Ok(())
    }

    fn destroy_graphics(&mut self) {
        self.pass.destroy();
        self.luminance = None;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::backend::ResourceKind;

    #[test]
    fn test_exposure_clamped() {
        assert!((exposure_for(0.18) - 1.0).abs() < 1e-6);
        assert_eq!(exposure_for(0.0), MAX_EXPOSURE);
        assert_eq!(exposure_for(100.0), MIN_EXPOSURE);
    }

    #[test]
    fn test_luminance_target_lifecycle() {
        let f = fixture();
        let before = f.device.live_count(ResourceKind::Texture);
        let mut effect = AutoExposureEffect::new(f.chain.resources()).unwrap();
        assert_eq!(f.device.live_count(ResourceKind::Texture), before + 1);

        effect.destroy_graphics();
        assert_eq!(f.device.live_count(ResourceKind::Texture), before);
        effect.reload_graphics(64, 32).unwrap();
        assert_eq!(f.device.live_count(ResourceKind::Texture), before + 1);
    }
}
