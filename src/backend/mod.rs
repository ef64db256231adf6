//! Backend abstraction layer
//!
//! Provides the device capability trait the renderer is written against, the
//! types shared by every implementation, and a headless recording device.

pub mod recording;
pub mod traits;
pub mod types;

pub use recording::{DeviceCommand, RecordingDevice, ResourceKind};
pub use traits::*;
pub use types::*;
