//! Pipeline catalog
//!
//! Turns pipeline descriptors into compiled GPU pipelines:
//! 1. Descriptor - JSON tree mapped onto stage tables and a parameter layout
//! 2. Layout - packed uniform block and dense texture slots
//! 3. Catalog - path cache, draw buckets and material arenas

pub mod catalog;
pub mod descriptor;
pub mod layout;

pub use catalog::{
    Bucket, MeshRemoval, PassOutputs, PipelineCatalog, PipelineContainer, PipelineReference,
    RenderPassContainer, PRIMARY_PASS,
};
pub use descriptor::{DrawMode, PipelineDescriptor, StageTable};
pub use layout::{
    ParameterDescriptor, ParameterLayout, ParameterType, ParameterValue,
    TextureParameterDescriptor,
};
