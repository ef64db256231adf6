//! Pipeline descriptor documents.
//!
//! Descriptors are read in two phases: the text is parsed into a
//! `serde_json::Value` tree, then [`PipelineDescriptor::from_tree`] maps the
//! tree onto shader stage tables and a [`ParameterLayout`]. The mapping is a
//! pure function of the tree, the descriptor directory and the active API.
//!
//! ```json
//! {
//!     "name": "Stone",
//!     "type": "opaque",
//!     "shaders": {
//!         "deferred": { "opengl": { "vertex": "stone.vert", "fragment": "stone.frag" } },
//!         "shadow":   { "opengl": { "vertex": "stone_shadow.vert" } }
//!     },
//!     "properties": [ { "name": "tint", "type": "color", "default": [1, 1, 1, 1] } ],
//!     "textures":   [ { "name": "albedo", "type": "texture" } ]
//! }
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

use super::layout::{ParameterLayout, ParameterType, ParameterValue};
use super::Bucket;
use crate::assets::{normalize, parent_dir};
use crate::backend::{GraphicsApi, ShaderStage};
use crate::error::{RenderError, RenderResult};

/// Draw mode a set of shader stages belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Deferred,
    Forward,
    Shadow,
}

impl DrawMode {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "deferred" => Some(DrawMode::Deferred),
            "forward" => Some(DrawMode::Forward),
            "shadow" => Some(DrawMode::Shadow),
            _ => None,
        }
    }
}

/// Stage → resolved file path
pub type StageTable = BTreeMap<ShaderStage, String>;

/// Everything the catalog extracts from one descriptor document
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDescriptor {
    pub name: String,
    pub bucket: Bucket,
    /// Stages of the regular (deferred or forward) pipeline
    pub stages: StageTable,
    /// Stages of the shadow variant; empty when the pipeline casts no shadows
    pub shadow_stages: StageTable,
    pub layout: ParameterLayout,
}

impl PipelineDescriptor {
    /// Parse descriptor text located at `path`.
    pub fn parse(path: &str, text: &str, api: GraphicsApi, misc: bool) -> RenderResult<Self> {
        let tree: Value = serde_json::from_str(text).map_err(|source| RenderError::Descriptor {
            path: path.to_string(),
            source,
        })?;
        Ok(Self::from_tree(&tree, parent_dir(path), api, misc))
    }

    /// Map a parsed descriptor tree.
    ///
    /// Only the `api` sub-tree of `shaders` produces stage paths; stage files
    /// are resolved relative to `directory`. When `misc` is set the `type`
    /// keyword is ignored and the pipeline lands in [`Bucket::Misc`].
    pub fn from_tree(tree: &Value, directory: &str, api: GraphicsApi, misc: bool) -> Self {
        let name = tree
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let bucket = if misc {
            Bucket::Misc
        } else {
            map_bucket(&name, tree.get("type"))
        };

        let mut stages = StageTable::new();
        let mut shadow_stages = StageTable::new();
        if let Some(shaders) = tree.get("shaders").and_then(Value::as_object) {
            for (mode_key, by_api) in shaders {
                let Some(mode) = DrawMode::from_key(mode_key) else {
                    log::warn!("{}: unknown draw mode '{}'", name, mode_key);
                    continue;
                };
                let table = match mode {
                    DrawMode::Deferred | DrawMode::Forward => &mut stages,
                    DrawMode::Shadow => &mut shadow_stages,
                };
                map_stages(&name, by_api, directory, api, table);
            }
        }

        let mut layout = ParameterLayout::new();
        for declaration in declarations(tree.get("properties")) {
            map_declaration(&name, &declaration, false, &mut layout);
        }
        for declaration in declarations(tree.get("textures")) {
            map_declaration(&name, &declaration, true, &mut layout);
        }

        Self {
            name,
            bucket,
            stages,
            shadow_stages,
            layout,
        }
    }
}

fn map_bucket(name: &str, keyword: Option<&Value>) -> Bucket {
    match keyword.and_then(Value::as_str) {
        Some("unlit") => Bucket::Unlit,
        Some("opaque") => Bucket::Opaque,
        Some("transparent") => Bucket::Transparent,
        Some(other) => {
            log::warn!("{}: invalid shader type '{}'", name, other);
            Bucket::Misc
        }
        None => {
            log::warn!("{}: no shader type given", name);
            Bucket::Misc
        }
    }
}

fn map_stages(
    name: &str,
    by_api: &Value,
    directory: &str,
    api: GraphicsApi,
    table: &mut StageTable,
) {
    let Some(by_api) = by_api.as_object() else {
        return;
    };
    for (api_key, by_stage) in by_api {
        match GraphicsApi::from_key(api_key) {
            Some(found) if found == api => {}
            Some(_) => continue,
            None => {
                log::warn!("{}: unknown graphics api '{}'", name, api_key);
                continue;
            }
        }
        let Some(by_stage) = by_stage.as_object() else {
            continue;
        };
        for (stage_key, file) in by_stage {
            let Some(file) = file.as_str() else {
                log::warn!("{}: stage '{}' is not a file name", name, stage_key);
                continue;
            };
            match ShaderStage::from_key(stage_key) {
                Some(ShaderStage::Compute) => {
                    log::warn!("{}: compute shaders are not supported here", name);
                }
                Some(stage) => {
                    table.insert(stage, normalize(&format!("{}{}", directory, file)));
                }
                None => log::warn!("{}: unknown shader stage '{}'", name, stage_key),
            }
        }
    }
}

/// One `{name, type, default}` declaration in either accepted shape
struct Declaration<'a> {
    id: String,
    display: String,
    ty: Option<&'a str>,
    default: Option<&'a Value>,
}

fn declarations(section: Option<&Value>) -> Vec<Declaration<'_>> {
    match section {
        // [{ "name": "tint", "type": "color", "default": [...] }, ...]
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| {
                let id = entry.get("name").and_then(Value::as_str)?;
                let display = entry
                    .get("display")
                    .and_then(Value::as_str)
                    .unwrap_or(id);
                Some(Declaration {
                    id: id.to_string(),
                    display: display.to_string(),
                    ty: entry.get("type").and_then(Value::as_str),
                    default: entry.get("default"),
                })
            })
            .collect(),
        // { "tint": { "name": "Tint", "type": "color", "default": [...] }, ... }
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(id, entry)| Declaration {
                id: id.clone(),
                display: entry
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(id)
                    .to_string(),
                ty: entry.get("type").and_then(Value::as_str),
                default: entry.get("default"),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn map_declaration(name: &str, declaration: &Declaration, textures: bool, layout: &mut ParameterLayout) {
    let Some(keyword) = declaration.ty else {
        log::warn!("{}: parameter '{}' has no type", name, declaration.id);
        return;
    };
    let Some(ty) = ParameterType::from_keyword(keyword) else {
        log::warn!(
            "{}: parameter '{}' has unknown type '{}'",
            name,
            declaration.id,
            keyword
        );
        return;
    };

    if ty.is_texture() {
        layout.push_texture(&declaration.id, &declaration.display, ty, None);
    } else if textures {
        log::warn!(
            "{}: texture '{}' declared with non-texture type '{}'",
            name,
            declaration.id,
            keyword
        );
    } else {
        let default = declaration.default.and_then(|value| map_default(ty, value));
        layout.push_parameter(&declaration.id, &declaration.display, ty, default);
    }
}

/// Stage numeric literals into a 4-component buffer and commit once the
/// type's component count is reached.
fn map_default(ty: ParameterType, value: &Value) -> Option<ParameterValue> {
    let mut staged = Vec::with_capacity(4);
    match value {
        Value::Array(items) => {
            for item in items.iter().take(4) {
                staged.push(literal(item)?);
            }
        }
        scalar => staged.push(literal(scalar)?),
    }
    ty.value_from_components(&staged)
}

fn literal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn opaque_tree() -> Value {
        json!({
            "name": "Stone",
            "type": "opaque",
            "shaders": {
                "deferred": {
                    "opengl": { "vertex": "a.vert", "fragment": "a.frag" },
                    "vulkan": { "vertex": "a.vert.spv", "fragment": "a.frag.spv", "geometry": "a.geom.spv" }
                },
                "shadow": {
                    "opengl": { "vertex": "a_shadow.vert" }
                }
            }
        })
    }

    #[test]
    fn test_only_active_api_is_materialized() {
        let gl = PipelineDescriptor::from_tree(&opaque_tree(), "materials/", GraphicsApi::OpenGl, false);
        assert_eq!(gl.stages.len(), 2);
        assert_eq!(gl.stages[&ShaderStage::Vertex], "materials/a.vert");
        assert_eq!(gl.shadow_stages[&ShaderStage::Vertex], "materials/a_shadow.vert");

        let vk = PipelineDescriptor::from_tree(&opaque_tree(), "materials/", GraphicsApi::Vulkan, false);
        assert_eq!(vk.stages.len(), 3);
        assert!(vk.shadow_stages.is_empty());

        let dx = PipelineDescriptor::from_tree(&opaque_tree(), "materials/", GraphicsApi::DirectX, false);
        assert!(dx.stages.is_empty());
    }

    #[rstest]
    #[case::unlit("unlit", Bucket::Unlit)]
    #[case::opaque("opaque", Bucket::Opaque)]
    #[case::transparent("transparent", Bucket::Transparent)]
    #[case::unknown("glowing", Bucket::Misc)]
    fn test_bucket_routing(#[case] keyword: &str, #[case] bucket: Bucket) {
        let tree = json!({ "type": keyword });
        let descriptor = PipelineDescriptor::from_tree(&tree, "", GraphicsApi::OpenGl, false);
        assert_eq!(descriptor.bucket, bucket);
    }

    #[test]
    fn test_misc_overrides_type() {
        let descriptor = PipelineDescriptor::from_tree(&opaque_tree(), "", GraphicsApi::OpenGl, true);
        assert_eq!(descriptor.bucket, Bucket::Misc);
    }

    #[test]
    fn test_compute_stage_dropped() {
        let tree = json!({
            "type": "unlit",
            "shaders": { "forward": { "opengl": { "vertex": "v", "compute": "c", "mesh": "m" } } }
        });
        let descriptor = PipelineDescriptor::from_tree(&tree, "", GraphicsApi::OpenGl, false);
        assert_eq!(descriptor.stages.keys().copied().collect::<Vec<_>>(), vec![ShaderStage::Vertex]);
    }

    #[test]
    fn test_property_sizes_and_defaults() {
        let tree = json!({
            "type": "opaque",
            "properties": [
                { "name": "roughness", "type": "float", "default": 0.5 },
                { "name": "tint", "type": "vec4", "default": [1.0, 0.5, 0.25, 1.0] },
                { "name": "layers", "type": "int" },
                { "name": "offset", "type": "vec3", "default": [1.0, 2.0] }
            ]
        });
        let descriptor = PipelineDescriptor::from_tree(&tree, "", GraphicsApi::OpenGl, false);
        let layout = &descriptor.layout;
        assert_eq!(layout.size(), 4 + 16 + 4 + 12);
        assert_eq!(
            layout.parameter("tint").unwrap().default,
            Some(ParameterValue::Float([1.0, 0.5, 0.25, 1.0]))
        );
        assert_eq!(layout.parameter("layers").unwrap().default, None);
        // two components are not enough for a vec3
        assert_eq!(layout.parameter("offset").unwrap().default, None);
    }

    #[test]
    fn test_object_form_properties() {
        let tree = json!({
            "type": "transparent",
            "properties": {
                "glow": { "name": "Glow Strength", "type": "constant", "default": 2 }
            },
            "textures": {
                "albedo": { "name": "Albedo", "type": "texture" },
                "sky": { "name": "Sky", "type": "cubemap" },
                "bogus": { "name": "Bogus", "type": "float" }
            }
        });
        let descriptor = PipelineDescriptor::from_tree(&tree, "", GraphicsApi::OpenGl, false);
        let glow = descriptor.layout.parameter("glow").unwrap();
        assert_eq!(glow.display_name, "Glow Strength");
        assert_eq!(glow.ty, ParameterType::Float);
        assert_eq!(descriptor.layout.textures().len(), 2);
        assert!(descriptor.layout.texture("bogus").is_none());
    }

    #[test]
    fn test_object_form_keeps_document_order() {
        let text = r#"{
            "type": "opaque",
            "properties": {
                "zeta": { "name": "Zeta", "type": "float", "default": 1 },
                "alpha": { "name": "Alpha", "type": "vec4" }
            },
            "textures": {
                "sky": { "name": "Sky", "type": "cubemap" },
                "albedo": { "name": "Albedo", "type": "texture" }
            }
        }"#;
        let descriptor = PipelineDescriptor::parse("materials/order.json", text, GraphicsApi::OpenGl, false)
            .unwrap();
        let layout = &descriptor.layout;
        assert_eq!(layout.parameter("zeta").unwrap().offset, 0);
        assert_eq!(layout.parameter("alpha").unwrap().offset, 4);

        let slots: Vec<(&str, u32)> = layout
            .textures()
            .iter()
            .map(|t| (t.parameter.name.as_str(), t.slot))
            .collect();
        assert_eq!(slots, vec![("sky", 0), ("albedo", 1)]);
    }

    #[test]
    fn test_parse_error_reports_path() {
        let err = PipelineDescriptor::parse("materials/bad.json", "{ not json", GraphicsApi::OpenGl, false)
            .unwrap_err();
        assert!(matches!(err, RenderError::Descriptor { ref path, .. } if path == "materials/bad.json"));
    }
}
