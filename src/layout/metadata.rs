//! 引擎布局元数据
//!
//! 引擎以 `extension_api.json` 的形式发布内建类型的大小与成员偏移：
//! `builtin_class_sizes` 与 `builtin_class_member_offsets` 两个表，每个构建配置各一份。
//! 其余键被忽略，因此可以直接读取完整的 `extension_api.json`。

use crate::core::error::{LayoutError, LayoutResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Table shipped with the crate, matching the engine versions this crate targets.
pub const BUNDLED_METADATA: &str = include_str!("builtin_layouts.json");

/// Engine build configuration: real precision and pointer width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildConfiguration {
    Float32,
    Float64,
    Double32,
    Double64,
}

impl BuildConfiguration {
    pub const ALL: [BuildConfiguration; 4] = [
        BuildConfiguration::Float32,
        BuildConfiguration::Float64,
        BuildConfiguration::Double32,
        BuildConfiguration::Double64,
    ];

    /// Configuration this crate was compiled for.
    pub fn active() -> Self {
        let double = cfg!(feature = "double-precision");
        let wide = cfg!(target_pointer_width = "64");
        match (double, wide) {
            (false, false) => BuildConfiguration::Float32,
            (false, true) => BuildConfiguration::Float64,
            (true, false) => BuildConfiguration::Double32,
            (true, true) => BuildConfiguration::Double64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuildConfiguration::Float32 => "float_32",
            BuildConfiguration::Float64 => "float_64",
            BuildConfiguration::Double32 => "double_32",
            BuildConfiguration::Double64 => "double_64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn is_double(self) -> bool {
        matches!(self, BuildConfiguration::Double32 | BuildConfiguration::Double64)
    }

    pub fn pointer_size(self) -> usize {
        match self {
            BuildConfiguration::Float32 | BuildConfiguration::Double32 => 4,
            BuildConfiguration::Float64 | BuildConfiguration::Double64 => 8,
        }
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One member entry of `builtin_class_member_offsets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberOffset {
    pub member: String,
    pub offset: usize,
    #[serde(default)]
    pub meta: String,
}

impl MemberOffset {
    pub fn new(member: impl Into<String>, offset: usize, meta: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            offset,
            meta: meta.into(),
        }
    }
}

/// Sizes and member offsets of one build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationLayout {
    pub sizes: BTreeMap<String, usize>,
    pub members: BTreeMap<String, Vec<MemberOffset>>,
}

impl ConfigurationLayout {
    pub fn size_of(&self, type_name: &str) -> Option<usize> {
        self.sizes.get(type_name).copied()
    }

    pub fn members_of(&self, type_name: &str) -> &[MemberOffset] {
        self.members.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    builtin_class_sizes: Vec<RawSizes>,
    #[serde(default)]
    builtin_class_member_offsets: Vec<RawOffsets>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawSizes {
    build_configuration: String,
    sizes: Vec<RawSize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawSize {
    name: String,
    size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawOffsets {
    build_configuration: String,
    classes: Vec<RawClass>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawClass {
    name: String,
    members: Vec<MemberOffset>,
}

/// 解析后的布局元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutMetadata {
    configurations: BTreeMap<BuildConfiguration, ConfigurationLayout>,
}

impl LayoutMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bundled() -> LayoutResult<Self> {
        Self::from_json_str(BUNDLED_METADATA)
    }

    /// Unknown build configuration names are skipped with a warning.
    pub fn from_json_str(json: &str) -> LayoutResult<Self> {
        let raw: RawMetadata = serde_json::from_str(json).map_err(|e| LayoutError::Parse(e.to_string()))?;
        let mut metadata = Self::new();

        for table in raw.builtin_class_sizes {
            let Some(configuration) = BuildConfiguration::from_name(&table.build_configuration) else {
                tracing::warn!(target: "layout", "Skipping unknown build configuration {}", table.build_configuration);
                continue;
            };
            let layout = metadata.configurations.entry(configuration).or_default();
            for entry in table.sizes {
                layout.sizes.insert(entry.name, entry.size);
            }
        }
        for table in raw.builtin_class_member_offsets {
            let Some(configuration) = BuildConfiguration::from_name(&table.build_configuration) else {
                tracing::warn!(target: "layout", "Skipping unknown build configuration {}", table.build_configuration);
                continue;
            };
            let layout = metadata.configurations.entry(configuration).or_default();
            for class in table.classes {
                layout.members.insert(class.name, class.members);
            }
        }

        tracing::debug!(
            target: "layout",
            "Parsed layout metadata for {} build configurations",
            metadata.configurations.len()
        );
        Ok(metadata)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> LayoutResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| LayoutError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn insert(&mut self, configuration: BuildConfiguration, layout: ConfigurationLayout) {
        self.configurations.insert(configuration, layout);
    }

    pub fn configurations(&self) -> impl Iterator<Item = BuildConfiguration> + '_ {
        self.configurations.keys().copied()
    }

    pub fn configuration(&self, configuration: BuildConfiguration) -> LayoutResult<&ConfigurationLayout> {
        self.configurations
            .get(&configuration)
            .ok_or_else(|| LayoutError::MissingConfiguration(configuration.name().to_string()))
    }

    /// Serializes back into the `extension_api.json` table shape.
    pub fn to_json_string(&self) -> LayoutResult<String> {
        let mut raw = RawMetadata::default();
        for (configuration, layout) in &self.configurations {
            raw.builtin_class_sizes.push(RawSizes {
                build_configuration: configuration.name().to_string(),
                sizes: layout
                    .sizes
                    .iter()
                    .map(|(name, size)| RawSize {
                        name: name.clone(),
                        size: *size,
                    })
                    .collect(),
            });
            raw.builtin_class_member_offsets.push(RawOffsets {
                build_configuration: configuration.name().to_string(),
                classes: layout
                    .members
                    .iter()
                    .map(|(name, members)| RawClass {
                        name: name.clone(),
                        members: members.clone(),
                    })
                    .collect(),
            });
        }
        serde_json::to_string_pretty(&raw).map_err(|e| LayoutError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_covers_every_configuration() {
        let metadata = LayoutMetadata::bundled().unwrap();
        for configuration in BuildConfiguration::ALL {
            let layout = metadata.configuration(configuration).unwrap();
            let real = if configuration.is_double() { 8 } else { 4 };
            assert_eq!(layout.size_of("Vector3"), Some(3 * real));
            assert_eq!(layout.size_of("Variant"), Some(if configuration.is_double() { 40 } else { 24 }));
            assert_eq!(layout.size_of("String"), Some(configuration.pointer_size()));
        }
    }

    #[test]
    fn test_unknown_configuration_is_skipped() {
        let json = r#"{
            "header": {"version_major": 4},
            "builtin_class_sizes": [
                {"build_configuration": "float_64", "sizes": [{"name": "Color", "size": 16}]},
                {"build_configuration": "half_16", "sizes": [{"name": "Color", "size": 8}]}
            ]
        }"#;
        let metadata = LayoutMetadata::from_json_str(json).unwrap();
        assert_eq!(metadata.configurations().count(), 1);
        let layout = metadata.configuration(BuildConfiguration::Float64).unwrap();
        assert_eq!(layout.size_of("Color"), Some(16));
        assert!(layout.members_of("Color").is_empty());
        assert_eq!(
            metadata.configuration(BuildConfiguration::Double32),
            Err(LayoutError::MissingConfiguration("double_32".into()))
        );
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            LayoutMetadata::from_json_str("{\"builtin_class_sizes\": 3}"),
            Err(LayoutError::Parse(_))
        ));
    }

    #[test]
    fn test_json_text_reparses() {
        let metadata = LayoutMetadata::bundled().unwrap();
        let text = metadata.to_json_string().unwrap();
        assert_eq!(LayoutMetadata::from_json_str(&text).unwrap(), metadata);
    }

    #[test]
    fn test_active_configuration_matches_build() {
        let active = BuildConfiguration::active();
        assert_eq!(active.is_double(), cfg!(feature = "double-precision"));
        assert_eq!(active.pointer_size(), std::mem::size_of::<usize>());
        assert_eq!(BuildConfiguration::from_name(active.name()), Some(active));
    }
}
