//! 布局校验
//!
//! 用 `size_of` / `offset_of!` 得到宿主侧布局，与引擎发布的表逐项比较。
//! 任何不一致都是致命的：按错误布局读写内存会悄悄破坏引擎状态。

use super::metadata::{BuildConfiguration, ConfigurationLayout};
use crate::builtins::{
    Aabb, Basis, Callable, Color, Dictionary, GString, NodePath, PackedByteArray, PackedColorArray,
    PackedFloat32Array, PackedFloat64Array, PackedInt32Array, PackedInt64Array, PackedStringArray,
    PackedVector2Array, PackedVector3Array, PackedVector4Array, Plane, Projection, Quaternion, Rect2,
    Rect2i, Rid, Signal, StringName, Transform2D, Transform3D, VariantArray, Vector2, Vector2i, Vector3,
    Vector3i, Vector4, Vector4i,
};
use crate::core::error::{LayoutError, LayoutResult};
use crate::variant::VariantContent;
use std::mem::{offset_of, size_of};

/// Host-side member of a builtin struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostMember {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
}

/// Host-side layout of one builtin type, named as the engine names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    pub name: &'static str,
    pub size: usize,
    pub members: Vec<HostMember>,
}

fn field_size<T, F>(_: fn(&T) -> &F) -> usize {
    size_of::<F>()
}

macro_rules! host_layout {
    ($name:literal => $ty:ty) => {
        HostLayout {
            name: $name,
            size: size_of::<$ty>(),
            members: Vec::new(),
        }
    };
    ($name:literal => $ty:ty { $($field:ident),+ $(,)? }) => {
        HostLayout {
            name: $name,
            size: size_of::<$ty>(),
            members: vec![$(HostMember {
                name: stringify!($field),
                offset: offset_of!($ty, $field),
                size: field_size(|v: &$ty| &v.$field),
            }),+],
        }
    };
}

/// Every builtin type whose memory the bridge reads or writes directly.
pub fn host_layouts() -> Vec<HostLayout> {
    vec![
        host_layout!("Vector2" => Vector2 { x, y }),
        host_layout!("Vector2i" => Vector2i { x, y }),
        host_layout!("Rect2" => Rect2 { position, size }),
        host_layout!("Rect2i" => Rect2i { position, size }),
        host_layout!("Vector3" => Vector3 { x, y, z }),
        host_layout!("Vector3i" => Vector3i { x, y, z }),
        host_layout!("Transform2D" => Transform2D { x, y, origin }),
        host_layout!("Vector4" => Vector4 { x, y, z, w }),
        host_layout!("Vector4i" => Vector4i { x, y, z, w }),
        host_layout!("Plane" => Plane { normal, d }),
        host_layout!("Quaternion" => Quaternion { x, y, z, w }),
        host_layout!("AABB" => Aabb { position, size }),
        host_layout!("Basis" => Basis { x, y, z }),
        host_layout!("Transform3D" => Transform3D { basis, origin }),
        host_layout!("Projection" => Projection { x, y, z, w }),
        host_layout!("Color" => Color { r, g, b, a }),
        host_layout!("RID" => Rid),
        host_layout!("String" => GString),
        host_layout!("StringName" => StringName),
        host_layout!("NodePath" => NodePath),
        host_layout!("Callable" => Callable),
        host_layout!("Signal" => Signal),
        host_layout!("Dictionary" => Dictionary),
        host_layout!("Array" => VariantArray),
        host_layout!("PackedByteArray" => PackedByteArray),
        host_layout!("PackedInt32Array" => PackedInt32Array),
        host_layout!("PackedInt64Array" => PackedInt64Array),
        host_layout!("PackedFloat32Array" => PackedFloat32Array),
        host_layout!("PackedFloat64Array" => PackedFloat64Array),
        host_layout!("PackedStringArray" => PackedStringArray),
        host_layout!("PackedVector2Array" => PackedVector2Array),
        host_layout!("PackedVector3Array" => PackedVector3Array),
        host_layout!("PackedVector4Array" => PackedVector4Array),
        host_layout!("PackedColorArray" => PackedColorArray),
        host_layout!("Variant" => VariantContent),
    ]
}

/// Outcome of a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutReport {
    pub configuration: BuildConfiguration,
    pub types_checked: usize,
    pub members_checked: usize,
}

/// Checks one host type against the engine table.
///
/// When the engine lists members for the type, those members must cover every byte of it.
pub fn check_type(host: &HostLayout, engine: &ConfigurationLayout, configuration: BuildConfiguration) -> LayoutResult<usize> {
    let expected = engine.size_of(host.name).ok_or_else(|| LayoutError::MissingType {
        type_name: host.name.to_string(),
        configuration: configuration.name().to_string(),
    })?;
    if expected != host.size {
        return Err(LayoutError::SizeMismatch {
            type_name: host.name.to_string(),
            expected,
            actual: host.size,
        });
    }

    let members = engine.members_of(host.name);
    let mut covered = 0;
    for member in members {
        let Some(local) = host.members.iter().find(|m| m.name == member.member) else {
            return Err(LayoutError::UnknownMember {
                type_name: host.name.to_string(),
                member: member.member.clone(),
            });
        };
        if local.offset != member.offset {
            return Err(LayoutError::OffsetMismatch {
                type_name: host.name.to_string(),
                member: member.member.clone(),
                expected: member.offset,
                actual: local.offset,
            });
        }
        covered += local.size;
    }
    if !members.is_empty() && covered != host.size {
        return Err(LayoutError::UncheckedBytes {
            type_name: host.name.to_string(),
            covered,
            size: host.size,
        });
    }
    Ok(members.len())
}

/// 逐个校验所有宿主类型，遇到第一个不一致即返回
pub fn check_layouts(engine: &ConfigurationLayout, configuration: BuildConfiguration) -> LayoutResult<LayoutReport> {
    let hosts = host_layouts();
    let mut members_checked = 0;
    for host in &hosts {
        members_checked += check_type(host, engine, configuration)?;
    }
    tracing::info!(
        target: "layout",
        "Layout check passed for {}: {} types, {} members",
        configuration,
        hosts.len(),
        members_checked
    );
    Ok(LayoutReport {
        configuration,
        types_checked: hosts.len(),
        members_checked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::metadata::{LayoutMetadata, MemberOffset};

    fn active_layout() -> ConfigurationLayout {
        LayoutMetadata::bundled()
            .unwrap()
            .configuration(BuildConfiguration::active())
            .unwrap()
            .clone()
    }

    #[test]
    fn test_bundled_table_matches_host() {
        let report = check_layouts(&active_layout(), BuildConfiguration::active()).unwrap();
        assert_eq!(report.types_checked, host_layouts().len());
        assert!(report.members_checked >= 40);
    }

    #[test]
    fn test_shifted_member_is_reported() {
        let mut engine = active_layout();
        engine.members.get_mut("Plane").unwrap()[1].offset += 4;
        let err = check_layouts(&engine, BuildConfiguration::active()).unwrap_err();
        assert!(matches!(err, LayoutError::OffsetMismatch { ref type_name, ref member, .. }
            if type_name == "Plane" && member == "d"));
    }

    #[test]
    fn test_partial_member_list_leaves_bytes_unchecked() {
        let mut engine = active_layout();
        engine
            .members
            .insert("Color".into(), vec![MemberOffset::new("r", 0, "float"), MemberOffset::new("g", 4, "float")]);
        let err = check_layouts(&engine, BuildConfiguration::active()).unwrap_err();
        assert_eq!(
            err,
            LayoutError::UncheckedBytes {
                type_name: "Color".into(),
                covered: 8,
                size: 16
            }
        );
    }

    #[test]
    fn test_unknown_member_and_missing_type() {
        let mut engine = active_layout();
        engine.members.get_mut("Vector2i").unwrap().push(MemberOffset::new("z", 8, "int32"));
        assert!(matches!(
            check_layouts(&engine, BuildConfiguration::active()),
            Err(LayoutError::UnknownMember { .. })
        ));

        let mut engine = active_layout();
        engine.sizes.remove("Projection");
        assert!(matches!(
            check_layouts(&engine, BuildConfiguration::active()),
            Err(LayoutError::MissingType { .. })
        ));
    }

    #[test]
    fn test_variant_size_mismatch() {
        let mut engine = active_layout();
        engine.sizes.insert("Variant".into(), 32);
        assert!(matches!(
            check_layouts(&engine, BuildConfiguration::active()),
            Err(LayoutError::SizeMismatch { expected: 32, .. })
        ));
    }
}
