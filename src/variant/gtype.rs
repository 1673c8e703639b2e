//! Variant 类型标签
//!
//! 枚举顺序必须与引擎 ABI 完全一致。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of concrete variant types (`GDEXTENSION_VARIANT_TYPE_VARIANT_MAX`).
pub const GTYPE_COUNT: usize = 39;

/// Runtime type tag of a [`Variant`](crate::variant::Variant).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GType {
    Nil = 0,

    // atomic types
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,

    // math types
    Vector2 = 5,
    Vector2i = 6,
    Rect2 = 7,
    Rect2i = 8,
    Vector3 = 9,
    Vector3i = 10,
    Transform2D = 11,
    Vector4 = 12,
    Vector4i = 13,
    Plane = 14,
    Quaternion = 15,
    Aabb = 16,
    Basis = 17,
    Transform3D = 18,
    Projection = 19,

    // misc types
    Color = 20,
    StringName = 21,
    NodePath = 22,
    Rid = 23,
    Object = 24,
    Callable = 25,
    Signal = 26,
    Dictionary = 27,
    Array = 28,

    // typed arrays
    PackedByteArray = 29,
    PackedInt32Array = 30,
    PackedInt64Array = 31,
    PackedFloat32Array = 32,
    PackedFloat64Array = 33,
    PackedStringArray = 34,
    PackedVector2Array = 35,
    PackedVector3Array = 36,
    PackedColorArray = 37,
    PackedVector4Array = 38,
}

impl GType {
    pub const ALL: [GType; GTYPE_COUNT] = [
        GType::Nil,
        GType::Bool,
        GType::Int,
        GType::Float,
        GType::String,
        GType::Vector2,
        GType::Vector2i,
        GType::Rect2,
        GType::Rect2i,
        GType::Vector3,
        GType::Vector3i,
        GType::Transform2D,
        GType::Vector4,
        GType::Vector4i,
        GType::Plane,
        GType::Quaternion,
        GType::Aabb,
        GType::Basis,
        GType::Transform3D,
        GType::Projection,
        GType::Color,
        GType::StringName,
        GType::NodePath,
        GType::Rid,
        GType::Object,
        GType::Callable,
        GType::Signal,
        GType::Dictionary,
        GType::Array,
        GType::PackedByteArray,
        GType::PackedInt32Array,
        GType::PackedInt64Array,
        GType::PackedFloat32Array,
        GType::PackedFloat64Array,
        GType::PackedStringArray,
        GType::PackedVector2Array,
        GType::PackedVector3Array,
        GType::PackedColorArray,
        GType::PackedVector4Array,
    ];

    /// 未知的标签值返回 `None`
    pub fn from_sys(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn to_sys(self) -> u32 {
        self as u32
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used by the engine's API metadata.
    pub fn name(self) -> &'static str {
        match self {
            GType::Nil => "Nil",
            GType::Bool => "bool",
            GType::Int => "int",
            GType::Float => "float",
            GType::String => "String",
            GType::Vector2 => "Vector2",
            GType::Vector2i => "Vector2i",
            GType::Rect2 => "Rect2",
            GType::Rect2i => "Rect2i",
            GType::Vector3 => "Vector3",
            GType::Vector3i => "Vector3i",
            GType::Transform2D => "Transform2D",
            GType::Vector4 => "Vector4",
            GType::Vector4i => "Vector4i",
            GType::Plane => "Plane",
            GType::Quaternion => "Quaternion",
            GType::Aabb => "AABB",
            GType::Basis => "Basis",
            GType::Transform3D => "Transform3D",
            GType::Projection => "Projection",
            GType::Color => "Color",
            GType::StringName => "StringName",
            GType::NodePath => "NodePath",
            GType::Rid => "RID",
            GType::Object => "Object",
            GType::Callable => "Callable",
            GType::Signal => "Signal",
            GType::Dictionary => "Dictionary",
            GType::Array => "Array",
            GType::PackedByteArray => "PackedByteArray",
            GType::PackedInt32Array => "PackedInt32Array",
            GType::PackedInt64Array => "PackedInt64Array",
            GType::PackedFloat32Array => "PackedFloat32Array",
            GType::PackedFloat64Array => "PackedFloat64Array",
            GType::PackedStringArray => "PackedStringArray",
            GType::PackedVector2Array => "PackedVector2Array",
            GType::PackedVector3Array => "PackedVector3Array",
            GType::PackedColorArray => "PackedColorArray",
            GType::PackedVector4Array => "PackedVector4Array",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn is_packed_array(self) -> bool {
        self >= GType::PackedByteArray
    }

    /// Plain-old-data payloads need no destructor.
    pub fn is_trivially_destructible(self) -> bool {
        matches!(
            self,
            GType::Nil
                | GType::Bool
                | GType::Int
                | GType::Float
                | GType::Vector2
                | GType::Vector2i
                | GType::Rect2
                | GType::Rect2i
                | GType::Vector3
                | GType::Vector3i
                | GType::Transform2D
                | GType::Vector4
                | GType::Vector4i
                | GType::Plane
                | GType::Quaternion
                | GType::Aabb
                | GType::Basis
                | GType::Transform3D
                | GType::Projection
                | GType::Color
                | GType::Rid
        )
    }
}

impl fmt::Display for GType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_order_matches_abi() {
        for (index, gtype) in GType::ALL.iter().enumerate() {
            assert_eq!(gtype.to_sys() as usize, index);
            assert_eq!(GType::from_sys(index as u32), Some(*gtype));
        }
        assert_eq!(GType::Object.to_sys(), 24);
        assert_eq!(GType::PackedVector4Array.to_sys(), 38);
        assert_eq!(GType::from_sys(GTYPE_COUNT as u32), None);
    }

    #[test]
    fn test_names_round_trip() {
        for gtype in GType::ALL {
            assert_eq!(GType::from_name(gtype.name()), Some(gtype));
        }
        assert_eq!(GType::Aabb.to_string(), "AABB");
    }

    #[test]
    fn test_packed_classification() {
        assert!(GType::PackedByteArray.is_packed_array());
        assert!(GType::PackedVector4Array.is_packed_array());
        assert!(!GType::Array.is_packed_array());
        assert!(GType::Transform3D.is_trivially_destructible());
        assert!(!GType::String.is_trivially_destructible());
    }
}
