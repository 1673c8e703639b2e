//! 属性与方法描述符
//!
//! [`PropInfo`] 描述一个参数、返回值或属性的类型，提交注册时转换为引擎的
//! `GDExtensionPropertyInfo`。提示与用法标志的数值与引擎一致。

use crate::builtins::{GString, StringName};
use crate::convert::{EngineBitfield, VariantType};
use crate::sys::PropertyInfoRaw;
use crate::variant::GType;

crate::variant_enum! {
    /// Editor hint attached to a property (`PropertyHint` in the engine).
    pub enum PropertyHint {
        None = 0,
        Range = 1,
        Enum = 2,
        Flags = 6,
        File = 13,
        Dir = 14,
        ResourceType = 17,
        MultilineText = 18,
        PlaceholderText = 20,
        NodePathValidTypes = 26,
        ArrayType = 31,
        Password = 36,
        DictionaryType = 38,
    }
}

crate::variant_bitfield! {
    /// Property usage flags (`PropertyUsageFlags` in the engine).
    pub struct PropertyUsage {
        const NONE = 0;
        const STORAGE = 2;
        const EDITOR = 4;
        const INTERNAL = 8;
        const CHECKABLE = 16;
        const CHECKED = 32;
        const GROUP = 64;
        const CATEGORY = 128;
        const SUBGROUP = 256;
        const READ_ONLY = 8192;
        const NIL_IS_VARIANT = 131072;
    }
}

impl PropertyUsage {
    /// Stored and shown in the editor.
    pub const DEFAULT: PropertyUsage = PropertyUsage(2 | 4);
}

crate::variant_bitfield! {
    /// Method flags (`MethodFlags` in the engine).
    pub struct MethodFlags {
        const NORMAL = 1;
        const EDITOR = 2;
        const CONST = 4;
        const VIRTUAL = 8;
        const VARARG = 16;
        const STATIC = 32;
    }
}

impl MethodFlags {
    pub const DEFAULT: MethodFlags = MethodFlags::NORMAL;
    /// Normal method that does not mutate the instance.
    pub const DEFAULT_CONST: MethodFlags = MethodFlags(1 | 4);
}

/// Type description of an argument, return value or property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropInfo {
    pub name: String,
    pub gtype: GType,
    /// Engine class for object values; empty otherwise.
    pub class_name: String,
    pub hint: PropertyHint,
    pub hint_string: String,
    pub usage: PropertyUsage,
}

impl PropInfo {
    /// Descriptor derived from the conversion mapping of `T`.
    pub fn new<T: VariantType>(name: impl Into<String>) -> Self {
        let (hint, hint_string) = T::property_hint();
        Self {
            name: name.into(),
            gtype: T::GTYPE,
            class_name: T::class_name().unwrap_or_default(),
            hint,
            hint_string,
            usage: T::property_usage(),
        }
    }

    /// Untyped slot accepting any Variant.
    pub fn variant(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gtype: GType::Nil,
            class_name: String::new(),
            hint: PropertyHint::None,
            hint_string: String::new(),
            usage: PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT,
        }
    }

    pub fn with_hint(mut self, hint: PropertyHint, hint_string: impl Into<String>) -> Self {
        self.hint = hint;
        self.hint_string = hint_string.into();
        self
    }

    pub fn with_usage(mut self, usage: PropertyUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Whether the slot accepts any Variant type.
    pub fn is_variant(&self) -> bool {
        self.gtype == GType::Nil
    }

    /// Whether a value of `gtype` satisfies this descriptor. Nil is accepted for object slots.
    pub fn accepts(&self, gtype: GType) -> bool {
        self.is_variant() || gtype == self.gtype || (self.gtype == GType::Object && gtype == GType::Nil)
    }

    pub(crate) fn to_sys(&self) -> PropInfoSys {
        PropInfoSys {
            gtype: self.gtype,
            name: StringName::from(self.name.as_str()),
            class_name: StringName::from(self.class_name.as_str()),
            hint: self.hint as u32,
            hint_string: GString::from(self.hint_string.as_str()),
            usage: self.usage.bits() as u32,
        }
    }
}

/// Engine-side strings backing one `GDExtensionPropertyInfo`.
pub(crate) struct PropInfoSys {
    gtype: GType,
    name: StringName,
    class_name: StringName,
    hint: u32,
    hint_string: GString,
    usage: u32,
}

impl PropInfoSys {
    /// The raw struct borrows `self`; it must not outlive it.
    pub(crate) fn raw(&mut self) -> PropertyInfoRaw {
        PropertyInfoRaw {
            type_: self.gtype.to_sys(),
            name: self.name.sys_mut(),
            class_name: self.class_name.sys_mut(),
            hint: self.hint,
            hint_string: self.hint_string.sys_mut(),
            usage: self.usage,
        }
    }
}

/// Raw descriptors for a list of [`PropInfo`], kept alive together.
pub(crate) struct PropInfoList {
    owned: Vec<PropInfoSys>,
    raw: Vec<PropertyInfoRaw>,
}

impl PropInfoList {
    pub(crate) fn new(infos: &[PropInfo]) -> Self {
        let mut owned: Vec<PropInfoSys> = infos.iter().map(PropInfo::to_sys).collect();
        let raw = owned.iter_mut().map(PropInfoSys::raw).collect();
        Self { owned, raw }
    }

    pub(crate) fn len(&self) -> usize {
        self.owned.len()
    }

    pub(crate) fn as_ptr(&self) -> *const PropertyInfoRaw {
        if self.raw.is_empty() {
            std::ptr::null()
        } else {
            self.raw.as_ptr()
        }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut PropertyInfoRaw {
        if self.raw.is_empty() {
            std::ptr::null_mut()
        } else {
            self.raw.as_mut_ptr()
        }
    }
}

/// Descriptor of a class signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalInfo {
    pub name: String,
    pub arguments: Vec<PropInfo>,
}

impl SignalInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: PropInfo) -> Self {
        self.arguments.push(argument);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_values_match_engine() {
        assert_eq!(PropertyHint::Range as i64, 1);
        assert_eq!(PropertyHint::ResourceType as i64, 17);
        assert_eq!(PropertyHint::ArrayType as i64, 31);
    }

    #[test]
    fn test_usage_flags() {
        assert_eq!(PropertyUsage::DEFAULT.bits(), 6);
        let usage = PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT;
        assert!(usage.contains(PropertyUsage::STORAGE));
        assert!(usage.contains(PropertyUsage::NIL_IS_VARIANT));
        assert!(!usage.contains(PropertyUsage::GROUP));
        assert!(PropertyUsage::NONE.is_empty());
    }

    #[test]
    fn test_descriptor_from_type() {
        let info = PropInfo::new::<i64>("speed");
        assert_eq!(info.gtype, GType::Int);
        assert_eq!(info.usage, PropertyUsage::DEFAULT);
        assert!(info.accepts(GType::Int));
        assert!(!info.accepts(GType::Float));

        let any = PropInfo::variant("payload");
        assert!(any.is_variant());
        assert!(any.accepts(GType::Dictionary));

        let hinted = PropInfo::new::<i64>("hp").with_hint(PropertyHint::Range, "0,100,1");
        assert_eq!(hinted.hint, PropertyHint::Range);
        assert_eq!(hinted.hint_string, "0,100,1");
    }

    #[test]
    fn test_signal_builder() {
        let signal = SignalInfo::new("hit").with_argument(PropInfo::new::<i64>("damage"));
        assert_eq!(signal.arguments.len(), 1);
        assert_eq!(signal.arguments[0].name, "damage");
    }
}
