use crate::convert::VariantType;
use crate::object;
use crate::variant::{GType, Variant};
use std::fmt;

/// Element type constraint of an array or dictionary side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Any Variant.
    Untyped,
    Builtin(GType),
    /// Objects inheriting from the named class (nil allowed).
    Class(String),
}

impl ElementType {
    pub fn of<T: VariantType>() -> Self {
        match T::GTYPE {
            GType::Nil => ElementType::Untyped,
            GType::Object => ElementType::Class(T::class_name().unwrap_or_else(|| "Object".to_string())),
            gtype => ElementType::Builtin(gtype),
        }
    }

    pub(crate) fn from_engine(gtype: i64, class_name: String) -> Self {
        match GType::from_sys(gtype as u32) {
            None | Some(GType::Nil) => ElementType::Untyped,
            Some(GType::Object) if !class_name.is_empty() => ElementType::Class(class_name),
            Some(GType::Object) => ElementType::Class("Object".to_string()),
            Some(gtype) => ElementType::Builtin(gtype),
        }
    }

    pub fn is_typed(&self) -> bool {
        !matches!(self, ElementType::Untyped)
    }

    pub fn gtype(&self) -> GType {
        match self {
            ElementType::Untyped => GType::Nil,
            ElementType::Builtin(gtype) => *gtype,
            ElementType::Class(_) => GType::Object,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            ElementType::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Host-side check mirroring the engine's typed-container validation.
    pub fn accepts(&self, value: &Variant) -> bool {
        match self {
            ElementType::Untyped => true,
            ElementType::Builtin(gtype) => value.gtype() == *gtype,
            ElementType::Class(class_name) => match value.gtype() {
                GType::Nil => true,
                GType::Object => object::variant_inherits(value, class_name),
                _ => false,
            },
        }
    }

    /// Name of the type a value actually has, in the same vocabulary.
    pub(crate) fn describe_value(value: &Variant) -> String {
        match value.gtype() {
            GType::Object => object::variant_class_name(value).unwrap_or_else(|| "Object".to_string()),
            gtype => gtype.name().to_string(),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Untyped => f.write_str("Variant"),
            ElementType::Builtin(gtype) => f.write_str(gtype.name()),
            ElementType::Class(name) => f.write_str(name),
        }
    }
}
