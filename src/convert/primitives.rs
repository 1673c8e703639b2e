//! 基础类型的转换实现
//!
//! 整数统一编码为 64 位 `Int`，取出时做范围检查；浮点统一编码为 64 位 `Float`。

use super::traits::{type_from_variant, variant_from_type_ptr, FromVariant, ToVariant, VariantType};
use crate::builtins::GString;
use crate::core::error::{ConversionError, ConversionResult};
use crate::registry::{PropertyHint, PropertyUsage};
use crate::sys::TypePtr;
use crate::variant::{GType, Variant};

impl ToVariant for bool {
    fn to_variant(&self) -> Variant {
        // The engine stores booleans as a single byte.
        let mut raw: u8 = u8::from(*self);
        unsafe { variant_from_type_ptr(GType::Bool, &mut raw as *mut u8 as TypePtr) }
    }
}

impl FromVariant for bool {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        let raw: u8 = unsafe { type_from_variant(variant, GType::Bool)? };
        Ok(raw != 0)
    }
}

impl VariantType for bool {
    const GTYPE: GType = GType::Bool;
}

impl ToVariant for i64 {
    fn to_variant(&self) -> Variant {
        let mut raw = *self;
        unsafe { variant_from_type_ptr(GType::Int, &mut raw as *mut i64 as TypePtr) }
    }
}

impl FromVariant for i64 {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        unsafe { type_from_variant(variant, GType::Int) }
    }
}

impl VariantType for i64 {
    const GTYPE: GType = GType::Int;
}

macro_rules! impl_narrow_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToVariant for $ty {
                fn to_variant(&self) -> Variant {
                    i64::from(*self).to_variant()
                }
            }

            impl FromVariant for $ty {
                fn from_variant(variant: &Variant) -> ConversionResult<Self> {
                    let value = i64::from_variant(variant)?;
                    <$ty>::try_from(value).map_err(|_| ConversionError::IntegerOverflow {
                        value,
                        target: stringify!($ty),
                    })
                }
            }

            impl VariantType for $ty {
                const GTYPE: GType = GType::Int;
            }
        )*
    };
}

impl_narrow_int!(i8, i16, i32, u8, u16, u32);

impl ToVariant for f64 {
    fn to_variant(&self) -> Variant {
        let mut raw = *self;
        unsafe { variant_from_type_ptr(GType::Float, &mut raw as *mut f64 as TypePtr) }
    }
}

impl FromVariant for f64 {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        unsafe { type_from_variant(variant, GType::Float) }
    }
}

impl VariantType for f64 {
    const GTYPE: GType = GType::Float;
}

impl ToVariant for f32 {
    fn to_variant(&self) -> Variant {
        f64::from(*self).to_variant()
    }
}

impl FromVariant for f32 {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        f64::from_variant(variant).map(|value| value as f32)
    }
}

impl VariantType for f32 {
    const GTYPE: GType = GType::Float;
}

impl ToVariant for str {
    fn to_variant(&self) -> Variant {
        GString::from(self).to_variant()
    }
}

impl ToVariant for String {
    fn to_variant(&self) -> Variant {
        self.as_str().to_variant()
    }
}

impl FromVariant for String {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        GString::from_variant(variant).map(|text| text.to_string())
    }
}

impl VariantType for String {
    const GTYPE: GType = GType::String;
}

impl ToVariant for Variant {
    fn to_variant(&self) -> Variant {
        self.clone()
    }
}

/// Accepts every Variant, nil included.
impl FromVariant for Variant {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        Ok(variant.clone())
    }
}

impl VariantType for Variant {
    const GTYPE: GType = GType::Nil;
}

impl ToVariant for () {
    fn to_variant(&self) -> Variant {
        Variant::nil()
    }
}

impl FromVariant for () {
    fn from_variant(_variant: &Variant) -> ConversionResult<Self> {
        Ok(())
    }
}

impl VariantType for () {
    const GTYPE: GType = GType::Nil;

    fn property_usage() -> PropertyUsage {
        PropertyUsage::NONE
    }
}

/// `None` encodes as nil.
impl<T: ToVariant> ToVariant for Option<T> {
    fn to_variant(&self) -> Variant {
        match self {
            Some(value) => value.to_variant(),
            None => Variant::nil(),
        }
    }
}

/// Nil decodes as `None`; any other tag must convert to `T`.
impl<T: FromVariant> FromVariant for Option<T> {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        if variant.is_nil() {
            Ok(None)
        } else {
            T::from_variant(variant).map(Some)
        }
    }
}

impl<T: VariantType> VariantType for Option<T> {
    const GTYPE: GType = T::GTYPE;

    fn class_name() -> Option<String> {
        T::class_name()
    }

    fn property_hint() -> (PropertyHint, String) {
        T::property_hint()
    }

    fn property_usage() -> PropertyUsage {
        T::property_usage()
    }
}

impl<T: ToVariant + ?Sized> ToVariant for &T {
    fn to_variant(&self) -> Variant {
        (**self).to_variant()
    }
}
