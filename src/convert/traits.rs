use crate::core::error::{ConversionError, ConversionResult};
use crate::registry::{PropertyHint, PropertyUsage};
use crate::sys::{self, TypePtr, VariantPtr};
use crate::variant::{GType, Variant};
use std::mem::MaybeUninit;

/// Host value with a canonical Variant encoding. Never fails.
pub trait ToVariant {
    fn to_variant(&self) -> Variant;
}

/// Host value that can be extracted from a Variant.
///
/// Fails with [`ConversionError::UnexpectedNil`] for nil into a non-nullable slot and with
/// [`ConversionError::TypeMismatch`] (or a class error) when the tag does not match.
pub trait FromVariant: Sized {
    fn from_variant(variant: &Variant) -> ConversionResult<Self>;
}

/// Static type description used for registration descriptors.
pub trait VariantType {
    /// Engine type tag the value is stored as; `Nil` means "any Variant".
    const GTYPE: GType;

    /// Engine class for object references and typed containers.
    fn class_name() -> Option<String> {
        None
    }

    fn property_hint() -> (PropertyHint, String) {
        (PropertyHint::None, String::new())
    }

    fn property_usage() -> PropertyUsage {
        if Self::GTYPE == GType::Nil {
            PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT
        } else {
            PropertyUsage::DEFAULT
        }
    }
}

/// Integer-backed enumeration exported as an engine enum.
pub trait EngineEnum: Copy + Sized + 'static {
    const ENUM_NAME: &'static str;

    fn values() -> &'static [(&'static str, i64)];

    fn ord(&self) -> i64;

    fn from_ord(ord: i64) -> Option<Self>;

    /// `Name:value,...` hint string.
    fn hint_string() -> String {
        Self::values()
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Integer-backed flag set exported as an engine bit field.
pub trait EngineBitfield: Copy + Sized + 'static {
    const ENUM_NAME: &'static str;

    fn flags() -> &'static [(&'static str, u64)];

    fn bits(&self) -> u64;

    /// `None` when `bits` contains undeclared flags.
    fn from_bits(bits: u64) -> Option<Self>;

    fn hint_string() -> String {
        Self::flags()
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Fails unless `variant` carries `expected`.
pub(crate) fn expect_type(variant: &Variant, expected: GType) -> ConversionResult<()> {
    let found = variant.gtype();
    if found == expected {
        Ok(())
    } else {
        Err(ConversionError::mismatch(expected, found))
    }
}

/// Builds a Variant from a builtin value through the engine's from-type constructor.
///
/// # Safety
/// `value` must point to a valid instance of the builtin type `gtype`.
pub(crate) unsafe fn variant_from_type_ptr(gtype: GType, value: TypePtr) -> Variant {
    let ctor = match sys::interface().builtin(gtype).from_type {
        Some(ctor) => ctor,
        None => panic!("engine provides no Variant constructor for {gtype}"),
    };
    Variant::new_with_uninit(|dst| ctor(dst, value))
}

/// Extracts a builtin value through the engine's to-type constructor after a tag check.
///
/// # Safety
/// `T` must have the engine layout of `gtype`.
pub(crate) unsafe fn type_from_variant<T>(variant: &Variant, gtype: GType) -> ConversionResult<T> {
    expect_type(variant, gtype)?;
    let ctor = match sys::interface().builtin(gtype).to_type {
        Some(ctor) => ctor,
        None => panic!("engine provides no {gtype} constructor from Variant"),
    };
    let mut out = MaybeUninit::<T>::uninit();
    ctor(out.as_mut_ptr() as TypePtr, variant.sys() as VariantPtr);
    Ok(out.assume_init())
}
