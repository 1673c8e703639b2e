//! 整数枚举与位域
//!
//! 用户枚举通过 [`variant_enum!`](crate::variant_enum) 与位域通过
//! [`variant_bitfield!`](crate::variant_bitfield) 参与转换协议，编码为 `Int`。

/// Declares an integer-backed enum that converts to and from `Int` Variants.
///
/// ```rust,ignore
/// godot_interop::variant_enum! {
///     pub enum Difficulty {
///         Easy = 0,
///         Hard = 2,
///     }
/// }
/// ```
#[macro_export]
macro_rules! variant_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i64)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value ),*
        }

        impl $crate::convert::EngineEnum for $name {
            const ENUM_NAME: &'static str = stringify!($name);

            fn values() -> &'static [(&'static str, i64)] {
                &[$( (stringify!($variant), $value) ),*]
            }

            fn ord(&self) -> i64 {
                *self as i64
            }

            fn from_ord(ord: i64) -> Option<Self> {
                $(
                    if ord == $value {
                        return Some($name::$variant);
                    }
                )*
                None
            }
        }

        impl $crate::convert::ToVariant for $name {
            fn to_variant(&self) -> $crate::variant::Variant {
                $crate::convert::ToVariant::to_variant(
                    &<$name as $crate::convert::EngineEnum>::ord(self),
                )
            }
        }

        impl $crate::convert::FromVariant for $name {
            fn from_variant(
                variant: &$crate::variant::Variant,
            ) -> $crate::core::error::ConversionResult<Self> {
                let value = <i64 as $crate::convert::FromVariant>::from_variant(variant)?;
                <$name as $crate::convert::EngineEnum>::from_ord(value).ok_or(
                    $crate::core::error::ConversionError::InvalidEnumValue {
                        value,
                        target: stringify!($name),
                    },
                )
            }
        }

        impl $crate::convert::VariantType for $name {
            const GTYPE: $crate::variant::GType = $crate::variant::GType::Int;

            fn property_hint() -> ($crate::registry::PropertyHint, String) {
                (
                    $crate::registry::PropertyHint::Enum,
                    <$name as $crate::convert::EngineEnum>::hint_string(),
                )
            }
        }
    };
}

/// Declares a flag set backed by `u64` that converts to and from `Int` Variants.
///
/// Decoding rejects bits that no flag declares.
///
/// ```rust,ignore
/// godot_interop::variant_bitfield! {
///     pub struct Layers {
///         const GROUND = 1;
///         const WATER = 2;
///     }
/// }
/// ```
#[macro_export]
macro_rules! variant_bitfield {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* const $flag:ident = $value:literal; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name(u64);

        #[allow(dead_code)]
        impl $name {
            $( $(#[$fmeta])* pub const $flag: $name = $name($value); )*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn all() -> Self {
                $name(0 $( | $value )*)
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                $name(self.0 & rhs.0)
            }
        }

        impl $crate::convert::EngineBitfield for $name {
            const ENUM_NAME: &'static str = stringify!($name);

            fn flags() -> &'static [(&'static str, u64)] {
                &[$( (stringify!($flag), $value) ),*]
            }

            fn bits(&self) -> u64 {
                self.0
            }

            fn from_bits(bits: u64) -> Option<Self> {
                if bits & !$name::all().0 == 0 {
                    Some($name(bits))
                } else {
                    None
                }
            }
        }

        impl $crate::convert::ToVariant for $name {
            fn to_variant(&self) -> $crate::variant::Variant {
                $crate::convert::ToVariant::to_variant(&(self.0 as i64))
            }
        }

        impl $crate::convert::FromVariant for $name {
            fn from_variant(
                variant: &$crate::variant::Variant,
            ) -> $crate::core::error::ConversionResult<Self> {
                let value = <i64 as $crate::convert::FromVariant>::from_variant(variant)?;
                <$name as $crate::convert::EngineBitfield>::from_bits(value as u64).ok_or(
                    $crate::core::error::ConversionError::InvalidEnumValue {
                        value,
                        target: stringify!($name),
                    },
                )
            }
        }

        impl $crate::convert::VariantType for $name {
            const GTYPE: $crate::variant::GType = $crate::variant::GType::Int;

            fn property_hint() -> ($crate::registry::PropertyHint, String) {
                (
                    $crate::registry::PropertyHint::Flags,
                    <$name as $crate::convert::EngineBitfield>::hint_string(),
                )
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::convert::{EngineBitfield, EngineEnum};

    crate::variant_enum! {
        enum Mode {
            Idle = 0,
            Running = 3,
        }
    }

    crate::variant_bitfield! {
        struct Layers {
            const GROUND = 1;
            const WATER = 4;
        }
    }

    #[test]
    fn test_enum_ordinals() {
        assert_eq!(Mode::Running.ord(), 3);
        assert_eq!(Mode::from_ord(0), Some(Mode::Idle));
        assert_eq!(Mode::from_ord(1), None);
        assert_eq!(Mode::hint_string(), "Idle:0,Running:3");
    }

    #[test]
    fn test_bitfield_rejects_unknown_bits() {
        let both = Layers::GROUND | Layers::WATER;
        assert_eq!(both.bits(), 5);
        assert!(both.contains(Layers::WATER));
        assert_eq!(Layers::from_bits(5), Some(both));
        assert_eq!(Layers::from_bits(2), None);
        assert!(Layers::empty().is_empty());
    }
}
