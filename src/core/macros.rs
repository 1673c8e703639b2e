//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use godot_interop::impl_default;
///
/// struct MyStruct {
///     field1: u32,
///     field2: String,
/// }
///
/// impl_default!(MyStruct {
///     field1: 0,
///     field2: String::new(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

/// 为结构体实现ToVariant/FromVariant，字段作为字典条目
///
/// 用户自定义值类型通过这个宏参与转换协议，编码为以字段名为键的 `Dictionary`。
///
/// 使用示例:
/// ```rust,ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Stats {
///     hp: i64,
///     name: String,
/// }
///
/// godot_interop::variant_struct!(Stats { hp, name });
/// ```
#[macro_export]
macro_rules! variant_struct {
    ($struct_name:ident { $($field:ident),* $(,)? }) => {
        impl $crate::convert::ToVariant for $struct_name {
            fn to_variant(&self) -> $crate::variant::Variant {
                let mut dict = $crate::builtins::Dictionary::new();
                $(
                    dict.insert(stringify!($field), &self.$field);
                )*
                $crate::convert::ToVariant::to_variant(&dict)
            }
        }

        impl $crate::convert::FromVariant for $struct_name {
            fn from_variant(
                variant: &$crate::variant::Variant,
            ) -> $crate::core::error::ConversionResult<Self> {
                let dict = <$crate::builtins::Dictionary as $crate::convert::FromVariant>::from_variant(variant)?;
                Ok(Self {
                    $(
                        $field: dict.get_as(stringify!($field))?,
                    )*
                })
            }
        }

        impl $crate::convert::VariantType for $struct_name {
            const GTYPE: $crate::variant::GType = $crate::variant::GType::Dictionary;
        }
    };
}

#[cfg(test)]
mod tests {
    struct TestStruct {
        field1: u32,
        field2: String,
    }

    impl_default!(TestStruct {
        field1: 0,
        field2: String::new(),
    });

    #[test]
    fn test_impl_default() {
        let s = TestStruct::default();
        assert_eq!(s.field1, 0);
        assert_eq!(s.field2, "");
    }
}
