//! 值转换协议
//!
//! 每个可跨边界传递的宿主类型都实现 [`ToVariant`]（不会失败）和 [`FromVariant`]（带类型检查）。
//! [`VariantType`] 提供注册描述符需要的静态类型信息。
//!
//! - `primitives` - 布尔、整数、浮点、字符串、`Option<T>`
//! - `enums` - 枚举与位域宏
//! - 内建类型与对象引用的实现分别位于 `builtins` 和 `object` 模块

mod enums;
mod primitives;
mod traits;

pub use traits::{EngineBitfield, EngineEnum, FromVariant, ToVariant, VariantType};
pub(crate) use traits::{expect_type, type_from_variant, variant_from_type_ptr};
