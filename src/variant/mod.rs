//! Variant 表示层
//!
//! - [`Variant`] - 拥有所有权、复制安全的标签值
//! - [`FastVariant`] - 只能移动的快速值，借用形式仅限作用域回调
//! - [`GType`] - 与 ABI 一致的类型标签

mod content;
mod fast;
mod gtype;
mod ops;
mod value;

pub use content::{VariantContent, VARIANT_SIZE, VARIANT_WORDS};
pub use fast::FastVariant;
pub(crate) use fast::with_borrowed;
pub use gtype::{GType, GTYPE_COUNT};
pub use ops::VariantOperator;
pub use value::Variant;
