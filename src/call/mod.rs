//! 调用约定
//!
//! - `arguments` - 方法跳板的参数视图
//! - `marshal` - 调用错误码与宿主错误类型的互转

mod arguments;
mod marshal;

pub use arguments::Arguments;
pub(crate) use marshal::{variant_ptrs, write_call_error};
