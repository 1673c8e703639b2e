//! 原始 ABI 层
//!
//! - `types` - `repr(C)` 结构体与函数指针类型
//! - `interface` - 函数指针表的加载与进程级单例
//! - `hooks` - 测试插桩钩子
//!
//! 其余模块只通过这里访问引擎；外部协作方不应直接调用原始函数指针。

pub mod hooks;
pub mod interface;
pub mod types;

pub use hooks::{clear_hooks, set_hooks, ExtensionHooks};
pub use interface::{
    initialize, interface, is_initialized, try_interface, BuiltinLifecycle, EngineInterface,
    GodotVersion, RawInterface,
};
pub use types::*;
