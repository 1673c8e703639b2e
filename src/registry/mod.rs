//! 类注册
//!
//! - `prop_info` - 属性、方法、信号描述符与引擎枚举值
//! - `method` - 类型化方法到引擎调用约定的跳板
//! - `class_info` - 每个宿主类的注册表
//! - `init` - 一次性注册、重复类名检测、逆序注销
//! - `entry` - 扩展入口与初始化级别

mod class_info;
mod entry;
mod init;
mod method;
mod prop_info;

pub use class_info::ClassInfo;
pub use entry::{extension_entry, ClassRegistrar, ExtensionLibrary, InitializationLevel};
pub use init::{
    class_record, configure, ensure_registered, registered_classes, unregister_classes, ClassRecord,
};
pub use method::{ByMut, ByRef, ErasedMethod, MethodEntry, MethodSignature};
pub use prop_info::{MethodFlags, PropInfo, PropertyHint, PropertyUsage, SignalInfo};
