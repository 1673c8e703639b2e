//! 对象身份与生命周期桥
//!
//! - `class` - [`GodotClass`] / [`UserClass`] 及框架类
//! - `storage` - 每个已映射对象的实例存储
//! - `identity` - 句柄 → 实例的身份映射
//! - `gd` - 对象句柄 [`Gd<T>`]
//! - `lifecycle` - 创建、释放回调与引用计数
//!
//! 状态机：未映射 →（首次跨边界出现）→ 已映射且存活 →（引擎销毁通知或引用计数归零）→ 未映射。

mod class;
mod gd;
mod identity;
mod lifecycle;
mod storage;

pub use class::{GodotClass, Node, Node2D, Object, RefCounted, Resource, UserClass};
pub use gd::{Gd, RefMode};
pub use identity::{
    active_handles, clear_handles, identity_stats, lookup_or_wrap, on_engine_object_destroyed,
    IdentityStats,
};
pub use lifecycle::{
    is_deferred_release, pending_release_count, release_pending_objects, set_deferred_release,
};
pub use storage::{InstanceStorage, Owner};

pub(crate) use lifecycle::{create_instance, free_instance, instance_to_string};

use crate::variant::Variant;

/// Whether `variant` holds an object inheriting `class_name`.
pub(crate) fn variant_inherits(variant: &Variant, class_name: &str) -> bool {
    match identity::handle_of_variant(variant) {
        Ok(Some(handle)) => identity::object_inherits(handle, class_name),
        _ => false,
    }
}

/// Engine class of the object in `variant`.
pub(crate) fn variant_class_name(variant: &Variant) -> Option<String> {
    match identity::handle_of_variant(variant) {
        Ok(Some(handle)) => identity::engine_class_name(handle),
        _ => None,
    }
}

/// Host instance behind an engine class-instance pointer.
///
/// # Safety
/// `instance` must be a pointer this crate handed to `object_set_instance`, still owned by the engine.
pub(crate) unsafe fn storage_from_instance<'a>(instance: crate::sys::ClassInstancePtr) -> Option<&'a InstanceStorage> {
    (instance as *const InstanceStorage).as_ref()
}
