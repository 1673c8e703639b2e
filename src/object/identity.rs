//! 对象身份映射
//!
//! 引擎句柄 → 宿主实例存储的进程级映射。同一个活跃句柄在任何时刻只对应一个
//! [`InstanceStorage`]；重复查找返回同一个 `Arc`。
//!
//! 句柄第一次进入宿主侧时，通过引擎查询它的类名；类名未知时退回到最近的已知祖先类，
//! 并记录 `UnknownClass` 诊断。

use super::class::FRAMEWORK_CLASSES;
use super::storage::{InstanceStorage, Owner};
use crate::builtins::StringName;
use crate::convert;
use crate::core::diagnostics::{self, DiagnosticKind};
use crate::core::error::{ConversionError, ConversionResult};
use crate::sys::{self, InstanceBindingCallbacksRaw, InstanceId, ObjectHandle, ObjectPtr};
use crate::variant::{GType, Variant};
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Live mapped objects by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityStats {
    pub framework: usize,
    pub user: usize,
}

impl IdentityStats {
    pub fn total(&self) -> usize {
        self.framework + self.user
    }
}

#[derive(Default)]
pub(crate) struct IdentityMap {
    entries: Mutex<HashMap<ObjectHandle, Arc<InstanceStorage>>>,
}

impl IdentityMap {
    fn lock(&self) -> MutexGuard<'_, HashMap<ObjectHandle, Arc<InstanceStorage>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, handle: ObjectHandle) -> Option<Arc<InstanceStorage>> {
        self.lock().get(&handle).cloned()
    }

    /// Maps `storage` unless its handle is already mapped; returns the mapped entry.
    pub(crate) fn insert(&self, storage: Arc<InstanceStorage>) -> Arc<InstanceStorage> {
        self.lock()
            .entry(storage.handle())
            .or_insert(storage)
            .clone()
    }

    pub(crate) fn remove(&self, handle: ObjectHandle) -> Option<Arc<InstanceStorage>> {
        self.lock().remove(&handle)
    }
}

pub(crate) fn identity() -> &'static IdentityMap {
    static MAP: OnceLock<IdentityMap> = OnceLock::new();
    MAP.get_or_init(IdentityMap::default)
}

static BINDING_CALLBACKS: InstanceBindingCallbacksRaw = InstanceBindingCallbacksRaw {
    create_callback: None,
    free_callback: Some(binding_free),
    reference_callback: Some(binding_reference),
};

unsafe extern "C" fn binding_free(_token: *mut c_void, instance: *mut c_void, _binding: *mut c_void) {
    if let Some(handle) = ObjectHandle::from_ptr(instance) {
        on_engine_object_destroyed(handle);
    }
}

unsafe extern "C" fn binding_reference(
    _token: *mut c_void,
    _binding: *mut c_void,
    _reference: sys::Bool,
) -> sys::Bool {
    sys::TRUE
}

/// Asks the engine to notify the bridge when `handle` is destroyed.
pub(crate) fn attach_binding(handle: ObjectHandle) {
    let interface = sys::interface();
    // SAFETY: the handle is live and the callbacks are 'static.
    unsafe {
        (interface.fns.object_set_instance_binding)(
            handle.as_ptr(),
            interface.library(),
            handle.as_ptr(),
            &BINDING_CALLBACKS,
        )
    };
}

pub(crate) fn class_tag(class_name: &str) -> *mut c_void {
    let name = StringName::from(class_name);
    // SAFETY: the name outlives the call.
    unsafe { (sys::interface().fns.classdb_get_class_tag)(name.sys()) }
}

/// Engine-side inheritance check.
pub(crate) fn object_inherits(handle: ObjectHandle, class_name: &str) -> bool {
    let tag = class_tag(class_name);
    if tag.is_null() {
        return false;
    }
    // SAFETY: the handle refers to a live object.
    let cast = unsafe { (sys::interface().fns.object_cast_to)(handle.as_ptr(), tag) };
    !cast.is_null()
}

/// Most-derived class name the engine reports for `handle`.
pub(crate) fn engine_class_name(handle: ObjectHandle) -> Option<String> {
    let interface = sys::interface();
    let mut found = sys::FALSE;
    // SAFETY: the engine writes a StringName into the fresh slot.
    let name = unsafe {
        StringName::new_with_uninit(|dst| {
            found = (interface.fns.object_get_class_name)(handle.as_ptr(), interface.library(), dst);
        })
    };
    sys::from_bool(found).then(|| name.to_string())
}

pub(crate) fn instance_id_of(handle: ObjectHandle) -> Option<InstanceId> {
    // SAFETY: the engine returns 0 for objects it does not know.
    let id = unsafe { (sys::interface().fns.object_get_instance_id)(handle.as_ptr()) };
    (id != 0).then_some(InstanceId(id))
}

pub(crate) fn handle_from_instance_id(id: InstanceId) -> Option<ObjectHandle> {
    // SAFETY: plain lookup.
    let ptr = unsafe { (sys::interface().fns.object_get_instance_from_id)(id.0) };
    ObjectHandle::from_ptr(ptr)
}

/// Object handle stored in an `Object`-typed Variant; `None` for nil or a null object.
pub(crate) fn handle_of_variant(variant: &Variant) -> ConversionResult<Option<ObjectHandle>> {
    if variant.is_nil() {
        return Ok(None);
    }
    // SAFETY: ObjectPtr is the engine layout of an Object payload.
    let ptr: ObjectPtr = unsafe { convert::type_from_variant(variant, GType::Object)? };
    Ok(ObjectHandle::from_ptr(ptr))
}

/// Returns the existing wrapper for `handle`, or builds and maps one.
pub fn lookup_or_wrap(handle: ObjectHandle) -> ConversionResult<Arc<InstanceStorage>> {
    let map = identity();
    if let Some(storage) = map.get(handle) {
        if storage.is_alive() {
            return Ok(storage);
        }
        map.remove(handle);
    }

    let instance_id = instance_id_of(handle).ok_or(ConversionError::DeadObject)?;
    let engine_class = engine_class_name(handle).ok_or(ConversionError::UnknownClass {
        handle: handle.addr(),
    })?;
    let class_name = resolve_known_class(handle, &engine_class)?;
    let is_refcounted = object_inherits(handle, "RefCounted");

    let storage = Arc::new(InstanceStorage::framework(
        Owner {
            handle,
            instance_id,
        },
        class_name.to_string(),
        engine_class.clone(),
        is_refcounted,
    ));
    let mapped = map.insert(storage.clone());
    if Arc::ptr_eq(&mapped, &storage) {
        attach_binding(handle);
        tracing::debug!(
            target: "identity",
            "Wrapped {} {} as {}",
            engine_class,
            handle,
            class_name
        );
        sys::hooks::object_inited(handle, &engine_class);
    }
    Ok(mapped)
}

fn resolve_known_class(handle: ObjectHandle, engine_class: &str) -> ConversionResult<&'static str> {
    if let Some(known) = FRAMEWORK_CLASSES.iter().find(|name| **name == engine_class) {
        return Ok(known);
    }
    let fallback = FRAMEWORK_CLASSES
        .iter()
        .copied()
        .find(|candidate| object_inherits(handle, candidate))
        .ok_or(ConversionError::UnknownClass {
            handle: handle.addr(),
        })?;
    diagnostics::report(
        DiagnosticKind::UnknownClass,
        engine_class,
        format!("no host class for {engine_class}; wrapped {handle} as {fallback}"),
    );
    Ok(fallback)
}

/// Unmaps `handle` after the engine destroyed the object. Idempotent.
pub fn on_engine_object_destroyed(handle: ObjectHandle) {
    if let Some(storage) = identity().remove(handle) {
        if storage.mark_dead() {
            tracing::debug!(target: "identity", "Unmapped {} {}", storage.class_name(), handle);
            sys::hooks::object_deinited(handle);
        }
    }
}

/// Handles currently mapped.
pub fn active_handles() -> Vec<ObjectHandle> {
    let mut handles: Vec<_> = identity().lock().keys().copied().collect();
    handles.sort();
    handles
}

/// Drops every mapping without destroying engine objects. Used on extension shutdown.
pub fn clear_handles() -> usize {
    let drained: Vec<_> = identity().lock().drain().collect();
    if let Some(interface) = sys::try_interface() {
        for (handle, _) in &drained {
            // SAFETY: the binding was attached with this library token.
            unsafe { (interface.fns.object_free_instance_binding)(handle.as_ptr(), interface.library()) };
        }
    }
    if !drained.is_empty() {
        tracing::info!(target: "identity", "Cleared {} object mappings", drained.len());
    }
    drained.len()
}

pub fn identity_stats() -> IdentityStats {
    let map = identity().lock();
    let user = map.values().filter(|storage| storage.is_user()).count();
    IdentityStats {
        framework: map.len() - user,
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(addr: usize, class_name: &str) -> Arc<InstanceStorage> {
        Arc::new(InstanceStorage::framework(
            Owner {
                handle: ObjectHandle::from_ptr(addr as sys::ConstObjectPtr).unwrap(),
                instance_id: InstanceId(addr as u64),
            },
            class_name.into(),
            class_name.into(),
            false,
        ))
    }

    #[test]
    fn test_insert_keeps_first_entry() {
        let map = IdentityMap::default();
        let first = storage(0x10, "Node");
        let second = storage(0x10, "Node");
        assert!(Arc::ptr_eq(&map.insert(first.clone()), &first));
        assert!(Arc::ptr_eq(&map.insert(second), &first));
        assert!(Arc::ptr_eq(&map.get(first.handle()).unwrap(), &first));
        assert!(map.remove(first.handle()).is_some());
        assert!(map.get(first.handle()).is_none());
    }

    #[test]
    fn test_stats_total() {
        let stats = IdentityStats {
            framework: 2,
            user: 3,
        };
        assert_eq!(stats.total(), 5);
    }
}
