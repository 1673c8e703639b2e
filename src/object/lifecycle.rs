//! 对象生命周期
//!
//! - 宿主类实例的创建、释放与 `to_string` 回调（由引擎调用）
//! - `RefCounted` 引用计数：引擎侧计数是唯一的真实来源，宿主侧不另设计数
//! - 延迟释放队列：启用后 `Gd` 析构时的 unreference 被排队，由 [`release_pending_objects`] 统一执行

use super::identity::{self, attach_binding};
use super::storage::{InstanceStorage, Owner};
use super::UserClass;
use crate::builtins::{GString, StringName};
use crate::core::diagnostics::{self, DiagnosticKind};
use crate::core::utils::panic_message;
use crate::sys::{self, ClassInstancePtr, ConstTypePtr, ObjectHandle, ObjectPtr, TypePtr};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

struct RefCountedBinds {
    init_ref: usize,
    reference: usize,
    unreference: usize,
    get_reference_count: usize,
}

fn binds() -> &'static RefCountedBinds {
    static BINDS: OnceLock<RefCountedBinds> = OnceLock::new();
    BINDS.get_or_init(|| {
        let class_name = StringName::from("RefCounted");
        let lookup = |method: &str, hash: i64| {
            let method_name = StringName::from(method);
            // SAFETY: both names outlive the lookup.
            let bind = unsafe {
                (sys::interface().fns.classdb_get_method_bind)(class_name.sys(), method_name.sys(), hash)
            };
            if bind.is_null() {
                panic!("engine provides no RefCounted.{method} (hash {hash})");
            }
            bind as usize
        };
        RefCountedBinds {
            init_ref: lookup("init_ref", 2240911060),
            reference: lookup("reference", 2240911060),
            unreference: lookup("unreference", 2240911060),
            get_reference_count: lookup("get_reference_count", 3905245786),
        }
    })
}

/// # Safety
/// `ret` must match the bound method's return type.
unsafe fn ptrcall(bind: usize, handle: ObjectHandle, ret: TypePtr) {
    let args: [ConstTypePtr; 0] = [];
    (sys::interface().fns.object_method_bind_ptrcall)(
        bind as sys::MethodBindPtr,
        handle.as_ptr(),
        args.as_ptr(),
        ret,
    );
}

fn ptrcall_bool(bind: usize, handle: ObjectHandle) -> bool {
    let mut out = sys::FALSE;
    // SAFETY: the RefCounted lifecycle methods return bool.
    unsafe { ptrcall(bind, handle, &mut out as *mut sys::Bool as TypePtr) };
    sys::from_bool(out)
}

/// Takes the initial reference of a freshly constructed ref-counted object.
pub(crate) fn init_ref(handle: ObjectHandle) -> bool {
    ptrcall_bool(binds().init_ref, handle)
}

pub(crate) fn reference(handle: ObjectHandle) -> bool {
    ptrcall_bool(binds().reference, handle)
}

/// Returns `true` when the count reached zero and the caller must destroy the object.
pub(crate) fn unreference(handle: ObjectHandle) -> bool {
    ptrcall_bool(binds().unreference, handle)
}

pub(crate) fn reference_count(handle: ObjectHandle) -> i64 {
    let mut out: i64 = 0;
    // SAFETY: get_reference_count returns int.
    unsafe { ptrcall(binds().get_reference_count, handle, &mut out as *mut i64 as TypePtr) };
    out
}

pub(crate) fn destroy(handle: ObjectHandle) {
    // SAFETY: the caller owns the last reference or the object is not ref-counted.
    unsafe { (sys::interface().fns.object_destroy)(handle.as_ptr()) };
}

static DEFER_RELEASE: AtomicBool = AtomicBool::new(false);
static PENDING: Mutex<Vec<ObjectHandle>> = Mutex::new(Vec::new());

/// Queues reference releases instead of running them at `Gd` drop time.
pub fn set_deferred_release(deferred: bool) {
    DEFER_RELEASE.store(deferred, Ordering::Release);
}

pub fn is_deferred_release() -> bool {
    DEFER_RELEASE.load(Ordering::Acquire)
}

/// Releases one host-held reference, now or through the pending queue.
pub(crate) fn release_reference(handle: ObjectHandle) {
    if is_deferred_release() {
        PENDING
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    } else {
        release_now(handle);
    }
}

fn release_now(handle: ObjectHandle) {
    if unreference(handle) {
        tracing::trace!(target: "identity", "Last reference to {} released", handle);
        destroy(handle);
    }
}

/// Runs every queued release; returns how many were processed.
pub fn release_pending_objects() -> usize {
    let pending = std::mem::take(&mut *PENDING.lock().unwrap_or_else(PoisonError::into_inner));
    for handle in &pending {
        release_now(*handle);
    }
    pending.len()
}

pub fn pending_release_count() -> usize {
    PENDING.lock().unwrap_or_else(PoisonError::into_inner).len()
}

/// Builds the native base, runs `T::init` and binds the host instance to the object.
pub(crate) fn construct_user<T: UserClass>() -> Option<ObjectHandle> {
    let base = StringName::from(T::native_class_name());
    // SAFETY: the name outlives the call.
    let ptr = unsafe { (sys::interface().fns.classdb_construct_object2)(base.sys()) };
    let handle = ObjectHandle::from_ptr(ptr)?;
    let owner = Owner {
        handle,
        instance_id: identity::instance_id_of(handle)?,
    };

    let instance = match catch_unwind(AssertUnwindSafe(|| T::init(owner))) {
        Ok(instance) => instance,
        Err(payload) => {
            diagnostics::report(
                DiagnosticKind::CallbackPanic,
                T::CLASS_NAME,
                format!("init panicked: {}", panic_message(payload.as_ref())),
            );
            destroy(handle);
            return None;
        }
    };

    let storage = Arc::new(InstanceStorage::user(owner, T::CLASS_NAME, T::IS_REFCOUNTED, instance));
    identity::identity().insert(storage.clone());
    let class_name = StringName::from(T::CLASS_NAME);
    // SAFETY: the engine keeps the raw Arc until free_instance hands it back.
    unsafe {
        (sys::interface().fns.object_set_instance)(
            ptr,
            class_name.sys(),
            Arc::into_raw(storage) as ClassInstancePtr,
        )
    };
    attach_binding(handle);
    tracing::debug!(target: "identity", "Created {} {}", T::CLASS_NAME, handle);
    sys::hooks::object_inited(handle, T::CLASS_NAME);
    Some(handle)
}

pub(crate) unsafe extern "C" fn create_instance<T: UserClass>(_class_userdata: *mut c_void) -> ObjectPtr {
    match catch_unwind(construct_user::<T>) {
        Ok(Some(handle)) => handle.as_ptr(),
        Ok(None) => std::ptr::null_mut(),
        Err(payload) => {
            diagnostics::report(
                DiagnosticKind::CallbackPanic,
                T::CLASS_NAME,
                panic_message(payload.as_ref()),
            );
            std::ptr::null_mut()
        }
    }
}

pub(crate) unsafe extern "C" fn free_instance(_class_userdata: *mut c_void, instance: ClassInstancePtr) {
    if instance.is_null() {
        return;
    }
    let storage = Arc::from_raw(instance as *const InstanceStorage);
    let handle = storage.handle();
    identity::on_engine_object_destroyed(handle);
    // Already unmapped by clear_handles.
    if storage.mark_dead() {
        sys::hooks::object_deinited(handle);
    }
}

pub(crate) unsafe extern "C" fn instance_to_string<T: UserClass>(
    instance: ClassInstancePtr,
    r_is_valid: *mut sys::Bool,
    p_out: sys::StringPtr,
) {
    if instance.is_null() {
        return;
    }
    let storage = &*(instance as *const InstanceStorage);
    let text = catch_unwind(AssertUnwindSafe(|| storage.read::<T>().and_then(|user| user.to_string())));
    match text {
        Ok(Some(text)) => {
            *(p_out as *mut GString) = GString::from(text.as_str());
            *r_is_valid = sys::TRUE;
        }
        Ok(None) => *r_is_valid = sys::FALSE,
        Err(payload) => {
            diagnostics::report(
                DiagnosticKind::CallbackPanic,
                format!("{}.to_string", T::CLASS_NAME),
                panic_message(payload.as_ref()),
            );
            *r_is_valid = sys::FALSE;
        }
    }
}
