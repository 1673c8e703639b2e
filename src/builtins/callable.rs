//! 可调用对象与信号
//!
//! [`Callable::from_fn`] 把宿主闭包交给引擎；引擎调用时经过与方法跳板相同的参数视图，
//! 闭包中的 panic 被拦截并报告为调用错误。

use super::{impl_opaque_builtin, BuiltinMethod, GString, StringName};
use crate::call::{self, Arguments};
use crate::convert::{ToVariant, VariantType};
use crate::core::diagnostics::{self, DiagnosticKind};
use crate::core::error::CallError;
use crate::core::utils::panic_message;
use crate::object::{GodotClass, Gd};
use crate::sys::{self, CallErrorRaw, CallableCustomInfoRaw, ConstTypePtr, ConstVariantPtr, InstanceId, ObjectPtr, TypePtr, VariantPtr};
use crate::variant::{GType, Variant};
use std::collections::hash_map::DefaultHasher;
use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

#[repr(transparent)]
pub struct Callable {
    opaque: [u64; 2],
}

#[repr(transparent)]
pub struct Signal {
    opaque: [u64; 2],
}

impl_opaque_builtin!(Callable, GType::Callable);
impl_opaque_builtin!(Signal, GType::Signal);

static CALLABLE_IS_NULL: BuiltinMethod = BuiltinMethod::new(GType::Callable, "is_null", 3918633141);
static CALLABLE_GET_METHOD: BuiltinMethod =
    BuiltinMethod::new(GType::Callable, "get_method", 1825232092);
static CALLABLE_GET_OBJECT_ID: BuiltinMethod =
    BuiltinMethod::new(GType::Callable, "get_object_id", 3173160232);
static SIGNAL_GET_NAME: BuiltinMethod = BuiltinMethod::new(GType::Signal, "get_name", 1825232092);
static SIGNAL_GET_OBJECT_ID: BuiltinMethod =
    BuiltinMethod::new(GType::Signal, "get_object_id", 3173160232);

type HostFunction = dyn Fn(&Arguments) -> Option<Variant> + Send + Sync;

struct HostCallable {
    name: String,
    function: Box<HostFunction>,
}

/// `(Object, StringName)` constructor shared by Callable and Signal.
fn object_member_ctor(gtype: GType) -> sys::PtrConstructor {
    static CALLABLE: OnceLock<Option<sys::PtrConstructor>> = OnceLock::new();
    static SIGNAL: OnceLock<Option<sys::PtrConstructor>> = OnceLock::new();
    let cell = if gtype == GType::Signal { &SIGNAL } else { &CALLABLE };
    let ctor = cell.get_or_init(|| unsafe {
        (sys::interface().fns.variant_get_ptr_constructor)(gtype.to_sys(), 2)
    });
    match ctor {
        Some(ctor) => *ctor,
        None => panic!("engine provides no (Object, StringName) constructor for {gtype}"),
    }
}

unsafe fn construct_object_member(gtype: GType, object: ObjectPtr, member: &str, dst: TypePtr) {
    let name = StringName::from(member);
    let args: [ConstTypePtr; 2] = [&object as *const ObjectPtr as ConstTypePtr, name.sys()];
    (object_member_ctor(gtype))(dst, args.as_ptr());
}

impl Callable {
    /// Empty callable.
    pub fn invalid() -> Self {
        Self::engine_default()
    }

    /// Wraps a host closure; `None` results read as nil.
    ///
    /// The engine owns the closure from here on and frees it with the last copy.
    pub fn from_fn<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Arguments) -> Option<Variant> + Send + Sync + 'static,
    {
        let userdata = Box::new(HostCallable {
            name: name.into(),
            function: Box::new(function),
        });
        let mut info = CallableCustomInfoRaw {
            callable_userdata: Box::into_raw(userdata) as *mut c_void,
            token: sys::interface().library(),
            object_id: 0,
            call_func: Some(host_callable_call),
            is_valid_func: None,
            free_func: Some(host_callable_free),
            hash_func: Some(host_callable_hash),
            equal_func: None,
            less_than_func: None,
            to_string_func: Some(host_callable_to_string),
        };
        unsafe {
            Self::new_with_uninit(|dst| (sys::interface().fns.callable_custom_create)(dst, &mut info))
        }
    }

    /// Bound method `method` of `object`.
    pub fn from_object_method<T: GodotClass>(object: &Gd<T>, method: &str) -> Self {
        let ptr = object.handle().as_ptr();
        unsafe { Self::new_with_uninit(|dst| construct_object_member(GType::Callable, ptr, method, dst)) }
    }

    pub fn is_null(&self) -> bool {
        CALLABLE_IS_NULL.call_bool(self.sys())
    }

    pub fn method_name(&self) -> String {
        let name = unsafe {
            StringName::new_with_uninit(|dst| CALLABLE_GET_METHOD.call(self.sys() as TypePtr, &[], dst))
        };
        name.to_string()
    }

    /// Target object of a bound method; `None` for custom callables.
    pub fn object_id(&self) -> Option<InstanceId> {
        let id = CALLABLE_GET_OBJECT_ID.call_int(self.sys());
        (id != 0).then_some(InstanceId(id as u64))
    }

    pub fn call(&self, args: &[Variant]) -> Result<Variant, CallError> {
        let mut target = self.to_variant();
        target.call("call", args)
    }
}

impl Signal {
    pub fn new<T: GodotClass>(object: &Gd<T>, name: &str) -> Self {
        let ptr = object.handle().as_ptr();
        unsafe { Self::new_with_uninit(|dst| construct_object_member(GType::Signal, ptr, name, dst)) }
    }

    pub fn name(&self) -> String {
        let name = unsafe {
            StringName::new_with_uninit(|dst| SIGNAL_GET_NAME.call(self.sys() as TypePtr, &[], dst))
        };
        name.to_string()
    }

    pub fn object_id(&self) -> Option<InstanceId> {
        let id = SIGNAL_GET_OBJECT_ID.call_int(self.sys());
        (id != 0).then_some(InstanceId(id as u64))
    }

    pub fn emit(&self, args: &[Variant]) -> Result<(), CallError> {
        let mut target = self.to_variant();
        target.call("emit", args).map(|_| ())
    }
}

impl VariantType for Callable {
    const GTYPE: GType = GType::Callable;
}

impl VariantType for Signal {
    const GTYPE: GType = GType::Signal;
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.to_variant())
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({})", self.name())
    }
}

unsafe extern "C" fn host_callable_call(
    userdata: *mut c_void,
    args: *const ConstVariantPtr,
    count: i64,
    r_return: VariantPtr,
    r_error: *mut CallErrorRaw,
) {
    let callable = &*(userdata as *const HostCallable);
    let arguments = Arguments::from_engine(args, count);
    match catch_unwind(AssertUnwindSafe(|| (callable.function)(&arguments))) {
        Ok(result) => {
            result.unwrap_or_default().move_into_sys(r_return);
            call::write_call_error(r_error, None);
        }
        Err(payload) => {
            diagnostics::report(
                DiagnosticKind::CallbackPanic,
                callable.name.clone(),
                panic_message(payload.as_ref()),
            );
            let err = CallError::InvalidMethod {
                method: callable.name.clone(),
            };
            call::write_call_error(r_error, Some(&err));
        }
    }
}

unsafe extern "C" fn host_callable_free(userdata: *mut c_void) {
    drop(Box::from_raw(userdata as *mut HostCallable));
}

unsafe extern "C" fn host_callable_hash(userdata: *mut c_void) -> u32 {
    let callable = &*(userdata as *const HostCallable);
    let mut hasher = DefaultHasher::new();
    callable.name.hash(&mut hasher);
    hasher.finish() as u32
}

unsafe extern "C" fn host_callable_to_string(
    userdata: *mut c_void,
    r_is_valid: *mut sys::Bool,
    r_out: sys::StringPtr,
) {
    let callable = &*(userdata as *const HostCallable);
    *(r_out as *mut GString) = GString::from(callable.name.as_str());
    *r_is_valid = sys::TRUE;
}
