//! 方法跳板
//!
//! 每个注册的方法在注册时被擦除为统一的 [`MethodEntry`]：引擎调用时先校验实例与参数个数，
//! 再通过参数视图提取类型化参数、调用宿主方法、检查返回值类型。
//! 跳板中的错误和 panic 只会变成诊断与调用错误码，永远不会展开到引擎里。
//!
//! 类型化方法通过 [`MethodSignature`] 接入，支持 0 到 6 个参数，`&self` 与 `&mut self` 两种接收者。

use super::prop_info::{MethodFlags, PropInfo};
use crate::call::{self, Arguments};
use crate::convert::{self, FromVariant, ToVariant, VariantType};
use crate::core::diagnostics::{self, DiagnosticKind};
use crate::core::error::{CallError, CallResult};
use crate::core::utils::panic_message;
use crate::object::{self, InstanceStorage, UserClass};
use crate::sys::{self, CallErrorRaw, ClassInstancePtr, ConstTypePtr, ConstVariantPtr, ObjectPtr, TypePtr, VariantPtr};
use crate::variant::{FastVariant, GType, Variant};
use std::any::TypeId;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Type-erased method body: receives the instance and the argument list.
pub type ErasedMethod =
    dyn Fn(&InstanceStorage, &Arguments) -> CallResult<Option<FastVariant>> + Send + Sync;

/// Receiver marker for `&self` methods.
pub struct ByRef;
/// Receiver marker for `&mut self` methods.
pub struct ByMut;

/// Host function usable as a method of `T`.
///
/// Implemented for `Fn(&T, A0, ..) -> R` and `Fn(&mut T, A0, ..) -> R` where every argument
/// implements [`FromVariant`] and the return type implements [`ToVariant`]. A type without a
/// conversion mapping does not satisfy the bound, so the registration does not compile.
pub trait MethodSignature<T, Marker>: Send + Sync + Sized + 'static {
    const FLAGS: MethodFlags;

    fn argument_infos() -> Vec<PropInfo>;

    fn return_info() -> Option<PropInfo>;

    fn into_erased(self, class_name: &'static str, method: String) -> Box<ErasedMethod>;
}

/// `None` for methods returning `()`.
fn return_info_of<R: VariantType + 'static>() -> Option<PropInfo> {
    (TypeId::of::<R>() != TypeId::of::<()>()).then(|| PropInfo::new::<R>(""))
}

/// Typed extraction of argument `index`; failures become an argument diagnostic.
fn extract<A: FromVariant + VariantType>(
    args: &Arguments,
    index: usize,
    class_name: &str,
    method: &str,
) -> CallResult<A> {
    args.argument::<A>(index).map_err(|err| {
        diagnostics::report(
            DiagnosticKind::ArgumentError,
            format!("{class_name}.{method}"),
            err.to_string(),
        );
        CallError::InvalidArgument {
            method: method.to_string(),
            index,
            expected: A::GTYPE,
        }
    })
}

fn missing_instance(method: &str) -> CallError {
    CallError::InstanceIsNull {
        method: method.to_string(),
    }
}

macro_rules! impl_method_signature {
    ($( $arg:ident $var:ident $index:tt ),*) => {
        impl<T, F, R, $($arg,)*> MethodSignature<T, (ByRef, R, $($arg,)*)> for F
        where
            T: UserClass,
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            R: ToVariant + VariantType + 'static,
            $( $arg: FromVariant + VariantType + 'static, )*
        {
            const FLAGS: MethodFlags = MethodFlags::DEFAULT_CONST;

            fn argument_infos() -> Vec<PropInfo> {
                vec![$( PropInfo::new::<$arg>(stringify!($var)) ),*]
            }

            fn return_info() -> Option<PropInfo> {
                return_info_of::<R>()
            }

            #[allow(unused_variables)]
            fn into_erased(self, class_name: &'static str, method: String) -> Box<ErasedMethod> {
                Box::new(move |storage: &InstanceStorage, args: &Arguments| {
                    $( let $var = extract::<$arg>(args, $index, class_name, &method)?; )*
                    let instance = storage.read::<T>().ok_or_else(|| missing_instance(&method))?;
                    let result = (self)(&*instance, $($var),*);
                    drop(instance);
                    Ok(result.to_variant().into_fast())
                })
            }
        }

        impl<T, F, R, $($arg,)*> MethodSignature<T, (ByMut, R, $($arg,)*)> for F
        where
            T: UserClass,
            F: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            R: ToVariant + VariantType + 'static,
            $( $arg: FromVariant + VariantType + 'static, )*
        {
            const FLAGS: MethodFlags = MethodFlags::DEFAULT;

            fn argument_infos() -> Vec<PropInfo> {
                vec![$( PropInfo::new::<$arg>(stringify!($var)) ),*]
            }

            fn return_info() -> Option<PropInfo> {
                return_info_of::<R>()
            }

            #[allow(unused_variables)]
            fn into_erased(self, class_name: &'static str, method: String) -> Box<ErasedMethod> {
                Box::new(move |storage: &InstanceStorage, args: &Arguments| {
                    $( let $var = extract::<$arg>(args, $index, class_name, &method)?; )*
                    let mut instance = storage.write::<T>().ok_or_else(|| missing_instance(&method))?;
                    let result = (self)(&mut *instance, $($var),*);
                    drop(instance);
                    Ok(result.to_variant().into_fast())
                })
            }
        }
    };
}

impl_method_signature!();
impl_method_signature!(A0 arg0 0);
impl_method_signature!(A0 arg0 0, A1 arg1 1);
impl_method_signature!(A0 arg0 0, A1 arg1 1, A2 arg2 2);
impl_method_signature!(A0 arg0 0, A1 arg1 1, A2 arg2 2, A3 arg3 3);
impl_method_signature!(A0 arg0 0, A1 arg1 1, A2 arg2 2, A3 arg3 3, A4 arg4 4);
impl_method_signature!(A0 arg0 0, A1 arg1 1, A2 arg2 2, A3 arg3 3, A4 arg4 4, A5 arg5 5);

/// One registered method: descriptors plus the erased body.
pub struct MethodEntry {
    pub(crate) class_name: &'static str,
    pub(crate) name: String,
    pub(crate) arguments: Vec<PropInfo>,
    pub(crate) return_info: Option<PropInfo>,
    pub(crate) flags: MethodFlags,
    pub(crate) invoke: Box<ErasedMethod>,
}

impl MethodEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[PropInfo] {
        &self.arguments
    }

    pub fn return_info(&self) -> Option<&PropInfo> {
        self.return_info.as_ref()
    }

    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    fn source(&self) -> String {
        format!("{}.{}", self.class_name, self.name)
    }

    /// Validates and runs the method. Never unwinds.
    pub(crate) fn dispatch(
        &self,
        storage: Option<&InstanceStorage>,
        args: &Arguments,
    ) -> CallResult<Option<FastVariant>> {
        let storage = match storage {
            Some(storage) if storage.is_alive() => storage,
            _ => return Err(missing_instance(&self.name)),
        };

        let expected = self.arguments.len();
        if args.count() < expected {
            return Err(CallError::TooFewArguments {
                method: self.name.clone(),
                expected,
            });
        }
        if args.count() > expected {
            return Err(CallError::TooManyArguments {
                method: self.name.clone(),
                expected,
            });
        }

        let result = match catch_unwind(AssertUnwindSafe(|| (self.invoke)(storage, args))) {
            Ok(result) => result?,
            Err(payload) => {
                diagnostics::report(
                    DiagnosticKind::CallbackPanic,
                    self.source(),
                    panic_message(payload.as_ref()),
                );
                return Err(CallError::InvalidMethod {
                    method: self.name.clone(),
                });
            }
        };

        match &self.return_info {
            Some(declared) => {
                let found = result.as_ref().map_or(GType::Nil, FastVariant::gtype);
                if !declared.accepts(found) {
                    diagnostics::report(
                        DiagnosticKind::ReturnTypeMismatch,
                        self.source(),
                        format!("declared {}, returned {}", declared.gtype, found),
                    );
                    return Err(CallError::InvalidMethod {
                        method: self.name.clone(),
                    });
                }
                Ok(result)
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.source())
            .field("arguments", &self.arguments.len())
            .field("returns", &self.return_info.as_ref().map(|info| info.gtype))
            .finish()
    }
}

/// Engine entry for Variant calls of a registered method.
pub(crate) unsafe extern "C" fn method_call(
    method_userdata: *mut c_void,
    instance: ClassInstancePtr,
    args: *const ConstVariantPtr,
    count: sys::Int,
    r_return: VariantPtr,
    r_error: *mut CallErrorRaw,
) {
    let entry = &*(method_userdata as *const MethodEntry);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let storage = object::storage_from_instance(instance);
        let arguments = Arguments::from_engine(args, count);
        entry.dispatch(storage, &arguments)
    }));
    match outcome {
        Ok(Ok(value)) => {
            if let Some(value) = value {
                value.into_variant().move_into_sys(r_return);
            }
            call::write_call_error(r_error, None);
        }
        Ok(Err(err)) => {
            tracing::debug!(target: "trampoline", "{} failed: {}", entry.source(), err);
            call::write_call_error(r_error, Some(&err));
        }
        Err(_) => call::write_call_error(
            r_error,
            Some(&CallError::InvalidMethod {
                method: entry.name.clone(),
            }),
        ),
    }
}

/// Engine entry for pointer calls: arguments and return value use the builtin layouts.
pub(crate) unsafe extern "C" fn method_ptrcall(
    method_userdata: *mut c_void,
    instance: ClassInstancePtr,
    args: *const ConstTypePtr,
    r_ret: TypePtr,
) {
    let entry = &*(method_userdata as *const MethodEntry);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let values: Vec<Option<Variant>> = entry
            .arguments
            .iter()
            .enumerate()
            .map(|(index, info)| {
                let value = variant_from_ptr(info.gtype, *args.add(index));
                (!value.is_nil()).then_some(value)
            })
            .collect();
        let arguments = Arguments::from_values(values);
        entry.dispatch(object::storage_from_instance(instance), &arguments)
    }));
    match outcome {
        Ok(Ok(Some(value))) => {
            if let Some(declared) = &entry.return_info {
                write_return_ptr(declared.gtype, value.into_variant(), r_ret);
            }
        }
        Ok(Ok(None)) => {}
        Ok(Err(err)) => tracing::debug!(target: "trampoline", "{} failed: {}", entry.source(), err),
        Err(_) => {}
    }
}

/// # Safety
/// `ptr` must point to a valid value of `gtype` (a Variant when `gtype` is nil).
unsafe fn variant_from_ptr(gtype: GType, ptr: ConstTypePtr) -> Variant {
    match gtype {
        GType::Nil => Variant::new_copy_from_sys(ptr),
        GType::Object if (*(ptr as *const ObjectPtr)).is_null() => Variant::nil(),
        gtype => convert::variant_from_type_ptr(gtype, ptr as TypePtr),
    }
}

/// # Safety
/// `r_ret` must point to initialized storage of `gtype` (a Variant when `gtype` is nil).
unsafe fn write_return_ptr(gtype: GType, value: Variant, r_ret: TypePtr) {
    if gtype == GType::Nil {
        *(r_ret as *mut Variant) = value;
        return;
    }
    let lifecycle = sys::interface().builtin(gtype);
    if !gtype.is_trivially_destructible() && gtype != GType::Object {
        if let Some(dtor) = lifecycle.destructor {
            dtor(r_ret);
        }
    }
    if let Some(ctor) = lifecycle.to_type {
        ctor(r_ret, value.sys() as VariantPtr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Node, Owner};

    struct Probe;
    crate::user_class!(Probe: Node, name = "MethodProbe");

    impl UserClass for Probe {
        fn init(_owner: Owner) -> Self {
            Probe
        }
    }

    fn signature<M, F: MethodSignature<Probe, M>>(_f: &F) -> (Vec<PropInfo>, Option<PropInfo>) {
        (F::argument_infos(), F::return_info())
    }

    #[test]
    fn test_descriptors_follow_signature() {
        let (args, ret) = signature(&|_: &Probe, a: i64, b: String| -> bool { a > 0 && !b.is_empty() });
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].gtype, GType::Int);
        assert_eq!(args[0].name, "arg0");
        assert_eq!(args[1].gtype, GType::String);
        assert_eq!(ret.map(|info| info.gtype), Some(GType::Bool));
    }

    #[test]
    fn test_unit_return_has_no_descriptor() {
        let (args, ret) = signature(&|_: &mut Probe| {});
        assert!(args.is_empty());
        assert!(ret.is_none());
    }

    #[test]
    fn test_variant_return_is_untyped() {
        let (_, ret) = signature(&|_: &Probe, value: Variant| value);
        assert!(ret.map_or(false, |info| info.is_variant()));
    }
}
