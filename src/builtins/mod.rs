//! 内建值类型
//!
//! - `math` - 与引擎内存布局一致的数学类型（POD）
//! - `string` - `GString` / `StringName` / `NodePath`
//! - `array` / `typed_array` - 变体数组与类型化数组
//! - `dictionary` - 字典与类型化字典
//! - `packed` - 紧凑数组
//! - `callable` - `Callable` / `Signal`
//!
//! 不透明类型（字符串、容器、可调用对象）只保存引擎句柄，构造、复制、销毁全部委托给引擎。

mod array;
mod callable;
mod dictionary;
mod element;
mod math;
mod packed;
mod string;
mod typed_array;

pub use array::VariantArray;
pub use callable::{Callable, Signal};
pub use dictionary::{Dictionary, TypedDictionary};
pub use element::ElementType;
pub use math::*;
pub use packed::{
    PackedByteArray, PackedColorArray, PackedElement, PackedArray, PackedFloat32Array,
    PackedFloat64Array, PackedInt32Array, PackedInt64Array, PackedStringArray,
    PackedVector2Array, PackedVector3Array, PackedVector4Array,
};
pub use string::{GString, NodePath, StringName};
pub use typed_array::TypedArray;

use crate::sys::{self, ConstTypePtr, PtrBuiltInMethod, TypePtr};
use crate::variant::GType;
use std::sync::OnceLock;

/// Builtin method resolved on first use by name and ABI hash.
#[doc(hidden)]
pub struct BuiltinMethod {
    gtype: GType,
    name: &'static str,
    hash: i64,
    resolved: OnceLock<PtrBuiltInMethod>,
}

impl BuiltinMethod {
    pub(crate) const fn new(gtype: GType, name: &'static str, hash: i64) -> Self {
        Self {
            gtype,
            name,
            hash,
            resolved: OnceLock::new(),
        }
    }

    fn get(&self) -> PtrBuiltInMethod {
        *self.resolved.get_or_init(|| {
            let name = StringName::from(self.name);
            // SAFETY: the name outlives the lookup.
            let method = unsafe {
                (sys::interface().fns.variant_get_ptr_builtin_method)(
                    self.gtype.to_sys(),
                    name.sys(),
                    self.hash,
                )
            };
            match method {
                Some(method) => method,
                None => panic!(
                    "engine does not provide {}.{} (hash {})",
                    self.gtype, self.name, self.hash
                ),
            }
        })
    }

    /// # Safety
    /// `base`, `args` and `ret` must match the method's engine signature.
    pub(crate) unsafe fn call(&self, base: TypePtr, args: &[ConstTypePtr], ret: TypePtr) {
        (self.get())(base, args.as_ptr(), ret, args.len() as i32);
    }

    /// Calls a `() -> int` method.
    pub(crate) fn call_int(&self, base: ConstTypePtr) -> i64 {
        let mut out: i64 = 0;
        // SAFETY: the method is const and writes a single int.
        unsafe { self.call(base as TypePtr, &[], &mut out as *mut i64 as TypePtr) };
        out
    }

    /// Calls a `() -> bool` method.
    pub(crate) fn call_bool(&self, base: ConstTypePtr) -> bool {
        let mut out: sys::Bool = sys::FALSE;
        unsafe { self.call(base as TypePtr, &[], &mut out as *mut sys::Bool as TypePtr) };
        sys::from_bool(out)
    }
}

/// Engine-managed lifecycle for an opaque builtin: default construction, copy, destruction.
macro_rules! impl_opaque_builtin {
    ($ty:ident, $gtype:expr) => {
        impl $ty {
            /// Placement-constructs through an engine initializer.
            ///
            /// # Safety
            /// `init` must write a valid value behind the pointer it receives.
            pub(crate) unsafe fn new_with_uninit(
                init: impl FnOnce($crate::sys::UninitializedTypePtr),
            ) -> Self {
                let mut raw = std::mem::MaybeUninit::<Self>::zeroed();
                init(raw.as_mut_ptr() as $crate::sys::UninitializedTypePtr);
                raw.assume_init()
            }

            pub fn sys(&self) -> $crate::sys::ConstTypePtr {
                self as *const Self as $crate::sys::ConstTypePtr
            }

            pub fn sys_mut(&mut self) -> $crate::sys::TypePtr {
                self as *mut Self as $crate::sys::TypePtr
            }

            fn engine_default() -> Self {
                let ctor = match $crate::sys::interface().builtin($gtype).default_constructor {
                    Some(ctor) => ctor,
                    None => panic!("engine provides no default constructor for {}", $gtype),
                };
                // SAFETY: the default constructor takes no arguments.
                unsafe { Self::new_with_uninit(|dst| ctor(dst, std::ptr::null())) }
            }
        }

        impl Clone for $ty {
            fn clone(&self) -> Self {
                let ctor = match $crate::sys::interface().builtin($gtype).copy_constructor {
                    Some(ctor) => ctor,
                    None => panic!("engine provides no copy constructor for {}", $gtype),
                };
                let args = [self.sys()];
                // SAFETY: the copy constructor reads exactly one argument of this type.
                unsafe { Self::new_with_uninit(|dst| ctor(dst, args.as_ptr())) }
            }
        }

        impl Drop for $ty {
            fn drop(&mut self) {
                if let Some(dtor) = $crate::sys::interface().builtin($gtype).destructor {
                    unsafe { dtor(self.sys_mut()) };
                }
            }
        }

        impl $crate::convert::ToVariant for $ty {
            fn to_variant(&self) -> $crate::variant::Variant {
                // SAFETY: self is a valid instance of the builtin type.
                unsafe { $crate::convert::variant_from_type_ptr($gtype, self.sys() as $crate::sys::TypePtr) }
            }
        }

        impl $crate::convert::FromVariant for $ty {
            fn from_variant(
                variant: &$crate::variant::Variant,
            ) -> $crate::core::error::ConversionResult<Self> {
                // SAFETY: the type is repr(transparent) over the engine's opaque storage.
                unsafe { $crate::convert::type_from_variant(variant, $gtype) }
            }
        }
    };
}

/// Plain-data builtin: the engine copies the bytes on conversion.
macro_rules! impl_pod_builtin {
    ($($ty:ident => $gtype:ident),* $(,)?) => {
        $(
            impl $crate::convert::ToVariant for $ty {
                fn to_variant(&self) -> $crate::variant::Variant {
                    let mut value = *self;
                    unsafe {
                        $crate::convert::variant_from_type_ptr(
                            $crate::variant::GType::$gtype,
                            &mut value as *mut $ty as $crate::sys::TypePtr,
                        )
                    }
                }
            }

            impl $crate::convert::FromVariant for $ty {
                fn from_variant(
                    variant: &$crate::variant::Variant,
                ) -> $crate::core::error::ConversionResult<Self> {
                    unsafe { $crate::convert::type_from_variant(variant, $crate::variant::GType::$gtype) }
                }
            }

            impl $crate::convert::VariantType for $ty {
                const GTYPE: $crate::variant::GType = $crate::variant::GType::$gtype;
            }
        )*
    };
}

pub(crate) use impl_opaque_builtin;

impl_pod_builtin! {
    Vector2 => Vector2,
    Vector2i => Vector2i,
    Rect2 => Rect2,
    Rect2i => Rect2i,
    Vector3 => Vector3,
    Vector3i => Vector3i,
    Transform2D => Transform2D,
    Vector4 => Vector4,
    Vector4i => Vector4i,
    Plane => Plane,
    Quaternion => Quaternion,
    Aabb => Aabb,
    Basis => Basis,
    Transform3D => Transform3D,
    Projection => Projection,
    Color => Color,
    Rid => Rid,
}
