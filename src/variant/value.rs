//! 拥有所有权的 Variant
//!
//! 安全层 API：复制走引擎拷贝构造，销毁走引擎析构（除非钩子要求跳过）。

use super::{GType, VariantContent, VariantOperator};
use crate::builtins::{GString, StringName};
use crate::convert::{FromVariant, ToVariant};
use crate::core::error::{CallError, ConversionResult, VariantIndexError};
use crate::engine_fn;
use crate::sys::{self, CallErrorRaw, ConstVariantPtr, UninitializedVariantPtr, VariantPtr};
use std::fmt;

/// Owned engine Variant.
///
/// Copies go through the engine copy constructor, never a bitwise copy, so heap-resident
/// payloads (strings, arrays, objects) get their engine reference counts adjusted.
#[repr(transparent)]
pub struct Variant {
    content: VariantContent,
}

impl Variant {
    pub const fn nil() -> Self {
        Self {
            content: VariantContent::ZERO,
        }
    }

    /// Takes ownership of a payload produced by the engine.
    ///
    /// # Safety
    /// `content` must be a valid engine payload that nobody else will destroy.
    pub unsafe fn from_content(content: VariantContent) -> Self {
        Self { content }
    }

    /// Releases ownership without destroying the payload.
    pub fn into_content(self) -> VariantContent {
        let content = self.content;
        std::mem::forget(self);
        content
    }

    pub fn content(&self) -> &VariantContent {
        &self.content
    }

    pub fn sys(&self) -> ConstVariantPtr {
        self.content.as_ptr()
    }

    pub fn sys_mut(&mut self) -> VariantPtr {
        self.content.as_mut_ptr()
    }

    /// Runs an engine placement constructor against a fresh nil slot.
    ///
    /// # Safety
    /// `init` must leave a valid payload (or nil) behind the pointer it receives.
    pub unsafe fn new_with_uninit(init: impl FnOnce(UninitializedVariantPtr)) -> Self {
        let mut variant = Self::nil();
        init(variant.sys_mut());
        variant
    }

    /// Copies an engine-owned Variant through the engine copy constructor.
    ///
    /// # Safety
    /// `ptr` must point to a valid engine Variant.
    pub unsafe fn new_copy_from_sys(ptr: ConstVariantPtr) -> Self {
        if VariantContent::read_from(ptr).is_zero() {
            return Self::nil();
        }
        Self::new_with_uninit(|dst| engine_fn!(variant_new_copy)(dst, ptr))
    }

    /// Views an engine-owned Variant without taking ownership.
    ///
    /// # Safety
    /// `ptr` must point to a valid Variant that outlives `'a`.
    pub unsafe fn borrow_sys<'a>(ptr: ConstVariantPtr) -> &'a Variant {
        &*(ptr as *const Variant)
    }

    /// Moves the payload into an engine-provided slot holding nil.
    ///
    /// # Safety
    /// `dst` must point to writable Variant storage whose current payload needs no destruction.
    pub unsafe fn move_into_sys(self, dst: VariantPtr) {
        std::ptr::write(dst as *mut VariantContent, self.into_content());
    }

    pub fn gtype(&self) -> GType {
        if self.content.is_zero() {
            return GType::Nil;
        }
        // SAFETY: a non-zero payload was produced by the engine, so the interface is loaded.
        let raw = unsafe { engine_fn!(variant_get_type)(self.sys()) };
        GType::from_sys(raw).unwrap_or(GType::Nil)
    }

    pub fn is_nil(&self) -> bool {
        self.gtype() == GType::Nil
    }

    /// Checked conversion; `None` when the tag or class does not match `T`.
    pub fn to<T: FromVariant>(&self) -> Option<T> {
        T::from_variant(self).ok()
    }

    pub fn try_to<T: FromVariant>(&self) -> ConversionResult<T> {
        T::from_variant(self)
    }

    pub fn from_value<T: ToVariant + ?Sized>(value: &T) -> Self {
        value.to_variant()
    }

    /// Moves into the fast tier; `None` for nil.
    pub fn into_fast(self) -> Option<super::FastVariant> {
        // SAFETY: ownership of the payload moves to the FastVariant.
        unsafe { super::FastVariant::take_over(self.into_content()) }
    }

    /// Engine string representation.
    pub fn stringify(&self) -> String {
        if self.content.is_zero() {
            return "<null>".to_string();
        }
        // SAFETY: variant_stringify placement-constructs a String into the slot.
        let text = unsafe { GString::new_with_uninit(|ptr| engine_fn!(variant_stringify)(self.sys(), ptr)) };
        text.to_string()
    }

    /// Engine hash of the value.
    pub fn hash_code(&self) -> i64 {
        if self.content.is_zero() {
            return 0;
        }
        // SAFETY: the payload is non-nil and valid for the lifetime of `self`; variant_hash only reads it.
        unsafe { engine_fn!(variant_hash)(self.sys()) }
    }

    /// Engine truthiness (`0`, empty strings and empty containers are false).
    pub fn booleanize(&self) -> bool {
        if self.content.is_zero() {
            return false;
        }
        // SAFETY: the payload is non-nil and valid for the lifetime of `self`; variant_booleanize only reads it.
        let truthy = unsafe { engine_fn!(variant_booleanize)(self.sys()) };
        sys::from_bool(truthy)
    }

    /// Evaluates a binary operator; `None` when the engine rejects the operand types.
    pub fn evaluate(&self, op: VariantOperator, rhs: &Variant) -> Option<Variant> {
        let mut valid = sys::FALSE;
        // SAFETY: both operands are valid payloads and the result is written into a fresh nil slot.
        let result = unsafe {
            Variant::new_with_uninit(|dst| {
                engine_fn!(variant_evaluate)(op.to_sys(), self.sys(), rhs.sys(), dst, &mut valid)
            })
        };
        sys::from_bool(valid).then_some(result)
    }

    /// Dynamic builtin method call, e.g. `size` on an array.
    pub fn call(&mut self, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
        let method_name = StringName::from(method);
        let arg_ptrs: Vec<ConstVariantPtr> = args.iter().map(Variant::sys).collect();
        let mut error = CallErrorRaw::default();
        // SAFETY: `arg_ptrs` borrows from `args`, which outlives the call.
        let result = unsafe {
            Variant::new_with_uninit(|dst| {
                engine_fn!(variant_call)(
                    self.sys_mut(),
                    method_name.sys(),
                    arg_ptrs.as_ptr(),
                    arg_ptrs.len() as i64,
                    dst,
                    &mut error,
                )
            })
        };
        match CallError::from_sys(&error, method) {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    pub fn get_indexed(&self, index: i64) -> Result<Variant, VariantIndexError> {
        let mut valid = sys::FALSE;
        let mut out_of_bounds = sys::FALSE;
        // SAFETY: the engine writes the element into a fresh nil slot and only reads `self`.
        let result = unsafe {
            Variant::new_with_uninit(|dst| {
                engine_fn!(variant_get_indexed)(self.sys(), index, dst, &mut valid, &mut out_of_bounds)
            })
        };
        index_result(valid, out_of_bounds, index).map(|_| result)
    }

    pub fn set_indexed(&mut self, index: i64, value: &Variant) -> Result<(), VariantIndexError> {
        let mut valid = sys::FALSE;
        let mut out_of_bounds = sys::FALSE;
        // SAFETY: `self` is exclusively borrowed; the engine copies `value`.
        unsafe {
            engine_fn!(variant_set_indexed)(
                self.sys_mut(),
                index,
                value.sys(),
                &mut valid,
                &mut out_of_bounds,
            )
        };
        index_result(valid, out_of_bounds, index)
    }

    pub fn get_keyed(&self, key: &Variant) -> Result<Variant, VariantIndexError> {
        let mut valid = sys::FALSE;
        // SAFETY: the engine writes the value into a fresh nil slot and only reads `self` and `key`.
        let result = unsafe {
            Variant::new_with_uninit(|dst| {
                engine_fn!(variant_get_keyed)(self.sys(), key.sys(), dst, &mut valid)
            })
        };
        if sys::from_bool(valid) {
            Ok(result)
        } else {
            Err(VariantIndexError::InvalidKey(key.stringify()))
        }
    }

    pub fn set_keyed(&mut self, key: &Variant, value: &Variant) -> Result<(), VariantIndexError> {
        let mut valid = sys::FALSE;
        // SAFETY: `self` is exclusively borrowed; the engine copies `key` and `value`.
        unsafe { engine_fn!(variant_set_keyed)(self.sys_mut(), key.sys(), value.sys(), &mut valid) };
        if sys::from_bool(valid) {
            Ok(())
        } else {
            Err(VariantIndexError::InvalidKey(key.stringify()))
        }
    }
}

fn index_result(valid: sys::Bool, out_of_bounds: sys::Bool, index: i64) -> Result<(), VariantIndexError> {
    if sys::from_bool(out_of_bounds) {
        Err(VariantIndexError::OutOfBounds { index })
    } else if !sys::from_bool(valid) {
        Err(VariantIndexError::InvalidOperation)
    } else {
        Ok(())
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::nil()
    }
}

impl Clone for Variant {
    fn clone(&self) -> Self {
        // SAFETY: self is a valid payload for the duration of the copy.
        unsafe { Self::new_copy_from_sys(self.sys()) }
    }
}

impl Drop for Variant {
    fn drop(&mut self) {
        if self.content.is_zero() || !sys::hooks::variant_should_deinit(self.content.words()) {
            return;
        }
        // SAFETY: the payload is owned and destroyed exactly once.
        unsafe { engine_fn!(variant_destroy)(self.sys_mut()) };
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self.content.is_zero(), other.content.is_zero()) {
            (true, true) => true,
            _ => self
                .evaluate(VariantOperator::Equal, other)
                .and_then(|result| result.to::<bool>())
                .unwrap_or(false),
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variant({}: {})", self.gtype(), self.stringify())
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

macro_rules! impl_variant_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    value.to_variant()
                }
            }
        )*
    };
}

impl_variant_from!(bool, i64, i32, f64, f32, String, &str);
