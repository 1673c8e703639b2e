//! 快速 Variant
//!
//! 热路径层 API：只能移动、不可隐式复制。借用形式只通过作用域回调暴露，
//! 回调结束后负载会被清零，析构因此成为空操作。

use super::{GType, Variant, VariantContent};
use crate::convert::FromVariant;
use crate::core::error::ConversionResult;
use crate::engine_fn;
use crate::sys;

/// Move-only Variant for hot paths.
///
/// An owned `FastVariant` never holds nil: [`take_over`](Self::take_over) returns `None`
/// for the all-zero payload.
#[repr(transparent)]
pub struct FastVariant {
    content: VariantContent,
}

impl FastVariant {
    /// Becomes the sole owner of `content`; `None` for the nil sentinel.
    ///
    /// # Safety
    /// `content` must be a valid engine payload that nobody else will destroy.
    pub unsafe fn take_over(content: VariantContent) -> Option<Self> {
        if content.is_zero() {
            None
        } else {
            Some(Self { content })
        }
    }

    /// Wraps a payload owned elsewhere. The caller must [`forget`](Self::forget) it
    /// before the wrapper goes out of scope.
    pub(crate) unsafe fn borrowing(content: VariantContent) -> Self {
        Self { content }
    }

    /// Zeroes the payload so that dropping becomes a no-op.
    ///
    /// On an owned value this leaks the engine payload.
    pub fn forget(&mut self) {
        self.content = VariantContent::ZERO;
    }

    pub fn content(&self) -> &VariantContent {
        &self.content
    }

    pub fn sys(&self) -> sys::ConstVariantPtr {
        self.content.as_ptr()
    }

    /// Independent owned copy through the engine copy constructor; `None` for the nil
    /// sentinel, like [`take_over`](Self::take_over).
    pub fn copy(&self) -> Option<FastVariant> {
        if self.content.is_zero() {
            return None;
        }
        // SAFETY: the source payload is valid and the copy is written into a zeroed slot.
        let copy = unsafe { Variant::new_with_uninit(|dst| engine_fn!(variant_new_copy)(dst, self.sys())) };
        Some(Self {
            content: copy.into_content(),
        })
    }

    /// Copies into the safe tier.
    pub fn to_variant(&self) -> Variant {
        self.as_variant().clone()
    }

    /// Moves into the safe tier without touching reference counts.
    pub fn into_variant(self) -> Variant {
        let content = self.content;
        std::mem::forget(self);
        // SAFETY: ownership moves from self to the new Variant.
        unsafe { Variant::from_content(content) }
    }

    /// Read-only view as a [`Variant`]; the view cannot be moved out or dropped.
    pub fn as_variant(&self) -> &Variant {
        // SAFETY: both types are repr(transparent) over VariantContent.
        unsafe { &*(self as *const FastVariant as *const Variant) }
    }

    pub fn gtype(&self) -> GType {
        self.as_variant().gtype()
    }

    /// Checked conversion; `None` on tag mismatch or unresolvable object class.
    pub fn to<T: FromVariant>(&self) -> Option<T> {
        T::from_variant(self.as_variant()).ok()
    }

    pub fn try_to<T: FromVariant>(&self) -> ConversionResult<T> {
        T::from_variant(self.as_variant())
    }
}

impl Drop for FastVariant {
    fn drop(&mut self) {
        if self.content.is_zero() || !sys::hooks::variant_should_deinit(self.content.words()) {
            return;
        }
        // SAFETY: an owned payload is destroyed exactly once; borrows were zeroed by `forget`.
        unsafe { engine_fn!(variant_destroy)(self.content.as_mut_ptr()) };
    }
}

impl std::fmt::Debug for FastVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FastVariant({:?})", self.as_variant())
    }
}

/// Forgets the wrapped borrow when the scope ends, including on unwind.
struct ForgetOnExit(FastVariant);

impl Drop for ForgetOnExit {
    fn drop(&mut self) {
        self.0.forget();
    }
}

/// Lends `content` to `use_value` as a borrowed [`FastVariant`] and neutralises the borrow
/// afterwards. Nil payloads are passed as `None`.
///
/// # Safety
/// `content` must be a valid payload that stays alive for the duration of the call.
pub(crate) unsafe fn with_borrowed<R>(
    content: VariantContent,
    use_value: impl FnOnce(Option<&FastVariant>) -> R,
) -> R {
    let guard = ForgetOnExit(FastVariant::borrowing(content));
    if guard.0.content.is_zero() {
        use_value(None)
    } else {
        use_value(Some(&guard.0))
    }
}

impl Variant {
    /// Zero-copy scoped access to this Variant as a [`FastVariant`].
    pub fn with_fast<R>(&self, use_value: impl FnOnce(Option<&FastVariant>) -> R) -> R {
        // SAFETY: self outlives the call and the borrow is forgotten before returning.
        unsafe { with_borrowed(*self.content(), use_value) }
    }
}
