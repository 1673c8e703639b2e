//! 参数视图
//!
//! 方法跳板收到的参数有两种来源：
//! - 引擎调用：只读的 Variant 指针数组，只在本次调用期间有效
//! - 宿主调用：宿主构造的 `Option<Variant>` 列表（`None` 表示 nil）
//!
//! 两种形式对外表现一致：数量、按索引取值（nil 读作 `None`）、零拷贝借用和类型化提取。

use crate::convert::FromVariant;
use crate::core::error::{ArgumentAccessError, ArgumentResult};
use crate::sys::ConstVariantPtr;
use crate::variant::{self, FastVariant, Variant};
use std::borrow::Cow;
use std::ops::Index;

static NIL: Variant = Variant::nil();

/// Read-only argument list of one call.
pub struct Arguments<'a> {
    repr: Repr<'a>,
}

enum Repr<'a> {
    Engine(&'a [ConstVariantPtr]),
    Host(Cow<'a, [Option<Variant>]>),
}

impl<'a> Arguments<'a> {
    /// Views an engine argument array.
    ///
    /// # Safety
    /// `args` must point to `count` valid Variant pointers that outlive `'a`.
    pub unsafe fn from_engine(args: *const ConstVariantPtr, count: i64) -> Self {
        let slice = if args.is_null() || count <= 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(args, count as usize)
        };
        Self {
            repr: Repr::Engine(slice),
        }
    }

    pub fn from_slice(values: &'a [Option<Variant>]) -> Self {
        Self {
            repr: Repr::Host(Cow::Borrowed(values)),
        }
    }

    pub fn empty() -> Arguments<'static> {
        Arguments {
            repr: Repr::Host(Cow::Owned(Vec::new())),
        }
    }

    pub fn count(&self) -> usize {
        match &self.repr {
            Repr::Engine(ptrs) => ptrs.len(),
            Repr::Host(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Copy of argument `index`; nil reads as `None`.
    pub fn get(&self, index: usize) -> ArgumentResult<Option<Variant>> {
        let value = self.slot(index)?;
        Ok((!value.is_nil()).then(|| value.clone()))
    }

    pub fn first(&self) -> ArgumentResult<Option<Variant>> {
        self.get(0)
    }

    /// Like [`get`](Self::get) but panics past the end.
    pub fn at(&self, index: usize) -> Option<Variant> {
        let value = &self[index];
        (!value.is_nil()).then(|| value.clone())
    }

    /// Zero-copy scoped access to argument `index`.
    pub fn with_borrowed_fast_variant<R>(
        &self,
        index: usize,
        use_value: impl FnOnce(Option<&FastVariant>) -> R,
    ) -> ArgumentResult<R> {
        let value = self.slot(index)?;
        // SAFETY: the argument outlives the callback, and the borrow is forgotten afterwards.
        Ok(unsafe { variant::with_borrowed(*value.content(), use_value) })
    }

    /// Typed extraction. Nil into a non-nullable `T` is [`ArgumentAccessError::MissingValue`].
    pub fn argument<T: FromVariant>(&self, index: usize) -> ArgumentResult<T> {
        let value = self.slot(index)?;
        T::from_variant(value).map_err(|err| ArgumentAccessError::from_conversion(index, err))
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Variant>> + '_ {
        (0..self.count()).map(move |index| self.at(index))
    }

    pub fn to_vec(&self) -> Vec<Option<Variant>> {
        self.iter().collect()
    }

    fn slot(&self, index: usize) -> ArgumentResult<&Variant> {
        let count = self.count();
        if index >= count {
            return Err(ArgumentAccessError::IndexOutOfBounds { index, count });
        }
        Ok(match &self.repr {
            // SAFETY: engine arguments stay valid for the lifetime of this view.
            Repr::Engine(ptrs) => unsafe { Variant::borrow_sys(ptrs[index]) },
            Repr::Host(values) => values[index].as_ref().unwrap_or(&NIL),
        })
    }
}

impl Arguments<'static> {
    pub fn from_values(values: Vec<Option<Variant>>) -> Self {
        Self {
            repr: Repr::Host(Cow::Owned(values)),
        }
    }
}

/// Panics when `index` is past the end.
impl Index<usize> for Arguments<'_> {
    type Output = Variant;

    fn index(&self, index: usize) -> &Variant {
        match self.slot(index) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl std::fmt::Debug for Arguments<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries((0..self.count()).map(|index| &self[index]))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_arguments() {
        let args = Arguments::empty();
        assert_eq!(args.count(), 0);
        assert!(args.is_empty());
        assert_eq!(
            args.get(0),
            Err(ArgumentAccessError::IndexOutOfBounds { index: 0, count: 0 })
        );
    }

    #[test]
    fn test_host_nil_reads_as_none() {
        let args = Arguments::from_values(vec![None, None]);
        assert_eq!(args.count(), 2);
        assert_eq!(args.get(1), Ok(None));
        assert!(args[0].is_nil());
        let seen = args.with_borrowed_fast_variant(0, |value| value.is_none()).unwrap();
        assert!(seen);
    }

    #[test]
    #[should_panic]
    fn test_index_past_end_panics() {
        let args = Arguments::from_values(vec![None]);
        let _ = &args[3];
    }

    #[test]
    fn test_null_engine_array_is_empty() {
        let args = unsafe { Arguments::from_engine(std::ptr::null(), 4) };
        assert_eq!(args.count(), 0);
    }
}
