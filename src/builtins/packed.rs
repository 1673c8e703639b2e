//! 紧凑数组
//!
//! 元素连续存储的同质数组，复制时按值复制（引擎侧写时复制）。
//! 元素读写通过引擎导出的 `packed_*_array_operator_index` 函数完成。

use super::{BuiltinMethod, Color, GString, Vector2, Vector3, Vector4};
use crate::convert::{FromVariant, ToVariant, VariantType};
use crate::core::error::{ContainerError, ContainerResult, ConversionResult};
use crate::sys::{self, ConstTypePtr, TypePtr};
use crate::variant::{GType, Variant};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;

type IndexFns = (sys::interface::PackedIndex, sys::interface::PackedIndexConst);

/// Element of a packed array.
pub trait PackedElement: Sized + Clone {
    const ARRAY_GTYPE: GType;

    #[doc(hidden)]
    fn index_fns() -> IndexFns;

    #[doc(hidden)]
    fn size_method() -> &'static BuiltinMethod;

    #[doc(hidden)]
    fn resize_method() -> &'static BuiltinMethod;

    /// # Safety
    /// `slot` must point to a live element.
    #[doc(hidden)]
    unsafe fn read(slot: *const c_void) -> Self;

    /// # Safety
    /// `slot` must point to a live element.
    #[doc(hidden)]
    unsafe fn write(slot: *mut c_void, value: &Self);
}

macro_rules! packed_element {
    (@access $elem:ty, copy) => {
        unsafe fn read(slot: *const c_void) -> Self {
            std::ptr::read_unaligned(slot as *const $elem)
        }

        unsafe fn write(slot: *mut c_void, value: &Self) {
            std::ptr::write_unaligned(slot as *mut $elem, *value);
        }
    };
    (@access $elem:ty) => {
        unsafe fn read(slot: *const c_void) -> Self {
            (*(slot as *const $elem)).clone()
        }

        unsafe fn write(slot: *mut c_void, value: &Self) {
            *(slot as *mut $elem) = value.clone();
        }
    };
    (
        $elem:ty, $gtype:ident, $alias:ident,
        $index:ident, $index_const:ident, $size:ident, $resize:ident
        $(, $copy:tt)?
    ) => {
        static $size: BuiltinMethod = BuiltinMethod::new(GType::$gtype, "size", 3173160232);
        static $resize: BuiltinMethod = BuiltinMethod::new(GType::$gtype, "resize", 848867239);

        impl PackedElement for $elem {
            const ARRAY_GTYPE: GType = GType::$gtype;

            fn index_fns() -> IndexFns {
                let fns = &sys::interface().fns;
                (fns.$index, fns.$index_const)
            }

            fn size_method() -> &'static BuiltinMethod {
                &$size
            }

            fn resize_method() -> &'static BuiltinMethod {
                &$resize
            }

            packed_element!(@access $elem $(, $copy)?);
        }

        pub type $alias = PackedArray<$elem>;
    };
}

packed_element!(u8, PackedByteArray, PackedByteArray,
    packed_byte_array_operator_index, packed_byte_array_operator_index_const,
    BYTE_SIZE, BYTE_RESIZE, copy);
packed_element!(i32, PackedInt32Array, PackedInt32Array,
    packed_int32_array_operator_index, packed_int32_array_operator_index_const,
    INT32_SIZE, INT32_RESIZE, copy);
packed_element!(i64, PackedInt64Array, PackedInt64Array,
    packed_int64_array_operator_index, packed_int64_array_operator_index_const,
    INT64_SIZE, INT64_RESIZE, copy);
packed_element!(f32, PackedFloat32Array, PackedFloat32Array,
    packed_float32_array_operator_index, packed_float32_array_operator_index_const,
    FLOAT32_SIZE, FLOAT32_RESIZE, copy);
packed_element!(f64, PackedFloat64Array, PackedFloat64Array,
    packed_float64_array_operator_index, packed_float64_array_operator_index_const,
    FLOAT64_SIZE, FLOAT64_RESIZE, copy);
packed_element!(GString, PackedStringArray, PackedStringArray,
    packed_string_array_operator_index, packed_string_array_operator_index_const,
    STRING_SIZE, STRING_RESIZE);
packed_element!(Vector2, PackedVector2Array, PackedVector2Array,
    packed_vector2_array_operator_index, packed_vector2_array_operator_index_const,
    VECTOR2_SIZE, VECTOR2_RESIZE, copy);
packed_element!(Vector3, PackedVector3Array, PackedVector3Array,
    packed_vector3_array_operator_index, packed_vector3_array_operator_index_const,
    VECTOR3_SIZE, VECTOR3_RESIZE, copy);
packed_element!(Vector4, PackedVector4Array, PackedVector4Array,
    packed_vector4_array_operator_index, packed_vector4_array_operator_index_const,
    VECTOR4_SIZE, VECTOR4_RESIZE, copy);
packed_element!(Color, PackedColorArray, PackedColorArray,
    packed_color_array_operator_index, packed_color_array_operator_index_const,
    COLOR_SIZE, COLOR_RESIZE, copy);

/// Homogeneous contiguous engine array.
#[repr(C)]
pub struct PackedArray<T: PackedElement> {
    opaque: [usize; 2],
    _marker: PhantomData<T>,
}

impl<T: PackedElement> PackedArray<T> {
    pub fn new() -> Self {
        let ctor = match sys::interface().builtin(T::ARRAY_GTYPE).default_constructor {
            Some(ctor) => ctor,
            None => panic!("engine provides no default constructor for {}", T::ARRAY_GTYPE),
        };
        unsafe { Self::new_with_uninit(|dst| ctor(dst, std::ptr::null())) }
    }

    unsafe fn new_with_uninit(init: impl FnOnce(sys::UninitializedTypePtr)) -> Self {
        let mut raw = std::mem::MaybeUninit::<Self>::zeroed();
        init(raw.as_mut_ptr() as sys::UninitializedTypePtr);
        raw.assume_init()
    }

    pub fn sys(&self) -> ConstTypePtr {
        self as *const Self as ConstTypePtr
    }

    pub fn sys_mut(&mut self) -> TypePtr {
        self as *mut Self as TypePtr
    }

    pub fn len(&self) -> usize {
        T::size_method().call_int(self.sys()).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len() {
            return None;
        }
        let (_, index_const) = T::index_fns();
        // SAFETY: index is in bounds.
        unsafe {
            let slot = index_const(self.sys(), index as i64);
            (!slot.is_null()).then(|| T::read(slot))
        }
    }

    pub fn set(&mut self, index: usize, value: &T) -> ContainerResult<()> {
        let len = self.len();
        if index >= len {
            return Err(ContainerError::IndexOutOfBounds { index, len });
        }
        let (index_mut, _) = T::index_fns();
        // SAFETY: index is in bounds.
        unsafe {
            let slot = index_mut(self.sys_mut(), index as i64);
            if slot.is_null() {
                return Err(ContainerError::Rejected(format!("slot {index}")));
            }
            T::write(slot, value);
        }
        Ok(())
    }

    pub fn resize(&mut self, len: usize) {
        let len = len as i64;
        let args: [ConstTypePtr; 1] = [&len as *const i64 as ConstTypePtr];
        let mut result: i64 = 0;
        unsafe {
            T::resize_method().call(self.sys_mut(), &args, &mut result as *mut i64 as TypePtr)
        };
    }

    pub fn push(&mut self, value: &T) {
        let len = self.len();
        self.resize(len + 1);
        // A fresh slot past the old end is always in bounds.
        let _ = self.set(len, value);
    }

    pub fn clear(&mut self) {
        self.resize(0);
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T: PackedElement> Default for PackedArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PackedElement> Clone for PackedArray<T> {
    fn clone(&self) -> Self {
        let ctor = match sys::interface().builtin(T::ARRAY_GTYPE).copy_constructor {
            Some(ctor) => ctor,
            None => panic!("engine provides no copy constructor for {}", T::ARRAY_GTYPE),
        };
        let args = [self.sys()];
        unsafe { Self::new_with_uninit(|dst| ctor(dst, args.as_ptr())) }
    }
}

impl<T: PackedElement> Drop for PackedArray<T> {
    fn drop(&mut self) {
        if let Some(dtor) = sys::interface().builtin(T::ARRAY_GTYPE).destructor {
            unsafe { dtor(self.sys_mut()) };
        }
    }
}

impl<T: PackedElement> From<&[T]> for PackedArray<T> {
    fn from(values: &[T]) -> Self {
        let mut array = Self::new();
        array.resize(values.len());
        for (index, value) in values.iter().enumerate() {
            let _ = array.set(index, value);
        }
        array
    }
}

impl<T: PackedElement> FromIterator<T> for PackedArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let values: Vec<T> = iter.into_iter().collect();
        Self::from(values.as_slice())
    }
}

impl<T: PackedElement + fmt::Debug> fmt::Debug for PackedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PackedElement + PartialEq> PartialEq for PackedArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: PackedElement> ToVariant for PackedArray<T> {
    fn to_variant(&self) -> Variant {
        unsafe { crate::convert::variant_from_type_ptr(T::ARRAY_GTYPE, self.sys() as TypePtr) }
    }
}

impl<T: PackedElement> FromVariant for PackedArray<T> {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        unsafe { crate::convert::type_from_variant(variant, T::ARRAY_GTYPE) }
    }
}

impl<T: PackedElement> VariantType for PackedArray<T> {
    const GTYPE: GType = T::ARRAY_GTYPE;
}
