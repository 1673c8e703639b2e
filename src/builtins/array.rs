//! 变体数组
//!
//! 引擎 `Array` 的句柄。数组在复制时共享底层存储（引用计数），与引擎语义一致。
//! 类型化数组由引擎负责校验：类型不符的写入会被引擎拒绝并记录错误；
//! `try_push` / `set` 在写入前做宿主侧检查，以便把错误返回给调用方。

use super::{impl_opaque_builtin, BuiltinMethod, ElementType, StringName};
use crate::convert::{FromVariant, ToVariant, VariantType};
use crate::core::error::{ContainerError, ContainerResult, ConversionError, ConversionResult};
use crate::sys::{self, ConstTypePtr, TypePtr};
use crate::variant::{self, FastVariant, GType, Variant};

/// Untyped or typed engine array.
#[repr(transparent)]
pub struct VariantArray {
    opaque: usize,
}

impl_opaque_builtin!(VariantArray, GType::Array);

static SIZE: BuiltinMethod = BuiltinMethod::new(GType::Array, "size", 3173160232);
static CLEAR: BuiltinMethod = BuiltinMethod::new(GType::Array, "clear", 3218959716);
static RESIZE: BuiltinMethod = BuiltinMethod::new(GType::Array, "resize", 848867239);
static PUSH_BACK: BuiltinMethod = BuiltinMethod::new(GType::Array, "push_back", 3316032543);
static IS_TYPED: BuiltinMethod = BuiltinMethod::new(GType::Array, "is_typed", 3918633141);
static GET_TYPED_BUILTIN: BuiltinMethod =
    BuiltinMethod::new(GType::Array, "get_typed_builtin", 3173160232);
static GET_TYPED_CLASS_NAME: BuiltinMethod =
    BuiltinMethod::new(GType::Array, "get_typed_class_name", 1825232092);

impl VariantArray {
    pub fn new() -> Self {
        Self::engine_default()
    }

    /// Fresh array constrained to `element`.
    pub fn new_typed(element: &ElementType) -> Self {
        let mut array = Self::new();
        array.set_typed(element);
        array
    }

    pub fn len(&self) -> usize {
        SIZE.call_int(self.sys()).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the element at `index`.
    pub fn get(&self, index: usize) -> Option<Variant> {
        let slot = self.slot_const(index)?;
        // SAFETY: the slot belongs to this array and is valid until the next mutation.
        Some(unsafe { Variant::new_copy_from_sys(slot) })
    }

    /// Converts the element at `index`.
    pub fn get_as<T: FromVariant>(&self, index: usize) -> ConversionResult<T> {
        match self.get(index) {
            Some(value) => T::from_variant(&value),
            None => Err(ConversionError::Custom(format!(
                "index {index} out of bounds (length {})",
                self.len()
            ))),
        }
    }

    /// Zero-copy access to the element at `index`; `None` past the end.
    pub fn with_borrowed_element<R>(
        &self,
        index: usize,
        use_value: impl FnOnce(Option<&FastVariant>) -> R,
    ) -> Option<R> {
        let slot = self.slot_const(index)?;
        // SAFETY: the array is borrowed immutably for the whole callback.
        Some(unsafe { variant::with_borrowed(*Variant::borrow_sys(slot).content(), use_value) })
    }

    /// Overwrites the element at `index` after checking the element type.
    pub fn set(&mut self, index: usize, value: &Variant) -> ContainerResult<()> {
        let len = self.len();
        if index >= len {
            return Err(ContainerError::IndexOutOfBounds { index, len });
        }
        self.check_element(index, value)?;
        // SAFETY: index is in bounds; assignment drops the old value through the engine.
        unsafe {
            let slot = (sys::interface().fns.array_operator_index)(self.sys_mut(), index as i64);
            *(slot as *mut Variant) = value.clone();
        }
        Ok(())
    }

    /// Appends through the engine. A typed array rejects mismatching values engine-side.
    pub fn push(&mut self, value: &Variant) {
        let args: [ConstTypePtr; 1] = [value.sys()];
        // SAFETY: push_back takes one Variant and returns nothing.
        unsafe { PUSH_BACK.call(self.sys_mut(), &args, std::ptr::null_mut()) };
    }

    /// Appends after a host-side element type check.
    pub fn try_push(&mut self, value: &Variant) -> ContainerResult<()> {
        self.check_element(self.len(), value)?;
        self.push(value);
        Ok(())
    }

    pub fn resize(&mut self, len: usize) {
        let len = len as i64;
        let args: [ConstTypePtr; 1] = [&len as *const i64 as ConstTypePtr];
        let mut result: i64 = 0;
        unsafe { RESIZE.call(self.sys_mut(), &args, &mut result as *mut i64 as TypePtr) };
    }

    pub fn clear(&mut self) {
        unsafe { CLEAR.call(self.sys_mut(), &[], std::ptr::null_mut()) };
    }

    /// Element constraint reported by the engine.
    pub fn element_type(&self) -> ElementType {
        if !IS_TYPED.call_bool(self.sys()) {
            return ElementType::Untyped;
        }
        let gtype = GET_TYPED_BUILTIN.call_int(self.sys());
        // SAFETY: the method writes a StringName into the fresh slot.
        let class_name = unsafe {
            StringName::new_with_uninit(|dst| {
                GET_TYPED_CLASS_NAME.call(self.sys() as TypePtr, &[], dst)
            })
        };
        ElementType::from_engine(gtype, class_name.to_string())
    }

    pub fn is_typed(&self) -> bool {
        IS_TYPED.call_bool(self.sys())
    }

    /// Constrains an empty array to `element`.
    pub fn set_typed(&mut self, element: &ElementType) {
        if !element.is_typed() {
            return;
        }
        let class_name = StringName::from(element.class_name().unwrap_or(""));
        let script = Variant::nil();
        unsafe {
            (sys::interface().fns.array_set_typed)(
                self.sys_mut(),
                element.gtype().to_sys(),
                class_name.sys(),
                script.sys(),
            )
        };
    }

    /// Checks every element against `element`.
    pub fn validate_elements(&self, element: &ElementType) -> ContainerResult<()> {
        for (index, value) in self.iter().enumerate() {
            if !element.accepts(&value) {
                return Err(ContainerError::ElementTypeMismatch {
                    index,
                    expected: element.to_string(),
                    found: ElementType::describe_value(&value),
                });
            }
        }
        Ok(())
    }

    /// Copies of the elements, front to back.
    pub fn iter(&self) -> impl Iterator<Item = Variant> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    pub fn to_vec(&self) -> Vec<Variant> {
        self.iter().collect()
    }

    fn check_element(&self, index: usize, value: &Variant) -> ContainerResult<()> {
        let element = self.element_type();
        if element.accepts(value) {
            Ok(())
        } else {
            Err(ContainerError::ElementTypeMismatch {
                index,
                expected: element.to_string(),
                found: ElementType::describe_value(value),
            })
        }
    }

    fn slot_const(&self, index: usize) -> Option<sys::ConstVariantPtr> {
        if index >= self.len() {
            return None;
        }
        // SAFETY: index is in bounds.
        let slot = unsafe { (sys::interface().fns.array_operator_index_const)(self.sys(), index as i64) };
        (!slot.is_null()).then_some(slot as sys::ConstVariantPtr)
    }
}

impl Default for VariantArray {
    fn default() -> Self {
        Self::new()
    }
}

impl VariantType for VariantArray {
    const GTYPE: GType = GType::Array;
}

impl std::fmt::Debug for VariantArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl FromIterator<Variant> for VariantArray {
    fn from_iter<I: IntoIterator<Item = Variant>>(iter: I) -> Self {
        let mut array = Self::new();
        for value in iter {
            array.push(&value);
        }
        array
    }
}

impl<T: ToVariant> From<&[T]> for VariantArray {
    fn from(values: &[T]) -> Self {
        values.iter().map(ToVariant::to_variant).collect()
    }
}

/// Element-wise conversion; the first failing element is reported with its index.
impl<T: FromVariant> FromVariant for Vec<T> {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        let array = VariantArray::from_variant(variant)?;
        array
            .iter()
            .enumerate()
            .map(|(index, value)| {
                T::from_variant(&value).map_err(|err| ConversionError::element(index, err))
            })
            .collect()
    }
}

/// Encodes as an array typed after `T`.
impl<T: ToVariant + VariantType> ToVariant for Vec<T> {
    fn to_variant(&self) -> Variant {
        let mut array = VariantArray::new_typed(&ElementType::of::<T>());
        for value in self {
            array.push(&value.to_variant());
        }
        array.to_variant()
    }
}

impl<T: VariantType> VariantType for Vec<T> {
    const GTYPE: GType = GType::Array;

    fn property_hint() -> (crate::registry::PropertyHint, String) {
        let element = ElementType::of::<T>();
        if element.is_typed() {
            (crate::registry::PropertyHint::ArrayType, element.to_string())
        } else {
            (crate::registry::PropertyHint::None, String::new())
        }
    }
}
