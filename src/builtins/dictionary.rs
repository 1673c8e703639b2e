//! 字典
//!
//! 引擎 `Dictionary` 的句柄，复制时共享存储。类型化字典的键、值约束由引擎保存；
//! 写入前在宿主侧检查，类型不符的写入会被拒绝并记录诊断（与引擎的拒绝语义一致）。

use super::typed_array::container_to_conversion;
use super::{impl_opaque_builtin, BuiltinMethod, ElementType, StringName, VariantArray};
use crate::convert::{FromVariant, ToVariant, VariantType};
use crate::core::diagnostics::{self, DiagnosticKind};
use crate::core::error::{ContainerError, ContainerResult, ConversionResult};
use crate::registry::PropertyHint;
use crate::sys::{self, ConstTypePtr, TypePtr};
use crate::variant::{GType, Variant};
use std::fmt;
use std::marker::PhantomData;

#[repr(transparent)]
pub struct Dictionary {
    opaque: usize,
}

impl_opaque_builtin!(Dictionary, GType::Dictionary);

static SIZE: BuiltinMethod = BuiltinMethod::new(GType::Dictionary, "size", 3173160232);
static CLEAR: BuiltinMethod = BuiltinMethod::new(GType::Dictionary, "clear", 3218959716);
static HAS: BuiltinMethod = BuiltinMethod::new(GType::Dictionary, "has", 3471775634);
static ERASE: BuiltinMethod = BuiltinMethod::new(GType::Dictionary, "erase", 1776646889);
static KEYS: BuiltinMethod = BuiltinMethod::new(GType::Dictionary, "keys", 4144163970);
static VALUES: BuiltinMethod = BuiltinMethod::new(GType::Dictionary, "values", 4144163970);
static IS_TYPED_KEY: BuiltinMethod = BuiltinMethod::new(GType::Dictionary, "is_typed_key", 3918633141);
static IS_TYPED_VALUE: BuiltinMethod =
    BuiltinMethod::new(GType::Dictionary, "is_typed_value", 3918633141);
static KEY_BUILTIN: BuiltinMethod =
    BuiltinMethod::new(GType::Dictionary, "get_typed_key_builtin", 3173160232);
static VALUE_BUILTIN: BuiltinMethod =
    BuiltinMethod::new(GType::Dictionary, "get_typed_value_builtin", 3173160232);
static KEY_CLASS_NAME: BuiltinMethod =
    BuiltinMethod::new(GType::Dictionary, "get_typed_key_class_name", 1825232092);
static VALUE_CLASS_NAME: BuiltinMethod =
    BuiltinMethod::new(GType::Dictionary, "get_typed_value_class_name", 1825232092);

impl Dictionary {
    pub fn new() -> Self {
        Self::engine_default()
    }

    /// Fresh dictionary constrained to the given key and value types.
    pub fn new_typed(key: &ElementType, value: &ElementType) -> Self {
        let mut dict = Self::new();
        dict.set_typed(key, value);
        dict
    }

    pub fn len(&self) -> usize {
        SIZE.call_int(self.sys()).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key<K: ToVariant + ?Sized>(&self, key: &K) -> bool {
        let key = key.to_variant();
        self.has(&key)
    }

    pub fn get<K: ToVariant + ?Sized>(&self, key: &K) -> Option<Variant> {
        let key = key.to_variant();
        if !self.has(&key) {
            return None;
        }
        // SAFETY: the key is present, so the engine returns its slot.
        unsafe {
            let slot = (sys::interface().fns.dictionary_operator_index_const)(self.sys(), key.sys());
            (!slot.is_null()).then(|| Variant::new_copy_from_sys(slot))
        }
    }

    /// Converts the value under `key`; a missing key reads as nil.
    pub fn get_as<T: FromVariant, K: ToVariant + ?Sized>(&self, key: &K) -> ConversionResult<T> {
        let value = self.get(key).unwrap_or_default();
        T::from_variant(&value)
    }

    /// Inserts or overwrites. Values rejected by a typed dictionary are logged and dropped.
    pub fn insert<K: ToVariant + ?Sized, V: ToVariant + ?Sized>(&mut self, key: &K, value: &V) {
        if let Err(err) = self.try_insert(key, value) {
            diagnostics::report(
                DiagnosticKind::TypedContainerRejected,
                "Dictionary",
                err.to_string(),
            );
        }
    }

    /// Inserts or overwrites after checking the key and value constraints.
    pub fn try_insert<K: ToVariant + ?Sized, V: ToVariant + ?Sized>(
        &mut self,
        key: &K,
        value: &V,
    ) -> ContainerResult<()> {
        let key = key.to_variant();
        let value = value.to_variant();
        for (constraint, candidate) in [(self.typed_key(), &key), (self.typed_value(), &value)] {
            if !constraint.accepts(candidate) {
                return Err(ContainerError::ElementTypeMismatch {
                    index: self.len(),
                    expected: constraint.to_string(),
                    found: ElementType::describe_value(candidate),
                });
            }
        }
        // SAFETY: the engine inserts nil for a new key; assignment drops the old value.
        unsafe {
            let slot = (sys::interface().fns.dictionary_operator_index)(self.sys_mut(), key.sys());
            if slot.is_null() {
                return Err(ContainerError::Rejected(key.stringify()));
            }
            *(slot as *mut Variant) = value;
        }
        Ok(())
    }

    /// Removes `key`, returning its value.
    pub fn remove<K: ToVariant + ?Sized>(&mut self, key: &K) -> Option<Variant> {
        let key_variant = key.to_variant();
        let old = self.get(&key_variant)?;
        let args: [ConstTypePtr; 1] = [key_variant.sys()];
        let mut erased = sys::FALSE;
        unsafe { ERASE.call(self.sys_mut(), &args, &mut erased as *mut sys::Bool as TypePtr) };
        sys::from_bool(erased).then_some(old)
    }

    pub fn clear(&mut self) {
        unsafe { CLEAR.call(self.sys_mut(), &[], std::ptr::null_mut()) };
    }

    pub fn keys(&self) -> VariantArray {
        unsafe { VariantArray::new_with_uninit(|dst| KEYS.call(self.sys() as TypePtr, &[], dst)) }
    }

    pub fn values(&self) -> VariantArray {
        unsafe { VariantArray::new_with_uninit(|dst| VALUES.call(self.sys() as TypePtr, &[], dst)) }
    }

    /// Copies of the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Variant, Variant)> + '_ {
        self.keys()
            .to_vec()
            .into_iter()
            .filter_map(move |key| self.get(&key).map(|value| (key, value)))
    }

    pub fn typed_key(&self) -> ElementType {
        Self::constraint(self, &IS_TYPED_KEY, &KEY_BUILTIN, &KEY_CLASS_NAME)
    }

    pub fn typed_value(&self) -> ElementType {
        Self::constraint(self, &IS_TYPED_VALUE, &VALUE_BUILTIN, &VALUE_CLASS_NAME)
    }

    pub fn is_typed(&self) -> bool {
        self.typed_key().is_typed() || self.typed_value().is_typed()
    }

    pub fn set_typed(&mut self, key: &ElementType, value: &ElementType) {
        if !key.is_typed() && !value.is_typed() {
            return;
        }
        let key_class = StringName::from(key.class_name().unwrap_or(""));
        let value_class = StringName::from(value.class_name().unwrap_or(""));
        let script = Variant::nil();
        unsafe {
            (sys::interface().fns.dictionary_set_typed)(
                self.sys_mut(),
                key.gtype().to_sys(),
                key_class.sys(),
                script.sys(),
                value.gtype().to_sys(),
                value_class.sys(),
                script.sys(),
            )
        };
    }

    fn has(&self, key: &Variant) -> bool {
        let args: [ConstTypePtr; 1] = [key.sys()];
        let mut found = sys::FALSE;
        unsafe { HAS.call(self.sys() as TypePtr, &args, &mut found as *mut sys::Bool as TypePtr) };
        sys::from_bool(found)
    }

    fn constraint(
        &self,
        is_typed: &BuiltinMethod,
        builtin: &BuiltinMethod,
        class_name: &BuiltinMethod,
    ) -> ElementType {
        if !is_typed.call_bool(self.sys()) {
            return ElementType::Untyped;
        }
        let gtype = builtin.call_int(self.sys());
        let name = unsafe {
            StringName::new_with_uninit(|dst| class_name.call(self.sys() as TypePtr, &[], dst))
        };
        ElementType::from_engine(gtype, name.to_string())
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl VariantType for Dictionary {
    const GTYPE: GType = GType::Dictionary;
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Dictionary whose key and value constraints are fixed by `K` and `V`.
pub struct TypedDictionary<K, V> {
    dict: Dictionary,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: VariantType, V: VariantType> TypedDictionary<K, V> {
    pub fn new() -> Self {
        Self {
            dict: Dictionary::new_typed(&ElementType::of::<K>(), &ElementType::of::<V>()),
            _marker: PhantomData,
        }
    }

    /// Adopts an engine dictionary.
    ///
    /// A dictionary already typed as `K`/`V` is shared as is; any other dictionary is copied
    /// entry by entry, failing at the first key or value the constraints reject.
    pub fn try_from_dictionary(dict: Dictionary) -> ContainerResult<Self> {
        let key_type = ElementType::of::<K>();
        let value_type = ElementType::of::<V>();
        if dict.typed_key() == key_type && dict.typed_value() == value_type {
            return Ok(Self {
                dict,
                _marker: PhantomData,
            });
        }
        let mut typed = Self::new();
        for (index, (key, value)) in dict.iter().enumerate() {
            for (constraint, candidate) in [(&key_type, &key), (&value_type, &value)] {
                if !constraint.accepts(candidate) {
                    return Err(ContainerError::ElementTypeMismatch {
                        index,
                        expected: constraint.to_string(),
                        found: ElementType::describe_value(candidate),
                    });
                }
            }
            typed.dict.try_insert(&key, &value)?;
        }
        Ok(typed)
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn as_untyped(&self) -> &Dictionary {
        &self.dict
    }

    pub fn into_untyped(self) -> Dictionary {
        self.dict
    }
}

impl<K: VariantType + ToVariant, V: VariantType + ToVariant + FromVariant> TypedDictionary<K, V> {
    pub fn insert(&mut self, key: &K, value: &V) {
        self.dict.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.dict.get(key).and_then(|value| value.to::<V>())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.dict.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.dict.remove(key).and_then(|value| value.to::<V>())
    }
}

impl<K: VariantType + FromVariant, V: VariantType + FromVariant> TypedDictionary<K, V> {
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.dict
            .iter()
            .filter_map(|(key, value)| Some((key.to::<K>()?, value.to::<V>()?)))
    }
}

impl<K: VariantType, V: VariantType> Default for TypedDictionary<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for TypedDictionary<K, V> {
    fn clone(&self) -> Self {
        Self {
            dict: self.dict.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for TypedDictionary<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedDictionary{:?}", self.dict)
    }
}

impl<K, V> ToVariant for TypedDictionary<K, V> {
    fn to_variant(&self) -> Variant {
        self.dict.to_variant()
    }
}

impl<K: VariantType, V: VariantType> FromVariant for TypedDictionary<K, V> {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        let dict = Dictionary::from_variant(variant)?;
        Self::try_from_dictionary(dict).map_err(container_to_conversion)
    }
}

impl<K: VariantType, V: VariantType> VariantType for TypedDictionary<K, V> {
    const GTYPE: GType = GType::Dictionary;

    fn property_hint() -> (PropertyHint, String) {
        (
            PropertyHint::DictionaryType,
            format!("{};{}", ElementType::of::<K>(), ElementType::of::<V>()),
        )
    }
}
