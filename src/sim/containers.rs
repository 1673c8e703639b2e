//! 模拟引擎的容器
//!
//! `Array` 与 `Dictionary` 复制时共享存储；紧凑数组复制时深拷贝。
//! 类型化容器在引擎侧校验：`push_back` 写入类型不符的元素时记录错误并忽略。
//! 槽位指针在下一次修改前保持有效。

use super::ops;
use super::value::{self, Words, NIL};
use super::{lock, objects};
use crate::builtins::Real;
use crate::sys::{self, ConstTypePtr, Int, TypePtr, VariantPtr, VariantTypeRaw};
use crate::variant::GType;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Element constraint of a typed container side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ElementConstraint {
    pub gtype: GType,
    pub class_name: String,
}

impl ElementConstraint {
    fn from_raw(gtype: VariantTypeRaw, class_name: String) -> Option<Self> {
        match GType::from_sys(gtype) {
            None | Some(GType::Nil) => None,
            Some(GType::Object) if class_name.is_empty() => Some(Self {
                gtype: GType::Object,
                class_name: "Object".to_string(),
            }),
            Some(gtype) => Some(Self { gtype, class_name }),
        }
    }

    pub(crate) fn accepts(&self, words: &Words) -> bool {
        match (self.gtype, value::tag(words)) {
            (GType::Object, GType::Nil) => true,
            (GType::Object, GType::Object) => objects::object_inherits(value::handle(words), &self.class_name),
            (expected, found) => expected == found,
        }
    }

    fn describe(&self) -> &str {
        if self.gtype == GType::Object {
            &self.class_name
        } else {
            self.gtype.name()
        }
    }
}

static REJECTED_WRITES: AtomicUsize = AtomicUsize::new(0);

/// Writes refused by typed containers since startup.
pub fn rejected_writes() -> usize {
    REJECTED_WRITES.load(Ordering::Acquire)
}

fn reject(container: &str, constraint: &ElementConstraint, words: &Words) {
    REJECTED_WRITES.fetch_add(1, Ordering::AcqRel);
    tracing::error!(
        target: "sim",
        "{} typed as {} rejected a {} value",
        container,
        constraint.describe(),
        value::tag(words)
    );
}

// ---- Array -----------------------------------------------------------------

#[derive(Default)]
pub(crate) struct ArrayData {
    pub elements: Vec<Words>,
    pub typed: Option<ElementConstraint>,
}

impl Drop for ArrayData {
    fn drop(&mut self) {
        value::destroy_all(self.elements.drain(..));
    }
}

pub(crate) type SharedArray = Mutex<ArrayData>;

pub(crate) fn array_new() -> usize {
    array_from(ArrayData::default())
}

pub(crate) fn array_from(data: ArrayData) -> usize {
    Arc::into_raw(Arc::new(Mutex::new(data))) as usize
}

/// # Safety
/// `handle` must be a live array handle that outlives `'a`.
pub(crate) unsafe fn array<'a>(handle: usize) -> MutexGuard<'a, ArrayData> {
    lock(&*(handle as *const SharedArray))
}

/// # Safety
/// `ptr` must point to an engine `Array`.
unsafe fn array_at<'a>(ptr: *const c_void) -> MutexGuard<'a, ArrayData> {
    array(*(ptr as *const usize))
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

pub(crate) unsafe extern "C" fn array_operator_index(array: TypePtr, index: Int) -> VariantPtr {
    let mut data = array_at(array);
    match resolve_index(index, data.elements.len()) {
        Some(index) => data.elements.as_mut_ptr().add(index) as VariantPtr,
        None => {
            tracing::error!(target: "sim", "Array index {} out of bounds ({})", index, data.elements.len());
            std::ptr::null_mut()
        }
    }
}

pub(crate) unsafe extern "C" fn array_operator_index_const(array: ConstTypePtr, index: Int) -> VariantPtr {
    array_operator_index(array as TypePtr, index)
}

pub(crate) unsafe extern "C" fn array_set_typed(
    array: TypePtr,
    gtype: VariantTypeRaw,
    class_name: sys::ConstStringNamePtr,
    _script: sys::ConstVariantPtr,
) {
    let class_name = value::text_at(class_name);
    let mut data = array_at(array);
    if !data.elements.is_empty() || data.typed.is_some() {
        tracing::error!(target: "sim", "Array must be empty and untyped to set a type");
        return;
    }
    data.typed = ElementConstraint::from_raw(gtype, class_name);
}

/// Appends with engine-side validation; mismatches are logged and dropped.
pub(crate) fn array_push(handle: usize, words: &Words) -> bool {
    // SAFETY: callers hold a reference to the array.
    let mut data = unsafe { array(handle) };
    if let Some(constraint) = &data.typed {
        if !constraint.accepts(words) {
            reject("Array", constraint, words);
            return false;
        }
    }
    data.elements.push(value::copy_words(words));
    true
}

pub(crate) fn array_resize(handle: usize, len: usize) {
    let removed = {
        // SAFETY: callers hold a reference to the array.
        let mut data = unsafe { array(handle) };
        if len <= data.elements.len() {
            data.elements.split_off(len)
        } else {
            let fill = data
                .typed
                .as_ref()
                .map_or(GType::Nil, |constraint| constraint.gtype);
            while data.elements.len() < len {
                data.elements.push(value::default_words(fill));
            }
            Vec::new()
        }
    };
    value::destroy_all(removed);
}

pub(crate) fn array_clear(handle: usize) {
    // SAFETY: callers hold a reference to the array.
    let removed = std::mem::take(unsafe { &mut array(handle).elements });
    value::destroy_all(removed);
}

pub(crate) fn array_len(handle: usize) -> usize {
    unsafe { array(handle).elements.len() }
}

/// Copies of the elements.
pub(crate) fn array_snapshot(handle: usize) -> Vec<Words> {
    let data = unsafe { array(handle) };
    data.elements.iter().map(value::copy_words).collect()
}

/// Replaces the element at `index`; `Err(true)` when out of bounds, `Err(false)` when rejected.
pub(crate) fn array_set(handle: usize, index: i64, words: &Words) -> Result<(), bool> {
    let old = {
        let mut data = unsafe { array(handle) };
        let index = resolve_index(index, data.elements.len()).ok_or(true)?;
        if let Some(constraint) = &data.typed {
            if !constraint.accepts(words) {
                reject("Array", constraint, words);
                return Err(false);
            }
        }
        std::mem::replace(&mut data.elements[index], value::copy_words(words))
    };
    value::destroy_words(old);
    Ok(())
}

pub(crate) fn array_get(handle: usize, index: i64) -> Option<Words> {
    let data = unsafe { array(handle) };
    let index = resolve_index(index, data.elements.len())?;
    Some(value::copy_words(&data.elements[index]))
}

// ---- Dictionary ------------------------------------------------------------

pub(crate) struct Entry {
    pub key: Words,
    pub value: Words,
}

#[derive(Default)]
pub(crate) struct DictData {
    /// Boxed so that value slots stay put while other keys are inserted.
    pub entries: Vec<Box<Entry>>,
    pub key_type: Option<ElementConstraint>,
    pub value_type: Option<ElementConstraint>,
}

impl DictData {
    pub(crate) fn find(&self, key: &Words) -> Option<usize> {
        self.entries.iter().position(|entry| ops::keys_match(&entry.key, key))
    }
}

impl Drop for DictData {
    fn drop(&mut self) {
        for entry in self.entries.drain(..) {
            value::destroy_words(entry.key);
            value::destroy_words(entry.value);
        }
    }
}

pub(crate) type SharedDict = Mutex<DictData>;

pub(crate) fn dict_new() -> usize {
    Arc::into_raw(Arc::new(Mutex::new(DictData::default()))) as usize
}

/// # Safety
/// `handle` must be a live dictionary handle that outlives `'a`.
pub(crate) unsafe fn dict<'a>(handle: usize) -> MutexGuard<'a, DictData> {
    lock(&*(handle as *const SharedDict))
}

unsafe fn dict_at<'a>(ptr: *const c_void) -> MutexGuard<'a, DictData> {
    dict(*(ptr as *const usize))
}

pub(crate) unsafe extern "C" fn dictionary_operator_index(dictionary: TypePtr, key: sys::ConstVariantPtr) -> VariantPtr {
    let key = &*(key as *const Words);
    let mut data = dict_at(dictionary);
    let index = match data.find(key) {
        Some(index) => index,
        None => {
            if let Some(constraint) = &data.key_type {
                if !constraint.accepts(key) {
                    reject("Dictionary key", constraint, key);
                    return std::ptr::null_mut();
                }
            }
            data.entries.push(Box::new(Entry {
                key: value::copy_words(key),
                value: NIL,
            }));
            data.entries.len() - 1
        }
    };
    &mut data.entries[index].value as *mut Words as VariantPtr
}

pub(crate) unsafe extern "C" fn dictionary_operator_index_const(
    dictionary: ConstTypePtr,
    key: sys::ConstVariantPtr,
) -> VariantPtr {
    let key = &*(key as *const Words);
    let mut data = dict_at(dictionary);
    match data.find(key) {
        Some(index) => &mut data.entries[index].value as *mut Words as VariantPtr,
        None => std::ptr::null_mut(),
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) unsafe extern "C" fn dictionary_set_typed(
    dictionary: TypePtr,
    key_type: VariantTypeRaw,
    key_class_name: sys::ConstStringNamePtr,
    _key_script: sys::ConstVariantPtr,
    value_type: VariantTypeRaw,
    value_class_name: sys::ConstStringNamePtr,
    _value_script: sys::ConstVariantPtr,
) {
    let key_class = value::text_at(key_class_name);
    let value_class = value::text_at(value_class_name);
    let mut data = dict_at(dictionary);
    if !data.entries.is_empty() || data.key_type.is_some() || data.value_type.is_some() {
        tracing::error!(target: "sim", "Dictionary must be empty and untyped to set types");
        return;
    }
    data.key_type = ElementConstraint::from_raw(key_type, key_class);
    data.value_type = ElementConstraint::from_raw(value_type, value_class);
}

/// Inserts with engine-side validation of both sides.
pub(crate) fn dict_insert(handle: usize, key: &Words, value_words: &Words) -> bool {
    let old = {
        let mut data = unsafe { dict(handle) };
        for (constraint, candidate, side) in [
            (&data.key_type, key, "Dictionary key"),
            (&data.value_type, value_words, "Dictionary value"),
        ] {
            if let Some(constraint) = constraint {
                if !constraint.accepts(candidate) {
                    reject(side, constraint, candidate);
                    return false;
                }
            }
        }
        match data.find(key) {
            Some(index) => std::mem::replace(&mut data.entries[index].value, value::copy_words(value_words)),
            None => {
                data.entries.push(Box::new(Entry {
                    key: value::copy_words(key),
                    value: value::copy_words(value_words),
                }));
                NIL
            }
        }
    };
    value::destroy_words(old);
    true
}

pub(crate) fn dict_get(handle: usize, key: &Words) -> Option<Words> {
    let data = unsafe { dict(handle) };
    data.find(key)
        .map(|index| value::copy_words(&data.entries[index].value))
}

pub(crate) fn dict_has(handle: usize, key: &Words) -> bool {
    unsafe { dict(handle) }.find(key).is_some()
}

pub(crate) fn dict_erase(handle: usize, key: &Words) -> bool {
    let removed = {
        let mut data = unsafe { dict(handle) };
        data.find(key).map(|index| data.entries.remove(index))
    };
    match removed {
        Some(entry) => {
            value::destroy_words(entry.key);
            value::destroy_words(entry.value);
            true
        }
        None => false,
    }
}

pub(crate) fn dict_clear(handle: usize) {
    let removed = std::mem::take(unsafe { &mut dict(handle).entries });
    for entry in removed {
        value::destroy_words(entry.key);
        value::destroy_words(entry.value);
    }
}

pub(crate) fn dict_len(handle: usize) -> usize {
    unsafe { dict(handle).entries.len() }
}

/// Copies of the keys or values, in insertion order.
pub(crate) fn dict_column(handle: usize, keys: bool) -> Vec<Words> {
    let data = unsafe { dict(handle) };
    data.entries
        .iter()
        .map(|entry| value::copy_words(if keys { &entry.key } else { &entry.value }))
        .collect()
}

// ---- Packed arrays -----------------------------------------------------------

/// Contiguous storage of one packed element kind.
pub(crate) struct PackedData {
    kind: GType,
    len: usize,
    storage: Vec<u64>,
}

pub(crate) fn element_size(kind: GType) -> usize {
    let real = std::mem::size_of::<Real>();
    match kind {
        GType::PackedByteArray => 1,
        GType::PackedInt32Array | GType::PackedFloat32Array => 4,
        GType::PackedInt64Array | GType::PackedFloat64Array | GType::PackedStringArray => 8,
        GType::PackedVector2Array => 2 * real,
        GType::PackedVector3Array => 3 * real,
        GType::PackedVector4Array => 4 * real,
        GType::PackedColorArray => 16,
        _ => 0,
    }
}

impl PackedData {
    pub(crate) fn new(kind: GType) -> Self {
        Self {
            kind,
            len: 0,
            storage: Vec::new(),
        }
    }

    pub(crate) fn into_handle(self) -> usize {
        Box::into_raw(Box::new(self)) as usize
    }

    /// # Safety
    /// `handle` must be a live packed handle that outlives `'a`.
    pub(crate) unsafe fn get<'a>(handle: usize) -> &'a mut PackedData {
        &mut *(handle as *mut PackedData)
    }

    /// # Safety
    /// `handle` must be zero or a live packed handle.
    pub(crate) unsafe fn deep_copy(handle: usize) -> usize {
        if handle == 0 {
            return 0;
        }
        let source = Self::get(handle);
        if source.kind == GType::PackedStringArray {
            for index in 0..source.len {
                value::retain::<String>(source.string_handle(index));
            }
        }
        PackedData {
            kind: source.kind,
            len: source.len,
            storage: source.storage.clone(),
        }
        .into_handle()
    }

    /// # Safety
    /// `handle` must be zero or an owned packed handle.
    pub(crate) unsafe fn free(handle: usize) {
        if handle != 0 {
            drop(Box::from_raw(handle as *mut PackedData));
        }
    }

    pub(crate) fn kind(&self) -> GType {
        self.kind
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn slot(&mut self, index: usize) -> *mut u8 {
        let offset = index * element_size(self.kind);
        // SAFETY: the offset stays inside the storage for in-bounds indices.
        unsafe { (self.storage.as_mut_ptr() as *mut u8).add(offset) }
    }

    fn string_handle(&self, index: usize) -> usize {
        self.storage[index] as usize
    }

    pub(crate) fn resize(&mut self, len: usize) {
        if self.kind == GType::PackedStringArray {
            for index in len..self.len {
                // SAFETY: every live slot owns one string reference.
                unsafe { value::release::<String>(self.string_handle(index)) };
            }
        }
        let bytes = len * element_size(self.kind);
        self.storage.resize(bytes.div_ceil(8), 0);
        let old_len = self.len;
        self.len = len;
        if self.kind == GType::PackedStringArray {
            for index in old_len..len {
                self.storage[index] = value::string_new("") as u64;
            }
        } else if len > old_len {
            let start = old_len * element_size(self.kind);
            // SAFETY: the range lies inside the freshly resized storage.
            unsafe { std::ptr::write_bytes(self.slot(old_len), 0, bytes - start) };
        }
    }

    /// Element as a Variant payload.
    pub(crate) fn get_words(&mut self, index: usize) -> Words {
        let slot = self.slot(index);
        // SAFETY: index is in bounds and the slot holds an element of this kind.
        unsafe {
            match self.kind {
                GType::PackedByteArray => value::make_int(i64::from(*slot)),
                GType::PackedInt32Array => value::make_int(i64::from(std::ptr::read_unaligned(slot as *const i32))),
                GType::PackedInt64Array => value::make_int(std::ptr::read_unaligned(slot as *const i64)),
                GType::PackedFloat32Array => {
                    value::make_float(f64::from(std::ptr::read_unaligned(slot as *const f32)))
                }
                GType::PackedFloat64Array => value::make_float(std::ptr::read_unaligned(slot as *const f64)),
                GType::PackedStringArray => value::from_type(GType::String, slot as *const c_void),
                kind => value::make_pod(packed_element_type(kind), slot),
            }
        }
    }

    /// Writes a Variant payload into an element; `false` when the type does not fit.
    pub(crate) fn set_words(&mut self, index: usize, words: &Words) -> bool {
        let slot = self.slot(index);
        // SAFETY: index is in bounds and the slot holds an element of this kind.
        unsafe {
            match self.kind {
                GType::PackedByteArray => match value::as_int(words) {
                    Some(v) => *slot = v as u8,
                    None => return false,
                },
                GType::PackedInt32Array => match value::as_int(words) {
                    Some(v) => std::ptr::write_unaligned(slot as *mut i32, v as i32),
                    None => return false,
                },
                GType::PackedInt64Array => match value::as_int(words) {
                    Some(v) => std::ptr::write_unaligned(slot as *mut i64, v),
                    None => return false,
                },
                GType::PackedFloat32Array => match value::as_number(words) {
                    Some(v) => std::ptr::write_unaligned(slot as *mut f32, v as f32),
                    None => return false,
                },
                GType::PackedFloat64Array => match value::as_number(words) {
                    Some(v) => std::ptr::write_unaligned(slot as *mut f64, v),
                    None => return false,
                },
                GType::PackedStringArray => match value::as_text(words) {
                    Some(text) => {
                        value::release::<String>(*(slot as *const usize));
                        *(slot as *mut usize) = value::string_new(&text);
                    }
                    None => return false,
                },
                kind => {
                    if value::tag(words) != packed_element_type(kind) {
                        return false;
                    }
                    let bytes = value::pod_bytes(words);
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), slot, bytes.len());
                }
            }
        }
        true
    }

    /// Raw element bytes, for equality and hashing.
    pub(crate) fn bytes(&self) -> &[u8] {
        let len = self.len * element_size(self.kind);
        &bytemuck::cast_slice::<u64, u8>(&self.storage)[..len]
    }

    /// String elements of a `PackedStringArray`.
    pub(crate) fn strings(&self) -> Vec<String> {
        (0..self.len)
            // SAFETY: every slot owns a live string handle.
            .map(|index| unsafe { value::string_text(self.string_handle(index)) }.to_string())
            .collect()
    }
}

impl Drop for PackedData {
    fn drop(&mut self) {
        if self.kind == GType::PackedStringArray {
            for index in 0..self.len {
                unsafe { value::release::<String>(self.string_handle(index)) };
            }
        }
    }
}

/// Element builtin of the math packed kinds.
pub(crate) fn packed_element_type(kind: GType) -> GType {
    match kind {
        GType::PackedVector2Array => GType::Vector2,
        GType::PackedVector3Array => GType::Vector3,
        GType::PackedVector4Array => GType::Vector4,
        GType::PackedColorArray => GType::Color,
        GType::PackedByteArray | GType::PackedInt32Array | GType::PackedInt64Array => GType::Int,
        GType::PackedFloat32Array | GType::PackedFloat64Array => GType::Float,
        GType::PackedStringArray => GType::String,
        _ => GType::Nil,
    }
}

/// `packed_*_array_operator_index` for every kind.
pub(crate) unsafe extern "C" fn packed_operator_index(array: TypePtr, index: Int) -> TypePtr {
    let data = PackedData::get(*(array as *const usize));
    if index < 0 || index as usize >= data.len() {
        tracing::error!(target: "sim", "{} index {} out of bounds ({})", data.kind(), index, data.len());
        return std::ptr::null_mut();
    }
    data.slot(index as usize) as TypePtr
}

pub(crate) unsafe extern "C" fn packed_operator_index_const(array: ConstTypePtr, index: Int) -> TypePtr {
    packed_operator_index(array as TypePtr, index)
}

// ---- builtin methods -----------------------------------------------------------

unsafe fn write_int(ret: TypePtr, value: i64) {
    if !ret.is_null() {
        *(ret as *mut i64) = value;
    }
}

unsafe fn write_bool(ret: TypePtr, value: bool) {
    if !ret.is_null() {
        *(ret as *mut sys::Bool) = sys::to_bool(value);
    }
}

unsafe fn write_name(ret: TypePtr, text: &str) {
    if !ret.is_null() {
        *(ret as *mut usize) = value::intern(text);
    }
}

unsafe fn handle_of(base: TypePtr) -> usize {
    *(base as *const usize)
}

unsafe fn variant_arg<'a>(args: *const ConstTypePtr, index: usize) -> &'a Words {
    &*(*args.add(index) as *const Words)
}

pub(crate) unsafe extern "C" fn array_size(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_int(ret, array_len(handle_of(base)) as i64);
}

pub(crate) unsafe extern "C" fn array_clear_method(base: TypePtr, _args: *const ConstTypePtr, _ret: TypePtr, _argc: i32) {
    array_clear(handle_of(base));
}

pub(crate) unsafe extern "C" fn array_resize_method(base: TypePtr, args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let len = *(*args as *const i64);
    if len < 0 {
        write_int(ret, 31);
        return;
    }
    array_resize(handle_of(base), len as usize);
    write_int(ret, 0);
}

pub(crate) unsafe extern "C" fn array_push_back(base: TypePtr, args: *const ConstTypePtr, _ret: TypePtr, _argc: i32) {
    array_push(handle_of(base), variant_arg(args, 0));
}

pub(crate) unsafe extern "C" fn array_is_typed(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_bool(ret, array(handle_of(base)).typed.is_some());
}

pub(crate) unsafe extern "C" fn array_get_typed_builtin(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let gtype = array(handle_of(base)).typed.as_ref().map_or(GType::Nil, |c| c.gtype);
    write_int(ret, gtype.to_sys() as i64);
}

pub(crate) unsafe extern "C" fn array_get_typed_class_name(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let class_name = array(handle_of(base))
        .typed
        .as_ref()
        .filter(|c| c.gtype == GType::Object)
        .map(|c| c.class_name.clone())
        .unwrap_or_default();
    write_name(ret, &class_name);
}

pub(crate) unsafe extern "C" fn dict_size(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_int(ret, dict_len(handle_of(base)) as i64);
}

pub(crate) unsafe extern "C" fn dict_clear_method(base: TypePtr, _args: *const ConstTypePtr, _ret: TypePtr, _argc: i32) {
    dict_clear(handle_of(base));
}

pub(crate) unsafe extern "C" fn dict_has_method(base: TypePtr, args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_bool(ret, dict_has(handle_of(base), variant_arg(args, 0)));
}

pub(crate) unsafe extern "C" fn dict_erase_method(base: TypePtr, args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_bool(ret, dict_erase(handle_of(base), variant_arg(args, 0)));
}

unsafe fn write_column(base: TypePtr, ret: TypePtr, keys: bool) {
    let elements = dict_column(handle_of(base), keys);
    let handle = array_from(ArrayData {
        elements,
        typed: None,
    });
    if ret.is_null() {
        value::release::<SharedArray>(handle);
    } else {
        *(ret as *mut usize) = handle;
    }
}

pub(crate) unsafe extern "C" fn dict_keys(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_column(base, ret, true);
}

pub(crate) unsafe extern "C" fn dict_values(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_column(base, ret, false);
}

unsafe fn dict_constraint(base: TypePtr, key_side: bool) -> Option<ElementConstraint> {
    let data = dict(handle_of(base));
    if key_side {
        data.key_type.clone()
    } else {
        data.value_type.clone()
    }
}

pub(crate) unsafe extern "C" fn dict_is_typed_key(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_bool(ret, dict_constraint(base, true).is_some());
}

pub(crate) unsafe extern "C" fn dict_is_typed_value(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_bool(ret, dict_constraint(base, false).is_some());
}

pub(crate) unsafe extern "C" fn dict_get_typed_key_builtin(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let gtype = dict_constraint(base, true).map_or(GType::Nil, |c| c.gtype);
    write_int(ret, gtype.to_sys() as i64);
}

pub(crate) unsafe extern "C" fn dict_get_typed_value_builtin(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let gtype = dict_constraint(base, false).map_or(GType::Nil, |c| c.gtype);
    write_int(ret, gtype.to_sys() as i64);
}

pub(crate) unsafe extern "C" fn dict_get_typed_key_class_name(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let name = dict_constraint(base, true)
        .filter(|c| c.gtype == GType::Object)
        .map(|c| c.class_name)
        .unwrap_or_default();
    write_name(ret, &name);
}

pub(crate) unsafe extern "C" fn dict_get_typed_value_class_name(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let name = dict_constraint(base, false)
        .filter(|c| c.gtype == GType::Object)
        .map(|c| c.class_name)
        .unwrap_or_default();
    write_name(ret, &name);
}

pub(crate) unsafe extern "C" fn packed_size(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    write_int(ret, PackedData::get(handle_of(base)).len() as i64);
}

pub(crate) unsafe extern "C" fn packed_resize(base: TypePtr, args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let len = *(*args as *const i64);
    if len < 0 {
        write_int(ret, 31);
        return;
    }
    PackedData::get(handle_of(base)).resize(len as usize);
    write_int(ret, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_array_rejects_other_builtins() {
        let handle = array_new();
        unsafe { array(handle) }.typed = ElementConstraint::from_raw(GType::Int.to_sys(), String::new());
        let before = rejected_writes();
        assert!(array_push(handle, &value::make_int(3)));
        assert!(!array_push(handle, &value::make_float(1.5)));
        assert_eq!(array_len(handle), 1);
        assert!(rejected_writes() > before);
        array_resize(handle, 3);
        assert_eq!(array_get(handle, 2).and_then(|w| value::as_int(&w)), Some(0));
        assert_eq!(array_get(handle, -3).and_then(|w| value::as_int(&w)), Some(3));
        unsafe { value::release::<SharedArray>(handle) };
    }

    #[test]
    fn test_dictionary_keeps_insertion_order() {
        let handle = dict_new();
        let (a, b) = (value::make_string("a"), value::make_string("b"));
        assert!(dict_insert(handle, &b, &value::make_int(2)));
        assert!(dict_insert(handle, &a, &value::make_int(1)));
        assert!(dict_insert(handle, &b, &value::make_int(3)));
        let keys: Vec<_> = dict_column(handle, true).into_iter().map(|w| {
            let text = value::as_text(&w);
            value::destroy_words(w);
            text
        }).collect();
        assert_eq!(keys, vec![Some("b".to_string()), Some("a".to_string())]);
        assert_eq!(dict_get(handle, &b).and_then(|w| value::as_int(&w)), Some(3));
        assert!(dict_erase(handle, &a));
        assert!(!dict_has(handle, &a));
        value::destroy_words(a);
        value::destroy_words(b);
        unsafe { value::release::<SharedDict>(handle) };
    }

    #[test]
    fn test_packed_strings_are_deep_copied() {
        let mut data = PackedData::new(GType::PackedStringArray);
        data.resize(2);
        let text = value::make_string("x");
        assert!(data.set_words(1, &text));
        assert!(!data.set_words(0, &value::make_int(1)));
        let handle = data.into_handle();
        let copy = unsafe { PackedData::deep_copy(handle) };
        unsafe {
            assert!(PackedData::get(handle).set_words(1, &value::make_string("y")));
            assert_eq!(PackedData::get(copy).strings(), vec!["".to_string(), "x".to_string()]);
            PackedData::free(copy);
            PackedData::free(handle);
        }
        value::destroy_words(text);
    }
}
