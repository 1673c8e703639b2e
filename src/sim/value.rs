//! 模拟引擎的 Variant 负载
//!
//! 第 0 个字是类型标签，nil 为全零。其余字按类型解释：
//! - `bool` / `int` / `float` 放在第 1 个字
//! - 装得下的数学类型内联存放，更大的放在堆上的块里
//! - 字符串、容器、可调用对象存放引用计数句柄（`Arc` 裸指针）
//! - 紧凑数组存放独占的堆指针，复制时深拷贝
//! - 对象存放指针与实例 id；引用计数对象由负载持有一个引用

use super::containers::{self, PackedData, SharedArray, SharedDict};
use super::objects::{self, CallableData, SignalData};
use crate::builtins::Real;
use crate::variant::{GType, VARIANT_WORDS};
use std::collections::HashMap;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

pub(crate) type Words = [u64; VARIANT_WORDS];

pub(crate) const NIL: Words = [0; VARIANT_WORDS];

const INLINE_BYTES: usize = (VARIANT_WORDS - 1) * 8;
const REAL: usize = std::mem::size_of::<Real>();

/// Heap block for math types that do not fit inline (largest: double `Projection`).
type PodBlock = [u64; 16];

pub(crate) fn tag(words: &Words) -> GType {
    GType::from_sys(words[0] as u32).unwrap_or(GType::Nil)
}

/// Byte size of a plain-data builtin; `None` for handle types.
pub(crate) fn pod_size(gtype: GType) -> Option<usize> {
    let size = match gtype {
        GType::Vector2 => 2 * REAL,
        GType::Vector2i => 8,
        GType::Rect2 => 4 * REAL,
        GType::Rect2i => 16,
        GType::Vector3 => 3 * REAL,
        GType::Vector3i => 12,
        GType::Transform2D => 6 * REAL,
        GType::Vector4 => 4 * REAL,
        GType::Vector4i => 16,
        GType::Plane => 4 * REAL,
        GType::Quaternion => 4 * REAL,
        GType::Aabb => 6 * REAL,
        GType::Basis => 9 * REAL,
        GType::Transform3D => 12 * REAL,
        GType::Projection => 16 * REAL,
        GType::Color => 16,
        GType::Rid => 8,
        _ => return None,
    };
    Some(size)
}

fn is_heap_pod(gtype: GType) -> bool {
    pod_size(gtype).map_or(false, |size| size > INLINE_BYTES)
}

fn header(gtype: GType) -> Words {
    let mut words = NIL;
    words[0] = gtype.to_sys() as u64;
    words
}

pub(crate) fn make_bool(value: bool) -> Words {
    let mut words = header(GType::Bool);
    words[1] = u64::from(value);
    words
}

pub(crate) fn make_int(value: i64) -> Words {
    let mut words = header(GType::Int);
    words[1] = value as u64;
    words
}

pub(crate) fn make_float(value: f64) -> Words {
    let mut words = header(GType::Float);
    words[1] = value.to_bits();
    words
}

pub(crate) fn make_string(text: &str) -> Words {
    let mut words = header(GType::String);
    words[1] = string_new(text) as u64;
    words
}

pub(crate) fn make_string_name(text: &str) -> Words {
    let mut words = header(GType::StringName);
    words[1] = intern(text) as u64;
    words
}

/// Takes ownership of a fresh array handle.
pub(crate) fn make_array(handle: usize) -> Words {
    let mut words = header(GType::Array);
    words[1] = handle as u64;
    words
}

/// Plain-data payload from the builtin's byte representation.
///
/// # Safety
/// `src` must point to `pod_size(gtype)` readable bytes.
pub(crate) unsafe fn make_pod(gtype: GType, src: *const u8) -> Words {
    let size = pod_size(gtype).unwrap_or(0);
    let mut words = header(gtype);
    if size <= INLINE_BYTES {
        std::ptr::copy_nonoverlapping(src, words.as_mut_ptr().add(1) as *mut u8, size);
    } else {
        let mut block: Box<PodBlock> = Box::new([0; 16]);
        std::ptr::copy_nonoverlapping(src, block.as_mut_ptr() as *mut u8, size);
        words[1] = Box::into_raw(block) as u64;
    }
    words
}

/// Byte representation of a plain-data payload.
pub(crate) fn pod_bytes(words: &Words) -> &[u8] {
    let gtype = tag(words);
    let size = pod_size(gtype).unwrap_or(0);
    if is_heap_pod(gtype) {
        // SAFETY: heap payloads own a live block for as long as `words` is not destroyed.
        unsafe { std::slice::from_raw_parts(words[1] as *const u8, size) }
    } else {
        &bytemuck::cast_slice::<u64, u8>(&words[1..])[..size]
    }
}

pub(crate) fn as_bool(words: &Words) -> Option<bool> {
    (tag(words) == GType::Bool).then_some(words[1] != 0)
}

pub(crate) fn as_int(words: &Words) -> Option<i64> {
    (tag(words) == GType::Int).then_some(words[1] as i64)
}

pub(crate) fn as_float(words: &Words) -> Option<f64> {
    (tag(words) == GType::Float).then_some(f64::from_bits(words[1]))
}

/// Int or float, widened.
pub(crate) fn as_number(words: &Words) -> Option<f64> {
    as_float(words).or_else(|| as_int(words).map(|value| value as f64))
}

/// Text of a String, StringName or NodePath payload.
pub(crate) fn as_text(words: &Words) -> Option<String> {
    match tag(words) {
        GType::String | GType::StringName | GType::NodePath => {
            // SAFETY: string payloads hold a live handle.
            Some(unsafe { string_text(words[1] as usize) }.to_string())
        }
        _ => None,
    }
}

pub(crate) fn handle(words: &Words) -> usize {
    words[1] as usize
}

// ---- handles -------------------------------------------------------------

/// # Safety
/// `handle` must be zero or come from `Arc::<T>::into_raw`.
pub(crate) unsafe fn retain<T>(handle: usize) {
    if handle != 0 {
        Arc::increment_strong_count(handle as *const T);
    }
}

/// # Safety
/// `handle` must be zero or an owned reference from `Arc::<T>::into_raw`.
pub(crate) unsafe fn release<T>(handle: usize) {
    if handle != 0 {
        drop(Arc::from_raw(handle as *const T));
    }
}

/// # Safety
/// `handle` must be zero or a live `Arc::<T>` handle.
pub(crate) unsafe fn strong_count<T>(handle: usize) -> usize {
    if handle == 0 {
        return 0;
    }
    let arc = ManuallyDrop::new(Arc::from_raw(handle as *const T));
    Arc::strong_count(&arc)
}

pub(crate) fn string_new(text: &str) -> usize {
    Arc::into_raw(Arc::new(text.to_string())) as usize
}

/// # Safety
/// `handle` must be zero or a live string handle that outlives `'a`.
pub(crate) unsafe fn string_text<'a>(handle: usize) -> &'a str {
    if handle == 0 {
        ""
    } else {
        (*(handle as *const String)).as_str()
    }
}

/// Reads the text behind a `String`/`StringName`/`NodePath` type pointer.
///
/// # Safety
/// `ptr` must be null or point to a live string handle.
pub(crate) unsafe fn text_at(ptr: *const c_void) -> String {
    if ptr.is_null() {
        return String::new();
    }
    string_text(*(ptr as *const usize)).to_string()
}

fn name_table() -> &'static Mutex<HashMap<String, usize>> {
    static NAMES: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();
    NAMES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Interned handle for `text`, with one reference for the caller.
pub(crate) fn intern(text: &str) -> usize {
    let mut table = name_table().lock().unwrap_or_else(PoisonError::into_inner);
    let handle = *table
        .entry(text.to_string())
        .or_insert_with(|| string_new(text));
    // SAFETY: the table keeps its own reference alive.
    unsafe { retain::<String>(handle) };
    handle
}

// ---- payload lifecycle -----------------------------------------------------

/// Engine copy constructor: a new payload with its own references.
pub(crate) fn copy_words(words: &Words) -> Words {
    let gtype = tag(words);
    let handle = handle(words);
    // SAFETY: a payload of this tag holds a live handle of the matching kind.
    unsafe {
        match gtype {
            GType::String | GType::StringName | GType::NodePath => retain::<String>(handle),
            GType::Array => retain::<SharedArray>(handle),
            GType::Dictionary => retain::<SharedDict>(handle),
            GType::Callable => retain::<CallableData>(handle),
            GType::Signal => retain::<SignalData>(handle),
            GType::Object => return objects::object_words(handle),
            gtype if gtype.is_packed_array() => {
                let mut copy = *words;
                copy[1] = PackedData::deep_copy(handle) as u64;
                return copy;
            }
            gtype if is_heap_pod(gtype) => return make_pod(gtype, pod_bytes(words).as_ptr()),
            _ => {}
        }
    }
    *words
}

/// Engine destructor. May call back into the extension, so it never runs under a lock.
pub(crate) fn destroy_words(words: Words) {
    let gtype = tag(&words);
    let handle = handle(&words);
    // SAFETY: the payload owns exactly one reference of the matching kind.
    unsafe {
        match gtype {
            GType::String | GType::StringName | GType::NodePath => release::<String>(handle),
            GType::Array => release::<SharedArray>(handle),
            GType::Dictionary => release::<SharedDict>(handle),
            GType::Callable => release::<CallableData>(handle),
            GType::Signal => release::<SignalData>(handle),
            GType::Object => objects::release_variant_reference(handle, words[2]),
            gtype if gtype.is_packed_array() => PackedData::free(handle),
            gtype if is_heap_pod(gtype) => drop(Box::from_raw(handle as *mut PodBlock)),
            _ => {}
        }
    }
}

/// Destroys a batch of payloads collected under a lock.
pub(crate) fn destroy_all(batch: impl IntoIterator<Item = Words>) {
    for words in batch {
        destroy_words(words);
    }
}

// ---- typed representations -------------------------------------------------

/// Builds a payload from a builtin value (the from-type constructor).
///
/// # Safety
/// `src` must point to a valid value with the engine layout of `gtype`.
pub(crate) unsafe fn from_type(gtype: GType, src: *const c_void) -> Words {
    match gtype {
        GType::Nil => NIL,
        GType::Bool => make_bool(*(src as *const u8) != 0),
        GType::Int => make_int(*(src as *const i64)),
        GType::Float => make_float(*(src as *const f64)),
        GType::Object => objects::object_words(*(src as *const usize)),
        gtype if pod_size(gtype).is_some() => make_pod(gtype, src as *const u8),
        gtype => {
            let mut words = header(gtype);
            let handle = *(src as *const usize);
            words[1] = if gtype.is_packed_array() {
                PackedData::deep_copy(handle) as u64
            } else {
                retain_typed(gtype, handle);
                handle as u64
            };
            words
        }
    }
}

/// Writes the builtin value of a payload (the to-type constructor).
///
/// # Safety
/// `dst` must be writable storage for the engine layout of `gtype`.
pub(crate) unsafe fn to_type(gtype: GType, words: &Words, dst: *mut c_void) {
    if tag(words) != gtype {
        type_default(gtype, dst);
        return;
    }
    match gtype {
        GType::Nil => {}
        GType::Bool => *(dst as *mut u8) = words[1] as u8,
        GType::Int | GType::Float => *(dst as *mut u64) = words[1],
        GType::Object => *(dst as *mut usize) = handle(words),
        gtype if pod_size(gtype).is_some() => {
            let bytes = pod_bytes(words);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst as *mut u8, bytes.len());
        }
        gtype => write_handle(gtype, dst, handle(words)),
    }
}

/// Default-constructs a builtin in place.
///
/// # Safety
/// `dst` must be writable storage for the engine layout of `gtype`.
pub(crate) unsafe fn type_default(gtype: GType, dst: *mut c_void) {
    match gtype {
        GType::Nil => {}
        GType::Bool => *(dst as *mut u8) = 0,
        GType::Int | GType::Float | GType::Object => *(dst as *mut u64) = 0,
        GType::String | GType::NodePath => *(dst as *mut usize) = string_new(""),
        GType::StringName => *(dst as *mut usize) = intern(""),
        GType::Array => *(dst as *mut usize) = containers::array_new(),
        GType::Dictionary => *(dst as *mut usize) = containers::dict_new(),
        GType::Callable | GType::Signal => *(dst as *mut [usize; 2]) = [0, 0],
        gtype if gtype.is_packed_array() => {
            *(dst as *mut [usize; 2]) = [PackedData::new(gtype).into_handle(), 0]
        }
        gtype => {
            let size = pod_size(gtype).unwrap_or(0);
            std::ptr::write_bytes(dst as *mut u8, 0, size);
        }
    }
}

/// Copy-constructs a builtin in place.
///
/// # Safety
/// `src` must hold a valid value of `gtype`; `dst` must be writable storage for it.
pub(crate) unsafe fn type_copy(gtype: GType, dst: *mut c_void, src: *const c_void) {
    match gtype {
        GType::Nil => {}
        GType::Bool => *(dst as *mut u8) = *(src as *const u8),
        GType::Int | GType::Float | GType::Object => *(dst as *mut u64) = *(src as *const u64),
        gtype if pod_size(gtype).is_some() => {
            let size = pod_size(gtype).unwrap_or(0);
            std::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, size);
        }
        gtype => write_handle(gtype, dst, *(src as *const usize)),
    }
}

/// Releases a builtin in place.
///
/// # Safety
/// `ptr` must hold a valid value of `gtype` that is not used afterwards.
pub(crate) unsafe fn type_release(gtype: GType, ptr: *mut c_void) {
    let handle = *(ptr as *const usize);
    match gtype {
        GType::String | GType::StringName | GType::NodePath => release::<String>(handle),
        GType::Array => release::<SharedArray>(handle),
        GType::Dictionary => release::<SharedDict>(handle),
        GType::Callable => release::<CallableData>(handle),
        GType::Signal => release::<SignalData>(handle),
        gtype if gtype.is_packed_array() => PackedData::free(handle),
        _ => return,
    }
    *(ptr as *mut usize) = 0;
}

/// Writes a new reference to `handle` in the builtin's layout.
unsafe fn write_handle(gtype: GType, dst: *mut c_void, handle: usize) {
    match gtype {
        gtype if gtype.is_packed_array() => {
            *(dst as *mut [usize; 2]) = [PackedData::deep_copy(handle), 0];
        }
        GType::Callable | GType::Signal => {
            retain_typed(gtype, handle);
            *(dst as *mut [usize; 2]) = [handle, 0];
        }
        _ => {
            retain_typed(gtype, handle);
            *(dst as *mut usize) = handle;
        }
    }
}

unsafe fn retain_typed(gtype: GType, handle: usize) {
    match gtype {
        GType::String | GType::StringName | GType::NodePath => retain::<String>(handle),
        GType::Array => retain::<SharedArray>(handle),
        GType::Dictionary => retain::<SharedDict>(handle),
        GType::Callable => retain::<CallableData>(handle),
        GType::Signal => retain::<SignalData>(handle),
        _ => {}
    }
}

/// Zero value used to fill typed containers.
pub(crate) fn default_words(gtype: GType) -> Words {
    match gtype {
        GType::Nil | GType::Object => NIL,
        GType::Bool => make_bool(false),
        GType::Int => make_int(0),
        GType::Float => make_float(0.0),
        gtype => {
            let mut raw = [0u64; 16];
            let ptr = raw.as_mut_ptr() as *mut c_void;
            // SAFETY: the scratch buffer is large enough for every builtin layout.
            unsafe {
                type_default(gtype, ptr);
                let words = from_type(gtype, ptr);
                type_release(gtype, ptr);
                words
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_never_look_like_nil() {
        assert_ne!(make_bool(false), NIL);
        assert_eq!(as_bool(&make_bool(true)), Some(true));
        assert_eq!(as_int(&make_int(-3)), Some(-3));
        assert_eq!(as_number(&make_int(4)), Some(4.0));
        assert_eq!(tag(&NIL), GType::Nil);
    }

    #[test]
    fn test_interned_names_share_a_handle() {
        let first = intern("sim_value_name");
        let second = intern("sim_value_name");
        assert_eq!(first, second);
        unsafe {
            assert_eq!(string_text(first), "sim_value_name");
            release::<String>(first);
            release::<String>(second);
        }
    }

    #[test]
    fn test_string_copy_shares_storage() {
        let words = make_string("shared");
        let copy = copy_words(&words);
        assert_eq!(handle(&words), handle(&copy));
        assert_eq!(unsafe { strong_count::<String>(handle(&words)) }, 2);
        destroy_words(copy);
        assert_eq!(unsafe { strong_count::<String>(handle(&words)) }, 1);
        destroy_words(words);
    }

    #[test]
    fn test_large_math_types_live_on_the_heap() {
        let bytes = [7u8; 128];
        let words = unsafe { make_pod(GType::Projection, bytes.as_ptr()) };
        let copy = copy_words(&words);
        assert_ne!(handle(&words), handle(&copy));
        assert_eq!(pod_bytes(&words), pod_bytes(&copy));
        assert!(pod_bytes(&copy).iter().all(|byte| *byte == 7));
        destroy_words(copy);
        destroy_words(words);
    }
}
