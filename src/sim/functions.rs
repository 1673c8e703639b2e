//! 模拟引擎导出的 Variant、字符串与内建类型函数
//!
//! 每个函数的签名与接口表中的同名字段一致，由 `get_proc_address` 按名称分发。

use super::containers::{self, PackedData};
use super::value::{self, Words, NIL};
use super::{lock, objects, ops};
use crate::sys::{
    self, Bool, CallErrorRaw, ConstStringNamePtr, ConstStringPtr, ConstTypePtr, ConstVariantPtr,
    GodotVersionRaw, Int, PtrBuiltInMethod, PtrConstructor, PtrDestructor,
    TypeFromVariantConstructorFunc, TypePtr, UninitializedStringNamePtr, UninitializedStringPtr,
    UninitializedTypePtr, UninitializedVariantPtr, VariantFromTypeConstructorFunc, VariantOperatorRaw,
    VariantPtr, VariantTypeRaw,
};
use crate::variant::{GType, VariantOperator};
use std::ffi::{c_char, CStr};
use std::sync::Mutex;

unsafe fn words_at<'a>(ptr: ConstVariantPtr) -> &'a Words {
    &*(ptr as *const Words)
}

unsafe fn write_words(dst: UninitializedVariantPtr, words: Words) {
    *(dst as *mut Words) = words;
}

unsafe fn set_flag(flag: *mut Bool, value: bool) {
    if !flag.is_null() {
        *flag = sys::to_bool(value);
    }
}

unsafe fn set_error(error: *mut CallErrorRaw, code: u32) {
    if !error.is_null() {
        *error = CallErrorRaw {
            error: code,
            argument: 0,
            expected: 0,
        };
    }
}

// ---- logging and version -------------------------------------------------------

/// Message forwarded through `print_error` / `print_warning`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMessage {
    pub is_error: bool,
    pub message: String,
    pub function: String,
    pub file: String,
    pub line: i32,
}

static MESSAGES: Mutex<Vec<EngineMessage>> = Mutex::new(Vec::new());

/// Drains the messages the extension printed through the engine.
pub fn take_engine_messages() -> Vec<EngineMessage> {
    std::mem::take(&mut *lock(&MESSAGES))
}

unsafe fn c_text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

unsafe fn record_message(is_error: bool, message: *const c_char, function: *const c_char, file: *const c_char, line: i32) {
    let entry = EngineMessage {
        is_error,
        message: c_text(message),
        function: c_text(function),
        file: c_text(file),
        line,
    };
    if is_error {
        tracing::error!(target: "sim", "{} ({}:{} in {})", entry.message, entry.file, entry.line, entry.function);
    } else {
        tracing::warn!(target: "sim", "{} ({}:{} in {})", entry.message, entry.file, entry.line, entry.function);
    }
    lock(&MESSAGES).push(entry);
}

pub(crate) unsafe extern "C" fn print_error(
    message: *const c_char,
    function: *const c_char,
    file: *const c_char,
    line: i32,
    _notify_editor: Bool,
) {
    record_message(true, message, function, file, line);
}

pub(crate) unsafe extern "C" fn print_warning(
    message: *const c_char,
    function: *const c_char,
    file: *const c_char,
    line: i32,
    _notify_editor: Bool,
) {
    record_message(false, message, function, file, line);
}

pub(crate) unsafe extern "C" fn get_godot_version(out: *mut GodotVersionRaw) {
    static VERSION: &CStr = c"Godot Engine v4.3.stable.sim";
    *out = GodotVersionRaw {
        major: 4,
        minor: 3,
        patch: 0,
        string: VERSION.as_ptr(),
    };
}

// ---- variant functions ------------------------------------------------------------

pub(crate) unsafe extern "C" fn variant_new_copy(dst: UninitializedVariantPtr, src: ConstVariantPtr) {
    write_words(dst, value::copy_words(words_at(src)));
}

pub(crate) unsafe extern "C" fn variant_new_nil(dst: UninitializedVariantPtr) {
    write_words(dst, NIL);
}

pub(crate) unsafe extern "C" fn variant_destroy(variant: VariantPtr) {
    let words = std::mem::replace(&mut *(variant as *mut Words), NIL);
    value::destroy_words(words);
}

pub(crate) unsafe extern "C" fn variant_call(
    base: VariantPtr,
    method: ConstStringNamePtr,
    args: *const ConstVariantPtr,
    argc: Int,
    ret: UninitializedVariantPtr,
    error: *mut CallErrorRaw,
) {
    let method = value::text_at(method);
    let words = *words_at(base);
    let handle = value::handle(&words);
    match value::tag(&words) {
        GType::Object => objects::call_object_method(handle, &method, args, argc, ret, error),
        GType::Callable if method == "call" => objects::call_callable(handle, args, argc, ret, error),
        GType::Signal if method == "emit" => {
            write_words(ret, NIL);
            objects::emit_signal(handle, argc, error);
        }
        _ => {
            let values: Vec<&Words> = (0..argc.max(0) as usize)
                .map(|index| words_at(*args.add(index)))
                .collect();
            match builtin_call(&words, &method, &values) {
                Ok(result) => {
                    write_words(ret, result);
                    set_error(error, sys::CALL_OK);
                }
                Err(code) => {
                    write_words(ret, NIL);
                    set_error(error, code);
                }
            }
        }
    }
}

/// Dynamic calls on builtin values that the bridge and tests rely on.
fn builtin_call(base: &Words, method: &str, args: &[&Words]) -> Result<Words, u32> {
    let handle = value::handle(base);
    let arity = |expected: usize| {
        if args.len() > expected {
            Err(sys::CALL_ERROR_TOO_MANY_ARGUMENTS)
        } else if args.len() < expected {
            Err(sys::CALL_ERROR_TOO_FEW_ARGUMENTS)
        } else {
            Ok(())
        }
    };
    match (value::tag(base), method) {
        (GType::Array, "size") => arity(0).map(|_| value::make_int(containers::array_len(handle) as i64)),
        (GType::Array, "is_empty") => arity(0).map(|_| value::make_bool(containers::array_len(handle) == 0)),
        (GType::Array, "push_back") => {
            arity(1)?;
            containers::array_push(handle, args[0]);
            Ok(NIL)
        }
        (GType::Array, "has") => {
            arity(1)?;
            let found = ops::evaluate(VariantOperator::In, args[0], base);
            Ok(found.unwrap_or_else(|| value::make_bool(false)))
        }
        (GType::Dictionary, "size") => arity(0).map(|_| value::make_int(containers::dict_len(handle) as i64)),
        (GType::Dictionary, "is_empty") => {
            arity(0).map(|_| value::make_bool(containers::dict_len(handle) == 0))
        }
        (GType::Dictionary, "has") => arity(1).map(|_| value::make_bool(containers::dict_has(handle, args[0]))),
        (GType::Dictionary, "erase") => {
            arity(1).map(|_| value::make_bool(containers::dict_erase(handle, args[0])))
        }
        (GType::Dictionary, "keys" | "values") => {
            arity(0)?;
            let elements = containers::dict_column(handle, method == "keys");
            Ok(value::make_array(containers::array_from(containers::ArrayData {
                elements,
                typed: None,
            })))
        }
        (GType::String | GType::StringName, "length") => {
            arity(0)?;
            let text = value::as_text(base).unwrap_or_default();
            Ok(value::make_int(text.chars().count() as i64))
        }
        (GType::String | GType::StringName, "to_upper") => {
            arity(0).map(|_| value::make_string(&value::as_text(base).unwrap_or_default().to_uppercase()))
        }
        (GType::String | GType::StringName, "begins_with") => {
            arity(1)?;
            let prefix = value::as_text(args[0]).ok_or(sys::CALL_ERROR_INVALID_ARGUMENT)?;
            let text = value::as_text(base).unwrap_or_default();
            Ok(value::make_bool(text.starts_with(&prefix)))
        }
        (gtype, "size") if gtype.is_packed_array() => {
            arity(0)?;
            // SAFETY: packed payloads own a live block.
            Ok(value::make_int(unsafe { PackedData::get(handle) }.len() as i64))
        }
        (GType::Callable, "is_null") => arity(0).map(|_| value::make_bool(handle == 0)),
        (GType::Callable, "get_method") => {
            arity(0).map(|_| value::make_string_name(&objects::callable_method_name(handle)))
        }
        _ => Err(sys::CALL_ERROR_INVALID_METHOD),
    }
}

pub(crate) unsafe extern "C" fn variant_evaluate(
    op: VariantOperatorRaw,
    a: ConstVariantPtr,
    b: ConstVariantPtr,
    ret: UninitializedVariantPtr,
    valid: *mut Bool,
) {
    let result = VariantOperator::from_sys(op).and_then(|op| ops::evaluate(op, words_at(a), words_at(b)));
    set_flag(valid, result.is_some());
    write_words(ret, result.unwrap_or(NIL));
}

/// Vector component access: `(component type, component count)`.
fn vector_components(gtype: GType) -> Option<(GType, usize)> {
    match gtype {
        GType::Vector2 => Some((GType::Float, 2)),
        GType::Vector3 => Some((GType::Float, 3)),
        GType::Vector4 | GType::Quaternion => Some((GType::Float, 4)),
        GType::Vector2i => Some((GType::Int, 2)),
        GType::Vector3i => Some((GType::Int, 3)),
        GType::Vector4i => Some((GType::Int, 4)),
        GType::Color => Some((GType::Float, 4)),
        _ => None,
    }
}

fn component_width(gtype: GType) -> usize {
    match gtype {
        GType::Color => 4,
        gtype if matches!(gtype, GType::Vector2i | GType::Vector3i | GType::Vector4i) => 4,
        _ => std::mem::size_of::<crate::builtins::Real>(),
    }
}

fn read_component(gtype: GType, bytes: &[u8], index: usize) -> Words {
    let width = component_width(gtype);
    let chunk = &bytes[index * width..(index + 1) * width];
    match (vector_components(gtype), width) {
        (Some((GType::Int, _)), _) => {
            value::make_int(i64::from(i32::from_le_bytes(chunk.try_into().unwrap_or([0; 4]))))
        }
        (_, 8) => value::make_float(f64::from_le_bytes(chunk.try_into().unwrap_or([0; 8]))),
        _ => value::make_float(f64::from(f32::from_le_bytes(chunk.try_into().unwrap_or([0; 4])))),
    }
}

fn write_component(gtype: GType, bytes: &mut [u8], index: usize, words: &Words) -> bool {
    let width = component_width(gtype);
    let chunk = &mut bytes[index * width..(index + 1) * width];
    match (vector_components(gtype), width) {
        (Some((GType::Int, _)), _) => match value::as_int(words) {
            Some(number) => chunk.copy_from_slice(&(number as i32).to_le_bytes()),
            None => return false,
        },
        (_, 8) => match value::as_number(words) {
            Some(number) => chunk.copy_from_slice(&number.to_le_bytes()),
            None => return false,
        },
        _ => match value::as_number(words) {
            Some(number) => chunk.copy_from_slice(&(number as f32).to_le_bytes()),
            None => return false,
        },
    }
    true
}

fn resolve(index: Int, len: usize) -> Option<usize> {
    let resolved = if index < 0 { index + len as Int } else { index };
    (0..len as Int).contains(&resolved).then_some(resolved as usize)
}

pub(crate) unsafe extern "C" fn variant_get_indexed(
    base: ConstVariantPtr,
    index: Int,
    ret: UninitializedVariantPtr,
    valid: *mut Bool,
    out_of_bounds: *mut Bool,
) {
    write_words(ret, NIL);
    set_flag(out_of_bounds, false);
    let words = words_at(base);
    let handle = value::handle(words);
    let gtype = value::tag(words);
    let outcome: Option<Option<Words>> = match gtype {
        GType::Array => Some(containers::array_get(handle, index)),
        GType::String => {
            let text = value::as_text(words).unwrap_or_default();
            let chars: Vec<char> = text.chars().collect();
            Some(resolve(index, chars.len()).map(|i| value::make_string(&chars[i].to_string())))
        }
        gtype if gtype.is_packed_array() => {
            let data = PackedData::get(handle);
            Some(resolve(index, data.len()).map(|i| data.get_words(i)))
        }
        gtype => vector_components(gtype).map(|(_, count)| {
            resolve(index, count).map(|i| read_component(gtype, value::pod_bytes(words), i))
        }),
    };
    match outcome {
        None => set_flag(valid, false),
        Some(None) => {
            set_flag(valid, false);
            set_flag(out_of_bounds, true);
        }
        Some(Some(result)) => {
            set_flag(valid, true);
            write_words(ret, result);
        }
    }
}

pub(crate) unsafe extern "C" fn variant_set_indexed(
    base: VariantPtr,
    index: Int,
    item: ConstVariantPtr,
    valid: *mut Bool,
    out_of_bounds: *mut Bool,
) {
    set_flag(out_of_bounds, false);
    let slot = &mut *(base as *mut Words);
    let item = words_at(item);
    let handle = value::handle(slot);
    let gtype = value::tag(slot);
    // Some(true) = written, Some(false) = rejected, None = out of bounds.
    let outcome: Option<bool> = match gtype {
        GType::Array => match containers::array_set(handle, index, item) {
            Ok(()) => Some(true),
            Err(true) => None,
            Err(false) => Some(false),
        },
        gtype if gtype.is_packed_array() => {
            let data = PackedData::get(handle);
            resolve(index, data.len()).map(|i| data.set_words(i, item))
        }
        gtype => match vector_components(gtype) {
            Some((_, count)) => resolve(index, count).map(|i| {
                let mut bytes = value::pod_bytes(slot).to_vec();
                let written = write_component(gtype, &mut bytes, i, item);
                if written {
                    let updated = value::make_pod(gtype, bytes.as_ptr());
                    value::destroy_words(std::mem::replace(slot, updated));
                }
                written
            }),
            None => Some(false),
        },
    };
    match outcome {
        Some(written) => set_flag(valid, written),
        None => {
            set_flag(valid, false);
            set_flag(out_of_bounds, true);
        }
    }
}

pub(crate) unsafe extern "C" fn variant_get_keyed(
    base: ConstVariantPtr,
    key: ConstVariantPtr,
    ret: UninitializedVariantPtr,
    valid: *mut Bool,
) {
    let words = words_at(base);
    let key = words_at(key);
    let result = match value::tag(words) {
        GType::Dictionary => containers::dict_get(value::handle(words), key),
        GType::Object => value::as_text(key).and_then(|name| objects::get_property(value::handle(words), &name)),
        _ => None,
    };
    set_flag(valid, result.is_some());
    write_words(ret, result.unwrap_or(NIL));
}

pub(crate) unsafe extern "C" fn variant_set_keyed(
    base: VariantPtr,
    key: ConstVariantPtr,
    item: ConstVariantPtr,
    valid: *mut Bool,
) {
    let words = *words_at(base);
    let key = words_at(key);
    let item = words_at(item);
    let written = match value::tag(&words) {
        GType::Dictionary => containers::dict_insert(value::handle(&words), key, item),
        GType::Object => value::as_text(key)
            .map_or(false, |name| objects::set_property(value::handle(&words), &name, item)),
        _ => false,
    };
    set_flag(valid, written);
}

pub(crate) unsafe extern "C" fn variant_hash(variant: ConstVariantPtr) -> Int {
    ops::hash(words_at(variant))
}

pub(crate) unsafe extern "C" fn variant_booleanize(variant: ConstVariantPtr) -> Bool {
    sys::to_bool(ops::booleanize(words_at(variant)))
}

pub(crate) unsafe extern "C" fn variant_stringify(variant: ConstVariantPtr, out: UninitializedStringPtr) {
    *(out as *mut usize) = value::string_new(&ops::stringify(words_at(variant)));
}

pub(crate) unsafe extern "C" fn variant_get_type(variant: ConstVariantPtr) -> VariantTypeRaw {
    value::tag(words_at(variant)).to_sys()
}

// ---- constructor tables -------------------------------------------------------------

fn gtype_of<const T: u32>() -> GType {
    GType::from_sys(T).unwrap_or(GType::Nil)
}

unsafe extern "C" fn from_type_fn<const T: u32>(dst: UninitializedVariantPtr, src: TypePtr) {
    write_words(dst, value::from_type(gtype_of::<T>(), src));
}

unsafe extern "C" fn to_type_fn<const T: u32>(dst: UninitializedTypePtr, variant: VariantPtr) {
    value::to_type(gtype_of::<T>(), words_at(variant), dst);
}

unsafe extern "C" fn default_ctor_fn<const T: u32>(dst: UninitializedTypePtr, _args: *const ConstTypePtr) {
    value::type_default(gtype_of::<T>(), dst);
}

unsafe extern "C" fn copy_ctor_fn<const T: u32>(dst: UninitializedTypePtr, args: *const ConstTypePtr) {
    value::type_copy(gtype_of::<T>(), dst, *args);
}

unsafe extern "C" fn destructor_fn<const T: u32>(ptr: TypePtr) {
    value::type_release(gtype_of::<T>(), ptr);
}

/// `String(StringName)`, `String(NodePath)`, `NodePath(String)`.
unsafe extern "C" fn string_from_text(dst: UninitializedTypePtr, args: *const ConstTypePtr) {
    *(dst as *mut usize) = value::string_new(&value::text_at(*args));
}

/// `StringName(String)`.
unsafe extern "C" fn string_name_from_text(dst: UninitializedTypePtr, args: *const ConstTypePtr) {
    *(dst as *mut usize) = value::intern(&value::text_at(*args));
}

unsafe extern "C" fn callable_from_object_method(dst: UninitializedTypePtr, args: *const ConstTypePtr) {
    objects::construct_object_member(GType::Callable, dst, args);
}

unsafe extern "C" fn signal_from_object_name(dst: UninitializedTypePtr, args: *const ConstTypePtr) {
    objects::construct_object_member(GType::Signal, dst, args);
}

/// Instantiates `$func::<N>` for every non-nil type tag.
macro_rules! per_type {
    (@arms $raw:expr, $func:ident, $ty:ty; $($n:literal)*) => {
        match $raw {
            $( $n => Some($func::<$n> as $ty), )*
            _ => None,
        }
    };
    ($raw:expr, $func:ident as $ty:ty) => {
        per_type!(@arms $raw, $func, $ty;
            1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25 26 27 28 29 30
            31 32 33 34 35 36 37 38)
    };
}

pub(crate) unsafe extern "C" fn get_variant_from_type_constructor(
    gtype: VariantTypeRaw,
) -> Option<VariantFromTypeConstructorFunc> {
    per_type!(gtype, from_type_fn as VariantFromTypeConstructorFunc)
}

pub(crate) unsafe extern "C" fn get_variant_to_type_constructor(
    gtype: VariantTypeRaw,
) -> Option<TypeFromVariantConstructorFunc> {
    per_type!(gtype, to_type_fn as TypeFromVariantConstructorFunc)
}

pub(crate) unsafe extern "C" fn variant_get_ptr_constructor(gtype: VariantTypeRaw, index: i32) -> Option<PtrConstructor> {
    let kind = GType::from_sys(gtype)?;
    if matches!(kind, GType::Nil | GType::Object) {
        return None;
    }
    match (kind, index) {
        (_, 0) => per_type!(gtype, default_ctor_fn as PtrConstructor),
        (_, 1) => per_type!(gtype, copy_ctor_fn as PtrConstructor),
        (GType::String, 2 | 3) | (GType::NodePath, 2) => Some(string_from_text as PtrConstructor),
        (GType::StringName, 2) => Some(string_name_from_text as PtrConstructor),
        (GType::Callable, 2) => Some(callable_from_object_method as PtrConstructor),
        (GType::Signal, 2) => Some(signal_from_object_name as PtrConstructor),
        _ => None,
    }
}

pub(crate) unsafe extern "C" fn variant_get_ptr_destructor(gtype: VariantTypeRaw) -> Option<PtrDestructor> {
    let kind = GType::from_sys(gtype)?;
    if kind.is_trivially_destructible() || kind == GType::Object {
        return None;
    }
    per_type!(gtype, destructor_fn as PtrDestructor)
}

// ---- builtin methods -----------------------------------------------------------------

unsafe extern "C" fn callable_is_null(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    *(ret as *mut Bool) = sys::to_bool(*(base as *const usize) == 0);
}

unsafe extern "C" fn callable_get_method(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    *(ret as *mut usize) = value::intern(&objects::callable_method_name(*(base as *const usize)));
}

unsafe extern "C" fn callable_get_object_id(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    *(ret as *mut i64) = objects::callable_object_id(*(base as *const usize)) as i64;
}

unsafe extern "C" fn signal_get_name(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    let name = objects::signal(*(base as *const usize)).map(|s| s.name.clone()).unwrap_or_default();
    *(ret as *mut usize) = value::intern(&name);
}

unsafe extern "C" fn signal_get_object_id(base: TypePtr, _args: *const ConstTypePtr, ret: TypePtr, _argc: i32) {
    *(ret as *mut i64) = objects::signal(*(base as *const usize)).map_or(0, |s| s.instance_id as i64);
}

struct MethodRow {
    name: &'static str,
    hash: i64,
    func: PtrBuiltInMethod,
}

const fn row(name: &'static str, hash: i64, func: PtrBuiltInMethod) -> MethodRow {
    MethodRow { name, hash, func }
}

fn method_table(gtype: GType) -> &'static [MethodRow] {
    static ARRAY: [MethodRow; 7] = [
        row("size", 3173160232, containers::array_size),
        row("clear", 3218959716, containers::array_clear_method),
        row("resize", 848867239, containers::array_resize_method),
        row("push_back", 3316032543, containers::array_push_back),
        row("is_typed", 3918633141, containers::array_is_typed),
        row("get_typed_builtin", 3173160232, containers::array_get_typed_builtin),
        row("get_typed_class_name", 1825232092, containers::array_get_typed_class_name),
    ];
    static DICTIONARY: [MethodRow; 12] = [
        row("size", 3173160232, containers::dict_size),
        row("clear", 3218959716, containers::dict_clear_method),
        row("has", 3471775634, containers::dict_has_method),
        row("erase", 1776646889, containers::dict_erase_method),
        row("keys", 4144163970, containers::dict_keys),
        row("values", 4144163970, containers::dict_values),
        row("is_typed_key", 3918633141, containers::dict_is_typed_key),
        row("is_typed_value", 3918633141, containers::dict_is_typed_value),
        row("get_typed_key_builtin", 3173160232, containers::dict_get_typed_key_builtin),
        row("get_typed_value_builtin", 3173160232, containers::dict_get_typed_value_builtin),
        row("get_typed_key_class_name", 1825232092, containers::dict_get_typed_key_class_name),
        row("get_typed_value_class_name", 1825232092, containers::dict_get_typed_value_class_name),
    ];
    static PACKED: [MethodRow; 2] = [
        row("size", 3173160232, containers::packed_size),
        row("resize", 848867239, containers::packed_resize),
    ];
    static CALLABLE: [MethodRow; 3] = [
        row("is_null", 3918633141, callable_is_null),
        row("get_method", 1825232092, callable_get_method),
        row("get_object_id", 3173160232, callable_get_object_id),
    ];
    static SIGNAL: [MethodRow; 2] = [
        row("get_name", 1825232092, signal_get_name),
        row("get_object_id", 3173160232, signal_get_object_id),
    ];
    match gtype {
        GType::Array => &ARRAY,
        GType::Dictionary => &DICTIONARY,
        GType::Callable => &CALLABLE,
        GType::Signal => &SIGNAL,
        gtype if gtype.is_packed_array() => &PACKED,
        _ => &[],
    }
}

pub(crate) unsafe extern "C" fn variant_get_ptr_builtin_method(
    gtype: VariantTypeRaw,
    method: ConstStringNamePtr,
    hash: Int,
) -> Option<PtrBuiltInMethod> {
    let kind = GType::from_sys(gtype)?;
    let name = value::text_at(method);
    let found = method_table(kind).iter().find(|entry| entry.name == name)?;
    if found.hash != hash {
        tracing::error!(
            target: "sim",
            "Hash mismatch for {}.{}: expected {}, got {}",
            kind,
            name,
            found.hash,
            hash
        );
        return None;
    }
    Some(found.func)
}

// ---- strings ------------------------------------------------------------------------

unsafe fn utf8_input(chars: *const c_char, len: Int) -> String {
    if chars.is_null() {
        return String::new();
    }
    let bytes = if len < 0 {
        CStr::from_ptr(chars).to_bytes()
    } else {
        std::slice::from_raw_parts(chars as *const u8, len as usize)
    };
    String::from_utf8_lossy(bytes).into_owned()
}

pub(crate) unsafe extern "C" fn string_new_with_utf8_chars_and_len(
    dst: UninitializedStringPtr,
    chars: *const c_char,
    len: Int,
) {
    *(dst as *mut usize) = value::string_new(&utf8_input(chars, len));
}

pub(crate) unsafe extern "C" fn string_name_new_with_utf8_chars_and_len(
    dst: UninitializedStringNamePtr,
    chars: *const c_char,
    len: Int,
) {
    *(dst as *mut usize) = value::intern(&utf8_input(chars, len));
}

/// Returns the full UTF-8 length and copies at most `max` bytes.
pub(crate) unsafe extern "C" fn string_to_utf8_chars(string: ConstStringPtr, out: *mut c_char, max: Int) -> Int {
    let text = value::string_text(*(string as *const usize));
    if !out.is_null() && max > 0 {
        let count = text.len().min(max as usize);
        std::ptr::copy_nonoverlapping(text.as_ptr(), out as *mut u8, count);
    }
    text.len() as Int
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_variant_constructors() {
        for gtype in GType::ALL.iter().copied().filter(|t| *t != GType::Nil) {
            unsafe {
                assert!(get_variant_from_type_constructor(gtype.to_sys()).is_some(), "{gtype}");
                assert!(get_variant_to_type_constructor(gtype.to_sys()).is_some(), "{gtype}");
            }
        }
    }

    #[test]
    fn test_trivial_types_have_no_destructor() {
        unsafe {
            assert!(variant_get_ptr_destructor(GType::Vector3.to_sys()).is_none());
            assert!(variant_get_ptr_destructor(GType::String.to_sys()).is_some());
            assert!(variant_get_ptr_constructor(GType::StringName.to_sys(), 2).is_some());
            assert!(variant_get_ptr_constructor(GType::Int.to_sys(), 2).is_none());
        }
    }

    #[test]
    fn test_builtin_method_hash_must_match() {
        let name = value::intern("size");
        let ptr = &name as *const usize as ConstStringNamePtr;
        unsafe {
            assert!(variant_get_ptr_builtin_method(GType::Array.to_sys(), ptr, 3173160232).is_some());
            assert!(variant_get_ptr_builtin_method(GType::Array.to_sys(), ptr, 1).is_none());
            value::release::<String>(name);
        }
    }

    #[test]
    fn test_negative_length_reads_to_terminator() {
        let mut handle = 0usize;
        unsafe {
            string_new_with_utf8_chars_and_len(&mut handle as *mut usize as UninitializedStringPtr, c"héllo".as_ptr(), -1);
            assert_eq!(value::string_text(handle), "héllo");
            let mut buffer = [0 as c_char; 2];
            let len = string_to_utf8_chars(&handle as *const usize as ConstStringPtr, buffer.as_mut_ptr(), 2);
            assert_eq!(len, 6);
            assert_eq!(buffer[0] as u8, b'h');
            value::release::<String>(handle);
        }
    }
}
