//! 进程内参考引擎
//!
//! 以纯 Rust 实现桥接层通过 `get_proc_address` 解析的每一个引擎函数，
//! 用于测试与基准：
//!
//! - `value` - Variant 负载模型（字符串、容器、对象句柄的引用计数）
//! - `containers` - 数组、字典、紧凑数组，以及类型化容器的引擎侧校验
//! - `objects` - 类数据库、实例 id、实例绑定、扩展类注册捕获、方法绑定、可调用对象
//! - `ops` - 相等、哈希、真值、字符串化与运算符求值
//! - `functions` - Variant 入口、构造/析构函数表、内建方法表
//!
//! ```rust,ignore
//! let engine = godot_interop::sim::install();
//! let node = godot_interop::sim::construct("Node").unwrap();
//! ```

mod containers;
mod functions;
mod objects;
mod ops;
mod value;

pub use containers::rejected_writes;
pub use functions::{take_engine_messages, EngineMessage};
pub use objects::{
    call_registered_method, class_description, class_exists, class_of, construct, destroy, is_alive,
    live_object_count, ptrcall_registered_method, refcount_of, registered_method, take_emitted_signals,
    ArgumentDescription, ClassDescription, ConstantDescription, EmittedSignal, GroupDescription,
    MethodDescription, PropertyDescription, SignalDescription,
};

use crate::builtins::{GString, Real};
use crate::core::error::{InterfaceError, LayoutResult};
use crate::layout::{BuildConfiguration, ConfigurationLayout, LayoutMetadata, MemberOffset};
use crate::registry::InitializationLevel;
use crate::sys::{
    self, ClassLibraryPtr, EngineInterface, InitializationFunction, InitializationRaw, InterfaceFunctionPtr,
};
use crate::variant::{GType, VARIANT_SIZE};
use std::ffi::{c_char, CStr};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

static LIBRARY_TOKEN: u8 = 0;

/// Library token the reference engine hands to extensions.
pub fn library_token() -> ClassLibraryPtr {
    &LIBRARY_TOKEN as *const u8 as ClassLibraryPtr
}

/// # Safety
/// `function` must be a function pointer of the type the bridge expects for its name.
unsafe fn erase(function: *const ()) -> InterfaceFunctionPtr {
    Some(std::mem::transmute::<*const (), unsafe extern "C" fn()>(function))
}

macro_rules! proc_table {
    ($name:expr; $($symbol:literal => $function:expr),* $(,)?) => {
        match $name {
            $( $symbol => erase($function as *const ()), )*
            _ => None,
        }
    };
}

/// 引擎的函数查找入口，未知名称返回 `None`
///
/// # Safety
/// `name` must be null or a NUL-terminated string.
pub unsafe extern "C" fn get_proc_address(name: *const c_char) -> InterfaceFunctionPtr {
    if name.is_null() {
        return None;
    }
    let Ok(name) = CStr::from_ptr(name).to_str() else {
        return None;
    };
    let found = proc_table! { name;
        "get_godot_version" => functions::get_godot_version,
        "print_error" => functions::print_error,
        "print_warning" => functions::print_warning,

        "variant_new_copy" => functions::variant_new_copy,
        "variant_new_nil" => functions::variant_new_nil,
        "variant_destroy" => functions::variant_destroy,
        "variant_call" => functions::variant_call,
        "variant_evaluate" => functions::variant_evaluate,
        "variant_set_indexed" => functions::variant_set_indexed,
        "variant_get_indexed" => functions::variant_get_indexed,
        "variant_set_keyed" => functions::variant_set_keyed,
        "variant_get_keyed" => functions::variant_get_keyed,
        "variant_hash" => functions::variant_hash,
        "variant_booleanize" => functions::variant_booleanize,
        "variant_stringify" => functions::variant_stringify,
        "variant_get_type" => functions::variant_get_type,

        "get_variant_from_type_constructor" => functions::get_variant_from_type_constructor,
        "get_variant_to_type_constructor" => functions::get_variant_to_type_constructor,
        "variant_get_ptr_constructor" => functions::variant_get_ptr_constructor,
        "variant_get_ptr_destructor" => functions::variant_get_ptr_destructor,
        "variant_get_ptr_builtin_method" => functions::variant_get_ptr_builtin_method,

        "string_new_with_utf8_chars_and_len" => functions::string_new_with_utf8_chars_and_len,
        "string_to_utf8_chars" => functions::string_to_utf8_chars,
        "string_name_new_with_utf8_chars_and_len" => functions::string_name_new_with_utf8_chars_and_len,

        "array_operator_index" => containers::array_operator_index,
        "array_operator_index_const" => containers::array_operator_index_const,
        "array_set_typed" => containers::array_set_typed,
        "dictionary_operator_index" => containers::dictionary_operator_index,
        "dictionary_operator_index_const" => containers::dictionary_operator_index_const,
        "dictionary_set_typed" => containers::dictionary_set_typed,

        "packed_byte_array_operator_index" => containers::packed_operator_index,
        "packed_byte_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_int32_array_operator_index" => containers::packed_operator_index,
        "packed_int32_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_int64_array_operator_index" => containers::packed_operator_index,
        "packed_int64_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_float32_array_operator_index" => containers::packed_operator_index,
        "packed_float32_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_float64_array_operator_index" => containers::packed_operator_index,
        "packed_float64_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_string_array_operator_index" => containers::packed_operator_index,
        "packed_string_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_vector2_array_operator_index" => containers::packed_operator_index,
        "packed_vector2_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_vector3_array_operator_index" => containers::packed_operator_index,
        "packed_vector3_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_vector4_array_operator_index" => containers::packed_operator_index,
        "packed_vector4_array_operator_index_const" => containers::packed_operator_index_const,
        "packed_color_array_operator_index" => containers::packed_operator_index,
        "packed_color_array_operator_index_const" => containers::packed_operator_index_const,

        "object_method_bind_call" => objects::object_method_bind_call,
        "object_method_bind_ptrcall" => objects::object_method_bind_ptrcall,
        "object_destroy" => objects::object_destroy,
        "object_get_instance_binding" => objects::object_get_instance_binding,
        "object_set_instance_binding" => objects::object_set_instance_binding,
        "object_free_instance_binding" => objects::object_free_instance_binding,
        "object_set_instance" => objects::object_set_instance,
        "object_get_class_name" => objects::object_get_class_name,
        "object_cast_to" => objects::object_cast_to,
        "object_get_instance_from_id" => objects::object_get_instance_from_id,
        "object_get_instance_id" => objects::object_get_instance_id,

        "callable_custom_create" => objects::callable_custom_create,

        "classdb_construct_object2" => objects::classdb_construct_object2,
        "classdb_get_method_bind" => objects::classdb_get_method_bind,
        "classdb_get_class_tag" => objects::classdb_get_class_tag,
        "classdb_register_extension_class2" => objects::classdb_register_extension_class2,
        "classdb_register_extension_class_method" => objects::classdb_register_extension_class_method,
        "classdb_register_extension_class_integer_constant" => objects::classdb_register_extension_class_integer_constant,
        "classdb_register_extension_class_property" => objects::classdb_register_extension_class_property,
        "classdb_register_extension_class_property_group" => objects::classdb_register_extension_class_property_group,
        "classdb_register_extension_class_property_subgroup" => objects::classdb_register_extension_class_property_subgroup,
        "classdb_register_extension_class_signal" => objects::classdb_register_extension_class_signal,
        "classdb_unregister_extension_class" => objects::classdb_unregister_extension_class,
    };
    if found.is_none() {
        tracing::warn!(target: "sim", "Unknown interface function {}", name);
    }
    found
}

/// 把参考引擎装载为进程的引擎接口
///
/// Safe to call any number of times; later calls return the interface loaded first.
pub fn install() -> &'static EngineInterface {
    // SAFETY: `get_proc_address` resolves every name to a function of the matching signature.
    match unsafe { sys::initialize(get_proc_address, library_token()) } {
        Ok(interface) => interface,
        Err(InterfaceError::AlreadyInitialized) => sys::interface(),
        Err(err) => panic!("reference engine failed to load: {err}"),
    }
}

/// Engine-side reference count of a string payload.
pub fn string_refcount(string: &GString) -> usize {
    // SAFETY: a live GString holds a handle issued by this engine.
    unsafe { value::strong_count::<String>(*(string.sys() as *const usize)) }
}

fn members(names: &[&str], width: usize, meta: &str) -> Vec<MemberOffset> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| MemberOffset::new(*name, i * width, meta))
        .collect()
}

fn engine_type_size(gtype: GType) -> usize {
    let pointer = std::mem::size_of::<usize>();
    match gtype {
        GType::Nil => 0,
        GType::Bool => 1,
        GType::Int | GType::Float => 8,
        GType::Callable | GType::Signal => 16,
        GType::String
        | GType::StringName
        | GType::NodePath
        | GType::Object
        | GType::Dictionary
        | GType::Array => pointer,
        packed if packed.is_packed_array() => 2 * pointer,
        other => value::pod_size(other).unwrap_or(0),
    }
}

/// 参考引擎为当前构建配置发布的布局表
pub fn layout_metadata() -> LayoutMetadata {
    let real = std::mem::size_of::<Real>();
    let real_meta = if real == 8 { "double" } else { "float" };

    let mut layout = ConfigurationLayout::default();
    for gtype in GType::ALL {
        layout.sizes.insert(gtype.name().to_string(), engine_type_size(gtype));
    }
    layout.sizes.insert("Variant".to_string(), VARIANT_SIZE);

    let classes = [
        ("Vector2", members(&["x", "y"], real, real_meta)),
        ("Vector2i", members(&["x", "y"], 4, "int32")),
        ("Rect2", members(&["position", "size"], 2 * real, "Vector2")),
        ("Rect2i", members(&["position", "size"], 8, "Vector2i")),
        ("Vector3", members(&["x", "y", "z"], real, real_meta)),
        ("Vector3i", members(&["x", "y", "z"], 4, "int32")),
        ("Transform2D", members(&["x", "y", "origin"], 2 * real, "Vector2")),
        ("Vector4", members(&["x", "y", "z", "w"], real, real_meta)),
        ("Vector4i", members(&["x", "y", "z", "w"], 4, "int32")),
        (
            "Plane",
            vec![MemberOffset::new("normal", 0, "Vector3"), MemberOffset::new("d", 3 * real, real_meta)],
        ),
        ("Quaternion", members(&["x", "y", "z", "w"], real, real_meta)),
        ("AABB", members(&["position", "size"], 3 * real, "Vector3")),
        ("Basis", members(&["x", "y", "z"], 3 * real, "Vector3")),
        (
            "Transform3D",
            vec![MemberOffset::new("basis", 0, "Basis"), MemberOffset::new("origin", 9 * real, "Vector3")],
        ),
        ("Projection", members(&["x", "y", "z", "w"], 4 * real, "Vector4")),
        ("Color", members(&["r", "g", "b", "a"], 4, "float")),
    ];
    for (name, offsets) in classes {
        layout.members.insert(name.to_string(), offsets);
    }

    let mut metadata = LayoutMetadata::new();
    metadata.insert(BuildConfiguration::active(), layout);
    metadata
}

/// Published layout table as `extension_api.json` text.
pub fn layout_metadata_json() -> LayoutResult<String> {
    layout_metadata().to_json_string()
}

/// 一个按引擎方式加载的扩展库
///
/// 运行入口函数后，按级别从低到高初始化；析构时按相反顺序反初始化。
pub struct LoadedExtension {
    initialization: InitializationRaw,
    initialized: Vec<InitializationLevel>,
}

impl LoadedExtension {
    /// Runs `entry` with this engine's lookup function; `None` when the entry refuses to load.
    ///
    /// # Safety
    /// `entry` must be a library entry point following the extension ABI.
    pub unsafe fn load(entry: InitializationFunction) -> Option<Self> {
        let mut initialization = InitializationRaw {
            minimum_initialization_level: 0,
            userdata: std::ptr::null_mut(),
            initialize: None,
            deinitialize: None,
        };
        if !sys::from_bool(entry(Some(get_proc_address), library_token(), &mut initialization)) {
            tracing::warn!(target: "sim", "Extension entry refused to load");
            return None;
        }
        Some(Self {
            initialization,
            initialized: Vec::new(),
        })
    }

    pub fn minimum_level(&self) -> InitializationLevel {
        InitializationLevel::from_sys(self.initialization.minimum_initialization_level).unwrap_or_default()
    }

    /// Initializes every level from the library's minimum up to `target`.
    pub fn initialize_to(&mut self, target: InitializationLevel) {
        let minimum = self.minimum_level();
        let levels = [
            InitializationLevel::Core,
            InitializationLevel::Servers,
            InitializationLevel::Scene,
            InitializationLevel::Editor,
        ];
        for level in levels {
            if level < minimum || level > target || self.initialized.contains(&level) {
                continue;
            }
            if let Some(initialize) = self.initialization.initialize {
                // SAFETY: the callback and userdata come from the library's entry point.
                unsafe { initialize(self.initialization.userdata, level.to_sys()) };
            }
            self.initialized.push(level);
        }
    }

    pub fn initialized_levels(&self) -> &[InitializationLevel] {
        &self.initialized
    }

    /// Deinitializes the initialized levels, highest first.
    pub fn deinitialize(&mut self) {
        while let Some(level) = self.initialized.pop() {
            if let Some(deinitialize) = self.initialization.deinitialize {
                // SAFETY: as in `initialize_to`.
                unsafe { deinitialize(self.initialization.userdata, level.to_sys()) };
            }
        }
    }
}

impl Drop for LoadedExtension {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_interface_function_resolves() {
        let interface = install();
        assert_eq!(interface.version().major, 4);
        assert_eq!(interface.library(), library_token());
        assert!(interface.builtin(GType::String).destructor.is_some());
    }

    #[test]
    fn test_unknown_name_is_none() {
        assert!(unsafe { get_proc_address(c"no_such_function".as_ptr()) }.is_none());
        assert!(unsafe { get_proc_address(std::ptr::null()) }.is_none());
    }

    #[test]
    fn test_published_layout_passes_check() {
        let metadata = LayoutMetadata::from_json_str(&layout_metadata_json().unwrap()).unwrap();
        let report = crate::layout::validate(&metadata).unwrap();
        assert_eq!(report.configuration, BuildConfiguration::active());
    }
}
