//! 引擎接口表
//!
//! 扩展加载时，引擎通过 `get_proc_address` 回调提供所有函数指针。
//! 这些指针被解析一次，存入进程级单例 [`EngineInterface`]，此后不可替换。

use super::types::*;
use crate::core::error::{InterfaceError, InterfaceResult};
use crate::variant::{GType, GTYPE_COUNT};
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::OnceLock;

/// Oldest engine minor version (4.x) whose interface layout this crate targets.
pub const MIN_MINOR_VERSION: u32 = 2;

pub type PackedIndex = unsafe extern "C" fn(p_self: TypePtr, p_index: Int) -> TypePtr;
pub type PackedIndexConst = unsafe extern "C" fn(p_self: ConstTypePtr, p_index: Int) -> TypePtr;

/// Declares [`RawInterface`] and its loader from `(field: "symbol" => type)` entries.
macro_rules! engine_functions {
    ($( $field:ident : $ty:ty ),* $(,)?) => {
        /// Every engine function resolved at load time.
        #[derive(Clone, Copy)]
        pub struct RawInterface {
            $( pub $field: $ty, )*
        }

        impl RawInterface {
            /// # Safety
            /// `get_proc_address` must be the engine-supplied lookup function.
            unsafe fn load(get_proc_address: GetProcAddress) -> InterfaceResult<Self> {
                Ok(Self {
                    $(
                        $field: {
                            let symbol = concat!(stringify!($field), "\0");
                            match get_proc_address(symbol.as_ptr() as *const c_char) {
                                Some(f) => std::mem::transmute::<unsafe extern "C" fn(), $ty>(f),
                                None => {
                                    return Err(InterfaceError::MissingFunction(stringify!($field)))
                                }
                            }
                        },
                    )*
                })
            }
        }
    };
}

engine_functions! {
    get_godot_version: unsafe extern "C" fn(*mut GodotVersionRaw),
    print_error: unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, i32, Bool),
    print_warning: unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, i32, Bool),

    variant_new_copy: unsafe extern "C" fn(UninitializedVariantPtr, ConstVariantPtr),
    variant_new_nil: unsafe extern "C" fn(UninitializedVariantPtr),
    variant_destroy: unsafe extern "C" fn(VariantPtr),
    variant_call: unsafe extern "C" fn(
        VariantPtr,
        ConstStringNamePtr,
        *const ConstVariantPtr,
        Int,
        UninitializedVariantPtr,
        *mut CallErrorRaw,
    ),
    variant_evaluate: unsafe extern "C" fn(
        VariantOperatorRaw,
        ConstVariantPtr,
        ConstVariantPtr,
        UninitializedVariantPtr,
        *mut Bool,
    ),
    variant_set_indexed: unsafe extern "C" fn(VariantPtr, Int, ConstVariantPtr, *mut Bool, *mut Bool),
    variant_get_indexed:
        unsafe extern "C" fn(ConstVariantPtr, Int, UninitializedVariantPtr, *mut Bool, *mut Bool),
    variant_set_keyed: unsafe extern "C" fn(VariantPtr, ConstVariantPtr, ConstVariantPtr, *mut Bool),
    variant_get_keyed:
        unsafe extern "C" fn(ConstVariantPtr, ConstVariantPtr, UninitializedVariantPtr, *mut Bool),
    variant_hash: unsafe extern "C" fn(ConstVariantPtr) -> Int,
    variant_booleanize: unsafe extern "C" fn(ConstVariantPtr) -> Bool,
    variant_stringify: unsafe extern "C" fn(ConstVariantPtr, UninitializedStringPtr),
    variant_get_type: unsafe extern "C" fn(ConstVariantPtr) -> VariantTypeRaw,

    get_variant_from_type_constructor:
        unsafe extern "C" fn(VariantTypeRaw) -> Option<VariantFromTypeConstructorFunc>,
    get_variant_to_type_constructor:
        unsafe extern "C" fn(VariantTypeRaw) -> Option<TypeFromVariantConstructorFunc>,
    variant_get_ptr_constructor: unsafe extern "C" fn(VariantTypeRaw, i32) -> Option<PtrConstructor>,
    variant_get_ptr_destructor: unsafe extern "C" fn(VariantTypeRaw) -> Option<PtrDestructor>,
    variant_get_ptr_builtin_method:
        unsafe extern "C" fn(VariantTypeRaw, ConstStringNamePtr, Int) -> Option<PtrBuiltInMethod>,

    string_new_with_utf8_chars_and_len: unsafe extern "C" fn(UninitializedStringPtr, *const c_char, Int),
    string_to_utf8_chars: unsafe extern "C" fn(ConstStringPtr, *mut c_char, Int) -> Int,
    string_name_new_with_utf8_chars_and_len:
        unsafe extern "C" fn(UninitializedStringNamePtr, *const c_char, Int),

    array_operator_index: unsafe extern "C" fn(TypePtr, Int) -> VariantPtr,
    array_operator_index_const: unsafe extern "C" fn(ConstTypePtr, Int) -> VariantPtr,
    array_set_typed: unsafe extern "C" fn(TypePtr, VariantTypeRaw, ConstStringNamePtr, ConstVariantPtr),
    dictionary_operator_index: unsafe extern "C" fn(TypePtr, ConstVariantPtr) -> VariantPtr,
    dictionary_operator_index_const: unsafe extern "C" fn(ConstTypePtr, ConstVariantPtr) -> VariantPtr,
    dictionary_set_typed: unsafe extern "C" fn(
        TypePtr,
        VariantTypeRaw,
        ConstStringNamePtr,
        ConstVariantPtr,
        VariantTypeRaw,
        ConstStringNamePtr,
        ConstVariantPtr,
    ),

    packed_byte_array_operator_index: PackedIndex,
    packed_byte_array_operator_index_const: PackedIndexConst,
    packed_int32_array_operator_index: PackedIndex,
    packed_int32_array_operator_index_const: PackedIndexConst,
    packed_int64_array_operator_index: PackedIndex,
    packed_int64_array_operator_index_const: PackedIndexConst,
    packed_float32_array_operator_index: PackedIndex,
    packed_float32_array_operator_index_const: PackedIndexConst,
    packed_float64_array_operator_index: PackedIndex,
    packed_float64_array_operator_index_const: PackedIndexConst,
    packed_string_array_operator_index: PackedIndex,
    packed_string_array_operator_index_const: PackedIndexConst,
    packed_vector2_array_operator_index: PackedIndex,
    packed_vector2_array_operator_index_const: PackedIndexConst,
    packed_vector3_array_operator_index: PackedIndex,
    packed_vector3_array_operator_index_const: PackedIndexConst,
    packed_vector4_array_operator_index: PackedIndex,
    packed_vector4_array_operator_index_const: PackedIndexConst,
    packed_color_array_operator_index: PackedIndex,
    packed_color_array_operator_index_const: PackedIndexConst,

    object_method_bind_call: unsafe extern "C" fn(
        MethodBindPtr,
        ObjectPtr,
        *const ConstVariantPtr,
        Int,
        UninitializedVariantPtr,
        *mut CallErrorRaw,
    ),
    object_method_bind_ptrcall: unsafe extern "C" fn(MethodBindPtr, ObjectPtr, *const ConstTypePtr, TypePtr),
    object_destroy: unsafe extern "C" fn(ObjectPtr),
    object_get_instance_binding:
        unsafe extern "C" fn(ObjectPtr, *mut c_void, *const InstanceBindingCallbacksRaw) -> *mut c_void,
    object_set_instance_binding:
        unsafe extern "C" fn(ObjectPtr, *mut c_void, *mut c_void, *const InstanceBindingCallbacksRaw),
    object_free_instance_binding: unsafe extern "C" fn(ObjectPtr, *mut c_void),
    object_set_instance: unsafe extern "C" fn(ObjectPtr, ConstStringNamePtr, ClassInstancePtr),
    object_get_class_name:
        unsafe extern "C" fn(ConstObjectPtr, ClassLibraryPtr, UninitializedStringNamePtr) -> Bool,
    object_cast_to: unsafe extern "C" fn(ConstObjectPtr, *mut c_void) -> ObjectPtr,
    object_get_instance_from_id: unsafe extern "C" fn(InstanceIdRaw) -> ObjectPtr,
    object_get_instance_id: unsafe extern "C" fn(ConstObjectPtr) -> InstanceIdRaw,

    callable_custom_create: unsafe extern "C" fn(UninitializedTypePtr, *mut CallableCustomInfoRaw),

    classdb_construct_object2: unsafe extern "C" fn(ConstStringNamePtr) -> ObjectPtr,
    classdb_get_method_bind:
        unsafe extern "C" fn(ConstStringNamePtr, ConstStringNamePtr, Int) -> MethodBindPtr,
    classdb_get_class_tag: unsafe extern "C" fn(ConstStringNamePtr) -> *mut c_void,
    classdb_register_extension_class2: unsafe extern "C" fn(
        ClassLibraryPtr,
        ConstStringNamePtr,
        ConstStringNamePtr,
        *const ClassCreationInfo2Raw,
    ),
    classdb_register_extension_class_method:
        unsafe extern "C" fn(ClassLibraryPtr, ConstStringNamePtr, *const ClassMethodInfoRaw),
    classdb_register_extension_class_integer_constant: unsafe extern "C" fn(
        ClassLibraryPtr,
        ConstStringNamePtr,
        ConstStringNamePtr,
        ConstStringNamePtr,
        Int,
        Bool,
    ),
    classdb_register_extension_class_property: unsafe extern "C" fn(
        ClassLibraryPtr,
        ConstStringNamePtr,
        *const PropertyInfoRaw,
        ConstStringNamePtr,
        ConstStringNamePtr,
    ),
    classdb_register_extension_class_property_group:
        unsafe extern "C" fn(ClassLibraryPtr, ConstStringNamePtr, ConstStringPtr, ConstStringPtr),
    classdb_register_extension_class_property_subgroup:
        unsafe extern "C" fn(ClassLibraryPtr, ConstStringNamePtr, ConstStringPtr, ConstStringPtr),
    classdb_register_extension_class_signal: unsafe extern "C" fn(
        ClassLibraryPtr,
        ConstStringNamePtr,
        ConstStringNamePtr,
        *const PropertyInfoRaw,
        Int,
    ),
    classdb_unregister_extension_class: unsafe extern "C" fn(ClassLibraryPtr, ConstStringNamePtr),
}

/// Constructors and destructor the engine publishes for one builtin type.
#[derive(Clone, Copy, Default)]
pub struct BuiltinLifecycle {
    pub from_type: Option<VariantFromTypeConstructorFunc>,
    pub to_type: Option<TypeFromVariantConstructorFunc>,
    pub default_constructor: Option<PtrConstructor>,
    pub copy_constructor: Option<PtrConstructor>,
    pub destructor: Option<PtrDestructor>,
}

/// Engine version reported at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GodotVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub string: String,
}

impl std::fmt::Display for GodotVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// 进程级的引擎接口单例
pub struct EngineInterface {
    pub fns: RawInterface,
    library: usize,
    version: GodotVersion,
    builtins: [BuiltinLifecycle; GTYPE_COUNT],
}

static INTERFACE: OnceLock<EngineInterface> = OnceLock::new();

impl EngineInterface {
    /// # Safety
    /// `get_proc_address` must come from the engine and stay valid for the process lifetime.
    unsafe fn load(get_proc_address: GetProcAddress, library: ClassLibraryPtr) -> InterfaceResult<Self> {
        let fns = RawInterface::load(get_proc_address)?;

        let mut raw_version = GodotVersionRaw {
            major: 0,
            minor: 0,
            patch: 0,
            string: std::ptr::null(),
        };
        (fns.get_godot_version)(&mut raw_version);
        let version = GodotVersion {
            major: raw_version.major,
            minor: raw_version.minor,
            patch: raw_version.patch,
            string: if raw_version.string.is_null() {
                String::new()
            } else {
                CStr::from_ptr(raw_version.string).to_string_lossy().into_owned()
            },
        };
        if version.major != 4 || version.minor < MIN_MINOR_VERSION {
            return Err(InterfaceError::IncompatibleVersion {
                major: version.major,
                minor: version.minor,
            });
        }

        let mut builtins = [BuiltinLifecycle::default(); GTYPE_COUNT];
        for gtype in GType::ALL.iter().copied().filter(|t| *t != GType::Nil) {
            let raw = gtype.to_sys();
            let entry = &mut builtins[gtype.index()];
            entry.from_type = (fns.get_variant_from_type_constructor)(raw);
            entry.to_type = (fns.get_variant_to_type_constructor)(raw);
            if entry.from_type.is_none() || entry.to_type.is_none() {
                return Err(InterfaceError::MissingConstructor(gtype));
            }
            entry.default_constructor = (fns.variant_get_ptr_constructor)(raw, 0);
            entry.copy_constructor = (fns.variant_get_ptr_constructor)(raw, 1);
            entry.destructor = (fns.variant_get_ptr_destructor)(raw);
        }

        Ok(Self {
            fns,
            library: library as usize,
            version,
            builtins,
        })
    }

    pub fn version(&self) -> &GodotVersion {
        &self.version
    }

    pub fn library(&self) -> ClassLibraryPtr {
        self.library as ClassLibraryPtr
    }

    pub fn builtin(&self, gtype: GType) -> &BuiltinLifecycle {
        &self.builtins[gtype.index()]
    }

    /// Forwards an error message to the engine log.
    pub fn print_error(&self, message: &str, function: &str, file: &str, line: u32) {
        self.print(self.fns.print_error, message, function, file, line);
    }

    /// Forwards a warning to the engine log.
    pub fn print_warning(&self, message: &str, function: &str, file: &str, line: u32) {
        self.print(self.fns.print_warning, message, function, file, line);
    }

    fn print(
        &self,
        sink: unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, i32, Bool),
        message: &str,
        function: &str,
        file: &str,
        line: u32,
    ) {
        let message = lossy_cstring(message);
        let function = lossy_cstring(function);
        let file = lossy_cstring(file);
        // SAFETY: all strings are NUL-terminated and outlive the call.
        unsafe {
            sink(
                message.as_ptr(),
                function.as_ptr(),
                file.as_ptr(),
                line.min(i32::MAX as u32) as i32,
                FALSE,
            )
        };
    }
}

fn lossy_cstring(text: &str) -> CString {
    CString::new(text.replace('\0', " ")).unwrap_or_default()
}

/// 加载引擎接口
///
/// 只能成功调用一次；第二次调用返回 [`InterfaceError::AlreadyInitialized`]，已加载的接口保持不变。
///
/// # Safety
/// `get_proc_address` must be the engine's lookup function and `library` the token the engine
/// handed to the extension entry point.
pub unsafe fn initialize(
    get_proc_address: GetProcAddress,
    library: ClassLibraryPtr,
) -> InterfaceResult<&'static EngineInterface> {
    if INTERFACE.get().is_some() {
        return Err(InterfaceError::AlreadyInitialized);
    }
    let loaded = EngineInterface::load(get_proc_address, library)?;
    let version = loaded.version.clone();
    INTERFACE
        .set(loaded)
        .map_err(|_| InterfaceError::AlreadyInitialized)?;
    tracing::info!(target: "interface", "Loaded engine interface for Godot {}", version);
    interface_checked()
}

fn interface_checked() -> InterfaceResult<&'static EngineInterface> {
    INTERFACE.get().ok_or(InterfaceError::NotInitialized)
}

/// 返回已加载的接口
///
/// # Panics
/// Panics when called before [`initialize`]; every engine-facing operation requires it.
pub fn interface() -> &'static EngineInterface {
    match INTERFACE.get() {
        Some(interface) => interface,
        None => panic!("engine interface used before the extension entry point ran"),
    }
}

pub fn try_interface() -> Option<&'static EngineInterface> {
    INTERFACE.get()
}

pub fn is_initialized() -> bool {
    INTERFACE.get().is_some()
}

/// Calls an engine function by field name: `engine_fn!(variant_destroy)(ptr)`.
#[macro_export]
#[doc(hidden)]
macro_rules! engine_fn {
    ($name:ident) => {
        ($crate::sys::interface().fns.$name)
    };
}
