//! 扩展 ABI 的原始类型
//!
//! 与引擎 `gdextension_interface.h` 一一对应的 `repr(C)` 结构体、函数指针类型和枚举值。
//! 这里只描述内存布局，不包含任何逻辑。

use std::ffi::{c_char, c_void};

pub type VariantPtr = *mut c_void;
pub type ConstVariantPtr = *const c_void;
pub type UninitializedVariantPtr = *mut c_void;
pub type StringNamePtr = *mut c_void;
pub type ConstStringNamePtr = *const c_void;
pub type UninitializedStringNamePtr = *mut c_void;
pub type StringPtr = *mut c_void;
pub type ConstStringPtr = *const c_void;
pub type UninitializedStringPtr = *mut c_void;
pub type ObjectPtr = *mut c_void;
pub type ConstObjectPtr = *const c_void;
pub type TypePtr = *mut c_void;
pub type ConstTypePtr = *const c_void;
pub type UninitializedTypePtr = *mut c_void;
pub type MethodBindPtr = *const c_void;
pub type ClassInstancePtr = *mut c_void;
pub type ClassLibraryPtr = *mut c_void;

/// `GDExtensionBool`
pub type Bool = u8;
/// `GDExtensionInt`
pub type Int = i64;
/// `GDExtensionVariantType`
pub type VariantTypeRaw = u32;
/// `GDExtensionVariantOperator`
pub type VariantOperatorRaw = u32;
/// `GDExtensionInitializationLevel`
pub type InitializationLevelRaw = u32;
/// `GDObjectInstanceID`
pub type InstanceIdRaw = u64;

pub const TRUE: Bool = 1;
pub const FALSE: Bool = 0;

/// Generic function pointer returned by the proc-address lookup.
pub type InterfaceFunctionPtr = Option<unsafe extern "C" fn()>;
/// `GDExtensionInterfaceGetProcAddress`
pub type GetProcAddress = unsafe extern "C" fn(p_function_name: *const c_char) -> InterfaceFunctionPtr;

pub type VariantFromTypeConstructorFunc =
    unsafe extern "C" fn(r_variant: UninitializedVariantPtr, p_value: TypePtr);
pub type TypeFromVariantConstructorFunc =
    unsafe extern "C" fn(r_value: UninitializedTypePtr, p_variant: VariantPtr);
pub type PtrConstructor = unsafe extern "C" fn(p_base: UninitializedTypePtr, p_args: *const ConstTypePtr);
pub type PtrDestructor = unsafe extern "C" fn(p_base: TypePtr);
pub type PtrBuiltInMethod = unsafe extern "C" fn(
    p_base: TypePtr,
    p_args: *const ConstTypePtr,
    r_return: TypePtr,
    p_argument_count: i32,
);

/// Reserved callback slot of a creation-info struct that this crate leaves empty.
pub type UnusedCallback = Option<unsafe extern "C" fn()>;

// CallError codes
pub const CALL_OK: u32 = 0;
pub const CALL_ERROR_INVALID_METHOD: u32 = 1;
pub const CALL_ERROR_INVALID_ARGUMENT: u32 = 2;
pub const CALL_ERROR_TOO_MANY_ARGUMENTS: u32 = 3;
pub const CALL_ERROR_TOO_FEW_ARGUMENTS: u32 = 4;
pub const CALL_ERROR_INSTANCE_IS_NULL: u32 = 5;
pub const CALL_ERROR_METHOD_NOT_CONST: u32 = 6;

/// `GDExtensionCallError`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallErrorRaw {
    pub error: u32,
    pub argument: i32,
    pub expected: i32,
}

impl CallErrorRaw {
    pub fn is_ok(&self) -> bool {
        self.error == CALL_OK
    }
}

/// `GDExtensionGodotVersion`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GodotVersionRaw {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub string: *const c_char,
}

/// `GDExtensionPropertyInfo`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PropertyInfoRaw {
    pub type_: VariantTypeRaw,
    pub name: StringNamePtr,
    pub class_name: StringNamePtr,
    pub hint: u32,
    pub hint_string: StringPtr,
    pub usage: u32,
}

pub type ClassMethodCall = unsafe extern "C" fn(
    method_userdata: *mut c_void,
    p_instance: ClassInstancePtr,
    p_args: *const ConstVariantPtr,
    p_argument_count: Int,
    r_return: VariantPtr,
    r_error: *mut CallErrorRaw,
);

pub type ClassMethodPtrCall = unsafe extern "C" fn(
    method_userdata: *mut c_void,
    p_instance: ClassInstancePtr,
    p_args: *const ConstTypePtr,
    r_ret: TypePtr,
);

/// `GDExtensionClassMethodArgumentMetadata`
pub const METHOD_ARGUMENT_METADATA_NONE: u32 = 0;

/// `GDExtensionClassMethodInfo`
#[repr(C)]
#[derive(Debug)]
pub struct ClassMethodInfoRaw {
    pub name: StringNamePtr,
    pub method_userdata: *mut c_void,
    pub call_func: Option<ClassMethodCall>,
    pub ptrcall_func: Option<ClassMethodPtrCall>,
    pub method_flags: u32,
    pub has_return_value: Bool,
    pub return_value_info: *mut PropertyInfoRaw,
    pub return_value_metadata: u32,
    pub argument_count: u32,
    pub arguments_info: *mut PropertyInfoRaw,
    pub arguments_metadata: *mut u32,
    pub default_argument_count: u32,
    pub default_arguments: *mut VariantPtr,
}

pub type ClassCreateInstance = unsafe extern "C" fn(p_class_userdata: *mut c_void) -> ObjectPtr;
pub type ClassFreeInstance =
    unsafe extern "C" fn(p_class_userdata: *mut c_void, p_instance: ClassInstancePtr);
pub type ClassToString = unsafe extern "C" fn(
    p_instance: ClassInstancePtr,
    r_is_valid: *mut Bool,
    p_out: StringPtr,
);

/// `GDExtensionClassCreationInfo2`
#[repr(C)]
pub struct ClassCreationInfo2Raw {
    pub is_virtual: Bool,
    pub is_abstract: Bool,
    pub is_exposed: Bool,
    pub set_func: UnusedCallback,
    pub get_func: UnusedCallback,
    pub get_property_list_func: UnusedCallback,
    pub free_property_list_func: UnusedCallback,
    pub property_can_revert_func: UnusedCallback,
    pub property_get_revert_func: UnusedCallback,
    pub validate_property_func: UnusedCallback,
    pub notification_func: UnusedCallback,
    pub to_string_func: Option<ClassToString>,
    pub reference_func: UnusedCallback,
    pub unreference_func: UnusedCallback,
    pub create_instance_func: Option<ClassCreateInstance>,
    pub free_instance_func: Option<ClassFreeInstance>,
    pub recreate_instance_func: UnusedCallback,
    pub get_virtual_func: UnusedCallback,
    pub get_virtual_call_data_func: UnusedCallback,
    pub call_virtual_with_data_func: UnusedCallback,
    pub get_rid_func: UnusedCallback,
    pub class_userdata: *mut c_void,
}

pub type InstanceBindingCreateCallback =
    unsafe extern "C" fn(p_token: *mut c_void, p_instance: *mut c_void) -> *mut c_void;
pub type InstanceBindingFreeCallback =
    unsafe extern "C" fn(p_token: *mut c_void, p_instance: *mut c_void, p_binding: *mut c_void);
pub type InstanceBindingReferenceCallback =
    unsafe extern "C" fn(p_token: *mut c_void, p_binding: *mut c_void, p_reference: Bool) -> Bool;

/// `GDExtensionInstanceBindingCallbacks`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InstanceBindingCallbacksRaw {
    pub create_callback: Option<InstanceBindingCreateCallback>,
    pub free_callback: Option<InstanceBindingFreeCallback>,
    pub reference_callback: Option<InstanceBindingReferenceCallback>,
}

pub type CallableCustomCall = unsafe extern "C" fn(
    callable_userdata: *mut c_void,
    p_args: *const ConstVariantPtr,
    p_argument_count: Int,
    r_return: VariantPtr,
    r_error: *mut CallErrorRaw,
);
pub type CallableCustomFree = unsafe extern "C" fn(callable_userdata: *mut c_void);
pub type CallableCustomHash = unsafe extern "C" fn(callable_userdata: *mut c_void) -> u32;
pub type CallableCustomToString = unsafe extern "C" fn(
    callable_userdata: *mut c_void,
    r_is_valid: *mut Bool,
    r_out: StringPtr,
);

/// `GDExtensionCallableCustomInfo`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallableCustomInfoRaw {
    pub callable_userdata: *mut c_void,
    pub token: *mut c_void,
    pub object_id: InstanceIdRaw,
    pub call_func: Option<CallableCustomCall>,
    pub is_valid_func: UnusedCallback,
    pub free_func: Option<CallableCustomFree>,
    pub hash_func: Option<CallableCustomHash>,
    pub equal_func: UnusedCallback,
    pub less_than_func: UnusedCallback,
    pub to_string_func: Option<CallableCustomToString>,
}

pub type InitializeCallback =
    unsafe extern "C" fn(userdata: *mut c_void, p_level: InitializationLevelRaw);

/// `GDExtensionInitialization`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InitializationRaw {
    pub minimum_initialization_level: InitializationLevelRaw,
    pub userdata: *mut c_void,
    pub initialize: Option<InitializeCallback>,
    pub deinitialize: Option<InitializeCallback>,
}

/// `GDExtensionInitializationFunction`
pub type InitializationFunction = unsafe extern "C" fn(
    p_get_proc_address: Option<GetProcAddress>,
    p_library: ClassLibraryPtr,
    r_initialization: *mut InitializationRaw,
) -> Bool;

/// Converts a Rust `bool` to the ABI boolean.
#[inline]
pub fn to_bool(value: bool) -> Bool {
    if value {
        TRUE
    } else {
        FALSE
    }
}

/// Converts an ABI boolean to a Rust `bool`.
#[inline]
pub fn from_bool(value: Bool) -> bool {
    value != FALSE
}

/// Opaque handle of a live engine object.
///
/// Stored as an integer so that it can be used as a map key across threads;
/// it is never dereferenced on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(usize);

impl ObjectHandle {
    /// 空指针返回 `None`
    pub fn from_ptr(ptr: ConstObjectPtr) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self(ptr as usize))
        }
    }

    pub fn as_ptr(self) -> ObjectPtr {
        self.0 as ObjectPtr
    }

    pub fn addr(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Engine-assigned object instance id, stable for the object's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle_is_rejected() {
        assert!(ObjectHandle::from_ptr(std::ptr::null()).is_none());
        let value = 0x1000usize;
        let handle = ObjectHandle::from_ptr(value as ConstObjectPtr).unwrap();
        assert_eq!(handle.addr(), 0x1000);
        assert_eq!(handle.to_string(), "0x1000");
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(to_bool(true), TRUE);
        assert!(!from_bool(FALSE));
        assert!(from_bool(7));
    }

    #[test]
    fn test_creation_info_is_pointer_aligned() {
        let ptr = std::mem::size_of::<usize>();
        assert_eq!(std::mem::size_of::<UnusedCallback>(), ptr);
        assert_eq!(std::mem::size_of::<ClassCreationInfo2Raw>() % ptr, 0);
    }
}
