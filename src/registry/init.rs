//! 类注册
//!
//! 每个宿主类首次被使用（实例化或显式注册）时注册一次，结果被缓存：
//! 1. 先注册父类
//! 2. 检查类名唯一；重复的类名产生一次诊断并被拒绝，不覆盖已有注册
//! 3. 运行 [`UserClass::register`] 填充注册表
//! 4. 依次提交类、方法、属性、信号、常量和分组
//!
//! 卸载时按注册的逆序注销，子类总是先于父类注销。

use super::class_info::{ClassInfo, ClassItem};
use super::method::{method_call, method_ptrcall, MethodEntry};
use super::prop_info::{PropInfoList, PropInfoSys};
use crate::builtins::{GString, StringName};
use crate::config::BridgeConfig;
use crate::convert::EngineBitfield;
use crate::core::diagnostics::{self, DiagnosticKind};
use crate::core::error::{RegistrationError, RegistrationResult};
use crate::core::utils::panic_message;
use crate::object::{create_instance, free_instance, instance_to_string, GodotClass, UserClass};
use crate::sys::{self, ClassCreationInfo2Raw, ClassMethodInfoRaw, METHOD_ARGUMENT_METADATA_NONE};
use std::any::TypeId;
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// What the bridge registered for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassRecord {
    pub name: String,
    pub parent: String,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
    pub signals: Vec<String>,
    pub constants: Vec<(String, i64)>,
}

struct RegisteredClass {
    record: ClassRecord,
    type_id: TypeId,
    /// `MethodEntry` boxes handed to the engine as method userdata.
    method_userdata: Vec<usize>,
}

type RegistrationCell = Arc<OnceLock<RegistrationResult<()>>>;

#[derive(Default)]
struct RegistryState {
    cells: HashMap<TypeId, RegistrationCell>,
    names: HashMap<String, TypeId>,
    classes: Vec<RegisteredClass>,
}

fn state() -> &'static Mutex<RegistryState> {
    static STATE: OnceLock<Mutex<RegistryState>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(RegistryState::default()))
}

fn lock() -> std::sync::MutexGuard<'static, RegistryState> {
    state().lock().unwrap_or_else(PoisonError::into_inner)
}

static PANIC_ON_DUPLICATE: AtomicBool = AtomicBool::new(false);

/// Applies the registration options of `config`.
pub fn configure(config: &BridgeConfig) {
    PANIC_ON_DUPLICATE.store(config.diagnostics.panic_on_duplicate_class, Ordering::Relaxed);
}

/// Registers `T` and its host ancestors once; later calls return the cached outcome.
pub fn ensure_registered<T: UserClass>() -> RegistrationResult<()> {
    if !sys::is_initialized() {
        return Err(RegistrationError::NotInitialized);
    }
    let cell = lock()
        .cells
        .entry(TypeId::of::<T>())
        .or_default()
        .clone();
    cell.get_or_init(register_class::<T>).clone()
}

fn register_class<T: UserClass>() -> RegistrationResult<()> {
    let parent = <T::Base as GodotClass>::CLASS_NAME;
    if let Err(err) = <T::Base as GodotClass>::__ensure_registered() {
        tracing::error!(target: "registry", "Parent of {} unavailable: {}", T::CLASS_NAME, err);
        return Err(RegistrationError::ParentUnavailable {
            class_name: T::CLASS_NAME.to_string(),
            parent: parent.to_string(),
        });
    }

    reserve_name::<T>()?;

    let mut info = ClassInfo::<T>::new();
    let outcome = catch_unwind(AssertUnwindSafe(|| T::register(&mut info)))
        .unwrap_or_else(|payload| {
            Err(RegistrationError::RegisterFailed {
                class_name: T::CLASS_NAME.to_string(),
                reason: panic_message(payload.as_ref()),
            })
        });
    if let Err(err) = outcome {
        lock().names.remove(T::CLASS_NAME);
        tracing::error!(target: "registry", "{}", err);
        return Err(err);
    }

    let registered = submit::<T>(info.into_items());
    tracing::info!(
        target: "registry",
        "Registered class {} ({} methods, {} properties)",
        T::CLASS_NAME,
        registered.record.methods.len(),
        registered.record.properties.len()
    );
    lock().classes.push(registered);
    Ok(())
}

fn reserve_name<T: UserClass>() -> RegistrationResult<()> {
    let mut state = lock();
    if state.names.contains_key(T::CLASS_NAME) {
        drop(state);
        let message = format!(
            "class name {} is already registered by another type; keeping the first registration",
            T::CLASS_NAME
        );
        diagnostics::report(DiagnosticKind::DuplicateClass, T::CLASS_NAME, message.as_str());
        if PANIC_ON_DUPLICATE.load(Ordering::Relaxed) {
            panic!("{message}");
        }
        return Err(RegistrationError::DuplicateClass {
            class_name: T::CLASS_NAME.to_string(),
        });
    }
    state.names.insert(T::CLASS_NAME.to_string(), TypeId::of::<T>());
    Ok(())
}

/// Hands the class and its items to the engine, in declaration order.
fn submit<T: UserClass>(items: Vec<ClassItem>) -> RegisteredClass {
    let interface = sys::interface();
    let library = interface.library();
    let class_name = StringName::from(T::CLASS_NAME);
    let parent_name = StringName::from(<T::Base as GodotClass>::CLASS_NAME);

    let creation = ClassCreationInfo2Raw {
        is_virtual: sys::FALSE,
        is_abstract: sys::FALSE,
        is_exposed: sys::TRUE,
        set_func: None,
        get_func: None,
        get_property_list_func: None,
        free_property_list_func: None,
        property_can_revert_func: None,
        property_get_revert_func: None,
        validate_property_func: None,
        notification_func: None,
        to_string_func: Some(instance_to_string::<T>),
        reference_func: None,
        unreference_func: None,
        create_instance_func: Some(create_instance::<T>),
        free_instance_func: Some(free_instance),
        recreate_instance_func: None,
        get_virtual_func: None,
        get_virtual_call_data_func: None,
        call_virtual_with_data_func: None,
        get_rid_func: None,
        class_userdata: std::ptr::null_mut(),
    };
    // SAFETY: names and creation info outlive the call; the engine copies them.
    unsafe {
        (interface.fns.classdb_register_extension_class2)(
            library,
            class_name.sys(),
            parent_name.sys(),
            &creation,
        )
    };

    let mut registered = RegisteredClass {
        record: ClassRecord {
            name: T::CLASS_NAME.to_string(),
            parent: <T::Base as GodotClass>::CLASS_NAME.to_string(),
            ..ClassRecord::default()
        },
        type_id: TypeId::of::<T>(),
        method_userdata: Vec::new(),
    };

    for item in items {
        match item {
            ClassItem::Method(entry) => {
                registered.record.methods.push(entry.name.clone());
                let entry = Box::into_raw(Box::new(entry));
                registered.method_userdata.push(entry as usize);
                // SAFETY: the box stays alive until the class is unregistered.
                unsafe { submit_method(&class_name, entry) };
            }
            ClassItem::Property { info, getter, setter } => {
                registered.record.properties.push(info.name.clone());
                let mut sys_info = info.to_sys();
                let raw = sys_info.raw();
                let getter = StringName::from(getter.as_str());
                let setter = StringName::from(setter.as_str());
                // SAFETY: every pointer outlives the call.
                unsafe {
                    (interface.fns.classdb_register_extension_class_property)(
                        library,
                        class_name.sys(),
                        &raw,
                        setter.sys(),
                        getter.sys(),
                    )
                };
            }
            ClassItem::Signal(signal) => {
                registered.record.signals.push(signal.name.clone());
                let arguments = PropInfoList::new(&signal.arguments);
                let name = StringName::from(signal.name.as_str());
                // SAFETY: every pointer outlives the call.
                unsafe {
                    (interface.fns.classdb_register_extension_class_signal)(
                        library,
                        class_name.sys(),
                        name.sys(),
                        arguments.as_ptr(),
                        arguments.len() as sys::Int,
                    )
                };
            }
            ClassItem::Constant {
                enum_name,
                name,
                value,
                is_bitfield,
            } => {
                registered.record.constants.push((name.clone(), value));
                let enum_name = StringName::from(enum_name.as_str());
                let name = StringName::from(name.as_str());
                // SAFETY: every pointer outlives the call.
                unsafe {
                    (interface.fns.classdb_register_extension_class_integer_constant)(
                        library,
                        class_name.sys(),
                        enum_name.sys(),
                        name.sys(),
                        value,
                        sys::to_bool(is_bitfield),
                    )
                };
            }
            ClassItem::Group { name, prefix } => {
                let name = GString::from(name.as_str());
                let prefix = GString::from(prefix.as_str());
                // SAFETY: every pointer outlives the call.
                unsafe {
                    (interface.fns.classdb_register_extension_class_property_group)(
                        library,
                        class_name.sys(),
                        name.sys(),
                        prefix.sys(),
                    )
                };
            }
            ClassItem::Subgroup { name, prefix } => {
                let name = GString::from(name.as_str());
                let prefix = GString::from(prefix.as_str());
                // SAFETY: every pointer outlives the call.
                unsafe {
                    (interface.fns.classdb_register_extension_class_property_subgroup)(
                        library,
                        class_name.sys(),
                        name.sys(),
                        prefix.sys(),
                    )
                };
            }
        }
    }
    registered
}

/// # Safety
/// `entry` must stay valid for as long as the engine may call the method.
unsafe fn submit_method(class_name: &StringName, entry: *mut MethodEntry) {
    let method = &*entry;
    let interface = sys::interface();
    let mut name = StringName::from(method.name.as_str());
    let mut arguments = PropInfoList::new(&method.arguments);
    let mut metadata = vec![METHOD_ARGUMENT_METADATA_NONE; arguments.len()];
    let mut return_sys: Option<PropInfoSys> = method.return_info.as_ref().map(|info| info.to_sys());
    let mut return_raw = return_sys.as_mut().map(PropInfoSys::raw);

    let info = ClassMethodInfoRaw {
        name: name.sys_mut(),
        method_userdata: entry as *mut c_void,
        call_func: Some(method_call),
        ptrcall_func: Some(method_ptrcall),
        method_flags: method.flags.bits() as u32,
        has_return_value: sys::to_bool(return_raw.is_some()),
        return_value_info: return_raw
            .as_mut()
            .map_or(std::ptr::null_mut(), |raw| raw as *mut _),
        return_value_metadata: METHOD_ARGUMENT_METADATA_NONE,
        argument_count: arguments.len() as u32,
        arguments_info: arguments.as_mut_ptr(),
        arguments_metadata: if metadata.is_empty() {
            std::ptr::null_mut()
        } else {
            metadata.as_mut_ptr()
        },
        default_argument_count: 0,
        default_arguments: std::ptr::null_mut(),
    };
    (interface.fns.classdb_register_extension_class_method)(interface.library(), class_name.sys(), &info);
}

/// Registration summary of a class registered through this bridge.
pub fn class_record(name: &str) -> Option<ClassRecord> {
    lock()
        .classes
        .iter()
        .find(|class| class.record.name == name)
        .map(|class| class.record.clone())
}

/// Registered class names, parents before children.
pub fn registered_classes() -> Vec<String> {
    lock().classes.iter().map(|class| class.record.name.clone()).collect()
}

/// Unregisters every class in reverse registration order and releases the method tables.
/// Returns how many classes were unregistered.
pub fn unregister_classes() -> usize {
    let classes = {
        let mut state = lock();
        let classes = std::mem::take(&mut state.classes);
        for class in &classes {
            state.names.remove(&class.record.name);
            state.cells.remove(&class.type_id);
        }
        classes
    };
    let Some(interface) = sys::try_interface() else {
        return 0;
    };

    let count = classes.len();
    for class in classes.into_iter().rev() {
        let name = StringName::from(class.record.name.as_str());
        // SAFETY: the name outlives the call; the class was registered by this library.
        unsafe { (interface.fns.classdb_unregister_extension_class)(interface.library(), name.sys()) };
        for userdata in class.method_userdata {
            // SAFETY: created by Box::into_raw in `submit`; the engine no longer calls the method.
            drop(unsafe { Box::from_raw(userdata as *mut MethodEntry) });
        }
        tracing::debug!(target: "registry", "Unregistered class {}", class.record.name);
    }
    count
}
