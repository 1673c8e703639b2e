//! 模拟引擎的对象数据库
//!
//! - 对象记录：伪地址、实例 id、类名、引用计数、扩展实例与实例绑定
//! - 类数据库：内置的几个原生类，以及扩展注册的类、方法、属性、信号、常量与分组
//! - `RefCounted` 的方法绑定、可调用对象与信号
//!
//! 任何回调扩展的操作（释放实例、调用方法、释放绑定）都在释放锁之后执行。

use super::lock;
use super::value::{self, Words, NIL};
use crate::core::error::CallError;
use crate::sys::{
    self, CallErrorRaw, CallableCustomInfoRaw, ClassCreateInstance, ClassCreationInfo2Raw,
    ClassFreeInstance, ClassMethodCall, ClassMethodInfoRaw, ClassMethodPtrCall, ClassToString,
    ConstObjectPtr, ConstStringNamePtr, ConstStringPtr, ConstTypePtr, ConstVariantPtr,
    InstanceBindingCallbacksRaw, InstanceIdRaw, Int, MethodBindPtr, ObjectHandle, ObjectPtr,
    PropertyInfoRaw, TypePtr, UninitializedTypePtr, UninitializedVariantPtr, VariantPtr,
};
use crate::variant::{GType, Variant};
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

const FIRST_ADDRESS: usize = 0x10_0000;
const ADDRESS_STRIDE: usize = 0x40;
const FIRST_INSTANCE_ID: u64 = 0x1_0000_0000;

static NEXT_OBJECT: AtomicUsize = AtomicUsize::new(0);
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Native classes known without registration: `(name, parent, refcounted)`.
const NATIVE_CLASSES: &[(&str, Option<&str>, bool)] = &[
    ("Object", None, false),
    ("RefCounted", Some("Object"), true),
    ("Resource", Some("RefCounted"), true),
    ("Image", Some("Resource"), true),
    ("Node", Some("Object"), false),
    ("Node2D", Some("Node"), false),
    ("Sprite2D", Some("Node2D"), false),
    ("Timer", Some("Node"), false),
];

struct Binding {
    token: usize,
    binding: usize,
    callbacks: InstanceBindingCallbacksRaw,
}

struct ObjectRecord {
    id: u64,
    class: String,
    refcount: Option<i64>,
    instance: Option<usize>,
    bindings: Vec<Binding>,
}

struct RegisteredMethod {
    userdata: usize,
    call: Option<ClassMethodCall>,
    ptrcall: Option<ClassMethodPtrCall>,
    description: MethodDescription,
}

struct ExtensionClass {
    library: usize,
    is_virtual: bool,
    is_exposed: bool,
    create: Option<ClassCreateInstance>,
    free: Option<ClassFreeInstance>,
    to_string: Option<ClassToString>,
    userdata: usize,
    methods: Vec<RegisteredMethod>,
    properties: Vec<PropertyDescription>,
    signals: Vec<SignalDescription>,
    constants: Vec<ConstantDescription>,
    groups: Vec<GroupDescription>,
}

struct ClassEntry {
    name: String,
    parent: Option<String>,
    refcounted: bool,
    tag: usize,
    is_abstract: bool,
    extension: Option<ExtensionClass>,
}

#[derive(Default)]
struct ObjectDb {
    objects: HashMap<usize, ObjectRecord>,
    by_id: HashMap<u64, usize>,
    classes: HashMap<String, ClassEntry>,
    next_tag: usize,
    emitted: Vec<EmittedSignal>,
}

impl ObjectDb {
    fn with_native_classes() -> Self {
        let mut db = Self::default();
        for (name, parent, refcounted) in NATIVE_CLASSES {
            db.add_class(name, parent.map(str::to_string), *refcounted, false, None);
        }
        db
    }

    fn add_class(
        &mut self,
        name: &str,
        parent: Option<String>,
        refcounted: bool,
        is_abstract: bool,
        extension: Option<ExtensionClass>,
    ) {
        self.next_tag += 1;
        self.classes.insert(
            name.to_string(),
            ClassEntry {
                name: name.to_string(),
                parent,
                refcounted,
                tag: self.next_tag,
                is_abstract,
                extension,
            },
        );
    }

    /// `class` followed by its ancestors.
    fn chain(&self, class: &str) -> Vec<&ClassEntry> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(class);
        while let Some(entry) = current {
            chain.push(entry);
            current = entry.parent.as_deref().and_then(|parent| self.classes.get(parent));
        }
        chain
    }

    fn inherits(&self, class: &str, ancestor: &str) -> bool {
        self.chain(class).iter().any(|entry| entry.name == ancestor)
    }

    fn find_method(&self, class: &str, method: &str) -> Option<&RegisteredMethod> {
        self.chain(class).into_iter().find_map(|entry| {
            entry
                .extension
                .as_ref()
                .and_then(|ext| ext.methods.iter().find(|m| m.description.name == method))
        })
    }

    fn find_property(&self, class: &str, property: &str) -> Option<&PropertyDescription> {
        self.chain(class).into_iter().find_map(|entry| {
            entry
                .extension
                .as_ref()
                .and_then(|ext| ext.properties.iter().find(|p| p.info.name == property))
        })
    }

    fn extension_mut(&mut self, library: usize, class: &str) -> Option<&mut ExtensionClass> {
        let found = self
            .classes
            .get_mut(class)
            .and_then(|entry| entry.extension.as_mut())
            .filter(|ext| ext.library == library);
        if found.is_none() {
            tracing::error!(target: "sim", "Class {} is not registered by this library", class);
        }
        found
    }

    fn create_native(&mut self, class: &str, refcounted: bool) -> usize {
        let seq = NEXT_OBJECT.fetch_add(1, Ordering::AcqRel);
        let addr = FIRST_ADDRESS + seq * ADDRESS_STRIDE;
        let id = FIRST_INSTANCE_ID + NEXT_ID.fetch_add(1, Ordering::AcqRel);
        self.objects.insert(
            addr,
            ObjectRecord {
                id,
                class: class.to_string(),
                refcount: refcounted.then_some(0),
                instance: None,
                bindings: Vec::new(),
            },
        );
        self.by_id.insert(id, addr);
        addr
    }
}

fn db() -> MutexGuard<'static, ObjectDb> {
    static DB: OnceLock<Mutex<ObjectDb>> = OnceLock::new();
    lock(DB.get_or_init(|| Mutex::new(ObjectDb::with_native_classes())))
}

// ---- snapshots -------------------------------------------------------------

/// Captured `GDExtensionPropertyInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescription {
    pub name: String,
    pub gtype: GType,
    pub class_name: String,
    pub hint: u32,
    pub hint_string: String,
    pub usage: u32,
}

impl ArgumentDescription {
    /// # Safety
    /// Every string pointer in `raw` must be null or valid.
    unsafe fn capture(raw: &PropertyInfoRaw) -> Self {
        Self {
            name: value::text_at(raw.name),
            gtype: GType::from_sys(raw.type_).unwrap_or(GType::Nil),
            class_name: value::text_at(raw.class_name),
            hint: raw.hint,
            hint_string: value::text_at(raw.hint_string),
            usage: raw.usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescription {
    pub name: String,
    pub flags: u32,
    pub arguments: Vec<ArgumentDescription>,
    pub return_value: Option<ArgumentDescription>,
    pub default_argument_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescription {
    pub info: ArgumentDescription,
    pub setter: String,
    pub getter: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDescription {
    pub name: String,
    pub arguments: Vec<ArgumentDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantDescription {
    pub enum_name: String,
    pub name: String,
    pub value: i64,
    pub is_bitfield: bool,
}

/// Property group or subgroup; `position` is the number of properties registered before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    pub name: String,
    pub prefix: String,
    pub subgroup: bool,
    pub position: usize,
}

/// Everything the engine captured for one extension class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescription {
    pub name: String,
    pub parent: String,
    pub is_abstract: bool,
    pub is_virtual: bool,
    pub is_exposed: bool,
    pub methods: Vec<MethodDescription>,
    pub properties: Vec<PropertyDescription>,
    pub signals: Vec<SignalDescription>,
    pub constants: Vec<ConstantDescription>,
    pub groups: Vec<GroupDescription>,
}

/// Signal emission observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedSignal {
    pub instance_id: sys::InstanceId,
    pub name: String,
    pub argument_count: usize,
}

pub fn class_description(name: &str) -> Option<ClassDescription> {
    let db = db();
    let entry = db.classes.get(name)?;
    let ext = entry.extension.as_ref()?;
    Some(ClassDescription {
        name: entry.name.clone(),
        parent: entry.parent.clone().unwrap_or_default(),
        is_abstract: entry.is_abstract,
        is_virtual: ext.is_virtual,
        is_exposed: ext.is_exposed,
        methods: ext.methods.iter().map(|m| m.description.clone()).collect(),
        properties: ext.properties.clone(),
        signals: ext.signals.clone(),
        constants: ext.constants.clone(),
        groups: ext.groups.clone(),
    })
}

/// Whether the class database knows `name`, native or extension.
pub fn class_exists(name: &str) -> bool {
    db().classes.contains_key(name)
}

/// Method registered on `class` or one of its extension ancestors.
pub fn registered_method(class: &str, method: &str) -> Option<MethodDescription> {
    db().find_method(class, method).map(|m| m.description.clone())
}

/// Drains the emitted-signal log.
pub fn take_emitted_signals() -> Vec<EmittedSignal> {
    std::mem::take(&mut db().emitted)
}

// ---- object introspection ----------------------------------------------------

pub fn refcount_of(handle: ObjectHandle) -> Option<i64> {
    db().objects.get(&handle.addr()).and_then(|record| record.refcount)
}

pub fn is_alive(handle: ObjectHandle) -> bool {
    db().objects.contains_key(&handle.addr())
}

/// Most-derived class recorded for a live object.
pub fn class_of(handle: ObjectHandle) -> Option<String> {
    db().objects.get(&handle.addr()).map(|record| record.class.clone())
}

pub fn live_object_count() -> usize {
    db().objects.len()
}

/// Constructs an object the way the engine does for scripts; ref-counted objects start at zero.
pub fn construct(class: &str) -> Option<ObjectHandle> {
    let name = value::intern(class);
    // SAFETY: the interned handle stays valid until released below.
    let ptr = unsafe { classdb_construct_object2(&name as *const usize as ConstStringNamePtr) };
    unsafe { value::release::<String>(name) };
    ObjectHandle::from_ptr(ptr)
}

/// Destroys an object regardless of its reference count.
pub fn destroy(handle: ObjectHandle) {
    destroy_object(handle.addr());
}

pub(crate) fn instance_id_raw(addr: usize) -> u64 {
    db().objects.get(&addr).map_or(0, |record| record.id)
}

pub(crate) fn object_inherits(addr: usize, ancestor: &str) -> bool {
    let db = db();
    db.objects
        .get(&addr)
        .map_or(false, |record| db.inherits(&record.class, ancestor))
}

/// Variant payload for an object pointer; the payload holds one reference of ref-counted objects.
pub(crate) fn object_words(addr: usize) -> Words {
    let mut db = db();
    let Some(record) = db.objects.get_mut(&addr) else {
        return NIL;
    };
    if let Some(count) = record.refcount.as_mut() {
        *count += 1;
    }
    let mut words = NIL;
    words[0] = GType::Object.to_sys() as u64;
    words[1] = addr as u64;
    words[2] = record.id;
    words
}

/// Drops the reference held by an object payload.
pub(crate) fn release_variant_reference(addr: usize, id: u64) {
    let destroy = {
        let mut db = db();
        match db.objects.get_mut(&addr) {
            Some(record) if record.id == id => match record.refcount.as_mut() {
                Some(count) => {
                    *count -= 1;
                    *count <= 0
                }
                None => false,
            },
            _ => false,
        }
    };
    if destroy {
        destroy_object(addr);
    }
}

fn destroy_object(addr: usize) {
    let (record, free) = {
        let mut db = db();
        let Some(record) = db.objects.remove(&addr) else {
            return;
        };
        db.by_id.remove(&record.id);
        let free = record.instance.and_then(|instance| {
            db.chain(&record.class)
                .into_iter()
                .find_map(|entry| entry.extension.as_ref())
                .and_then(|ext| ext.free.map(|free| (free, ext.userdata, instance)))
        });
        (record, free)
    };
    tracing::trace!(target: "sim", "Destroying {} {:#x}", record.class, addr);
    if let Some((free, userdata, instance)) = free {
        // SAFETY: the instance was handed over by object_set_instance and is released once.
        unsafe { free(userdata as *mut c_void, instance as *mut c_void) };
    }
    for binding in record.bindings {
        if let Some(free) = binding.callbacks.free_callback {
            // SAFETY: the binding was registered with these callbacks.
            unsafe {
                free(
                    binding.token as *mut c_void,
                    addr as *mut c_void,
                    binding.binding as *mut c_void,
                )
            };
        }
    }
}

/// Text for `stringify`: the extension's `to_string` or `<Class#id>`.
pub(crate) fn object_display(addr: usize) -> String {
    let (fallback, custom) = {
        let db = db();
        let Some(record) = db.objects.get(&addr) else {
            return "<Freed Object>".to_string();
        };
        let fallback = format!("<{}#{}>", record.class, record.id);
        let custom = record.instance.and_then(|instance| {
            db.chain(&record.class)
                .into_iter()
                .find_map(|entry| entry.extension.as_ref().and_then(|ext| ext.to_string))
                .map(|to_string| (to_string, instance))
        });
        (fallback, custom)
    };
    let Some((to_string, instance)) = custom else {
        return fallback;
    };
    let mut out = value::string_new("");
    let mut valid = sys::FALSE;
    // SAFETY: `out` holds an initialized String the callback may replace.
    unsafe {
        to_string(instance as *mut c_void, &mut valid, &mut out as *mut usize as sys::StringPtr);
        let text = value::string_text(out).to_string();
        value::release::<String>(out);
        if sys::from_bool(valid) {
            text
        } else {
            fallback
        }
    }
}

// ---- RefCounted method binds ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeMethod {
    InitRef,
    Reference,
    Unreference,
    GetReferenceCount,
    GetInstanceId,
    GetClass,
}

struct NativeBind {
    class: &'static str,
    method: &'static str,
    hash: i64,
    kind: NativeMethod,
}

static NATIVE_BINDS: [NativeBind; 6] = [
    NativeBind { class: "RefCounted", method: "init_ref", hash: 2240911060, kind: NativeMethod::InitRef },
    NativeBind { class: "RefCounted", method: "reference", hash: 2240911060, kind: NativeMethod::Reference },
    NativeBind { class: "RefCounted", method: "unreference", hash: 2240911060, kind: NativeMethod::Unreference },
    NativeBind {
        class: "RefCounted",
        method: "get_reference_count",
        hash: 3905245786,
        kind: NativeMethod::GetReferenceCount,
    },
    NativeBind { class: "Object", method: "get_instance_id", hash: 2455072627, kind: NativeMethod::GetInstanceId },
    NativeBind { class: "Object", method: "get_class", hash: 201670096, kind: NativeMethod::GetClass },
];

enum NativeResult {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn native_bind(bind: MethodBindPtr) -> Option<&'static NativeBind> {
    NATIVE_BINDS
        .iter()
        .find(|entry| std::ptr::eq(*entry as *const NativeBind as *const c_void, bind))
}

fn run_native(kind: NativeMethod, addr: usize) -> Option<NativeResult> {
    let mut db = db();
    let record = db.objects.get_mut(&addr)?;
    let result = match kind {
        NativeMethod::InitRef | NativeMethod::Reference => {
            let count = record.refcount.as_mut()?;
            *count += 1;
            NativeResult::Bool(true)
        }
        NativeMethod::Unreference => {
            let count = record.refcount.as_mut()?;
            *count = (*count - 1).max(0);
            NativeResult::Bool(*count == 0)
        }
        NativeMethod::GetReferenceCount => NativeResult::Int(record.refcount?),
        NativeMethod::GetInstanceId => NativeResult::Int(record.id as i64),
        NativeMethod::GetClass => NativeResult::Text(record.class.clone()),
    };
    Some(result)
}

pub(crate) unsafe extern "C" fn classdb_get_method_bind(
    class_name: ConstStringNamePtr,
    method_name: ConstStringNamePtr,
    hash: Int,
) -> MethodBindPtr {
    let class_name = value::text_at(class_name);
    let method_name = value::text_at(method_name);
    let found = NATIVE_BINDS.iter().find(|entry| {
        entry.method == method_name && db().inherits(&class_name, entry.class)
    });
    match found {
        Some(entry) if entry.hash == hash => entry as *const NativeBind as MethodBindPtr,
        Some(entry) => {
            tracing::error!(
                target: "sim",
                "Hash mismatch for {}.{}: expected {}, got {}",
                class_name,
                method_name,
                entry.hash,
                hash
            );
            std::ptr::null()
        }
        None => std::ptr::null(),
    }
}

pub(crate) unsafe extern "C" fn object_method_bind_ptrcall(
    bind: MethodBindPtr,
    object: ObjectPtr,
    _args: *const ConstTypePtr,
    ret: TypePtr,
) {
    let Some(entry) = native_bind(bind) else {
        tracing::error!(target: "sim", "Unknown method bind {:p}", bind);
        return;
    };
    let Some(result) = run_native(entry.kind, object as usize) else {
        tracing::error!(target: "sim", "{} called on an invalid object", entry.method);
        return;
    };
    if ret.is_null() {
        return;
    }
    match result {
        NativeResult::Bool(value) => *(ret as *mut sys::Bool) = sys::to_bool(value),
        NativeResult::Int(value) => *(ret as *mut i64) = value,
        NativeResult::Text(text) => {
            value::release::<String>(*(ret as *const usize));
            *(ret as *mut usize) = value::string_new(&text);
        }
    }
}

pub(crate) unsafe extern "C" fn object_method_bind_call(
    bind: MethodBindPtr,
    object: ObjectPtr,
    _args: *const ConstVariantPtr,
    _argc: Int,
    ret: UninitializedVariantPtr,
    error: *mut CallErrorRaw,
) {
    let outcome = native_bind(bind).and_then(|entry| run_native(entry.kind, object as usize));
    let code = if outcome.is_some() {
        sys::CALL_OK
    } else {
        sys::CALL_ERROR_INSTANCE_IS_NULL
    };
    let words = match outcome {
        Some(NativeResult::Bool(value)) => value::make_bool(value),
        Some(NativeResult::Int(value)) => value::make_int(value),
        Some(NativeResult::Text(text)) => value::make_string(&text),
        None => NIL,
    };
    *(ret as *mut Words) = words;
    write_error(error, code, 0, 0);
}

unsafe fn write_error(error: *mut CallErrorRaw, code: u32, argument: i32, expected: i32) {
    if !error.is_null() {
        *error = CallErrorRaw {
            error: code,
            argument,
            expected,
        };
    }
}

// ---- object functions ------------------------------------------------------------

pub(crate) unsafe extern "C" fn classdb_construct_object2(class_name: ConstStringNamePtr) -> ObjectPtr {
    let name = value::text_at(class_name);
    let (create, userdata) = {
        let mut db = db();
        let Some(entry) = db.classes.get(&name) else {
            tracing::error!(target: "sim", "Cannot construct unknown class {}", name);
            return std::ptr::null_mut();
        };
        if entry.is_abstract {
            tracing::error!(target: "sim", "Cannot construct abstract class {}", name);
            return std::ptr::null_mut();
        }
        let refcounted = entry.refcounted;
        match entry.extension.as_ref().map(|ext| (ext.create, ext.userdata)) {
            Some((Some(create), userdata)) => (create, userdata),
            Some((None, _)) => return std::ptr::null_mut(),
            None => return db.create_native(&name, refcounted) as ObjectPtr,
        }
    };
    create(userdata as *mut c_void)
}

pub(crate) unsafe extern "C" fn object_destroy(object: ObjectPtr) {
    destroy_object(object as usize);
}

pub(crate) unsafe extern "C" fn object_set_instance(
    object: ObjectPtr,
    class_name: ConstStringNamePtr,
    instance: sys::ClassInstancePtr,
) {
    let class_name = value::text_at(class_name);
    let mut db = db();
    let known = db.classes.contains_key(&class_name);
    match db.objects.get_mut(&(object as usize)) {
        Some(record) if known => {
            record.class = class_name;
            record.instance = Some(instance as usize);
        }
        Some(_) => tracing::error!(target: "sim", "object_set_instance with unknown class {}", class_name),
        None => tracing::error!(target: "sim", "object_set_instance on an invalid object"),
    }
}

pub(crate) unsafe extern "C" fn object_get_class_name(
    object: ConstObjectPtr,
    _library: sys::ClassLibraryPtr,
    out: sys::UninitializedStringNamePtr,
) -> sys::Bool {
    let class = db().objects.get(&(object as usize)).map(|record| record.class.clone());
    *(out as *mut usize) = value::intern(class.as_deref().unwrap_or(""));
    sys::to_bool(class.is_some())
}

pub(crate) unsafe extern "C" fn classdb_get_class_tag(class_name: ConstStringNamePtr) -> *mut c_void {
    let name = value::text_at(class_name);
    db().classes
        .get(&name)
        .map_or(std::ptr::null_mut(), |entry| entry.tag as *mut c_void)
}

pub(crate) unsafe extern "C" fn object_cast_to(object: ConstObjectPtr, tag: *mut c_void) -> ObjectPtr {
    let db = db();
    let Some(record) = db.objects.get(&(object as usize)) else {
        return std::ptr::null_mut();
    };
    let matches = db.chain(&record.class).iter().any(|entry| entry.tag == tag as usize);
    if matches {
        object as ObjectPtr
    } else {
        std::ptr::null_mut()
    }
}

pub(crate) unsafe extern "C" fn object_get_instance_from_id(id: InstanceIdRaw) -> ObjectPtr {
    db().by_id.get(&id).map_or(std::ptr::null_mut(), |addr| *addr as ObjectPtr)
}

pub(crate) unsafe extern "C" fn object_get_instance_id(object: ConstObjectPtr) -> InstanceIdRaw {
    instance_id_raw(object as usize)
}

pub(crate) unsafe extern "C" fn object_set_instance_binding(
    object: ObjectPtr,
    token: *mut c_void,
    binding: *mut c_void,
    callbacks: *const InstanceBindingCallbacksRaw,
) {
    let mut db = db();
    let Some(record) = db.objects.get_mut(&(object as usize)) else {
        tracing::error!(target: "sim", "object_set_instance_binding on an invalid object");
        return;
    };
    record.bindings.retain(|existing| existing.token != token as usize);
    record.bindings.push(Binding {
        token: token as usize,
        binding: binding as usize,
        callbacks: *callbacks,
    });
}

pub(crate) unsafe extern "C" fn object_get_instance_binding(
    object: ObjectPtr,
    token: *mut c_void,
    callbacks: *const InstanceBindingCallbacksRaw,
) -> *mut c_void {
    {
        let db = db();
        let Some(record) = db.objects.get(&(object as usize)) else {
            return std::ptr::null_mut();
        };
        if let Some(existing) = record.bindings.iter().find(|b| b.token == token as usize) {
            return existing.binding as *mut c_void;
        }
    }
    let Some(create) = callbacks.as_ref().and_then(|callbacks| callbacks.create_callback) else {
        return std::ptr::null_mut();
    };
    let binding = create(token, object);
    object_set_instance_binding(object, token, binding, callbacks);
    binding
}

pub(crate) unsafe extern "C" fn object_free_instance_binding(object: ObjectPtr, token: *mut c_void) {
    let removed = {
        let mut db = db();
        db.objects.get_mut(&(object as usize)).and_then(|record| {
            let index = record.bindings.iter().position(|b| b.token == token as usize)?;
            Some(record.bindings.remove(index))
        })
    };
    if let Some(binding) = removed {
        if let Some(free) = binding.callbacks.free_callback {
            free(token, object, binding.binding as *mut c_void);
        }
    }
}

// ---- registration capture -----------------------------------------------------------

unsafe fn capture_list(ptr: *const PropertyInfoRaw, count: usize) -> Vec<ArgumentDescription> {
    if ptr.is_null() {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptr, count)
        .iter()
        .map(|raw| ArgumentDescription::capture(raw))
        .collect()
}

pub(crate) unsafe extern "C" fn classdb_register_extension_class2(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
    parent_name: ConstStringNamePtr,
    info: *const ClassCreationInfo2Raw,
) {
    let name = value::text_at(class_name);
    let parent = value::text_at(parent_name);
    let info = &*info;
    let mut db = db();
    if db.classes.contains_key(&name) {
        tracing::error!(target: "sim", "Class {} is already registered", name);
        return;
    }
    let Some(parent_entry) = db.classes.get(&parent) else {
        tracing::error!(target: "sim", "Parent class {} of {} is not registered", parent, name);
        return;
    };
    let refcounted = parent_entry.refcounted;
    let extension = ExtensionClass {
        library: library as usize,
        is_virtual: sys::from_bool(info.is_virtual),
        is_exposed: sys::from_bool(info.is_exposed),
        create: info.create_instance_func,
        free: info.free_instance_func,
        to_string: info.to_string_func,
        userdata: info.class_userdata as usize,
        methods: Vec::new(),
        properties: Vec::new(),
        signals: Vec::new(),
        constants: Vec::new(),
        groups: Vec::new(),
    };
    db.add_class(&name, Some(parent), refcounted, sys::from_bool(info.is_abstract), Some(extension));
    tracing::debug!(target: "sim", "Registered extension class {}", name);
}

pub(crate) unsafe extern "C" fn classdb_register_extension_class_method(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
    info: *const ClassMethodInfoRaw,
) {
    let class = value::text_at(class_name);
    let info = &*info;
    let description = MethodDescription {
        name: value::text_at(info.name),
        flags: info.method_flags,
        arguments: capture_list(info.arguments_info, info.argument_count as usize),
        return_value: (sys::from_bool(info.has_return_value) && !info.return_value_info.is_null())
            .then(|| ArgumentDescription::capture(&*info.return_value_info)),
        default_argument_count: info.default_argument_count,
    };
    let mut db = db();
    let Some(ext) = db.extension_mut(library as usize, &class) else {
        return;
    };
    if ext.methods.iter().any(|m| m.description.name == description.name) {
        tracing::error!(target: "sim", "Method {}.{} is already registered", class, description.name);
        return;
    }
    ext.methods.push(RegisteredMethod {
        userdata: info.method_userdata as usize,
        call: info.call_func,
        ptrcall: info.ptrcall_func,
        description,
    });
}

pub(crate) unsafe extern "C" fn classdb_register_extension_class_integer_constant(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
    enum_name: ConstStringNamePtr,
    constant_name: ConstStringNamePtr,
    constant_value: Int,
    is_bitfield: sys::Bool,
) {
    let class = value::text_at(class_name);
    let constant = ConstantDescription {
        enum_name: value::text_at(enum_name),
        name: value::text_at(constant_name),
        value: constant_value,
        is_bitfield: sys::from_bool(is_bitfield),
    };
    let mut db = db();
    let Some(ext) = db.extension_mut(library as usize, &class) else {
        return;
    };
    if ext.constants.iter().any(|c| c.name == constant.name) {
        tracing::error!(target: "sim", "Constant {}.{} is already registered", class, constant.name);
        return;
    }
    ext.constants.push(constant);
}

pub(crate) unsafe extern "C" fn classdb_register_extension_class_property(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
    info: *const PropertyInfoRaw,
    setter: ConstStringNamePtr,
    getter: ConstStringNamePtr,
) {
    let class = value::text_at(class_name);
    let property = PropertyDescription {
        info: ArgumentDescription::capture(&*info),
        setter: value::text_at(setter),
        getter: value::text_at(getter),
    };
    let mut db = db();
    let getter_known = db.find_method(&class, &property.getter).is_some();
    let setter_known = property.setter.is_empty() || db.find_method(&class, &property.setter).is_some();
    if !getter_known || !setter_known {
        tracing::error!(
            target: "sim",
            "Property {}.{} refers to unknown accessors ({}, {})",
            class,
            property.info.name,
            property.getter,
            property.setter
        );
        return;
    }
    if let Some(ext) = db.extension_mut(library as usize, &class) {
        ext.properties.push(property);
    }
}

unsafe fn register_group(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
    name: ConstStringPtr,
    prefix: ConstStringPtr,
    subgroup: bool,
) {
    let class = value::text_at(class_name);
    let name = value::text_at(name);
    let prefix = value::text_at(prefix);
    let mut db = db();
    if let Some(ext) = db.extension_mut(library as usize, &class) {
        let position = ext.properties.len();
        ext.groups.push(GroupDescription {
            name,
            prefix,
            subgroup,
            position,
        });
    }
}

pub(crate) unsafe extern "C" fn classdb_register_extension_class_property_group(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
    group_name: ConstStringPtr,
    prefix: ConstStringPtr,
) {
    register_group(library, class_name, group_name, prefix, false);
}

pub(crate) unsafe extern "C" fn classdb_register_extension_class_property_subgroup(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
    subgroup_name: ConstStringPtr,
    prefix: ConstStringPtr,
) {
    register_group(library, class_name, subgroup_name, prefix, true);
}

pub(crate) unsafe extern "C" fn classdb_register_extension_class_signal(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
    signal_name: ConstStringNamePtr,
    arguments: *const PropertyInfoRaw,
    argument_count: Int,
) {
    let class = value::text_at(class_name);
    let signal = SignalDescription {
        name: value::text_at(signal_name),
        arguments: capture_list(arguments, argument_count.max(0) as usize),
    };
    let mut db = db();
    let Some(ext) = db.extension_mut(library as usize, &class) else {
        return;
    };
    if ext.signals.iter().any(|s| s.name == signal.name) {
        tracing::error!(target: "sim", "Signal {}.{} is already registered", class, signal.name);
        return;
    }
    ext.signals.push(signal);
}

pub(crate) unsafe extern "C" fn classdb_unregister_extension_class(
    library: sys::ClassLibraryPtr,
    class_name: ConstStringNamePtr,
) {
    let class = value::text_at(class_name);
    let mut db = db();
    if db.extension_mut(library as usize, &class).is_none() {
        return;
    }
    if let Some(child) = db
        .classes
        .values()
        .find(|entry| entry.parent.as_deref() == Some(class.as_str()))
    {
        tracing::error!(target: "sim", "Cannot unregister {}: {} still inherits from it", class, child.name);
        return;
    }
    db.classes.remove(&class);
    tracing::debug!(target: "sim", "Unregistered extension class {}", class);
}

// ---- method dispatch ------------------------------------------------------------------

/// Builtin `Object` methods answered by the engine itself.
fn object_builtin(addr: usize, method: &str, args: &[Words]) -> Option<Result<Words, u32>> {
    let db = db();
    let record = db.objects.get(&addr)?;
    let text_arg = || args.first().and_then(value::as_text);
    let result = match method {
        "get_class" => Ok(value::make_string(&record.class)),
        "get_instance_id" => Ok(value::make_int(record.id as i64)),
        "is_class" => match text_arg() {
            Some(name) => Ok(value::make_bool(db.inherits(&record.class, &name))),
            None => Err(sys::CALL_ERROR_INVALID_ARGUMENT),
        },
        "has_method" => match text_arg() {
            Some(name) => Ok(value::make_bool(db.find_method(&record.class, &name).is_some())),
            None => Err(sys::CALL_ERROR_INVALID_ARGUMENT),
        },
        "get_reference_count" => match record.refcount {
            Some(count) => Ok(value::make_int(count)),
            None => Err(sys::CALL_ERROR_INVALID_METHOD),
        },
        _ => return None,
    };
    Some(result)
}

/// Variant call of `method` on an object: extension methods first, then builtins.
///
/// # Safety
/// `args` must hold `argc` valid Variant pointers; `ret` must be writable Variant storage.
pub(crate) unsafe fn call_object_method(
    addr: usize,
    method: &str,
    args: *const ConstVariantPtr,
    argc: Int,
    ret: UninitializedVariantPtr,
    error: *mut CallErrorRaw,
) {
    *(ret as *mut Words) = NIL;
    let target = {
        let db = db();
        let Some(record) = db.objects.get(&addr) else {
            write_error(error, sys::CALL_ERROR_INSTANCE_IS_NULL, 0, 0);
            return;
        };
        db.find_method(&record.class, method)
            .map(|m| (m.call, m.userdata, record.instance.unwrap_or(0)))
    };
    match target {
        Some((Some(call), userdata, instance)) => {
            write_error(error, sys::CALL_OK, 0, 0);
            call(userdata as *mut c_void, instance as *mut c_void, args, argc, ret, error);
        }
        Some((None, ..)) => write_error(error, sys::CALL_ERROR_INVALID_METHOD, 0, 0),
        None => {
            let values: Vec<Words> = (0..argc.max(0) as usize)
                .map(|index| *(*args.add(index) as *const Words))
                .collect();
            match object_builtin(addr, method, &values) {
                Some(Ok(words)) => {
                    *(ret as *mut Words) = words;
                    write_error(error, sys::CALL_OK, 0, 0);
                }
                Some(Err(code)) => write_error(error, code, 0, 0),
                None => write_error(error, sys::CALL_ERROR_INVALID_METHOD, 0, 0),
            }
        }
    }
}

/// Calls a registered method the way GDScript would, through the Variant call path.
pub fn call_registered_method(handle: ObjectHandle, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
    let arg_ptrs: Vec<ConstVariantPtr> = args.iter().map(Variant::sys).collect();
    let mut error = CallErrorRaw::default();
    // SAFETY: the argument pointers outlive the call and the result slot starts as nil.
    let result = unsafe {
        Variant::new_with_uninit(|dst| {
            call_object_method(handle.addr(), method, arg_ptrs.as_ptr(), arg_ptrs.len() as Int, dst, &mut error)
        })
    };
    match CallError::from_sys(&error, method) {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

/// Calls a registered method through its pointer-call entry. Returns `false` when no such method exists.
///
/// # Safety
/// `args` must match the declared argument layouts and `ret` must point to initialized storage
/// of the declared return type (a Variant for Variant returns).
pub unsafe fn ptrcall_registered_method(
    handle: ObjectHandle,
    method: &str,
    args: &[ConstTypePtr],
    ret: TypePtr,
) -> bool {
    let target = {
        let db = db();
        let Some(record) = db.objects.get(&handle.addr()) else {
            return false;
        };
        db.find_method(&record.class, method)
            .and_then(|m| m.ptrcall.map(|ptrcall| (ptrcall, m.userdata, record.instance.unwrap_or(0))))
    };
    match target {
        Some((ptrcall, userdata, instance)) => {
            ptrcall(userdata as *mut c_void, instance as *mut c_void, args.as_ptr(), ret);
            true
        }
        None => false,
    }
}

/// Reads a property through its registered getter.
pub(crate) fn get_property(addr: usize, property: &str) -> Option<Words> {
    let getter = {
        let db = db();
        let record = db.objects.get(&addr)?;
        db.find_property(&record.class, property)?.getter.clone()
    };
    let mut ret = NIL;
    let mut error = CallErrorRaw::default();
    // SAFETY: no arguments; `ret` is a fresh Variant slot.
    unsafe {
        call_object_method(
            addr,
            &getter,
            std::ptr::null(),
            0,
            &mut ret as *mut Words as VariantPtr,
            &mut error,
        )
    };
    if error.is_ok() {
        Some(ret)
    } else {
        value::destroy_words(ret);
        None
    }
}

/// Writes a property through its registered setter.
pub(crate) fn set_property(addr: usize, property: &str, words: &Words) -> bool {
    let setter = {
        let db = db();
        let Some(record) = db.objects.get(&addr) else {
            return false;
        };
        match db.find_property(&record.class, property) {
            Some(found) if !found.setter.is_empty() => found.setter.clone(),
            _ => return false,
        }
    };
    let args = [words as *const Words as ConstVariantPtr];
    let mut ret = NIL;
    let mut error = CallErrorRaw::default();
    // SAFETY: one valid argument; `ret` is a fresh Variant slot.
    unsafe {
        call_object_method(addr, &setter, args.as_ptr(), 1, &mut ret as *mut Words as VariantPtr, &mut error)
    };
    value::destroy_words(ret);
    error.is_ok()
}

// ---- callables and signals --------------------------------------------------------------

pub(crate) struct CustomCallable(CallableCustomInfoRaw);

impl Drop for CustomCallable {
    fn drop(&mut self) {
        if let Some(free) = self.0.free_func {
            // SAFETY: the userdata is freed exactly once, with the last copy.
            unsafe { free(self.0.callable_userdata) };
        }
    }
}

pub(crate) enum CallableData {
    Custom(CustomCallable),
    Method {
        object: usize,
        instance_id: u64,
        method: String,
    },
}

pub(crate) struct SignalData {
    pub object: usize,
    pub instance_id: u64,
    pub name: String,
}

/// # Safety
/// `handle` must be zero or a live callable handle that outlives `'a`.
pub(crate) unsafe fn callable<'a>(handle: usize) -> Option<&'a CallableData> {
    (handle != 0).then(|| &*(handle as *const CallableData))
}

/// # Safety
/// `handle` must be zero or a live signal handle that outlives `'a`.
pub(crate) unsafe fn signal<'a>(handle: usize) -> Option<&'a SignalData> {
    (handle != 0).then(|| &*(handle as *const SignalData))
}

pub(crate) unsafe extern "C" fn callable_custom_create(dst: UninitializedTypePtr, info: *mut CallableCustomInfoRaw) {
    let data = CallableData::Custom(CustomCallable(*info));
    *(dst as *mut [usize; 2]) = [Arc::into_raw(Arc::new(data)) as usize, 0];
}

/// `(Object, StringName)` constructor of Callable and Signal.
pub(crate) unsafe fn construct_object_member(gtype: GType, dst: UninitializedTypePtr, args: *const ConstTypePtr) {
    let object = *(*args as *const usize);
    let member = value::text_at(*args.add(1));
    let instance_id = instance_id_raw(object);
    let handle = if gtype == GType::Signal {
        Arc::into_raw(Arc::new(SignalData {
            object,
            instance_id,
            name: member,
        })) as usize
    } else {
        Arc::into_raw(Arc::new(CallableData::Method {
            object,
            instance_id,
            method: member,
        })) as usize
    };
    *(dst as *mut [usize; 2]) = [handle, 0];
}

/// # Safety
/// Same contract as [`call_object_method`]; `handle` must be zero or a live callable.
pub(crate) unsafe fn call_callable(
    handle: usize,
    args: *const ConstVariantPtr,
    argc: Int,
    ret: UninitializedVariantPtr,
    error: *mut CallErrorRaw,
) {
    *(ret as *mut Words) = NIL;
    match callable(handle) {
        None => write_error(error, sys::CALL_ERROR_INSTANCE_IS_NULL, 0, 0),
        Some(CallableData::Custom(custom)) => match custom.0.call_func {
            Some(call) => {
                write_error(error, sys::CALL_OK, 0, 0);
                call(custom.0.callable_userdata, args, argc, ret, error);
            }
            None => write_error(error, sys::CALL_ERROR_INVALID_METHOD, 0, 0),
        },
        Some(CallableData::Method {
            instance_id,
            method,
            ..
        }) => {
            let object = object_get_instance_from_id(*instance_id);
            if object.is_null() {
                write_error(error, sys::CALL_ERROR_INSTANCE_IS_NULL, 0, 0);
            } else {
                call_object_method(object as usize, method, args, argc, ret, error);
            }
        }
    }
}

/// Records an emission; emitting on a freed object is an error.
pub(crate) unsafe fn emit_signal(handle: usize, argc: Int, error: *mut CallErrorRaw) {
    let Some(data) = signal(handle) else {
        write_error(error, sys::CALL_ERROR_INSTANCE_IS_NULL, 0, 0);
        return;
    };
    let mut db = db();
    if !db.by_id.contains_key(&data.instance_id) {
        write_error(error, sys::CALL_ERROR_INSTANCE_IS_NULL, 0, 0);
        return;
    }
    db.emitted.push(EmittedSignal {
        instance_id: sys::InstanceId(data.instance_id),
        name: data.name.clone(),
        argument_count: argc.max(0) as usize,
    });
    write_error(error, sys::CALL_OK, 0, 0);
}

/// Text for `stringify` of a callable.
pub(crate) fn callable_display(handle: usize) -> String {
    // SAFETY: payload handles are live while the payload is.
    match unsafe { callable(handle) } {
        None => "null::null".to_string(),
        Some(CallableData::Custom(custom)) => match custom.0.to_string_func {
            Some(to_string) => {
                let mut out = value::string_new("");
                let mut valid = sys::FALSE;
                unsafe {
                    to_string(custom.0.callable_userdata, &mut valid, &mut out as *mut usize as sys::StringPtr);
                    let text = value::string_text(out).to_string();
                    value::release::<String>(out);
                    if sys::from_bool(valid) {
                        text
                    } else {
                        "<CallableCustom>".to_string()
                    }
                }
            }
            None => "<CallableCustom>".to_string(),
        },
        Some(CallableData::Method { object, method, .. }) => {
            let class = db().objects.get(object).map(|record| record.class.clone());
            format!("{}::{}", class.as_deref().unwrap_or("null"), method)
        }
    }
}

/// Identity used by equality and hashing of callables.
#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) enum CallableKey {
    Null,
    Custom(usize),
    Method(u64, String),
}

pub(crate) fn callable_key(handle: usize) -> CallableKey {
    match unsafe { callable(handle) } {
        None => CallableKey::Null,
        Some(CallableData::Custom(custom)) => CallableKey::Custom(custom.0.callable_userdata as usize),
        Some(CallableData::Method {
            instance_id,
            method,
            ..
        }) => CallableKey::Method(*instance_id, method.clone()),
    }
}

/// Custom hash of a callable, when it provides one.
pub(crate) fn callable_custom_hash(handle: usize) -> Option<u32> {
    match unsafe { callable(handle) } {
        Some(CallableData::Custom(custom)) => {
            let hash = custom.0.hash_func?;
            Some(unsafe { hash(custom.0.callable_userdata) })
        }
        _ => None,
    }
}

pub(crate) fn callable_method_name(handle: usize) -> String {
    match unsafe { callable(handle) } {
        Some(CallableData::Method { method, .. }) => method.clone(),
        _ => String::new(),
    }
}

pub(crate) fn callable_object_id(handle: usize) -> u64 {
    match unsafe { callable(handle) } {
        Some(CallableData::Method { instance_id, .. }) => *instance_id,
        Some(CallableData::Custom(custom)) => custom.0.object_id,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_refcounted_starts_at_zero() {
        let handle = construct("Resource").unwrap();
        assert_eq!(refcount_of(handle), Some(0));
        assert!(object_inherits(handle.addr(), "RefCounted"));
        assert!(!object_inherits(handle.addr(), "Node"));
        let words = object_words(handle.addr());
        assert_eq!(refcount_of(handle), Some(1));
        release_variant_reference(handle.addr(), words[2]);
        assert!(!is_alive(handle));
    }

    #[test]
    fn test_nodes_are_not_refcounted() {
        let handle = construct("Node2D").unwrap();
        assert_eq!(refcount_of(handle), None);
        let id = instance_id_raw(handle.addr());
        assert_ne!(id, 0);
        assert_eq!(unsafe { object_get_instance_from_id(id) } as usize, handle.addr());
        destroy(handle);
        assert!(!is_alive(handle));
        assert!(unsafe { object_get_instance_from_id(id) }.is_null());
    }

    #[test]
    fn test_unknown_class_cannot_be_constructed() {
        assert!(construct("NoSuchClassAnywhere").is_none());
        assert!(class_exists("Sprite2D"));
    }

    #[test]
    fn test_unreference_clamps_at_zero() {
        let handle = construct("RefCounted").unwrap();
        assert!(matches!(run_native(NativeMethod::InitRef, handle.addr()), Some(NativeResult::Bool(true))));
        assert!(matches!(run_native(NativeMethod::Unreference, handle.addr()), Some(NativeResult::Bool(true))));
        assert!(matches!(run_native(NativeMethod::Unreference, handle.addr()), Some(NativeResult::Bool(true))));
        assert_eq!(refcount_of(handle), Some(0));
        destroy(handle);
    }
}
