//! 对象句柄
//!
//! [`Gd<T>`] 是指向引擎对象的宿主侧句柄。对 `RefCounted` 子类，每个 `Gd` 恰好持有一个
//! 引擎侧引用：克隆时 reference，析构时 unreference，计数归零时销毁对象。
//! 非引用计数对象由显式的 [`Gd::free`] 或引擎销毁。

use super::identity::{self, lookup_or_wrap};
use super::lifecycle;
use super::storage::InstanceStorage;
use super::{GodotClass, UserClass};
use crate::builtins::{Callable, StringName};
use crate::convert::{self, FromVariant, ToVariant, VariantType};
use crate::core::diagnostics::{self, DiagnosticKind};
use crate::core::error::{BridgeResult, CallError, ConversionError, ConversionResult, RegistrationError};
use crate::registry::PropertyHint;
use crate::sys::{self, InstanceId, ObjectHandle, ObjectPtr, TypePtr};
use crate::variant::{GType, Variant};
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

/// How a wrapped handle relates to the engine reference count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefMode {
    /// The engine already counted a reference for the caller; it is taken over.
    Owned,
    /// A new reference is added.
    Unowned,
}

/// Host handle to an engine object of class `T` (or a subclass).
pub struct Gd<T: GodotClass> {
    storage: Arc<InstanceStorage>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: GodotClass> Gd<T> {
    /// Instantiates `T` through the engine class database.
    pub fn try_new() -> BridgeResult<Self> {
        T::__ensure_registered()?;
        let name = StringName::from(T::CLASS_NAME);
        // SAFETY: the name outlives the call.
        let ptr = unsafe { (sys::interface().fns.classdb_construct_object2)(name.sys()) };
        let handle = ObjectHandle::from_ptr(ptr).ok_or_else(|| RegistrationError::ConstructionFailed {
            class_name: T::CLASS_NAME.to_string(),
        })?;
        let storage = lookup_or_wrap(handle)?;
        if storage.is_refcounted() {
            lifecycle::init_ref(handle);
        }
        Ok(Self::from_storage(storage))
    }

    /// # Panics
    /// When the class cannot be registered or constructed.
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(gd) => gd,
            Err(err) => panic!("cannot instantiate {}: {err}", T::CLASS_NAME),
        }
    }

    /// Wraps a live handle, adding an engine reference for ref-counted objects.
    pub fn from_handle(handle: ObjectHandle) -> ConversionResult<Self> {
        // SAFETY: Unowned never adopts a reference.
        unsafe { Self::from_handle_with(handle, RefMode::Unowned) }
    }

    /// Wraps a handle whose engine reference the caller already holds.
    ///
    /// # Safety
    /// For ref-counted objects the caller must own one reference and give it up.
    pub unsafe fn from_owned_handle(handle: ObjectHandle) -> ConversionResult<Self> {
        Self::from_handle_with(handle, RefMode::Owned)
    }

    /// A handle of the wrong class is rejected; with [`RefMode::Owned`] the adopted reference
    /// is released first.
    ///
    /// # Safety
    /// With [`RefMode::Owned`] the caller must own one reference of a ref-counted object.
    pub unsafe fn from_handle_with(handle: ObjectHandle, mode: RefMode) -> ConversionResult<Self> {
        let storage = lookup_or_wrap(handle)?;
        if let Err(err) = Self::check_class(&storage) {
            // The adopted reference has no host owner to give it back.
            if storage.is_refcounted() && mode == RefMode::Owned {
                lifecycle::release_reference(handle);
            }
            return Err(err);
        }
        if storage.is_refcounted() && mode == RefMode::Unowned {
            lifecycle::reference(handle);
        }
        Ok(Self::from_storage(storage))
    }

    pub fn from_instance_id(id: InstanceId) -> ConversionResult<Self> {
        let handle = identity::handle_from_instance_id(id).ok_or(ConversionError::DeadObject)?;
        Self::from_handle(handle)
    }

    fn from_storage(storage: Arc<InstanceStorage>) -> Self {
        Self {
            storage,
            _marker: PhantomData,
        }
    }

    fn check_class(storage: &InstanceStorage) -> ConversionResult<()> {
        let compatible = identity::object_inherits(storage.handle(), T::CLASS_NAME)
            && (!T::IS_USER || storage.is_user());
        if compatible {
            Ok(())
        } else {
            Err(ConversionError::ClassMismatch {
                expected: T::CLASS_NAME.to_string(),
                found: storage.engine_class().to_string(),
            })
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        self.storage.handle()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.storage.instance_id()
    }

    /// Host wrapper class; the nearest known ancestor for classes the bridge does not know.
    pub fn class_name(&self) -> &str {
        self.storage.class_name()
    }

    pub fn is_alive(&self) -> bool {
        self.storage.is_alive()
    }

    /// Whether both handles share one bridge entry.
    pub fn same_instance<U: GodotClass>(&self, other: &Gd<U>) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Engine reference count; `None` for objects that are not ref-counted.
    pub fn reference_count(&self) -> Option<i64> {
        (self.storage.is_refcounted() && self.is_alive())
            .then(|| lifecycle::reference_count(self.handle()))
    }

    /// Converts to a base class handle.
    ///
    /// # Panics
    /// When `U` is not an ancestor of `T`.
    pub fn upcast<U: GodotClass>(self) -> Gd<U> {
        if !T::inherits(U::CLASS_NAME) {
            panic!("{} does not inherit {}", T::CLASS_NAME, U::CLASS_NAME);
        }
        self.transmute_class()
    }

    /// Checked conversion to any class; returns `self` when the object is not a `U`.
    pub fn cast<U: GodotClass>(self) -> Result<Gd<U>, Self> {
        let compatible = self.is_alive()
            && identity::object_inherits(self.handle(), U::CLASS_NAME)
            && (!U::IS_USER || self.storage.holds::<U>());
        if compatible {
            Ok(self.transmute_class())
        } else {
            Err(self)
        }
    }

    fn transmute_class<U: GodotClass>(self) -> Gd<U> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc moves without touching counts.
        let storage = unsafe { std::ptr::read(&this.storage) };
        Gd::from_storage(storage)
    }

    /// Destroys a non-ref-counted object.
    pub fn free(self) {
        if self.storage.is_refcounted() {
            diagnostics::report(
                DiagnosticKind::Lifecycle,
                self.class_name(),
                "free() called on a ref-counted object; dropping the handle instead",
            );
            return;
        }
        if !self.is_alive() {
            diagnostics::report(
                DiagnosticKind::Lifecycle,
                self.class_name(),
                format!("free() called on already destroyed object {}", self.instance_id()),
            );
            return;
        }
        lifecycle::destroy(self.handle());
    }

    /// Dynamic call by method name on the object's runtime class.
    pub fn call(&self, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
        if !self.is_alive() {
            return Err(CallError::InstanceIsNull {
                method: method.to_string(),
            });
        }
        let mut target = self.to_variant();
        target.call(method, args)
    }

    /// Bound method `method` of this object.
    pub fn callable(&self, method: &str) -> Callable {
        Callable::from_object_method(self, method)
    }
}

impl<T: UserClass> Gd<T> {
    /// Shared access to the host instance.
    ///
    /// # Panics
    /// When the object is destroyed or its storage holds another type.
    pub fn bind(&self) -> RwLockReadGuard<'_, T> {
        match self.try_bind() {
            Some(guard) => guard,
            None => panic!("{} {} has no live {} instance", self.class_name(), self.handle(), T::CLASS_NAME),
        }
    }

    /// Exclusive access to the host instance.
    ///
    /// # Panics
    /// When the object is destroyed or its storage holds another type.
    pub fn bind_mut(&mut self) -> RwLockWriteGuard<'_, T> {
        if !self.is_alive() {
            panic!("{} {} is destroyed", self.class_name(), self.handle());
        }
        match self.storage.write::<T>() {
            Some(guard) => guard,
            None => panic!("{} {} has no {} instance", self.class_name(), self.handle(), T::CLASS_NAME),
        }
    }

    pub fn try_bind(&self) -> Option<RwLockReadGuard<'_, T>> {
        if !self.is_alive() {
            return None;
        }
        self.storage.read::<T>()
    }
}

impl<T: GodotClass> Clone for Gd<T> {
    fn clone(&self) -> Self {
        if self.storage.is_refcounted() && self.is_alive() {
            lifecycle::reference(self.handle());
        }
        Self::from_storage(self.storage.clone())
    }
}

impl<T: GodotClass> Drop for Gd<T> {
    fn drop(&mut self) {
        if self.storage.is_refcounted() && self.is_alive() {
            lifecycle::release_reference(self.handle());
        }
    }
}

impl<T: GodotClass, U: GodotClass> PartialEq<Gd<U>> for Gd<T> {
    fn eq(&self, other: &Gd<U>) -> bool {
        self.handle() == other.handle()
    }
}

impl<T: GodotClass> Eq for Gd<T> {}

impl<T: GodotClass> fmt::Debug for Gd<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gd")
            .field("class", &self.class_name())
            .field("handle", &self.handle())
            .field("instance_id", &self.instance_id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl<T: GodotClass> fmt::Display for Gd<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}{}>", self.storage.engine_class(), self.instance_id())
    }
}

impl<T: GodotClass> ToVariant for Gd<T> {
    fn to_variant(&self) -> Variant {
        if !self.is_alive() {
            return Variant::nil();
        }
        let mut ptr: ObjectPtr = self.handle().as_ptr();
        // SAFETY: an Object payload is the object pointer.
        unsafe { convert::variant_from_type_ptr(GType::Object, &mut ptr as *mut ObjectPtr as TypePtr) }
    }
}

impl<T: GodotClass> FromVariant for Gd<T> {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        match identity::handle_of_variant(variant)? {
            Some(handle) => Self::from_handle(handle),
            None => Err(ConversionError::UnexpectedNil {
                expected: GType::Object,
            }),
        }
    }
}

impl<T: GodotClass> VariantType for Gd<T> {
    const GTYPE: GType = GType::Object;

    fn class_name() -> Option<String> {
        Some(T::CLASS_NAME.to_string())
    }

    fn property_hint() -> (PropertyHint, String) {
        if T::inherits("Resource") {
            (PropertyHint::ResourceType, T::CLASS_NAME.to_string())
        } else {
            (PropertyHint::None, String::new())
        }
    }
}
