//! 实例存储
//!
//! 每个已映射的引擎对象对应一个 [`InstanceStorage`]，由身份映射表和所有 `Gd` 句柄共享。
//! 宿主类的实例数据放在 `RwLock<T>` 中；框架类没有宿主数据。

use crate::sys::{InstanceId, ObjectHandle};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Engine-side identity of a host object, handed to [`UserClass::init`](super::UserClass::init).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    pub handle: ObjectHandle,
    pub instance_id: InstanceId,
}

pub struct InstanceStorage {
    handle: ObjectHandle,
    instance_id: InstanceId,
    /// Class the host wrapper was built for.
    class_name: String,
    /// Class reported by the engine; differs from `class_name` for unknown classes.
    engine_class: String,
    is_refcounted: bool,
    user: Option<Box<dyn Any + Send + Sync>>,
    alive: AtomicBool,
}

impl InstanceStorage {
    pub(crate) fn framework(
        owner: Owner,
        class_name: String,
        engine_class: String,
        is_refcounted: bool,
    ) -> Self {
        Self {
            handle: owner.handle,
            instance_id: owner.instance_id,
            class_name,
            engine_class,
            is_refcounted,
            user: None,
            alive: AtomicBool::new(true),
        }
    }

    pub(crate) fn user<T: Send + Sync + 'static>(
        owner: Owner,
        class_name: &str,
        is_refcounted: bool,
        instance: T,
    ) -> Self {
        Self {
            handle: owner.handle,
            instance_id: owner.instance_id,
            class_name: class_name.to_string(),
            engine_class: class_name.to_string(),
            is_refcounted,
            user: Some(Box::new(RwLock::new(instance))),
            alive: AtomicBool::new(true),
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn engine_class(&self) -> &str {
        &self.engine_class
    }

    pub fn is_refcounted(&self) -> bool {
        self.is_refcounted
    }

    pub fn is_user(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns whether this call performed the transition.
    pub(crate) fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    fn instance<T: 'static>(&self) -> Option<&RwLock<T>> {
        self.user.as_ref()?.downcast_ref::<RwLock<T>>()
    }

    pub(crate) fn read<T: 'static>(&self) -> Option<RwLockReadGuard<'_, T>> {
        let lock = self.instance::<T>()?;
        Some(lock.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    pub(crate) fn write<T: 'static>(&self) -> Option<RwLockWriteGuard<'_, T>> {
        let lock = self.instance::<T>()?;
        Some(lock.write().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    pub(crate) fn holds<T: 'static>(&self) -> bool {
        self.instance::<T>().is_some()
    }
}

impl std::fmt::Debug for InstanceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceStorage")
            .field("handle", &self.handle)
            .field("instance_id", &self.instance_id)
            .field("class_name", &self.class_name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Owner {
        Owner {
            handle: ObjectHandle::from_ptr(0x40 as crate::sys::ConstObjectPtr).unwrap(),
            instance_id: InstanceId(7),
        }
    }

    #[test]
    fn test_user_data_is_typed() {
        let storage = InstanceStorage::user(owner(), "Counter", false, 5i64);
        assert!(storage.is_user());
        assert!(storage.holds::<i64>());
        assert!(!storage.holds::<u8>());
        *storage.write::<i64>().unwrap() += 1;
        assert_eq!(*storage.read::<i64>().unwrap(), 6);
    }

    #[test]
    fn test_mark_dead_once() {
        let storage = InstanceStorage::framework(owner(), "Node".into(), "Timer".into(), false);
        assert!(storage.is_alive());
        assert!(storage.mark_dead());
        assert!(!storage.mark_dead());
        assert_eq!(storage.engine_class(), "Timer");
    }
}
