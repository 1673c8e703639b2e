//! 扩展钩子
//!
//! 测试和诊断用的插桩点。默认不安装任何钩子：所有 Variant 都会被正常销毁。

use super::types::ObjectHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Instrumentation points consulted by the bridge.
pub trait ExtensionHooks: Send + Sync {
    /// Returning `false` leaks the payload instead of destroying it.
    fn variant_should_deinit(&self, _content: &[u64]) -> bool {
        true
    }

    fn object_inited(&self, _handle: ObjectHandle, _class_name: &str) {}

    fn object_deinited(&self, _handle: ObjectHandle) {}
}

static HOOKS: RwLock<Option<Arc<dyn ExtensionHooks>>> = RwLock::new(None);
// Keeps Variant::drop lock-free while no hooks are installed.
static INSTALLED: AtomicBool = AtomicBool::new(false);

pub fn set_hooks(hooks: Arc<dyn ExtensionHooks>) {
    *HOOKS.write().unwrap_or_else(PoisonError::into_inner) = Some(hooks);
    INSTALLED.store(true, Ordering::Release);
    tracing::debug!(target: "interface", "Extension hooks installed");
}

pub fn clear_hooks() {
    INSTALLED.store(false, Ordering::Release);
    *HOOKS.write().unwrap_or_else(PoisonError::into_inner) = None;
}

fn current() -> Option<Arc<dyn ExtensionHooks>> {
    if !INSTALLED.load(Ordering::Acquire) {
        return None;
    }
    HOOKS.read().unwrap_or_else(PoisonError::into_inner).clone()
}

pub(crate) fn variant_should_deinit(content: &[u64]) -> bool {
    current().map_or(true, |hooks| hooks.variant_should_deinit(content))
}

pub(crate) fn object_inited(handle: ObjectHandle, class_name: &str) {
    if let Some(hooks) = current() {
        hooks.object_inited(handle, class_name);
    }
}

pub(crate) fn object_deinited(handle: ObjectHandle) {
    if let Some(hooks) = current() {
        hooks.object_deinited(handle);
    }
}
