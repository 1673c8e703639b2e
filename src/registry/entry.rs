//! 扩展入口
//!
//! 引擎加载动态库后调用入口函数：加载配置、初始化日志、加载接口、（可选）校验布局，
//! 然后填写初始化回调。到达配置的初始化级别时按父类优先的顺序注册全部宿主类；
//! 退出该级别时释放挂起的对象、清空身份映射，并按逆序注销类。

use super::init;
use crate::config::BridgeConfig;
use crate::core::diagnostics::{self, DiagnosticKind};
use crate::core::error::{InterfaceError, RegistrationError, RegistrationResult};
use crate::core::utils::panic_message;
use crate::object::{self, GodotClass, UserClass};
use crate::sys::{self, ClassLibraryPtr, GetProcAddress, InitializationLevelRaw, InitializationRaw};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};

/// Engine initialization stage (`GDExtensionInitializationLevel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum InitializationLevel {
    Core,
    Servers,
    #[default]
    Scene,
    Editor,
}

impl InitializationLevel {
    pub fn to_sys(self) -> InitializationLevelRaw {
        match self {
            InitializationLevel::Core => 0,
            InitializationLevel::Servers => 1,
            InitializationLevel::Scene => 2,
            InitializationLevel::Editor => 3,
        }
    }

    pub fn from_sys(raw: InitializationLevelRaw) -> Option<Self> {
        match raw {
            0 => Some(InitializationLevel::Core),
            1 => Some(InitializationLevel::Servers),
            2 => Some(InitializationLevel::Scene),
            3 => Some(InitializationLevel::Editor),
            _ => None,
        }
    }
}

/// A dynamic library exposing host classes to the engine.
///
/// ```rust,ignore
/// struct Game;
///
/// impl ExtensionLibrary for Game {
///     fn register_classes(registrar: &mut ClassRegistrar) {
///         registrar.add::<Player>().add::<Enemy>();
///     }
/// }
///
/// godot_interop::export_extension!(Game);
/// ```
pub trait ExtensionLibrary: 'static {
    /// Bridge options; by default read from `godot_interop.toml` / `.json` next to the process.
    fn config() -> BridgeConfig {
        BridgeConfig::load_or_default()
    }

    fn register_classes(registrar: &mut ClassRegistrar);

    /// Runs after the classes were registered at `level`.
    fn on_level_init(_level: InitializationLevel) {}

    /// Runs before the classes are unregistered at `level`.
    fn on_level_deinit(_level: InitializationLevel) {}
}

struct PendingClass {
    name: &'static str,
    parent: &'static str,
    type_id: TypeId,
    register: fn() -> RegistrationResult<()>,
}

/// Collects the classes of a library and registers them parents first.
#[derive(Default)]
pub struct ClassRegistrar {
    classes: Vec<PendingClass>,
}

impl ClassRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `T`; adding the same type twice has no effect.
    pub fn add<T: UserClass>(&mut self) -> &mut Self {
        let type_id = TypeId::of::<T>();
        if !self.classes.iter().any(|class| class.type_id == type_id) {
            self.classes.push(PendingClass {
                name: T::CLASS_NAME,
                parent: <T::Base as GodotClass>::CLASS_NAME,
                type_id,
                register: init::ensure_registered::<T>,
            });
        }
        self
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class names in registration order.
    pub fn class_names(&self) -> Vec<&'static str> {
        self.ordered().into_iter().map(|index| self.classes[index].name).collect()
    }

    /// Indices with every class after its parent; otherwise in insertion order.
    fn ordered(&self) -> Vec<usize> {
        let mut first_by_name: HashMap<&str, usize> = HashMap::new();
        for (index, class) in self.classes.iter().enumerate() {
            first_by_name.entry(class.name).or_insert(index);
        }
        let parent_of: Vec<Option<usize>> = self
            .classes
            .iter()
            .enumerate()
            .map(|(index, class)| {
                first_by_name
                    .get(class.parent)
                    .copied()
                    .filter(|parent| *parent != index)
            })
            .collect();

        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();
        let mut order = Vec::new();

        fn visit(
            node: usize,
            parent_of: &[Option<usize>],
            visited: &mut HashSet<usize>,
            temp_visited: &mut HashSet<usize>,
            order: &mut Vec<usize>,
        ) {
            if visited.contains(&node) || temp_visited.contains(&node) {
                return;
            }
            temp_visited.insert(node);
            if let Some(parent) = parent_of[node] {
                visit(parent, parent_of, visited, temp_visited, order);
            }
            temp_visited.remove(&node);
            visited.insert(node);
            order.push(node);
        }

        for node in 0..self.classes.len() {
            visit(node, &parent_of, &mut visited, &mut temp_visited, &mut order);
        }
        order
    }

    /// Registers every class; returns the failures by class name.
    pub fn register_all(&self) -> Vec<(&'static str, RegistrationError)> {
        let mut failures = Vec::new();
        for index in self.ordered() {
            let class = &self.classes[index];
            if let Err(err) = (class.register)() {
                tracing::error!(target: "registry", "Cannot register {}: {}", class.name, err);
                failures.push((class.name, err));
            }
        }
        failures
    }
}

static REGISTRATION_LEVEL: AtomicU32 = AtomicU32::new(2);

fn registration_level() -> InitializationLevel {
    InitializationLevel::from_sys(REGISTRATION_LEVEL.load(Ordering::Acquire)).unwrap_or_default()
}

/// Body of the library entry symbol generated by [`export_extension!`](crate::export_extension).
///
/// Returns `FALSE` when the interface cannot be loaded or the layout check fails; the engine
/// then refuses the library.
///
/// # Safety
/// Must be called by the engine (or an equivalent host) with its lookup function, library token
/// and a writable initialization record.
pub unsafe fn extension_entry<L: ExtensionLibrary>(
    get_proc_address: Option<GetProcAddress>,
    library: ClassLibraryPtr,
    r_initialization: *mut InitializationRaw,
) -> sys::Bool {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        prepare::<L>(get_proc_address, library, r_initialization)
    }));
    match outcome {
        Ok(ok) => sys::to_bool(ok),
        Err(payload) => {
            diagnostics::report(
                DiagnosticKind::CallbackPanic,
                "extension_entry",
                panic_message(payload.as_ref()),
            );
            sys::FALSE
        }
    }
}

unsafe fn prepare<L: ExtensionLibrary>(
    get_proc_address: Option<GetProcAddress>,
    library: ClassLibraryPtr,
    r_initialization: *mut InitializationRaw,
) -> bool {
    let config = L::config();
    if let Err(err) = config.validate() {
        eprintln!("godot_interop: invalid configuration: {err}");
        return false;
    }
    crate::logging::init_logging(&config.logging);
    diagnostics::diagnostics().configure(&config.diagnostics);
    init::configure(&config);

    let Some(get_proc_address) = get_proc_address else {
        tracing::error!(target: "interop", "Engine passed no get_proc_address");
        return false;
    };
    match sys::initialize(get_proc_address, library) {
        Ok(_) | Err(InterfaceError::AlreadyInitialized) => {}
        Err(err) => {
            tracing::error!(target: "interop", "Cannot load engine interface: {}", err);
            return false;
        }
    }

    if config.layout.validate_on_startup {
        if let Err(err) = crate::layout::validate_configured(&config.layout) {
            diagnostics::report(DiagnosticKind::LayoutMismatch, "layout", err.to_string());
            return false;
        }
    }

    if r_initialization.is_null() {
        return false;
    }
    let level = config.minimum_initialization_level;
    REGISTRATION_LEVEL.store(level.to_sys(), Ordering::Release);
    *r_initialization = InitializationRaw {
        minimum_initialization_level: level.to_sys(),
        userdata: std::ptr::null_mut(),
        initialize: Some(on_initialize::<L>),
        deinitialize: Some(on_deinitialize::<L>),
    };
    tracing::info!(target: "interop", "Extension entry completed, classes register at {:?}", level);
    true
}

unsafe extern "C" fn on_initialize<L: ExtensionLibrary>(_userdata: *mut c_void, raw_level: InitializationLevelRaw) {
    let Some(level) = InitializationLevel::from_sys(raw_level) else {
        return;
    };
    let outcome = catch_unwind(|| {
        if level == registration_level() {
            let mut registrar = ClassRegistrar::new();
            L::register_classes(&mut registrar);
            let failures = registrar.register_all();
            tracing::info!(
                target: "registry",
                "Registered {} of {} classes at {:?}",
                registrar.len() - failures.len(),
                registrar.len(),
                level
            );
        }
        L::on_level_init(level);
    });
    if let Err(payload) = outcome {
        diagnostics::report(
            DiagnosticKind::CallbackPanic,
            format!("initialize({level:?})"),
            panic_message(payload.as_ref()),
        );
    }
}

unsafe extern "C" fn on_deinitialize<L: ExtensionLibrary>(_userdata: *mut c_void, raw_level: InitializationLevelRaw) {
    let Some(level) = InitializationLevel::from_sys(raw_level) else {
        return;
    };
    let outcome = catch_unwind(|| {
        L::on_level_deinit(level);
        if level == registration_level() {
            let released = object::release_pending_objects();
            let cleared = object::clear_handles();
            let unregistered = init::unregister_classes();
            tracing::info!(
                target: "registry",
                "Shutdown at {:?}: released {}, unmapped {}, unregistered {} classes",
                level,
                released,
                cleared,
                unregistered
            );
        }
    });
    if let Err(payload) = outcome {
        diagnostics::report(
            DiagnosticKind::CallbackPanic,
            format!("deinitialize({level:?})"),
            panic_message(payload.as_ref()),
        );
    }
}

/// Exports the library entry symbol, `godot_interop_init` unless named explicitly.
///
/// ```rust,ignore
/// godot_interop::export_extension!(Game);
/// godot_interop::export_extension!(Game, entry = game_library_init);
/// ```
#[macro_export]
macro_rules! export_extension {
    ($lib:ty) => {
        $crate::export_extension!($lib, entry = godot_interop_init);
    };
    ($lib:ty, entry = $symbol:ident) => {
        /// # Safety
        /// Called by the engine when it loads the library.
        #[no_mangle]
        pub unsafe extern "C" fn $symbol(
            get_proc_address: Option<$crate::sys::GetProcAddress>,
            library: $crate::sys::ClassLibraryPtr,
            r_initialization: *mut $crate::sys::InitializationRaw,
        ) -> $crate::sys::Bool {
            $crate::registry::extension_entry::<$lib>(get_proc_address, library, r_initialization)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Node, Node2D, Owner, RefCounted};

    macro_rules! probe_class {
        ($ty:ident : $base:ty, $name:literal) => {
            struct $ty;
            crate::user_class!($ty: $base, name = $name);
            impl UserClass for $ty {
                fn init(_owner: Owner) -> Self {
                    $ty
                }
            }
        };
    }

    probe_class!(Unit: Node2D, "EntryUnit");
    probe_class!(Soldier: Unit, "EntrySoldier");
    probe_class!(Captain: Soldier, "EntryCaptain");
    probe_class!(Stats: RefCounted, "EntryStats");
    probe_class!(Marker: Node, "EntryMarker");

    #[test]
    fn test_parents_ordered_first() {
        let mut registrar = ClassRegistrar::new();
        registrar
            .add::<Captain>()
            .add::<Stats>()
            .add::<Soldier>()
            .add::<Unit>()
            .add::<Marker>();
        assert_eq!(
            registrar.class_names(),
            vec!["EntryUnit", "EntrySoldier", "EntryCaptain", "EntryStats", "EntryMarker"]
        );
    }

    #[test]
    fn test_duplicate_types_collapse() {
        let mut registrar = ClassRegistrar::new();
        registrar.add::<Stats>().add::<Stats>();
        assert_eq!(registrar.len(), 1);
    }

    #[test]
    fn test_level_round_trip() {
        assert_eq!(InitializationLevel::Scene.to_sys(), 2);
        assert_eq!(InitializationLevel::from_sys(3), Some(InitializationLevel::Editor));
        assert_eq!(InitializationLevel::from_sys(9), None);
        assert!(InitializationLevel::Core < InitializationLevel::Editor);
    }
}
