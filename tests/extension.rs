use godot_interop::config::BridgeConfig;
use godot_interop::layout::BuildConfiguration;
use godot_interop::object::{active_handles, Gd, Node, Owner, RefCounted, UserClass};
use godot_interop::registry::{self, ClassInfo, ClassRegistrar, ExtensionLibrary, InitializationLevel};
use godot_interop::core::error::RegistrationResult;
use godot_interop::sim::{self, LoadedExtension};
use std::io::Write;
use std::sync::{Mutex, OnceLock, PoisonError};
use tempfile::NamedTempFile;

static LEVEL_EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

fn record(event: String) {
    LEVEL_EVENTS.lock().unwrap_or_else(PoisonError::into_inner).push(event);
}

struct Turret {
    ammo: i64,
}

godot_interop::user_class!(Turret: Node, name = "ExtTurret");

impl UserClass for Turret {
    fn init(_owner: Owner) -> Self {
        Turret { ammo: 12 }
    }

    fn register(info: &mut ClassInfo<Self>) -> RegistrationResult<()> {
        info.register_method("get_ammo", |t: &Turret| t.ammo)
    }
}

struct HeavyTurret;

godot_interop::user_class!(HeavyTurret: Turret, name = "ExtHeavyTurret");

impl UserClass for HeavyTurret {
    fn init(_owner: Owner) -> Self {
        HeavyTurret
    }
}

struct Loadout;

godot_interop::user_class!(Loadout: RefCounted, name = "ExtLoadout");

impl UserClass for Loadout {
    fn init(_owner: Owner) -> Self {
        Loadout
    }
}

fn metadata_file(json: String) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

fn checked_config(file: &NamedTempFile) -> BridgeConfig {
    let mut config = BridgeConfig::new();
    config.logging.log_to_console = false;
    config.layout.validate_on_startup = true;
    config.layout.metadata_path = Some(file.path().to_path_buf());
    config
}

struct Arsenal;

impl ExtensionLibrary for Arsenal {
    fn config() -> BridgeConfig {
        static FILE: OnceLock<NamedTempFile> = OnceLock::new();
        let file = FILE.get_or_init(|| metadata_file(sim::layout_metadata_json().unwrap()));
        checked_config(file)
    }

    fn register_classes(registrar: &mut ClassRegistrar) {
        registrar.add::<HeavyTurret>().add::<Loadout>().add::<Turret>();
    }

    fn on_level_init(level: InitializationLevel) {
        record(format!("init {level:?}"));
    }

    fn on_level_deinit(level: InitializationLevel) {
        record(format!("deinit {level:?}"));
    }
}

godot_interop::export_extension!(Arsenal, entry = arsenal_library_init);

/// Library built against a different Vector2 size.
struct Mismatched;

impl ExtensionLibrary for Mismatched {
    fn config() -> BridgeConfig {
        static FILE: OnceLock<NamedTempFile> = OnceLock::new();
        let file = FILE.get_or_init(|| {
            let mut metadata = sim::layout_metadata();
            let configuration = BuildConfiguration::active();
            let mut layout = metadata.configuration(configuration).unwrap().clone();
            layout.sizes.insert("Vector2".to_string(), 12);
            metadata.insert(configuration, layout);
            metadata_file(metadata.to_json_string().unwrap())
        });
        checked_config(file)
    }

    fn register_classes(registrar: &mut ClassRegistrar) {
        registrar.add::<Loadout>();
    }
}

godot_interop::export_extension!(Mismatched, entry = mismatched_library_init);

#[test]
fn test_library_lifecycle() {
    sim::install();
    let mut extension = unsafe { LoadedExtension::load(arsenal_library_init) }.expect("library loads");
    assert_eq!(extension.minimum_level(), InitializationLevel::Scene);
    assert!(!sim::class_exists("ExtTurret"));

    extension.initialize_to(InitializationLevel::Editor);
    assert_eq!(
        extension.initialized_levels(),
        [InitializationLevel::Scene, InitializationLevel::Editor]
    );
    let registered = registry::registered_classes();
    let turret = registered.iter().position(|c| c == "ExtTurret").unwrap();
    let heavy = registered.iter().position(|c| c == "ExtHeavyTurret").unwrap();
    assert!(turret < heavy);
    assert_eq!(sim::class_description("ExtHeavyTurret").unwrap().parent, "ExtTurret");
    assert!(sim::class_exists("ExtLoadout"));

    let turret = Gd::<Turret>::new();
    assert_eq!(turret.call("get_ammo", &[]).unwrap().to::<i64>(), Some(12));
    let loadout = Gd::<Loadout>::new();
    let scenery = Gd::<Node>::new();
    assert!(active_handles().contains(&turret.handle()));
    turret.free();
    drop(loadout);

    extension.deinitialize();
    assert!(!sim::class_exists("ExtTurret"));
    assert!(!sim::class_exists("ExtHeavyTurret"));
    assert!(registry::registered_classes().is_empty());
    assert!(active_handles().is_empty());

    let events = LEVEL_EVENTS.lock().unwrap_or_else(PoisonError::into_inner).clone();
    assert_eq!(events, ["init Scene", "init Editor", "deinit Editor", "deinit Scene"]);
    assert!(sim::is_alive(scenery.handle()));
    sim::destroy(scenery.handle());
}

#[test]
fn test_layout_mismatch_refuses_load() {
    sim::install();
    assert!(unsafe { LoadedExtension::load(mismatched_library_init) }.is_none());
}
