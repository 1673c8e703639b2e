use godot_interop::builtins::NodePath;
use godot_interop::convert::EngineBitfield;
use godot_interop::core::diagnostics::{diagnostics, DiagnosticKind};
use godot_interop::core::error::{CallError, RegistrationError, RegistrationResult};
use godot_interop::object::{Gd, Node, Node2D, Owner, RefCounted, UserClass};
use godot_interop::registry::{self, ClassInfo, MethodFlags, PropInfo, PropertyHint, SignalInfo};
use godot_interop::sim::{self, ArgumentDescription};
use godot_interop::sys::{ConstTypePtr, TypePtr};
use godot_interop::variant::{GType, Variant};

godot_interop::variant_enum! {
    pub enum Difficulty {
        Easy = 0,
        Hard = 2,
    }
}

godot_interop::variant_bitfield! {
    pub struct Layers {
        const WORLD = 1;
        const PLAYER = 2;
        const ENEMY = 4;
    }
}

struct Player {
    speed: f64,
    lives: i64,
    level: i64,
    difficulty: Difficulty,
    title: String,
    target: NodePath,
    god_mode: bool,
}

godot_interop::user_class!(Player: Node2D, name = "RegPlayer");

impl UserClass for Player {
    fn init(_owner: Owner) -> Self {
        Player {
            speed: 2.5,
            lives: 3,
            level: 1,
            difficulty: Difficulty::Easy,
            title: String::new(),
            target: NodePath::from(".."),
            god_mode: false,
        }
    }

    fn register(info: &mut ClassInfo<Self>) -> RegistrationResult<()> {
        info.register_method("get_speed", |p: &Player| p.speed)?;
        info.register_method("set_speed", |p: &mut Player, speed: f64| p.speed = speed)?;
        info.register_method("add", |_p: &Player, a: i64, b: i64| a + b)?;
        info.register_method("explode", |_p: &Player| -> i64 { panic!("boom") })?;
        info.register_method_raw("bad_return", Vec::new(), Some(PropInfo::new::<i64>("")), |_p, _args| {
            Ok(Variant::from("not an int").into_fast())
        })?;
        info.register_method_raw(
            "echo",
            vec![PropInfo::variant("value")],
            Some(PropInfo::variant("")),
            |_p, args| {
                let value = args.get(0).map_err(|_| CallError::InvalidArgument {
                    method: "echo".into(),
                    index: 0,
                    expected: GType::Nil,
                })?;
                Ok(value.and_then(Variant::into_fast))
            },
        )?;
        info.register_property(PropInfo::new::<f64>("speed"), "get_speed", "set_speed")?;
        info.register_property_with_getter_setter(
            "lives",
            "get_lives",
            |p: &Player| p.lives,
            "set_lives",
            |p: &mut Player, lives: i64| p.lives = lives,
        )?;

        info.add_property_group("Combat", "combat_");
        info.register_method("get_level", |p: &Player| p.level)?;
        info.register_method("set_level", |p: &mut Player, level: i64| p.level = level)?;
        info.register_int_range("combat_level", "get_level", "set_level", 1, 99, 1)?;
        info.register_method("get_difficulty", |p: &Player| p.difficulty)?;
        info.register_method("set_difficulty", |p: &mut Player, d: Difficulty| p.difficulty = d)?;
        info.register_enum_property::<Difficulty>("combat_difficulty", "get_difficulty", "set_difficulty")?;
        info.add_property_subgroup("Cheats", "combat_cheat_");
        info.register_method("get_god_mode", |p: &Player| p.god_mode)?;
        info.register_method("set_god_mode", |p: &mut Player, on: bool| p.god_mode = on)?;
        info.register_checkbox("combat_cheat_god_mode", "get_god_mode", "set_god_mode")?;

        info.register_method("get_title", |p: &Player| p.title.clone())?;
        info.register_method("set_title", |p: &mut Player, title: String| p.title = title)?;
        info.register_text_property("title", "get_title", "set_title", true)?;
        info.register_method("get_target", |p: &Player| p.target.clone())?;
        info.register_method("set_target", |p: &mut Player, target: NodePath| p.target = target)?;
        info.register_node_path_property("target", "get_target", "set_target", &["Node2D", "Sprite2D"])?;

        info.register_signal(SignalInfo::new("hit").with_argument(PropInfo::new::<i64>("damage")))?;
        info.register_signal(SignalInfo::new("died"))?;
        info.register_constant("MAX_LIVES", 9);
        info.register_enum::<Difficulty>();
        info.register_bitfield::<Layers>();
        Ok(())
    }
}

struct Boss;

godot_interop::user_class!(Boss: Player, name = "RegBoss");

impl UserClass for Boss {
    fn init(_owner: Owner) -> Self {
        Boss
    }

    fn register(info: &mut ClassInfo<Self>) -> RegistrationResult<()> {
        info.register_method("roar", |_b: &Boss| String::from("ROAR"))
    }
}

struct Impostor;

godot_interop::user_class!(Impostor: Node, name = "RegPlayer");

impl UserClass for Impostor {
    fn init(_owner: Owner) -> Self {
        Impostor
    }
}

struct Fragile;

godot_interop::user_class!(Fragile: RefCounted, name = "RegFragile");

impl UserClass for Fragile {
    fn init(_owner: Owner) -> Self {
        Fragile
    }

    fn register(_info: &mut ClassInfo<Self>) -> RegistrationResult<()> {
        panic!("registration table unavailable");
    }
}

struct Miswired {
    flag: i64,
}

godot_interop::user_class!(Miswired: Node, name = "RegMiswired");

impl UserClass for Miswired {
    fn init(_owner: Owner) -> Self {
        Miswired { flag: 0 }
    }

    fn register(info: &mut ClassInfo<Self>) -> RegistrationResult<()> {
        info.register_method("get_flag", |m: &Miswired| m.flag)?;
        info.register_method("set_flag", |m: &mut Miswired, flag: i64| m.flag = flag)?;
        info.register_checkbox("flag", "get_flag", "set_flag")
    }
}

fn engine() {
    sim::install();
}

fn player() -> Gd<Player> {
    engine();
    Gd::<Player>::new()
}

#[test]
fn test_methods_are_described() {
    let player = player();
    let description = sim::class_description("RegPlayer").unwrap();
    assert_eq!(description.parent, "Node2D");
    assert!(description.is_exposed);
    assert!(!description.is_abstract);

    let names: Vec<&str> = description.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(&names[..6], ["get_speed", "set_speed", "add", "explode", "bad_return", "echo"]);

    let get_speed = sim::registered_method("RegPlayer", "get_speed").unwrap();
    assert_eq!(get_speed.flags, MethodFlags::DEFAULT_CONST.bits() as u32);
    assert_eq!(get_speed.return_value.as_ref().map(|r| r.gtype), Some(GType::Float));

    let set_speed = sim::registered_method("RegPlayer", "set_speed").unwrap();
    assert_eq!(set_speed.flags, MethodFlags::NORMAL.bits() as u32);
    assert!(set_speed.return_value.is_none());

    let add = sim::registered_method("RegPlayer", "add").unwrap();
    let arguments: Vec<(&str, GType)> = add.arguments.iter().map(|a| (a.name.as_str(), a.gtype)).collect();
    assert_eq!(arguments, vec![("arg0", GType::Int), ("arg1", GType::Int)]);

    let echo = sim::registered_method("RegPlayer", "echo").unwrap();
    assert_eq!(echo.arguments[0].gtype, GType::Nil);
    drop(player);
}

#[test]
fn test_properties_carry_hints() {
    let _player = player();
    let description = sim::class_description("RegPlayer").unwrap();
    let find = |name: &str| {
        description
            .properties
            .iter()
            .find(|p| p.info.name == name)
            .unwrap_or_else(|| panic!("no property {name}"))
            .clone()
    };

    let speed = find("speed");
    assert_eq!((speed.getter.as_str(), speed.setter.as_str()), ("get_speed", "set_speed"));
    assert_eq!(speed.info.gtype, GType::Float);

    assert_eq!(find("lives").info.gtype, GType::Int);

    let level: ArgumentDescription = find("combat_level").info;
    assert_eq!(level.hint, PropertyHint::Range as u32);
    assert_eq!(level.hint_string, "1,99,1");

    let difficulty = find("combat_difficulty").info;
    assert_eq!(difficulty.hint, PropertyHint::Enum as u32);
    assert_eq!(difficulty.hint_string, "Easy:0,Hard:2");

    assert_eq!(find("combat_cheat_god_mode").info.gtype, GType::Bool);
    assert_eq!(find("title").info.hint, PropertyHint::MultilineText as u32);

    let target = find("target").info;
    assert_eq!(target.gtype, GType::NodePath);
    assert_eq!(target.hint_string, "Node2D,Sprite2D");
}

#[test]
fn test_groups_signals_and_constants() {
    let _player = player();
    let description = sim::class_description("RegPlayer").unwrap();

    let groups: Vec<(&str, &str, bool, usize)> = description
        .groups
        .iter()
        .map(|g| (g.name.as_str(), g.prefix.as_str(), g.subgroup, g.position))
        .collect();
    assert_eq!(
        groups,
        vec![("Combat", "combat_", false, 2), ("Cheats", "combat_cheat_", true, 4)]
    );

    let hit = description.signals.iter().find(|s| s.name == "hit").unwrap();
    assert_eq!(hit.arguments.len(), 1);
    assert_eq!(hit.arguments[0].name, "damage");
    assert!(description.signals.iter().any(|s| s.name == "died" && s.arguments.is_empty()));

    let constant = |name: &str| description.constants.iter().find(|c| c.name == name).unwrap().clone();
    assert_eq!(constant("MAX_LIVES").value, 9);
    assert_eq!(constant("MAX_LIVES").enum_name, "");
    assert_eq!(constant("Hard").enum_name, "Difficulty");
    assert_eq!(constant("Hard").value, 2);
    assert!(constant("ENEMY").is_bitfield);
    assert_eq!(constant("ENEMY").value, 4);

    let record = registry::class_record("RegPlayer").unwrap();
    assert_eq!(record.parent, "Node2D");
    assert!(record.signals.contains(&"hit".to_string()));
    assert!(record.constants.contains(&("MAX_LIVES".to_string(), 9)));
}

#[test]
fn test_engine_calls_reach_instance() {
    let player = player();
    let handle = player.handle();
    let sum = sim::call_registered_method(handle, "add", &[Variant::from(2i64), Variant::from(40i64)]).unwrap();
    assert_eq!(sum.to::<i64>(), Some(42));

    let unit = sim::call_registered_method(handle, "set_speed", &[Variant::from(7.5f64)]).unwrap();
    assert!(unit.is_nil());
    assert_eq!(player.bind().speed, 7.5);
    assert_eq!(player.call("get_speed", &[]).unwrap().to::<f64>(), Some(7.5));

    let echoed = sim::call_registered_method(handle, "echo", &[Variant::from("ping")]).unwrap();
    assert_eq!(echoed.to::<String>().as_deref(), Some("ping"));
    assert!(sim::call_registered_method(handle, "echo", &[Variant::nil()]).unwrap().is_nil());

    sim::call_registered_method(handle, "set_difficulty", &[Variant::from(2i64)]).unwrap();
    assert_eq!(player.bind().difficulty, Difficulty::Hard);
    player.free();
}

#[test]
fn test_argument_errors_become_call_errors() {
    let player = player();
    let handle = player.handle();

    assert_eq!(
        sim::call_registered_method(handle, "add", &[Variant::from(1i64)]),
        Err(CallError::TooFewArguments {
            method: "add".into(),
            expected: 2
        })
    );
    assert_eq!(
        sim::call_registered_method(handle, "get_speed", &[Variant::from(1i64)]),
        Err(CallError::TooManyArguments {
            method: "get_speed".into(),
            expected: 0
        })
    );
    assert_eq!(
        sim::call_registered_method(handle, "add", &[Variant::from(1i64), Variant::from("x")]),
        Err(CallError::InvalidArgument {
            method: "add".into(),
            index: 1,
            expected: GType::Int
        })
    );
    assert!(!diagnostics().find(DiagnosticKind::ArgumentError, "RegPlayer.add").is_empty());

    assert!(matches!(
        sim::call_registered_method(handle, "set_difficulty", &[Variant::from(1i64)]),
        Err(CallError::InvalidArgument { index: 0, .. })
    ));
    assert_eq!(player.bind().difficulty, Difficulty::Easy);
    player.free();
}

#[test]
fn test_return_type_is_checked() {
    let player = player();
    assert!(matches!(
        sim::call_registered_method(player.handle(), "bad_return", &[]),
        Err(CallError::InvalidMethod { .. })
    ));
    assert!(!diagnostics()
        .find(DiagnosticKind::ReturnTypeMismatch, "RegPlayer.bad_return")
        .is_empty());
    player.free();
}

#[test]
fn test_panics_stay_on_host_side() {
    let player = player();
    assert!(matches!(
        sim::call_registered_method(player.handle(), "explode", &[]),
        Err(CallError::InvalidMethod { .. })
    ));
    let records = diagnostics().find(DiagnosticKind::CallbackPanic, "RegPlayer.explode");
    assert!(records.iter().any(|r| r.message.contains("boom")));
    assert!(player.is_alive());
    player.free();
}

#[test]
fn test_pointer_calls() {
    let player = player();
    let a: i64 = 20;
    let b: i64 = 22;
    let mut out: i64 = 0;
    let args = [&a as *const i64 as ConstTypePtr, &b as *const i64 as ConstTypePtr];
    let found = unsafe {
        sim::ptrcall_registered_method(player.handle(), "add", &args, &mut out as *mut i64 as TypePtr)
    };
    assert!(found);
    assert_eq!(out, 42);

    let speed: f64 = 1.25;
    let args = [&speed as *const f64 as ConstTypePtr];
    unsafe {
        sim::ptrcall_registered_method(player.handle(), "set_speed", &args, std::ptr::null_mut());
    }
    assert_eq!(player.bind().speed, 1.25);
    player.free();
}

#[test]
fn test_subclass_registers_after_parent() {
    engine();
    let boss = Gd::<Boss>::new();
    assert_eq!(sim::class_description("RegBoss").unwrap().parent, "RegPlayer");
    let classes = registry::registered_classes();
    let player_at = classes.iter().position(|c| c == "RegPlayer").unwrap();
    let boss_at = classes.iter().position(|c| c == "RegBoss").unwrap();
    assert!(player_at < boss_at);

    assert!(sim::registered_method("RegBoss", "add").is_some());
    assert_eq!(boss.call("roar", &[]).unwrap().to::<String>().as_deref(), Some("ROAR"));
    boss.free();
}

#[test]
fn test_duplicate_name_keeps_first_class() {
    let _player = player();
    assert_eq!(
        registry::ensure_registered::<Impostor>(),
        Err(RegistrationError::DuplicateClass {
            class_name: "RegPlayer".into()
        })
    );
    assert!(!diagnostics().find(DiagnosticKind::DuplicateClass, "RegPlayer").is_empty());
    assert_eq!(sim::class_description("RegPlayer").unwrap().parent, "Node2D");
    assert!(Gd::<Impostor>::try_new().is_err());
}

#[test]
fn test_register_panic_is_reported() {
    engine();
    match registry::ensure_registered::<Fragile>() {
        Err(RegistrationError::RegisterFailed { class_name, reason }) => {
            assert_eq!(class_name, "RegFragile");
            assert!(reason.contains("registration table unavailable"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!sim::class_exists("RegFragile"));
    assert!(registry::class_record("RegFragile").is_none());
}

#[test]
fn test_property_type_is_checked() {
    engine();
    assert_eq!(
        registry::ensure_registered::<Miswired>(),
        Err(RegistrationError::PropertyTypeMismatch {
            class_name: "RegMiswired".into(),
            property: "flag".into(),
            expected: GType::Bool,
            found: GType::Int
        })
    );
    assert!(!sim::class_exists("RegMiswired"));
}

#[test]
fn test_user_class_as_typed_argument() {
    let player = player();
    let as_variant = Variant::from_value(&player);
    let back: Gd<Player> = as_variant.to().unwrap();
    assert!(back.same_instance(&player));
    assert!(as_variant.to::<Gd<Boss>>().is_none());
    assert!(as_variant.to::<Gd<Node>>().is_some());
    drop(back);
    player.free();
}
