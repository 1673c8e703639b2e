use godot_interop::builtins::{GString, VariantArray, Vector2, Vector3};
use godot_interop::core::error::{CallError, VariantIndexError};
use godot_interop::sim;
use godot_interop::sys::{self, ExtensionHooks};
use godot_interop::variant::{GType, Variant, VariantOperator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn engine() {
    sim::install();
}

#[test]
fn test_nil_is_all_zero() {
    engine();
    let nil = Variant::nil();
    assert!(nil.content().is_zero());
    assert_eq!(nil.gtype(), GType::Nil);
    assert_eq!(nil.stringify(), "<null>");
    assert!(!nil.booleanize());
    assert_eq!(nil, Variant::default());
}

#[test]
fn test_scalar_tags() {
    engine();
    assert_eq!(Variant::from(true).gtype(), GType::Bool);
    assert_eq!(Variant::from(7i64).gtype(), GType::Int);
    assert_eq!(Variant::from(7i32).gtype(), GType::Int);
    assert_eq!(Variant::from(0.5f32).gtype(), GType::Float);
    assert_eq!(Variant::from("hi").gtype(), GType::String);
    assert_eq!(Variant::from_value(&Vector2::new(1.0, 2.0)).gtype(), GType::Vector2);
}

#[test]
fn test_stringify_matches_engine_format() {
    engine();
    assert_eq!(Variant::from(42i64).stringify(), "42");
    assert_eq!(Variant::from(3.0f64).stringify(), "3.0");
    assert_eq!(Variant::from(false).stringify(), "false");
    assert_eq!(Variant::from_value(&Vector3::new(1.0, 2.5, -3.0)).to_string(), "(1.0, 2.5, -3.0)");

    let mut array = VariantArray::new();
    array.push(&Variant::from(1i64));
    array.push(&Variant::from("two"));
    assert_eq!(Variant::from_value(&array).stringify(), "[1, \"two\"]");
}

#[test]
fn test_clone_shares_engine_string() {
    engine();
    let text = GString::from("shared payload");
    assert_eq!(sim::string_refcount(&text), 1);

    let first = Variant::from_value(&text);
    let second = first.clone();
    assert_eq!(sim::string_refcount(&text), 3);
    assert_eq!(first, second);

    drop(first);
    drop(second);
    assert_eq!(sim::string_refcount(&text), 1);
}

#[test]
fn test_equality_and_hash_follow_engine() {
    engine();
    assert_eq!(Variant::from(1i64), Variant::from(1.0f64));
    assert_ne!(Variant::from(1i64), Variant::from("1"));
    assert_eq!(Variant::from("abc").hash_code(), Variant::from("abc").hash_code());
    assert_eq!(Variant::from(2i64).hash_code(), Variant::from(2.0f64).hash_code());
    assert_eq!(Variant::nil().hash_code(), 0);
}

#[test]
fn test_booleanize() {
    engine();
    assert!(!Variant::from(0i64).booleanize());
    assert!(Variant::from(-1i64).booleanize());
    assert!(!Variant::from("").booleanize());
    assert!(Variant::from("x").booleanize());
    assert!(!Variant::from_value(&VariantArray::new()).booleanize());
}

#[test]
fn test_evaluate_operators() {
    engine();
    let sum = Variant::from(2i64).evaluate(VariantOperator::Add, &Variant::from(3i64)).unwrap();
    assert_eq!(sum.to::<i64>(), Some(5));

    let joined = Variant::from("ab").evaluate(VariantOperator::Add, &Variant::from("cd")).unwrap();
    assert_eq!(joined.to::<String>().as_deref(), Some("abcd"));

    let less = Variant::from(1.5f64).evaluate(VariantOperator::Less, &Variant::from(2i64)).unwrap();
    assert_eq!(less.to::<bool>(), Some(true));

    assert!(Variant::from(1i64).evaluate(VariantOperator::Divide, &Variant::from(0i64)).is_none());
    assert!(Variant::from("a").evaluate(VariantOperator::Subtract, &Variant::from(1i64)).is_none());
}

#[test]
fn test_builtin_call() {
    engine();
    let mut text = Variant::from("Godot");
    assert_eq!(text.call("length", &[]).unwrap().to::<i64>(), Some(5));
    assert_eq!(text.call("to_upper", &[]).unwrap().to::<String>().as_deref(), Some("GODOT"));
    assert_eq!(
        text.call("begins_with", &[Variant::from("Go")]).unwrap().to::<bool>(),
        Some(true)
    );
    assert!(matches!(text.call("no_such_method", &[]), Err(CallError::InvalidMethod { .. })));
    assert!(matches!(text.call("begins_with", &[]), Err(CallError::TooFewArguments { .. })));
}

#[test]
fn test_indexed_access() {
    engine();
    let mut array = VariantArray::new();
    array.push(&Variant::from(10i64));
    array.push(&Variant::from(20i64));
    let mut value = Variant::from_value(&array);

    assert_eq!(value.get_indexed(1).unwrap().to::<i64>(), Some(20));
    assert_eq!(value.get_indexed(-1).unwrap().to::<i64>(), Some(20));
    value.set_indexed(0, &Variant::from(11i64)).unwrap();
    assert_eq!(array.get(0).and_then(|v| v.to::<i64>()), Some(11));

    assert_eq!(value.get_indexed(5), Err(VariantIndexError::OutOfBounds { index: 5 }));
    assert_eq!(
        Variant::from(3i64).get_indexed(0),
        Err(VariantIndexError::InvalidOperation)
    );
}

#[test]
fn test_vector_components_are_indexable() {
    engine();
    let mut value = Variant::from_value(&Vector2::new(4.0, 8.0));
    assert_eq!(value.get_indexed(1).unwrap().to::<f64>(), Some(8.0));
    value.set_indexed(0, &Variant::from(1.5f64)).unwrap();
    assert_eq!(value.to::<Vector2>(), Some(Vector2::new(1.5, 8.0)));
    assert!(matches!(value.get_indexed(2), Err(VariantIndexError::OutOfBounds { .. })));
}

struct LeakOne {
    target: [u64; godot_interop::variant::VARIANT_WORDS],
    skipped: AtomicUsize,
}

impl ExtensionHooks for LeakOne {
    fn variant_should_deinit(&self, content: &[u64]) -> bool {
        if content == self.target.as_slice() {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        true
    }
}

#[test]
fn test_hook_can_suppress_destruction() {
    engine();
    let text = GString::from("leak probe");
    let value = Variant::from_value(&text);
    let hooks = Arc::new(LeakOne {
        target: *value.content().words(),
        skipped: AtomicUsize::new(0),
    });
    sys::set_hooks(hooks.clone());
    drop(value);
    sys::clear_hooks();

    assert_eq!(hooks.skipped.load(Ordering::SeqCst), 1);
    assert_eq!(sim::string_refcount(&text), 2);
}
