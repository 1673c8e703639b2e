use godot_interop::builtins::{
    Callable, Dictionary, ElementType, GString, PackedInt32Array, PackedStringArray,
    PackedVector2Array, Signal, TypedArray, TypedDictionary, Vector2, VariantArray,
};
use godot_interop::core::diagnostics::{diagnostics, DiagnosticKind};
use godot_interop::core::error::{CallError, ContainerError, ConversionError, RegistrationResult};
use godot_interop::object::{Gd, Node, Owner, UserClass};
use godot_interop::registry::{ClassInfo, PropInfo, SignalInfo};
use godot_interop::sim;
use godot_interop::variant::{GType, Variant};
use godot_interop::convert::ToVariant;

fn engine() {
    sim::install();
}

struct Bell {
    volume: i64,
}

godot_interop::user_class!(Bell: Node, name = "ContainerBell");

impl UserClass for Bell {
    fn init(_owner: Owner) -> Self {
        Bell { volume: 3 }
    }

    fn register(info: &mut ClassInfo<Self>) -> RegistrationResult<()> {
        info.register_method("ring", |b: &Bell, times: i64| times * b.volume)?;
        info.register_signal(SignalInfo::new("rang").with_argument(PropInfo::new::<i64>("times")))
    }
}

#[test]
fn test_typed_array_rejects_engine_side() {
    engine();
    let mut ints = VariantArray::new_typed(&ElementType::Builtin(GType::Int));
    assert!(ints.is_typed());
    assert_eq!(ints.element_type(), ElementType::Builtin(GType::Int));

    ints.push(&Variant::from(4i64));
    let before = sim::rejected_writes();
    ints.push(&Variant::from("four"));
    assert!(sim::rejected_writes() > before);
    assert_eq!(ints.len(), 1);
    assert_eq!(ints.get_as::<i64>(0), Ok(4));
}

#[test]
fn test_typed_array_checks_host_side() {
    engine();
    let mut ints = VariantArray::new_typed(&ElementType::Builtin(GType::Int));
    assert_eq!(
        ints.try_push(&Variant::from(1.5f64)),
        Err(ContainerError::ElementTypeMismatch {
            index: 0,
            expected: "int".into(),
            found: "float".into()
        })
    );
    ints.try_push(&Variant::from(7i64)).unwrap();
    assert!(matches!(
        ints.set(0, &Variant::from(true)),
        Err(ContainerError::ElementTypeMismatch { index: 0, .. })
    ));
    assert_eq!(
        ints.set(3, &Variant::from(1i64)),
        Err(ContainerError::IndexOutOfBounds { index: 3, len: 1 })
    );
    ints.set(0, &Variant::from(8i64)).unwrap();
    assert_eq!(ints.to_vec(), vec![Variant::from(8i64)]);
}

#[test]
fn test_untyped_array_holds_anything() {
    engine();
    let mixed: VariantArray = [Variant::from(1i64), Variant::from("two"), Variant::nil()]
        .into_iter()
        .collect();
    assert!(!mixed.is_typed());
    assert_eq!(mixed.len(), 3);
    assert!(mixed.get(2).unwrap().is_nil());
    assert!(mixed.get(3).is_none());
    assert!(mixed.get_as::<i64>(1).is_err());
    assert!(mixed.validate_elements(&ElementType::Builtin(GType::Int)).is_err());

    let mut copy = mixed.clone();
    copy.resize(1);
    assert_eq!(copy.len(), 1);
    copy.clear();
    assert!(copy.is_empty());
}

#[test]
fn test_typed_array_adoption() {
    engine();
    let plain = VariantArray::from(&[1i64, 2, 3][..]);
    let typed = TypedArray::<i64>::try_from_array(plain).unwrap();
    assert_eq!(typed.to_vec(), Ok(vec![1, 2, 3]));
    assert!(typed.as_untyped().is_typed());

    let strings = VariantArray::new_typed(&ElementType::Builtin(GType::String));
    assert_eq!(
        TypedArray::<i64>::try_from_array(strings).unwrap_err(),
        ContainerError::ContainerTypeMismatch {
            expected: "int".into(),
            found: "String".into()
        }
    );

    let mixed = VariantArray::from_iter([Variant::from(1i64), Variant::from("x")]);
    assert!(matches!(
        TypedArray::<i64>::try_from_array(mixed),
        Err(ContainerError::ElementTypeMismatch { index: 1, .. })
    ));
}

#[test]
fn test_typed_array_api() {
    engine();
    let mut speeds: TypedArray<f64> = [0.5, 1.5].into_iter().collect();
    speeds.push(&2.5);
    assert_eq!(speeds.len(), 3);
    assert_eq!(speeds.get(1), Some(Ok(1.5)));
    assert!(speeds.get(3).is_none());
    speeds.set(0, &9.0).unwrap();
    assert_eq!(speeds.iter().map(Result::unwrap).sum::<f64>(), 13.0);
    assert_eq!(TypedArray::<f64>::element_type(), ElementType::Builtin(GType::Float));
    assert!(speeds.set(5, &1.0).is_err());
}

#[test]
fn test_typed_array_reports_unconvertible_elements() {
    engine();
    let first = Gd::<Node>::new();
    let last = Gd::<Node>::new();
    let mut slots = VariantArray::new_typed(&ElementType::Class("Node".into()));
    slots.push(&first.to_variant());
    slots.push(&Variant::nil());
    slots.push(&last.to_variant());

    let nodes = TypedArray::<Gd<Node>>::try_from_array(slots).unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes.iter().count(), 3);
    assert!(nodes.get(0).unwrap().unwrap().same_instance(&first));
    assert!(matches!(
        nodes.get(1),
        Some(Err(ConversionError::ElementError { index: 1, .. }))
    ));
    assert!(matches!(
        nodes.to_vec(),
        Err(ConversionError::ElementError { index: 1, .. })
    ));

    let optional = TypedArray::<Option<Gd<Node>>>::try_from_array(nodes.into_untyped()).unwrap();
    let slots = optional.to_vec().unwrap();
    assert_eq!(slots.len(), 3);
    assert!(slots[1].is_none());
    assert!(slots[2].as_ref().unwrap().same_instance(&last));

    first.free();
    last.free();
}

#[test]
fn test_dictionary_basics() {
    engine();
    let mut dict = Dictionary::new();
    dict.insert("hp", &10i64);
    dict.insert(&3i64, "three");
    assert_eq!(dict.len(), 2);
    assert!(dict.contains_key("hp"));
    assert_eq!(dict.get_as::<i64, _>("hp"), Ok(10));
    assert!(dict.get("missing").is_none());
    assert!(dict.get_as::<Option<i64>, _>("missing").unwrap().is_none());

    dict.insert("hp", &11i64);
    assert_eq!(dict.len(), 2);
    assert_eq!(dict.remove("hp").and_then(|v| v.to::<i64>()), Some(11));
    assert_eq!(dict.keys().to_vec(), vec![Variant::from(3i64)]);
    assert_eq!(dict.values().to_vec(), vec![Variant::from("three")]);
    dict.clear();
    assert!(dict.is_empty());
}

#[test]
fn test_typed_dictionary_rejects_wrong_entries() {
    engine();
    let mut scores = TypedDictionary::<String, i64>::new();
    scores.insert(&"ada".to_string(), &3);
    assert_eq!(scores.get(&"ada".to_string()), Some(3));
    assert_eq!(scores.as_untyped().typed_key(), ElementType::Builtin(GType::String));

    let mut untyped = scores.clone().into_untyped();
    assert!(matches!(
        untyped.try_insert(&1i64, &2i64),
        Err(ContainerError::ElementTypeMismatch { index: 1, .. })
    ));
    untyped.insert("bob", "not a score");
    assert_eq!(untyped.len(), 1);
    assert!(!diagnostics()
        .find(DiagnosticKind::TypedContainerRejected, "String")
        .is_empty());

    let mut loose = Dictionary::new();
    loose.insert("x", &1i64);
    loose.insert("y", &2.0f64);
    assert!(matches!(
        TypedDictionary::<String, i64>::try_from_dictionary(loose),
        Err(ContainerError::ElementTypeMismatch { index: 1, .. })
    ));
}

#[test]
fn test_packed_arrays() {
    engine();
    let mut numbers = PackedInt32Array::from(&[1, 2, 3][..]);
    numbers.push(&4);
    assert_eq!(numbers.len(), 4);
    assert_eq!(numbers.get(3), Some(4));
    assert_eq!(numbers.get(4), None);
    numbers.set(0, &10).unwrap();
    assert_eq!(
        numbers.set(9, &0),
        Err(ContainerError::IndexOutOfBounds { index: 9, len: 4 })
    );
    numbers.resize(2);
    assert_eq!(numbers.to_vec(), vec![10, 2]);

    let names: PackedStringArray = ["a", "b"].into_iter().map(GString::from).collect();
    assert_eq!(names.iter().map(|s| s.to_string()).collect::<Vec<_>>(), ["a", "b"]);

    let mut labels = PackedStringArray::new();
    labels.push(&GString::from("first"));
    labels.push(&GString::from("second"));
    let copy = labels.clone();
    drop(labels);
    assert_eq!(copy.iter().map(|s| s.to_string()).collect::<Vec<_>>(), ["first", "second"]);
    let mut copy = copy;
    copy.resize(1);
    assert_eq!(copy.get(0).map(|s| s.to_string()).as_deref(), Some("first"));

    let mut points = PackedVector2Array::new();
    points.push(&Vector2::new(1.0, 2.0));
    assert_eq!(points.get(0), Some(Vector2::new(1.0, 2.0)));
    points.clear();
    assert!(points.is_empty());
}

#[test]
fn test_host_callable() {
    engine();
    let double = Callable::from_fn("double", |args| {
        args.argument::<i64>(0).ok().map(|value| Variant::from(value * 2))
    });
    assert!(!double.is_null());
    assert_eq!(double.object_id(), None);
    assert_eq!(double.call(&[Variant::from(21i64)]).unwrap().to::<i64>(), Some(42));
    assert!(double.call(&[Variant::from("x")]).unwrap().is_nil());

    let copy = double.clone();
    drop(double);
    assert_eq!(copy.call(&[Variant::from(1i64)]).unwrap().to::<i64>(), Some(2));

    assert!(Callable::invalid().is_null());
    assert!(Callable::invalid().call(&[]).is_err());
}

#[test]
fn test_host_callable_panic_is_contained() {
    engine();
    let broken = Callable::from_fn("broken_callable", |_| panic!("callable failed"));
    assert!(matches!(broken.call(&[]), Err(CallError::InvalidMethod { .. })));
    assert!(!diagnostics()
        .find(DiagnosticKind::CallbackPanic, "callable failed")
        .is_empty());
}

#[test]
fn test_bound_method_callable() {
    engine();
    let bell = Gd::<Bell>::new();
    let ring = Callable::from_object_method(&bell, "ring");
    assert_eq!(ring.method_name(), "ring");
    assert_eq!(ring.object_id(), Some(bell.instance_id()));
    assert_eq!(ring.call(&[Variant::from(2i64)]).unwrap().to::<i64>(), Some(6));

    bell.free();
    assert!(matches!(ring.call(&[Variant::from(2i64)]), Err(CallError::InstanceIsNull { .. })));
}

#[test]
fn test_signal_emission() {
    engine();
    let bell = Gd::<Bell>::new();
    let rang = Signal::new(&bell, "rang");
    assert_eq!(rang.name(), "rang");
    assert_eq!(rang.object_id(), Some(bell.instance_id()));
    rang.emit(&[Variant::from(1i64)]).unwrap();

    let emitted: Vec<_> = sim::take_emitted_signals()
        .into_iter()
        .filter(|signal| signal.instance_id == bell.instance_id())
        .collect();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].name, "rang");
    assert_eq!(emitted[0].argument_count, 1);

    bell.free();
    assert!(rang.emit(&[]).is_err());
}
