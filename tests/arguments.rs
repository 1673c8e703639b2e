use godot_interop::builtins::GString;
use godot_interop::call::Arguments;
use godot_interop::core::error::{ArgumentAccessError, CallError, ConversionError};
use godot_interop::sim;
use godot_interop::sys::{self, ConstVariantPtr};
use godot_interop::variant::{FastVariant, GType, Variant, VariantContent};

fn engine() {
    sim::install();
}

fn pointers(values: &[Variant]) -> Vec<ConstVariantPtr> {
    values.iter().map(Variant::sys).collect()
}

#[test]
fn test_engine_arguments_read_like_host_arguments() {
    engine();
    let values = vec![Variant::from(5i64), Variant::nil(), Variant::from("name")];
    let ptrs = pointers(&values);
    let engine_args = unsafe { Arguments::from_engine(ptrs.as_ptr(), ptrs.len() as i64) };

    let host_values: Vec<Option<Variant>> = vec![Some(Variant::from(5i64)), None, Some(Variant::from("name"))];
    let host_args = Arguments::from_slice(&host_values);

    for args in [&engine_args, &host_args] {
        assert_eq!(args.count(), 3);
        assert_eq!(args.argument::<i64>(0), Ok(5));
        assert_eq!(args.get(1), Ok(None));
        assert_eq!(args.argument::<Option<String>>(1), Ok(None));
        assert_eq!(args.argument::<String>(2).as_deref(), Ok("name"));
    }
}

#[test]
fn test_null_engine_array_is_empty() {
    engine();
    let args = unsafe { Arguments::from_engine(std::ptr::null(), 4) };
    assert!(args.is_empty());
    let args = unsafe { Arguments::from_engine(std::ptr::null(), -1) };
    assert_eq!(args.count(), 0);
}

#[test]
fn test_access_errors_carry_index() {
    engine();
    let values = vec![Variant::from("text"), Variant::nil()];
    let ptrs = pointers(&values);
    let args = unsafe { Arguments::from_engine(ptrs.as_ptr(), 2) };

    assert_eq!(
        args.argument::<i64>(0),
        Err(ArgumentAccessError::Conversion {
            index: 0,
            source: ConversionError::TypeMismatch {
                expected: GType::Int,
                found: GType::String
            }
        })
    );
    assert_eq!(
        args.argument::<f64>(1),
        Err(ArgumentAccessError::MissingValue {
            index: 1,
            expected: GType::Float
        })
    );
    assert_eq!(
        args.get(2),
        Err(ArgumentAccessError::IndexOutOfBounds { index: 2, count: 2 })
    );
    assert_eq!(args.argument::<i64>(9).map_err(|e| e.index()), Err(9));
}

#[test]
fn test_borrowed_access_does_not_copy() {
    engine();
    let text = GString::from("borrowed argument");
    let values = vec![Variant::from_value(&text)];
    let ptrs = pointers(&values);
    let args = unsafe { Arguments::from_engine(ptrs.as_ptr(), 1) };
    assert_eq!(sim::string_refcount(&text), 2);

    let seen = args
        .with_borrowed_fast_variant(0, |value| {
            let value = value.expect("argument is not nil");
            (value.gtype(), sim::string_refcount(&text))
        })
        .unwrap();
    assert_eq!(seen, (GType::String, 2));
    assert_eq!(sim::string_refcount(&text), 2);

    let copied = args.get(0).unwrap().unwrap();
    assert_eq!(sim::string_refcount(&text), 3);
    drop(copied);
    assert_eq!(sim::string_refcount(&text), 2);
}

#[test]
fn test_failed_borrowed_conversion_leaves_argument_intact() {
    engine();
    let text = GString::from("hello");
    let values = vec![Variant::from_value(&text)];
    let ptrs = pointers(&values);
    let args = unsafe { Arguments::from_engine(ptrs.as_ptr(), 1) };

    let failed = args
        .with_borrowed_fast_variant(0, |value| value.map(|v| v.try_to::<i64>()))
        .unwrap();
    assert_eq!(
        failed,
        Some(Err(ConversionError::TypeMismatch {
            expected: GType::Int,
            found: GType::String
        }))
    );
    assert_eq!(sim::string_refcount(&text), 2);

    let again = args
        .with_borrowed_fast_variant(0, |value| value.and_then(|v| v.to::<String>()))
        .unwrap();
    assert_eq!(again.as_deref(), Some("hello"));
    assert_eq!(args.argument::<String>(0).as_deref(), Ok("hello"));
    assert_eq!(sim::string_refcount(&text), 2);
}

#[test]
fn test_fast_copy_is_independent() {
    engine();
    let text = GString::from("shared");
    let fast = Variant::from_value(&text).into_fast().unwrap();
    assert_eq!(sim::string_refcount(&text), 2);

    let copy = fast.copy().unwrap();
    assert_eq!(sim::string_refcount(&text), 3);
    drop(copy);
    assert_eq!(sim::string_refcount(&text), 2);
    assert_eq!(fast.to::<String>().as_deref(), Some("shared"));

    drop(fast);
    assert_eq!(sim::string_refcount(&text), 1);
}

#[test]
fn test_fast_variant_is_never_nil() {
    engine();
    assert!(unsafe { FastVariant::take_over(VariantContent::ZERO) }.is_none());
    assert!(Variant::nil().into_fast().is_none());

    let mut number = Variant::from(7i64).into_fast().unwrap();
    assert_eq!(number.copy().and_then(|copy| copy.to::<i64>()), Some(7));
    number.forget();
    assert!(number.copy().is_none());
}

#[test]
fn test_borrowed_nil_is_none() {
    engine();
    let values = vec![Variant::nil()];
    let ptrs = pointers(&values);
    let args = unsafe { Arguments::from_engine(ptrs.as_ptr(), 1) };
    assert_eq!(args.with_borrowed_fast_variant(0, |value| value.is_none()), Ok(true));
}

#[test]
fn test_iteration_maps_nil_to_none() {
    engine();
    let args = Arguments::from_values(vec![Some(Variant::from(1i64)), None, Some(Variant::from(true))]);
    let tags: Vec<Option<GType>> = args.iter().map(|value| value.map(|v| v.gtype())).collect();
    assert_eq!(tags, vec![Some(GType::Int), None, Some(GType::Bool)]);
    assert_eq!(args[1].gtype(), GType::Nil);
}

#[test]
fn test_call_error_codes_round_trip() {
    let errors = [
        CallError::InvalidMethod { method: "m".into() },
        CallError::InvalidArgument {
            method: "m".into(),
            index: 2,
            expected: GType::Vector3,
        },
        CallError::TooManyArguments {
            method: "m".into(),
            expected: 1,
        },
        CallError::TooFewArguments {
            method: "m".into(),
            expected: 3,
        },
        CallError::InstanceIsNull { method: "m".into() },
        CallError::MethodNotConst { method: "m".into() },
    ];
    for error in errors {
        let raw = error.to_sys();
        assert_ne!(raw.error, sys::CALL_OK);
        assert_eq!(CallError::from_sys(&raw, "m"), Some(error));
    }
    assert_eq!(CallError::from_sys(&sys::CallErrorRaw::default(), "m"), None);
}
