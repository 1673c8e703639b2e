use godot_interop::core::diagnostics::{diagnostics, DiagnosticKind};
use godot_interop::object::{
    self, active_handles, identity_stats, lookup_or_wrap, pending_release_count, release_pending_objects,
    set_deferred_release, Gd, GodotClass, Node, Node2D, Object, Owner, RefCounted, RefMode, Resource, UserClass,
};
use godot_interop::convert::{FromVariant, ToVariant};
use godot_interop::core::error::{CallError, ConversionError};
use godot_interop::sim;
use godot_interop::variant::Variant;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// Deferred release and identity counts are process-wide.
fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    let guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    sim::install();
    set_deferred_release(false);
    guard
}

struct Counter {
    owner: Owner,
    hits: i64,
}

godot_interop::user_class!(Counter: RefCounted, name = "IdentityCounter");

impl UserClass for Counter {
    fn init(owner: Owner) -> Self {
        Counter { owner, hits: 0 }
    }

    fn to_string(&self) -> Option<String> {
        Some(format!("Counter({})", self.hits))
    }
}

struct Walker {
    steps: i64,
}

godot_interop::user_class!(Walker: Node2D, name = "IdentityWalker");

impl UserClass for Walker {
    fn init(_owner: Owner) -> Self {
        Walker { steps: 3 }
    }
}

#[test]
fn test_same_handle_same_wrapper() {
    let _guard = serial();
    let node = Gd::<Node>::new();
    let again = Gd::<Node>::from_handle(node.handle()).unwrap();
    assert!(node.same_instance(&again));
    assert!(Arc::ptr_eq(&lookup_or_wrap(node.handle()).unwrap(), &lookup_or_wrap(node.handle()).unwrap()));

    let through_variant = Gd::<Object>::from_variant(&node.to_variant()).unwrap();
    assert!(through_variant.same_instance(&node));
    assert_eq!(through_variant.class_name(), "Node");
    assert!(active_handles().contains(&node.handle()));
    node.free();
}

#[test]
fn test_refcount_tracks_handles() {
    let _guard = serial();
    let resource = Gd::<Resource>::new();
    let handle = resource.handle();
    assert_eq!(sim::refcount_of(handle), Some(1));
    assert_eq!(resource.reference_count(), Some(1));

    let copy = resource.clone();
    assert_eq!(sim::refcount_of(handle), Some(2));

    let variant = resource.to_variant();
    assert_eq!(sim::refcount_of(handle), Some(3));
    drop(variant);
    drop(copy);
    assert_eq!(sim::refcount_of(handle), Some(1));

    drop(resource);
    assert!(!sim::is_alive(handle));
    assert!(!active_handles().contains(&handle));
}

#[test]
fn test_owned_handle_adopts_reference() {
    let _guard = serial();
    let handle = sim::construct("RefCounted").unwrap();
    assert_eq!(sim::refcount_of(handle), Some(0));

    let unowned = Gd::<RefCounted>::from_handle(handle).unwrap();
    assert_eq!(sim::refcount_of(handle), Some(1));

    // The Variant payload carries one reference that the handle takes over.
    let variant = unowned.to_variant();
    assert_eq!(sim::refcount_of(handle), Some(2));
    std::mem::forget(variant);
    let owned = unsafe { Gd::<RefCounted>::from_handle_with(handle, RefMode::Owned) }.unwrap();
    assert_eq!(sim::refcount_of(handle), Some(2));
    assert!(owned.same_instance(&unowned));

    drop(owned);
    drop(unowned);
    assert!(!sim::is_alive(handle));
}

#[test]
fn test_rejected_owned_handle_releases_reference() {
    let _guard = serial();
    let handle = sim::construct("RefCounted").unwrap();
    let unowned = Gd::<RefCounted>::from_handle(handle).unwrap();
    std::mem::forget(unowned.to_variant());
    assert_eq!(sim::refcount_of(handle), Some(2));

    let rejected = unsafe { Gd::<Resource>::from_handle_with(handle, RefMode::Owned) };
    assert!(matches!(rejected, Err(ConversionError::ClassMismatch { .. })));
    assert_eq!(sim::refcount_of(handle), Some(1));

    // Unowned lookups never took a reference to give back.
    assert!(unsafe { Gd::<Resource>::from_handle_with(handle, RefMode::Unowned) }.is_err());
    assert_eq!(sim::refcount_of(handle), Some(1));

    drop(unowned);
    assert!(!sim::is_alive(handle));
}

#[test]
fn test_unknown_class_falls_back_to_ancestor() {
    let _guard = serial();
    for (engine_class, wrapper) in [("Image", "Resource"), ("Sprite2D", "Node2D"), ("Timer", "Node")] {
        let handle = sim::construct(engine_class).unwrap();
        let object = Gd::<Object>::from_handle(handle).unwrap();
        assert_eq!(object.class_name(), wrapper);
        assert_eq!(sim::class_of(handle).as_deref(), Some(engine_class));
        assert!(!diagnostics().find(DiagnosticKind::UnknownClass, engine_class).is_empty());
        assert!(object.to_string().starts_with(&format!("<{engine_class}#")));
        if object.reference_count().is_none() {
            sim::destroy(handle);
        }
    }
}

#[test]
fn test_cast_checks_runtime_class() {
    let _guard = serial();
    let handle = sim::construct("Sprite2D").unwrap();
    let object = Gd::<Object>::from_handle(handle).unwrap();
    let node = object.cast::<Node>().unwrap();
    let node2d = node.cast::<Node2D>().unwrap();
    let node = node2d.upcast::<Node>();
    let back = node.cast::<Resource>().unwrap_err();
    assert_eq!(
        Gd::<Resource>::from_handle(handle).unwrap_err(),
        ConversionError::ClassMismatch {
            expected: "Resource".into(),
            found: "Sprite2D".into()
        }
    );
    back.free();
    assert!(!sim::is_alive(handle));
}

#[test]
fn test_engine_destruction_invalidates_handles() {
    let _guard = serial();
    let node = Gd::<Node>::new();
    let handle = node.handle();
    let id = node.instance_id();
    sim::destroy(handle);

    assert!(!node.is_alive());
    assert!(!active_handles().contains(&handle));
    assert_eq!(Gd::<Node>::from_instance_id(id).unwrap_err(), ConversionError::DeadObject);
    assert!(matches!(node.call("get_instance_id", &[]), Err(CallError::InstanceIsNull { .. })));
    assert!(node.to_variant().is_nil());
}

#[test]
fn test_double_free_is_reported() {
    let _guard = serial();
    let node = Gd::<Node>::new();
    let copy = Gd::<Node>::from_handle(node.handle()).unwrap();
    let id = node.instance_id().to_string();
    node.free();
    copy.free();
    assert!(!diagnostics().find(DiagnosticKind::Lifecycle, &id).is_empty());
}

#[test]
fn test_user_instances_are_bound() {
    let _guard = serial();
    let mut counter = Gd::<Counter>::new();
    assert_eq!(counter.class_name(), "IdentityCounter");
    assert_eq!(sim::class_of(counter.handle()).as_deref(), Some("IdentityCounter"));
    assert_eq!(counter.bind().owner.handle, counter.handle());

    counter.bind_mut().hits += 4;
    assert_eq!(counter.bind().hits, 4);
    assert_eq!(counter.to_variant().stringify(), "Counter(4)");

    let as_object = counter.clone().upcast::<RefCounted>();
    let back = as_object.cast::<Counter>().unwrap();
    assert!(back.same_instance(&counter));
    assert!(Counter::inherits("RefCounted"));

    let handle = counter.handle();
    drop(back);
    drop(counter);
    assert!(!sim::is_alive(handle));
}

#[test]
fn test_user_instance_dies_with_engine_object() {
    let _guard = serial();
    let walker = Gd::<Walker>::new();
    assert_eq!(walker.bind().steps, 3);
    let before = identity_stats();
    assert!(before.user >= 1);

    sim::destroy(walker.handle());
    assert!(walker.try_bind().is_none());
    assert_eq!(identity_stats().user, before.user - 1);

    let plain = Gd::<Node2D>::new();
    assert!(plain.clone().cast::<Walker>().is_err());
    plain.free();
}

#[test]
fn test_deferred_release() {
    let _guard = serial();
    set_deferred_release(true);
    let resource = Gd::<Resource>::new();
    let handle = resource.handle();
    drop(resource);

    assert!(sim::is_alive(handle));
    assert_eq!(pending_release_count(), 1);
    assert_eq!(release_pending_objects(), 1);
    assert_eq!(pending_release_count(), 0);
    assert!(!sim::is_alive(handle));
    set_deferred_release(false);
}

#[test]
fn test_stats_count_framework_and_user() {
    let _guard = serial();
    let before = identity_stats();
    let node = Gd::<Node>::new();
    let counter = Gd::<Counter>::new();
    let during = identity_stats();
    assert_eq!(during.framework, before.framework + 1);
    assert_eq!(during.user, before.user + 1);
    assert_eq!(during.total(), before.total() + 2);

    node.free();
    drop(counter);
    assert_eq!(identity_stats(), before);
}

#[test]
fn test_nil_is_not_an_object() {
    let _guard = serial();
    assert!(matches!(
        Gd::<Object>::from_variant(&Variant::nil()),
        Err(ConversionError::UnexpectedNil { .. })
    ));
    assert!(Option::<Gd<Object>>::from_variant(&Variant::nil()).unwrap().is_none());
    assert!(!object::is_deferred_release());
}
