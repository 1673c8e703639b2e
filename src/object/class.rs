//! 类层次
//!
//! 框架类（引擎原生）与宿主类共享 [`GodotClass`]；宿主类另外实现 [`UserClass`]。

use super::Owner;
use crate::core::error::RegistrationResult;
use crate::registry::ClassInfo;

/// Engine-visible class, either a framework class or a host-declared one.
pub trait GodotClass: 'static {
    /// Name the engine knows the class by.
    const CLASS_NAME: &'static str;

    /// Direct parent. `Object` is its own base.
    type Base: GodotClass;

    const IS_REFCOUNTED: bool;

    /// Declared on the host side and registered with the engine.
    const IS_USER: bool = false;

    #[doc(hidden)]
    fn __ensure_registered() -> RegistrationResult<()> {
        Ok(())
    }

    /// First framework class in the ancestry; the engine constructs this part of the object.
    fn native_class_name() -> &'static str {
        if Self::IS_USER {
            Self::Base::native_class_name()
        } else {
            Self::CLASS_NAME
        }
    }

    /// Class names from `Self` up to `Object`.
    fn ancestry() -> Vec<&'static str> {
        let mut names = vec![Self::CLASS_NAME];
        if Self::Base::CLASS_NAME != Self::CLASS_NAME {
            names.extend(Self::Base::ancestry());
        }
        names
    }

    fn inherits(class_name: &str) -> bool {
        Self::ancestry().contains(&class_name)
    }
}

/// Host-declared class whose instances live in the identity bridge.
pub trait UserClass: GodotClass + Send + Sync + Sized {
    /// Builds the host part of a freshly constructed engine object.
    fn init(owner: Owner) -> Self;

    /// Fills the registration table. Runs once, after the parent class is registered.
    fn register(_info: &mut ClassInfo<Self>) -> RegistrationResult<()> {
        Ok(())
    }

    /// Engine `to_string` override; `None` keeps the engine default.
    fn to_string(&self) -> Option<String> {
        None
    }
}

macro_rules! engine_class {
    ($name:ident : $base:ident, refcounted = $refcounted:expr) => {
        #[doc = concat!("Engine class `", stringify!($name), "`.")]
        #[derive(Debug)]
        pub struct $name {
            _private: (),
        }

        impl GodotClass for $name {
            const CLASS_NAME: &'static str = stringify!($name);
            type Base = $base;
            const IS_REFCOUNTED: bool = $refcounted;
        }
    };
}

engine_class!(Object: Object, refcounted = false);
engine_class!(RefCounted: Object, refcounted = true);
engine_class!(Resource: RefCounted, refcounted = true);
engine_class!(Node: Object, refcounted = false);
engine_class!(Node2D: Node, refcounted = false);

/// Framework classes the bridge can wrap directly, deepest first within each branch.
pub(crate) const FRAMEWORK_CLASSES: [&str; 5] = ["Node2D", "Node", "Resource", "RefCounted", "Object"];

/// Declares a host class: `user_class!(Player: Node);`
///
/// The type must also implement [`UserClass`]. `name = "..."` overrides the engine-visible name.
#[macro_export]
macro_rules! user_class {
    ($ty:ident : $base:ty) => {
        $crate::user_class!($ty : $base, name = stringify!($ty));
    };
    ($ty:ident : $base:ty, name = $name:expr) => {
        impl $crate::object::GodotClass for $ty {
            const CLASS_NAME: &'static str = $name;
            type Base = $base;
            const IS_REFCOUNTED: bool = <$base as $crate::object::GodotClass>::IS_REFCOUNTED;
            const IS_USER: bool = true;

            fn __ensure_registered() -> $crate::core::error::RegistrationResult<()> {
                $crate::registry::ensure_registered::<Self>()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_ancestry() {
        assert_eq!(Object::ancestry(), vec!["Object"]);
        assert_eq!(Node2D::ancestry(), vec!["Node2D", "Node", "Object"]);
        assert_eq!(Resource::ancestry(), vec!["Resource", "RefCounted", "Object"]);
        assert!(Resource::inherits("RefCounted"));
        assert!(!Node::inherits("RefCounted"));
        assert_eq!(Node2D::native_class_name(), "Node2D");
    }

    struct Hero;
    crate::user_class!(Hero: Node2D);

    impl UserClass for Hero {
        fn init(_owner: Owner) -> Self {
            Hero
        }
    }

    #[test]
    fn test_user_class_reports_native_base() {
        assert!(Hero::IS_USER);
        assert!(!Hero::IS_REFCOUNTED);
        assert_eq!(Hero::native_class_name(), "Node2D");
        assert_eq!(Hero::ancestry(), vec!["Hero", "Node2D", "Node", "Object"]);
    }
}
