//! 注册表
//!
//! [`ClassInfo<T>`] 收集一个宿主类要暴露给引擎的方法、属性、信号、常量和属性分组，
//! 按声明顺序保存，由 `init` 在父类注册完成后一次性提交。
//! 属性只能引用已经注册的方法；辅助函数还会检查访问器的类型与属性提示一致。

use super::method::{ErasedMethod, MethodEntry, MethodSignature};
use super::prop_info::{MethodFlags, PropInfo, PropertyHint, PropertyUsage, SignalInfo};
use crate::call::Arguments;
use crate::convert::{EngineBitfield, EngineEnum};
use crate::core::error::{CallError, CallResult, RegistrationError, RegistrationResult};
use crate::object::{InstanceStorage, UserClass};
use crate::variant::{FastVariant, GType};
use std::marker::PhantomData;

/// One declaration, in registration order.
#[derive(Debug)]
pub(crate) enum ClassItem {
    Method(MethodEntry),
    Property {
        info: PropInfo,
        getter: String,
        setter: String,
    },
    Signal(SignalInfo),
    Constant {
        enum_name: String,
        name: String,
        value: i64,
        is_bitfield: bool,
    },
    Group {
        name: String,
        prefix: String,
    },
    Subgroup {
        name: String,
        prefix: String,
    },
}

/// Registration table of the host class `T`.
pub struct ClassInfo<T: UserClass> {
    items: Vec<ClassItem>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: UserClass> ClassInfo<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn class_name(&self) -> &'static str {
        T::CLASS_NAME
    }

    /// Registers a typed method, e.g. `info.register_method("jump", Player::jump)`.
    pub fn register_method<F, M>(&mut self, name: &str, method: F) -> RegistrationResult<()>
    where
        F: MethodSignature<T, M>,
    {
        self.check_new_method(name)?;
        let entry = MethodEntry {
            class_name: T::CLASS_NAME,
            name: name.to_string(),
            arguments: F::argument_infos(),
            return_info: F::return_info(),
            flags: F::FLAGS,
            invoke: method.into_erased(T::CLASS_NAME, name.to_string()),
        };
        self.items.push(ClassItem::Method(entry));
        Ok(())
    }

    /// Registers a method with explicit descriptors and a body working on the raw argument list.
    ///
    /// A returned value whose type does not match `return_info` is rejected at call time.
    pub fn register_method_raw<F>(
        &mut self,
        name: &str,
        arguments: Vec<PropInfo>,
        return_info: Option<PropInfo>,
        body: F,
    ) -> RegistrationResult<()>
    where
        F: Fn(&mut T, &Arguments) -> CallResult<Option<FastVariant>> + Send + Sync + 'static,
    {
        self.check_new_method(name)?;
        let method = name.to_string();
        let invoke: Box<ErasedMethod> = Box::new(move |storage: &InstanceStorage, args: &Arguments| {
            let mut instance = storage.write::<T>().ok_or_else(|| CallError::InstanceIsNull {
                method: method.clone(),
            })?;
            body(&mut *instance, args)
        });
        self.items.push(ClassItem::Method(MethodEntry {
            class_name: T::CLASS_NAME,
            name: name.to_string(),
            arguments,
            return_info,
            flags: MethodFlags::DEFAULT,
            invoke,
        }));
        Ok(())
    }

    fn check_new_method(&self, name: &str) -> RegistrationResult<()> {
        if self.method(name).is_some() {
            return Err(RegistrationError::DuplicateMethod {
                class_name: T::CLASS_NAME.to_string(),
                method: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.items.iter().find_map(|item| match item {
            ClassItem::Method(entry) if entry.name == name => Some(entry),
            _ => None,
        })
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.method(name).is_some()
    }

    fn unknown_method(name: &str) -> RegistrationError {
        RegistrationError::UnknownMethod {
            class_name: T::CLASS_NAME.to_string(),
            method: name.to_string(),
        }
    }

    /// Links `info` to two registered methods. An empty `setter` makes the property read-only.
    pub fn register_property(&mut self, info: PropInfo, getter: &str, setter: &str) -> RegistrationResult<()> {
        if !self.has_method(getter) {
            return Err(Self::unknown_method(getter));
        }
        if !setter.is_empty() && !self.has_method(setter) {
            return Err(Self::unknown_method(setter));
        }
        if self.has_property(&info.name) {
            return Err(RegistrationError::DuplicateProperty {
                class_name: T::CLASS_NAME.to_string(),
                property: info.name,
            });
        }
        self.items.push(ClassItem::Property {
            info,
            getter: getter.to_string(),
            setter: setter.to_string(),
        });
        Ok(())
    }

    /// Registers the accessors and the property in one step. The descriptor follows the getter's
    /// return type.
    pub fn register_property_with_getter_setter<G, MG, S, MS>(
        &mut self,
        name: &str,
        getter_name: &str,
        getter: G,
        setter_name: &str,
        setter: S,
    ) -> RegistrationResult<()>
    where
        G: MethodSignature<T, MG>,
        S: MethodSignature<T, MS>,
    {
        self.register_method(getter_name, getter)?;
        self.register_method(setter_name, setter)?;
        let mut info = G::return_info().unwrap_or_else(|| PropInfo::variant(name));
        info.name = name.to_string();
        self.register_property(info, getter_name, setter_name)
    }

    /// Property whose getter must return `expected`.
    fn register_checked(
        &mut self,
        expected: GType,
        info: PropInfo,
        getter: &str,
        setter: &str,
    ) -> RegistrationResult<()> {
        let found = self
            .method(getter)
            .ok_or_else(|| Self::unknown_method(getter))?
            .return_info
            .as_ref()
            .map_or(GType::Nil, |ret| ret.gtype);
        if found != expected {
            return Err(RegistrationError::PropertyTypeMismatch {
                class_name: T::CLASS_NAME.to_string(),
                property: info.name,
                expected,
                found,
            });
        }
        self.register_property(info, getter, setter)
    }

    fn base_info(name: &str, gtype: GType) -> PropInfo {
        let mut info = PropInfo::variant(name);
        info.gtype = gtype;
        info.usage = PropertyUsage::DEFAULT;
        info
    }

    /// Integer property edited with a slider.
    pub fn register_int_range(
        &mut self,
        name: &str,
        getter: &str,
        setter: &str,
        min: i64,
        max: i64,
        step: i64,
    ) -> RegistrationResult<()> {
        let info = Self::base_info(name, GType::Int)
            .with_hint(PropertyHint::Range, format!("{min},{max},{step}"));
        self.register_checked(GType::Int, info, getter, setter)
    }

    /// Integer property restricted to the values of `E`.
    pub fn register_enum_property<E: EngineEnum>(
        &mut self,
        name: &str,
        getter: &str,
        setter: &str,
    ) -> RegistrationResult<()> {
        let info = Self::base_info(name, GType::Int).with_hint(PropertyHint::Enum, E::hint_string());
        self.register_checked(GType::Int, info, getter, setter)
    }

    pub fn register_text_property(
        &mut self,
        name: &str,
        getter: &str,
        setter: &str,
        multiline: bool,
    ) -> RegistrationResult<()> {
        let hint = if multiline {
            PropertyHint::MultilineText
        } else {
            PropertyHint::None
        };
        let info = Self::base_info(name, GType::String).with_hint(hint, "");
        self.register_checked(GType::String, info, getter, setter)
    }

    /// Node path property; `valid_types` limits the selectable node classes.
    pub fn register_node_path_property(
        &mut self,
        name: &str,
        getter: &str,
        setter: &str,
        valid_types: &[&str],
    ) -> RegistrationResult<()> {
        let info = Self::base_info(name, GType::NodePath)
            .with_hint(PropertyHint::NodePathValidTypes, valid_types.join(","));
        self.register_checked(GType::NodePath, info, getter, setter)
    }

    pub fn register_checkbox(&mut self, name: &str, getter: &str, setter: &str) -> RegistrationResult<()> {
        let info = Self::base_info(name, GType::Bool);
        self.register_checked(GType::Bool, info, getter, setter)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, ClassItem::Property { info, .. } if info.name == name))
    }

    pub fn register_signal(&mut self, signal: SignalInfo) -> RegistrationResult<()> {
        let exists = self
            .items
            .iter()
            .any(|item| matches!(item, ClassItem::Signal(existing) if existing.name == signal.name));
        if exists {
            return Err(RegistrationError::DuplicateSignal {
                class_name: T::CLASS_NAME.to_string(),
                signal: signal.name,
            });
        }
        self.items.push(ClassItem::Signal(signal));
        Ok(())
    }

    /// Class-level integer constant outside any enum.
    pub fn register_constant(&mut self, name: &str, value: i64) {
        self.push_constant("", name, value, false);
    }

    /// Exposes every value of `E` as a class constant in enum `E::ENUM_NAME`.
    pub fn register_enum<E: EngineEnum>(&mut self) {
        for (name, value) in E::values() {
            self.push_constant(E::ENUM_NAME, name, *value, false);
        }
    }

    /// Exposes every flag of `F` as a bit-field constant.
    pub fn register_bitfield<F: EngineBitfield>(&mut self) {
        for (name, value) in F::flags() {
            self.push_constant(F::ENUM_NAME, name, *value as i64, true);
        }
    }

    fn push_constant(&mut self, enum_name: &str, name: &str, value: i64, is_bitfield: bool) {
        self.items.push(ClassItem::Constant {
            enum_name: enum_name.to_string(),
            name: name.to_string(),
            value,
            is_bitfield,
        });
    }

    /// Starts an editor group; properties whose names start with `prefix` belong to it.
    pub fn add_property_group(&mut self, name: &str, prefix: &str) {
        self.items.push(ClassItem::Group {
            name: name.to_string(),
            prefix: prefix.to_string(),
        });
    }

    pub fn add_property_subgroup(&mut self, name: &str, prefix: &str) {
        self.items.push(ClassItem::Subgroup {
            name: name.to_string(),
            prefix: prefix.to_string(),
        });
    }

    pub(crate) fn into_items(self) -> Vec<ClassItem> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Owner, RefCounted};

    struct Counter {
        value: i64,
        label: String,
    }

    crate::user_class!(Counter: RefCounted, name = "ClassInfoCounter");

    impl UserClass for Counter {
        fn init(_owner: Owner) -> Self {
            Counter {
                value: 0,
                label: String::new(),
            }
        }
    }

    impl Counter {
        fn value(&self) -> i64 {
            self.value
        }

        fn set_value(&mut self, value: i64) {
            self.value = value;
        }

        fn label(&self) -> String {
            self.label.clone()
        }

        fn set_label(&mut self, label: String) {
            self.label = label;
        }
    }

    crate::variant_enum! {
        enum Mode {
            Idle = 0,
            Busy = 1,
        }
    }

    #[test]
    fn test_property_requires_registered_methods() {
        let mut info = ClassInfo::<Counter>::new();
        let err = info
            .register_property(PropInfo::new::<i64>("value"), "value", "set_value")
            .unwrap_err();
        assert!(matches!(err, RegistrationError::UnknownMethod { .. }));

        info.register_method("value", Counter::value).unwrap();
        info.register_method("set_value", Counter::set_value).unwrap();
        info.register_property(PropInfo::new::<i64>("value"), "value", "set_value")
            .unwrap();
        assert!(info.has_property("value"));
        assert!(matches!(
            info.register_property(PropInfo::new::<i64>("value"), "value", ""),
            Err(RegistrationError::DuplicateProperty { .. })
        ));
    }

    #[test]
    fn test_duplicate_method_is_rejected() {
        let mut info = ClassInfo::<Counter>::new();
        info.register_method("value", Counter::value).unwrap();
        assert!(matches!(
            info.register_method("value", Counter::value),
            Err(RegistrationError::DuplicateMethod { .. })
        ));
    }

    #[test]
    fn test_checked_helpers_validate_accessor_type() {
        let mut info = ClassInfo::<Counter>::new();
        info.register_method("label", Counter::label).unwrap();
        info.register_method("set_label", Counter::set_label).unwrap();
        let err = info
            .register_int_range("label", "label", "set_label", 0, 10, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::PropertyTypeMismatch {
                expected: GType::Int,
                found: GType::String,
                ..
            }
        ));
        info.register_text_property("label", "label", "set_label", true)
            .unwrap();
    }

    #[test]
    fn test_getter_setter_shortcut_and_ordering() {
        let mut info = ClassInfo::<Counter>::new();
        info.add_property_group("Stats", "stat_");
        info.register_property_with_getter_setter(
            "stat_value",
            "value",
            Counter::value,
            "set_value",
            Counter::set_value,
        )
        .unwrap();
        info.register_enum::<Mode>();
        info.register_signal(SignalInfo::new("changed")).unwrap();
        assert!(info.register_signal(SignalInfo::new("changed")).is_err());

        let items = info.into_items();
        assert!(matches!(&items[0], ClassItem::Group { name, .. } if name == "Stats"));
        assert!(matches!(&items[1], ClassItem::Method(entry) if entry.name == "value"));
        assert!(matches!(&items[2], ClassItem::Method(entry) if entry.name == "set_value"));
        assert!(matches!(&items[3], ClassItem::Property { info, .. } if info.gtype == GType::Int));
        let constants: Vec<_> = items
            .iter()
            .filter_map(|item| match item {
                ClassItem::Constant { enum_name, name, value, .. } => {
                    Some((enum_name.as_str(), name.as_str(), *value))
                }
                _ => None,
            })
            .collect();
        assert_eq!(constants, vec![("Mode", "Idle", 0), ("Mode", "Busy", 1)]);
    }
}
