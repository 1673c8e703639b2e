//! 统一错误处理模块
//!
//! 提供桥接层范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **致命错误** (`LayoutError`, `InterfaceError`): 启动阶段检测，不可恢复
//! - **可恢复错误** (`ConversionError`, `ArgumentAccessError`, `CallError`): 由调用方处理
//! - **注册错误** (`RegistrationError`): 通过诊断钩子报告
//!
//! `BridgeError` 可以同时承载以上所有错误。

use crate::config::ConfigError;
use crate::variant::GType;
use thiserror::Error;

/// 桥接层核心错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Interface error: {0}")]
    Interface(#[from] InterfaceError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Argument error: {0}")]
    Argument(#[from] ArgumentAccessError),

    #[error("Call error: {0}")]
    Call(#[from] CallError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("General error: {0}")]
    General(String),
}

/// 引擎接口加载错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("Engine function not found: {0}")]
    MissingFunction(&'static str),

    #[error("Engine did not provide Variant constructors for {0}")]
    MissingConstructor(GType),

    #[error("Engine interface already initialized")]
    AlreadyInitialized,

    #[error("Engine interface not initialized")]
    NotInitialized,

    #[error("Incompatible engine version {major}.{minor}")]
    IncompatibleVersion { major: u32, minor: u32 },
}

/// 值转换错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: GType, found: GType },

    #[error("Unexpected nil: expected a value of type {expected}")]
    UnexpectedNil { expected: GType },

    #[error("Class mismatch: expected {expected}, found {found}")]
    ClassMismatch { expected: String, found: String },

    #[error("Object {handle:#x} could not be resolved to a known class")]
    UnknownClass { handle: usize },

    #[error("Object was already freed")]
    DeadObject,

    #[error("Integer overflow: value {value} doesn't fit in {target}")]
    IntegerOverflow { value: i64, target: &'static str },

    #[error("Invalid value {value} for {target}")]
    InvalidEnumValue { value: i64, target: &'static str },

    #[error("Element conversion failed at index {index}: {source}")]
    ElementError {
        index: usize,
        #[source]
        source: Box<ConversionError>,
    },

    #[error("Typed container mismatch: expected {expected}, found {found}")]
    TypedContainerMismatch { expected: String, found: String },

    #[error("{0}")]
    Custom(String),
}

impl ConversionError {
    /// Mismatch error for a Variant of type `found`, using the nil variant when appropriate.
    pub fn mismatch(expected: GType, found: GType) -> Self {
        if found == GType::Nil && expected != GType::Nil {
            ConversionError::UnexpectedNil { expected }
        } else {
            ConversionError::TypeMismatch { expected, found }
        }
    }

    pub fn element(index: usize, source: ConversionError) -> Self {
        ConversionError::ElementError {
            index,
            source: Box::new(source),
        }
    }
}

/// 参数访问错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentAccessError {
    #[error("Argument index {index} out of bounds (argument count {count})")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("Missing value for argument {index}: expected {expected}")]
    MissingValue { index: usize, expected: GType },

    #[error("Argument {index}: {source}")]
    Conversion {
        index: usize,
        #[source]
        source: ConversionError,
    },
}

impl ArgumentAccessError {
    pub fn index(&self) -> usize {
        match self {
            ArgumentAccessError::IndexOutOfBounds { index, .. }
            | ArgumentAccessError::MissingValue { index, .. }
            | ArgumentAccessError::Conversion { index, .. } => *index,
        }
    }

    /// Wraps a conversion failure; `UnexpectedNil` becomes `MissingValue`.
    pub fn from_conversion(index: usize, source: ConversionError) -> Self {
        match source {
            ConversionError::UnexpectedNil { expected } => {
                ArgumentAccessError::MissingValue { index, expected }
            }
            source => ArgumentAccessError::Conversion { index, source },
        }
    }
}

/// 方法调用错误（与引擎的 `GDExtensionCallError` 对应）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Invalid method: {method}")]
    InvalidMethod { method: String },

    #[error("Invalid argument {index} for {method}: expected {expected}")]
    InvalidArgument {
        method: String,
        index: usize,
        expected: GType,
    },

    #[error("Too many arguments for {method}: expected {expected}")]
    TooManyArguments { method: String, expected: usize },

    #[error("Too few arguments for {method}: expected {expected}")]
    TooFewArguments { method: String, expected: usize },

    #[error("Instance is null while calling {method}")]
    InstanceIsNull { method: String },

    #[error("Method {method} is not const")]
    MethodNotConst { method: String },

    #[error("Unknown call error {code} in {method}")]
    Unknown { method: String, code: u32 },
}

/// Variant 索引访问错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariantIndexError {
    #[error("Index {index} out of bounds")]
    OutOfBounds { index: i64 },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Operation not supported by this Variant type")]
    InvalidOperation,
}

/// 内存布局校验错误（致命）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Size mismatch for {type_name}: engine {expected}, host {actual}")]
    SizeMismatch {
        type_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Offset mismatch for {type_name}.{member}: engine {expected}, host {actual}")]
    OffsetMismatch {
        type_name: String,
        member: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown member {type_name}.{member}")]
    UnknownMember { type_name: String, member: String },

    #[error("Members of {type_name} cover {covered} of {size} bytes")]
    UncheckedBytes {
        type_name: String,
        covered: usize,
        size: usize,
    },

    #[error("Build configuration {0} not found in layout metadata")]
    MissingConfiguration(String),

    #[error("Type {type_name} missing from layout metadata for {configuration}")]
    MissingType {
        type_name: String,
        configuration: String,
    },

    #[error("Layout metadata parse error: {0}")]
    Parse(String),
}

/// 类注册错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Class name {class_name} is already registered")]
    DuplicateClass { class_name: String },

    #[error("Parent class {parent} of {class_name} is not available")]
    ParentUnavailable { class_name: String, parent: String },

    #[error("Method {class_name}.{method} is not registered")]
    UnknownMethod { class_name: String, method: String },

    #[error("Method {class_name}.{method} is registered twice")]
    DuplicateMethod { class_name: String, method: String },

    #[error("Property {class_name}.{property} is registered twice")]
    DuplicateProperty { class_name: String, property: String },

    #[error("Signal {class_name}.{signal} is registered twice")]
    DuplicateSignal { class_name: String, signal: String },

    #[error("Property {class_name}.{property} expects {expected}, accessor uses {found}")]
    PropertyTypeMismatch {
        class_name: String,
        property: String,
        expected: GType,
        found: GType,
    },

    #[error("Registration of {class_name} failed: {reason}")]
    RegisterFailed { class_name: String, reason: String },

    #[error("Engine could not construct an instance of {class_name}")]
    ConstructionFailed { class_name: String },

    #[error("Engine interface not initialized")]
    NotInitialized,
}

/// 容器错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContainerError {
    #[error("Element {index} has type {found}, container expects {expected}")]
    ElementTypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Container is typed as {found}, expected {expected}")]
    ContainerTypeMismatch { expected: String, found: String },

    #[error("Element rejected by the engine: {0}")]
    Rejected(String),
}

/// 统一结果类型
pub type BridgeResult<T> = Result<T, BridgeError>;
pub type InterfaceResult<T> = Result<T, InterfaceError>;
pub type ConversionResult<T> = Result<T, ConversionError>;
pub type ArgumentResult<T> = Result<T, ArgumentAccessError>;
pub type CallResult<T> = Result<T, CallError>;
pub type LayoutResult<T> = Result<T, LayoutError>;
pub type RegistrationResult<T> = Result<T, RegistrationError>;
pub type ContainerResult<T> = Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_maps_to_unexpected_nil() {
        assert_eq!(
            ConversionError::mismatch(GType::Int, GType::Nil),
            ConversionError::UnexpectedNil {
                expected: GType::Int
            }
        );
        assert_eq!(
            ConversionError::mismatch(GType::Int, GType::Bool),
            ConversionError::TypeMismatch {
                expected: GType::Int,
                found: GType::Bool
            }
        );
    }

    #[test]
    fn test_argument_error_keeps_missing_value_distinct() {
        let missing = ArgumentAccessError::from_conversion(
            2,
            ConversionError::UnexpectedNil {
                expected: GType::String,
            },
        );
        assert!(matches!(missing, ArgumentAccessError::MissingValue { index: 2, .. }));

        let mismatch = ArgumentAccessError::from_conversion(
            1,
            ConversionError::TypeMismatch {
                expected: GType::Int,
                found: GType::Bool,
            },
        );
        assert!(matches!(mismatch, ArgumentAccessError::Conversion { index: 1, .. }));
        assert_eq!(mismatch.index(), 1);
    }

    #[test]
    fn test_bridge_error_from() {
        let err: BridgeError = LayoutError::MissingConfiguration("float_64".into()).into();
        assert!(err.to_string().contains("float_64"));
    }
}
