//! 核心模块
//!
//! 包含桥接层的基础设施：
//! - `error` - 错误类型定义
//! - `diagnostics` - 诊断聚合与报告
//! - `macros` - 通用宏
//! - `utils` - 工具函数

pub mod diagnostics;
pub mod error;
#[macro_use]
pub mod macros;
pub mod utils;

// 重新导出错误类型
pub use error::{
    ArgumentAccessError, ArgumentResult, BridgeError, BridgeResult, CallError, CallResult,
    ContainerError, ContainerResult, ConversionError, ConversionResult, InterfaceError,
    InterfaceResult, LayoutError, LayoutResult, RegistrationError, RegistrationResult,
    VariantIndexError,
};

// 重新导出诊断聚合器
pub use diagnostics::{
    diagnostics, DiagnosticKind, DiagnosticRecord, DiagnosticStats, DiagnosticsAggregator,
};
