//! # Godot Interop
//!
//! Variant marshalling and object-identity bridge for the Godot extension ABI.
//!
//! ## Features
//!
//! - **Variant**: owned and move-only engine values with bit-exact payloads
//! - **Conversion**: typed `ToVariant` / `FromVariant` for scalars, strings, math types, containers and objects
//! - **Arguments**: borrowed argument lists for engine-to-host calls without per-argument copies
//! - **Identity**: one host wrapper per engine object, reference transfer for ref-counted classes
//! - **Registration**: host classes with methods, properties, signals and constants
//! - **Layout**: startup check of builtin struct layouts against engine metadata
//! - **Reference engine**: an in-process implementation of the ABI for tests and benchmarks
//!
//! ## Architecture Design
//!
//! 所有引擎调用都经过 [`sys`] 的进程级函数表；上层模块只持有不透明负载与句柄：
//! - **State**: `Variant`、容器与 `Gd<T>` 只包装引擎拥有的内存
//! - **Bridge**: `convert`、`call`、`object` 负责类型化与所有权转换
//! - **Registry**: `registry` 把宿主类描述成引擎的注册结构
//!
//! ### Example
//!
//! ```ignore
//! use godot_interop::prelude::*;
//!
//! struct Player { speed: f64 }
//! godot_interop::user_class!(Player: Node2D);
//!
//! impl UserClass for Player {
//!     fn init(_owner: Owner) -> Self {
//!         Player { speed: 1.0 }
//!     }
//!
//!     fn register(info: &mut ClassInfo<Self>) -> RegistrationResult<()> {
//!         info.register_method("get_speed", |p: &Player| p.speed)
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`core`]: errors and diagnostics
//! - [`variant`]: Variant representation
//! - [`convert`]: typed conversions
//! - [`builtins`]: engine builtin types
//! - [`object`]: object handles and identity
//! - [`registry`]: class registration and the extension entry point
//! - [`layout`]: layout metadata and checks
//! - [`sim`]: reference engine

/// Errors, diagnostics and shared helpers
pub mod core;
/// Bridge configuration
pub mod config;
/// Tracing subscriber setup
pub mod logging;
/// Raw ABI types and the engine function table
pub mod sys;
/// Variant representation
pub mod variant;
/// Conversions between host values and Variants
pub mod convert;
/// Engine builtin types
pub mod builtins;
/// Engine-to-host argument lists and host-to-engine call buffers
pub mod call;
/// Object handles, instance storage and the identity map
pub mod object;
/// Class registration and extension lifecycle
pub mod registry;
/// Builtin layout metadata and validation
pub mod layout;
/// In-process reference engine
pub mod sim;

/// Commonly used items.
pub mod prelude {
    pub use crate::builtins::*;
    pub use crate::call::Arguments;
    pub use crate::convert::{FromVariant, ToVariant, VariantType};
    pub use crate::core::error::{BridgeResult, CallError, ConversionError, RegistrationResult};
    pub use crate::object::{GodotClass, Gd, Node, Node2D, Object, Owner, RefCounted, Resource, UserClass};
    pub use crate::registry::{ClassInfo, ClassRegistrar, ExtensionLibrary, PropInfo, SignalInfo};
    pub use crate::variant::{FastVariant, GType, Variant};
}
