//! 内建类型布局
//!
//! - `metadata` - 构建配置与引擎发布的大小/偏移表
//! - `checker` - 宿主布局与引擎表的逐项比较
//!
//! 启动时（可选）校验，失败则拒绝加载扩展。

mod checker;
mod metadata;

pub use checker::{check_layouts, check_type, host_layouts, HostLayout, HostMember, LayoutReport};
pub use metadata::{BuildConfiguration, ConfigurationLayout, LayoutMetadata, MemberOffset, BUNDLED_METADATA};

use crate::config::LayoutConfig;
use crate::core::error::LayoutResult;

/// Checks the host layouts of the active build configuration against `metadata`.
pub fn validate(metadata: &LayoutMetadata) -> LayoutResult<LayoutReport> {
    let configuration = BuildConfiguration::active();
    check_layouts(metadata.configuration(configuration)?, configuration)
}

/// Loads the configured metadata file (the bundled table when none is set) and validates it.
pub fn validate_configured(config: &LayoutConfig) -> LayoutResult<LayoutReport> {
    let metadata = match &config.metadata_path {
        Some(path) => {
            tracing::debug!(target: "layout", "Loading layout metadata from {}", path.display());
            LayoutMetadata::from_file(path)?
        }
        None => LayoutMetadata::bundled()?,
    };
    validate(&metadata)
}
