//! 诊断聚合和报告模块
//!
//! 引擎发起的调用不能把错误传回引擎，只能记录诊断并返回空值。
//! 这里统一收集这些诊断：按类型、按来源计数，保留最近的记录，并可导出 JSON 报告。

use crate::config::DiagnosticsConfig;
use crate::core::utils::current_timestamp;
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

/// 诊断类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// 方法跳板中参数提取失败
    ArgumentError,
    /// 返回值类型与声明不符
    ReturnTypeMismatch,
    /// 值转换失败
    ConversionFailure,
    /// 跳板中的 panic 被拦截
    CallbackPanic,
    /// 重复的类名注册
    DuplicateClass,
    /// 句柄的类无法解析，退回到已知祖先类
    UnknownClass,
    /// 类型化容器拒绝了元素
    TypedContainerRejected,
    /// 内存布局不一致
    LayoutMismatch,
    /// 对象生命周期异常（重复释放等）
    Lifecycle,
}

impl DiagnosticKind {
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticKind::ArgumentError => "ArgumentError",
            DiagnosticKind::ReturnTypeMismatch => "ReturnTypeMismatch",
            DiagnosticKind::ConversionFailure => "ConversionFailure",
            DiagnosticKind::CallbackPanic => "CallbackPanic",
            DiagnosticKind::DuplicateClass => "DuplicateClass",
            DiagnosticKind::UnknownClass => "UnknownClass",
            DiagnosticKind::TypedContainerRejected => "TypedContainerRejected",
            DiagnosticKind::LayoutMismatch => "LayoutMismatch",
            DiagnosticKind::Lifecycle => "Lifecycle",
        }
    }

    /// Warnings are recoverable; everything else is logged as an error.
    pub fn is_warning(self) -> bool {
        matches!(self, DiagnosticKind::UnknownClass)
    }
}

/// 诊断记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub kind: DiagnosticKind,
    /// 来源（类名、方法名或模块名）
    pub source: String,
    pub message: String,
    /// 时间戳（秒）
    pub timestamp: u64,
}

/// 诊断统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticStats {
    pub total_count: u64,
    pub by_kind: HashMap<String, u64>,
    pub by_source: HashMap<String, u64>,
    pub recent: VecDeque<DiagnosticRecord>,
}

impl DiagnosticStats {
    /// 获取最常见的诊断类别
    pub fn most_common_kind(&self) -> Option<(&String, &u64)> {
        self.by_kind.iter().max_by_key(|(_, count)| *count)
    }

    pub fn count_of(&self, kind: DiagnosticKind) -> u64 {
        self.by_kind.get(kind.name()).copied().unwrap_or(0)
    }
}

/// 诊断聚合器
///
/// 线程安全，可以在多个线程中并发使用。
pub struct DiagnosticsAggregator {
    stats: Mutex<DiagnosticStats>,
    max_recent: AtomicUsize,
    forward_to_engine: AtomicBool,
}

impl_default!(DiagnosticsAggregator {
    stats: Mutex::new(DiagnosticStats::default()),
    max_recent: AtomicUsize::new(256),
    forward_to_engine: AtomicBool::new(true),
});

impl DiagnosticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &DiagnosticsConfig) -> Self {
        let aggregator = Self::new();
        aggregator.configure(config);
        aggregator
    }

    pub fn configure(&self, config: &DiagnosticsConfig) {
        self.max_recent.store(config.max_recent.max(1), Ordering::Relaxed);
        self.forward_to_engine
            .store(config.forward_to_engine, Ordering::Relaxed);
    }

    /// 记录诊断并写入日志
    pub fn report(&self, kind: DiagnosticKind, source: impl Into<String>, message: impl Into<String>) {
        let source = source.into();
        let message = message.into();

        if kind.is_warning() {
            tracing::warn!(target: "diagnostics", kind = kind.name(), source = %source, "{}", message);
        } else {
            tracing::error!(target: "diagnostics", kind = kind.name(), source = %source, "{}", message);
        }

        if self.forward_to_engine.load(Ordering::Relaxed) {
            if let Some(interface) = crate::sys::try_interface() {
                let text = format!("[{}] {}: {}", kind.name(), source, message);
                if kind.is_warning() {
                    interface.print_warning(&text, &source, file!(), line!());
                } else {
                    interface.print_error(&text, &source, file!(), line!());
                }
            }
        }

        let record = DiagnosticRecord {
            kind,
            source: source.clone(),
            message,
            timestamp: current_timestamp(),
        };

        let max_recent = self.max_recent.load(Ordering::Relaxed);
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total_count += 1;
        *stats.by_kind.entry(kind.name().to_string()).or_insert(0) += 1;
        *stats.by_source.entry(source).or_insert(0) += 1;
        stats.recent.push_back(record);
        while stats.recent.len() > max_recent {
            stats.recent.pop_front();
        }
    }

    /// 获取诊断统计快照
    pub fn stats(&self) -> DiagnosticStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Recent records matching `kind` whose source or message contains `needle`.
    pub fn find(&self, kind: DiagnosticKind, needle: &str) -> Vec<DiagnosticRecord> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats
            .recent
            .iter()
            .filter(|r| r.kind == kind && (r.source.contains(needle) || r.message.contains(needle)))
            .cloned()
            .collect()
    }

    /// 清除所有统计
    pub fn clear(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = DiagnosticStats::default();
    }

    /// 导出诊断报告（JSON格式）
    pub fn export_report(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.stats())
    }

    /// 导出诊断报告到文件
    pub fn export_report_to_file(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let report = self
            .export_report()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, report)
    }
}

static GLOBAL: OnceLock<DiagnosticsAggregator> = OnceLock::new();

/// 进程级诊断聚合器
pub fn diagnostics() -> &'static DiagnosticsAggregator {
    GLOBAL.get_or_init(DiagnosticsAggregator::new)
}

/// Shorthand for `diagnostics().report(..)`.
pub fn report(kind: DiagnosticKind, source: impl Into<String>, message: impl Into<String>) {
    diagnostics().report(kind, source, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> DiagnosticsAggregator {
        DiagnosticsAggregator::with_config(&DiagnosticsConfig {
            max_recent: 2,
            forward_to_engine: false,
            ..DiagnosticsConfig::default()
        })
    }

    #[test]
    fn test_counts_by_kind_and_source() {
        let aggregator = quiet();
        aggregator.report(DiagnosticKind::ArgumentError, "Player.jump", "missing value");
        aggregator.report(DiagnosticKind::ArgumentError, "Player.run", "missing value");
        aggregator.report(DiagnosticKind::DuplicateClass, "Player", "duplicate");

        let stats = aggregator.stats();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.count_of(DiagnosticKind::ArgumentError), 2);
        assert_eq!(stats.by_source.get("Player"), Some(&1));
        assert_eq!(
            stats.most_common_kind().map(|(k, _)| k.as_str()),
            Some("ArgumentError")
        );
    }

    #[test]
    fn test_recent_ring_is_bounded() {
        let aggregator = quiet();
        for i in 0..5 {
            aggregator.report(DiagnosticKind::Lifecycle, format!("src{i}"), "x");
        }
        let stats = aggregator.stats();
        assert_eq!(stats.recent.len(), 2);
        assert_eq!(stats.recent[0].source, "src3");
        assert_eq!(aggregator.find(DiagnosticKind::Lifecycle, "src4").len(), 1);
    }

    #[test]
    fn test_export_report() {
        let aggregator = quiet();
        aggregator.report(DiagnosticKind::UnknownClass, "Timer", "wrapped as Node");
        let report = aggregator.export_report().unwrap();
        assert!(report.contains("UnknownClass"));
        assert!(report.contains("Timer"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagnostics.json");
        aggregator.export_report_to_file(&path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("wrapped as Node"));

        aggregator.clear();
        assert_eq!(aggregator.stats().total_count, 0);
    }
}
