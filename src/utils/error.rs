//! 模块宿主错误类型定义
//!
//! 本模块定义了内核中使用的所有错误类型。

use thiserror::Error;

/// 模块宿主核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 模块描述文件错误 ====================

    /// 描述文件无效（缺少 id、格式错误等）
    #[error("模块描述文件无效: '{module}' - {reason}")]
    DescriptorInvalid {
        module: String,
        reason: String,
    },

    /// 描述文件中声明的名称与存储目录不一致
    #[error("模块名称与目录不一致: 目录 '{folder}', 声明 '{declared}'")]
    NameMismatch {
        folder: String,
        declared: String,
    },

    // ==================== 模块注册表错误 ====================

    /// 模块 ID 重复
    #[error("模块 ID 重复: {id} 已被 '{existing}' 占用, 忽略 '{rejected}'")]
    DuplicateId {
        id: i32,
        existing: String,
        rejected: String,
    },

    /// 模块名称重复
    #[error("模块名称重复: '{0}'")]
    DuplicateName(String),

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 基础模块（id 0）不允许禁用
    #[error("基础模块不允许禁用: '{0}'")]
    BaselineLocked(String),

    /// 路径越出模块目录
    #[error("路径越界: '{0}'")]
    PathEscape(String),

    // ==================== 生命周期错误 ====================

    /// 生命周期钩子执行失败
    #[error("生命周期钩子失败: '{module}' {hook} - {reason}")]
    LifecycleHookFault {
        module: String,
        hook: &'static str,
        reason: String,
    },

    /// 监听器已声明但未注册
    #[error("监听器未注册: '{0}'")]
    ListenerNotRegistered(String),

    // ==================== 路由错误 ====================

    /// 路由解析失败（类型未找到、路由声明无效）
    #[error("路由解析失败: '{uri}' - {reason}")]
    ResolutionFault {
        uri: String,
        reason: String,
    },

    /// 路由未找到
    #[error("路由未找到: {method} '{uri}'")]
    RouteNotFound {
        method: String,
        uri: String,
    },

    /// 处理方法未找到
    #[error("处理方法未找到: '{0}'")]
    ActionNotFound(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 路由模式编译错误
    #[error("正则表达式错误: {0}")]
    Regex(#[from] regex::Error),

    /// 版本解析错误
    #[error("版本解析错误: {0}")]
    VersionParse(#[from] semver::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 内核操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 状态码常量
pub mod status_code {
    /// 成功
    pub const OK: u16 = 200;

    /// 请求格式错误
    pub const BAD_REQUEST: u16 = 400;

    /// 权限不足
    pub const FORBIDDEN: u16 = 403;

    /// 未找到
    pub const NOT_FOUND: u16 = 404;

    /// 冲突
    pub const CONFLICT: u16 = 409;

    /// 内部错误
    pub const INTERNAL_ERROR: u16 = 500;
}

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_DESCRIPTOR_INVALID: &str = "MODULE-001";
    pub const MODULE_NAME_MISMATCH: &str = "MODULE-002";
    pub const MODULE_DUPLICATE_ID: &str = "MODULE-003";
    pub const MODULE_DUPLICATE_NAME: &str = "MODULE-004";
    pub const MODULE_NOT_FOUND: &str = "MODULE-005";
    pub const MODULE_BASELINE_LOCKED: &str = "MODULE-006";
    pub const MODULE_PATH_ESCAPE: &str = "MODULE-007";

    // 生命周期错误 (LIFECYCLE-xxx)
    pub const LIFECYCLE_HOOK_FAULT: &str = "LIFECYCLE-001";
    pub const LIFECYCLE_LISTENER_MISSING: &str = "LIFECYCLE-002";

    // 路由错误 (ROUTE-xxx)
    pub const ROUTE_RESOLUTION_FAULT: &str = "ROUTE-001";
    pub const ROUTE_NOT_FOUND: &str = "ROUTE-002";
    pub const ROUTE_ACTION_NOT_FOUND: &str = "ROUTE-003";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
}

impl CoreError {
    /// 构造描述文件无效错误
    pub fn descriptor(module: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::DescriptorInvalid {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::DescriptorInvalid { .. } => error_code::MODULE_DESCRIPTOR_INVALID,
            CoreError::NameMismatch { .. } => error_code::MODULE_NAME_MISMATCH,
            CoreError::DuplicateId { .. } => error_code::MODULE_DUPLICATE_ID,
            CoreError::DuplicateName(_) => error_code::MODULE_DUPLICATE_NAME,
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            CoreError::BaselineLocked(_) => error_code::MODULE_BASELINE_LOCKED,
            CoreError::PathEscape(_) => error_code::MODULE_PATH_ESCAPE,
            CoreError::LifecycleHookFault { .. } => error_code::LIFECYCLE_HOOK_FAULT,
            CoreError::ListenerNotRegistered(_) => error_code::LIFECYCLE_LISTENER_MISSING,
            CoreError::ResolutionFault { .. } => error_code::ROUTE_RESOLUTION_FAULT,
            CoreError::RouteNotFound { .. } => error_code::ROUTE_NOT_FOUND,
            CoreError::ActionNotFound(_) => error_code::ROUTE_ACTION_NOT_FOUND,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            _ => "UNKNOWN",
        }
    }

    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::RouteNotFound { .. } => status_code::NOT_FOUND,
            CoreError::ActionNotFound(_) => status_code::NOT_FOUND,
            CoreError::ModuleNotFound(_) => status_code::NOT_FOUND,
            CoreError::DescriptorInvalid { .. } => status_code::BAD_REQUEST,
            CoreError::NameMismatch { .. } => status_code::BAD_REQUEST,
            CoreError::DuplicateId { .. } => status_code::CONFLICT,
            CoreError::DuplicateName(_) => status_code::CONFLICT,
            CoreError::BaselineLocked(_) => status_code::FORBIDDEN,
            CoreError::PathEscape(_) => status_code::FORBIDDEN,
            _ => status_code::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::DuplicateId {
            id: 4,
            existing: "blog".to_string(),
            rejected: "shop".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("blog"));
        assert!(text.contains("shop"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::descriptor("blog", "缺少 id");
        assert_eq!(err.error_code(), error_code::MODULE_DESCRIPTOR_INVALID);

        let err = CoreError::BaselineLocked("default".to_string());
        assert_eq!(err.error_code(), error_code::MODULE_BASELINE_LOCKED);
    }

    #[test]
    fn test_status_code() {
        let err = CoreError::RouteNotFound {
            method: "GET".to_string(),
            uri: "/x".to_string(),
        };
        assert_eq!(err.status_code(), status_code::NOT_FOUND);

        let err = CoreError::DuplicateName("blog".to_string());
        assert_eq!(err.status_code(), status_code::CONFLICT);

        let err = CoreError::PathEscape("../x".to_string());
        assert_eq!(err.status_code(), status_code::FORBIDDEN);
        assert_eq!(err.error_code(), error_code::MODULE_PATH_ESCAPE);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }
}
