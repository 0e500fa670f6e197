//! 宿主配置
//!
//! 定义宿主的配置结构、加载逻辑，以及覆盖链耗尽时使用的全局默认配置。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::utils::{CoreError, Result};

/// 路由配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 是否启用路由缓存
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 宿主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 宿主根目录，模块与共享代码目录都相对于它
    #[serde(default = "default_home")]
    pub home: PathBuf,

    /// 模块目录（默认 `<home>/modules`）
    #[serde(default)]
    pub modules_dir: Option<PathBuf>,

    /// 共享代码归档目录（默认 `<home>/lib`）
    #[serde(default)]
    pub lib_dir: Option<PathBuf>,

    /// 归档关联记录文件（默认 `<home>/jars.json`）
    #[serde(default)]
    pub jar_store: Option<PathBuf>,

    /// 默认语言
    #[serde(default = "default_language")]
    pub language: String,

    /// 全局默认设置，覆盖链耗尽时查询
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    /// 路由配置
    #[serde(default)]
    pub router: RouterConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_home() -> PathBuf {
    PathBuf::from(".")
}

fn default_language() -> String {
    "en_us".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            home: default_home(),
            modules_dir: None,
            lib_dir: None,
            jar_store: None,
            language: default_language(),
            settings: BTreeMap::new(),
            router: RouterConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl HostConfig {
    /// 创建配置构建器
    pub fn builder() -> HostConfigBuilder {
        HostConfigBuilder::new()
    }

    /// 从文件加载配置（`.json` 按 JSON 解析，其余按 YAML）
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&content, &path)?;
        config.config_path = Some(path);
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(content)?)
        } else {
            Ok(serde_yaml::from_str(content)?)
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "language".to_string(),
                reason: "不能为空".to_string(),
            });
        }
        Ok(())
    }

    /// 模块目录
    pub fn modules_dir(&self) -> PathBuf {
        self.modules_dir
            .clone()
            .unwrap_or_else(|| self.home.join("modules"))
    }

    /// 共享代码归档目录
    pub fn lib_dir(&self) -> PathBuf {
        self.lib_dir.clone().unwrap_or_else(|| self.home.join("lib"))
    }

    /// 归档关联记录文件
    pub fn jar_store_path(&self) -> PathBuf {
        self.jar_store
            .clone()
            .unwrap_or_else(|| self.home.join("jars.json"))
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: HostConfig) {
        if other.home != default_home() {
            self.home = other.home;
        }
        if other.modules_dir.is_some() {
            self.modules_dir = other.modules_dir;
        }
        if other.lib_dir.is_some() {
            self.lib_dir = other.lib_dir;
        }
        if other.jar_store.is_some() {
            self.jar_store = other.jar_store;
        }
        if other.language != default_language() {
            self.language = other.language;
        }
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if !other.router.cache_enabled {
            self.router.cache_enabled = false;
        }
        self.settings.extend(other.settings);
    }

    /// 以当前配置构建全局默认设置提供者
    pub fn global_settings(&self) -> GlobalSettings {
        let mut values = self.settings.clone();
        values
            .entry("language".to_string())
            .or_insert_with(|| self.language.clone());
        GlobalSettings::new(values)
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct HostConfigBuilder {
    config: HostConfig,
}

impl HostConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: HostConfig::default(),
        }
    }

    /// 设置宿主根目录
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.config.home = home.into();
        self
    }

    /// 设置模块目录
    pub fn modules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.modules_dir = Some(dir.into());
        self
    }

    /// 设置共享代码归档目录
    pub fn lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.lib_dir = Some(dir.into());
        self
    }

    /// 设置默认语言
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    /// 添加一条全局默认设置
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.settings.insert(key.into(), value.into());
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 禁用路由缓存
    pub fn without_route_cache(mut self) -> Self {
        self.config.router.cache_enabled = false;
        self
    }

    /// 构建配置
    pub fn build(self) -> HostConfig {
        self.config
    }
}

// ============================================================================
// 全局默认配置
// ============================================================================

/// 默认配置提供者
///
/// 覆盖链（模块 → floor → ... ）全部未命中时查询。
pub trait ConfigProvider: Send + Sync {
    /// 读取配置项，不存在时返回 `default`
    fn get(&self, key: &str, default: Option<&str>) -> Option<String>;
}

/// 基于键值表的全局默认配置
#[derive(Debug, Clone, Default)]
pub struct GlobalSettings {
    values: BTreeMap<String, String>,
}

impl GlobalSettings {
    /// 创建全局默认配置
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// 配置项数量
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigProvider for GlobalSettings {
    fn get(&self, key: &str, default: Option<&str>) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| default.map(str::to_string))
    }
}
