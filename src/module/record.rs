//! 模块记录定义
//!
//! 定义单个已安装模块的描述信息（对应模块目录下的 `module.ini`）。

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// 设置项的键前缀
pub const SETTING_PREFIX: &str = "setting.";

/// 默认截图路径
pub const DEFAULT_SCREENSHOT: &str = "/images/nopic.png";

/// 基础模块 ID
pub const BASELINE_ID: i32 = 0;

/// 将设置键规范化为带 `setting.` 前缀的形式
pub fn setting_key(name: &str) -> String {
    if name.starts_with(SETTING_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", SETTING_PREFIX, name)
    }
}

/// 去掉设置键的 `setting.` 前缀
pub fn bare_setting_key(name: &str) -> &str {
    name.strip_prefix(SETTING_PREFIX).unwrap_or(name)
}

/// 模块生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 未加载
    Unloaded,
    /// 描述文件已加载
    Loaded,
    /// 已执行 upgrade
    Initialized,
    /// 运行中
    Running,
    /// 已停止
    Stopped,
    /// 已卸载
    Uninstalled,
}

impl Default for ModuleState {
    fn default() -> Self {
        ModuleState::Unloaded
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Loaded => "loaded",
            ModuleState::Initialized => "initialized",
            ModuleState::Running => "running",
            ModuleState::Stopped => "stopped",
            ModuleState::Uninstalled => "uninstalled",
        };
        write!(f, "{}", s)
    }
}

/// 已安装模块
///
/// 加载后除设置项和启用标志外不再变化。`id` 决定覆盖优先级：
/// 大 id 覆盖小 id，id 0 是基础模块。
#[derive(Debug)]
pub struct Module {
    /// 模块 ID（覆盖优先级）
    pub id: i32,

    /// 模块名称，等于模块目录名
    pub name: String,

    /// 模块根目录
    pub path: PathBuf,

    /// 处理器根命名空间
    pub package: Option<String>,

    /// 生命周期监听器名称
    pub lifelistener: Option<String>,

    /// 版本
    pub version: Option<String>,

    /// 构建号
    pub build: Option<String>,

    /// 截图
    pub screenshot: String,

    /// 说明文件
    pub readme: Option<String>,

    /// 加载时间
    pub loaded_at: DateTime<Utc>,

    enabled: AtomicBool,
    settings: RwLock<BTreeMap<String, String>>,
}

impl Module {
    /// 创建模块构建器
    pub fn builder(id: i32, name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder::new(id, name)
    }

    /// 是否为基础模块
    pub fn is_baseline(&self) -> bool {
        self.id == BASELINE_ID
    }

    /// 是否启用
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// 修改启用标志（仅内存）
    pub fn mark_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// 视图目录
    pub fn view_dir(&self) -> PathBuf {
        self.path.join("view")
    }

    /// 翻译目录
    pub fn i18n_dir(&self) -> PathBuf {
        self.path.join("i18n")
    }

    /// 描述文件路径
    pub fn descriptor_path(&self) -> PathBuf {
        self.path.join("module.ini")
    }

    /// 写入设置项，键会被规范化为 `setting.` 前缀
    pub fn set(&self, name: &str, value: impl Into<String>) {
        self.settings.write().insert(setting_key(name), value.into());
    }

    /// 只在本模块中查找设置项
    pub fn own_setting(&self, name: &str) -> Option<String> {
        self.settings.read().get(&setting_key(name)).cloned()
    }

    /// 所有设置项的快照
    pub fn settings(&self) -> BTreeMap<String, String> {
        self.settings.read().clone()
    }

    /// 模块根目录是否在给定目录之下
    pub fn lives_in(&self, root: &Path) -> bool {
        self.path.starts_with(root)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// 模块摘要，用于列表输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub id: i32,
    pub name: String,
    pub enabled: bool,
    pub version: Option<String>,
    pub build: Option<String>,
}

impl From<&Module> for ModuleSummary {
    fn from(m: &Module) -> Self {
        Self {
            id: m.id,
            name: m.name.clone(),
            enabled: m.enabled(),
            version: m.version.clone(),
            build: m.build.clone(),
        }
    }
}

/// 模块构建器
#[derive(Debug)]
pub struct ModuleBuilder {
    id: i32,
    name: String,
    path: PathBuf,
    package: Option<String>,
    lifelistener: Option<String>,
    enabled: bool,
    version: Option<String>,
    build: Option<String>,
    screenshot: String,
    readme: Option<String>,
    settings: BTreeMap<String, String>,
}

impl ModuleBuilder {
    /// 创建构建器
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            path: PathBuf::from(&name),
            name,
            package: None,
            lifelistener: None,
            enabled: true,
            version: None,
            build: None,
            screenshot: DEFAULT_SCREENSHOT.to_string(),
            readme: None,
            settings: BTreeMap::new(),
        }
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn lifelistener(mut self, listener: impl Into<String>) -> Self {
        self.lifelistener = Some(listener.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn build_number(mut self, build: impl Into<String>) -> Self {
        self.build = Some(build.into());
        self
    }

    pub fn screenshot(mut self, screenshot: impl Into<String>) -> Self {
        self.screenshot = screenshot.into();
        self
    }

    pub fn readme(mut self, readme: impl Into<String>) -> Self {
        self.readme = Some(readme.into());
        self
    }

    /// 添加设置项（键会被规范化）
    pub fn setting(mut self, name: &str, value: impl Into<String>) -> Self {
        self.settings.insert(setting_key(name), value.into());
        self
    }

    /// 构建模块
    pub fn build(self) -> Module {
        Module {
            id: self.id,
            name: self.name,
            path: self.path,
            package: self.package,
            lifelistener: self.lifelistener,
            version: self.version,
            build: self.build,
            screenshot: self.screenshot,
            readme: self.readme,
            loaded_at: Utc::now(),
            enabled: AtomicBool::new(self.enabled),
            settings: RwLock::new(self.settings),
        }
    }
}
