//! 生命周期驱动
//!
//! 通过模块声明的生命周期监听器驱动状态转换：
//!
//! ```text
//! Unloaded -> Loaded -> Initialized -> Running -> Stopped -> Uninstalled
//! ```
//!
//! 非基础模块进入 Initialized 前，总是先用基础模块（id 0）的监听器执行
//! `upgrade`。钩子失败只记录警告，不阻断后续转换。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::loader::ModuleLoader;
use super::record::{Module, ModuleState};
use super::registry::ModuleRegistry;
use crate::core::HostConfig;
use crate::utils::{CoreError, Result};

/// 生命周期监听器
///
/// 所有钩子都有空的默认实现。
#[async_trait]
pub trait LifeListener: Send + Sync {
    /// 安装或升级（执行安装脚本等）
    async fn upgrade(&self, _config: &HostConfig, _module: &Module) -> Result<()> {
        Ok(())
    }

    /// 启动
    async fn start(&self, _config: &HostConfig, _module: &Module) -> Result<()> {
        Ok(())
    }

    /// 停止
    async fn stop(&self, _config: &HostConfig, _module: &Module) -> Result<()> {
        Ok(())
    }

    /// 卸载
    async fn uninstall(&self, _config: &HostConfig, _module: &Module) -> Result<()> {
        Ok(())
    }
}

/// 生命周期钩子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Upgrade,
    Start,
    Stop,
    Uninstall,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::Upgrade => "upgrade",
            Hook::Start => "start",
            Hook::Stop => "stop",
            Hook::Uninstall => "uninstall",
        }
    }
}

/// 生命周期驱动
pub struct LifecycleDriver {
    /// 监听器：声明名称 -> 监听器
    listeners: Arc<RwLock<HashMap<String, Arc<dyn LifeListener>>>>,

    /// 模块状态：module_id -> ModuleState
    states: Arc<RwLock<HashMap<i32, ModuleState>>>,

    config: Arc<HostConfig>,
}

impl LifecycleDriver {
    /// 创建生命周期驱动
    pub fn new(config: Arc<HostConfig>) -> Self {
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
            states: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// 创建带有初始监听器的生命周期驱动
    pub fn with_listeners(
        config: Arc<HostConfig>,
        listeners: Vec<(String, Arc<dyn LifeListener>)>,
    ) -> Self {
        Self {
            listeners: Arc::new(RwLock::new(listeners.into_iter().collect())),
            states: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// 注册监听器
    ///
    /// `name` 对应模块描述文件中的 `lifelistener`。
    pub async fn register_listener(&self, name: impl Into<String>, listener: Arc<dyn LifeListener>) {
        let name = name.into();
        debug!(listener = %name, "注册生命周期监听器");
        self.listeners.write().await.insert(name, listener);
    }

    /// 模块当前状态
    pub async fn state(&self, id: i32) -> ModuleState {
        self.states.read().await.get(&id).copied().unwrap_or_default()
    }

    async fn set_state(&self, module: &Module, state: ModuleState) {
        debug!(module_id = %module.id, state = %state, "模块状态变更");
        self.states.write().await.insert(module.id, state);
    }

    /// 标记描述文件已加载
    pub async fn mark_loaded(&self, module: &Module) {
        self.set_state(module, ModuleState::Loaded).await;
    }

    /// 清空所有状态
    pub async fn clear(&self) {
        self.states.write().await.clear();
    }

    // ==================== 钩子调用 ====================

    async fn listener_for(&self, module: &Module) -> Option<std::result::Result<Arc<dyn LifeListener>, CoreError>> {
        let name = module.lifelistener.as_ref()?;
        let listener = self.listeners.read().await.get(name).cloned();
        Some(listener.ok_or_else(|| CoreError::ListenerNotRegistered(name.clone())))
    }

    /// 用 `owner` 的监听器对 `target` 执行钩子，返回故障（若有）
    async fn run_hook(&self, owner: &Module, target: &Module, hook: Hook) -> Option<CoreError> {
        let listener = match self.listener_for(owner).await? {
            Ok(l) => l,
            Err(e) => {
                warn!(module_id = %target.id, hook = hook.as_str(), error = %e, "生命周期监听器未注册");
                return Some(e);
            }
        };

        let config = self.config.as_ref();
        let result = match hook {
            Hook::Upgrade => listener.upgrade(config, target).await,
            Hook::Start => listener.start(config, target).await,
            Hook::Stop => listener.stop(config, target).await,
            Hook::Uninstall => listener.uninstall(config, target).await,
        };

        match result {
            Ok(()) => {
                debug!(module_id = %target.id, listener_owner = %owner.name, hook = hook.as_str(), "钩子执行成功");
                None
            }
            Err(e) => {
                warn!(module_id = %target.id, listener_owner = %owner.name, hook = hook.as_str(), error = %e, "钩子执行失败");
                Some(CoreError::LifecycleHookFault {
                    module: target.name.clone(),
                    hook: hook.as_str(),
                    reason: e.to_string(),
                })
            }
        }
    }

    // ==================== 状态转换 ====================

    /// Loaded -> Initialized
    ///
    /// 非基础模块先执行基础模块监听器的 `upgrade`，再执行自己的 `upgrade`。
    /// 返回执行中出现的钩子故障。
    #[instrument(skip_all, fields(module_id = %module.id))]
    pub async fn initialize(&self, module: &Module, registry: &ModuleRegistry) -> Vec<CoreError> {
        let mut faults = Vec::new();

        if !module.is_baseline() {
            if let Some(baseline) = registry.baseline() {
                faults.extend(self.run_hook(&baseline, module, Hook::Upgrade).await);
            }
        }
        faults.extend(self.run_hook(module, module, Hook::Upgrade).await);

        self.set_state(module, ModuleState::Initialized).await;
        faults
    }

    /// Initialized -> Running
    pub async fn start(&self, module: &Module) -> Vec<CoreError> {
        let faults: Vec<CoreError> = self.run_hook(module, module, Hook::Start).await.into_iter().collect();
        self.set_state(module, ModuleState::Running).await;
        info!(module_id = %module.id, module_name = %module.name, "模块已启动");
        faults
    }

    /// Running -> Stopped
    pub async fn stop(&self, module: &Module) -> Vec<CoreError> {
        let faults: Vec<CoreError> = self.run_hook(module, module, Hook::Stop).await.into_iter().collect();
        self.set_state(module, ModuleState::Stopped).await;
        info!(module_id = %module.id, module_name = %module.name, "模块已停止");
        faults
    }

    /// Stopped -> Uninstalled
    pub async fn uninstall(&self, module: &Module) -> Vec<CoreError> {
        let faults: Vec<CoreError> = self.run_hook(module, module, Hook::Uninstall).await.into_iter().collect();
        self.set_state(module, ModuleState::Uninstalled).await;
        info!(module_id = %module.id, module_name = %module.name, "模块已卸载");
        faults
    }

    /// Loaded -> Initialized -> Running
    pub async fn boot(&self, module: &Module, registry: &ModuleRegistry) -> Vec<CoreError> {
        let mut faults = self.initialize(module, registry).await;
        faults.extend(self.start(module).await);
        faults
    }

    /// 启用或禁用模块
    ///
    /// 启用：加入注册表并执行 `initialize` + `start`；已在运行的模块不再执行钩子。
    /// 禁用：注册表中的同名模块被移出并执行 `stop` + `uninstall`。
    /// 无论钩子结果如何，启用标志都会立即写回描述文件。
    ///
    /// # Errors
    ///
    /// - 禁用基础模块返回 `BaselineLocked`
    /// - 注册表冲突（重复 id 或名称）
    /// - 描述文件写入失败
    #[instrument(skip_all, fields(module_id = %module.id, enabled = enabled))]
    pub async fn set_enabled(
        &self,
        module: Arc<Module>,
        enabled: bool,
        registry: &ModuleRegistry,
        loader: &ModuleLoader,
    ) -> Result<Vec<CoreError>> {
        let faults = if enabled {
            let registered = registry
                .get(module.id)
                .map_or(false, |m| m.name == module.name);
            if registered && self.state(module.id).await == ModuleState::Running {
                debug!(module_id = %module.id, "模块已在运行，跳过钩子");
                module.mark_enabled(true);
                Vec::new()
            } else {
                registry.enable(module.clone())?;
                self.boot(&module, registry).await
            }
        } else {
            if module.is_baseline() {
                warn!(module_id = %module.id, "拒绝禁用基础模块");
                return Err(CoreError::BaselineLocked(module.name.clone()));
            }
            module.mark_enabled(false);
            match registry.remove_if(module.id, &module.name) {
                Some(removed) => {
                    removed.mark_enabled(false);
                    info!(module_id = %module.id, module_name = %module.name, "模块已禁用");
                    let mut faults = self.stop(&removed).await;
                    faults.extend(self.uninstall(&removed).await);
                    faults
                }
                // 未注册的模块没有运行状态，只写回启用标志
                None => {
                    debug!(module_id = %module.id, module_name = %module.name, "模块未注册，跳过钩子");
                    Vec::new()
                }
            }
        };

        loader.store(&module).await?;
        Ok(faults)
    }
}

impl std::fmt::Debug for LifecycleDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleDriver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// 记录钩子调用顺序的监听器
    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_upgrade: bool,
    }

    #[async_trait]
    impl LifeListener for Recorder {
        async fn upgrade(&self, _config: &HostConfig, module: &Module) -> Result<()> {
            self.log.lock().push(format!("{}:upgrade:{}", self.tag, module.name));
            if self.fail_upgrade {
                return Err(CoreError::Internal("boom".to_string()));
            }
            Ok(())
        }

        async fn start(&self, _config: &HostConfig, module: &Module) -> Result<()> {
            self.log.lock().push(format!("{}:start:{}", self.tag, module.name));
            Ok(())
        }

        async fn stop(&self, _config: &HostConfig, module: &Module) -> Result<()> {
            self.log.lock().push(format!("{}:stop:{}", self.tag, module.name));
            Ok(())
        }

        async fn uninstall(&self, _config: &HostConfig, module: &Module) -> Result<()> {
            self.log.lock().push(format!("{}:uninstall:{}", self.tag, module.name));
            Ok(())
        }
    }

    async fn setup(fail_upgrade: bool) -> (LifecycleDriver, ModuleRegistry, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let driver = LifecycleDriver::new(Arc::new(HostConfig::default()));
        driver
            .register_listener(
                "base",
                Arc::new(Recorder { tag: "base", log: log.clone(), fail_upgrade: false }),
            )
            .await;
        driver
            .register_listener(
                "blog",
                Arc::new(Recorder { tag: "blog", log: log.clone(), fail_upgrade }),
            )
            .await;

        let registry = ModuleRegistry::new();
        registry
            .register(Module::builder(0, "default").lifelistener("base").build())
            .unwrap();
        registry
            .register(Module::builder(3, "blog").lifelistener("blog").build())
            .unwrap();
        (driver, registry, log)
    }

    #[tokio::test]
    async fn test_baseline_upgrade_runs_first() {
        let (driver, registry, log) = setup(false).await;
        let blog = registry.get(3).unwrap();

        let faults = driver.boot(&blog, &registry).await;
        assert!(faults.is_empty());
        assert_eq!(
            *log.lock(),
            vec!["base:upgrade:blog", "blog:upgrade:blog", "blog:start:blog"]
        );
        assert_eq!(driver.state(3).await, ModuleState::Running);
    }

    #[tokio::test]
    async fn test_baseline_module_skips_self_baseline() {
        let (driver, registry, log) = setup(false).await;
        let base = registry.get(0).unwrap();

        driver.boot(&base, &registry).await;
        assert_eq!(*log.lock(), vec!["base:upgrade:default", "base:start:default"]);
    }

    #[tokio::test]
    async fn test_failed_upgrade_does_not_block_start() {
        let (driver, registry, log) = setup(true).await;
        let blog = registry.get(3).unwrap();

        let faults = driver.boot(&blog, &registry).await;
        assert_eq!(faults.len(), 1);
        assert!(matches!(faults[0], CoreError::LifecycleHookFault { hook: "upgrade", .. }));
        assert_eq!(log.lock().last().map(String::as_str), Some("blog:start:blog"));
        assert_eq!(driver.state(3).await, ModuleState::Running);
    }

    #[tokio::test]
    async fn test_missing_listener_is_fault() {
        let driver = LifecycleDriver::new(Arc::new(HostConfig::default()));
        let registry = ModuleRegistry::new();
        let m = registry
            .register(Module::builder(1, "shop").lifelistener("nobody").build())
            .unwrap();

        let faults = driver.boot(&m, &registry).await;
        assert_eq!(faults.len(), 2);
        assert!(matches!(faults[0], CoreError::ListenerNotRegistered(_)));
        assert_eq!(driver.state(1).await, ModuleState::Running);
    }

    #[tokio::test]
    async fn test_module_without_listener() {
        let driver = LifecycleDriver::new(Arc::new(HostConfig::default()));
        let registry = ModuleRegistry::new();
        let m = registry.register(Module::builder(1, "plain").build()).unwrap();

        assert_eq!(driver.state(1).await, ModuleState::Unloaded);
        driver.mark_loaded(&m).await;
        assert_eq!(driver.state(1).await, ModuleState::Loaded);
        assert!(driver.boot(&m, &registry).await.is_empty());
    }

    #[tokio::test]
    async fn test_disable_runs_stop_and_uninstall_and_persists() {
        let temp = TempDir::new().unwrap();
        let (driver, registry, log) = setup(false).await;
        let loader = ModuleLoader::new(temp.path());

        let blog = Arc::new(
            Module::builder(5, "news")
                .path(temp.path().join("news"))
                .lifelistener("blog")
                .build(),
        );
        registry.register(blog.clone()).unwrap();
        log.lock().clear();

        let faults = driver
            .set_enabled(blog.clone(), false, &registry, &loader)
            .await
            .unwrap();
        assert!(faults.is_empty());
        assert_eq!(*log.lock(), vec!["blog:stop:news", "blog:uninstall:news"]);
        assert!(registry.get(5).is_none());
        assert_eq!(driver.state(5).await, ModuleState::Uninstalled);

        let stored = loader.load("news").await.unwrap();
        assert!(!stored.enabled());
    }

    #[tokio::test]
    async fn test_enable_boots_module() {
        let temp = TempDir::new().unwrap();
        let (driver, registry, log) = setup(false).await;
        let loader = ModuleLoader::new(temp.path());

        let news = Arc::new(
            Module::builder(5, "news")
                .path(temp.path().join("news"))
                .lifelistener("blog")
                .enabled(false)
                .build(),
        );

        driver.set_enabled(news.clone(), true, &registry, &loader).await.unwrap();
        assert!(news.enabled());
        assert_eq!(registry.home().unwrap().id, 5);
        assert_eq!(log.lock().first().map(String::as_str), Some("base:upgrade:news"));
        assert!(loader.load("news").await.unwrap().enabled());
    }

    #[tokio::test]
    async fn test_disable_unregistered_keeps_same_id_module() {
        let temp = TempDir::new().unwrap();
        let (driver, registry, log) = setup(false).await;
        let loader = ModuleLoader::new(temp.path());

        let news = Arc::new(
            Module::builder(5, "news")
                .path(temp.path().join("news"))
                .lifelistener("blog")
                .build(),
        );
        registry.register(news.clone()).unwrap();
        driver.boot(&news, &registry).await;
        log.lock().clear();

        let shop = Arc::new(
            Module::builder(5, "shop")
                .path(temp.path().join("shop"))
                .lifelistener("blog")
                .enabled(false)
                .build(),
        );
        let faults = driver
            .set_enabled(shop, false, &registry, &loader)
            .await
            .unwrap();

        assert!(faults.is_empty());
        assert!(log.lock().is_empty());
        assert_eq!(registry.get(5).unwrap().name, "news");
        assert!(news.enabled());
        assert_eq!(driver.state(5).await, ModuleState::Running);
        assert!(!loader.load("shop").await.unwrap().enabled());
    }

    #[tokio::test]
    async fn test_enable_running_module_skips_hooks() {
        let temp = TempDir::new().unwrap();
        let (driver, registry, log) = setup(false).await;
        let loader = ModuleLoader::new(temp.path());

        let news = Arc::new(
            Module::builder(5, "news")
                .path(temp.path().join("news"))
                .lifelistener("blog")
                .build(),
        );
        driver.set_enabled(news.clone(), true, &registry, &loader).await.unwrap();
        log.lock().clear();

        let faults = driver
            .set_enabled(news.clone(), true, &registry, &loader)
            .await
            .unwrap();
        assert!(faults.is_empty());
        assert!(log.lock().is_empty());
        assert_eq!(driver.state(5).await, ModuleState::Running);
        assert!(loader.load("news").await.unwrap().enabled());
    }

    #[tokio::test]
    async fn test_disable_baseline_refused() {
        let temp = TempDir::new().unwrap();
        let (driver, registry, _log) = setup(false).await;
        let loader = ModuleLoader::new(temp.path());
        let base = registry.get(0).unwrap();

        let result = driver.set_enabled(base, false, &registry, &loader).await;
        assert!(matches!(result, Err(CoreError::BaselineLocked(_))));
        assert_eq!(registry.count(), 2);
    }
}
