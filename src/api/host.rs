//! 模块宿主
//!
//! 宿主的主要对外接口，把各子系统组合在一起：
//!
//! - 启动：扫描模块目录、注册、按 id 升序执行生命周期、清理共享归档
//! - 路由：从 home 模块开始解析 (方法, URI) 到处理器实例
//! - 模块管理：启用、禁用、删除、合并归档
//!
//! # 示例
//!
//! ```rust,no_run
//! use modhost_core::{HostConfig, Method, ModuleHost};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HostConfig::builder().home("/srv/modhost").build();
//!     let host = ModuleHost::builder(config).build()?;
//!
//!     let report = host.boot().await?;
//!     println!("已注册 {} 个模块", report.registered);
//!
//!     if let Some(handler) = host.route(Method::Get, "/blog/list") {
//!         let value = handler.dispatch().await?;
//!         println!("{}", value);
//!     }
//!     Ok(())
//! }
//! ```

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::core::config::{ConfigProvider, HostConfig};
use crate::module::jars::{self, FileJarStore, JarStore, ReconcileReport};
use crate::module::{
    CodeLoader, LifeListener, LifecycleDriver, Module, ModuleLoader, ModuleRegistry,
    ModuleSummary, OverrideChain,
};
use crate::router::{
    AccessRegistry, AccessTags, Method, ResolveEnv, ResolvedHandler, RouteCache, RouteCacheStats,
};
use crate::utils::{CoreError, Result};

/// 合并归档时没有基础模块可作归属方时使用的模块名
const FALLBACK_JAR_OWNER: &str = "default";

// ============================================================================
// 启动结果
// ============================================================================

/// 启动结果
#[derive(Debug, Default)]
pub struct BootReport {
    /// 注册成功的模块数量
    pub registered: usize,

    /// 被跳过的模块目录及原因
    pub skipped: Vec<(String, String)>,

    /// 已安装但未启用的模块目录
    pub disabled: Vec<String>,

    /// 生命周期钩子故障
    pub faults: Vec<CoreError>,

    /// 默认语言
    pub default_locale: String,

    /// 共享归档清理结果
    pub reconcile: ReconcileReport,
}

impl BootReport {
    /// 是否需要重启
    pub fn restart_required(&self) -> bool {
        self.reconcile.restart_required()
    }
}

/// 宿主状态快照
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    /// 已注册模块
    pub modules: Vec<ModuleSummary>,

    /// home 模块 id
    pub home: Option<i32>,

    /// 默认语言
    pub default_locale: String,

    /// 可见处理器类型数量
    pub handlers: usize,

    /// 路由缓存统计
    pub routes: RouteCacheStats,

    /// 已登记的访问标签
    pub access_tags: Vec<String>,
}

// ============================================================================
// ModuleHost
// ============================================================================

/// 模块宿主
///
/// 注册表、生命周期驱动和路由缓存都归宿主所有，一个进程可以同时存在多个宿主。
pub struct ModuleHost {
    config: Arc<HostConfig>,
    registry: Arc<ModuleRegistry>,
    loader: ModuleLoader,
    code_loader: Arc<CodeLoader>,
    lifecycle: LifecycleDriver,
    routes: RouteCache,
    access: Arc<dyn AccessRegistry>,
    jars: Arc<dyn JarStore>,
    chain: OverrideChain,
    default_locale: RwLock<String>,
}

impl ModuleHost {
    /// 创建宿主构建器
    pub fn builder(config: HostConfig) -> ModuleHostBuilder {
        ModuleHostBuilder::new(config)
    }

    // ==================== 启动 ====================

    /// 启动宿主
    ///
    /// 1. 清空注册表、路由缓存和生命周期状态
    /// 2. 扫描模块目录，加载并注册已启用的模块（无效描述、重复 id 或名称的模块被跳过）
    /// 3. 按 id 升序加载模块代码归档并执行 `upgrade` + `start`
    /// 4. 沿 home -> floor 解析默认语言
    /// 5. 清理无模块引用的共享归档
    ///
    /// # Errors
    ///
    /// 模块目录或共享归档目录读写失败时返回错误；单个模块的问题只记录在报告中。
    #[instrument(skip(self), fields(home = %self.config.home.display()))]
    pub async fn boot(&self) -> Result<BootReport> {
        info!("启动模块宿主 v{}", crate::VERSION);

        self.registry.clean();
        self.routes.reset();
        self.lifecycle.clear().await;

        let mut report = BootReport::default();

        for folder in self.loader.scan().await? {
            let module = match self.loader.load(&folder).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(folder = %folder, error = %e, "模块描述文件无效，跳过");
                    report.skipped.push((folder, e.to_string()));
                    continue;
                }
            };

            if !module.enabled() {
                debug!(module_id = %module.id, module_name = %module.name, "模块未启用");
                report.disabled.push(folder);
                continue;
            }

            match self.registry.register(module) {
                Ok(m) => self.lifecycle.mark_loaded(&m).await,
                Err(e) => {
                    warn!(folder = %folder, error = %e, "模块注册失败，跳过");
                    report.skipped.push((folder, e.to_string()));
                }
            }
        }

        for module in self.registry.list() {
            if let Err(e) = self.code_loader.init_models(&module).await {
                warn!(module_id = %module.id, error = %e, "加载模块代码归档失败");
            }
            report
                .faults
                .extend(self.lifecycle.boot(&module, &self.registry).await);
        }

        report.registered = self.registry.count();
        report.default_locale = self.chain.default_locale();
        *self.default_locale.write() = report.default_locale.clone();

        report.reconcile =
            jars::reconcile(self.jars.as_ref(), &self.loader, &self.config.lib_dir()).await?;

        info!(
            registered = report.registered,
            skipped = report.skipped.len(),
            faults = report.faults.len(),
            default_locale = %report.default_locale,
            restart_required = report.restart_required(),
            "模块宿主启动完成"
        );
        Ok(report)
    }

    // ==================== 路由 ====================

    fn env(&self) -> ResolveEnv<'_> {
        ResolveEnv {
            registry: &self.registry,
            code_loader: &self.code_loader,
            access: self.access.as_ref(),
        }
    }

    /// 从 home 模块开始解析处理器
    ///
    /// 完整 uri 找不到时逐段截短重试。没有任何模块提供处理器时返回 `None`。
    #[instrument(skip(self))]
    pub fn route(&self, method: Method, uri: &str) -> Option<ResolvedHandler> {
        let home = self.registry.home()?;
        self.routes.route(self.env(), &home, method, uri)
    }

    /// 从指定模块开始解析处理器（不截短 uri）
    pub fn lookup(&self, start: &Arc<Module>, method: Method, uri: &str) -> Option<ResolvedHandler> {
        self.routes.lookup(self.env(), start, method, uri)
    }

    /// 只查路由缓存
    pub fn lookup_cached(&self, method: Method, uri: &str) -> Option<ResolvedHandler> {
        self.routes.lookup_cached(method, uri)
    }

    /// 解析并分发请求
    ///
    /// # Errors
    ///
    /// - 没有处理器时返回 `RouteNotFound`
    /// - 处理方法返回的错误
    pub async fn dispatch(&self, method: Method, uri: &str) -> Result<serde_json::Value> {
        let handler = self
            .route(method, uri)
            .ok_or_else(|| CoreError::RouteNotFound {
                method: method.to_string(),
                uri: uri.to_string(),
            })?;
        handler.dispatch().await
    }

    // ==================== 模块管理 ====================

    async fn find_module(&self, name: &str) -> Result<Arc<Module>> {
        if let Some(m) = self.registry.by_name(name) {
            return Ok(m);
        }
        match self.loader.load(name).await {
            Ok(m) => Ok(Arc::new(m)),
            Err(CoreError::Io(_)) => Err(CoreError::ModuleNotFound(name.to_string())),
            Err(e) => Err(e),
        }
    }

    /// 启用或禁用模块
    ///
    /// 启用标志立即写回描述文件；路由缓存随之清空。返回钩子故障。
    ///
    /// # Errors
    ///
    /// - 模块不存在返回 `ModuleNotFound`
    /// - 禁用基础模块返回 `BaselineLocked`
    /// - 启用时与已注册模块冲突
    #[instrument(skip(self))]
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<Vec<CoreError>> {
        let module = self.find_module(name).await?;

        if enabled {
            if let Err(e) = self.code_loader.init_models(&module).await {
                warn!(module_id = %module.id, error = %e, "加载模块代码归档失败");
            }
        }

        let faults = self
            .lifecycle
            .set_enabled(module, enabled, &self.registry, &self.loader)
            .await?;
        self.routes.reset();
        Ok(faults)
    }

    /// 删除模块：移出注册表并删除模块目录
    ///
    /// # Errors
    ///
    /// - 模块不存在返回 `ModuleNotFound`
    /// - 基础模块返回 `BaselineLocked`
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        let module = self.find_module(name).await?;
        if module.is_baseline() {
            return Err(CoreError::BaselineLocked(module.name.clone()));
        }

        if let Some(removed) = self.registry.remove_if(module.id, &module.name) {
            self.lifecycle.stop(&removed).await;
            self.lifecycle.uninstall(&removed).await;
        }
        self.loader.delete(&module).await?;
        self.routes.reset();
        Ok(())
    }

    /// 把模块自带的归档合并到共享代码目录，返回是否替换了旧版本
    pub async fn merge(&self, name: &str) -> Result<bool> {
        let module = self.find_module(name).await?;
        let owner = self
            .registry
            .baseline()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| FALLBACK_JAR_OWNER.to_string());
        jars::merge(&module, self.jars.as_ref(), &self.config.lib_dir(), &owner).await
    }

    /// 注册生命周期监听器
    pub async fn register_listener(&self, name: impl Into<String>, listener: Arc<dyn LifeListener>) {
        self.lifecycle.register_listener(name, listener).await;
    }

    /// 已注册的模块摘要（按 id 升序）
    pub fn list_modules(&self) -> Vec<ModuleSummary> {
        self.registry.list().iter().map(|m| ModuleSummary::from(m.as_ref())).collect()
    }

    /// 已安装但未启用的模块
    pub async fn list_disabled(&self) -> Result<Vec<ModuleSummary>> {
        Ok(self
            .loader
            .list_disabled()
            .await?
            .iter()
            .map(ModuleSummary::from)
            .collect())
    }

    /// 状态快照
    pub fn status(&self) -> HostStatus {
        HostStatus {
            modules: self.list_modules(),
            home: self.registry.home().map(|m| m.id),
            default_locale: self.default_locale(),
            handlers: self.code_loader.handler_count(),
            routes: self.routes.stats(),
            access_tags: self.access.tags(),
        }
    }

    // ==================== 访问器 ====================

    /// 宿主配置
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// 模块注册表
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// 模块描述文件加载器
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// 代码加载上下文
    pub fn code_loader(&self) -> &Arc<CodeLoader> {
        &self.code_loader
    }

    /// 生命周期驱动
    pub fn lifecycle(&self) -> &LifecycleDriver {
        &self.lifecycle
    }

    /// 路由缓存
    pub fn routes(&self) -> &RouteCache {
        &self.routes
    }

    /// 访问标签集合
    pub fn access(&self) -> &Arc<dyn AccessRegistry> {
        &self.access
    }

    /// 覆盖链
    pub fn chain(&self) -> &OverrideChain {
        &self.chain
    }

    /// 启动时解析出的默认语言
    pub fn default_locale(&self) -> String {
        self.default_locale.read().clone()
    }
}

impl std::fmt::Debug for ModuleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHost")
            .field("home", &self.config.home)
            .field("modules", &self.registry.count())
            .field("routes", &self.routes)
            .finish()
    }
}

// ============================================================================
// ModuleHostBuilder
// ============================================================================

/// 宿主构建器
pub struct ModuleHostBuilder {
    config: HostConfig,
    code_loader: Option<Arc<CodeLoader>>,
    access: Option<Arc<dyn AccessRegistry>>,
    jars: Option<Arc<dyn JarStore>>,
    defaults: Option<Arc<dyn ConfigProvider>>,
    listeners: Vec<(String, Arc<dyn LifeListener>)>,
}

impl ModuleHostBuilder {
    /// 创建构建器
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            code_loader: None,
            access: None,
            jars: None,
            defaults: None,
            listeners: Vec::new(),
        }
    }

    /// 使用已注册处理器类型的代码加载上下文
    pub fn code_loader(mut self, loader: Arc<CodeLoader>) -> Self {
        self.code_loader = Some(loader);
        self
    }

    /// 访问标签集合
    pub fn access(mut self, access: Arc<dyn AccessRegistry>) -> Self {
        self.access = Some(access);
        self
    }

    /// 归档关联存储，默认是 `<home>/jars.json`
    pub fn jar_store(mut self, store: Arc<dyn JarStore>) -> Self {
        self.jars = Some(store);
        self
    }

    /// 全局默认配置，默认取自宿主配置的 `settings`
    pub fn defaults(mut self, defaults: Arc<dyn ConfigProvider>) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// 注册生命周期监听器
    pub fn listener(mut self, name: impl Into<String>, listener: Arc<dyn LifeListener>) -> Self {
        self.listeners.push((name.into(), listener));
        self
    }

    /// 构建宿主
    ///
    /// # Errors
    ///
    /// - 配置无效
    /// - 默认的归档关联文件无法读取
    pub fn build(self) -> Result<ModuleHost> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let jars: Arc<dyn JarStore> = match self.jars {
            Some(store) => store,
            None => Arc::new(FileJarStore::open(config.jar_store_path())?),
        };
        let defaults: Arc<dyn ConfigProvider> = match self.defaults {
            Some(d) => d,
            None => Arc::new(config.global_settings()),
        };

        let registry = Arc::new(ModuleRegistry::new());
        let lifecycle = LifecycleDriver::with_listeners(config.clone(), self.listeners);

        Ok(ModuleHost {
            loader: ModuleLoader::new(config.modules_dir()),
            code_loader: self.code_loader.unwrap_or_default(),
            access: self
                .access
                .unwrap_or_else(|| Arc::new(AccessTags::new())),
            routes: RouteCache::new(config.router.cache_enabled),
            chain: OverrideChain::new(registry.clone(), defaults),
            default_locale: RwLock::new(config.language.clone()),
            lifecycle,
            jars,
            registry,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::MemoryJarStore;
    use crate::router::FnHandlerType;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_module(root: &Path, name: &str, body: &str) {
        let dir = root.join("modules").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("module.ini"), format!("name={}\n{}", name, body)).unwrap();
    }

    fn host(temp: &TempDir, loader: CodeLoader) -> ModuleHost {
        let config = HostConfig::builder().home(temp.path()).build();
        ModuleHost::builder(config)
            .code_loader(Arc::new(loader))
            .jar_store(Arc::new(MemoryJarStore::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_boot_and_route() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "default", "id=0\nenabled=true\npackage=org.base\n");
        write_module(temp.path(), "blog", "id=3\nenabled=true\npackage=org.blog\n");
        write_module(temp.path(), "shop", "id=5\nenabled=false\npackage=org.shop\n");

        let loader = CodeLoader::new();
        loader.register_builtin(vec![Arc::new(
            FnHandlerType::new("org.base.index").action("on_get", |ctx| {
                Ok(serde_json::json!({ "module": ctx.module.name }))
            }),
        )]);

        let host = host(&temp, loader);
        let report = host.boot().await.unwrap();
        assert_eq!(report.registered, 2);
        assert_eq!(report.disabled, vec!["shop".to_string()]);
        assert!(!report.restart_required());

        let value = host.dispatch(Method::Get, "/index").await.unwrap();
        assert_eq!(value["module"], "default");

        let err = host.dispatch(Method::Get, "/missing").await.unwrap_err();
        assert!(matches!(err, CoreError::RouteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_enable_disable_resets_routes() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "default", "id=0\nenabled=true\npackage=org.base\n");
        write_module(temp.path(), "blog", "id=3\nenabled=false\npackage=org.blog\n");

        let loader = CodeLoader::new();
        loader.register_builtin(vec![
            Arc::new(FnHandlerType::new("org.base.index")),
            Arc::new(FnHandlerType::new("org.blog.index")),
        ]);

        let host = host(&temp, loader);
        host.boot().await.unwrap();
        assert_eq!(host.route(Method::Get, "/index").unwrap().module.id, 0);

        host.set_enabled("blog", true).await.unwrap();
        assert!(host.routes().is_empty());
        assert_eq!(host.route(Method::Get, "/index").unwrap().module.id, 3);

        host.set_enabled("blog", false).await.unwrap();
        assert_eq!(host.route(Method::Get, "/index").unwrap().module.id, 0);
        assert_eq!(host.list_disabled().await.unwrap().len(), 1);

        let err = host.set_enabled("default", false).await.unwrap_err();
        assert!(matches!(err, CoreError::BaselineLocked(_)));

        let err = host.set_enabled("nothing", true).await.unwrap_err();
        assert!(matches!(err, CoreError::ModuleNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "default", "id=0\nenabled=true\n");
        write_module(temp.path(), "blog", "id=3\nenabled=true\n");

        let host = host(&temp, CodeLoader::new());
        host.boot().await.unwrap();

        host.delete("blog").await.unwrap();
        assert!(host.registry().by_name("blog").is_none());
        assert!(!temp.path().join("modules/blog").exists());

        assert!(matches!(
            host.delete("default").await,
            Err(CoreError::BaselineLocked(_))
        ));
    }
}
