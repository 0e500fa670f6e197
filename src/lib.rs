//! # modhost-core - 模块宿主内核
//!
//! 可插拔 Web 应用宿主的模块解析与请求路由内核：
//!
//! - **模块注册表**: 按数字 id 全序排列，id 越大优先级越高
//! - **floor 覆盖链**: 设置、静态资源、模板和翻译沿 floor 逐级回退
//! - **路由缓存**: 把 (方法, URI) 解析为处理器实例，找不到时回退到 floor 模块
//! - **生命周期**: upgrade / start / stop / uninstall 钩子由可插拔监听器执行
//! - **共享归档清理**: 启动时删除已无模块引用的代码归档
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use modhost_core::{HostConfig, Method, ModuleHost};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HostConfig::from_file("modhost.yaml").await?;
//!     let host = ModuleHost::builder(config).build()?;
//!
//!     let report = host.boot().await?;
//!     if report.restart_required() {
//!         return Ok(());
//!     }
//!
//!     let value = host.dispatch(Method::Get, "/blog/list").await?;
//!     println!("{}", value);
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块记录、注册表、覆盖链、生命周期与归档管理
//! - `router` - 处理器类型、路径映射与路由缓存
//! - `core` - 宿主配置
//! - `utils` - 错误类型、日志与请求 ID
//! - `api` - 宿主接口

#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod core;
pub mod module;
pub mod router;
pub mod utils;

// 重导出常用类型，方便使用
pub use router::{
    FnHandlerType, Handler, HandlerContext, HandlerType, Method, MethodMask, ResolvedHandler,
    RouteCache, RouteDecl,
};

pub use module::{
    CodeLoader, LifeListener, LifecycleDriver, Module, ModuleBuilder, ModuleLoader,
    ModuleRegistry, ModuleState, ModuleSummary, OverrideChain, RenderContext, TemplateRef,
    BASELINE_ID,
};

pub use utils::{error_code, generate_uuid, status_code, CoreError, Result};
pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use core::config::{ConfigProvider, GlobalSettings, HostConfig, HostConfigBuilder, LogConfig, RouterConfig};
pub use api::host::{BootReport, ModuleHost, ModuleHostBuilder};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
