//! API 模块
//!
//! 对外提供的宿主接口。
//!
//! # 模块概览
//!
//! - `host`: ModuleHost 主接口，负责启动、路由和模块管理
//!
//! # 示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use modhost_core::{CodeLoader, FnHandlerType, HostConfig, Method, ModuleHost};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let code = Arc::new(CodeLoader::new());
//!     code.register_builtin(vec![Arc::new(
//!         FnHandlerType::new("org.base.index")
//!             .action("on_get", |_| Ok(serde_json::json!("hello"))),
//!     )]);
//!
//!     let host = ModuleHost::builder(HostConfig::default())
//!         .code_loader(code)
//!         .build()?;
//!     host.boot().await?;
//!
//!     let value = host.dispatch(Method::Get, "/index").await?;
//!     println!("{}", value);
//!     Ok(())
//! }
//! ```

pub mod host;

// 重导出主要类型
pub use host::{BootReport, HostStatus, ModuleHost, ModuleHostBuilder};
