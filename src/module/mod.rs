//! 模块管理
//!
//! 包含模块系统的核心组件：
//! - 模块记录与描述文件加载
//! - 按 id 排序的模块注册表与 floor 覆盖链
//! - 代码加载上下文
//! - 生命周期驱动
//! - 共享代码归档清理

pub mod cascade;
pub mod code_loader;
pub mod jars;
pub mod lifecycle;
pub mod loader;
pub mod record;
pub mod registry;

// 重导出常用类型
pub use cascade::{OverrideChain, RenderContext, ResourceRef, TemplateRef};
pub use code_loader::CodeLoader;
pub use jars::{FileJarStore, JarRecord, JarStore, MemoryJarStore, ReconcileReport};
pub use lifecycle::{Hook, LifeListener, LifecycleDriver};
pub use loader::ModuleLoader;
pub use record::{Module, ModuleBuilder, ModuleState, ModuleSummary, BASELINE_ID};
pub use registry::ModuleRegistry;
