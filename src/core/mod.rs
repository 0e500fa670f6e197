//! 核心模块
//!
//! 包含宿主配置与全局默认配置提供者。

pub mod config;

pub use config::{
    ConfigProvider, GlobalSettings, HostConfig, HostConfigBuilder, LogConfig, RouterConfig,
};
