//! modhost 命令行入口
//!
//! 模块宿主的命令行工具，提供启动、检查和调试功能。
//!
//! # 命令概览
//!
//! - `start` - 启动宿主
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//! - `list-modules` - 列出模块目录中的模块
//! - `resolve` - 查看某个请求沿覆盖链尝试的处理器类型
//!
//! # 使用示例
//!
//! ```bash
//! # 使用默认配置文件启动
//! modhost start
//!
//! # 使用自定义配置文件启动
//! modhost -c /srv/modhost/modhost.yaml start
//!
//! # 临时指定另一个宿主目录
//! modhost --home /srv/staging list-modules
//!
//! # 查看 GET /blog/list 会尝试哪些处理器类型
//! modhost resolve --method get --uri /blog/list
//! ```
//!
//! 启动时如果删除了共享代码归档，进程以退出码 3 结束，由外部守护进程重启。

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::signal;
use tracing::{info, warn};

use modhost_core::router::handler_type_name;
use modhost_core::{
    HostConfig, Logger, LoggerConfig, Method, ModuleHost, ModuleLoader, ModuleRegistry,
};

/// 需要重启时的退出码
const EXIT_RESTART: u8 = 3;

/// modhost - 模块宿主
///
/// 扫描模块目录，按 id 建立覆盖链，并把请求解析到模块提供的处理器。
#[derive(Parser)]
#[command(name = "modhost")]
#[command(version, about = "可插拔模块宿主", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "modhost.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 宿主根目录，覆盖配置文件
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 启动宿主
    ///
    /// 加载模块并执行生命周期钩子，按 Ctrl+C 关闭。
    Start,

    /// 查看版本信息
    Version,

    /// 验证配置文件
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 列出模块目录中的模块
    ListModules,

    /// 查看请求沿覆盖链尝试的处理器类型
    Resolve {
        /// 请求方法（get / post）
        #[arg(short, long, default_value = "get")]
        method: String,

        /// 请求 URI
        #[arg(short, long)]
        uri: String,
    },
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(path: &Path) -> Result<HostConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(HostConfig::from_file(path).await?)
    } else {
        Ok(HostConfig::default())
    }
}

/// 启动宿主
async fn run_start(config: HostConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let host = ModuleHost::builder(config).build()?;
    let report = host.boot().await?;

    for (folder, reason) in &report.skipped {
        warn!(folder = %folder, reason = %reason, "模块已跳过");
    }
    if report.restart_required() {
        warn!(deleted = ?report.reconcile.deleted, "共享代码归档已删除，退出以便重启");
        return Ok(ExitCode::from(EXIT_RESTART));
    }

    println!();
    println!("模块宿主已启动 v{}", modhost_core::VERSION);
    if let Some(path) = &host.config().config_path {
        println!("  配置文件: {}", path.display());
    }
    println!("  模块目录: {}", host.config().modules_dir().display());
    println!("  已注册:   {}", report.registered);
    println!("  默认语言: {}", report.default_locale);
    println!("  按 Ctrl+C 关闭");
    println!();

    signal::ctrl_c().await?;
    info!("收到关闭信号，正在关闭");

    for module in host.registry().list().iter().rev() {
        host.lifecycle().stop(module).await;
    }
    info!("模块宿主已关闭");
    Ok(ExitCode::SUCCESS)
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    let config = if path.exists() {
        match HostConfig::from_file(path).await {
            Ok(config) => {
                println!("配置文件有效");
                config
            }
            Err(e) => {
                println!("配置文件无效: {}", e);
                return Err(Box::new(e));
            }
        }
    } else {
        println!("配置文件不存在，将使用默认配置");
        HostConfig::default()
    };

    println!();
    println!("────────────────────────────────────────");
    println!("  宿主目录:   {}", config.home.display());
    println!("  模块目录:   {}", config.modules_dir().display());
    println!("  共享归档:   {}", config.lib_dir().display());
    println!("  归档记录:   {}", config.jar_store_path().display());
    println!("  默认语言:   {}", config.language);
    println!("  全局设置:   {} 项", config.settings.len());
    println!("  路由缓存:   {}", if config.router.cache_enabled { "启用" } else { "禁用" });
    println!("  日志级别:   {}", config.logging.level);
    println!("  JSON 日志:  {}", if config.logging.json_format { "是" } else { "否" });
    println!("────────────────────────────────────────");
    Ok(())
}

/// 只读地建立注册表（不执行钩子、不清理归档）
async fn read_registry(
    loader: &ModuleLoader,
) -> Result<(ModuleRegistry, Vec<(String, String)>), Box<dyn std::error::Error>> {
    let registry = ModuleRegistry::new();
    let mut problems = Vec::new();

    for folder in loader.scan().await? {
        match loader.load(&folder).await {
            Ok(m) if m.enabled() => {
                if let Err(e) = registry.register(m) {
                    problems.push((folder, e.to_string()));
                }
            }
            Ok(_) => {}
            Err(e) => problems.push((folder, e.to_string())),
        }
    }
    Ok((registry, problems))
}

/// 列出模块
async fn list_modules(config: &HostConfig) -> Result<(), Box<dyn std::error::Error>> {
    let loader = ModuleLoader::new(config.modules_dir());
    let (registry, problems) = read_registry(&loader).await?;

    println!();
    println!("已启用模块（按 id 升序）");
    println!("═══════════════════════════════════════");
    for m in registry.list() {
        println!(
            "  {:>5}  {:<20} {}",
            m.id,
            m.name,
            m.version.as_deref().unwrap_or("-")
        );
    }

    let disabled = loader.list_disabled().await?;
    if !disabled.is_empty() {
        println!();
        println!("未启用模块");
        println!("───────────────────────────────────────");
        for m in disabled {
            println!("  {:>5}  {}", m.id, m.name);
        }
    }

    if !problems.is_empty() {
        println!();
        println!("被跳过的模块");
        println!("───────────────────────────────────────");
        for (folder, reason) in problems {
            println!("  {}: {}", folder, reason);
        }
    }
    println!();
    Ok(())
}

/// 显示请求沿覆盖链尝试的处理器类型
async fn resolve(
    config: &HostConfig,
    method: &str,
    uri: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let method = Method::parse(method).ok_or_else(|| format!("无法识别的请求方法: {}", method))?;
    let loader = ModuleLoader::new(config.modules_dir());
    let (registry, _) = read_registry(&loader).await?;

    println!();
    println!("{} {}", method, uri);
    println!("═══════════════════════════════════════");

    let mut current = registry.home();
    while let Some(module) = current {
        match module.package.as_deref() {
            Some(package) => println!(
                "  {:>5}  {:<20} {}",
                module.id,
                module.name,
                handler_type_name(package, uri)
            ),
            None => println!("  {:>5}  {:<20} (未声明 package)", module.id, module.name),
        }
        current = registry.floor(module.id);
    }
    println!();
    Ok(())
}

/// 打印版本信息
fn print_version() {
    println!("modhost {}", modhost_core::VERSION);
    println!("  目标平台: {}", std::env::consts::ARCH);
    println!("  操作系统: {}", std::env::consts::OS);
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let command = match cli.command.unwrap_or(Commands::Start) {
        Commands::Version => {
            print_version();
            return Ok(ExitCode::SUCCESS);
        }
        Commands::CheckConfig { config } => {
            check_config(&config.unwrap_or(cli.config)).await?;
            return Ok(ExitCode::SUCCESS);
        }
        other => other,
    };

    let mut config = load_config(&cli.config).await?;
    if let Some(home) = cli.home {
        let home = std::env::current_dir()?.join(home);
        config.merge(HostConfig::builder().home(home).build());
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    let _log_guard = Logger::try_init(LoggerConfig::from_log_config(&config.logging));

    match command {
        Commands::ListModules => list_modules(&config).await?,
        Commands::Resolve { method, uri } => resolve(&config, &method, &uri).await?,
        _ => return run_start(config).await,
    }
    Ok(ExitCode::SUCCESS)
}
