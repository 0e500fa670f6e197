//! 基本使用示例
//!
//! 本示例展示了模块宿主的基本使用方法，包括：
//!
//! - 在临时目录中准备两个模块
//! - 注册处理器类型与生命周期监听器
//! - 启动宿主并分发请求
//! - 沿覆盖链查找设置项与模板
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use modhost_core::module::MemoryJarStore;
use modhost_core::{
    CodeLoader, FnHandlerType, HostConfig, LifeListener, Logger, LoggerConfig, Method, Module,
    ModuleHost, RenderContext, Result, RouteDecl,
};
use serde_json::json;

/// 打印钩子调用的监听器
struct PrintListener;

#[async_trait]
impl LifeListener for PrintListener {
    async fn upgrade(&self, _config: &HostConfig, module: &Module) -> Result<()> {
        println!("   [hook] upgrade {}", module);
        Ok(())
    }

    async fn start(&self, _config: &HostConfig, module: &Module) -> Result<()> {
        println!("   [hook] start {}", module);
        Ok(())
    }
}

fn write(path: std::path::PathBuf, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let _guard = Logger::try_init(LoggerConfig::builder().level("warn").build());

    println!("=== 模块宿主基本使用示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 准备模块目录
    // -------------------------------------------------------------------------
    println!("1. 准备模块目录...");
    let home = tempfile::TempDir::new()?;
    let modules = home.path().join("modules");

    write(
        modules.join("default/module.ini"),
        "name=default\nid=0\nenabled=true\npackage=org.base\nlifelistener=print\nsetting.site.title=示例站点\n",
    )?;
    write(modules.join("default/view/layout.html"), "<html></html>")?;
    write(
        modules.join("blog/module.ini"),
        "name=blog\nid=3\nenabled=true\npackage=org.blog\nlifelistener=print\n",
    )?;
    println!("   模块目录: {}\n", modules.display());

    // -------------------------------------------------------------------------
    // 2. 注册处理器类型
    // -------------------------------------------------------------------------
    println!("2. 注册处理器类型...");
    let code = Arc::new(CodeLoader::new());
    code.register_builtin(vec![
        Arc::new(
            FnHandlerType::new("org.base.index")
                .action("on_get", |ctx| Ok(json!({ "page": "index", "module": ctx.module.name }))),
        ),
        Arc::new(
            FnHandlerType::new("org.blog.post")
                .route(RouteDecl::get("list", "list"))
                .route(RouteDecl::get("(\\d+)", "show").access("access.blog.read"))
                .action("list", |_| Ok(json!(["hello", "world"])))
                .action("show", |ctx| Ok(json!({ "post": ctx.captures[0] }))),
        ),
    ]);
    println!("   可见处理器类型: {}\n", code.handler_count());

    // -------------------------------------------------------------------------
    // 3. 启动宿主
    // -------------------------------------------------------------------------
    println!("3. 启动宿主...");
    let config = HostConfig::builder().home(home.path()).build();
    let host = ModuleHost::builder(config)
        .code_loader(code)
        .jar_store(Arc::new(MemoryJarStore::new()))
        .listener("print", Arc::new(PrintListener))
        .build()?;

    let report = host.boot().await?;
    println!("   已注册模块: {}", report.registered);
    println!("   默认语言:   {}\n", report.default_locale);

    // -------------------------------------------------------------------------
    // 4. 分发请求
    // -------------------------------------------------------------------------
    println!("4. 分发请求...");
    for uri in ["/index", "/post/list", "/post/42"] {
        let value = host.dispatch(Method::Get, uri).await?;
        println!("   GET {:<12} -> {}", uri, value);
    }
    match host.dispatch(Method::Get, "/missing").await {
        Ok(v) => println!("   GET /missing    -> {}", v),
        Err(e) => println!("   GET /missing    -> {} ({})", e.error_code(), e),
    }
    println!();

    // -------------------------------------------------------------------------
    // 5. 覆盖链
    // -------------------------------------------------------------------------
    println!("5. 覆盖链查找...");
    let blog = host.registry().by_name("blog").ok_or("blog 未注册")?;
    let title = host.chain().setting(&blog, "site.title", None);
    println!("   blog 的 site.title: {:?}", title);

    let mut ctx = RenderContext::new(blog.clone());
    let template = host.chain().template(&mut ctx, "layout.html", true);
    println!("   layout.html 来自模块: {}", ctx.current);
    println!("   模板: {:?}\n", template.and_then(|t| t.path().map(|p| p.display().to_string())));

    // -------------------------------------------------------------------------
    // 6. 状态
    // -------------------------------------------------------------------------
    println!("6. 宿主状态...");
    println!("{}", serde_json::to_string_pretty(&host.status())?);

    println!("\n=== 示例完成 ===");
    Ok(())
}
