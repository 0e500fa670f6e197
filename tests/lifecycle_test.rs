//! # 生命周期集成测试
//!
//! - 非基础模块先执行基础模块监听器的 upgrade
//! - upgrade 失败时 start 仍然执行
//! - 启用/禁用立即写回描述文件
//! - 禁用不会重新执行基础模块的 upgrade

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use modhost_core::module::MemoryJarStore;
use modhost_core::{
    CodeLoader, CoreError, HostConfig, LifeListener, Module, ModuleHost, ModuleState, Result,
};
use tempfile::TempDir;

// ============================================================================
// 测试辅助结构
// ============================================================================

/// 记录钩子调用顺序的监听器
struct Recorder {
    tag: &'static str,
    calls: Arc<Mutex<Vec<String>>>,
    fail_upgrade: bool,
}

impl Recorder {
    fn new(tag: &'static str, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            tag,
            calls,
            fail_upgrade: false,
        }
    }

    fn failing(tag: &'static str, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            tag,
            calls,
            fail_upgrade: true,
        }
    }

    fn record(&self, hook: &str, module: &Module) {
        self.calls
            .lock()
            .push(format!("{}:{}:{}", self.tag, hook, module.name));
    }
}

#[async_trait]
impl LifeListener for Recorder {
    async fn upgrade(&self, _config: &HostConfig, module: &Module) -> Result<()> {
        self.record("upgrade", module);
        if self.fail_upgrade {
            return Err(CoreError::Internal("安装脚本执行失败".to_string()));
        }
        Ok(())
    }

    async fn start(&self, _config: &HostConfig, module: &Module) -> Result<()> {
        self.record("start", module);
        Ok(())
    }

    async fn stop(&self, _config: &HostConfig, module: &Module) -> Result<()> {
        self.record("stop", module);
        Ok(())
    }

    async fn uninstall(&self, _config: &HostConfig, module: &Module) -> Result<()> {
        self.record("uninstall", module);
        Ok(())
    }
}

fn write_module(home: &Path, name: &str, descriptor: &str) {
    let dir = home.join("modules").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("module.ini"), format!("name={}\n{}", name, descriptor)).unwrap();
}

fn build_host(home: &Path, calls: &Arc<Mutex<Vec<String>>>, blog_fails: bool) -> ModuleHost {
    let blog: Arc<dyn LifeListener> = if blog_fails {
        Arc::new(Recorder::failing("blog", calls.clone()))
    } else {
        Arc::new(Recorder::new("blog", calls.clone()))
    };

    ModuleHost::builder(HostConfig::builder().home(home).build())
        .code_loader(Arc::new(CodeLoader::new()))
        .jar_store(Arc::new(MemoryJarStore::new()))
        .listener("base.listener", Arc::new(Recorder::new("base", calls.clone())))
        .listener("blog.listener", blog)
        .build()
        .unwrap()
}

fn fixture(home: &Path) {
    write_module(home, "default", "id=0\nenabled=true\nlifelistener=base.listener\n");
    write_module(home, "blog", "id=3\nenabled=true\nlifelistener=blog.listener\n");
}

// ============================================================================
// 启动顺序
// ============================================================================

#[tokio::test]
async fn test_baseline_upgrade_runs_first() {
    let temp = TempDir::new().unwrap();
    fixture(temp.path());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, false);
    let report = host.boot().await.unwrap();

    assert!(report.faults.is_empty());
    assert_eq!(
        *calls.lock(),
        vec![
            "base:upgrade:default",
            "base:start:default",
            "base:upgrade:blog",
            "blog:upgrade:blog",
            "blog:start:blog",
        ]
    );
    assert_eq!(host.lifecycle().state(3).await, ModuleState::Running);
}

#[tokio::test]
async fn test_start_runs_after_failed_upgrade() {
    let temp = TempDir::new().unwrap();
    fixture(temp.path());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, true);
    let report = host.boot().await.unwrap();

    assert_eq!(report.faults.len(), 1);
    assert!(matches!(
        &report.faults[0],
        CoreError::LifecycleHookFault { hook: "upgrade", .. }
    ));

    let calls = calls.lock();
    let upgrade = calls.iter().position(|c| c == "blog:upgrade:blog").unwrap();
    let start = calls.iter().position(|c| c == "blog:start:blog").unwrap();
    assert!(upgrade < start);
}

#[tokio::test]
async fn test_missing_listener_is_fault() {
    let temp = TempDir::new().unwrap();
    write_module(temp.path(), "wiki", "id=4\nenabled=true\nlifelistener=wiki.listener\n");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, false);
    let report = host.boot().await.unwrap();

    assert_eq!(report.registered, 1);
    assert!(report
        .faults
        .iter()
        .all(|f| matches!(f, CoreError::ListenerNotRegistered(_))));
    assert_eq!(host.lifecycle().state(4).await, ModuleState::Running);
}

// ============================================================================
// 启用与禁用
// ============================================================================

#[tokio::test]
async fn test_disable_runs_stop_and_uninstall() {
    let temp = TempDir::new().unwrap();
    fixture(temp.path());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, false);
    host.boot().await.unwrap();
    calls.lock().clear();

    host.set_enabled("blog", false).await.unwrap();

    assert_eq!(*calls.lock(), vec!["blog:stop:blog", "blog:uninstall:blog"]);
    assert_eq!(host.lifecycle().state(3).await, ModuleState::Uninstalled);
    assert!(host.registry().get(3).is_none());

    let stored = host.loader().load("blog").await.unwrap();
    assert!(!stored.enabled());
}

#[tokio::test]
async fn test_enable_persists_even_when_hook_fails() {
    let temp = TempDir::new().unwrap();
    write_module(temp.path(), "default", "id=0\nenabled=true\nlifelistener=base.listener\n");
    write_module(temp.path(), "blog", "id=3\nenabled=false\nlifelistener=blog.listener\n");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, true);
    host.boot().await.unwrap();
    calls.lock().clear();

    let faults = host.set_enabled("blog", true).await.unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(
        *calls.lock(),
        vec!["base:upgrade:blog", "blog:upgrade:blog", "blog:start:blog"]
    );

    let stored = host.loader().load("blog").await.unwrap();
    assert!(stored.enabled());
    assert_eq!(host.registry().home().unwrap().name, "blog");
}

#[tokio::test]
async fn test_baseline_cannot_be_disabled() {
    let temp = TempDir::new().unwrap();
    fixture(temp.path());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, false);
    host.boot().await.unwrap();

    let err = host.set_enabled("default", false).await.unwrap_err();
    assert!(matches!(err, CoreError::BaselineLocked(_)));
    assert!(host.registry().baseline().is_some());
    assert!(host.loader().load("default").await.unwrap().enabled());
}

// ============================================================================
// 同 id 的未启用模块
// ============================================================================

fn shared_id_fixture(home: &Path) {
    write_module(home, "default", "id=0\nenabled=true\nlifelistener=base.listener\n");
    write_module(home, "blog", "id=4\nenabled=true\nlifelistener=blog.listener\n");
    write_module(home, "shop", "id=4\nenabled=false\nlifelistener=blog.listener\n");
}

#[tokio::test]
async fn test_disable_unregistered_module_keeps_same_id_module() {
    let temp = TempDir::new().unwrap();
    shared_id_fixture(temp.path());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, false);
    host.boot().await.unwrap();
    calls.lock().clear();

    let faults = host.set_enabled("shop", false).await.unwrap();
    assert!(faults.is_empty());
    assert!(calls.lock().is_empty());

    assert_eq!(host.registry().get(4).unwrap().name, "blog");
    assert_eq!(host.registry().home().unwrap().name, "blog");
    assert_eq!(host.lifecycle().state(4).await, ModuleState::Running);
    assert!(host.loader().load("blog").await.unwrap().enabled());
    assert!(!host.loader().load("shop").await.unwrap().enabled());
}

#[tokio::test]
async fn test_delete_unregistered_module_keeps_same_id_module() {
    let temp = TempDir::new().unwrap();
    shared_id_fixture(temp.path());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, false);
    host.boot().await.unwrap();
    calls.lock().clear();

    host.delete("shop").await.unwrap();

    assert!(calls.lock().is_empty());
    assert!(!temp.path().join("modules/shop").exists());
    assert_eq!(host.registry().home().unwrap().name, "blog");
    assert_eq!(host.lifecycle().state(4).await, ModuleState::Running);
}

#[tokio::test]
async fn test_enable_running_module_is_noop() {
    let temp = TempDir::new().unwrap();
    fixture(temp.path());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = build_host(temp.path(), &calls, false);
    host.boot().await.unwrap();
    calls.lock().clear();

    let faults = host.set_enabled("blog", true).await.unwrap();
    assert!(faults.is_empty());
    assert!(calls.lock().is_empty());
    assert_eq!(host.lifecycle().state(3).await, ModuleState::Running);
}
