//! 共享代码归档管理
//!
//! 记录共享代码目录中每个归档与引用它的模块之间的关联，并在启动时清理
//! 已无模块引用的归档。清理删除了文件时，宿主需要重启才能生效。

use parking_lot::Mutex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::loader::ModuleLoader;
use super::record::Module;
use crate::utils::Result;

/// 模块内存放待合并归档的子目录
pub const BUNDLED_LIB_DIR: &str = "lib";

/// 归档与模块的关联记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarRecord {
    /// 模块名
    pub module: String,

    /// 归档文件名
    pub archive: String,

    /// 是否处于重置状态（合并进行中，不参与清理）
    #[serde(default)]
    pub reset: bool,
}

/// 归档关联存储
pub trait JarStore: Send + Sync {
    /// 所有未处于重置状态的归档名（去重、有序）
    fn archives(&self) -> Result<Vec<String>>;

    /// 引用某归档的模块名
    fn modules_of(&self, archive: &str) -> Result<Vec<String>>;

    /// 建立或刷新关联（清除重置状态）
    fn update(&self, module: &str, archive: &str) -> Result<()>;

    /// 删除一条关联
    fn remove(&self, module: &str, archive: &str) -> Result<()>;

    /// 删除某归档的所有关联
    fn remove_archive(&self, archive: &str) -> Result<()>;

    /// 把某模块的所有关联标记为重置状态
    fn reset(&self, module: &str) -> Result<()>;

    /// 所有记录
    fn records(&self) -> Result<Vec<JarRecord>>;
}

// ============================================================================
// 内存存储
// ============================================================================

fn archives_of(records: &[JarRecord]) -> Vec<String> {
    let mut names: Vec<String> = records
        .iter()
        .filter(|r| !r.reset)
        .map(|r| r.archive.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn modules_of(records: &[JarRecord], archive: &str) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.archive == archive)
        .map(|r| r.module.clone())
        .collect()
}

fn upsert(records: &mut Vec<JarRecord>, module: &str, archive: &str) {
    match records
        .iter_mut()
        .find(|r| r.module == module && r.archive == archive)
    {
        Some(r) => r.reset = false,
        None => records.push(JarRecord {
            module: module.to_string(),
            archive: archive.to_string(),
            reset: false,
        }),
    }
}

/// 内存中的归档关联存储
#[derive(Debug, Default)]
pub struct MemoryJarStore {
    records: Mutex<Vec<JarRecord>>,
}

impl MemoryJarStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JarStore for MemoryJarStore {
    fn archives(&self) -> Result<Vec<String>> {
        Ok(archives_of(&self.records.lock()))
    }

    fn modules_of(&self, archive: &str) -> Result<Vec<String>> {
        Ok(modules_of(&self.records.lock(), archive))
    }

    fn update(&self, module: &str, archive: &str) -> Result<()> {
        upsert(&mut self.records.lock(), module, archive);
        Ok(())
    }

    fn remove(&self, module: &str, archive: &str) -> Result<()> {
        self.records
            .lock()
            .retain(|r| !(r.module == module && r.archive == archive));
        Ok(())
    }

    fn remove_archive(&self, archive: &str) -> Result<()> {
        self.records.lock().retain(|r| r.archive != archive);
        Ok(())
    }

    fn reset(&self, module: &str) -> Result<()> {
        for r in self.records.lock().iter_mut().filter(|r| r.module == module) {
            r.reset = true;
        }
        Ok(())
    }

    fn records(&self) -> Result<Vec<JarRecord>> {
        Ok(self.records.lock().clone())
    }
}

// ============================================================================
// JSON 文件存储
// ============================================================================

/// 以 JSON 文件持久化的归档关联存储
///
/// 每次修改整体写回文件，写入成功后才更新内存中的记录。
#[derive(Debug)]
pub struct FileJarStore {
    path: PathBuf,
    records: Mutex<Vec<JarRecord>>,
}

impl FileJarStore {
    /// 打开存储文件，不存在时视为空
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), count = records.len(), "加载归档关联记录");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<JarRecord>),
    {
        let mut records = self.records.lock();
        let mut next = records.clone();
        f(&mut next);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&next)?)?;
        *records = next;
        Ok(())
    }
}

impl JarStore for FileJarStore {
    fn archives(&self) -> Result<Vec<String>> {
        Ok(archives_of(&self.records.lock()))
    }

    fn modules_of(&self, archive: &str) -> Result<Vec<String>> {
        Ok(modules_of(&self.records.lock(), archive))
    }

    fn update(&self, module: &str, archive: &str) -> Result<()> {
        self.modify(|records| upsert(records, module, archive))
    }

    fn remove(&self, module: &str, archive: &str) -> Result<()> {
        self.modify(|records| records.retain(|r| !(r.module == module && r.archive == archive)))
    }

    fn remove_archive(&self, archive: &str) -> Result<()> {
        self.modify(|records| records.retain(|r| r.archive != archive))
    }

    fn reset(&self, module: &str) -> Result<()> {
        self.modify(|records| {
            for r in records.iter_mut().filter(|r| r.module == module) {
                r.reset = true;
            }
        })
    }

    fn records(&self) -> Result<Vec<JarRecord>> {
        Ok(self.records.lock().clone())
    }
}

// ============================================================================
// 清理与合并
// ============================================================================

/// 清理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 已删除的归档文件
    pub deleted: Vec<String>,

    /// 被移除关联记录的归档
    pub forgotten: Vec<String>,
}

impl ReconcileReport {
    /// 是否需要重启
    pub fn restart_required(&self) -> bool {
        !self.deleted.is_empty()
    }
}

/// 清理无模块引用的归档
///
/// 一个归档只要有任一关联模块的描述文件仍可加载，就视为仍被使用。
pub async fn reconcile(
    store: &dyn JarStore,
    loader: &ModuleLoader,
    lib_dir: &Path,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for archive in store.archives()? {
        let mut used = false;
        for module in store.modules_of(&archive)? {
            if loader.is_installed(&module).await {
                used = true;
                break;
            }
        }
        if used {
            continue;
        }

        let file = lib_dir.join(&archive);
        if tokio::fs::metadata(&file).await.is_ok() {
            info!(archive = %archive, "没有模块使用该归档，删除");
            tokio::fs::remove_file(&file).await?;
            report.deleted.push(archive.clone());
        }
        store.remove_archive(&archive)?;
        report.forgotten.push(archive);
    }

    if report.restart_required() {
        warn!(deleted = ?report.deleted, "共享代码归档已变更，需要重启");
    }
    Ok(report)
}

/// 把归档文件名拆成基础名和版本
///
/// `blog-core-1.2.0.jar` -> (`blog-core`, `1.2.0`)。没有可识别版本时返回整个主干名。
pub fn split_archive_name(file_name: &str) -> (String, Option<Version>) {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => file_name,
    };

    let mut search = stem;
    while let Some((base, tail)) = search.rsplit_once('-') {
        if let Some(version) = parse_lenient(&stem[base.len() + 1..]) {
            return (base.to_string(), Some(version));
        }
        if tail.is_empty() {
            break;
        }
        search = base;
    }
    (stem.to_string(), None)
}

fn parse_lenient(raw: &str) -> Option<Version> {
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 2 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    let padded = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        _ => format!("{}.{}.0", parts[0], parts[1]),
    };
    Version::parse(&padded).ok()
}

/// 合并模块自带的归档到共享代码目录
///
/// 模块 `lib/` 下的每个文件移动到 `lib_dir`。共享目录中基础名相同但版本不同的
/// 旧归档会被删除，其关联转移到新归档（无关联时归属 `fallback_owner`）。
/// 返回是否删除了旧归档。
pub async fn merge(
    module: &Module,
    store: &dyn JarStore,
    lib_dir: &Path,
    fallback_owner: &str,
) -> Result<bool> {
    store.reset(&module.name)?;

    let source = module.path.join(BUNDLED_LIB_DIR);
    let mut entries = match tokio::fs::read_dir(&source).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(module_name = %module.name, "没有需要合并的归档");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    tokio::fs::create_dir_all(lib_dir).await?;
    let mut changed = false;

    for file in files {
        let name = match file.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        let (base, version) = split_archive_name(&name);

        for existing in list_files(lib_dir).await? {
            if existing == name {
                continue;
            }
            let (other_base, other_version) = split_archive_name(&existing);
            if other_base != base || other_version == version {
                continue;
            }

            let owners = store.modules_of(&existing)?;
            if owners.is_empty() {
                store.update(fallback_owner, &name)?;
            } else {
                for owner in owners {
                    store.update(&owner, &name)?;
                    store.remove(&owner, &existing)?;
                }
            }

            warn!(old = %existing, new = %name, "同名归档版本不同，删除旧版本");
            tokio::fs::remove_file(lib_dir.join(&existing)).await?;
            changed = true;
        }

        let dest = lib_dir.join(&name);
        if tokio::fs::metadata(&dest).await.is_ok() {
            tokio::fs::remove_file(&dest).await?;
        }
        store.update(&module.name, &name)?;
        move_file(&file, &dest).await?;
        debug!(module_name = %module.name, archive = %name, "归档已合并");
    }

    if let Err(e) = tokio::fs::remove_dir(&source).await {
        debug!(path = %source.display(), error = %e, "保留模块归档目录");
    }
    Ok(changed)
}

async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // 跨设备时 rename 失败，退回复制后删除
    tokio::fs::copy(from, to).await.map_err(|e| {
        error!(from = %from.display(), to = %to.display(), error = %e, "移动归档失败");
        e
    })?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}
