//! 模块注册表
//!
//! 按 id 有序保存所有已启用模块。读操作直接加载不可变快照，
//! 写操作在互斥锁内构造新快照后整体发布。

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::record::{Module, BASELINE_ID};
use crate::utils::{CoreError, Result};

/// 注册表快照：id -> 模块
pub type RegistrySnapshot = BTreeMap<i32, Arc<Module>>;

/// 模块注册表
///
/// 维护以下约束：
/// - 同一 id 至多一个已启用模块
/// - 已启用模块的名称唯一
/// - 模块名称等于其目录名
#[derive(Debug)]
pub struct ModuleRegistry {
    modules: ArcSwap<RegistrySnapshot>,
    writer: Mutex<()>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            modules: ArcSwap::from_pointee(BTreeMap::new()),
            writer: Mutex::new(()),
        }
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.modules.load_full()
    }

    /// 注册模块
    ///
    /// # Errors
    ///
    /// - 模块名与目录名不一致时返回 `NameMismatch`
    /// - id 已被占用时返回 `DuplicateId`
    /// - 名称已被其他模块占用时返回 `DuplicateName`
    pub fn register(&self, module: impl Into<Arc<Module>>) -> Result<Arc<Module>> {
        let module = module.into();
        check_folder(&module)?;

        let _guard = self.writer.lock();
        let current = self.modules.load();

        if let Some(existing) = current.get(&module.id) {
            return Err(CoreError::DuplicateId {
                id: module.id,
                existing: existing.name.clone(),
                rejected: module.name.clone(),
            });
        }
        if current.values().any(|m| m.name == module.name) {
            return Err(CoreError::DuplicateName(module.name.clone()));
        }

        let mut next = RegistrySnapshot::clone(&current);
        next.insert(module.id, module.clone());
        self.modules.store(Arc::new(next));

        info!(module_id = %module.id, module_name = %module.name, "模块已注册");
        Ok(module)
    }

    /// 启用模块
    ///
    /// 已注册的同一模块重复启用是幂等的。
    pub fn enable(&self, module: Arc<Module>) -> Result<()> {
        check_folder(&module)?;

        let _guard = self.writer.lock();
        let current = self.modules.load();

        if let Some(existing) = current.get(&module.id) {
            if existing.name != module.name {
                return Err(CoreError::DuplicateId {
                    id: module.id,
                    existing: existing.name.clone(),
                    rejected: module.name.clone(),
                });
            }
        }
        if current
            .values()
            .any(|m| m.name == module.name && m.id != module.id)
        {
            return Err(CoreError::DuplicateName(module.name.clone()));
        }

        module.mark_enabled(true);
        let mut next = RegistrySnapshot::clone(&current);
        next.insert(module.id, module.clone());
        self.modules.store(Arc::new(next));

        info!(module_id = %module.id, module_name = %module.name, "模块已启用");
        Ok(())
    }

    /// 禁用模块并移出注册表
    ///
    /// # Errors
    ///
    /// - id 0 返回 `BaselineLocked`
    /// - id 未注册返回 `ModuleNotFound`
    pub fn disable(&self, id: i32) -> Result<Arc<Module>> {
        if id == BASELINE_ID {
            let name = self
                .get(id)
                .map(|m| m.name.clone())
                .unwrap_or_else(|| id.to_string());
            warn!(module_id = %id, "拒绝禁用基础模块");
            return Err(CoreError::BaselineLocked(name));
        }

        let removed = self
            .remove(id)
            .ok_or_else(|| CoreError::ModuleNotFound(id.to_string()))?;
        removed.mark_enabled(false);
        info!(module_id = %id, module_name = %removed.name, "模块已禁用");
        Ok(removed)
    }

    /// 移除模块（不检查基础模块）
    pub fn remove(&self, id: i32) -> Option<Arc<Module>> {
        self.remove_where(id, |_| true)
    }

    /// 仅当 `id` 处注册的正是名为 `name` 的模块时移除
    ///
    /// 磁盘上未启用的模块可能与已注册模块共用 id，按 id 移除会误删后者。
    pub fn remove_if(&self, id: i32, name: &str) -> Option<Arc<Module>> {
        self.remove_where(id, |m| m.name == name)
    }

    fn remove_where(&self, id: i32, matches: impl Fn(&Module) -> bool) -> Option<Arc<Module>> {
        let _guard = self.writer.lock();
        let current = self.modules.load();
        match current.get(&id) {
            Some(existing) if matches(existing) => {}
            _ => return None,
        }

        let mut next = RegistrySnapshot::clone(&current);
        let removed = next.remove(&id);
        self.modules.store(Arc::new(next));
        debug!(module_id = %id, "模块已移出注册表");
        removed
    }

    /// 按 id 获取模块
    pub fn get(&self, id: i32) -> Option<Arc<Module>> {
        self.modules.load().get(&id).cloned()
    }

    /// 按名称获取模块
    pub fn by_name(&self, name: &str) -> Option<Arc<Module>> {
        self.modules
            .load()
            .values()
            .find(|m| m.name == name)
            .cloned()
    }

    /// id 严格小于 `id` 的最大模块
    pub fn floor(&self, id: i32) -> Option<Arc<Module>> {
        self.modules
            .load()
            .range(..id)
            .next_back()
            .map(|(_, m)| m.clone())
    }

    /// id 最大的模块
    pub fn home(&self) -> Option<Arc<Module>> {
        self.modules
            .load()
            .iter()
            .next_back()
            .map(|(_, m)| m.clone())
    }

    /// 基础模块（id 0）
    pub fn baseline(&self) -> Option<Arc<Module>> {
        self.get(BASELINE_ID)
    }

    /// 按 id 升序列出所有模块
    pub fn list(&self) -> Vec<Arc<Module>> {
        self.modules.load().values().cloned().collect()
    }

    /// 模块数量
    pub fn count(&self) -> usize {
        self.modules.load().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.modules.load().is_empty()
    }

    /// 清空注册表
    pub fn clean(&self) {
        let _guard = self.writer.lock();
        self.modules.store(Arc::new(BTreeMap::new()));
        debug!("注册表已清空");
    }
}

fn check_folder(module: &Module) -> Result<()> {
    let folder = module
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if folder != module.name {
        return Err(CoreError::NameMismatch {
            folder,
            declared: module.name.clone(),
        });
    }
    Ok(())
}
