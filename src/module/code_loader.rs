//! 代码加载上下文
//!
//! 宿主内所有模块共享一个代码加载上下文。处理器类型按代码归档分组，
//! 在启动时注册；运行时通过 [`CodeLoader::add_archive`] 激活某个归档，
//! 使其中的处理器类型可以按限定名查找。激活只增不减。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::record::Module;
use crate::router::HandlerType;
use crate::utils::Result;

/// 模块内存放代码归档的子目录
pub const MODEL_DIR: &str = "model";

/// 代码加载上下文
#[derive(Default)]
pub struct CodeLoader {
    /// 已注册但未必激活的归档：归档文件名 -> 处理器类型
    bundles: RwLock<HashMap<String, Vec<Arc<dyn HandlerType>>>>,

    /// 已激活的处理器类型：限定名 -> 类型
    active: RwLock<HashMap<String, Arc<dyn HandlerType>>>,

    /// 已激活的归档路径
    archives: RwLock<Vec<PathBuf>>,
}

impl CodeLoader {
    /// 创建空的代码加载上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册宿主内置的处理器类型（立即可见）
    pub fn register_builtin(&self, types: Vec<Arc<dyn HandlerType>>) {
        let mut active = self.active.write();
        for ty in types {
            let name = ty.qualified_name().to_string();
            debug!(handler = %name, "注册内置处理器类型");
            active.entry(name).or_insert(ty);
        }
    }

    /// 注册一个归档包含的处理器类型（激活前不可见）
    pub fn register_bundle(&self, archive: impl Into<String>, types: Vec<Arc<dyn HandlerType>>) {
        let archive = archive.into();
        debug!(archive = %archive, count = types.len(), "注册代码归档");
        self.bundles.write().entry(archive).or_default().extend(types);
    }

    /// 激活一个代码归档
    ///
    /// 按文件名匹配已注册的归档；同名限定名已存在时保留先激活的类型。
    /// 返回新可见的处理器类型数量。
    pub fn add_archive(&self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let file_name = match path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => return 0,
        };

        let types = match self.bundles.read().get(&file_name) {
            Some(types) => types.clone(),
            None => {
                warn!(archive = %path.display(), "未注册的代码归档，忽略");
                return 0;
            }
        };

        {
            let mut archives = self.archives.write();
            if archives.iter().any(|p| p == path) {
                debug!(archive = %path.display(), "代码归档已激活");
                return 0;
            }
            archives.push(path.to_path_buf());
        }

        let mut added = 0;
        let mut active = self.active.write();
        for ty in types {
            let name = ty.qualified_name().to_string();
            if active.contains_key(&name) {
                debug!(handler = %name, "处理器类型已存在，保留先加载的版本");
                continue;
            }
            active.insert(name, ty);
            added += 1;
        }

        info!(archive = %path.display(), added, "代码归档已激活");
        added
    }

    /// 激活模块 `model/` 目录下的所有代码归档
    pub async fn init_models(&self, module: &Module) -> Result<usize> {
        let dir = module.path.join(MODEL_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut added = 0;
        for file in files {
            debug!(module_id = %module.id, archive = %file.display(), "加载模块代码归档");
            added += self.add_archive(&file);
        }
        Ok(added)
    }

    /// 按限定名查找处理器类型
    pub fn find_handler(&self, qualified: &str) -> Option<Arc<dyn HandlerType>> {
        self.active.read().get(qualified).cloned()
    }

    /// 已激活的归档
    pub fn archives(&self) -> Vec<PathBuf> {
        self.archives.read().clone()
    }

    /// 可见的处理器类型数量
    pub fn handler_count(&self) -> usize {
        self.active.read().len()
    }
}

impl std::fmt::Debug for CodeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeLoader")
            .field("bundles", &self.bundles.read().len())
            .field("handlers", &self.handler_count())
            .field("archives", &self.archives.read().len())
            .finish()
    }
}
