//! 路由缓存
//!
//! 以 `方法编码|uri` 为键缓存处理器类型、路径映射表和所属模块。
//! 读操作不加全局锁；填充在单一互斥锁内进行，保证同一个键不会被两个线程
//! 写入不同的条目。缓存只在 [`RouteCache::reset`] 时整体清空。
//!
//! 填充规则：
//! - 处理器类型声明了路由时，以 `方法|<以 / 结尾的 uri><模式>` 为键逐条缓存
//! - 没有声明路由时，以原始 `方法|uri` 为键缓存
//! - 已有条目属于 id 更大的模块时，不被 id 更小的模块覆盖

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

use super::handler::{Handler, HandlerContext, HandlerType, Method};
use super::path::{AccessRegistry, PathMapping, PathResolver, PathTable};
use crate::module::{CodeLoader, Module, ModuleRegistry};
use crate::utils::{generate_uuid, CoreError, Result};

/// 缓存键
pub fn cache_key(method: Method, uri: &str) -> String {
    format!("{}|{}", method.code(), uri)
}

/// 由模块包名和 uri 推导处理器类型限定名
///
/// `org.blog` + `/post/list` -> `org.blog.post.list`
pub fn handler_type_name(package: &str, uri: &str) -> String {
    format!("{}.{}", package, uri)
        .replace('/', ".")
        .replace("..", ".")
}

/// 相对路径：uri 去掉处理器类型对应的前缀，再去掉开头的 `/`
pub fn relative_path(package: &str, qualified: &str, uri: &str) -> String {
    let name = qualified
        .strip_prefix(package)
        .and_then(|s| s.strip_prefix('.'))
        .unwrap_or(qualified)
        .replace('.', "/");
    let path = if uri.len() > name.len() {
        uri.replace(&name, "")
    } else {
        String::new()
    };
    path.trim_start_matches('/').to_string()
}

// ============================================================================
// 缓存条目
// ============================================================================

/// 缓存条目：处理器类型 + 路径映射表 + 所属模块
#[derive(Clone)]
pub struct CachedRoute {
    pub handler_type: Arc<dyn HandlerType>,
    pub table: Arc<PathTable>,
    pub module: Arc<Module>,
}

impl CachedRoute {
    /// 创建绑定到 uri 的处理器实例
    pub fn create(&self, method: Method, uri: &str) -> ResolvedHandler {
        let package = self.module.package.as_deref().unwrap_or_default();
        ResolvedHandler {
            module: self.module.clone(),
            handler_type: self.handler_type.clone(),
            handler: self.handler_type.create(),
            table: self.table.clone(),
            method,
            uri: uri.to_string(),
            path: relative_path(package, self.handler_type.qualified_name(), uri),
        }
    }
}

impl fmt::Debug for CachedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}//{}}}", self.module.name, self.handler_type.qualified_name())
    }
}

/// 解析得到的处理器实例
pub struct ResolvedHandler {
    /// 所属模块
    pub module: Arc<Module>,

    /// 处理器类型
    pub handler_type: Arc<dyn HandlerType>,

    /// 处理器实例
    pub handler: Box<dyn Handler>,

    /// 路径映射表
    pub table: Arc<PathTable>,

    /// 请求方法
    pub method: Method,

    /// 原始请求 uri
    pub uri: String,

    /// 相对路径
    pub path: String,
}

impl ResolvedHandler {
    /// 与相对路径匹配的映射及捕获组
    pub fn mapping(&self) -> Option<(&PathMapping, Vec<String>)> {
        self.table.find(self.method, &self.path)
    }

    /// 分发请求
    ///
    /// 相对路径匹配到映射时调用映射的处理方法，否则调用方法默认的处理方法
    /// （`on_get` / `on_post`）。
    pub async fn dispatch(&self) -> Result<serde_json::Value> {
        let (action, captures) = match self.mapping() {
            Some((mapping, captures)) => (mapping.action.clone(), captures),
            None => (self.method.default_action().to_string(), Vec::new()),
        };

        let ctx = HandlerContext {
            request_id: generate_uuid(),
            module: self.module.clone(),
            method: self.method,
            uri: self.uri.clone(),
            path: self.path.clone(),
            captures,
        };
        debug!(
            request_id = %ctx.request_id,
            module_id = %self.module.id,
            action = %action,
            "分发请求"
        );
        self.handler.call(&action, &ctx).await
    }
}

impl fmt::Debug for ResolvedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedHandler")
            .field("module", &self.module.name)
            .field("handler_type", &self.handler_type.qualified_name())
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("path", &self.path)
            .finish()
    }
}

// ============================================================================
// 路由缓存
// ============================================================================

/// 路由缓存统计信息
#[derive(Debug, Clone, Serialize)]
pub struct RouteCacheStats {
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 缓存条目数量
    pub size: usize,
    /// 命中率（百分比）
    pub hit_rate: f64,
}

/// 路由解析所需的协作者
#[derive(Clone, Copy)]
pub struct ResolveEnv<'a> {
    pub registry: &'a ModuleRegistry,
    pub code_loader: &'a CodeLoader,
    pub access: &'a dyn AccessRegistry,
}

/// 路由缓存
pub struct RouteCache {
    entries: DashMap<String, Arc<CachedRoute>>,
    populate: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    enabled: bool,
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RouteCache {
    /// 创建路由缓存；`enabled` 为假时每次都重新解析且不写入缓存
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            populate: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            enabled,
        }
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 只查缓存，不解析
    pub fn lookup_cached(&self, method: Method, uri: &str) -> Option<ResolvedHandler> {
        let entry = self.entries.get(&cache_key(method, uri))?.value().clone();
        Some(entry.create(method, uri))
    }

    /// 查找处理器
    ///
    /// 缓存命中直接创建实例；未命中时从 `start` 开始沿 floor 逐级解析，
    /// 链耗尽返回 `None`。解析故障只记录日志，视为未命中。
    #[instrument(skip(self, env, start), fields(module_id = %start.id))]
    pub fn lookup(
        &self,
        env: ResolveEnv<'_>,
        start: &Arc<Module>,
        method: Method,
        uri: &str,
    ) -> Option<ResolvedHandler> {
        self.find_entry(env, start, method, uri)
            .map(|entry| entry.create(method, uri))
    }

    /// 按 uri 逐级截短查找处理器
    ///
    /// 先查完整 uri，找不到时依次去掉最后一段（`/post/edit/9` -> `/post/edit`
    /// -> `/post`）。找到的处理器仍绑定完整 uri，相对路径由完整 uri 计算。
    #[instrument(skip(self, env, start), fields(module_id = %start.id))]
    pub fn route(
        &self,
        env: ResolveEnv<'_>,
        start: &Arc<Module>,
        method: Method,
        uri: &str,
    ) -> Option<ResolvedHandler> {
        let mut prefix = uri;
        loop {
            if let Some(entry) = self.find_entry(env, start, method, prefix) {
                return Some(entry.create(method, uri));
            }
            match prefix.trim_end_matches('/').rfind('/') {
                Some(pos) if pos > 0 => prefix = &prefix[..pos],
                _ => return None,
            }
        }
    }

    fn find_entry(
        &self,
        env: ResolveEnv<'_>,
        start: &Arc<Module>,
        method: Method,
        uri: &str,
    ) -> Option<Arc<CachedRoute>> {
        let key = cache_key(method, uri);

        if let Some(entry) = self.cached(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, owner = %entry.module.id, "路由缓存命中");
            return Some(entry);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut current = start.clone();
        loop {
            if let Some(entry) = self.resolve_in(env, &current, method, uri, &key) {
                return Some(entry);
            }
            current = env.registry.floor(current.id)?;
        }
    }

    fn cached(&self, key: &str) -> Option<Arc<CachedRoute>> {
        if !self.enabled {
            return None;
        }
        self.entries.get(key).map(|e| e.value().clone())
    }

    fn resolve_in(
        &self,
        env: ResolveEnv<'_>,
        module: &Arc<Module>,
        method: Method,
        uri: &str,
        key: &str,
    ) -> Option<Arc<CachedRoute>> {
        let _guard = self.populate.lock();

        if let Some(entry) = self.cached(key) {
            return Some(entry);
        }

        match self.populate_from(env, module, method, uri) {
            Ok(found) => found,
            Err(e) => {
                warn!(module_id = %module.id, uri = %uri, error = %e, "路由解析失败，继续查找 floor");
                None
            }
        }
    }

    /// 在单个模块内解析并填充缓存，调用方必须持有填充锁
    fn populate_from(
        &self,
        env: ResolveEnv<'_>,
        module: &Arc<Module>,
        method: Method,
        uri: &str,
    ) -> Result<Option<Arc<CachedRoute>>> {
        let package = match module.package.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => {
                trace!(module_id = %module.id, "模块未声明 package");
                return Ok(None);
            }
        };

        let name = handler_type_name(package, uri);
        let handler_type = match env.code_loader.find_handler(&name) {
            Some(ty) => ty,
            None => {
                trace!(module_id = %module.id, handler = %name, "处理器类型未找到");
                return Ok(None);
            }
        };

        let table = PathResolver::resolve(handler_type.as_ref(), env.access).map_err(|e| {
            CoreError::ResolutionFault {
                uri: uri.to_string(),
                reason: e.to_string(),
            }
        })?;
        let table = Arc::new(table);

        let entry = Arc::new(CachedRoute {
            handler_type,
            table: table.clone(),
            module: module.clone(),
        });

        if self.enabled {
            if table.is_empty() {
                self.install(cache_key(method, uri), entry.clone());
            } else {
                let base = if uri.ends_with('/') {
                    uri.to_string()
                } else {
                    format!("{}/", uri)
                };
                for (m, raw) in table.iter() {
                    self.install(cache_key(m, &format!("{}{}", base, raw)), entry.clone());
                }
            }
        }

        debug!(module_id = %module.id, handler = %name, mappings = table.len(), "路由已解析");
        Ok(Some(entry))
    }

    /// 写入缓存条目
    ///
    /// 已有条目属于 id 更大的模块时保留原条目并返回 `false`。
    pub fn install(&self, key: String, entry: Arc<CachedRoute>) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().module.id > entry.module.id {
                    trace!(
                        key = %occupied.key(),
                        kept = %occupied.get().module.id,
                        rejected = %entry.module.id,
                        "保留 id 更大的模块的缓存条目"
                    );
                    return false;
                }
                occupied.insert(entry);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    /// 按键获取缓存条目
    pub fn get(&self, key: &str) -> Option<Arc<CachedRoute>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// 所有缓存键（有序）
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// 清空缓存
    pub fn reset(&self) {
        let _guard = self.populate.lock();
        self.entries.clear();
        debug!("路由缓存已清空");
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 统计信息
    pub fn stats(&self) -> RouteCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        RouteCacheStats {
            hits,
            misses,
            size: self.entries.len(),
            hit_rate: if total > 0 {
                hits as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

impl fmt::Debug for RouteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteCache")
            .field("size", &self.entries.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}
