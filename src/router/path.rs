//! 路径映射解析
//!
//! 把处理器类型的路由声明转换为 `方法 -> (原始模式 -> PathMapping)` 表，
//! 并在扫描时登记访问标签。

use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error};

use super::handler::{HandlerType, Method, MethodMask, RouteDecl};
use crate::utils::{CoreError, Result};

/// 访问标签前缀
pub const ACCESS_PREFIX: &str = "access.";

/// 表示“不限制访问”的标签值
pub const ACCESS_NONE: &str = "none";

// ============================================================================
// 访问标签
// ============================================================================

/// 全局访问标签集合
pub trait AccessRegistry: Send + Sync {
    /// 登记一个访问标签
    fn set(&self, tag: &str);

    /// 是否已登记
    fn contains(&self, tag: &str) -> bool;

    /// 所有已登记标签（有序）
    fn tags(&self) -> Vec<String>;
}

/// 内存中的访问标签集合
#[derive(Debug, Default)]
pub struct AccessTags {
    tags: RwLock<BTreeSet<String>>,
}

impl AccessTags {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessRegistry for AccessTags {
    fn set(&self, tag: &str) {
        if self.tags.write().insert(tag.to_string()) {
            debug!(tag = %tag, "登记访问标签");
        }
    }

    fn contains(&self, tag: &str) -> bool {
        self.tags.read().contains(tag)
    }

    fn tags(&self) -> Vec<String> {
        self.tags.read().iter().cloned().collect()
    }
}

// ============================================================================
// 路径映射
// ============================================================================

/// 一条已编译的路径映射，构建后不可变
#[derive(Debug, Clone)]
pub struct PathMapping {
    /// 原始模式
    pub raw: String,

    /// 编译后的模式（完整匹配）
    pub pattern: Regex,

    /// 方法掩码
    pub methods: MethodMask,

    /// 访问标签
    pub access: Vec<String>,

    /// 处理方法名
    pub action: String,
}

impl PathMapping {
    /// 编译一条路由声明
    pub fn compile(decl: &RouteDecl) -> Result<Self> {
        let pattern = Regex::new(&format!("^(?:{})$", decl.path))?;
        Ok(Self {
            raw: decl.path.clone(),
            pattern,
            methods: decl.methods,
            access: split_access(&decl.access),
            action: decl.action.clone(),
        })
    }

    /// 匹配相对路径，返回捕获组
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        self.pattern.captures(path).map(|caps| {
            caps.iter()
                .skip(1)
                .map(|c| c.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
    }
}

fn split_access(access: &str) -> Vec<String> {
    if access.is_empty() || access == ACCESS_NONE {
        return Vec::new();
    }
    access
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 路径映射表：方法 -> (原始模式 -> 映射)
#[derive(Debug, Clone, Default)]
pub struct PathTable {
    methods: HashMap<Method, HashMap<String, PathMapping>>,
}

impl PathTable {
    /// 插入映射
    pub fn insert(&mut self, method: Method, mapping: PathMapping) {
        self.methods
            .entry(method)
            .or_default()
            .insert(mapping.raw.clone(), mapping);
    }

    /// 某个方法下的所有映射
    pub fn mappings(&self, method: Method) -> Option<&HashMap<String, PathMapping>> {
        self.methods.get(&method)
    }

    /// 按方法与原始模式查找
    pub fn get(&self, method: Method, raw: &str) -> Option<&PathMapping> {
        self.methods.get(&method).and_then(|m| m.get(raw))
    }

    /// 找到第一个完整匹配相对路径的映射
    ///
    /// 多个模式都匹配时优先选择原始模式最长的那个。
    pub fn find(&self, method: Method, path: &str) -> Option<(&PathMapping, Vec<String>)> {
        let mappings = self.methods.get(&method)?;
        let mut candidates: Vec<&PathMapping> = mappings.values().collect();
        candidates.sort_by(|a, b| b.raw.len().cmp(&a.raw.len()).then(a.raw.cmp(&b.raw)));
        candidates
            .into_iter()
            .find_map(|m| m.captures(path).map(|caps| (m, caps)))
    }

    /// 有映射的方法及其模式
    pub fn iter(&self) -> impl Iterator<Item = (Method, &str)> {
        self.methods
            .iter()
            .flat_map(|(method, m)| m.keys().map(move |raw| (*method, raw.as_str())))
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.methods.values().all(|m| m.is_empty())
    }

    /// 映射总数（按方法计）
    pub fn len(&self) -> usize {
        self.methods.values().map(|m| m.len()).sum()
    }
}

// ============================================================================
// 解析器
// ============================================================================

/// 路径映射解析器
pub struct PathResolver;

impl PathResolver {
    /// 解析处理器类型的路由声明
    ///
    /// `access.` 开头的访问标签会登记到 `access`；格式错误的标签只记录日志，
    /// 映射照常安装。
    ///
    /// # Errors
    ///
    /// 路径模式无法编译时返回 `ResolutionFault`
    pub fn resolve(
        handler_type: &dyn HandlerType,
        access: &dyn AccessRegistry,
    ) -> Result<PathTable> {
        let mut table = PathTable::default();
        let name = handler_type.qualified_name();

        for decl in handler_type.routes() {
            register_access(name, &decl, access);

            let mapping = PathMapping::compile(&decl).map_err(|e| CoreError::ResolutionFault {
                uri: decl.path.clone(),
                reason: format!("{}: {}", name, e),
            })?;

            for method in Method::ALL {
                if decl.methods.contains(method) {
                    table.insert(method, mapping.clone());
                }
            }
        }

        debug!(handler = %name, mappings = table.len(), "路径映射解析完成");
        Ok(table)
    }
}

fn register_access(handler: &str, decl: &RouteDecl, access: &dyn AccessRegistry) {
    let raw = decl.access.as_str();
    if raw.is_empty() || raw == ACCESS_NONE {
        return;
    }
    if raw.starts_with(ACCESS_PREFIX) {
        debug!(access = %raw, handler = %handler, action = %decl.action, "登记访问标签");
        for tag in split_access(raw) {
            access.set(&tag);
        }
    } else {
        error!(access = %raw, handler = %handler, action = %decl.action, "访问标签格式错误");
    }
}
