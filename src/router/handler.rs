//! 处理器类型与路由声明
//!
//! 处理器类型在启动时注册到代码加载上下文，按限定名查找。
//! 每个处理器类型声明自己的路由（路径模式、请求方法、访问标签、处理方法名）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::module::Module;
use crate::utils::{CoreError, Result};

// ============================================================================
// 请求方法
// ============================================================================

/// 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// 所有方法
    pub const ALL: [Method; 2] = [Method::Get, Method::Post];

    /// 方法位掩码
    pub fn bit(self) -> u8 {
        match self {
            Method::Get => MethodMask::GET.0,
            Method::Post => MethodMask::POST.0,
        }
    }

    /// 缓存键中使用的方法编码
    pub fn code(self) -> u8 {
        self.bit()
    }

    /// 从字符串解析（大小写不敏感）
    pub fn parse(s: &str) -> Option<Method> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            _ => None,
        }
    }

    /// 未匹配任何路由时调用的默认处理方法
    pub fn default_action(self) -> &'static str {
        match self {
            Method::Get => "on_get",
            Method::Post => "on_post",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// 方法位掩码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodMask(pub u8);

impl MethodMask {
    pub const GET: MethodMask = MethodMask(1);
    pub const POST: MethodMask = MethodMask(2);
    pub const ANY: MethodMask = MethodMask(3);

    /// 是否包含某个方法
    pub fn contains(self, method: Method) -> bool {
        self.0 & method.bit() > 0
    }
}

impl Default for MethodMask {
    fn default() -> Self {
        MethodMask::GET
    }
}

// ============================================================================
// 路由声明
// ============================================================================

/// 处理器类型上的一条路由声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecl {
    /// 路径模式（正则表达式，完整匹配相对路径）
    pub path: String,

    /// 方法掩码
    pub methods: MethodMask,

    /// 访问标签，`access.` 开头，多个用 `|` 分隔；空或 `none` 表示不限制
    pub access: String,

    /// 处理方法名
    pub action: String,
}

impl RouteDecl {
    /// 创建 GET 路由
    pub fn get(path: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(path, MethodMask::GET, action)
    }

    /// 创建 POST 路由
    pub fn post(path: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(path, MethodMask::POST, action)
    }

    /// 创建 GET + POST 路由
    pub fn any(path: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(path, MethodMask::ANY, action)
    }

    fn new(path: impl Into<String>, methods: MethodMask, action: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods,
            access: String::new(),
            action: action.into(),
        }
    }

    /// 设置访问标签
    pub fn access(mut self, access: impl Into<String>) -> Self {
        self.access = access.into();
        self
    }
}

// ============================================================================
// 处理器
// ============================================================================

/// 处理器调用上下文
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// 请求 ID
    pub request_id: String,

    /// 所属模块
    pub module: Arc<Module>,

    /// 请求方法
    pub method: Method,

    /// 原始请求 URI
    pub uri: String,

    /// 去掉处理器类型前缀后的相对路径
    pub path: String,

    /// 路由匹配到的捕获组
    pub captures: Vec<String>,
}

/// 处理器实例
#[async_trait]
pub trait Handler: Send + Sync {
    /// 调用处理方法
    ///
    /// # Errors
    ///
    /// 处理方法不存在时返回 `ActionNotFound`
    async fn call(&self, action: &str, ctx: &HandlerContext) -> Result<serde_json::Value>;
}

/// 处理器类型
///
/// 相当于一个可实例化的处理器类：通过限定名
/// （`<package>.<uri 以点分隔>`）在代码加载上下文中查找。
pub trait HandlerType: Send + Sync {
    /// 限定名，例如 `org.blog.web.post`
    fn qualified_name(&self) -> &str;

    /// 路由声明
    fn routes(&self) -> Vec<RouteDecl>;

    /// 创建处理器实例
    fn create(&self) -> Box<dyn Handler>;
}

impl fmt::Debug for dyn HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerType({})", self.qualified_name())
    }
}

// ============================================================================
// 基于闭包的处理器类型
// ============================================================================

type ActionFn = dyn Fn(&HandlerContext) -> Result<serde_json::Value> + Send + Sync;

/// 由闭包组成的处理器类型
///
/// 适合注册简单的处理器：每个处理方法是一个闭包。
#[derive(Clone)]
pub struct FnHandlerType {
    name: String,
    routes: Vec<RouteDecl>,
    actions: Arc<Vec<(String, Arc<ActionFn>)>>,
}

impl FnHandlerType {
    /// 创建处理器类型
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
            actions: Arc::new(Vec::new()),
        }
    }

    /// 添加路由声明
    pub fn route(mut self, decl: RouteDecl) -> Self {
        self.routes.push(decl);
        self
    }

    /// 添加处理方法
    pub fn action<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HandlerContext) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.actions).push((name.into(), Arc::new(f)));
        self
    }
}

impl HandlerType for FnHandlerType {
    fn qualified_name(&self) -> &str {
        &self.name
    }

    fn routes(&self) -> Vec<RouteDecl> {
        self.routes.clone()
    }

    fn create(&self) -> Box<dyn Handler> {
        Box::new(FnHandler {
            actions: self.actions.clone(),
        })
    }
}

struct FnHandler {
    actions: Arc<Vec<(String, Arc<ActionFn>)>>,
}

#[async_trait]
impl Handler for FnHandler {
    async fn call(&self, action: &str, ctx: &HandlerContext) -> Result<serde_json::Value> {
        let f = self
            .actions
            .iter()
            .find(|(name, _)| name == action)
            .map(|(_, f)| f.clone())
            .ok_or_else(|| CoreError::ActionNotFound(action.to_string()))?;
        (*f)(ctx)
    }
}
