//! 路由模块
//!
//! 把 (请求方法, URI) 解析为具体的处理器实例：
//! - 处理器类型与路由声明
//! - 路径映射解析与访问标签登记
//! - 沿模块覆盖链回退的路由缓存

pub mod handler;
pub mod path;
pub mod route_cache;

// 重导出常用类型
pub use handler::{
    FnHandlerType, Handler, HandlerContext, HandlerType, Method, MethodMask, RouteDecl,
};
pub use path::{AccessRegistry, AccessTags, PathMapping, PathResolver, PathTable};
pub use route_cache::{
    cache_key, handler_type_name, relative_path, CachedRoute, ResolveEnv, ResolvedHandler,
    RouteCache, RouteCacheStats,
};
