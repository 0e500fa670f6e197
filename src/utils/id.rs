//! 请求 ID 生成
//!
//! 为每次路由解析、模板渲染生成全局唯一的请求标识，
//! 用于在日志中串联同一请求内的嵌套 floor 查找。

/// 生成 UUID v4 格式的请求 ID
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 验证请求 ID 是否为合法的 UUID
pub fn is_valid_request_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}
