//! # Dispatch API
//!
//! 应急调度编排系统的REST API服务模块，基于Axum框架构建。
//!
//! ## API 端点
//!
//! ### 调度会话
//! - `POST /api/dispatch` - 发起调度会话（立即返回初始快照）
//! - `GET /api/dispatch` - 查询近期会话列表
//! - `GET /api/dispatch/{id}` - 查询会话状态
//! - `POST /api/dispatch/{id}/cancel` - 取消会话（幂等）
//!
//! ### 合作方回调
//! - `POST /api/dispatch/{id}/ack` - 通道外部确认（幂等）
//!
//! ### 系统监控
//! - `GET /health` - 健康检查
//!
//! ## 响应格式
//!
//! 成功响应统一使用信封结构：
//!
//! ```json
//! {
//!   "success": true,
//!   "data": { "session_id": "…", "overall_status": "PENDING" },
//!   "timestamp": "2024-01-01T00:00:00Z"
//! }
//! ```
//!
//! 错误响应携带错误类型与修复建议：
//!
//! ```json
//! {
//!   "error": {
//!     "message": "调度会话 … 不存在",
//!     "type": "SESSION_NOT_FOUND",
//!     "code": 404,
//!     "suggestions": ["请检查会话ID是否正确"]
//!   }
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

pub use routes::{create_app, create_routes, AppState};
