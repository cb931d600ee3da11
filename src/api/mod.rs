// ==========================================
// 手术室排程系统 - API 层
// ==========================================
// 职责: 提供对外业务接口（输入校验 + 错误转换）
// ==========================================

pub mod error;
pub mod scheduling_api;
pub mod validator;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use scheduling_api::SchedulingApi;
