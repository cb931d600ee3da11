// ==========================================
// 手术室排程系统 - API层错误类型
// ==========================================
// 职责: 定义面向调用方的错误类型，转换引擎/仓储错误
// 红线: 约束违反必须带出规则名与违规明细
// ==========================================

use crate::engine::constraint::Violation;
use crate::engine::error::ScheduleError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入 / 约束
    // ==========================================
    #[error("无效输入 (field={field}): {message}")]
    InvalidInput { field: String, message: String },

    /// 硬约束违反（规则名 + 明细）
    #[error("违反硬约束: {}", .rules.join(", "))]
    ConstraintViolation {
        rules: Vec<String>,
        violations: Vec<Violation>,
    },

    #[error("无可用时段: surgery_id={surgery_id}, date={date}")]
    NoFeasibleSlot { surgery_id: String, date: String },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无权限: {0}")]
    Unauthorized(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 并发控制错误（可重试）
    // ==========================================
    #[error("并发修改冲突: {0}")]
    ConcurrentModification(String),

    #[error("持久化超时: {0}")]
    Timeout(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// 硬约束违规明细（非约束错误返回空）
    pub fn violations(&self) -> &[Violation] {
        match self {
            ApiError::ConstraintViolation { violations, .. } => violations,
            _ => &[],
        }
    }

    /// 调用方可直接重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::ConcurrentModification(_) | ApiError::Timeout(_)
        )
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::RevisionConflict { .. } | RepositoryError::ConcurrentUpdate { .. } => {
                ApiError::ConcurrentModification(err.to_string())
            }
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg)
            | RepositoryError::SerializationError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput { field, message }
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ScheduleError 转换
// ==========================================
impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Validation { field, message } => ApiError::InvalidInput { field, message },
            ScheduleError::ConstraintViolation { rules, violations } => {
                ApiError::ConstraintViolation { rules, violations }
            }
            ScheduleError::NoFeasibleSlot { surgery_id, date } => ApiError::NoFeasibleSlot {
                surgery_id,
                date: date.to_string(),
            },
            ScheduleError::ConcurrentModification(msg) => ApiError::ConcurrentModification(msg),
            ScheduleError::PersistenceTimeout { .. } => ApiError::Timeout(err.to_string()),
            ScheduleError::Unauthorized { .. } => ApiError::Unauthorized(err.to_string()),
            ScheduleError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            ScheduleError::InvalidStateTransition { from, to, .. } => {
                ApiError::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
            ScheduleError::Repository(repo_err) => repo_err.into(),
            ScheduleError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
