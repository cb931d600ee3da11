// ==========================================
// 手术室排程系统 - 引擎层错误类型
// ==========================================
// 红线: 所有错误均为局部、可恢复
// 红线: 约束违反必须携带规则名,原样返回调用方
// ==========================================

use crate::domain::types::SurgeryStatus;
use crate::engine::constraint::Violation;
use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    // ===== 输入/约束 =====
    #[error("输入校验失败 (field={field}): {message}")]
    Validation { field: String, message: String },

    #[error("违反硬约束: {}", .rules.join(", "))]
    ConstraintViolation {
        rules: Vec<String>,
        violations: Vec<Violation>,
    },

    #[error("无法自动排程: surgery_id={surgery_id}, date={date}")]
    NoFeasibleSlot { surgery_id: String, date: NaiveDate },

    // ===== 并发 =====
    #[error("并发修改冲突（可重试）: {0}")]
    ConcurrentModification(String),

    #[error("持久化超时（可重试）: operation={operation}, timeout_ms={timeout_ms}")]
    PersistenceTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    // ===== 权限/状态 =====
    #[error("无权限: user_id={user_id}, action={action}: {reason}")]
    Unauthorized {
        user_id: String,
        action: String,
        reason: String,
    },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("无效的状态转换: surgery_id={surgery_id}, from={from} to={to}")]
    InvalidStateTransition {
        surgery_id: String,
        from: SurgeryStatus,
        to: SurgeryStatus,
    },

    // ===== 基础设施 =====
    #[error("仓储错误: {0}")]
    Repository(RepositoryError),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ScheduleError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ScheduleError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        ScheduleError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// 调用方可直接重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScheduleError::ConcurrentModification(_) | ScheduleError::PersistenceTimeout { .. }
        )
    }

    /// 违反的硬约束规则名（非约束错误返回空）
    pub fn violated_rules(&self) -> &[String] {
        match self {
            ScheduleError::ConstraintViolation { rules, .. } => rules,
            _ => &[],
        }
    }
}

// 写写冲突统一映射为可重试的并发修改
impl From<RepositoryError> for ScheduleError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::RevisionConflict { .. } | RepositoryError::ConcurrentUpdate { .. } => {
                ScheduleError::ConcurrentModification(err.to_string())
            }
            RepositoryError::NotFound { entity, id } => ScheduleError::NotFound { entity, id },
            other => ScheduleError::Repository(other),
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
