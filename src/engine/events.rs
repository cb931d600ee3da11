// ==========================================
// 手术室排程系统 - 排程事件通知
// ==========================================
// 职责: 定义通知 trait，实现依赖倒置
// 红线: 通知为尽力而为，失败绝不回滚排程操作
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 排程事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEventType {
    /// 手术已放置到手术室
    SurgeryPlaced,
    /// 手术优先级已升级
    SurgeryEscalated,
    /// 手术等待超时，成为升级候选
    EscalationCandidate,
    /// 手术审批通过
    SurgeryApproved,
    /// 手术审批驳回
    SurgeryRejected,
    /// 手术取消（时段已释放）
    SurgeryCancelled,
    /// 手术待改期（时段已释放）
    SurgeryRescheduled,
}

impl ScheduleEventType {
    pub fn as_str(&self) -> &str {
        match self {
            ScheduleEventType::SurgeryPlaced => "SurgeryPlaced",
            ScheduleEventType::SurgeryEscalated => "SurgeryEscalated",
            ScheduleEventType::EscalationCandidate => "EscalationCandidate",
            ScheduleEventType::SurgeryApproved => "SurgeryApproved",
            ScheduleEventType::SurgeryRejected => "SurgeryRejected",
            ScheduleEventType::SurgeryCancelled => "SurgeryCancelled",
            ScheduleEventType::SurgeryRescheduled => "SurgeryRescheduled",
        }
    }
}

/// 排程事件（面向人的可读通知）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub facility_id: String,
    pub surgery_id: String,
    pub event_type: ScheduleEventType,
    pub message: String,
    /// 触发用户（定时任务为 None）
    pub actor: Option<String>,
    pub occurred_at: NaiveDateTime,
}

impl ScheduleEvent {
    pub fn new(
        facility_id: &str,
        surgery_id: &str,
        event_type: ScheduleEventType,
        message: impl Into<String>,
        actor: Option<&str>,
        occurred_at: NaiveDateTime,
    ) -> Self {
        Self {
            facility_id: facility_id.to_string(),
            surgery_id: surgery_id.to_string(),
            event_type,
            message: message.into(),
            actor: actor.map(|a| a.to_string()),
            occurred_at,
        }
    }
}

// ==========================================
// 通知 Trait
// ==========================================

/// 排程通知接收方
///
/// 实现方负责投递（消息推送/邮件/看板等）
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: ScheduleEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作通知
#[derive(Debug, Clone, Default)]
pub struct NoOpNotificationSink;

impl NotificationSink for NoOpNotificationSink {
    fn notify(&self, event: ScheduleEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpNotificationSink: 跳过通知 - surgery_id={}, event_type={}",
            event.surgery_id,
            event.event_type.as_str()
        );
        Ok(())
    }
}

/// 可选的通知包装
///
/// 失败只记录 warn，不向上传播
#[derive(Clone)]
pub struct OptionalNotificationSink {
    inner: Option<Arc<dyn NotificationSink>>,
}

impl OptionalNotificationSink {
    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        Self { inner: Some(sink) }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发送通知（尽力而为）
    ///
    /// # 返回
    /// 是否投递成功
    pub fn notify(&self, event: ScheduleEvent) -> bool {
        let Some(sink) = &self.inner else {
            tracing::debug!(
                "OptionalNotificationSink: 未配置接收方，跳过通知 - surgery_id={}, event_type={}",
                event.surgery_id,
                event.event_type.as_str()
            );
            return true;
        };

        let surgery_id = event.surgery_id.clone();
        let event_type = event.event_type;
        match sink.notify(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    surgery_id = %surgery_id,
                    event_type = event_type.as_str(),
                    error = %e,
                    "通知投递失败，排程结果不受影响"
                );
                false
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalNotificationSink {
    fn default() -> Self {
        Self::none()
    }
}
