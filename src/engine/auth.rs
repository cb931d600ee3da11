// ==========================================
// 手术室排程系统 - 权限校验
// ==========================================
// 红线: 授权由调用方注入,禁止全局可变状态
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Scheduler,
    Surgeon,
    Viewer,
}

/// 发起操作的用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: &str, role: Role) -> Self {
        Self {
            user_id: user_id.to_string(),
            role,
        }
    }

    /// 系统内部任务（定时刷新等）
    pub fn system() -> Self {
        Self::new("system", Role::Admin)
    }
}

/// 需要授权的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Place,
    AutoPlace,
    Escalate,
    Approve,
    Reject,
    Start,
    Complete,
    Cancel,
    Reschedule,
    RefreshPrediction,
    ViewQueue,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Place => "place",
            Action::AutoPlace => "auto_place",
            Action::Escalate => "escalate",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Start => "start",
            Action::Complete => "complete",
            Action::Cancel => "cancel",
            Action::Reschedule => "reschedule",
            Action::RefreshPrediction => "refresh_prediction",
            Action::ViewQueue => "view_queue",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// Authorizer Trait
// ==========================================

/// 授权校验
///
/// # 返回
/// - `Ok(())`: 允许
/// - `Err(reason)`: 拒绝原因
pub trait Authorizer: Send + Sync {
    fn authorize(&self, actor: &Actor, action: Action, surgery_id: Option<&str>)
        -> Result<(), String>;
}

/// 全部放行（嵌入/测试）
#[derive(Debug, Clone, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _actor: &Actor, _action: Action, _surgery_id: Option<&str>) -> Result<(), String> {
        Ok(())
    }
}

/// 基于角色的授权
///
/// - admin / scheduler: 全部操作
/// - surgeon: 开始/完成手术、刷新预测、查看队列
/// - viewer: 仅查看队列
#[derive(Debug, Clone, Default)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn authorize(&self, actor: &Actor, action: Action, _surgery_id: Option<&str>) -> Result<(), String> {
        let allowed = match actor.role {
            Role::Admin | Role::Scheduler => true,
            Role::Surgeon => matches!(
                action,
                Action::Start | Action::Complete | Action::RefreshPrediction | Action::ViewQueue
            ),
            Role::Viewer => action == Action::ViewQueue,
        };

        if allowed {
            Ok(())
        } else {
            Err(format!("角色 {:?} 不允许执行 {}", actor.role, action))
        }
    }
}
