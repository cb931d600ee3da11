// ==========================================
// 手术室排程系统 - 排程编排器
// ==========================================
// 职责: 串联 授权 -> 校验 -> 加锁 -> 复核 -> 提交 -> 通知
// 红线: "复核 + 删除旧时段 + 插入新时段" 在 手术 + 医生 + 手术室 锁内完成
// 红线: 提交时比较手术状态，取消与放置之间不会互相覆盖
// 红线: 约束违反原样返回规则名,不静默修正
// 红线: 持久化调用有超时上限,超时即返回(不在内部重试)
// 红线: 通知失败不回滚排程结果
// ==========================================

use crate::config::SchedulingConfig;
use crate::domain::resource::{Equipment, OperatingRoom, Staff};
use crate::domain::slot::{build_placement_slots, ScheduleSlot, TimeWindow};
use crate::domain::surgery::Surgery;
use crate::domain::types::{ApprovalStatus, Priority, SurgeryStatus};
use crate::engine::allocator::{SlotAllocator, SlotSearch};
use crate::engine::auth::{Action, Actor, AllowAll, Authorizer};
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::constraint::{ConstraintEngine, PlacementRequest, Violation};
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::events::{OptionalNotificationSink, ScheduleEvent, ScheduleEventType};
use crate::engine::predictor::{
    DurationFeatures, DurationPrediction, DurationPredictor, ScheduleQualityReport,
    ScheduleScorer,
};
use crate::engine::priority_queue::{PriorityQueueEngine, QueueSnapshot};
use crate::engine::resource_lock::{LockKey, ResourceLockRegistry};
use crate::repository::{
    PlacementCommit, RepositoryError, RepositoryResult, RoomRevision, ScheduleRepository,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

// ==========================================
// 编排结果
// ==========================================

/// 放置成功的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementOutcome {
    pub surgery_id: String,
    pub room_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// setup / surgery / cleanup 三个时段
    pub slots: Vec<ScheduleSlot>,
    /// 软约束提示（不阻断）
    pub soft_violations: Vec<Violation>,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationOutcome {
    pub surgery_id: String,
    pub previous: Priority,
    pub current: Priority,
    pub wait_hours: i64,
}

/// 取消/改期释放结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub surgery_id: String,
    pub status: SurgeryStatus,
    pub released_slots: usize,
}

/// 定时刷新结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRefreshReport {
    pub snapshot: QueueSnapshot,
    /// 本轮新出现的升级候选（已通知）
    pub newly_flagged: Vec<String>,
}

/// 锁内读取的一致快照
struct PlacementContext {
    surgery: Surgery,
    rooms: Vec<OperatingRoom>,
    /// 已排除本手术自身时段
    slots: Vec<ScheduleSlot>,
    revisions: Vec<RoomRevision>,
    surgeon: Option<Staff>,
    equipment: Vec<Equipment>,
}

// ==========================================
// SchedulingOrchestrator - 排程编排器
// ==========================================

pub struct SchedulingOrchestrator {
    repo: Arc<dyn ScheduleRepository>,
    config: SchedulingConfig,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    notifier: OptionalNotificationSink,
    locks: ResourceLockRegistry,

    // ===== 引擎 =====
    engine: ConstraintEngine,
    allocator: SlotAllocator,
    queue: PriorityQueueEngine,
    duration: DurationPredictor,
    scorer: ScheduleScorer,

    // ===== 队列缓存 =====
    latest_queue: RwLock<Option<QueueSnapshot>>,
    flagged: Mutex<HashSet<String>>,
}

impl SchedulingOrchestrator {
    /// 创建编排器（默认全部放行 + 系统时钟 + 无通知）
    pub fn new(repo: Arc<dyn ScheduleRepository>, config: SchedulingConfig) -> Self {
        Self {
            engine: ConstraintEngine::new(&config)
                .with_turnover(config.setup_minutes, config.cleanup_minutes),
            allocator: SlotAllocator::new(&config),
            queue: PriorityQueueEngine::new(&config),
            duration: DurationPredictor::new(),
            scorer: ScheduleScorer::from_config(&config),
            repo,
            config,
            authorizer: Arc::new(AllowAll),
            clock: Arc::new(SystemClock),
            notifier: OptionalNotificationSink::none(),
            locks: ResourceLockRegistry::new(),
            latest_queue: RwLock::new(None),
            flagged: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: OptionalNotificationSink) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    pub fn facility_id(&self) -> &str {
        &self.config.facility_id
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // ==========================================
    // 放置
    // ==========================================

    /// 将手术放置到指定手术室/时间窗
    ///
    /// 流程:
    /// 1) 授权 + 输入校验
    /// 2) 锁定 {手术, 主刀医生, 原手术室, 目标手术室}
    /// 3) 锁内重新读取（先读版本号，再读时段）
    /// 4) 含周转的约束复核（排除自身旧时段）
    /// 5) 原子提交: 比较状态与版本号 + 删除旧时段 + 插入 3 个新时段 + status=scheduled
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn place(
        &self,
        actor: &Actor,
        surgery_id: &str,
        room_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ScheduleResult<PlacementOutcome> {
        self.authorize(actor, Action::Place, Some(surgery_id))?;
        if start >= end {
            return Err(ScheduleError::validation(
                "end",
                format!("结束时间必须晚于开始时间: {} >= {}", start, end),
            ));
        }
        let window = TimeWindow::new(start, end);

        let current = self.fetch_surgery(surgery_id).await?;
        ensure_valid_fields(&current)?;
        ensure_placeable(&current)?;

        let lock_rooms = lock_set(current.room_id.as_deref(), [room_id]);
        let guard = self
            .locks
            .acquire(&placement_keys(&current, &lock_rooms))
            .await;
        debug!(keys = ?guard.keys(), "已获取放置锁");

        let ctx = self
            .load_context(surgery_id, &lock_rooms, self.snapshot_range(window))
            .await?;
        ensure_unmoved(&current, &ctx.surgery)?;
        ensure_placeable(&ctx.surgery)?;

        let room = ctx
            .rooms
            .iter()
            .find(|r| r.room_id == room_id)
            .ok_or_else(|| ScheduleError::not_found("OperatingRoom", room_id))?;

        self.commit_locked(actor, &ctx, room, window).await
    }

    /// 自动放置: 分配器寻找首个可行位置后提交
    ///
    /// # 参数
    /// - `date`: 目标日期（None 为今天）；今天则不早于当前时刻
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn auto_place(
        &self,
        actor: &Actor,
        surgery_id: &str,
        date: Option<NaiveDate>,
    ) -> ScheduleResult<PlacementOutcome> {
        self.authorize(actor, Action::AutoPlace, Some(surgery_id))?;

        let now = self.clock.now();
        let date = date.unwrap_or_else(|| now.date());
        if date < now.date() {
            return Err(ScheduleError::validation(
                "date",
                format!("不能排到过去的日期: {}", date),
            ));
        }

        let current = self.fetch_surgery(surgery_id).await?;
        ensure_valid_fields(&current)?;
        ensure_placeable(&current)?;
        if current.planned_duration_min() == 0 {
            return Err(ScheduleError::validation(
                "estimated_duration_min",
                "手术时长缺失，无法自动排程",
            ));
        }

        // 候选手术室全部加锁，分配与提交之间不会被抢占
        let facility = self.facility_id().to_string();
        let rooms = self
            .with_repo("list_rooms", move |repo| repo.list_rooms(&facility))
            .await?;
        let required = current.required_specialization.as_deref();
        let candidates: Vec<&str> = rooms
            .iter()
            .filter(|r| r.status.accepts_placements() && r.supports(required))
            .map(|r| r.room_id.as_str())
            .collect();
        if candidates.is_empty() {
            info!(surgery_id, "无能力匹配的可用手术室");
            return Err(ScheduleError::NoFeasibleSlot {
                surgery_id: surgery_id.to_string(),
                date,
            });
        }

        let lock_rooms = lock_set(current.room_id.as_deref(), candidates);
        let guard = self
            .locks
            .acquire(&placement_keys(&current, &lock_rooms))
            .await;
        debug!(keys = ?guard.keys(), "已获取候选手术室锁");

        let day = self.config.day_window(date);
        let ctx = self
            .load_context(surgery_id, &lock_rooms, self.snapshot_range(day))
            .await?;
        ensure_unmoved(&current, &ctx.surgery)?;
        ensure_placeable(&ctx.surgery)?;

        // 只在已加锁的手术室内分配
        let locked_rooms: Vec<OperatingRoom> = ctx
            .rooms
            .iter()
            .filter(|r| lock_rooms.contains(&r.room_id))
            .cloned()
            .collect();
        let not_before = (date == now.date()).then_some(now);

        let proposal = self
            .allocator
            .find_slot(&SlotSearch {
                surgery: &ctx.surgery,
                rooms: &locked_rooms,
                existing_slots: &ctx.slots,
                date,
                not_before,
                surgeon: ctx.surgeon.as_ref(),
                equipment: &ctx.equipment,
            })
            .ok_or_else(|| ScheduleError::NoFeasibleSlot {
                surgery_id: surgery_id.to_string(),
                date,
            })?;

        let room = locked_rooms
            .iter()
            .find(|r| r.room_id == proposal.room_id)
            .ok_or_else(|| ScheduleError::not_found("OperatingRoom", &proposal.room_id))?;

        self.commit_locked(actor, &ctx, room, proposal.window()).await
    }

    /// 批量自动放置（并发执行，冲突由手术室/医生锁串行化）
    pub async fn auto_place_many(
        &self,
        actor: &Actor,
        surgery_ids: &[String],
        date: Option<NaiveDate>,
    ) -> Vec<(String, ScheduleResult<PlacementOutcome>)> {
        let tasks = surgery_ids.iter().map(|id| async move {
            let result = self.auto_place(actor, id, date).await;
            (id.clone(), result)
        });
        let results = join_all(tasks).await;

        let placed = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            total = results.len(),
            placed,
            failed = results.len() - placed,
            "批量自动排程完成"
        );
        results
    }

    /// 锁内复核并提交（调用方须已持有 placement_keys 给出的全部锁）
    async fn commit_locked(
        &self,
        actor: &Actor,
        ctx: &PlacementContext,
        room: &OperatingRoom,
        window: TimeWindow,
    ) -> ScheduleResult<PlacementOutcome> {
        let surgery = &ctx.surgery;
        let check = self.engine.check_placement(&PlacementRequest {
            surgery,
            room,
            window,
            existing_slots: &ctx.slots,
            surgeon: ctx.surgeon.as_ref(),
            equipment: &ctx.equipment,
        });

        if check.conflict {
            let rules = check.hard_rule_names();
            info!(
                surgery_id = %surgery.surgery_id,
                room_id = %room.room_id,
                rules = ?rules,
                "放置违反硬约束"
            );
            return Err(ScheduleError::ConstraintViolation {
                rules,
                violations: check.hard_violations,
            });
        }

        let slots = build_placement_slots(
            self.facility_id(),
            &room.room_id,
            &surgery.surgery_id,
            surgery.surgeon_id.as_deref(),
            window,
            self.config.setup_minutes,
            self.config.cleanup_minutes,
        );
        let commit = PlacementCommit {
            surgery_id: surgery.surgery_id.clone(),
            room_id: room.room_id.clone(),
            surgeon_id: surgery.surgeon_id.clone(),
            scheduled_start: window.start,
            scheduled_end: window.end,
            slots: slots.clone(),
            expected_status: surgery.status,
            expected_revisions: ctx.revisions.clone(),
            committed_at: self.clock.now(),
        };

        let facility = self.facility_id().to_string();
        self.with_repo("commit_placement", move |repo| {
            repo.commit_placement(&facility, commit)
        })
        .await?;

        info!(
            surgery_id = %surgery.surgery_id,
            room_id = %room.room_id,
            start = %window.start,
            end = %window.end,
            score = check.score,
            soft = check.soft_violations.len(),
            "手术已放置"
        );

        self.emit(
            &surgery.surgery_id,
            ScheduleEventType::SurgeryPlaced,
            format!(
                "手术 {} 已排入 {} ({} - {})",
                surgery.surgery_id,
                room.room_id,
                window.start.format("%Y-%m-%d %H:%M"),
                window.end.format("%H:%M")
            ),
            Some(actor),
        );

        Ok(PlacementOutcome {
            surgery_id: surgery.surgery_id.clone(),
            room_id: room.room_id.clone(),
            start: window.start,
            end: window.end,
            slots,
            soft_violations: check.soft_violations,
            score: check.score,
        })
    }

    // ==========================================
    // 升级 / 队列
    // ==========================================

    /// 优先级升一级（elective -> urgent -> emergency）
    ///
    /// 单行比较并更新；不占用任何时段
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn escalate(&self, actor: &Actor, surgery_id: &str) -> ScheduleResult<EscalationOutcome> {
        self.authorize(actor, Action::Escalate, Some(surgery_id))?;

        let surgery = self.fetch_surgery(surgery_id).await?;
        if !surgery.status.is_active() {
            return Err(ScheduleError::validation(
                "status",
                format!("手术已结束，不能升级: {}", surgery.status),
            ));
        }
        let previous = surgery.priority;
        let current = previous.escalated().ok_or_else(|| {
            ScheduleError::validation("priority", "急诊已是最高优先级")
        })?;

        let now = self.clock.now();
        let facility = self.facility_id().to_string();
        let id = surgery_id.to_string();
        self.with_repo("update_surgery_priority", move |repo| {
            repo.update_surgery_priority(&facility, &id, previous, current, now)
        })
        .await?;

        self.forget_flag(surgery_id);
        let snapshot = self.recompute_queue(now).await?;
        let wait_hours = snapshot
            .find(surgery_id)
            .map(|e| e.wait_hours)
            .unwrap_or_else(|| (now - surgery.created_at).num_hours());

        info!(surgery_id, %previous, %current, wait_hours, "手术优先级已升级");
        self.emit(
            surgery_id,
            ScheduleEventType::SurgeryEscalated,
            format!("手术 {} 优先级 {} -> {}", surgery_id, previous, current),
            Some(actor),
        );

        Ok(EscalationOutcome {
            surgery_id: surgery_id.to_string(),
            previous,
            current,
            wait_hours,
        })
    }

    /// 查看当前队列（重新计算）
    pub async fn queue_snapshot(&self, actor: &Actor) -> ScheduleResult<QueueSnapshot> {
        self.authorize(actor, Action::ViewQueue, None)?;
        self.recompute_queue(self.clock.now()).await
    }

    /// 最近一次计算的队列（未计算过为 None）
    pub async fn latest_queue(&self) -> Option<QueueSnapshot> {
        self.latest_queue.read().await.clone()
    }

    /// 定时刷新: 重算三级队列，仅对新出现的升级候选发送通知
    ///
    /// 幂等，可由定时器反复调用
    #[instrument(skip(self))]
    pub async fn refresh_queue(&self) -> ScheduleResult<QueueRefreshReport> {
        let now = self.clock.now();
        let snapshot = self.recompute_queue(now).await?;

        let candidates: Vec<(String, i64)> = snapshot
            .escalation_candidates()
            .into_iter()
            .map(|e| (e.surgery_id.clone(), e.wait_hours))
            .collect();

        let newly_flagged: Vec<(String, i64)> = {
            let mut flagged = match self.flagged.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let fresh = candidates
                .iter()
                .filter(|(id, _)| !flagged.contains(id))
                .cloned()
                .collect();
            *flagged = candidates.iter().map(|(id, _)| id.clone()).collect();
            fresh
        };

        for (surgery_id, wait_hours) in &newly_flagged {
            self.emit(
                surgery_id,
                ScheduleEventType::EscalationCandidate,
                format!("手术 {} 已等待 {} 小时，建议升级", surgery_id, wait_hours),
                None,
            );
        }

        info!(
            queued = snapshot.len(),
            candidates = candidates.len(),
            newly_flagged = newly_flagged.len(),
            "队列刷新完成"
        );

        Ok(QueueRefreshReport {
            snapshot,
            newly_flagged: newly_flagged.into_iter().map(|(id, _)| id).collect(),
        })
    }

    async fn recompute_queue(&self, now: NaiveDateTime) -> ScheduleResult<QueueSnapshot> {
        let facility = self.facility_id().to_string();
        let surgeries = self
            .with_repo("list_active_surgeries", move |repo| {
                repo.list_active_surgeries(&facility)
            })
            .await?;

        let snapshot = self.queue.build(&surgeries, now);
        *self.latest_queue.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn forget_flag(&self, surgery_id: &str) {
        let mut flagged = match self.flagged.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        flagged.remove(surgery_id);
    }

    // ==========================================
    // 生命周期
    // ==========================================

    /// 审批通过: pending -> approved
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn approve(&self, actor: &Actor, surgery_id: &str) -> ScheduleResult<Surgery> {
        self.authorize(actor, Action::Approve, Some(surgery_id))?;
        let _guard = self.locks.acquire(&[LockKey::surgery(surgery_id)]).await;
        let surgery = self.fetch_surgery(surgery_id).await?;
        ensure_transition(&surgery, SurgeryStatus::Approved)?;

        let updated = self
            .write_status(&surgery, SurgeryStatus::Approved, Some(ApprovalStatus::Approved))
            .await?;
        self.emit(
            surgery_id,
            ScheduleEventType::SurgeryApproved,
            format!("手术 {} 审批通过", surgery_id),
            Some(actor),
        );
        Ok(updated)
    }

    /// 审批驳回: 仅 pending 可驳回，驳回后 status=cancelled
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn reject(&self, actor: &Actor, surgery_id: &str, reason: &str) -> ScheduleResult<Surgery> {
        self.authorize(actor, Action::Reject, Some(surgery_id))?;
        let _guard = self.locks.acquire(&[LockKey::surgery(surgery_id)]).await;
        let surgery = self.fetch_surgery(surgery_id).await?;
        if surgery.status != SurgeryStatus::Pending {
            return Err(ScheduleError::InvalidStateTransition {
                surgery_id: surgery_id.to_string(),
                from: surgery.status,
                to: SurgeryStatus::Cancelled,
            });
        }

        let updated = self
            .write_status(&surgery, SurgeryStatus::Cancelled, Some(ApprovalStatus::Rejected))
            .await?;
        self.emit(
            surgery_id,
            ScheduleEventType::SurgeryRejected,
            format!("手术 {} 审批驳回: {}", surgery_id, reason),
            Some(actor),
        );
        Ok(updated)
    }

    /// 开始手术: scheduled -> in_progress
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn start(&self, actor: &Actor, surgery_id: &str) -> ScheduleResult<Surgery> {
        self.authorize(actor, Action::Start, Some(surgery_id))?;
        let _guard = self.locks.acquire(&[LockKey::surgery(surgery_id)]).await;
        let surgery = self.fetch_surgery(surgery_id).await?;
        ensure_transition(&surgery, SurgeryStatus::InProgress)?;
        self.write_status(&surgery, SurgeryStatus::InProgress, None).await
    }

    /// 完成手术: in_progress -> completed（时段保留作为历史）
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn complete(&self, actor: &Actor, surgery_id: &str) -> ScheduleResult<Surgery> {
        self.authorize(actor, Action::Complete, Some(surgery_id))?;
        let _guard = self.locks.acquire(&[LockKey::surgery(surgery_id)]).await;
        let surgery = self.fetch_surgery(surgery_id).await?;
        ensure_transition(&surgery, SurgeryStatus::Completed)?;
        self.write_status(&surgery, SurgeryStatus::Completed, None).await
    }

    /// 取消: 释放全部时段，status=cancelled
    pub async fn cancel(&self, actor: &Actor, surgery_id: &str) -> ScheduleResult<ReleaseOutcome> {
        self.release(actor, Action::Cancel, surgery_id, SurgeryStatus::Cancelled)
            .await
    }

    /// 待改期: 释放全部时段，status=rescheduled（可再次放置）
    pub async fn mark_rescheduled(
        &self,
        actor: &Actor,
        surgery_id: &str,
    ) -> ScheduleResult<ReleaseOutcome> {
        self.release(actor, Action::Reschedule, surgery_id, SurgeryStatus::Rescheduled)
            .await
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    async fn release(
        &self,
        actor: &Actor,
        action: Action,
        surgery_id: &str,
        status: SurgeryStatus,
    ) -> ScheduleResult<ReleaseOutcome> {
        self.authorize(actor, action, Some(surgery_id))?;

        // 两阶段加锁: 先手术锁（读取状态与所在手术室），再手术室锁
        // 手术锁 < 手术室锁，两阶段仍满足全序
        let _surgery_guard = self.locks.acquire(&[LockKey::surgery(surgery_id)]).await;
        let surgery = self.fetch_surgery(surgery_id).await?;
        ensure_transition(&surgery, status)?;

        let rooms = self.rooms_of(surgery_id).await?;
        let lock_rooms = lock_set(surgery.room_id.as_deref(), rooms.iter().map(String::as_str));
        let room_keys: Vec<LockKey> = lock_rooms.iter().map(|r| LockKey::room(r)).collect();
        let _room_guard = self.locks.acquire(&room_keys).await;

        // 锁内重读: 时段所在手术室若已变化，交由调用方重试
        let facility = self.facility_id().to_string();
        let id = surgery_id.to_string();
        let locked = lock_rooms.clone();
        let expected_status = surgery.status;
        let now = self.clock.now();
        let released = self
            .with_repo("release_surgery_slots", move |repo| {
                let mut revisions = Vec::with_capacity(locked.len());
                for room_id in &locked {
                    revisions.push(RoomRevision {
                        room_id: room_id.clone(),
                        revision: repo.room_revision(&facility, room_id)?,
                    });
                }
                let moved = repo
                    .list_slots_for_surgery(&facility, &id)?
                    .iter()
                    .any(|s| !locked.contains(&s.room_id));
                if moved {
                    return Err(RepositoryError::ConcurrentUpdate {
                        entity: "Surgery".to_string(),
                        id: id.clone(),
                        message: "时段所在手术室在加锁期间发生变化".to_string(),
                    });
                }
                repo.release_surgery_slots(&facility, &id, expected_status, status, &revisions, now)
            })
            .await?;

        let event_type = match status {
            SurgeryStatus::Cancelled => ScheduleEventType::SurgeryCancelled,
            _ => ScheduleEventType::SurgeryRescheduled,
        };
        info!(surgery_id, %status, released, "手术时段已释放");
        self.emit(
            surgery_id,
            event_type,
            format!("手术 {} 状态 -> {}，释放 {} 个时段", surgery_id, status, released),
            Some(actor),
        );

        Ok(ReleaseOutcome {
            surgery_id: surgery_id.to_string(),
            status,
            released_slots: released,
        })
    }

    // ==========================================
    // 预测 / 评分
    // ==========================================

    /// 重新预测手术时长并写回 predicted_duration
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn refresh_prediction(
        &self,
        actor: &Actor,
        surgery_id: &str,
    ) -> ScheduleResult<DurationPrediction> {
        self.authorize(actor, Action::RefreshPrediction, Some(surgery_id))?;
        let surgery = self.fetch_surgery(surgery_id).await?;

        let prediction = self
            .duration
            .predict(&DurationFeatures::from_surgery(&surgery, surgery.scheduled_start));

        let facility = self.facility_id().to_string();
        let id = surgery_id.to_string();
        let minutes = prediction.predicted_min;
        let now = self.clock.now();
        self.with_repo("update_predicted_duration", move |repo| {
            repo.update_predicted_duration(&facility, &id, minutes, now)
        })
        .await?;

        debug!(surgery_id, predicted_min = minutes, "预测时长已更新");
        Ok(prediction)
    }

    /// 某日全院排程质量评分（使用真实手术复杂度）
    #[instrument(skip(self))]
    pub async fn score_day(&self, date: NaiveDate) -> ScheduleResult<ScheduleQualityReport> {
        let facility = self.facility_id().to_string();
        let start = date.and_time(chrono::NaiveTime::MIN);
        let range = TimeWindow::new(start, start + Duration::days(1));

        let (slots, complexity) = self
            .with_repo("score_day", move |repo| {
                let slots = repo.list_slots_in_range(&facility, range)?;
                let mut complexity: HashMap<String, u8> = HashMap::new();
                for slot in &slots {
                    if complexity.contains_key(&slot.surgery_id) {
                        continue;
                    }
                    if let Some(s) = repo.find_surgery(&facility, &slot.surgery_id)? {
                        complexity.insert(slot.surgery_id.clone(), s.procedure.complexity);
                    }
                }
                Ok((slots, complexity))
            })
            .await?;

        Ok(self.scorer.score(&slots, &complexity))
    }

    // ==========================================
    // 内部工具
    // ==========================================

    fn authorize(&self, actor: &Actor, action: Action, surgery_id: Option<&str>) -> ScheduleResult<()> {
        self.authorizer
            .authorize(actor, action, surgery_id)
            .map_err(|reason| {
                warn!(
                    user_id = %actor.user_id,
                    action = action.as_str(),
                    reason = %reason,
                    "操作未授权"
                );
                ScheduleError::Unauthorized {
                    user_id: actor.user_id.clone(),
                    action: action.as_str().to_string(),
                    reason,
                }
            })
    }

    /// 在阻塞线程上执行仓储调用，并施加超时上限
    async fn with_repo<T, F>(&self, operation: &'static str, f: F) -> ScheduleResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ScheduleRepository) -> RepositoryResult<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        let timeout = self.config.persistence_timeout();
        let task = tokio::task::spawn_blocking(move || f(repo.as_ref()));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result.map_err(ScheduleError::from),
            Ok(Err(join_err)) => Err(ScheduleError::Internal(format!(
                "仓储任务异常退出 ({}): {}",
                operation, join_err
            ))),
            Err(_) => {
                warn!(operation, timeout_ms = self.config.persistence_timeout_ms, "持久化调用超时");
                Err(ScheduleError::PersistenceTimeout {
                    operation,
                    timeout_ms: self.config.persistence_timeout_ms,
                })
            }
        }
    }

    async fn fetch_surgery(&self, surgery_id: &str) -> ScheduleResult<Surgery> {
        let facility = self.facility_id().to_string();
        let id = surgery_id.to_string();
        self.with_repo("find_surgery", move |repo| repo.find_surgery(&facility, &id))
            .await?
            .ok_or_else(|| ScheduleError::not_found("Surgery", surgery_id))
    }

    async fn rooms_of(&self, surgery_id: &str) -> ScheduleResult<Vec<String>> {
        let facility = self.facility_id().to_string();
        let id = surgery_id.to_string();
        let slots = self
            .with_repo("list_slots_for_surgery", move |repo| {
                repo.list_slots_for_surgery(&facility, &id)
            })
            .await?;
        Ok(slots.into_iter().map(|s| s.room_id).collect())
    }

    /// 以读取时的状态为期望值写入新状态
    async fn write_status(
        &self,
        current: &Surgery,
        status: SurgeryStatus,
        approval: Option<ApprovalStatus>,
    ) -> ScheduleResult<Surgery> {
        let surgery_id = current.surgery_id.as_str();
        let facility = self.facility_id().to_string();
        let id = surgery_id.to_string();
        let expected = current.status;
        let now = self.clock.now();
        let updated = self
            .with_repo("update_surgery_status", move |repo| {
                repo.update_surgery_status(&facility, &id, expected, status, approval, now)?;
                repo.find_surgery(&facility, &id)?
                    .ok_or_else(|| RepositoryError::not_found("Surgery", &id))
            })
            .await?;

        info!(surgery_id, %status, "手术状态已更新");
        Ok(updated)
    }

    /// 锁内读取放置所需快照
    ///
    /// 版本号先于时段读取: 之后任何提交都会使版本号失配
    async fn load_context(
        &self,
        surgery_id: &str,
        lock_rooms: &[String],
        range: TimeWindow,
    ) -> ScheduleResult<PlacementContext> {
        let facility = self.facility_id().to_string();
        let id = surgery_id.to_string();
        let rooms_to_check = lock_rooms.to_vec();

        self.with_repo("load_placement_context", move |repo| {
            let mut revisions = Vec::with_capacity(rooms_to_check.len());
            for room_id in &rooms_to_check {
                revisions.push(RoomRevision {
                    room_id: room_id.clone(),
                    revision: repo.room_revision(&facility, room_id)?,
                });
            }

            let surgery = repo
                .find_surgery(&facility, &id)?
                .ok_or_else(|| RepositoryError::not_found("Surgery", &id))?;
            let slots: Vec<ScheduleSlot> = repo
                .list_slots_in_range(&facility, range)?
                .into_iter()
                .filter(|s| s.surgery_id != id)
                .collect();
            let rooms = repo.list_rooms(&facility)?;
            let surgeon = match surgery.surgeon_id.as_deref() {
                Some(staff_id) => Some(
                    repo.find_staff(&facility, staff_id)?
                        .ok_or_else(|| RepositoryError::not_found("Staff", staff_id))?,
                ),
                None => None,
            };
            let equipment = repo.list_equipment(&facility)?;

            Ok(PlacementContext {
                surgery,
                rooms,
                slots,
                revisions,
                surgeon,
                equipment,
            })
        })
        .await
    }

    /// 约束复核需要的时段读取范围
    ///
    /// 覆盖: 含周转的占用窗口 + 医生滚动工时窗口
    /// （任何包含新手术某一时刻的 N 小时窗口，都落在 [start - N, end + N] 内）
    fn snapshot_range(&self, window: TimeWindow) -> TimeWindow {
        let occupied = window.padded(self.config.setup_minutes, self.config.cleanup_minutes);
        let hours = Duration::hours(self.config.surgeon_hours_window_hours);

        TimeWindow::new(
            occupied.start.min(window.start - hours),
            occupied.end.max(window.end + hours),
        )
    }

    fn emit(
        &self,
        surgery_id: &str,
        event_type: ScheduleEventType,
        message: String,
        actor: Option<&Actor>,
    ) {
        let event = ScheduleEvent::new(
            self.facility_id(),
            surgery_id,
            event_type,
            message,
            actor.map(|a| a.user_id.as_str()),
            self.clock.now(),
        );
        self.notifier.notify(event);
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 放置需要的全部锁键: 手术 + 主刀医生（若有） + 手术室
fn placement_keys(surgery: &Surgery, rooms: &[String]) -> Vec<LockKey> {
    let mut keys = vec![LockKey::surgery(&surgery.surgery_id)];
    if let Some(surgeon_id) = surgery.surgeon_id.as_deref() {
        keys.push(LockKey::surgeon(surgeon_id));
    }
    keys.extend(rooms.iter().map(|r| LockKey::room(r)));
    keys
}

/// 需要加锁的手术室集合（升序去重）
fn lock_set<'a>(current: Option<&'a str>, rooms: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut ids: Vec<String> = current
        .into_iter()
        .chain(rooms)
        .map(|r| r.to_string())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// 仓储中的手术字段可能绕过 API 写入，放置前再检查一次
fn ensure_valid_fields(surgery: &Surgery) -> ScheduleResult<()> {
    match surgery.range_error() {
        Some((field, message)) => Err(ScheduleError::validation(field, message)),
        None => Ok(()),
    }
}

fn ensure_placeable(surgery: &Surgery) -> ScheduleResult<()> {
    if surgery.approval_status == ApprovalStatus::Rejected {
        return Err(ScheduleError::validation(
            "approval_status",
            format!("手术 {} 审批已驳回", surgery.surgery_id),
        ));
    }
    if !surgery.status.is_placeable() {
        return Err(ScheduleError::InvalidStateTransition {
            surgery_id: surgery.surgery_id.clone(),
            from: surgery.status,
            to: SurgeryStatus::Scheduled,
        });
    }
    Ok(())
}

fn ensure_transition(surgery: &Surgery, to: SurgeryStatus) -> ScheduleResult<()> {
    if surgery.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(ScheduleError::InvalidStateTransition {
            surgery_id: surgery.surgery_id.clone(),
            from: surgery.status,
            to,
        })
    }
}

/// 加锁前后手术所在手术室或主刀医生不一致 -> 锁集合不完整，交由调用方重试
fn ensure_unmoved(before: &Surgery, after: &Surgery) -> ScheduleResult<()> {
    if before.room_id != after.room_id {
        return Err(ScheduleError::ConcurrentModification(format!(
            "手术 {} 在加锁期间被移动: {:?} -> {:?}",
            after.surgery_id, before.room_id, after.room_id
        )));
    }
    if before.surgeon_id != after.surgeon_id {
        return Err(ScheduleError::ConcurrentModification(format!(
            "手术 {} 在加锁期间更换主刀医生: {:?} -> {:?}",
            after.surgery_id, before.surgeon_id, after.surgeon_id
        )));
    }
    Ok(())
}
