// ==========================================
// 手术室排程系统 - 排程 API
// ==========================================
// 职责: 对外暴露全部排程操作
// 红线: 输入校验先于任何约束检查
// 红线: 约束违反原样带出规则名,不自动修正
// ==========================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::validator;
use crate::domain::slot::ScheduleSlot;
use crate::domain::surgery::Surgery;
use crate::domain::types::EquipmentType;
use crate::engine::allocator::{SlotAllocator, SlotProposal, SlotSearch};
use crate::engine::auth::Actor;
use crate::engine::constraint::{ConstraintEngine, PlacementCheck, PlacementRequest};
use crate::engine::orchestrator::{
    EscalationOutcome, PlacementOutcome, QueueRefreshReport, ReleaseOutcome,
    SchedulingOrchestrator,
};
use crate::engine::predictor::{
    DurationFeatures, DurationPrediction, DurationPredictor, EquipmentFailurePrediction,
    EquipmentFailurePredictor, ScheduleQualityReport, ScheduleScorer, SequenceRecommender,
};
use crate::engine::priority_queue::QueueSnapshot;

// ==========================================
// SchedulingApi - 排程 API
// ==========================================

/// 排程API
///
/// 职责：
/// 1. 纯计算: 放置检查 / 时段查找 / 预测 / 评分 / 序列推荐
/// 2. 写操作: 放置 / 自动放置 / 升级 / 生命周期（经编排器）
pub struct SchedulingApi {
    orchestrator: Arc<SchedulingOrchestrator>,
    engine: ConstraintEngine,
    allocator: SlotAllocator,
    duration: DurationPredictor,
    equipment: EquipmentFailurePredictor,
    scorer: ScheduleScorer,
    sequence: SequenceRecommender,
}

impl SchedulingApi {
    pub fn new(orchestrator: Arc<SchedulingOrchestrator>) -> Self {
        let config = orchestrator.config().clone();
        Self {
            engine: ConstraintEngine::new(&config),
            allocator: SlotAllocator::new(&config),
            duration: DurationPredictor::new(),
            equipment: EquipmentFailurePredictor::new(),
            scorer: ScheduleScorer::from_config(&config),
            sequence: SequenceRecommender::new(),
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SchedulingOrchestrator> {
        &self.orchestrator
    }

    // ==========================================
    // 纯计算（同步，基于调用方快照）
    // ==========================================

    /// 检查一次候选放置（按字面时间窗，不含周转）
    ///
    /// # 返回
    /// - Ok(PlacementCheck): 硬/软违规 + 评分（conflict=true 不是错误）
    /// - Err(ApiError::InvalidInput): 输入非法
    pub fn check_placement(&self, request: &PlacementRequest<'_>) -> ApiResult<PlacementCheck> {
        validator::validate_surgery(request.surgery)?;
        validator::validate_id("room_id", &request.room.room_id)?;
        validator::validate_window(request.window.start, request.window.end)?;
        validator::validate_slots(request.existing_slots)?;

        let check = self.engine.check_placement(request);
        debug!(
            surgery_id = %request.surgery.surgery_id,
            room_id = %request.room.room_id,
            conflict = check.conflict,
            score = check.score,
            "放置检查完成"
        );
        Ok(check)
    }

    /// 查找首个可用时段
    ///
    /// # 返回
    /// - Ok(Some(SlotProposal)): 首个可行位置
    /// - Ok(None): 当日无可行位置
    pub fn find_slot(&self, search: &SlotSearch<'_>) -> ApiResult<Option<SlotProposal>> {
        validator::validate_surgery(search.surgery)?;
        validator::validate_slots(search.existing_slots)?;
        Ok(self.allocator.find_slot(search))
    }

    pub fn predict_duration(&self, features: &DurationFeatures) -> DurationPrediction {
        self.duration.predict(features)
    }

    /// 预测手术时长（从手术申请抽取特征）
    pub fn predict_duration_for(
        &self,
        surgery: &Surgery,
        planned_start: Option<NaiveDateTime>,
    ) -> DurationPrediction {
        self.duration
            .predict(&DurationFeatures::from_surgery(surgery, planned_start))
    }

    pub fn predict_equipment_failure(
        &self,
        usage_count: u32,
        max_usage: u32,
        days_since_service: f64,
        equipment_type: EquipmentType,
    ) -> EquipmentFailurePrediction {
        self.equipment
            .predict(usage_count, max_usage, days_since_service, equipment_type)
    }

    /// 对一组时段评分
    ///
    /// # 参数
    /// - slots: 时段快照（可跨手术室）
    /// - complexity_by_surgery: surgery_id -> 复杂度（缺失按 3）
    pub fn score_schedule(
        &self,
        slots: &[ScheduleSlot],
        complexity_by_surgery: &HashMap<String, u8>,
    ) -> ApiResult<ScheduleQualityReport> {
        validator::validate_slots(slots)?;
        Ok(self.scorer.score(slots, complexity_by_surgery))
    }

    /// 推荐手术顺序（返回 surgery_id 序列）
    pub fn recommend_sequence(&self, surgeries: &[Surgery]) -> Vec<String> {
        self.sequence.recommend(surgeries)
    }

    // ==========================================
    // 写操作（经编排器，按手术室串行化）
    // ==========================================

    pub async fn place(
        &self,
        actor: &Actor,
        surgery_id: &str,
        room_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ApiResult<PlacementOutcome> {
        validator::validate_id("surgery_id", surgery_id)?;
        validator::validate_id("room_id", room_id)?;
        validator::validate_window(start, end)?;

        Ok(self
            .orchestrator
            .place(actor, surgery_id, room_id, start, end)
            .await?)
    }

    pub async fn auto_place(
        &self,
        actor: &Actor,
        surgery_id: &str,
        date: Option<NaiveDate>,
    ) -> ApiResult<PlacementOutcome> {
        validator::validate_id("surgery_id", surgery_id)?;
        if let Some(date) = date {
            validator::validate_date(date, self.orchestrator.now().date())?;
        }

        Ok(self.orchestrator.auto_place(actor, surgery_id, date).await?)
    }

    /// 批量自动放置
    ///
    /// # 返回
    /// - Ok(Vec<(surgery_id, 单台结果)>): 输入顺序，单台失败不影响其它
    /// - Err(ApiError::InvalidInput): id 列表非法（整体拒绝）
    pub async fn auto_place_many(
        &self,
        actor: &Actor,
        surgery_ids: &[String],
        date: Option<NaiveDate>,
    ) -> ApiResult<Vec<(String, ApiResult<PlacementOutcome>)>> {
        validator::validate_id_list("surgery_ids", surgery_ids)?;
        if let Some(date) = date {
            validator::validate_date(date, self.orchestrator.now().date())?;
        }

        let results = self
            .orchestrator
            .auto_place_many(actor, surgery_ids, date)
            .await;
        Ok(results
            .into_iter()
            .map(|(id, r)| (id, r.map_err(ApiError::from)))
            .collect())
    }

    pub async fn escalate(&self, actor: &Actor, surgery_id: &str) -> ApiResult<EscalationOutcome> {
        validator::validate_id("surgery_id", surgery_id)?;
        Ok(self.orchestrator.escalate(actor, surgery_id).await?)
    }

    pub async fn approve(&self, actor: &Actor, surgery_id: &str) -> ApiResult<Surgery> {
        validator::validate_id("surgery_id", surgery_id)?;
        Ok(self.orchestrator.approve(actor, surgery_id).await?)
    }

    pub async fn reject(&self, actor: &Actor, surgery_id: &str, reason: &str) -> ApiResult<Surgery> {
        validator::validate_id("surgery_id", surgery_id)?;
        if reason.trim().is_empty() {
            return Err(ApiError::invalid("reason", "驳回原因不能为空"));
        }
        Ok(self.orchestrator.reject(actor, surgery_id, reason).await?)
    }

    pub async fn start(&self, actor: &Actor, surgery_id: &str) -> ApiResult<Surgery> {
        validator::validate_id("surgery_id", surgery_id)?;
        Ok(self.orchestrator.start(actor, surgery_id).await?)
    }

    pub async fn complete(&self, actor: &Actor, surgery_id: &str) -> ApiResult<Surgery> {
        validator::validate_id("surgery_id", surgery_id)?;
        Ok(self.orchestrator.complete(actor, surgery_id).await?)
    }

    pub async fn cancel(&self, actor: &Actor, surgery_id: &str) -> ApiResult<ReleaseOutcome> {
        validator::validate_id("surgery_id", surgery_id)?;
        Ok(self.orchestrator.cancel(actor, surgery_id).await?)
    }

    pub async fn mark_rescheduled(&self, actor: &Actor, surgery_id: &str) -> ApiResult<ReleaseOutcome> {
        validator::validate_id("surgery_id", surgery_id)?;
        Ok(self.orchestrator.mark_rescheduled(actor, surgery_id).await?)
    }

    pub async fn refresh_prediction(
        &self,
        actor: &Actor,
        surgery_id: &str,
    ) -> ApiResult<DurationPrediction> {
        validator::validate_id("surgery_id", surgery_id)?;
        Ok(self.orchestrator.refresh_prediction(actor, surgery_id).await?)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub async fn queue(&self, actor: &Actor) -> ApiResult<QueueSnapshot> {
        Ok(self.orchestrator.queue_snapshot(actor).await?)
    }

    pub async fn refresh_queue(&self) -> ApiResult<QueueRefreshReport> {
        let report = self.orchestrator.refresh_queue().await?;
        info!(
            queued = report.snapshot.len(),
            newly_flagged = report.newly_flagged.len(),
            "队列已刷新"
        );
        Ok(report)
    }

    pub async fn score_day(&self, date: NaiveDate) -> ApiResult<ScheduleQualityReport> {
        Ok(self.orchestrator.score_day(date).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingConfig;
    use crate::domain::resource::OperatingRoom;
    use crate::domain::slot::TimeWindow;
    use crate::domain::surgery::{PatientProfile, ProcedureProfile};
    use crate::domain::types::{ApprovalStatus, Priority, RoomStatus, RoomType, SurgeryStatus};
    use crate::repository::InMemoryScheduleRepository;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn create_test_api() -> SchedulingApi {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let orchestrator = SchedulingOrchestrator::new(repo, SchedulingConfig::default());
        SchedulingApi::new(Arc::new(orchestrator))
    }

    fn create_test_surgery(complexity: u8) -> Surgery {
        Surgery {
            surgery_id: "S-1".to_string(),
            facility_id: "F1".to_string(),
            patient: PatientProfile::default(),
            procedure: ProcedureProfile {
                name: "Appendectomy".to_string(),
                category: "general".to_string(),
                complexity,
            },
            priority: Priority::Elective,
            estimated_duration_min: 60,
            predicted_duration_min: None,
            status: SurgeryStatus::Approved,
            approval_status: ApprovalStatus::Approved,
            required_specialization: None,
            required_equipment: vec![],
            room_id: None,
            surgeon_id: None,
            scheduled_start: None,
            scheduled_end: None,
            created_at: at(6, 0),
            updated_at: at(6, 0),
        }
    }

    fn create_test_room() -> OperatingRoom {
        OperatingRoom {
            room_id: "OR-1".to_string(),
            facility_id: "F1".to_string(),
            name: "OR-1".to_string(),
            room_type: RoomType::General,
            status: RoomStatus::Available,
            capabilities: vec![],
        }
    }

    #[test]
    fn test_check_placement_rejects_out_of_range_surgery_fields() {
        let api = create_test_api();
        let room = create_test_room();

        let surgery = create_test_surgery(9);
        let request = PlacementRequest {
            surgery: &surgery,
            room: &room,
            window: TimeWindow::new(at(9, 0), at(10, 0)),
            existing_slots: &[],
            surgeon: None,
            equipment: &[],
        };
        match api.check_placement(&request) {
            Err(ApiError::InvalidInput { field, .. }) => assert_eq!(field, "procedure.complexity"),
            other => panic!("expected InvalidInput, got {:?}", other),
        }

        let mut surgery = create_test_surgery(3);
        surgery.patient.asa_score = Some(7);
        let request = PlacementRequest { surgery: &surgery, ..request };
        match api.check_placement(&request) {
            Err(ApiError::InvalidInput { field, .. }) => assert_eq!(field, "patient.asa_score"),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_check_placement_accepts_valid_surgery() {
        let api = create_test_api();
        let room = create_test_room();
        let surgery = create_test_surgery(5);
        let request = PlacementRequest {
            surgery: &surgery,
            room: &room,
            window: TimeWindow::new(at(9, 0), at(10, 0)),
            existing_slots: &[],
            surgeon: None,
            equipment: &[],
        };

        let check = api.check_placement(&request).unwrap();
        assert!(!check.conflict);
    }
}
