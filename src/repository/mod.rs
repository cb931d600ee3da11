// ==========================================
// 手术室排程系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 所有读写限定在单一 facility_id
// ==========================================
// 职责: 定义核心所依赖的外部仓储契约,并提供
//       内存实现（嵌入/测试）与 SQLite 实现
// 写入范围: 仅限时段插入/删除 + 手术状态/优先级字段更新
// ==========================================

pub mod error;
pub mod memory_repo;
pub mod sqlite_repo;

use crate::domain::resource::{Equipment, OperatingRoom, Staff};
use crate::domain::slot::{ScheduleSlot, TimeWindow};
use crate::domain::surgery::Surgery;
use crate::domain::types::{ApprovalStatus, Priority, SurgeryStatus};
use chrono::NaiveDateTime;

pub use error::{RepositoryError, RepositoryResult};

/// 状态比较失败时的统一错误
pub(crate) fn status_conflict(
    surgery_id: &str,
    expected: SurgeryStatus,
    actual: SurgeryStatus,
) -> RepositoryError {
    RepositoryError::ConcurrentUpdate {
        entity: "Surgery".to_string(),
        id: surgery_id.to_string(),
        message: format!("status 期望 {}，实际 {}", expected, actual),
    }
}
pub use memory_repo::InMemoryScheduleRepository;
pub use sqlite_repo::SqliteScheduleRepository;

/// 某间手术室在读取时刻的时段版本号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRevision {
    pub room_id: String,
    pub revision: u64,
}

/// 一次放置的原子提交单元
///
/// 仓储必须在单个事务内完成:
/// 1) 校验 expected_status 与 expected_revisions
/// 2) 删除该手术旧时段
/// 3) 插入新时段
/// 4) 递增受影响手术室版本号
/// 5) 更新手术 status=scheduled / room / surgeon / 起止时间
#[derive(Debug, Clone)]
pub struct PlacementCommit {
    pub surgery_id: String,
    pub room_id: String,
    pub surgeon_id: Option<String>,
    pub scheduled_start: NaiveDateTime,
    pub scheduled_end: NaiveDateTime,
    pub slots: Vec<ScheduleSlot>,
    /// 读取手术时观察到的状态；提交时不一致返回 ConcurrentUpdate
    pub expected_status: SurgeryStatus,
    pub expected_revisions: Vec<RoomRevision>,
    pub committed_at: NaiveDateTime,
}

// ==========================================
// ScheduleRepository - 外部仓储契约
// ==========================================
pub trait ScheduleRepository: Send + Sync {
    // ===== 手术 =====

    fn find_surgery(&self, facility_id: &str, surgery_id: &str)
        -> RepositoryResult<Option<Surgery>>;

    /// 活跃手术（status ∉ {completed, cancelled}）
    fn list_active_surgeries(&self, facility_id: &str) -> RepositoryResult<Vec<Surgery>>;

    /// 单行比较并更新状态；当前状态 != expected 时返回 ConcurrentUpdate
    fn update_surgery_status(
        &self,
        facility_id: &str,
        surgery_id: &str,
        expected: SurgeryStatus,
        status: SurgeryStatus,
        approval_status: Option<ApprovalStatus>,
        at: NaiveDateTime,
    ) -> RepositoryResult<()>;

    /// 单行比较并更新优先级；当前值 != expected 时返回 ConcurrentUpdate
    fn update_surgery_priority(
        &self,
        facility_id: &str,
        surgery_id: &str,
        expected: Priority,
        priority: Priority,
        at: NaiveDateTime,
    ) -> RepositoryResult<()>;

    fn update_predicted_duration(
        &self,
        facility_id: &str,
        surgery_id: &str,
        predicted_duration_min: u32,
        at: NaiveDateTime,
    ) -> RepositoryResult<()>;

    // ===== 资源 =====

    /// 手术室列表（保持稳定顺序，分配器按此顺序 first-fit）
    fn list_rooms(&self, facility_id: &str) -> RepositoryResult<Vec<OperatingRoom>>;

    fn find_staff(&self, facility_id: &str, staff_id: &str) -> RepositoryResult<Option<Staff>>;

    fn list_equipment(&self, facility_id: &str) -> RepositoryResult<Vec<Equipment>>;

    // ===== 时段 =====

    /// 与给定区间重叠的所有时段（按 start_time 升序）
    fn list_slots_in_range(
        &self,
        facility_id: &str,
        range: TimeWindow,
    ) -> RepositoryResult<Vec<ScheduleSlot>>;

    fn list_slots_for_surgery(
        &self,
        facility_id: &str,
        surgery_id: &str,
    ) -> RepositoryResult<Vec<ScheduleSlot>>;

    fn room_revision(&self, facility_id: &str, room_id: &str) -> RepositoryResult<u64>;

    /// 原子提交一次放置（见 PlacementCommit）
    fn commit_placement(&self, facility_id: &str, commit: PlacementCommit)
        -> RepositoryResult<()>;

    /// 原子释放手术全部时段并更新状态（取消/改期）
    ///
    /// 当前状态 != expected_status 时返回 ConcurrentUpdate，不产生部分写入
    ///
    /// # 返回
    /// 删除的时段数量
    fn release_surgery_slots(
        &self,
        facility_id: &str,
        surgery_id: &str,
        expected_status: SurgeryStatus,
        status: SurgeryStatus,
        expected_revisions: &[RoomRevision],
        at: NaiveDateTime,
    ) -> RepositoryResult<usize>;
}
