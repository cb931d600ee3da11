// ==========================================
// 手术室排程系统 - 引擎层
// ==========================================
// 职责: 预测器 / 约束引擎 / 分配器 / 优先队列 / 编排器
// 红线: Engine 不拼 SQL,所有数据经 ScheduleRepository 读写
// 红线: 约束违反必须输出规则名
// ==========================================

pub mod allocator;
pub mod auth;
pub mod clock;
pub mod constraint;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod predictor;
pub mod priority_queue;
pub mod resource_lock;

// 重导出核心引擎
pub use allocator::{SlotAllocator, SlotProposal, SlotSearch};
pub use auth::{Action, Actor, AllowAll, Authorizer, Role, RoleAuthorizer};
pub use clock::{Clock, FixedClock, SystemClock};
pub use constraint::{
    ConstraintEngine, ConstraintRule, PlacementCheck, PlacementRequest, RuleSeverity, Violation,
};
pub use error::{ScheduleError, ScheduleResult};
pub use events::{
    NoOpNotificationSink, NotificationSink, OptionalNotificationSink, ScheduleEvent,
    ScheduleEventType,
};
pub use orchestrator::{
    EscalationOutcome, PlacementOutcome, QueueRefreshReport, ReleaseOutcome,
    SchedulingOrchestrator,
};
pub use predictor::{
    DurationFeatures, DurationPrediction, DurationPredictor, EquipmentFailurePrediction,
    EquipmentFailurePredictor, ScheduleQualityReport, ScheduleScorer, SequenceRecommender,
};
pub use priority_queue::{PriorityQueueEngine, QueueEntry, QueueSnapshot};
pub use resource_lock::{LockKey, ResourceLockGuard, ResourceLockRegistry};
