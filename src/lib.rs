// ==========================================
// 手术室排程系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 排程决策核心（约束检查 / 时段分配 / 优先队列 / 预测）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 排程参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/schema）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装根
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AgingSeverity, ApprovalStatus, EquipmentStatus, EquipmentType, Priority, RiskBand,
    RoomStatus, RoomType, ScheduleGrade, SlotType, SurgeryStatus,
};

// 领域实体
pub use domain::{Equipment, OperatingRoom, ScheduleSlot, Staff, Surgery, TimeWindow};

// 引擎
pub use engine::{
    ConstraintEngine, DurationPredictor, EquipmentFailurePredictor, PriorityQueueEngine,
    ScheduleScorer, SchedulingOrchestrator, SequenceRecommender, SlotAllocator,
};

// API
pub use api::{ApiError, ApiResult, SchedulingApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "手术室排程系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
