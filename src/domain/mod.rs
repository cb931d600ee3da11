// ==========================================
// 手术室排程系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod resource;
pub mod slot;
pub mod surgery;
pub mod types;

// 重导出核心类型
pub use resource::{Equipment, OperatingRoom, Staff};
pub use slot::{build_placement_slots, ScheduleSlot, TimeWindow};
pub use surgery::{PatientProfile, ProcedureProfile, Surgery};
pub use types::{
    AgingSeverity, ApprovalStatus, EquipmentStatus, EquipmentType, Priority, RiskBand,
    RoomStatus, RoomType, ScheduleGrade, SlotType, SurgeryStatus,
};
