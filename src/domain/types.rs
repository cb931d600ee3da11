// ==========================================
// 手术室排程系统 - 领域类型定义
// ==========================================
// 红线: 优先级/状态一律使用枚举,禁止字符串比较
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 手术优先级 (Priority)
// ==========================================
// 三级制: Emergency > Urgent > Elective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Emergency, // 急诊
    Urgent,    // 限期
    Elective,  // 择期
}

impl Priority {
    /// 全部优先级（按层级从高到低）
    pub const ALL: [Priority; 3] = [Priority::Emergency, Priority::Urgent, Priority::Elective];

    /// 序列推荐使用的优先级权重
    pub fn weight(&self) -> i64 {
        match self {
            Priority::Emergency => 1000,
            Priority::Urgent => 500,
            Priority::Elective => 100,
        }
    }

    /// 升级后的优先级（急诊已是最高层，不再升级）
    pub fn escalated(&self) -> Option<Priority> {
        match self {
            Priority::Elective => Some(Priority::Urgent),
            Priority::Urgent => Some(Priority::Emergency),
            Priority::Emergency => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            Priority::Emergency => "emergency",
            Priority::Urgent => "urgent",
            Priority::Elective => "elective",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "emergency" => Some(Priority::Emergency),
            "urgent" => Some(Priority::Urgent),
            "elective" => Some(Priority::Elective),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 手术生命周期状态 (Surgery Status)
// ==========================================
// pending → approved → scheduled → in_progress → completed
// cancelled / rescheduled: completed 之前任意状态可达
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurgeryStatus {
    Pending,
    Approved,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl SurgeryStatus {
    /// 是否仍在队列中（未完成且未取消）
    pub fn is_active(&self) -> bool {
        !matches!(self, SurgeryStatus::Completed | SurgeryStatus::Cancelled)
    }

    /// 是否允许（重新）放置到手术室
    pub fn is_placeable(&self) -> bool {
        matches!(
            self,
            SurgeryStatus::Approved | SurgeryStatus::Scheduled | SurgeryStatus::Rescheduled
        )
    }

    /// 状态转换表
    pub fn can_transition_to(&self, next: SurgeryStatus) -> bool {
        use SurgeryStatus::*;

        match (self, next) {
            (Completed, _) | (Cancelled, _) => false,
            (_, Cancelled) | (_, Rescheduled) => true,
            (Pending, Approved) => true,
            (Approved, Scheduled) | (Rescheduled, Scheduled) | (Scheduled, Scheduled) => true,
            (Scheduled, InProgress) => true,
            (InProgress, Completed) => true,
            _ => false,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            SurgeryStatus::Pending => "pending",
            SurgeryStatus::Approved => "approved",
            SurgeryStatus::Scheduled => "scheduled",
            SurgeryStatus::InProgress => "in_progress",
            SurgeryStatus::Completed => "completed",
            SurgeryStatus::Cancelled => "cancelled",
            SurgeryStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(SurgeryStatus::Pending),
            "approved" => Some(SurgeryStatus::Approved),
            "scheduled" => Some(SurgeryStatus::Scheduled),
            "in_progress" => Some(SurgeryStatus::InProgress),
            "completed" => Some(SurgeryStatus::Completed),
            "cancelled" => Some(SurgeryStatus::Cancelled),
            "rescheduled" => Some(SurgeryStatus::Rescheduled),
            _ => None,
        }
    }
}

impl fmt::Display for SurgeryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 审批状态 (Approval Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 手术室类型 (Room Type)
// ==========================================
// general 类型可承接任意专科
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    General,
    Cardiac,
    Neuro,
    Orthopedic,
    Ent,
    Ophthalmic,
}

impl RoomType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RoomType::General => "general",
            RoomType::Cardiac => "cardiac",
            RoomType::Neuro => "neuro",
            RoomType::Orthopedic => "orthopedic",
            RoomType::Ent => "ent",
            RoomType::Ophthalmic => "ophthalmic",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Some(RoomType::General),
            "cardiac" => Some(RoomType::Cardiac),
            "neuro" => Some(RoomType::Neuro),
            "orthopedic" => Some(RoomType::Orthopedic),
            "ent" => Some(RoomType::Ent),
            "ophthalmic" => Some(RoomType::Ophthalmic),
            _ => None,
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 手术室状态 (Room Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Occupied,
    Maintenance,
    Blocked,
}

impl RoomStatus {
    /// maintenance / blocked 不接受新的放置
    pub fn accepts_placements(&self) -> bool {
        matches!(self, RoomStatus::Available | RoomStatus::Occupied)
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
            RoomStatus::Maintenance => "maintenance",
            RoomStatus::Blocked => "blocked",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "available" => Some(RoomStatus::Available),
            "occupied" => Some(RoomStatus::Occupied),
            "maintenance" => Some(RoomStatus::Maintenance),
            "blocked" => Some(RoomStatus::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 设备状态 (Equipment Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    Available,
    InUse,
    Sterilizing,
    Maintenance,
    Retired,
}

impl EquipmentStatus {
    /// 维护/报废/消毒中 的设备阻断放置
    pub fn blocks_placement(&self) -> bool {
        matches!(
            self,
            EquipmentStatus::Sterilizing | EquipmentStatus::Maintenance | EquipmentStatus::Retired
        )
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Available => "available",
            EquipmentStatus::InUse => "in_use",
            EquipmentStatus::Sterilizing => "sterilizing",
            EquipmentStatus::Maintenance => "maintenance",
            EquipmentStatus::Retired => "retired",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "available" => Some(EquipmentStatus::Available),
            "in_use" => Some(EquipmentStatus::InUse),
            "sterilizing" => Some(EquipmentStatus::Sterilizing),
            "maintenance" => Some(EquipmentStatus::Maintenance),
            "retired" => Some(EquipmentStatus::Retired),
            _ => None,
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 设备类型 (Equipment Type)
// ==========================================
// 用于故障风险预测的保养周期与风险系数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentType {
    Cardiac,
    Neuro,
    Imaging,
    Anesthesia,
    Surgical,
    Monitoring,
    Other,
}

impl EquipmentType {
    /// 期望保养周期（天）
    pub fn expected_service_interval_days(&self) -> f64 {
        match self {
            EquipmentType::Cardiac | EquipmentType::Neuro => 90.0,
            EquipmentType::Anesthesia => 120.0,
            EquipmentType::Monitoring => 150.0,
            EquipmentType::Imaging | EquipmentType::Surgical | EquipmentType::Other => 180.0,
        }
    }

    /// 类型风险系数（心脏/神经类设备更高）
    pub fn risk_multiplier(&self) -> f64 {
        match self {
            EquipmentType::Cardiac => 1.3,
            EquipmentType::Neuro => 1.25,
            EquipmentType::Anesthesia => 1.15,
            EquipmentType::Imaging | EquipmentType::Monitoring => 1.05,
            EquipmentType::Surgical | EquipmentType::Other => 1.0,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            EquipmentType::Cardiac => "cardiac",
            EquipmentType::Neuro => "neuro",
            EquipmentType::Imaging => "imaging",
            EquipmentType::Anesthesia => "anesthesia",
            EquipmentType::Surgical => "surgical",
            EquipmentType::Monitoring => "monitoring",
            EquipmentType::Other => "other",
        }
    }

    /// 未知类型一律归为 Other
    pub fn from_db_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "cardiac" => EquipmentType::Cardiac,
            "neuro" => EquipmentType::Neuro,
            "imaging" => EquipmentType::Imaging,
            "anesthesia" => EquipmentType::Anesthesia,
            "surgical" => EquipmentType::Surgical,
            "monitoring" => EquipmentType::Monitoring,
            _ => EquipmentType::Other,
        }
    }
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 时段类型 (Slot Type)
// ==========================================
// 每台手术固定产生 setup / surgery / cleanup 三个时段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    Setup,
    Surgery,
    Cleanup,
}

impl SlotType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SlotType::Setup => "setup",
            SlotType::Surgery => "surgery",
            SlotType::Cleanup => "cleanup",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "setup" => Some(SlotType::Setup),
            "surgery" => Some(SlotType::Surgery),
            "cleanup" => Some(SlotType::Cleanup),
            _ => None,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 设备故障风险等级 (Risk Band)
// ==========================================
// 顺序: Low < Medium < High < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBand {
    /// 分数 → 等级: ≥80 critical, ≥60 high, ≥40 medium, 其余 low
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => RiskBand::Critical,
            60..=79 => RiskBand::High,
            40..=59 => RiskBand::Medium,
            _ => RiskBand::Low,
        }
    }

    /// 每个等级对应固定的处置建议
    pub fn recommended_action(&self) -> &'static str {
        match self {
            RiskBand::Critical => "Remove from service immediately and schedule maintenance",
            RiskBand::High => "Schedule preventive maintenance within 7 days",
            RiskBand::Medium => "Inspect at the next sterilization cycle",
            RiskBand::Low => "Continue routine monitoring",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBand::Low => write!(f, "low"),
            RiskBand::Medium => write!(f, "medium"),
            RiskBand::High => write!(f, "high"),
            RiskBand::Critical => write!(f, "critical"),
        }
    }
}

// ==========================================
// 等待老化程度 (Aging Severity)
// ==========================================
// 仅用于观测展示,不参与门控
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingSeverity {
    Normal,
    Warning,
    Severe,
}

impl fmt::Display for AgingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgingSeverity::Normal => write!(f, "normal"),
            AgingSeverity::Warning => write!(f, "warning"),
            AgingSeverity::Severe => write!(f, "severe"),
        }
    }
}

// ==========================================
// 排程质量等级 (Schedule Grade)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleGrade {
    A,
    B,
    C,
    D,
    F,
}

impl ScheduleGrade {
    /// A≥90, B≥75, C≥60, D≥40, 其余 F
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => ScheduleGrade::A,
            75..=89 => ScheduleGrade::B,
            60..=74 => ScheduleGrade::C,
            40..=59 => ScheduleGrade::D,
            _ => ScheduleGrade::F,
        }
    }
}

impl fmt::Display for ScheduleGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleGrade::A => write!(f, "A"),
            ScheduleGrade::B => write!(f, "B"),
            ScheduleGrade::C => write!(f, "C"),
            ScheduleGrade::D => write!(f, "D"),
            ScheduleGrade::F => write!(f, "F"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_escalation_chain() {
        assert_eq!(Priority::Elective.escalated(), Some(Priority::Urgent));
        assert_eq!(Priority::Urgent.escalated(), Some(Priority::Emergency));
        assert_eq!(Priority::Emergency.escalated(), None);
    }

    #[test]
    fn test_status_transitions() {
        use SurgeryStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Scheduled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Rescheduled));
    }

    #[test]
    fn test_risk_band_boundaries() {
        assert_eq!(RiskBand::from_score(80), RiskBand::Critical);
        assert_eq!(RiskBand::from_score(79), RiskBand::High);
        assert_eq!(RiskBand::from_score(60), RiskBand::High);
        assert_eq!(RiskBand::from_score(59), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(40), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(39), RiskBand::Low);
        assert_eq!(RiskBand::from_score(100), RiskBand::Critical);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(ScheduleGrade::from_score(100), ScheduleGrade::A);
        assert_eq!(ScheduleGrade::from_score(90), ScheduleGrade::A);
        assert_eq!(ScheduleGrade::from_score(89), ScheduleGrade::B);
        assert_eq!(ScheduleGrade::from_score(75), ScheduleGrade::B);
        assert_eq!(ScheduleGrade::from_score(60), ScheduleGrade::C);
        assert_eq!(ScheduleGrade::from_score(40), ScheduleGrade::D);
        assert_eq!(ScheduleGrade::from_score(39), ScheduleGrade::F);
    }

    #[test]
    fn test_db_str_roundtrip_for_status() {
        for status in [
            SurgeryStatus::Pending,
            SurgeryStatus::InProgress,
            SurgeryStatus::Rescheduled,
        ] {
            assert_eq!(SurgeryStatus::from_db_str(status.to_db_str()), Some(status));
        }
        assert_eq!(SurgeryStatus::from_db_str("unknown"), None);
    }
}
