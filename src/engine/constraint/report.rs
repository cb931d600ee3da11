use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// ConstraintRule - 规则名（对外契约的一部分）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintRule {
    // ===== 硬约束 =====
    NoOverlap,
    RoomCapability,
    RoomUnavailable,
    SurgeonSpecialization,
    SurgeonHours,
    SurgeonDoubleBooked,
    EquipmentUnavailable,

    // ===== 软约束 =====
    Overtime,
    EarlyStart,
    Underutilization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Hard,
    Soft,
}

impl ConstraintRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintRule::NoOverlap => "no_overlap",
            ConstraintRule::RoomCapability => "room_capability",
            ConstraintRule::RoomUnavailable => "room_unavailable",
            ConstraintRule::SurgeonSpecialization => "surgeon_specialization",
            ConstraintRule::SurgeonHours => "surgeon_hours",
            ConstraintRule::SurgeonDoubleBooked => "surgeon_double_booked",
            ConstraintRule::EquipmentUnavailable => "equipment_unavailable",
            ConstraintRule::Overtime => "overtime",
            ConstraintRule::EarlyStart => "early_start",
            ConstraintRule::Underutilization => "underutilization",
        }
    }

    pub fn severity(&self) -> RuleSeverity {
        match self {
            ConstraintRule::Overtime
            | ConstraintRule::EarlyStart
            | ConstraintRule::Underutilization => RuleSeverity::Soft,
            _ => RuleSeverity::Hard,
        }
    }
}

impl fmt::Display for ConstraintRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条违规（规则名 + 可读说明）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: ConstraintRule,
    pub message: String,
}

impl Violation {
    pub fn new(rule: ConstraintRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

// ==========================================
// PlacementCheck - 放置检查结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementCheck {
    /// 是否存在硬约束违反
    pub conflict: bool,
    pub hard_violations: Vec<Violation>,
    pub soft_violations: Vec<Violation>,
    /// max(0, 100 − 25×hard − 5×soft)
    pub score: u8,
}

impl PlacementCheck {
    pub(super) fn from_violations(hard: Vec<Violation>, soft: Vec<Violation>) -> Self {
        let raw = 100 - 25 * hard.len() as i64 - 5 * soft.len() as i64;
        Self {
            conflict: !hard.is_empty(),
            score: raw.max(0) as u8,
            hard_violations: hard,
            soft_violations: soft,
        }
    }

    /// 违反的硬约束规则名（去重，保持检查顺序）
    pub fn hard_rule_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for v in &self.hard_violations {
            let name = v.rule.as_str().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn soft_rule_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for v in &self.soft_violations {
            let name = v.rule.as_str().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn has_hard(&self, rule: ConstraintRule) -> bool {
        self.hard_violations.iter().any(|v| v.rule == rule)
    }

    pub fn has_soft(&self, rule: ConstraintRule) -> bool {
        self.soft_violations.iter().any(|v| v.rule == rule)
    }
}
