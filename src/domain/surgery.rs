// ==========================================
// 手术室排程系统 - 手术申请领域模型
// ==========================================
// 红线: 同一时刻一台手术最多占用一间手术室
// 红线: scheduled_start < scheduled_end（两者均存在时）
// ==========================================

use crate::domain::types::{ApprovalStatus, Priority, SurgeryStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// PatientProfile - 患者描述
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub patient_id: Option<String>,
    pub age: Option<u32>,
    pub bmi: Option<f64>,
    pub asa_score: Option<u8>, // ASA 分级 1-6
    #[serde(default)]
    pub comorbidities: Vec<String>,
}

// ==========================================
// ProcedureProfile - 术式描述
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureProfile {
    pub name: String,
    pub category: String, // 术式类别（序列推荐按此聚批）
    pub complexity: u8,   // 复杂度 1-5
}

// ==========================================
// Surgery - 手术申请
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surgery {
    // ===== 主键 =====
    pub surgery_id: String,
    pub facility_id: String,

    // ===== 患者/术式 =====
    pub patient: PatientProfile,
    pub procedure: ProcedureProfile,

    // ===== 优先级与时长 =====
    pub priority: Priority,
    pub estimated_duration_min: u32,         // 人工录入时长
    pub predicted_duration_min: Option<u32>, // 启发式预测时长

    // ===== 生命周期 =====
    pub status: SurgeryStatus,
    pub approval_status: ApprovalStatus,

    // ===== 资源需求 =====
    pub required_specialization: Option<String>,
    #[serde(default)]
    pub required_equipment: Vec<String>,

    // ===== 分配结果 =====
    pub room_id: Option<String>,
    pub surgeon_id: Option<String>,
    pub scheduled_start: Option<NaiveDateTime>,
    pub scheduled_end: Option<NaiveDateTime>,

    // ===== 审计 =====
    pub created_at: NaiveDateTime, // 等待时长/老化计算起点
    pub updated_at: NaiveDateTime,
}

impl Surgery {
    /// 分配器/约束检查使用的手术时长（分钟）
    ///
    /// 以人工录入时长为准；录入缺失（0）时回落到预测时长
    pub fn planned_duration_min(&self) -> u32 {
        if self.estimated_duration_min > 0 {
            self.estimated_duration_min
        } else {
            self.predicted_duration_min.unwrap_or(0)
        }
    }

    /// 队列展示时长：优先展示预测值
    pub fn display_duration_min(&self) -> u32 {
        self.predicted_duration_min
            .unwrap_or(self.estimated_duration_min)
    }

    pub fn is_emergency(&self) -> bool {
        self.priority == Priority::Emergency
    }

    pub fn has_comorbidities(&self) -> bool {
        !self.patient.comorbidities.is_empty()
    }

    /// 复杂度 / ASA 分级取值检查
    ///
    /// # 返回
    /// 首个越界字段及说明；合法时为 None
    pub fn range_error(&self) -> Option<(&'static str, String)> {
        if !(1..=5).contains(&self.procedure.complexity) {
            return Some((
                "procedure.complexity",
                format!("复杂度必须在 1-5 之间: {}", self.procedure.complexity),
            ));
        }
        match self.patient.asa_score {
            Some(asa) if !(1..=6).contains(&asa) => Some((
                "patient.asa_score",
                format!("ASA 分级必须在 1-6 之间: {}", asa),
            )),
            _ => None,
        }
    }
}
