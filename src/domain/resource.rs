// ==========================================
// 手术室排程系统 - 资源领域模型
// ==========================================
// 包含: 手术室 / 医护人员 / 设备
// 约束引擎与故障预测只读消费这些快照
// ==========================================

use crate::domain::types::{EquipmentStatus, EquipmentType, RoomStatus, RoomType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// OperatingRoom - 手术室
// ==========================================
// 红线: maintenance / blocked 不接受新放置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingRoom {
    pub room_id: String,
    pub facility_id: String,
    pub name: String,
    pub room_type: RoomType,
    pub status: RoomStatus,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl OperatingRoom {
    /// 手术室能否承接某专科
    ///
    /// general 类型承接任意专科；其余类型需在能力集或房间类型中命中
    pub fn supports(&self, specialization: Option<&str>) -> bool {
        let required = match specialization {
            Some(s) if !s.trim().is_empty() => s.trim().to_lowercase(),
            _ => return true,
        };

        if self.room_type == RoomType::General {
            return true;
        }

        self.room_type.to_db_str() == required
            || self
                .capabilities
                .iter()
                .any(|c| c.trim().to_lowercase() == required)
    }
}

// ==========================================
// Staff - 医护人员（核心只使用外科医生子集）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    pub staff_id: String,
    pub facility_id: String,
    pub name: String,
    pub specialization: String,
    pub max_hours_per_day: f64,
}

impl Staff {
    pub fn matches_specialization(&self, required: Option<&str>) -> bool {
        match required {
            Some(r) if !r.trim().is_empty() => {
                self.specialization.trim().eq_ignore_ascii_case(r.trim())
            }
            _ => true,
        }
    }
}

// ==========================================
// Equipment - 设备
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub equipment_id: String,
    pub facility_id: String,
    pub name: String,
    pub equipment_type: EquipmentType,
    pub status: EquipmentStatus,
    pub usage_count: u32,
    pub max_usage_before_maintenance: u32,
    pub last_service_at: Option<NaiveDateTime>,
}

impl Equipment {
    /// 距上次保养天数（从未保养视为 365 天）
    pub fn days_since_service(&self, now: NaiveDateTime) -> f64 {
        match self.last_service_at {
            Some(at) => ((now - at).num_minutes().max(0) as f64) / (60.0 * 24.0),
            None => 365.0,
        }
    }
}
