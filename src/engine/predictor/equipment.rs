use super::round_to;
use crate::domain::resource::Equipment;
use crate::domain::types::{EquipmentType, RiskBand};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const USAGE_WEIGHT: f64 = 0.6;
const SERVICE_AGE_WEIGHT: f64 = 0.4;
const RATIO_CAP: f64 = 1.5;

/// 设备故障风险预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentFailurePrediction {
    pub risk: RiskBand,
    pub score: u8,
    pub probability: f64,
    pub action: String,
}

// ==========================================
// EquipmentFailurePredictor - 设备故障风险
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct EquipmentFailurePredictor;

impl EquipmentFailurePredictor {
    pub fn new() -> Self {
        Self
    }

    /// 预测设备故障风险
    ///
    /// score = clamp(round((0.6·usage_ratio + 0.4·service_ratio)·100·type_multiplier), 0, 100)
    /// probability = 1 / (1 + e^(−(score−50)/10))
    ///
    /// 两个比值各自封顶 1.5；max_usage=0 时使用比按 1 计
    pub fn predict(
        &self,
        usage_count: u32,
        max_usage: u32,
        days_since_service: f64,
        equipment_type: EquipmentType,
    ) -> EquipmentFailurePrediction {
        let usage_ratio = if max_usage == 0 {
            1.0
        } else {
            (usage_count as f64 / max_usage as f64).min(RATIO_CAP)
        };
        let service_ratio = (days_since_service.max(0.0)
            / equipment_type.expected_service_interval_days())
        .min(RATIO_CAP);

        let weighted = USAGE_WEIGHT * usage_ratio + SERVICE_AGE_WEIGHT * service_ratio;
        let score = (weighted * 100.0 * equipment_type.risk_multiplier())
            .round()
            .clamp(0.0, 100.0) as u8;

        let probability = round_to(1.0 / (1.0 + (-(score as f64 - 50.0) / 10.0).exp()), 4);
        let risk = RiskBand::from_score(score);

        EquipmentFailurePrediction {
            risk,
            score,
            probability,
            action: risk.recommended_action().to_string(),
        }
    }

    /// 基于设备快照预测
    pub fn predict_for(&self, equipment: &Equipment, now: NaiveDateTime) -> EquipmentFailurePrediction {
        self.predict(
            equipment.usage_count,
            equipment.max_usage_before_maintenance,
            equipment.days_since_service(now),
            equipment.equipment_type,
        )
    }
}
