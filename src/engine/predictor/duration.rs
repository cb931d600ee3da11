use super::round_to;
use crate::domain::surgery::Surgery;
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use tracing::instrument;

// ===== 缺省输入 =====
const DEFAULT_AGE: f64 = 45.0;
const DEFAULT_BMI: f64 = 25.0;
const DEFAULT_ASA: f64 = 2.0;
const DEFAULT_BASE_MIN: f64 = 60.0;
const DEFAULT_HOUR: u32 = 9;
const DEFAULT_WEEKDAY: Weekday = Weekday::Tue;
const DEFAULT_COMPLEXITY: u8 = 3;

// ===== 权重 =====
const COMPLEXITY_FACTOR: f64 = 0.12; // 每级复杂度相对基准时长的比例
const AGE_WEIGHT: f64 = 0.25;
const BMI_WEIGHT: f64 = 0.8;
const ASA_WEIGHT: f64 = 6.0;
const EMERGENCY_MIN: f64 = 15.0;
const COMORBIDITY_MIN: f64 = 10.0;
const LATE_HOUR_MIN: f64 = 8.0; // ≥15 点
const EARLY_HOUR_MIN: f64 = 5.0; // <8 点
const FRIDAY_MIN: f64 = 5.0;
const WEEKEND_MIN: f64 = 10.0;
const INTERACTION_FACTOR: f64 = 0.05;
const INTERACTION_PIVOT: f64 = 11.0;

const MIN_PREDICTED_MIN: f64 = 15.0;

/// 时长预测输入特征（缺失字段回落到缺省值）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DurationFeatures {
    pub complexity: Option<u8>,
    pub base_estimate_min: Option<u32>,
    pub age: Option<u32>,
    pub bmi: Option<f64>,
    pub asa_score: Option<u8>,
    pub is_emergency: bool,
    pub has_comorbidities: bool,
    pub hour_of_day: Option<u32>,
    pub weekday: Option<Weekday>,
}

impl DurationFeatures {
    /// 从手术申请抽取特征
    ///
    /// `planned_start` 缺失时使用手术已排定的开始时间（仍缺失则回落缺省）
    pub fn from_surgery(surgery: &Surgery, planned_start: Option<NaiveDateTime>) -> Self {
        let start = planned_start.or(surgery.scheduled_start);
        Self {
            complexity: Some(surgery.procedure.complexity),
            base_estimate_min: Some(surgery.estimated_duration_min).filter(|m| *m > 0),
            age: surgery.patient.age,
            bmi: surgery.patient.bmi,
            asa_score: surgery.patient.asa_score,
            is_emergency: surgery.is_emergency(),
            has_comorbidities: surgery.has_comorbidities(),
            hour_of_day: start.map(|s| s.hour()),
            weekday: start.map(|s| s.weekday()),
        }
    }
}

/// 时长预测结果（分钟）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationPrediction {
    pub predicted_min: u32,
    pub lower_min: u32,
    pub upper_min: u32,
    pub confidence: f64,
}

// ==========================================
// DurationPredictor - 手术时长加权回归
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct DurationPredictor;

impl DurationPredictor {
    pub fn new() -> Self {
        Self
    }

    /// 预测手术时长
    ///
    /// raw = base
    ///     + 0.12·base·(complexity−3)
    ///     + 0.25·(age−45) + 0.8·(bmi−25) + 6·(asa−2)
    ///     + 急诊 15 + 合并症 10
    ///     + 时段调整 + 星期调整
    ///     + 高危交互项 0.05·base·(complexity·asa−11)  (complexity≥4 且 asa≥3)
    ///
    /// predicted = max(15, round(raw))
    #[instrument(level = "debug", skip(self))]
    pub fn predict(&self, features: &DurationFeatures) -> DurationPrediction {
        let complexity = features
            .complexity
            .filter(|c| (1..=5).contains(c))
            .unwrap_or(DEFAULT_COMPLEXITY);
        let c = complexity as f64;
        let base = features
            .base_estimate_min
            .filter(|m| *m > 0)
            .map(|m| m as f64)
            .unwrap_or(DEFAULT_BASE_MIN);
        let age = features.age.map(|a| a as f64).unwrap_or(DEFAULT_AGE);
        let bmi = features
            .bmi
            .filter(|b| b.is_finite() && *b > 0.0)
            .unwrap_or(DEFAULT_BMI);
        let asa = features
            .asa_score
            .filter(|a| (1..=6).contains(a))
            .map(|a| a as f64)
            .unwrap_or(DEFAULT_ASA);
        let hour = features.hour_of_day.unwrap_or(DEFAULT_HOUR);
        let weekday = features.weekday.unwrap_or(DEFAULT_WEEKDAY);

        let mut raw = base;
        raw += COMPLEXITY_FACTOR * base * (c - 3.0);
        raw += AGE_WEIGHT * (age - DEFAULT_AGE);
        raw += BMI_WEIGHT * (bmi - DEFAULT_BMI);
        raw += ASA_WEIGHT * (asa - DEFAULT_ASA);
        if features.is_emergency {
            raw += EMERGENCY_MIN;
        }
        if features.has_comorbidities {
            raw += COMORBIDITY_MIN;
        }
        raw += hour_adjustment(hour);
        raw += weekday_adjustment(weekday);
        if complexity >= 4 && asa >= 3.0 {
            raw += INTERACTION_FACTOR * base * (c * asa - INTERACTION_PIVOT);
        }

        let predicted = raw.round().max(MIN_PREDICTED_MIN);

        // 区间半宽随复杂度/急诊扩大
        let mut width_ratio = 0.10 + 0.04 * c;
        if features.is_emergency {
            width_ratio += 0.10;
        }
        let half_width = predicted * width_ratio;
        let lower = (predicted - half_width).max(0.0).round();
        let upper = (predicted + half_width).round();

        let mut confidence = 0.95 - 0.05 * (c - 1.0);
        if features.is_emergency {
            confidence -= 0.10;
        }
        if asa >= 4.0 {
            confidence -= 0.05;
        }
        let confidence = round_to(confidence.clamp(0.5, 0.95), 2);

        DurationPrediction {
            predicted_min: predicted as u32,
            lower_min: (lower as u32).min(predicted as u32),
            upper_min: (upper as u32).max(predicted as u32),
            confidence,
        }
    }
}

fn hour_adjustment(hour: u32) -> f64 {
    if hour >= 15 {
        LATE_HOUR_MIN
    } else if hour < 8 {
        EARLY_HOUR_MIN
    } else {
        0.0
    }
}

fn weekday_adjustment(weekday: Weekday) -> f64 {
    match weekday {
        Weekday::Fri => FRIDAY_MIN,
        Weekday::Sat | Weekday::Sun => WEEKEND_MIN,
        _ => 0.0,
    }
}
