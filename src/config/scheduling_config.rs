// ==========================================
// 手术室排程系统 - 排程参数
// ==========================================
// 职责: 汇总所有可调参数及其默认值
// 覆写: ConfigManager 从 config_kv 表读取 global 覆写
// ==========================================

use crate::domain::slot::TimeWindow;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 排程参数（全部带默认值，可从 JSON / config_kv 覆写）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// 院区ID（所有读写限定在该院区）
    pub facility_id: String,

    // ===== 手术日窗口 =====
    pub day_start_hour: u32,
    pub day_end_hour: u32,

    // ===== 周转时间 =====
    pub setup_minutes: i64,
    pub cleanup_minutes: i64,

    // ===== 软约束阈值 =====
    pub overtime_hour: u32,
    pub early_start_hour: u32,
    pub underutilization_gap_minutes: i64,

    // ===== 医生工时 =====
    pub surgeon_hours_window_hours: i64,
    pub check_surgeon_double_booking: bool,

    // ===== 升级阈值 =====
    pub elective_escalation_hours: i64,
    pub urgent_escalation_hours: i64,

    // ===== 运行参数 =====
    pub persistence_timeout_ms: u64,
    pub queue_refresh_interval_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            facility_id: "default".to_string(),
            day_start_hour: 7,
            day_end_hour: 20,
            setup_minutes: 15,
            cleanup_minutes: 15,
            overtime_hour: 18,
            early_start_hour: 7,
            underutilization_gap_minutes: 60,
            surgeon_hours_window_hours: 24,
            check_surgeon_double_booking: true,
            elective_escalation_hours: 72,
            urgent_escalation_hours: 48,
            persistence_timeout_ms: 2_000,
            queue_refresh_interval_secs: 300,
        }
    }
}

impl SchedulingConfig {
    /// 指定院区的默认配置
    pub fn for_facility(facility_id: &str) -> Self {
        Self {
            facility_id: facility_id.to_string(),
            ..Self::default()
        }
    }

    /// 某日的手术日窗口 [day_start, day_end)
    pub fn day_window(&self, date: NaiveDate) -> TimeWindow {
        TimeWindow::new(
            date.and_time(hour_of(self.day_start_hour)),
            date.and_time(hour_of(self.day_end_hour)),
        )
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms)
    }

    pub fn queue_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.queue_refresh_interval_secs.max(1))
    }

    /// 参数自洽性检查
    pub fn validate(&self) -> Result<(), String> {
        if self.facility_id.trim().is_empty() {
            return Err("facility_id 不能为空".to_string());
        }
        if self.day_start_hour >= self.day_end_hour || self.day_end_hour > 24 {
            return Err(format!(
                "手术日窗口非法: {}:00-{}:00",
                self.day_start_hour, self.day_end_hour
            ));
        }
        if self.setup_minutes < 0 || self.cleanup_minutes < 0 {
            return Err("周转时间不能为负".to_string());
        }
        if self.surgeon_hours_window_hours <= 0 {
            return Err("医生工时窗口必须为正".to_string());
        }
        Ok(())
    }
}

/// 整点时间（24 视为 23:59:59）
pub(crate) fn hour_of(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}
