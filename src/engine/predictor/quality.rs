use crate::config::SchedulingConfig;
use crate::domain::slot::ScheduleSlot;
use crate::domain::types::{ScheduleGrade, SlotType};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const IDLE_GAP_MIN: i64 = 30;
const IDLE_GAP_PENALTY: i64 = 5;
const BREAK_GAP_MIN: i64 = 120;
const NO_BREAK_PENALTY: i64 = 10;
const LATE_END_PENALTY: i64 = 3;
const HEAVY_RUN_LEN: usize = 3;
const HEAVY_COMPLEXITY: u8 = 4;
const HEAVY_RUN_PENALTY: i64 = 8;

/// 排程质量报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleQualityReport {
    pub score: u8,
    pub grade: ScheduleGrade,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    /// 扰动概率（百分比 5-95）
    pub disruption_probability_pct: u8,
}

// ==========================================
// ScheduleScorer - 排程质量评分
// ==========================================
#[derive(Debug, Clone)]
pub struct ScheduleScorer {
    overtime_hour: u32,
}

impl Default for ScheduleScorer {
    fn default() -> Self {
        Self::from_config(&SchedulingConfig::default())
    }
}

impl ScheduleScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self {
            overtime_hour: config.overtime_hour,
        }
    }

    /// 对一组时段评分
    ///
    /// 扣分规则（起始 100）:
    /// 1) 同一手术室相邻时段空闲 >30 分钟: 每处 −5
    /// 2) 手术台数 >2 且不存在 ≥2 小时空档: −10
    /// 3) 手术时段结束 ≥ 加班时点: 每台 −3
    /// 4) 同一手术室连续 ≥3 台复杂度≥4: 整体 −8（仅一次）
    ///
    /// 只统计 surgery 类型时段；准备/清洁时段不计入空闲、台数与扰动
    /// 长空档只看同一手术室相邻两台手术之间，末台手术到下班不算
    ///
    /// # 参数
    /// - `slots`: 待评分时段（可跨手术室）
    /// - `complexity_by_surgery`: surgery_id -> 复杂度（缺失按 3）
    pub fn score(
        &self,
        slots: &[ScheduleSlot],
        complexity_by_surgery: &HashMap<String, u8>,
    ) -> ScheduleQualityReport {
        let mut penalty: i64 = 0;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let surgeries: Vec<&ScheduleSlot> = slots
            .iter()
            .filter(|s| s.slot_type == SlotType::Surgery)
            .collect();
        let surgery_count = surgeries.len();

        // 按手术室分组，组内按开始时间排序（BTreeMap 保证输出顺序稳定）
        let mut by_room: BTreeMap<&str, Vec<&ScheduleSlot>> = BTreeMap::new();
        for slot in surgeries.iter().copied() {
            by_room.entry(slot.room_id.as_str()).or_default().push(slot);
        }
        for room_slots in by_room.values_mut() {
            room_slots.sort_by_key(|s| (s.start_time, s.end_time));
        }

        // 1) 空闲间隔 + 2) 长空档
        let mut idle_gaps = 0usize;
        let mut has_break = false;
        for (room_id, room_slots) in &by_room {
            for pair in room_slots.windows(2) {
                let gap = (pair[1].start_time - pair[0].end_time).num_minutes();
                if gap > IDLE_GAP_MIN {
                    idle_gaps += 1;
                    penalty += IDLE_GAP_PENALTY;
                    issues.push(format!(
                        "{} 在 {} 之后空闲 {} 分钟",
                        room_id,
                        pair[0].end_time.format("%H:%M"),
                        gap
                    ));
                }
                if gap >= BREAK_GAP_MIN {
                    has_break = true;
                }
            }
        }
        if idle_gaps > 0 {
            recommendations.push("压缩相邻手术之间的空闲间隔以提高手术室利用率".to_string());
        }
        if surgery_count > 2 && !has_break {
            penalty += NO_BREAK_PENALTY;
            issues.push(format!("{} 台手术之间没有 2 小时以上的缓冲空档", surgery_count));
            recommendations.push("预留至少一个 2 小时空档用于急诊插台".to_string());
        }

        // 3) 加班
        let late: Vec<&ScheduleSlot> = surgeries
            .iter()
            .copied()
            .filter(|s| self.ends_late(s))
            .collect();
        if !late.is_empty() {
            penalty += LATE_END_PENALTY * late.len() as i64;
            for slot in &late {
                issues.push(format!(
                    "手术 {} 结束于 {}，超出常规时段",
                    slot.surgery_id,
                    slot.end_time.format("%H:%M")
                ));
            }
            recommendations.push("将晚间结束的手术前移或分配到其他手术室".to_string());
        }

        // 4) 连续高复杂度
        let heavy_run = by_room.values().any(|room_slots| {
            let mut run = 0usize;
            for slot in room_slots {
                let complexity = complexity_by_surgery
                    .get(&slot.surgery_id)
                    .copied()
                    .unwrap_or(3);
                if complexity >= HEAVY_COMPLEXITY {
                    run += 1;
                    if run >= HEAVY_RUN_LEN {
                        return true;
                    }
                } else {
                    run = 0;
                }
            }
            false
        });
        if heavy_run {
            penalty += HEAVY_RUN_PENALTY;
            issues.push("同一手术室连续安排了 3 台及以上高复杂度手术".to_string());
            recommendations.push("在高复杂度手术之间穿插低复杂度手术以降低团队疲劳".to_string());
        }

        let score = (100 - penalty).clamp(0, 100) as u8;
        let disruption =
            (100 - score as i64 + 2 * surgery_count as i64).clamp(5, 95) as u8;

        debug!(
            slot_count = slots.len(),
            surgery_count,
            score,
            "排程质量评分完成"
        );

        ScheduleQualityReport {
            score,
            grade: ScheduleGrade::from_score(score),
            issues,
            recommendations,
            disruption_probability_pct: disruption,
        }
    }

    fn ends_late(&self, slot: &ScheduleSlot) -> bool {
        slot.end_time.date() > slot.start_time.date() || slot.end_time.hour() >= self.overtime_hour
    }
}
