// ==========================================
// 手术室排程系统 - 排程时段领域模型
// ==========================================
// 红线: start_time < end_time
// 红线: 每台已放置手术恰好 3 个时段 (setup/surgery/cleanup)，同一手术室
// ==========================================

use crate::domain::types::SlotType;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// TimeWindow - 半开区间 [start, end)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// 半开区间重叠: a.start < b.end && b.start < a.end（对称）
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_min(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// 与另一区间交集的分钟数（无交集为 0）
    pub fn overlap_min(&self, other: &TimeWindow) -> i64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            (end - start).num_minutes()
        } else {
            0
        }
    }

    /// 前后扩展周转时间（setup 前置, cleanup 后置）
    pub fn padded(&self, before_min: i64, after_min: i64) -> TimeWindow {
        TimeWindow {
            start: self.start - Duration::minutes(before_min),
            end: self.end + Duration::minutes(after_min),
        }
    }
}

// ==========================================
// ScheduleSlot - 排程时段
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub slot_id: String,
    pub facility_id: String,
    pub room_id: String,
    pub surgery_id: String,
    pub surgeon_id: Option<String>, // 放置时从手术冗余，用于医生工时/重叠检查
    pub slot_type: SlotType,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

impl ScheduleSlot {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    pub fn duration_min(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

/// 为一次放置生成 setup / surgery / cleanup 三个时段
///
/// # 参数
/// - `surgery_window`: 手术本体时段
/// - `setup_min` / `cleanup_min`: 前后周转分钟数
pub fn build_placement_slots(
    facility_id: &str,
    room_id: &str,
    surgery_id: &str,
    surgeon_id: Option<&str>,
    surgery_window: TimeWindow,
    setup_min: i64,
    cleanup_min: i64,
) -> Vec<ScheduleSlot> {
    let occupied = surgery_window.padded(setup_min, cleanup_min);
    let parts = [
        (SlotType::Setup, occupied.start, surgery_window.start),
        (SlotType::Surgery, surgery_window.start, surgery_window.end),
        (SlotType::Cleanup, surgery_window.end, occupied.end),
    ];

    parts
        .into_iter()
        .map(|(slot_type, start_time, end_time)| ScheduleSlot {
            slot_id: Uuid::new_v4().to_string(),
            facility_id: facility_id.to_string(),
            room_id: room_id.to_string(),
            surgery_id: surgery_id.to_string(),
            surgeon_id: surgeon_id.map(|s| s.to_string()),
            slot_type,
            start_time,
            end_time,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_overlap_is_half_open_and_symmetric() {
        let a = TimeWindow::new(at(10, 0), at(11, 0));
        let b = TimeWindow::new(at(10, 59), at(12, 0));
        let c = TimeWindow::new(at(11, 0), at(12, 0));

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));
        assert_eq!(a.overlap_min(&b), 1);
        assert_eq!(a.overlap_min(&c), 0);
    }

    #[test]
    fn test_build_placement_slots_produces_three_contiguous_slots() {
        let slots = build_placement_slots(
            "F1",
            "OR-1",
            "S1",
            Some("DR-1"),
            TimeWindow::new(at(10, 15), at(11, 15)),
            15,
            15,
        );

        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].slot_type, SlotType::Setup);
        assert_eq!(slots[0].start_time, at(10, 0));
        assert_eq!(slots[0].end_time, slots[1].start_time);
        assert_eq!(slots[1].slot_type, SlotType::Surgery);
        assert_eq!(slots[1].duration_min(), 60);
        assert_eq!(slots[2].slot_type, SlotType::Cleanup);
        assert_eq!(slots[2].end_time, at(11, 30));
        assert!(slots.iter().all(|s| s.room_id == "OR-1"));
    }
}
