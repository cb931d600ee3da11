// ==========================================
// 手术室排程系统 - 时段分配器
// ==========================================
// 红线: first-fit 贪心,可解释,不做全局优化
// 红线: 分配结果必须通过约束引擎复核（与检查器一致）
// ==========================================
// 职责: 为单台手术在指定日期寻找首个可用时段
// 输入: 手术 + 手术室列表（按列表顺序）+ 现有时段
// 输出: (手术室, 开始, 结束) 或 None
// ==========================================

use crate::config::SchedulingConfig;
use crate::domain::resource::{Equipment, OperatingRoom, Staff};
use crate::domain::slot::{ScheduleSlot, TimeWindow};
use crate::domain::surgery::Surgery;
use crate::engine::constraint::{ConstraintEngine, PlacementCheck, PlacementRequest};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// 一次分配的输入快照
#[derive(Debug, Clone, Copy)]
pub struct SlotSearch<'a> {
    pub surgery: &'a Surgery,
    pub rooms: &'a [OperatingRoom],
    pub existing_slots: &'a [ScheduleSlot],
    pub date: NaiveDate,
    /// 不早于该时刻开始占用（通常为当前时间）
    pub not_before: Option<NaiveDateTime>,
    pub surgeon: Option<&'a Staff>,
    pub equipment: &'a [Equipment],
}

/// 分配结果（start/end 为手术本体时段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotProposal {
    pub room_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub check: PlacementCheck,
}

impl SlotProposal {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

// ==========================================
// SlotAllocator - first-fit 时段分配
// ==========================================
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    config: SchedulingConfig,
    engine: ConstraintEngine,
}

impl SlotAllocator {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            engine: ConstraintEngine::new(config)
                .with_turnover(config.setup_minutes, config.cleanup_minutes),
            config: config.clone(),
        }
    }

    /// 寻找首个可用时段
    ///
    /// 规则:
    /// 1) 按列表顺序遍历能力匹配且可用的手术室
    /// 2) 在 [day_start, day_end) 内按时段开始时间顺序游走，
    ///    将 setup + 时长 + cleanup 放入首个足够大的空档
    /// 3) 否则尝试放在最后一个时段之后（需在 day_end 前结束）
    /// 4) 每个候选经约束引擎复核，存在硬违反则继续扫描
    ///
    /// # 返回
    /// - Some(SlotProposal): 首个可行位置
    /// - None: 所有手术室/空档均不可行（不在内部重试）
    #[instrument(skip_all, fields(surgery_id = %search.surgery.surgery_id, date = %search.date))]
    pub fn find_slot(&self, search: &SlotSearch<'_>) -> Option<SlotProposal> {
        let duration_min = search.surgery.planned_duration_min() as i64;
        if duration_min <= 0 {
            debug!("手术时长为 0，跳过分配");
            return None;
        }

        let day = self.config.day_window(search.date);
        let needed = Duration::minutes(self.config.setup_minutes + duration_min + self.config.cleanup_minutes);
        let earliest = match search.not_before {
            Some(t) if t > day.start => ceil_to_minute(t),
            _ => day.start,
        };
        if earliest + needed > day.end {
            debug!(earliest = %earliest, "当日剩余时间不足");
            return None;
        }

        let required = search.surgery.required_specialization.as_deref();
        for room in search
            .rooms
            .iter()
            .filter(|r| r.status.accepts_placements() && r.supports(required))
        {
            if let Some(proposal) = self.scan_room(search, room, day, earliest, needed, duration_min) {
                info!(
                    room_id = %proposal.room_id,
                    start = %proposal.start,
                    end = %proposal.end,
                    score = proposal.check.score,
                    "找到可用时段"
                );
                return Some(proposal);
            }
            debug!(room_id = %room.room_id, "手术室无可用空档");
        }

        info!("无可行时段");
        None
    }

    fn scan_room(
        &self,
        search: &SlotSearch<'_>,
        room: &OperatingRoom,
        day: TimeWindow,
        earliest: NaiveDateTime,
        needed: Duration,
        duration_min: i64,
    ) -> Option<SlotProposal> {
        let mut room_slots: Vec<&ScheduleSlot> = search
            .existing_slots
            .iter()
            .filter(|s| s.room_id == room.room_id && s.surgery_id != search.surgery.surgery_id)
            .collect();
        room_slots.sort_by_key(|s| (s.start_time, s.end_time));

        let mut cursor = earliest;
        for slot in room_slots {
            if slot.end_time <= cursor {
                continue;
            }
            if slot.start_time >= cursor
                && slot.start_time - cursor >= needed
                && cursor + needed <= day.end
            {
                if let Some(p) = self.confirm(search, room, cursor, duration_min) {
                    return Some(p);
                }
            }
            cursor = cursor.max(slot.end_time);
            if cursor >= day.end {
                return None;
            }
        }

        if day.end - cursor >= needed {
            return self.confirm(search, room, cursor, duration_min);
        }
        None
    }

    /// 候选经约束引擎复核
    fn confirm(
        &self,
        search: &SlotSearch<'_>,
        room: &OperatingRoom,
        occupied_start: NaiveDateTime,
        duration_min: i64,
    ) -> Option<SlotProposal> {
        let start = occupied_start + Duration::minutes(self.config.setup_minutes);
        let window = TimeWindow::new(start, start + Duration::minutes(duration_min));

        let check = self.engine.check_placement(&PlacementRequest {
            surgery: search.surgery,
            room,
            window,
            existing_slots: search.existing_slots,
            surgeon: search.surgeon,
            equipment: search.equipment,
        });

        if check.conflict {
            debug!(
                room_id = %room.room_id,
                start = %window.start,
                rules = ?check.hard_rule_names(),
                "候选时段被约束引擎否决"
            );
            return None;
        }

        Some(SlotProposal {
            room_id: room.room_id.clone(),
            start: window.start,
            end: window.end,
            check,
        })
    }
}

/// 向上取整到整分钟
fn ceil_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    let truncated = t
        .date()
        .and_hms_opt(t.hour(), t.minute(), 0)
        .unwrap_or(t);
    if truncated < t {
        truncated + Duration::minutes(1)
    } else {
        truncated
    }
}
