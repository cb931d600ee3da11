use super::report::{ConstraintRule, PlacementCheck, Violation};
use crate::config::SchedulingConfig;
use crate::domain::resource::{Equipment, OperatingRoom, Staff};
use crate::domain::slot::{ScheduleSlot, TimeWindow};
use crate::domain::surgery::Surgery;
use crate::domain::types::SlotType;
use chrono::{Duration, Timelike};
use tracing::{debug, instrument};

/// 一次候选放置的完整输入（全部为只读快照）
#[derive(Debug, Clone, Copy)]
pub struct PlacementRequest<'a> {
    pub surgery: &'a Surgery,
    pub room: &'a OperatingRoom,
    /// 手术本体时段（不含准备/清洁）
    pub window: TimeWindow,
    pub existing_slots: &'a [ScheduleSlot],
    pub surgeon: Option<&'a Staff>,
    pub equipment: &'a [Equipment],
}

// ==========================================
// ConstraintEngine - 约束引擎
// ==========================================
#[derive(Debug, Clone)]
pub struct ConstraintEngine {
    // 周转填充（仅作用于 no_overlap / underutilization）
    setup_pad_min: i64,
    cleanup_pad_min: i64,

    overtime_hour: u32,
    early_start_hour: u32,
    underutilization_gap_minutes: i64,
    surgeon_hours_window_hours: i64,
    check_surgeon_double_booking: bool,
}

impl Default for ConstraintEngine {
    fn default() -> Self {
        Self::new(&SchedulingConfig::default())
    }
}

impl ConstraintEngine {
    /// 构造函数（按字面时间窗检查）
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            setup_pad_min: 0,
            cleanup_pad_min: 0,
            overtime_hour: config.overtime_hour,
            early_start_hour: config.early_start_hour,
            underutilization_gap_minutes: config.underutilization_gap_minutes,
            surgeon_hours_window_hours: config.surgeon_hours_window_hours,
            check_surgeon_double_booking: config.check_surgeon_double_booking,
        }
    }

    /// 按实际占用区间 [start − setup, end + cleanup) 检查房间冲突
    pub fn with_turnover(mut self, setup_min: i64, cleanup_min: i64) -> Self {
        self.setup_pad_min = setup_min.max(0);
        self.cleanup_pad_min = cleanup_min.max(0);
        self
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 检查一次候选放置
    ///
    /// 硬约束（顺序固定）:
    /// no_overlap → room_unavailable → room_capability → surgeon_specialization
    /// → surgeon_hours → surgeon_double_booked → equipment_unavailable
    ///
    /// 软约束: overtime / early_start / underutilization
    ///
    /// 同一手术自身的时段一律忽略（重新放置时不与自己冲突）
    #[instrument(
        level = "debug",
        skip_all,
        fields(surgery_id = %req.surgery.surgery_id, room_id = %req.room.room_id)
    )]
    pub fn check_placement(&self, req: &PlacementRequest<'_>) -> PlacementCheck {
        let mut hard = Vec::new();
        let mut soft = Vec::new();

        let occupied = req.window.padded(self.setup_pad_min, self.cleanup_pad_min);
        let room_slots: Vec<&ScheduleSlot> = req
            .existing_slots
            .iter()
            .filter(|s| s.room_id == req.room.room_id && s.surgery_id != req.surgery.surgery_id)
            .collect();

        // ===== 硬约束 =====

        if req.window.start >= req.window.end {
            hard.push(Violation::new(
                ConstraintRule::NoOverlap,
                format!(
                    "时间窗非法: {} 不早于 {}",
                    req.window.start, req.window.end
                ),
            ));
        }

        for slot in room_slots.iter().filter(|s| s.window().overlaps(&occupied)) {
            hard.push(Violation::new(
                ConstraintRule::NoOverlap,
                format!(
                    "与手术 {} 的 {} 时段 [{} - {}) 重叠",
                    slot.surgery_id,
                    slot.slot_type,
                    slot.start_time.format("%H:%M"),
                    slot.end_time.format("%H:%M")
                ),
            ));
        }

        if !req.room.status.accepts_placements() {
            hard.push(Violation::new(
                ConstraintRule::RoomUnavailable,
                format!("手术室 {} 当前状态为 {}", req.room.room_id, req.room.status),
            ));
        }

        let required = req.surgery.required_specialization.as_deref();
        if !req.room.supports(required) {
            hard.push(Violation::new(
                ConstraintRule::RoomCapability,
                format!(
                    "手术室 {}({}) 不具备专科能力 {}",
                    req.room.room_id,
                    req.room.room_type,
                    required.unwrap_or_default()
                ),
            ));
        }

        if let Some(surgeon) = req.surgeon {
            if !surgeon.matches_specialization(required) {
                hard.push(Violation::new(
                    ConstraintRule::SurgeonSpecialization,
                    format!(
                        "医生 {} 专科为 {}，手术要求 {}",
                        surgeon.staff_id,
                        surgeon.specialization,
                        required.unwrap_or_default()
                    ),
                ));
            }

            if let Some(v) = self.check_surgeon_hours(req, surgeon) {
                hard.push(v);
            }

            if self.check_surgeon_double_booking {
                hard.extend(self.check_double_booking(req, surgeon));
            }
        }

        hard.extend(check_equipment(req));

        // ===== 软约束 =====

        if self.ends_late(&req.window) {
            soft.push(Violation::new(
                ConstraintRule::Overtime,
                format!(
                    "手术结束于 {}，不早于 {}:00",
                    req.window.end.format("%H:%M"),
                    self.overtime_hour
                ),
            ));
        }

        if req.window.start.hour() < self.early_start_hour {
            soft.push(Violation::new(
                ConstraintRule::EarlyStart,
                format!(
                    "手术开始于 {}，早于 {}:00",
                    req.window.start.format("%H:%M"),
                    self.early_start_hour
                ),
            ));
        }

        let preceding_end = room_slots
            .iter()
            .filter(|s| s.end_time <= occupied.start && s.end_time.date() == occupied.start.date())
            .map(|s| s.end_time)
            .max();
        if let Some(prev_end) = preceding_end {
            let gap = (occupied.start - prev_end).num_minutes();
            if gap > self.underutilization_gap_minutes {
                soft.push(Violation::new(
                    ConstraintRule::Underutilization,
                    format!("放置前手术室空闲 {} 分钟", gap),
                ));
            }
        }

        let check = PlacementCheck::from_violations(hard, soft);
        debug!(
            conflict = check.conflict,
            hard = check.hard_violations.len(),
            soft = check.soft_violations.len(),
            score = check.score,
            "约束检查完成"
        );
        check
    }

    // ==========================================
    // 内部规则
    // ==========================================

    /// 医生工时: 任意连续 N 小时（滚动窗口）内手术分钟 ≤ 上限
    ///
    /// 只检查与新手术相交的窗口；峰值窗口必然以某段手术的开始为起点
    /// 或以某段手术的结束为终点，逐一枚举即可
    fn check_surgeon_hours(&self, req: &PlacementRequest<'_>, surgeon: &Staff) -> Option<Violation> {
        let span = Duration::hours(self.surgeon_hours_window_hours);
        let mut booked: Vec<TimeWindow> = req
            .existing_slots
            .iter()
            .filter(|s| {
                s.slot_type == SlotType::Surgery
                    && s.surgery_id != req.surgery.surgery_id
                    && s.surgeon_id.as_deref() == Some(surgeon.staff_id.as_str())
                    && s.end_time > req.window.start - span
                    && s.start_time < req.window.end + span
            })
            .map(|s| s.window())
            .collect();
        booked.push(req.window);

        let peak = booked
            .iter()
            .flat_map(|w| [w.start, w.end - span])
            .filter(|t| *t < req.window.end && *t + span > req.window.start)
            .map(|t| {
                let rolling = TimeWindow::new(t, t + span);
                let minutes: i64 = booked.iter().map(|w| w.overlap_min(&rolling)).sum();
                (minutes, rolling)
            })
            .max_by_key(|(minutes, _)| *minutes);

        let (total_min, rolling) = peak?;
        let cap_min = surgeon.max_hours_per_day * 60.0;
        if total_min as f64 > cap_min {
            Some(Violation::new(
                ConstraintRule::SurgeonHours,
                format!(
                    "医生 {} 在 {} 起 {} 小时内共排 {} 分钟（含本台 {} 分钟），超过上限 {} 小时",
                    surgeon.staff_id,
                    rolling.start.format("%Y-%m-%d %H:%M"),
                    self.surgeon_hours_window_hours,
                    total_min,
                    req.window.duration_min(),
                    surgeon.max_hours_per_day
                ),
            ))
        } else {
            None
        }
    }

    /// 医生跨手术室重叠（同一手术室由 no_overlap 覆盖）
    fn check_double_booking(&self, req: &PlacementRequest<'_>, surgeon: &Staff) -> Vec<Violation> {
        req.existing_slots
            .iter()
            .filter(|s| {
                s.slot_type == SlotType::Surgery
                    && s.room_id != req.room.room_id
                    && s.surgery_id != req.surgery.surgery_id
                    && s.surgeon_id.as_deref() == Some(surgeon.staff_id.as_str())
                    && s.window().overlaps(&req.window)
            })
            .map(|s| {
                Violation::new(
                    ConstraintRule::SurgeonDoubleBooked,
                    format!(
                        "医生 {} 同时段在 {} 执行手术 {}",
                        surgeon.staff_id, s.room_id, s.surgery_id
                    ),
                )
            })
            .collect()
    }

    fn ends_late(&self, window: &TimeWindow) -> bool {
        window.end.date() > window.start.date() || window.end.hour() >= self.overtime_hour
    }
}

/// 设备可用性: 维护/报废/消毒中 或 未登记 的设备阻断放置
fn check_equipment(req: &PlacementRequest<'_>) -> Vec<Violation> {
    req.surgery
        .required_equipment
        .iter()
        .filter_map(|equipment_id| {
            match req.equipment.iter().find(|e| &e.equipment_id == equipment_id) {
                None => Some(Violation::new(
                    ConstraintRule::EquipmentUnavailable,
                    format!("设备 {} 未登记", equipment_id),
                )),
                Some(e) if e.status.blocks_placement() => Some(Violation::new(
                    ConstraintRule::EquipmentUnavailable,
                    format!("设备 {}({}) 当前状态为 {}", e.equipment_id, e.name, e.status),
                )),
                Some(_) => None,
            }
        })
        .collect()
}
