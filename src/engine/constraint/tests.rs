use super::{ConstraintEngine, ConstraintRule, PlacementRequest};
use crate::config::SchedulingConfig;
use crate::domain::resource::{Equipment, OperatingRoom, Staff};
use crate::domain::slot::{ScheduleSlot, TimeWindow};
use crate::domain::surgery::{PatientProfile, ProcedureProfile, Surgery};
use crate::domain::types::{
    ApprovalStatus, EquipmentStatus, EquipmentType, Priority, RoomStatus, RoomType, SlotType,
    SurgeryStatus,
};
use chrono::{NaiveDate, NaiveDateTime};

// ==========================================
// 测试辅助函数
// ==========================================

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn window(sh: u32, sm: u32, eh: u32, em: u32) -> TimeWindow {
    TimeWindow::new(at(sh, sm), at(eh, em))
}

fn create_test_surgery(id: &str, specialization: Option<&str>) -> Surgery {
    Surgery {
        surgery_id: id.to_string(),
        facility_id: "F1".to_string(),
        patient: PatientProfile::default(),
        procedure: ProcedureProfile {
            name: "Laparoscopic cholecystectomy".to_string(),
            category: "general".to_string(),
            complexity: 3,
        },
        priority: Priority::Elective,
        estimated_duration_min: 60,
        predicted_duration_min: None,
        status: SurgeryStatus::Approved,
        approval_status: ApprovalStatus::Approved,
        required_specialization: specialization.map(|s| s.to_string()),
        required_equipment: vec![],
        room_id: None,
        surgeon_id: None,
        scheduled_start: None,
        scheduled_end: None,
        created_at: at(7, 0),
        updated_at: at(7, 0),
    }
}

fn create_test_room(id: &str, room_type: RoomType) -> OperatingRoom {
    OperatingRoom {
        room_id: id.to_string(),
        facility_id: "F1".to_string(),
        name: id.to_string(),
        room_type,
        status: RoomStatus::Available,
        capabilities: vec![],
    }
}

fn create_test_surgeon(id: &str, specialization: &str, max_hours: f64) -> Staff {
    Staff {
        staff_id: id.to_string(),
        facility_id: "F1".to_string(),
        name: format!("Dr. {}", id),
        specialization: specialization.to_string(),
        max_hours_per_day: max_hours,
    }
}

fn create_test_slot(
    surgery_id: &str,
    room_id: &str,
    surgeon_id: Option<&str>,
    w: TimeWindow,
) -> ScheduleSlot {
    ScheduleSlot {
        slot_id: format!("{}-{}", surgery_id, w.start),
        facility_id: "F1".to_string(),
        room_id: room_id.to_string(),
        surgery_id: surgery_id.to_string(),
        surgeon_id: surgeon_id.map(|s| s.to_string()),
        slot_type: SlotType::Surgery,
        start_time: w.start,
        end_time: w.end,
    }
}

fn create_test_equipment(id: &str, status: EquipmentStatus) -> Equipment {
    Equipment {
        equipment_id: id.to_string(),
        facility_id: "F1".to_string(),
        name: format!("Device {}", id),
        equipment_type: EquipmentType::Surgical,
        status,
        usage_count: 0,
        max_usage_before_maintenance: 100,
        last_service_at: None,
    }
}

fn request<'a>(
    surgery: &'a Surgery,
    room: &'a OperatingRoom,
    w: TimeWindow,
    slots: &'a [ScheduleSlot],
) -> PlacementRequest<'a> {
    PlacementRequest {
        surgery,
        room,
        window: w,
        existing_slots: slots,
        surgeon: None,
        equipment: &[],
    }
}

// ==========================================
// 房间重叠
// ==========================================

#[test]
fn test_overlap_one_minute_is_conflict() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    let slots = vec![create_test_slot("S-OLD", "OR-1", None, window(10, 59, 12, 0))];

    let check = engine.check_placement(&request(&surgery, &room, window(10, 0, 11, 0), &slots));

    assert!(check.conflict);
    assert_eq!(check.hard_rule_names(), vec!["no_overlap"]);
    assert_eq!(check.score, 75);
}

#[test]
fn test_touching_windows_do_not_overlap() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    let slots = vec![create_test_slot("S-OLD", "OR-1", None, window(10, 0, 11, 0))];

    let check = engine.check_placement(&request(&surgery, &room, window(11, 0, 12, 0), &slots));

    assert!(!check.conflict);
    assert!(check.hard_violations.is_empty());
}

#[test]
fn test_other_room_and_own_slots_ignored() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    let slots = vec![
        create_test_slot("S-OLD", "OR-2", None, window(10, 0, 11, 0)),
        create_test_slot("S-NEW", "OR-1", None, window(10, 0, 11, 0)),
    ];

    let check = engine.check_placement(&request(&surgery, &room, window(10, 0, 11, 0), &slots));
    assert!(!check.conflict);
}

#[test]
fn test_turnover_padding_extends_occupied_window() {
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    let slots = vec![create_test_slot("S-OLD", "OR-1", None, window(9, 0, 10, 0))];

    let literal = ConstraintEngine::default();
    let padded = ConstraintEngine::default().with_turnover(15, 15);

    let back_to_back = request(&surgery, &room, window(10, 0, 11, 0), &slots);
    assert!(!literal.check_placement(&back_to_back).conflict);
    assert!(padded
        .check_placement(&back_to_back)
        .has_hard(ConstraintRule::NoOverlap));

    let after_setup = request(&surgery, &room, window(10, 15, 11, 15), &slots);
    assert!(!padded.check_placement(&after_setup).conflict);
}

#[test]
fn test_check_is_pure() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    let slots = vec![create_test_slot("S-OLD", "OR-1", None, window(10, 30, 11, 30))];
    let before = slots.clone();

    let req = request(&surgery, &room, window(10, 0, 11, 0), &slots);
    let first = engine.check_placement(&req);
    let second = engine.check_placement(&req);

    assert_eq!(first, second);
    assert_eq!(slots, before);
}

// ==========================================
// 手术室 / 医生 / 设备
// ==========================================

#[test]
fn test_room_capability_and_status() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", Some("cardiac"));

    let neuro = create_test_room("OR-N", RoomType::Neuro);
    let check = engine.check_placement(&request(&surgery, &neuro, window(9, 0, 10, 0), &[]));
    assert_eq!(check.hard_rule_names(), vec!["room_capability"]);

    let mut general = create_test_room("OR-G", RoomType::General);
    assert!(!engine
        .check_placement(&request(&surgery, &general, window(9, 0, 10, 0), &[]))
        .conflict);

    general.status = RoomStatus::Maintenance;
    let check = engine.check_placement(&request(&surgery, &general, window(9, 0, 10, 0), &[]));
    assert_eq!(check.hard_rule_names(), vec!["room_unavailable"]);
}

#[test]
fn test_surgeon_specialization_mismatch() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", Some("orthopedic"));
    let room = create_test_room("OR-1", RoomType::General);
    let surgeon = create_test_surgeon("DR-1", "neuro", 10.0);

    let mut req = request(&surgery, &room, window(9, 0, 10, 0), &[]);
    req.surgeon = Some(&surgeon);

    let check = engine.check_placement(&req);
    assert_eq!(check.hard_rule_names(), vec!["surgeon_specialization"]);
}

#[test]
fn test_surgeon_hours_cap() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    // 已排 11 小时
    let slots = vec![create_test_slot("S-LONG", "OR-2", Some("DR-1"), window(7, 0, 18, 0))];

    let tight = create_test_surgeon("DR-1", "general", 12.0);
    let mut req = request(&surgery, &room, window(18, 15, 19, 45), &slots);
    req.surgeon = Some(&tight);
    let check = engine.check_placement(&req);
    assert_eq!(check.hard_rule_names(), vec!["surgeon_hours"]);
    assert!(check.has_soft(ConstraintRule::Overtime));

    let roomy = create_test_surgeon("DR-1", "general", 13.0);
    req.surgeon = Some(&roomy);
    assert!(!engine.check_placement(&req).conflict);
}

#[test]
fn test_surgeon_hours_window_rolls_across_midnight() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    // 前一日 13:00-23:00 已排 10 小时
    let evening = TimeWindow::new(
        at(13, 0) - chrono::Duration::days(1),
        at(23, 0) - chrono::Duration::days(1),
    );
    let slots = vec![create_test_slot("S-EVE", "OR-2", Some("DR-1"), evening)];
    let surgeon = create_test_surgeon("DR-1", "general", 12.0);

    // 次日 07:00-10:00: 前一日 13:00 起的 24 小时内共 13 小时
    let mut req = request(&surgery, &room, window(7, 0, 10, 0), &slots);
    req.surgeon = Some(&surgeon);
    let check = engine.check_placement(&req);
    assert_eq!(check.hard_rule_names(), vec!["surgeon_hours"]);

    // 次日 07:00-09:00: 恰好 12 小时，不超限
    let mut req = request(&surgery, &room, window(7, 0, 9, 0), &slots);
    req.surgeon = Some(&surgeon);
    assert!(!engine.check_placement(&req).conflict);
}

#[test]
fn test_surgeon_hours_ignores_work_outside_window() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    // 结束于 24 小时之前
    let old = TimeWindow::new(
        at(1, 0) - chrono::Duration::days(1),
        at(9, 0) - chrono::Duration::days(1),
    );
    let slots = vec![create_test_slot("S-OLD", "OR-2", Some("DR-1"), old)];
    let surgeon = create_test_surgeon("DR-1", "general", 8.0);

    let mut req = request(&surgery, &room, window(9, 30, 10, 30), &slots);
    req.surgeon = Some(&surgeon);
    assert!(!engine.check_placement(&req).conflict);
}

#[test]
fn test_surgeon_hours_counts_later_bookings() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    // 新手术之后的排程同样计入滚动窗口
    let slots = vec![create_test_slot("S-LATER", "OR-2", Some("DR-1"), window(12, 0, 19, 0))];
    let surgeon = create_test_surgeon("DR-1", "general", 8.0);

    let mut req = request(&surgery, &room, window(8, 0, 10, 0), &slots);
    req.surgeon = Some(&surgeon);
    assert_eq!(engine.check_placement(&req).hard_rule_names(), vec!["surgeon_hours"]);
}

#[test]
fn test_surgeon_double_booking_across_rooms() {
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    let surgeon = create_test_surgeon("DR-1", "general", 12.0);
    let slots = vec![create_test_slot("S-OLD", "OR-2", Some("DR-1"), window(10, 0, 11, 0))];

    let mut req = request(&surgery, &room, window(10, 30, 11, 30), &slots);
    req.surgeon = Some(&surgeon);

    let engine = ConstraintEngine::default();
    assert_eq!(
        engine.check_placement(&req).hard_rule_names(),
        vec!["surgeon_double_booked"]
    );

    let relaxed = ConstraintEngine::new(&SchedulingConfig {
        check_surgeon_double_booking: false,
        ..SchedulingConfig::default()
    });
    assert!(!relaxed.check_placement(&req).conflict);
}

#[test]
fn test_equipment_availability() {
    let engine = ConstraintEngine::default();
    let mut surgery = create_test_surgery("S-NEW", None);
    surgery.required_equipment = vec!["EQ-1".to_string(), "EQ-2".to_string()];
    let room = create_test_room("OR-1", RoomType::General);

    let ok = vec![
        create_test_equipment("EQ-1", EquipmentStatus::Available),
        create_test_equipment("EQ-2", EquipmentStatus::InUse),
    ];
    let mut req = request(&surgery, &room, window(9, 0, 10, 0), &[]);
    req.equipment = &ok;
    assert!(!engine.check_placement(&req).conflict);

    let blocked = vec![
        create_test_equipment("EQ-1", EquipmentStatus::Sterilizing),
        create_test_equipment("EQ-2", EquipmentStatus::Retired),
    ];
    req.equipment = &blocked;
    let check = engine.check_placement(&req);
    assert_eq!(check.hard_violations.len(), 2);
    assert_eq!(check.hard_rule_names(), vec!["equipment_unavailable"]);
    assert_eq!(check.score, 50);

    let missing = vec![create_test_equipment("EQ-1", EquipmentStatus::Available)];
    req.equipment = &missing;
    assert!(engine
        .check_placement(&req)
        .has_hard(ConstraintRule::EquipmentUnavailable));
}

// ==========================================
// 软约束与评分
// ==========================================

#[test]
fn test_soft_rules_are_advisory() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);

    let early = engine.check_placement(&request(&surgery, &room, window(6, 30, 7, 30), &[]));
    assert!(!early.conflict);
    assert_eq!(early.soft_rule_names(), vec!["early_start"]);
    assert_eq!(early.score, 95);

    let slots = vec![create_test_slot("S-OLD", "OR-1", None, window(7, 0, 8, 0))];
    let idle = engine.check_placement(&request(&surgery, &room, window(10, 0, 11, 0), &slots));
    assert!(!idle.conflict);
    assert_eq!(idle.soft_rule_names(), vec!["underutilization"]);

    let exactly_sixty = engine.check_placement(&request(&surgery, &room, window(9, 0, 10, 0), &slots));
    assert!(exactly_sixty.soft_violations.is_empty());
}

#[test]
fn test_score_floors_at_zero() {
    let engine = ConstraintEngine::default();
    let surgery = create_test_surgery("S-NEW", None);
    let room = create_test_room("OR-1", RoomType::General);
    let slots: Vec<ScheduleSlot> = (0..5)
        .map(|i| create_test_slot(&format!("S{}", i), "OR-1", None, window(9, i * 10, 9, i * 10 + 5)))
        .collect();

    let check = engine.check_placement(&request(&surgery, &room, window(9, 0, 10, 0), &slots));
    assert_eq!(check.hard_violations.len(), 5);
    assert_eq!(check.score, 0);
}
