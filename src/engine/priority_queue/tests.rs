use super::core::aging_severity;
use super::PriorityQueueEngine;
use crate::config::SchedulingConfig;
use crate::domain::surgery::{PatientProfile, ProcedureProfile, Surgery};
use crate::domain::types::{AgingSeverity, ApprovalStatus, Priority, SurgeryStatus};
use chrono::{Duration, NaiveDate, NaiveDateTime};

// ==========================================
// 测试辅助函数
// ==========================================

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 10)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn create_test_surgery(
    id: &str,
    priority: Priority,
    status: SurgeryStatus,
    waited: Duration,
) -> Surgery {
    let created = now() - waited;
    Surgery {
        surgery_id: id.to_string(),
        facility_id: "F1".to_string(),
        patient: PatientProfile::default(),
        procedure: ProcedureProfile {
            name: "Knee arthroscopy".to_string(),
            category: "orthopedic".to_string(),
            complexity: 2,
        },
        priority,
        estimated_duration_min: 90,
        predicted_duration_min: None,
        status,
        approval_status: ApprovalStatus::Pending,
        required_specialization: None,
        required_equipment: vec![],
        room_id: None,
        surgeon_id: None,
        scheduled_start: None,
        scheduled_end: None,
        created_at: created,
        updated_at: created,
    }
}

// ==========================================
// 升级判定
// ==========================================

#[test]
fn test_elective_escalation_threshold() {
    let engine = PriorityQueueEngine::default();
    let surgeries = vec![
        create_test_surgery("OLD", Priority::Elective, SurgeryStatus::Pending, Duration::hours(73)),
        create_test_surgery("NEW", Priority::Elective, SurgeryStatus::Pending, Duration::hours(71)),
    ];

    let snapshot = engine.build(&surgeries, now());

    let old = snapshot.find("OLD").unwrap();
    assert_eq!(old.wait_hours, 73);
    assert!(old.escalate);
    let new = snapshot.find("NEW").unwrap();
    assert_eq!(new.wait_hours, 71);
    assert!(!new.escalate);
}

#[test]
fn test_urgent_and_emergency_thresholds() {
    let engine = PriorityQueueEngine::default();
    assert!(!engine.should_escalate(Priority::Urgent, 48));
    assert!(engine.should_escalate(Priority::Urgent, 49));
    assert!(!engine.should_escalate(Priority::Emergency, 10_000));
    assert!(!engine.should_escalate(Priority::Elective, 72));
}

#[test]
fn test_escalation_flag_is_monotonic_in_wait() {
    let engine = PriorityQueueEngine::default();
    for priority in Priority::ALL {
        let mut seen = false;
        for hours in 0..200 {
            let flag = engine.should_escalate(priority, hours);
            if seen {
                assert!(flag, "{} 在 {} 小时回落", priority, hours);
            }
            seen |= flag;
        }
    }
}

#[test]
fn test_thresholds_follow_config() {
    let engine = PriorityQueueEngine::new(&SchedulingConfig {
        elective_escalation_hours: 24,
        ..SchedulingConfig::default()
    });
    assert!(engine.should_escalate(Priority::Elective, 25));
}

#[test]
fn test_wait_hours_rounds_to_nearest() {
    let engine = PriorityQueueEngine::default();
    let s = create_test_surgery(
        "S1",
        Priority::Elective,
        SurgeryStatus::Pending,
        Duration::minutes(72 * 60 + 31),
    );
    let entry = engine.entry_for(&s, now());
    assert_eq!(entry.wait_hours, 73);
    assert!(entry.escalate);

    let future = create_test_surgery("S2", Priority::Urgent, SurgeryStatus::Pending, Duration::hours(-3));
    assert_eq!(engine.entry_for(&future, now()).wait_hours, 0);
}

// ==========================================
// 分层与排序
// ==========================================

#[test]
fn test_tiers_sorted_by_wait_desc_and_inactive_excluded() {
    let engine = PriorityQueueEngine::default();
    let surgeries = vec![
        create_test_surgery("E-SHORT", Priority::Elective, SurgeryStatus::Approved, Duration::hours(5)),
        create_test_surgery("E-LONG", Priority::Elective, SurgeryStatus::Scheduled, Duration::hours(50)),
        create_test_surgery("E-DONE", Priority::Elective, SurgeryStatus::Completed, Duration::hours(90)),
        create_test_surgery("U-1", Priority::Urgent, SurgeryStatus::Pending, Duration::hours(3)),
        create_test_surgery("X-1", Priority::Emergency, SurgeryStatus::InProgress, Duration::hours(1)),
        create_test_surgery("X-GONE", Priority::Emergency, SurgeryStatus::Cancelled, Duration::hours(1)),
    ];

    let snapshot = engine.build(&surgeries, now());

    let ids = |p: Priority| -> Vec<String> {
        snapshot.tier(p).iter().map(|e| e.surgery_id.clone()).collect()
    };
    assert_eq!(ids(Priority::Elective), vec!["E-LONG", "E-SHORT"]);
    assert_eq!(ids(Priority::Urgent), vec!["U-1"]);
    assert_eq!(ids(Priority::Emergency), vec!["X-1"]);
    assert_eq!(snapshot.len(), 4);
    assert!(snapshot.find("E-DONE").is_none());
}

#[test]
fn test_ties_broken_by_creation_then_id() {
    let engine = PriorityQueueEngine::default();
    let a = create_test_surgery("B", Priority::Urgent, SurgeryStatus::Pending, Duration::minutes(600));
    let b = create_test_surgery("A", Priority::Urgent, SurgeryStatus::Pending, Duration::minutes(610));
    let c = create_test_surgery("C", Priority::Urgent, SurgeryStatus::Pending, Duration::minutes(610));

    let snapshot = engine.build(&[a, b, c], now());
    let ids: Vec<&str> = snapshot
        .tier(Priority::Urgent)
        .iter()
        .map(|e| e.surgery_id.as_str())
        .collect();
    // 三者 wait_hours 均为 10；A/C 创建更早，A < C
    assert_eq!(ids, vec!["A", "C", "B"]);
}

#[test]
fn test_build_is_idempotent() {
    let engine = PriorityQueueEngine::default();
    let surgeries = vec![
        create_test_surgery("S1", Priority::Elective, SurgeryStatus::Pending, Duration::hours(80)),
        create_test_surgery("S2", Priority::Urgent, SurgeryStatus::Pending, Duration::hours(30)),
    ];
    assert_eq!(engine.build(&surgeries, now()), engine.build(&surgeries, now()));
}

#[test]
fn test_display_duration_prefers_prediction() {
    let engine = PriorityQueueEngine::default();
    let mut s = create_test_surgery("S1", Priority::Elective, SurgeryStatus::Pending, Duration::hours(1));
    assert_eq!(engine.entry_for(&s, now()).display_duration_min, 90);
    s.predicted_duration_min = Some(104);
    assert_eq!(engine.entry_for(&s, now()).display_duration_min, 104);
}

// ==========================================
// 老化程度
// ==========================================

#[test]
fn test_aging_severity_bands() {
    assert_eq!(aging_severity(Priority::Emergency, 2), AgingSeverity::Normal);
    assert_eq!(aging_severity(Priority::Emergency, 3), AgingSeverity::Severe);
    assert_eq!(aging_severity(Priority::Urgent, 24), AgingSeverity::Normal);
    assert_eq!(aging_severity(Priority::Urgent, 25), AgingSeverity::Warning);
    assert_eq!(aging_severity(Priority::Urgent, 49), AgingSeverity::Severe);
    assert_eq!(aging_severity(Priority::Elective, 360), AgingSeverity::Normal);
    assert_eq!(aging_severity(Priority::Elective, 361), AgingSeverity::Warning);
    assert_eq!(aging_severity(Priority::Elective, 721), AgingSeverity::Severe);
}
