use crate::config::SchedulingConfig;
use crate::domain::surgery::Surgery;
use crate::domain::types::{AgingSeverity, Priority, SurgeryStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, instrument};

// ===== 老化阈值（小时）=====
const EMERGENCY_SEVERE_HOURS: i64 = 2;
const URGENT_SEVERE_HOURS: i64 = 48;
const URGENT_WARNING_HOURS: i64 = 24;
const ELECTIVE_SEVERE_HOURS: i64 = 720;
const ELECTIVE_WARNING_HOURS: i64 = 360;

// ==========================================
// QueueEntry - 队列条目（派生数据）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub surgery_id: String,
    pub priority: Priority,
    pub status: SurgeryStatus,
    pub wait_hours: i64,
    pub escalate: bool,
    pub severity: AgingSeverity,
    /// 展示时长：优先预测值
    pub display_duration_min: u32,
    pub created_at: NaiveDateTime,
}

// ==========================================
// QueueSnapshot - 三级队列快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub emergency: Vec<QueueEntry>,
    pub urgent: Vec<QueueEntry>,
    pub elective: Vec<QueueEntry>,
    pub computed_at: NaiveDateTime,
}

impl QueueSnapshot {
    pub fn tier(&self, priority: Priority) -> &[QueueEntry] {
        match priority {
            Priority::Emergency => &self.emergency,
            Priority::Urgent => &self.urgent,
            Priority::Elective => &self.elective,
        }
    }

    /// 全部条目（emergency → urgent → elective）
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.emergency
            .iter()
            .chain(self.urgent.iter())
            .chain(self.elective.iter())
    }

    pub fn find(&self, surgery_id: &str) -> Option<&QueueEntry> {
        self.iter().find(|e| e.surgery_id == surgery_id)
    }

    pub fn escalation_candidates(&self) -> Vec<&QueueEntry> {
        self.iter().filter(|e| e.escalate).collect()
    }

    pub fn len(&self) -> usize {
        self.emergency.len() + self.urgent.len() + self.elective.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ==========================================
// PriorityQueueEngine - 队列计算引擎
// ==========================================
#[derive(Debug, Clone)]
pub struct PriorityQueueEngine {
    elective_escalation_hours: i64,
    urgent_escalation_hours: i64,
}

impl Default for PriorityQueueEngine {
    fn default() -> Self {
        Self::new(&SchedulingConfig::default())
    }
}

impl PriorityQueueEngine {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            elective_escalation_hours: config.elective_escalation_hours,
            urgent_escalation_hours: config.urgent_escalation_hours,
        }
    }

    /// 计算单台手术的队列条目
    ///
    /// wait_hours = round((now − created_at) 小时)，未来时间按 0
    pub fn entry_for(&self, surgery: &Surgery, now: NaiveDateTime) -> QueueEntry {
        let waited_min = (now - surgery.created_at).num_minutes().max(0);
        let wait_hours = (waited_min as f64 / 60.0).round() as i64;

        QueueEntry {
            surgery_id: surgery.surgery_id.clone(),
            priority: surgery.priority,
            status: surgery.status,
            wait_hours,
            escalate: self.should_escalate(surgery.priority, wait_hours),
            severity: aging_severity(surgery.priority, wait_hours),
            display_duration_min: surgery.display_duration_min(),
            created_at: surgery.created_at,
        }
    }

    /// 升级判定: elective >72h, urgent >48h, emergency 永不
    pub fn should_escalate(&self, priority: Priority, wait_hours: i64) -> bool {
        match priority {
            Priority::Elective => wait_hours > self.elective_escalation_hours,
            Priority::Urgent => wait_hours > self.urgent_escalation_hours,
            Priority::Emergency => false,
        }
    }

    /// 构建三级队列
    ///
    /// 层内排序: wait_hours 降序 → created_at 升序 → surgery_id 升序（全序）
    #[instrument(level = "debug", skip(self, surgeries), fields(input = surgeries.len()))]
    pub fn build(&self, surgeries: &[Surgery], now: NaiveDateTime) -> QueueSnapshot {
        let mut emergency = Vec::new();
        let mut urgent = Vec::new();
        let mut elective = Vec::new();

        for surgery in surgeries.iter().filter(|s| s.status.is_active()) {
            let entry = self.entry_for(surgery, now);
            match entry.priority {
                Priority::Emergency => emergency.push(entry),
                Priority::Urgent => urgent.push(entry),
                Priority::Elective => elective.push(entry),
            }
        }

        for tier in [&mut emergency, &mut urgent, &mut elective] {
            tier.sort_by(compare_entries);
        }

        let snapshot = QueueSnapshot {
            emergency,
            urgent,
            elective,
            computed_at: now,
        };
        debug!(
            emergency = snapshot.emergency.len(),
            urgent = snapshot.urgent.len(),
            elective = snapshot.elective.len(),
            escalations = snapshot.escalation_candidates().len(),
            "优先队列计算完成"
        );
        snapshot
    }
}

fn compare_entries(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.wait_hours
        .cmp(&a.wait_hours)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.surgery_id.cmp(&b.surgery_id))
}

/// 老化程度（仅展示）
pub(super) fn aging_severity(priority: Priority, wait_hours: i64) -> AgingSeverity {
    match priority {
        Priority::Emergency if wait_hours > EMERGENCY_SEVERE_HOURS => AgingSeverity::Severe,
        Priority::Urgent if wait_hours > URGENT_SEVERE_HOURS => AgingSeverity::Severe,
        Priority::Urgent if wait_hours > URGENT_WARNING_HOURS => AgingSeverity::Warning,
        Priority::Elective if wait_hours > ELECTIVE_SEVERE_HOURS => AgingSeverity::Severe,
        Priority::Elective if wait_hours > ELECTIVE_WARNING_HOURS => AgingSeverity::Warning,
        _ => AgingSeverity::Normal,
    }
}
