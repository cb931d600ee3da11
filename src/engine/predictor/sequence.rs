use crate::domain::surgery::Surgery;
use crate::domain::types::Priority;
use std::cmp::Reverse;

// ==========================================
// SequenceRecommender - 手术序列推荐
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SequenceRecommender;

impl SequenceRecommender {
    pub fn new() -> Self {
        Self
    }

    /// 推荐手术执行顺序
    ///
    /// 1) 按 priority_weight + (6 − complexity)·10 降序稳定排序
    /// 2) 聚批: 每放入一台后，紧跟其后放入剩余同 (术式类别, 优先级) 的手术
    ///
    /// # 返回
    /// 推荐顺序的 surgery_id 列表
    pub fn recommend(&self, surgeries: &[Surgery]) -> Vec<String> {
        let mut ranked: Vec<&Surgery> = surgeries.iter().collect();
        ranked.sort_by_key(|s| Reverse(sequence_key(s)));

        let mut placed = vec![false; ranked.len()];
        let mut order = Vec::with_capacity(ranked.len());

        for i in 0..ranked.len() {
            if placed[i] {
                continue;
            }
            placed[i] = true;
            order.push(ranked[i].surgery_id.clone());

            let batch = batch_key(ranked[i]);
            for j in (i + 1)..ranked.len() {
                if !placed[j] && batch_key(ranked[j]) == batch {
                    placed[j] = true;
                    order.push(ranked[j].surgery_id.clone());
                }
            }
        }

        order
    }
}

fn sequence_key(surgery: &Surgery) -> i64 {
    let complexity = surgery.procedure.complexity.clamp(1, 5) as i64;
    surgery.priority.weight() + (6 - complexity) * 10
}

fn batch_key(surgery: &Surgery) -> (String, Priority) {
    (
        surgery.procedure.category.trim().to_lowercase(),
        surgery.priority,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::surgery::{PatientProfile, ProcedureProfile};
    use crate::domain::types::{ApprovalStatus, SurgeryStatus};
    use chrono::NaiveDate;

    fn surgery(id: &str, priority: Priority, category: &str, complexity: u8) -> Surgery {
        let created = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Surgery {
            surgery_id: id.to_string(),
            facility_id: "F1".to_string(),
            patient: PatientProfile::default(),
            procedure: ProcedureProfile {
                name: format!("{} procedure", category),
                category: category.to_string(),
                complexity,
            },
            priority,
            estimated_duration_min: 60,
            predicted_duration_min: None,
            status: SurgeryStatus::Approved,
            approval_status: ApprovalStatus::Approved,
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

    #[test]
    fn test_priority_dominates_complexity() {
        let list = vec![
            surgery("E1", Priority::Elective, "ortho", 1),
            surgery("X1", Priority::Emergency, "cardiac", 5),
            surgery("U1", Priority::Urgent, "neuro", 3),
        ];
        assert_eq!(
            SequenceRecommender::new().recommend(&list),
            vec!["X1", "U1", "E1"]
        );
    }

    #[test]
    fn test_simpler_cases_first_within_tier() {
        let list = vec![
            surgery("A", Priority::Elective, "ortho", 4),
            surgery("B", Priority::Elective, "ent", 2),
        ];
        assert_eq!(SequenceRecommender::new().recommend(&list), vec!["B", "A"]);
    }

    #[test]
    fn test_same_category_batched_together() {
        // 排序后: A(ortho,1)=150, B(ent,2)=140, C(ortho,3)=130
        // 聚批后 C 紧跟 A
        let list = vec![
            surgery("C", Priority::Elective, "ortho", 3),
            surgery("B", Priority::Elective, "ent", 2),
            surgery("A", Priority::Elective, "ortho", 1),
        ];
        assert_eq!(
            SequenceRecommender::new().recommend(&list),
            vec!["A", "C", "B"]
        );
    }

    #[test]
    fn test_stable_for_equal_keys() {
        let list = vec![
            surgery("first", Priority::Urgent, "ent", 3),
            surgery("second", Priority::Urgent, "ortho", 3),
        ];
        assert_eq!(
            SequenceRecommender::new().recommend(&list),
            vec!["first", "second"]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(SequenceRecommender::new().recommend(&[]).is_empty());
    }
}
