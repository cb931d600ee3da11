// ==========================================
// 手术室排程系统 - 输入校验器
// ==========================================
// 职责: 在任何约束检查之前拦截非法输入
// 红线: 校验失败不触碰仓储,不产生任何部分状态
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::slot::ScheduleSlot;
use crate::domain::surgery::Surgery;

/// 标识符最大长度
const MAX_ID_LEN: usize = 64;

/// 单台手术时间窗上限
const MAX_WINDOW_HOURS: i64 = 24;

/// 校验标识符（非空、无空白、长度受限）
pub fn validate_id(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::invalid(field, "不能为空"));
    }
    if value.len() > MAX_ID_LEN {
        return Err(ApiError::invalid(
            field,
            format!("长度不能超过 {} 个字符", MAX_ID_LEN),
        ));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ApiError::invalid(field, format!("不能包含空白字符: {:?}", value)));
    }
    Ok(())
}

/// 校验手术时间窗（start < end，且不超过 24 小时）
pub fn validate_window(start: NaiveDateTime, end: NaiveDateTime) -> ApiResult<()> {
    if start >= end {
        return Err(ApiError::invalid(
            "end",
            format!("结束时间必须晚于开始时间: {} >= {}", start, end),
        ));
    }
    if end - start > Duration::hours(MAX_WINDOW_HOURS) {
        return Err(ApiError::invalid(
            "end",
            format!("时间窗超过 {} 小时", MAX_WINDOW_HOURS),
        ));
    }
    Ok(())
}

/// 校验排程日期不早于今天
pub fn validate_date(date: NaiveDate, today: NaiveDate) -> ApiResult<()> {
    if date < today {
        return Err(ApiError::invalid(
            "date",
            format!("不能排到过去的日期: {} < {}", date, today),
        ));
    }
    Ok(())
}

/// 校验手术申请的排程相关字段
pub fn validate_surgery(surgery: &Surgery) -> ApiResult<()> {
    validate_id("surgery_id", &surgery.surgery_id)?;
    if let Some((field, message)) = surgery.range_error() {
        return Err(ApiError::invalid(field, message));
    }
    if surgery.planned_duration_min() == 0 {
        return Err(ApiError::invalid(
            "estimated_duration_min",
            "手术时长缺失",
        ));
    }
    Ok(())
}

/// 校验时段自身合法（外部传入的时段快照）
pub fn validate_slots(slots: &[ScheduleSlot]) -> ApiResult<()> {
    for slot in slots {
        if slot.start_time >= slot.end_time {
            return Err(ApiError::invalid(
                "slots",
                format!(
                    "时段 {} 起止非法: {} >= {}",
                    slot.slot_id, slot.start_time, slot.end_time
                ),
            ));
        }
    }
    Ok(())
}

/// 批量操作的 id 列表（非空、逐个合法、无重复）
pub fn validate_id_list(field: &str, ids: &[String]) -> ApiResult<()> {
    if ids.is_empty() {
        return Err(ApiError::invalid(field, "列表不能为空"));
    }
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        validate_id(field, id)?;
        if !seen.insert(id.as_str()) {
            return Err(ApiError::invalid(field, format!("重复的 id: {}", id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("surgery_id", "S-001").is_ok());
        assert!(validate_id("surgery_id", "").is_err());
        assert!(validate_id("surgery_id", "   ").is_err());
        assert!(validate_id("surgery_id", "S 001").is_err());
        assert!(validate_id("surgery_id", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_window() {
        assert!(validate_window(at(9, 0), at(10, 0)).is_ok());
        assert!(validate_window(at(10, 0), at(10, 0)).is_err());
        assert!(validate_window(at(11, 0), at(10, 0)).is_err());
        assert!(validate_window(at(0, 0), at(0, 0) + Duration::hours(25)).is_err());
    }

    #[test]
    fn test_validate_date() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(validate_date(today, today).is_ok());
        assert!(validate_date(today.pred_opt().unwrap(), today).is_err());
    }

    #[test]
    fn test_validate_id_list_rejects_duplicates() {
        let ids = vec!["S1".to_string(), "S1".to_string()];
        match validate_id_list("surgery_ids", &ids) {
            Err(ApiError::InvalidInput { field, message }) => {
                assert_eq!(field, "surgery_ids");
                assert!(message.contains("S1"));
            }
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
        assert!(validate_id_list("surgery_ids", &[]).is_err());
    }
}
