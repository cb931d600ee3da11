// ==========================================
// SQLite 行映射与字段编解码
// ==========================================

use crate::domain::resource::{Equipment, OperatingRoom, Staff};
use crate::domain::slot::ScheduleSlot;
use crate::domain::surgery::{PatientProfile, ProcedureProfile, Surgery};
use crate::domain::types::{
    ApprovalStatus, EquipmentStatus, EquipmentType, Priority, RoomStatus, RoomType, SlotType,
    SurgeryStatus,
};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;

pub(super) const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub(super) const SURGERY_COLUMNS: &str = r#"
    surgery_id, facility_id, patient_json, procedure_name, procedure_category,
    complexity, priority, estimated_duration_min, predicted_duration_min,
    status, approval_status, required_specialization, required_equipment_json,
    room_id, surgeon_id, scheduled_start, scheduled_end, created_at, updated_at
"#;

pub(super) const SLOT_COLUMNS: &str =
    "slot_id, facility_id, room_id, surgery_id, surgeon_id, slot_type, start_time, end_time";

pub(super) fn fmt_dt(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

/// 字段解析失败统一转换为 rusqlite 的 FromSqlConversionFailure
fn conversion_err(idx: usize, field: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("非法字段值 {}={}", field, raw).into(),
    )
}

fn parse_dt(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FMT).map_err(|_| conversion_err(idx, "datetime", raw))
}

fn parse_opt_dt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDateTime>> {
    raw.map(|s| parse_dt(idx, &s)).transpose()
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

pub(super) fn map_surgery(row: &Row<'_>) -> rusqlite::Result<Surgery> {
    let patient: PatientProfile = parse_json(2, &row.get::<_, String>(2)?)?;

    let priority_raw: String = row.get(6)?;
    let status_raw: String = row.get(9)?;
    let approval_raw: String = row.get(10)?;

    Ok(Surgery {
        surgery_id: row.get(0)?,
        facility_id: row.get(1)?,
        patient,
        procedure: ProcedureProfile {
            name: row.get(3)?,
            category: row.get(4)?,
            complexity: row.get(5)?,
        },
        priority: Priority::from_db_str(&priority_raw)
            .ok_or_else(|| conversion_err(6, "priority", &priority_raw))?,
        estimated_duration_min: row.get(7)?,
        predicted_duration_min: row.get(8)?,
        status: SurgeryStatus::from_db_str(&status_raw)
            .ok_or_else(|| conversion_err(9, "status", &status_raw))?,
        approval_status: ApprovalStatus::from_db_str(&approval_raw)
            .ok_or_else(|| conversion_err(10, "approval_status", &approval_raw))?,
        required_specialization: row.get(11)?,
        required_equipment: parse_json(12, &row.get::<_, String>(12)?)?,
        room_id: row.get(13)?,
        surgeon_id: row.get(14)?,
        scheduled_start: parse_opt_dt(15, row.get(15)?)?,
        scheduled_end: parse_opt_dt(16, row.get(16)?)?,
        created_at: parse_dt(17, &row.get::<_, String>(17)?)?,
        updated_at: parse_dt(18, &row.get::<_, String>(18)?)?,
    })
}

pub(super) fn map_room(row: &Row<'_>) -> rusqlite::Result<OperatingRoom> {
    let type_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;

    Ok(OperatingRoom {
        room_id: row.get(0)?,
        facility_id: row.get(1)?,
        name: row.get(2)?,
        room_type: RoomType::from_db_str(&type_raw)
            .ok_or_else(|| conversion_err(3, "room_type", &type_raw))?,
        status: RoomStatus::from_db_str(&status_raw)
            .ok_or_else(|| conversion_err(4, "status", &status_raw))?,
        capabilities: parse_json(5, &row.get::<_, String>(5)?)?,
    })
}

pub(super) fn map_staff(row: &Row<'_>) -> rusqlite::Result<Staff> {
    Ok(Staff {
        staff_id: row.get(0)?,
        facility_id: row.get(1)?,
        name: row.get(2)?,
        specialization: row.get(3)?,
        max_hours_per_day: row.get(4)?,
    })
}

pub(super) fn map_equipment(row: &Row<'_>) -> rusqlite::Result<Equipment> {
    let status_raw: String = row.get(4)?;

    Ok(Equipment {
        equipment_id: row.get(0)?,
        facility_id: row.get(1)?,
        name: row.get(2)?,
        equipment_type: EquipmentType::from_db_str(&row.get::<_, String>(3)?),
        status: EquipmentStatus::from_db_str(&status_raw)
            .ok_or_else(|| conversion_err(4, "status", &status_raw))?,
        usage_count: row.get(5)?,
        max_usage_before_maintenance: row.get(6)?,
        last_service_at: parse_opt_dt(7, row.get(7)?)?,
    })
}

pub(super) fn map_slot(row: &Row<'_>) -> rusqlite::Result<ScheduleSlot> {
    let type_raw: String = row.get(5)?;

    Ok(ScheduleSlot {
        slot_id: row.get(0)?,
        facility_id: row.get(1)?,
        room_id: row.get(2)?,
        surgery_id: row.get(3)?,
        surgeon_id: row.get(4)?,
        slot_type: SlotType::from_db_str(&type_raw)
            .ok_or_else(|| conversion_err(5, "slot_type", &type_raw))?,
        start_time: parse_dt(6, &row.get::<_, String>(6)?)?,
        end_time: parse_dt(7, &row.get::<_, String>(7)?)?,
    })
}
