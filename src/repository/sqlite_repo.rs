// ==========================================
// 手术室排程系统 - SQLite 仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 放置/释放在单个事务内完成（删除旧时段 + 插入新时段 + 版本递增）
// ==========================================

mod rows;

use crate::domain::resource::{Equipment, OperatingRoom, Staff};
use crate::domain::slot::{ScheduleSlot, TimeWindow};
use crate::domain::surgery::Surgery;
use crate::domain::types::{ApprovalStatus, Priority, SurgeryStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{status_conflict, PlacementCommit, RoomRevision, ScheduleRepository};
use chrono::NaiveDateTime;
use rows::{fmt_dt, map_equipment, map_room, map_slot, map_staff, map_surgery, SLOT_COLUMNS, SURGERY_COLUMNS};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// SqliteScheduleRepository - SQLite 仓储
// ==========================================
pub struct SqliteScheduleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScheduleRepository {
    /// 打开数据库并初始化 schema
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&guard)?;
            crate::db::init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 数据装载（仓储契约之外）
    // ==========================================

    /// 已存在的手术原地更新，保留其已有时段
    pub fn upsert_surgery(&self, surgery: &Surgery) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO surgery (
                surgery_id, facility_id, patient_json, procedure_name, procedure_category,
                complexity, priority, estimated_duration_min, predicted_duration_min,
                status, approval_status, required_specialization, required_equipment_json,
                room_id, surgeon_id, scheduled_start, scheduled_end, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(surgery_id) DO UPDATE SET
                facility_id = excluded.facility_id,
                patient_json = excluded.patient_json,
                procedure_name = excluded.procedure_name,
                procedure_category = excluded.procedure_category,
                complexity = excluded.complexity,
                priority = excluded.priority,
                estimated_duration_min = excluded.estimated_duration_min,
                predicted_duration_min = excluded.predicted_duration_min,
                status = excluded.status,
                approval_status = excluded.approval_status,
                required_specialization = excluded.required_specialization,
                required_equipment_json = excluded.required_equipment_json,
                room_id = excluded.room_id,
                surgeon_id = excluded.surgeon_id,
                scheduled_start = excluded.scheduled_start,
                scheduled_end = excluded.scheduled_end,
                updated_at = excluded.updated_at
            "#,
            params![
                surgery.surgery_id,
                surgery.facility_id,
                serde_json::to_string(&surgery.patient)?,
                surgery.procedure.name,
                surgery.procedure.category,
                surgery.procedure.complexity,
                surgery.priority.to_db_str(),
                surgery.estimated_duration_min,
                surgery.predicted_duration_min,
                surgery.status.to_db_str(),
                surgery.approval_status.to_db_str(),
                surgery.required_specialization,
                serde_json::to_string(&surgery.required_equipment)?,
                surgery.room_id,
                surgery.surgeon_id,
                surgery.scheduled_start.map(fmt_dt),
                surgery.scheduled_end.map(fmt_dt),
                fmt_dt(surgery.created_at),
                fmt_dt(surgery.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 新房间排在末尾（sort_order 递增），已存在则保留原顺序
    pub fn upsert_room(&self, room: &OperatingRoom) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO operating_room (
                room_id, facility_id, name, room_type, status, capabilities_json, sort_order
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM operating_room)
            )
            ON CONFLICT(room_id) DO UPDATE SET
                facility_id = ?2, name = ?3, room_type = ?4, status = ?5, capabilities_json = ?6
            "#,
            params![
                room.room_id,
                room.facility_id,
                room.name,
                room.room_type.to_db_str(),
                room.status.to_db_str(),
                serde_json::to_string(&room.capabilities)?,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_staff(&self, staff: &Staff) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO staff (
                staff_id, facility_id, name, specialization, max_hours_per_day
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                staff.staff_id,
                staff.facility_id,
                staff.name,
                staff.specialization,
                staff.max_hours_per_day,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_equipment(&self, equipment: &Equipment) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO equipment (
                equipment_id, facility_id, name, equipment_type, status,
                usage_count, max_usage_before_maintenance, last_service_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                equipment.equipment_id,
                equipment.facility_id,
                equipment.name,
                equipment.equipment_type.to_db_str(),
                equipment.status.to_db_str(),
                equipment.usage_count,
                equipment.max_usage_before_maintenance,
                equipment.last_service_at.map(fmt_dt),
            ],
        )?;
        Ok(())
    }

    /// 直接插入时段（历史数据装载），同一事务内递增房间版本号
    pub fn insert_slots(&self, slots: &[ScheduleSlot]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for slot in slots {
            insert_slot(&tx, slot)?;
            bump_revision(&tx, &slot.facility_id, &slot.room_id)?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ==========================================
// 事务内辅助函数
// ==========================================

fn insert_slot(tx: &Transaction<'_>, slot: &ScheduleSlot) -> RepositoryResult<()> {
    tx.execute(
        r#"
        INSERT INTO schedule_slot (
            slot_id, facility_id, room_id, surgery_id, surgeon_id, slot_type, start_time, end_time
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            slot.slot_id,
            slot.facility_id,
            slot.room_id,
            slot.surgery_id,
            slot.surgeon_id,
            slot.slot_type.to_db_str(),
            fmt_dt(slot.start_time),
            fmt_dt(slot.end_time),
        ],
    )?;
    Ok(())
}

fn read_revision(conn: &Connection, facility_id: &str, room_id: &str) -> RepositoryResult<u64> {
    let revision: Option<i64> = conn
        .query_row(
            "SELECT revision FROM room_slot_revision WHERE facility_id = ?1 AND room_id = ?2",
            params![facility_id, room_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(revision.unwrap_or(0).max(0) as u64)
}

fn bump_revision(tx: &Transaction<'_>, facility_id: &str, room_id: &str) -> RepositoryResult<()> {
    tx.execute(
        r#"
        INSERT INTO room_slot_revision (facility_id, room_id, revision) VALUES (?1, ?2, 1)
        ON CONFLICT(facility_id, room_id) DO UPDATE SET revision = revision + 1
        "#,
        params![facility_id, room_id],
    )?;
    Ok(())
}

fn check_revisions(
    tx: &Transaction<'_>,
    facility_id: &str,
    expected: &[RoomRevision],
) -> RepositoryResult<()> {
    for rev in expected {
        let actual = read_revision(tx, facility_id, &rev.room_id)?;
        if actual != rev.revision {
            return Err(RepositoryError::RevisionConflict {
                room_id: rev.room_id.clone(),
                expected: rev.revision,
                actual,
            });
        }
    }
    Ok(())
}

fn rooms_of_surgery(
    tx: &Transaction<'_>,
    facility_id: &str,
    surgery_id: &str,
) -> RepositoryResult<Vec<String>> {
    let mut stmt = tx.prepare(
        "SELECT DISTINCT room_id FROM schedule_slot WHERE facility_id = ?1 AND surgery_id = ?2",
    )?;
    let rooms = stmt
        .query_map(params![facility_id, surgery_id], |row| row.get::<_, String>(0))?
        .collect::<SqliteResult<Vec<String>>>()?;
    Ok(rooms)
}

/// 事务内比较手术当前状态
fn check_surgery_status(
    conn: &Connection,
    facility_id: &str,
    surgery_id: &str,
    expected: SurgeryStatus,
) -> RepositoryResult<()> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM surgery WHERE facility_id = ?1 AND surgery_id = ?2",
            params![facility_id, surgery_id],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| RepositoryError::not_found("Surgery", surgery_id))?;
    let actual = SurgeryStatus::from_db_str(&raw)
        .ok_or_else(|| RepositoryError::field("status", format!("未知状态: {}", raw)))?;
    if actual != expected {
        return Err(status_conflict(surgery_id, expected, actual));
    }
    Ok(())
}

// ==========================================
// ScheduleRepository Trait 实现
// ==========================================
impl ScheduleRepository for SqliteScheduleRepository {
    fn find_surgery(
        &self,
        facility_id: &str,
        surgery_id: &str,
    ) -> RepositoryResult<Option<Surgery>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM surgery WHERE facility_id = ?1 AND surgery_id = ?2",
            SURGERY_COLUMNS
        );
        let surgery = conn
            .query_row(&sql, params![facility_id, surgery_id], map_surgery)
            .optional()?;
        Ok(surgery)
    }

    fn list_active_surgeries(&self, facility_id: &str) -> RepositoryResult<Vec<Surgery>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM surgery
             WHERE facility_id = ?1 AND status NOT IN ('completed', 'cancelled')
             ORDER BY surgery_id",
            SURGERY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let surgeries = stmt
            .query_map(params![facility_id], map_surgery)?
            .collect::<SqliteResult<Vec<Surgery>>>()?;
        Ok(surgeries)
    }

    fn update_surgery_status(
        &self,
        facility_id: &str,
        surgery_id: &str,
        expected: SurgeryStatus,
        status: SurgeryStatus,
        approval_status: Option<ApprovalStatus>,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE surgery
            SET status = ?4,
                approval_status = COALESCE(?5, approval_status),
                updated_at = ?6
            WHERE facility_id = ?1 AND surgery_id = ?2 AND status = ?3
            "#,
            params![
                facility_id,
                surgery_id,
                expected.to_db_str(),
                status.to_db_str(),
                approval_status.map(|a| a.to_db_str()),
                fmt_dt(at),
            ],
        )?;
        if affected == 0 {
            // 区分“不存在”与“已被并发修改”
            return check_surgery_status(&conn, facility_id, surgery_id, expected);
        }
        Ok(())
    }

    fn update_surgery_priority(
        &self,
        facility_id: &str,
        surgery_id: &str,
        expected: Priority,
        priority: Priority,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE surgery SET priority = ?4, updated_at = ?5
            WHERE facility_id = ?1 AND surgery_id = ?2 AND priority = ?3
            "#,
            params![
                facility_id,
                surgery_id,
                expected.to_db_str(),
                priority.to_db_str(),
                fmt_dt(at),
            ],
        )?;

        if affected == 0 {
            drop(conn);
            // 区分“不存在”与“已被并发修改”
            return match self.find_surgery(facility_id, surgery_id)? {
                None => Err(RepositoryError::not_found("Surgery", surgery_id)),
                Some(current) => Err(RepositoryError::ConcurrentUpdate {
                    entity: "Surgery".to_string(),
                    id: surgery_id.to_string(),
                    message: format!("priority 期望 {}，实际 {}", expected, current.priority),
                }),
            };
        }
        Ok(())
    }

    fn update_predicted_duration(
        &self,
        facility_id: &str,
        surgery_id: &str,
        predicted_duration_min: u32,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE surgery SET predicted_duration_min = ?3, updated_at = ?4
             WHERE facility_id = ?1 AND surgery_id = ?2",
            params![facility_id, surgery_id, predicted_duration_min, fmt_dt(at)],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("Surgery", surgery_id));
        }
        Ok(())
    }

    fn list_rooms(&self, facility_id: &str) -> RepositoryResult<Vec<OperatingRoom>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT room_id, facility_id, name, room_type, status, capabilities_json
            FROM operating_room
            WHERE facility_id = ?1
            ORDER BY sort_order, room_id
            "#,
        )?;
        let rooms = stmt
            .query_map(params![facility_id], map_room)?
            .collect::<SqliteResult<Vec<OperatingRoom>>>()?;
        Ok(rooms)
    }

    fn find_staff(&self, facility_id: &str, staff_id: &str) -> RepositoryResult<Option<Staff>> {
        let conn = self.get_conn()?;
        let staff = conn
            .query_row(
                r#"
                SELECT staff_id, facility_id, name, specialization, max_hours_per_day
                FROM staff WHERE facility_id = ?1 AND staff_id = ?2
                "#,
                params![facility_id, staff_id],
                map_staff,
            )
            .optional()?;
        Ok(staff)
    }

    fn list_equipment(&self, facility_id: &str) -> RepositoryResult<Vec<Equipment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT equipment_id, facility_id, name, equipment_type, status,
                   usage_count, max_usage_before_maintenance, last_service_at
            FROM equipment WHERE facility_id = ?1
            ORDER BY equipment_id
            "#,
        )?;
        let equipment = stmt
            .query_map(params![facility_id], map_equipment)?
            .collect::<SqliteResult<Vec<Equipment>>>()?;
        Ok(equipment)
    }

    fn list_slots_in_range(
        &self,
        facility_id: &str,
        range: TimeWindow,
    ) -> RepositoryResult<Vec<ScheduleSlot>> {
        let conn = self.get_conn()?;
        // 半开区间重叠: start < range.end AND end > range.start（文本时间可直接字典序比较）
        let sql = format!(
            "SELECT {} FROM schedule_slot
             WHERE facility_id = ?1 AND start_time < ?3 AND end_time > ?2
             ORDER BY start_time, room_id",
            SLOT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let slots = stmt
            .query_map(
                params![facility_id, fmt_dt(range.start), fmt_dt(range.end)],
                map_slot,
            )?
            .collect::<SqliteResult<Vec<ScheduleSlot>>>()?;
        Ok(slots)
    }

    fn list_slots_for_surgery(
        &self,
        facility_id: &str,
        surgery_id: &str,
    ) -> RepositoryResult<Vec<ScheduleSlot>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM schedule_slot
             WHERE facility_id = ?1 AND surgery_id = ?2
             ORDER BY start_time",
            SLOT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let slots = stmt
            .query_map(params![facility_id, surgery_id], map_slot)?
            .collect::<SqliteResult<Vec<ScheduleSlot>>>()?;
        Ok(slots)
    }

    fn room_revision(&self, facility_id: &str, room_id: &str) -> RepositoryResult<u64> {
        let conn = self.get_conn()?;
        read_revision(&conn, facility_id, room_id)
    }

    fn commit_placement(
        &self,
        facility_id: &str,
        commit: PlacementCommit,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        check_surgery_status(&tx, facility_id, &commit.surgery_id, commit.expected_status)?;
        check_revisions(&tx, facility_id, &commit.expected_revisions)?;

        let mut touched = rooms_of_surgery(&tx, facility_id, &commit.surgery_id)?;

        tx.execute(
            "DELETE FROM schedule_slot WHERE facility_id = ?1 AND surgery_id = ?2",
            params![facility_id, commit.surgery_id],
        )?;

        for slot in &commit.slots {
            insert_slot(&tx, slot)?;
        }

        touched.push(commit.room_id.clone());
        touched.sort();
        touched.dedup();
        for room_id in &touched {
            bump_revision(&tx, facility_id, room_id)?;
        }

        tx.execute(
            r#"
            UPDATE surgery
            SET status = ?3,
                room_id = ?4,
                surgeon_id = COALESCE(?5, surgeon_id),
                scheduled_start = ?6,
                scheduled_end = ?7,
                updated_at = ?8
            WHERE facility_id = ?1 AND surgery_id = ?2
            "#,
            params![
                facility_id,
                commit.surgery_id,
                SurgeryStatus::Scheduled.to_db_str(),
                commit.room_id,
                commit.surgeon_id,
                fmt_dt(commit.scheduled_start),
                fmt_dt(commit.scheduled_end),
                fmt_dt(commit.committed_at),
            ],
        )?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    fn release_surgery_slots(
        &self,
        facility_id: &str,
        surgery_id: &str,
        expected_status: SurgeryStatus,
        status: SurgeryStatus,
        expected_revisions: &[RoomRevision],
        at: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        check_surgery_status(&tx, facility_id, surgery_id, expected_status)?;
        check_revisions(&tx, facility_id, expected_revisions)?;

        let touched = rooms_of_surgery(&tx, facility_id, surgery_id)?;
        let removed = tx.execute(
            "DELETE FROM schedule_slot WHERE facility_id = ?1 AND surgery_id = ?2",
            params![facility_id, surgery_id],
        )?;
        for room_id in &touched {
            bump_revision(&tx, facility_id, room_id)?;
        }

        tx.execute(
            r#"
            UPDATE surgery
            SET status = ?3, room_id = NULL, scheduled_start = NULL, scheduled_end = NULL,
                updated_at = ?4
            WHERE facility_id = ?1 AND surgery_id = ?2
            "#,
            params![facility_id, surgery_id, status.to_db_str(), fmt_dt(at)],
        )?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(removed)
    }
}
