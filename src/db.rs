// ==========================================
// 手术室排程系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供幂等的 schema 初始化
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化 schema（幂等）
///
/// 说明：
/// - 所有业务表均带 facility_id，读写一律按院区过滤
/// - room_slot_revision 记录每间手术室的时段版本号（乐观并发控制）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS surgery (
            surgery_id TEXT PRIMARY KEY,
            facility_id TEXT NOT NULL,
            patient_json TEXT NOT NULL,
            procedure_name TEXT NOT NULL,
            procedure_category TEXT NOT NULL,
            complexity INTEGER NOT NULL,
            priority TEXT NOT NULL,
            estimated_duration_min INTEGER NOT NULL,
            predicted_duration_min INTEGER,
            status TEXT NOT NULL,
            approval_status TEXT NOT NULL,
            required_specialization TEXT,
            required_equipment_json TEXT NOT NULL DEFAULT '[]',
            room_id TEXT,
            surgeon_id TEXT,
            scheduled_start TEXT,
            scheduled_end TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_surgery_facility_status ON surgery(facility_id, status);

        CREATE TABLE IF NOT EXISTS operating_room (
            room_id TEXT PRIMARY KEY,
            facility_id TEXT NOT NULL,
            name TEXT NOT NULL,
            room_type TEXT NOT NULL,
            status TEXT NOT NULL,
            capabilities_json TEXT NOT NULL DEFAULT '[]',
            sort_order INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS staff (
            staff_id TEXT PRIMARY KEY,
            facility_id TEXT NOT NULL,
            name TEXT NOT NULL,
            specialization TEXT NOT NULL,
            max_hours_per_day REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS equipment (
            equipment_id TEXT PRIMARY KEY,
            facility_id TEXT NOT NULL,
            name TEXT NOT NULL,
            equipment_type TEXT NOT NULL,
            status TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            max_usage_before_maintenance INTEGER NOT NULL DEFAULT 0,
            last_service_at TEXT
        );

        CREATE TABLE IF NOT EXISTS schedule_slot (
            slot_id TEXT PRIMARY KEY,
            facility_id TEXT NOT NULL,
            room_id TEXT NOT NULL,
            surgery_id TEXT NOT NULL REFERENCES surgery(surgery_id) ON DELETE CASCADE,
            surgeon_id TEXT,
            slot_type TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            CHECK (start_time < end_time)
        );
        CREATE INDEX IF NOT EXISTS idx_slot_room_start ON schedule_slot(facility_id, room_id, start_time);
        CREATE INDEX IF NOT EXISTS idx_slot_surgery ON schedule_slot(surgery_id);

        CREATE TABLE IF NOT EXISTS room_slot_revision (
            facility_id TEXT NOT NULL,
            room_id TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (facility_id, room_id)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
