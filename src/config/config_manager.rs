// ==========================================
// 手术室排程系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::config_reader::SchedulingConfigReader;
use crate::config::scheduling_config::SchedulingConfig;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        Ok(())
    }

    /// 读取并解析配置，不存在或格式错误时使用默认值
    fn get_parsed_or<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
    {
        match self.get_global_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 启动日志记录生效配置
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 组装完整排程参数（覆写 + 默认值）
    pub fn load_config(&self) -> ConfigResult<SchedulingConfig> {
        let d = SchedulingConfig::default();

        let cfg = SchedulingConfig {
            facility_id: self
                .get_global_config_value(config_keys::FACILITY_ID)?
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(d.facility_id),
            day_start_hour: self.get_parsed_or(config_keys::DAY_START_HOUR, d.day_start_hour)?,
            day_end_hour: self.get_parsed_or(config_keys::DAY_END_HOUR, d.day_end_hour)?,
            setup_minutes: self.get_parsed_or(config_keys::SETUP_MINUTES, d.setup_minutes)?,
            cleanup_minutes: self.get_parsed_or(config_keys::CLEANUP_MINUTES, d.cleanup_minutes)?,
            overtime_hour: self.get_parsed_or(config_keys::OVERTIME_HOUR, d.overtime_hour)?,
            early_start_hour: self
                .get_parsed_or(config_keys::EARLY_START_HOUR, d.early_start_hour)?,
            underutilization_gap_minutes: self.get_parsed_or(
                config_keys::UNDERUTILIZATION_GAP_MINUTES,
                d.underutilization_gap_minutes,
            )?,
            surgeon_hours_window_hours: self.get_parsed_or(
                config_keys::SURGEON_HOURS_WINDOW_HOURS,
                d.surgeon_hours_window_hours,
            )?,
            check_surgeon_double_booking: self.get_parsed_or(
                config_keys::CHECK_SURGEON_DOUBLE_BOOKING,
                d.check_surgeon_double_booking,
            )?,
            elective_escalation_hours: self.get_parsed_or(
                config_keys::ELECTIVE_ESCALATION_HOURS,
                d.elective_escalation_hours,
            )?,
            urgent_escalation_hours: self.get_parsed_or(
                config_keys::URGENT_ESCALATION_HOURS,
                d.urgent_escalation_hours,
            )?,
            persistence_timeout_ms: self
                .get_parsed_or(config_keys::PERSISTENCE_TIMEOUT_MS, d.persistence_timeout_ms)?,
            queue_refresh_interval_secs: self.get_parsed_or(
                config_keys::QUEUE_REFRESH_INTERVAL_SECS,
                d.queue_refresh_interval_secs,
            )?,
        };

        cfg.validate()?;
        Ok(cfg)
    }
}

// ==========================================
// SchedulingConfigReader Trait 实现
// ==========================================
#[async_trait]
impl SchedulingConfigReader for ConfigManager {
    async fn load_scheduling_config(&self) -> ConfigResult<SchedulingConfig> {
        self.load_config()
    }
}

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // 院区
    pub const FACILITY_ID: &str = "facility_id";

    // 手术日窗口
    pub const DAY_START_HOUR: &str = "day_start_hour";
    pub const DAY_END_HOUR: &str = "day_end_hour";

    // 周转
    pub const SETUP_MINUTES: &str = "setup_minutes";
    pub const CLEANUP_MINUTES: &str = "cleanup_minutes";

    // 软约束
    pub const OVERTIME_HOUR: &str = "overtime_hour";
    pub const EARLY_START_HOUR: &str = "early_start_hour";
    pub const UNDERUTILIZATION_GAP_MINUTES: &str = "underutilization_gap_minutes";

    // 医生
    pub const SURGEON_HOURS_WINDOW_HOURS: &str = "surgeon_hours_window_hours";
    pub const CHECK_SURGEON_DOUBLE_BOOKING: &str = "check_surgeon_double_booking";

    // 升级
    pub const ELECTIVE_ESCALATION_HOURS: &str = "elective_escalation_hours";
    pub const URGENT_ESCALATION_HOURS: &str = "urgent_escalation_hours";

    // 运行
    pub const PERSISTENCE_TIMEOUT_MS: &str = "persistence_timeout_ms";
    pub const QUEUE_REFRESH_INTERVAL_SECS: &str = "queue_refresh_interval_secs";
}
