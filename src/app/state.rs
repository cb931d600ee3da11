// ==========================================
// 手术室排程系统 - 应用状态
// ==========================================
// 职责: 组装仓储、配置、授权、通知与编排器
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::SchedulingApi;
use crate::config::{ConfigManager, SchedulingConfig, SchedulingConfigReader};
use crate::engine::auth::{Authorizer, RoleAuthorizer};
use crate::engine::events::OptionalNotificationSink;
use crate::engine::orchestrator::SchedulingOrchestrator;
use crate::repository::SqliteScheduleRepository;

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 生效的排程参数（config_kv 覆写后）
    pub config: SchedulingConfig,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 排程仓储
    pub repository: Arc<SqliteScheduleRepository>,

    /// 排程编排器
    pub orchestrator: Arc<SchedulingOrchestrator>,

    /// 排程API
    pub scheduling_api: Arc<SchedulingApi>,
}

impl AppState {
    /// 创建新的AppState实例（角色授权 + 无通知）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub async fn new(db_path: String) -> Result<Self, String> {
        Self::build(
            db_path,
            Arc::new(RoleAuthorizer),
            OptionalNotificationSink::none(),
        )
        .await
    }

    /// 使用指定授权与通知组件创建
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开共享连接并初始化 schema
    /// 2. 从 config_kv 加载排程参数并校验
    /// 3. 创建仓储、编排器与 API 实例
    pub async fn build(
        db_path: String,
        authorizer: Arc<dyn Authorizer>,
        notifier: OptionalNotificationSink,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::init_schema(&conn).map_err(|e| format!("无法初始化数据库结构: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config = config_manager
            .load_scheduling_config()
            .await
            .map_err(|e| format!("无法加载排程参数: {}", e))?;
        config
            .validate()
            .map_err(|e| format!("排程参数非法: {}", e))?;

        // ==========================================
        // 仓储 / 编排器 / API
        // ==========================================
        let repository = Arc::new(
            SqliteScheduleRepository::from_connection(conn)
                .map_err(|e| format!("无法创建SqliteScheduleRepository: {}", e))?,
        );

        let orchestrator = Arc::new(
            SchedulingOrchestrator::new(repository.clone(), config.clone())
                .with_authorizer(authorizer)
                .with_notifier(notifier),
        );
        let scheduling_api = Arc::new(SchedulingApi::new(orchestrator.clone()));

        tracing::info!(
            facility_id = %config.facility_id,
            day_start = config.day_start_hour,
            day_end = config.day_end_hour,
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            config,
            config_manager,
            repository,
            orchestrator,
            scheduling_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: OR_SCHEDULER_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("OR_SCHEDULER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./or_scheduler.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        let dir = data_dir.join("or-scheduler-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("or-scheduler");

        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("or_scheduler.db");
        }
    }

    path.to_string_lossy().to_string()
}
