// ==========================================
// 手术室排程系统 - 应用层
// ==========================================
// 职责: 组装根,连接数据库/配置/编排器
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
