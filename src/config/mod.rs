// ==========================================
// 手术室排程系统 - 配置层
// ==========================================
// 职责: 排程参数管理,支持 config_kv 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod config_reader;
pub mod scheduling_config;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use config_reader::SchedulingConfigReader;
pub use scheduling_config::SchedulingConfig;
