// ==========================================
// 手术室排程系统 - 排程配置读取 Trait
// ==========================================
// 职责: 定义编排器所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::scheduling_config::SchedulingConfig;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// SchedulingConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）/ SchedulingConfig（静态配置）
#[async_trait]
pub trait SchedulingConfigReader: Send + Sync {
    /// 读取完整排程参数（缺失项使用默认值）
    async fn load_scheduling_config(&self) -> Result<SchedulingConfig, Box<dyn Error + Send + Sync>>;

    /// 获取院区ID
    ///
    /// # 默认值
    /// - "default"
    async fn get_facility_id(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(self.load_scheduling_config().await?.facility_id)
    }
}

#[async_trait]
impl SchedulingConfigReader for SchedulingConfig {
    async fn load_scheduling_config(&self) -> Result<SchedulingConfig, Box<dyn Error + Send + Sync>> {
        Ok(self.clone())
    }
}
