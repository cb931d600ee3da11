// ==========================================
// 手术室排程系统 - 主入口
// ==========================================
// 职责: 初始化日志/数据库,定时刷新优先队列直至 Ctrl-C
// ==========================================

use anyhow::{Context, Result};
use or_scheduler::app::{get_default_db_path, AppState};
use or_scheduler::logging;

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("OR_SCHEDULER_LOG_JSON").is_ok_and(|v| v == "1") {
        logging::init_json();
    } else {
        logging::init();
    }

    tracing::info!("==================================================");
    tracing::info!("{}", or_scheduler::APP_NAME);
    tracing::info!("系统版本: {}", or_scheduler::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path)
        .await
        .map_err(anyhow::Error::msg)
        .context("无法初始化AppState")?;

    let mut ticker = tokio::time::interval(state.config.queue_refresh_interval());
    tracing::info!(
        interval_secs = state.config.queue_refresh_interval().as_secs(),
        "启动队列定时刷新"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // 单轮失败只记录，下一轮继续
                if let Err(e) = state.scheduling_api.refresh_queue().await {
                    tracing::warn!(error = %e, retryable = e.is_retryable(), "队列刷新失败");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("无法监听 Ctrl-C 信号")?;
                tracing::info!("收到退出信号，停止定时刷新");
                break;
            }
        }
    }

    Ok(())
}
