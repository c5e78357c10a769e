use anyhow::{Context, Result};
use std::sync::Arc;

use exam_session::clients::{ExamApi, ExamClient};
use exam_session::orchestrator::{spawn_stdin_commands, ExamRunner};
use exam_session::utils::logging;
use exam_session::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init_tracing(config.verbose_logging);
    logging::init_log_file(&config.output_log_file, &config.session_id)?;
    logging::log_startup(&config);

    let api: Arc<dyn ExamApi> =
        Arc::new(ExamClient::new(&config).context("无法创建考试 API 客户端")?);

    // 初始化并运行
    let runner = ExamRunner::new(config.clone(), api);
    let report = runner
        .run(spawn_stdin_commands())
        .await
        .context("考试会话运行失败")?;

    match &report.submission {
        Some(outcome) => logging::print_final_outcome(outcome, &config.output_log_file),
        None => tracing::info!("👋 会话已中断，进度已保存 (经过模块: {:?})", report.visited),
    }

    Ok(())
}
