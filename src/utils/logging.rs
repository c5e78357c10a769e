use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::workflow::SubmissionOutcome;

/// 初始化 tracing 订阅器
///
/// 默认 `info`，`verbose` 时为 `debug`；设置了 `RUST_LOG` 时以它为准。
/// 重复调用不会报错（测试中常见）。
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
/// - `session_id`: 考试会话ID
pub fn init_log_file(log_file_path: &str, session_id: &str) -> Result<()> {
    let log_header = format!(
        "{}\n考试会话日志 - {} - {}\n{}\n\n",
        "=".repeat(60),
        session_id,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 考试会话启动 - 会话 {}", config.session_id);
    info!("📍 起始模块: {}", config.start_module.name());
    info!(
        "⏱️ 整场时长: {} 秒, 同步间隔: {} 秒",
        config.exam_duration_secs, config.sync_interval_secs
    );
    if config.production {
        info!("🔒 生产环境：加载失败将直接报错");
    }
    info!("{}", "=".repeat(60));
}

/// 记录模块开始信息
///
/// # 参数
/// - `module_name`: 模块名称
/// - `total_questions`: 本模块题目数
/// - `time_left`: 剩余秒数
pub fn log_module_start(module_name: &str, total_questions: usize, time_left: u32) {
    info!("\n{}", "─".repeat(60));
    info!("📖 模块开始: {}", module_name);
    info!("📄 题目数: {}, 剩余时间: {}", total_questions, format_clock(time_left));
    info!("{}", "─".repeat(60));
}

/// 打印最终结果
pub fn print_final_outcome(outcome: &SubmissionOutcome, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 考试结束");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    match outcome {
        SubmissionOutcome::Submitted { attempts } => {
            info!("✅ 提交成功 (尝试 {} 次)", attempts)
        }
        SubmissionOutcome::AlreadySubmitted => info!("✅ 已提交"),
        SubmissionOutcome::Failed { attempts, reason } => {
            info!("❌ 提交失败 (尝试 {} 次): {}", attempts, reason)
        }
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 秒数格式化为 `mm:ss`（超过一小时为 `h:mm:ss`）
pub fn format_clock(secs: u32) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(3600), "1:00:00");
        assert_eq!(format_clock(125), "02:05");
        assert_eq!(format_clock(0), "00:00");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
    }
}
