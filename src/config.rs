use crate::error::ConfigError;
use crate::models::ExamModule;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 考试 API 根地址
    pub api_base_url: String,
    /// 考试会话ID
    pub session_id: String,
    /// 起始模块
    pub start_module: ExamModule,
    // --- 计时配置 ---
    /// 整场考试时长（秒）
    pub exam_duration_secs: u32,
    /// 听力检查阶段时长（秒）
    pub review_duration_secs: u32,
    /// 周期同步间隔（秒）
    pub sync_interval_secs: u64,
    /// 写作文本防抖延迟（毫秒）
    pub writing_debounce_millis: u64,
    // --- 网络配置 ---
    pub request_timeout_secs: u64,
    pub submit_max_retries: usize,
    pub submit_retry_delay_secs: u64,
    // --- 运行环境 ---
    /// 生产环境下加载失败直接报错，否则降级为默认题目
    pub production: bool,
    /// 降级题目数量（每个答题模块）
    pub fallback_question_count: usize,
    /// 本地考试数据文件（TOML / JSON），设置后不走网络
    pub fixture_path: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            session_id: "demo-session".to_string(),
            start_module: ExamModule::Reading,
            exam_duration_secs: 3600,
            review_duration_secs: 120,
            sync_interval_secs: 60,
            writing_debounce_millis: 2000,
            request_timeout_secs: 15,
            submit_max_retries: 3,
            submit_retry_delay_secs: 2,
            production: false,
            fallback_question_count: 40,
            fixture_path: None,
            verbose_logging: false,
            output_log_file: "exam_session.log".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_base_url: std::env::var("EXAM_API_BASE_URL").unwrap_or(default.api_base_url),
            session_id: std::env::var("EXAM_SESSION_ID").unwrap_or(default.session_id),
            start_module: parse_module_env("EXAM_MODULE").unwrap_or(default.start_module),
            exam_duration_secs: parse_env("EXAM_DURATION_SECS").unwrap_or(default.exam_duration_secs),
            review_duration_secs: parse_env("REVIEW_DURATION_SECS").unwrap_or(default.review_duration_secs),
            sync_interval_secs: parse_env("SYNC_INTERVAL_SECS").unwrap_or(default.sync_interval_secs),
            writing_debounce_millis: parse_env("WRITING_DEBOUNCE_MILLIS").unwrap_or(default.writing_debounce_millis),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS").unwrap_or(default.request_timeout_secs),
            submit_max_retries: parse_env("SUBMIT_MAX_RETRIES").unwrap_or(default.submit_max_retries),
            submit_retry_delay_secs: parse_env("SUBMIT_RETRY_DELAY_SECS").unwrap_or(default.submit_retry_delay_secs),
            production: parse_env("EXAM_PRODUCTION").unwrap_or(default.production),
            fallback_question_count: parse_env("FALLBACK_QUESTION_COUNT").unwrap_or(default.fallback_question_count),
            fixture_path: std::env::var("EXAM_FIXTURE").ok().or(default.fixture_path),
            verbose_logging: parse_env("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    /// 以默认配置为基础，指定会话ID
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    let raw = std::env::var(var_name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            let err = ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value: raw,
                expected_type: std::any::type_name::<T>().to_string(),
            };
            tracing::warn!("{}，使用默认值", err);
            None
        }
    }
}

fn parse_module_env(var_name: &str) -> Option<ExamModule> {
    let raw = std::env::var(var_name).ok()?;
    parse_module(var_name, &raw)
}

fn parse_module(var_name: &str, raw: &str) -> Option<ExamModule> {
    let module = ExamModule::from_str(raw);
    if module.is_none() {
        let err = ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: raw.to_string(),
            expected_type: "reading | listening | writing | speaking".to_string(),
        };
        tracing::warn!("{}，使用默认值", err);
    }
    module
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = Config::default();
        assert_eq!(config.exam_duration_secs, 3600);
        assert_eq!(config.review_duration_secs, 120);
        assert_eq!(config.sync_interval_secs, 60);
        assert_eq!(config.writing_debounce_millis, 2000);
        assert!(!config.production);
    }

    #[test]
    fn test_for_session_keeps_defaults() {
        let config = Config::for_session("abc");
        assert_eq!(config.session_id, "abc");
        assert_eq!(config.start_module, ExamModule::Reading);
    }

    #[test]
    fn test_parse_module_value() {
        assert_eq!(parse_module("EXAM_MODULE", " Listening "), Some(ExamModule::Listening));
        assert_eq!(parse_module("EXAM_MODULE", "maths"), None);
    }
}
