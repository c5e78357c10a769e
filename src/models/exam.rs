//! 考试 API 的请求 / 响应数据结构

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::answer::AnswerValue;
use super::lenient;
use super::module::ExamModule;

/// 按模块嵌套的答案：`{ "reading": { "3": "TRUE" }, "listening": { ... } }`
pub type NestedAnswers = BTreeMap<String, BTreeMap<String, AnswerValue>>;

/// 写作任务键 → 作答文本
pub type WritingResponses = BTreeMap<String, String>;

/// `GET /exam/{sessionId}` 的响应外壳
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResponse {
    pub exam_data: ExamData,
}

/// 考试数据
///
/// 各模块题目保持原始 JSON，交给目录规范化处理，确保录入错误不会让整个加载失败。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamData {
    #[serde(default)]
    pub reading: JsonValue,
    #[serde(default)]
    pub listening: JsonValue,
    #[serde(default)]
    pub writing: JsonValue,
    #[serde(default)]
    pub speaking: JsonValue,
    #[serde(default)]
    pub saved_answers: JsonValue,
    #[serde(default)]
    pub writing_responses: JsonValue,
    #[serde(default, deserialize_with = "lenient::opt_positive_u32")]
    pub time_remaining: Option<u32>,
    /// 服务端已应用的最新进度序号；续考时新快照的序号从它之后开始
    #[serde(default)]
    pub progress_sequence: u64,
}

impl ExamData {
    /// 指定模块的原始数据
    pub fn module_raw(&self, module: ExamModule) -> &JsonValue {
        match module {
            ExamModule::Reading => &self.reading,
            ExamModule::Listening => &self.listening,
            ExamModule::Writing => &self.writing,
            ExamModule::Speaking => &self.speaking,
        }
    }

    /// 写作任务列表；格式不对时返回空列表
    pub fn writing_tasks(&self) -> Vec<WritingTask> {
        let tasks = self.writing.get("tasks").unwrap_or(&self.writing);
        match tasks {
            JsonValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(idx, raw)| {
                    let mut task: WritingTask =
                        serde_json::from_value(raw.clone()).unwrap_or_default();
                    if task.key.is_empty() {
                        task.key = format!("task{}", idx + 1);
                    }
                    task
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 已保存的写作内容；非字符串的值被忽略
    pub fn saved_writing_responses(&self) -> WritingResponses {
        match &self.writing_responses {
            JsonValue::Object(map) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            _ => WritingResponses::new(),
        }
    }
}

/// 写作任务
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritingTask {
    #[serde(default, deserialize_with = "lenient::text")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub prompt: String,
    #[serde(default, deserialize_with = "lenient::opt_positive_u32")]
    pub min_words: Option<u32>,
}

/// `POST /exam/save-progress` 的同步快照
///
/// `sequence` 严格递增，接收方丢弃不新于已应用序号的快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    pub session_id: String,
    pub sequence: u64,
    pub answers: NestedAnswers,
    pub writing_responses: WritingResponses,
    pub time_remaining: u32,
}

/// `POST /test-session/{sessionId}/finish` 的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishRequest {
    pub answers: NestedAnswers,
}

/// 安全事件类型（由外部的切屏 / 全屏监控上报）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    /// 切换标签页
    TabSwitch,
    /// 退出全屏
    FullscreenExit,
    /// 窗口失焦
    WindowBlur,
    /// 复制尝试
    CopyAttempt,
}

impl SecurityEventKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tab_switch" => Some(Self::TabSwitch),
            "fullscreen_exit" => Some(Self::FullscreenExit),
            "window_blur" => Some(Self::WindowBlur),
            "copy_attempt" => Some(Self::CopyAttempt),
            _ => None,
        }
    }

    /// 该事件是否意味着考试界面被遮挡
    pub fn hides_exam(self) -> bool {
        matches!(self, Self::TabSwitch | Self::WindowBlur)
    }
}

/// `POST /exam/log-security` 的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub session_id: String,
    pub event_type: SecurityEventKind,
    /// RFC 3339 时间戳
    pub timestamp: String,
}

impl SecurityEvent {
    pub fn now(session_id: impl Into<String>, event_type: SecurityEventKind) -> Self {
        Self {
            session_id: session_id.into(),
            event_type,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
