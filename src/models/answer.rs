//! 题目ID、答案值与答题状态

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::module::ExamModule;
use crate::utils::truncate_text;

/// 全局唯一题目ID，形如 `<module>-<rawId>`
///
/// 加前缀是幂等的：已带本模块前缀的ID保持不变；带其他模块前缀的ID
/// 整体当作原始ID，再加一层本模块前缀，不同模块的ID因此不会相撞。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    /// 为原始ID加上模块前缀（已有本模块前缀则原样保留）
    pub fn prefixed(module: ExamModule, raw: &str) -> Self {
        let raw = raw.trim();
        match Self::split(raw) {
            Some((owner, _)) if owner == module => Self(raw.to_string()),
            _ => Self(format!("{}-{}", module.key(), raw)),
        }
    }

    /// 解析已带前缀的ID；没有合法前缀时返回 None
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        Self::split(id).map(|_| Self(id.to_string()))
    }

    /// 由序号生成ID
    pub fn numbered(module: ExamModule, number: u32) -> Self {
        Self(format!("{}-{}", module.key(), number))
    }

    /// 拆分为 (模块, 原始ID)；没有合法前缀时返回 None
    pub fn split(id: &str) -> Option<(ExamModule, &str)> {
        let (prefix, raw) = id.split_once('-')?;
        if raw.is_empty() {
            return None;
        }
        ExamModule::from_str(prefix)
            .filter(|m| m.key() == prefix)
            .map(|m| (m, raw))
    }

    /// 判断字符串是否已带模块前缀
    pub fn is_prefixed(id: &str) -> bool {
        Self::split(id).is_some()
    }

    pub fn module(&self) -> Option<ExamModule> {
        Self::split(&self.0).map(|(m, _)| m)
    }

    /// 去掉前缀后的原始ID
    pub fn raw(&self) -> &str {
        Self::split(&self.0).map(|(_, raw)| raw).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 答案值
///
/// 网络上以无标签 JSON 传输：字符串、`{ "1": "...", "2": "..." }`、字符串数组。
/// `Selection` 与 `Text` 在线上同为字符串，反序列化时统一为 `Text`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// 文本作答
    Text(String),
    /// 一个填空题目内的多个空（空位序号 → 文本）
    MultiBlank(BTreeMap<u32, String>),
    /// 多选
    MultiSelection(Vec<String>),
    /// 单选 / 匹配拖放
    Selection(String),
}

impl AnswerValue {
    /// 从服务端 JSON 宽松解析；null 或无法识别的形状返回 None
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => Some(AnswerValue::Text(s.clone())),
            JsonValue::Number(n) => Some(AnswerValue::Text(n.to_string())),
            JsonValue::Bool(b) => Some(AnswerValue::Text(b.to_string())),
            JsonValue::Array(items) => Some(AnswerValue::MultiSelection(
                items.iter().map(json_to_text).collect(),
            )),
            JsonValue::Object(map) => {
                let mut blanks = BTreeMap::new();
                for (key, v) in map {
                    let slot: u32 = key.trim().parse().ok()?;
                    blanks.insert(slot, json_to_text(v));
                }
                Some(AnswerValue::MultiBlank(blanks))
            }
            JsonValue::Null => None,
        }
    }

    /// 是否没有任何有效内容
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Text(s) | AnswerValue::Selection(s) => s.trim().is_empty(),
            AnswerValue::MultiBlank(blanks) => blanks.values().all(|s| s.trim().is_empty()),
            AnswerValue::MultiSelection(items) => items.is_empty(),
        }
    }

    /// 日志显示用的简短预览
    pub fn preview(&self) -> String {
        match self {
            AnswerValue::Text(s) => format!("文本 \"{}\"", truncate_text(s, 30)),
            AnswerValue::Selection(s) => format!("选择 {}", s),
            AnswerValue::MultiBlank(blanks) => format!("{} 个空", blanks.len()),
            AnswerValue::MultiSelection(items) => format!("多选 [{}]", items.join(", ")),
        }
    }
}

impl<'de> Deserialize<'de> for AnswerValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // 经由 JsonValue 中转：untagged 枚举无法把字符串键还原为整数键
        let value = JsonValue::deserialize(deserializer)?;
        AnswerValue::from_json(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("无法识别的答案形状: {}", value))
        })
    }
}

fn json_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// 单题作答状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unanswered,
    Answered,
    Flagged,
}

/// 对外暴露的题目状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionStatus {
    pub id: QuestionId,
    pub status: Status,
}
