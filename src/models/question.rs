//! 题组（QuestionBlock）数据结构
//!
//! 结构与服务端 JSON 保持一致，规范化后的结果可以再次序列化并重新规范化。

use phf::phf_map;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use super::answer::QuestionId;
use super::lenient;

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlockType {
    Mcq,
    TrueFalse,
    GapFill,
    ShortAnswer,
    Matching,
    MapLabeling,
    DiagramLabeling,
    MultipleAnswer,
    /// 无法识别的题型标签
    #[default]
    Unknown,
}

/// 题型标签别名表（键已统一为小写、下划线分隔）
static BLOCK_TYPE_TAGS: phf::Map<&'static str, BlockType> = phf_map! {
    "mcq" => BlockType::Mcq,
    "multiple_choice" => BlockType::Mcq,
    "multiplechoice" => BlockType::Mcq,
    "single_choice" => BlockType::Mcq,
    "true_false" => BlockType::TrueFalse,
    "truefalse" => BlockType::TrueFalse,
    "tfng" => BlockType::TrueFalse,
    "ynng" => BlockType::TrueFalse,
    "true_false_not_given" => BlockType::TrueFalse,
    "gap_fill" => BlockType::GapFill,
    "gapfill" => BlockType::GapFill,
    "fill_in_blank" => BlockType::GapFill,
    "fill_blank" => BlockType::GapFill,
    "sentence_completion" => BlockType::GapFill,
    "short_answer" => BlockType::ShortAnswer,
    "shortanswer" => BlockType::ShortAnswer,
    "matching" => BlockType::Matching,
    "match" => BlockType::Matching,
    "map_labeling" => BlockType::MapLabeling,
    "maplabeling" => BlockType::MapLabeling,
    "map_labelling" => BlockType::MapLabeling,
    "map" => BlockType::MapLabeling,
    "diagram_labeling" => BlockType::DiagramLabeling,
    "diagramlabeling" => BlockType::DiagramLabeling,
    "diagram_labelling" => BlockType::DiagramLabeling,
    "diagram" => BlockType::DiagramLabeling,
    "multiple_answer" => BlockType::MultipleAnswer,
    "multipleanswer" => BlockType::MultipleAnswer,
    "multi_select" => BlockType::MultipleAnswer,
    "multiple_select" => BlockType::MultipleAnswer,
};

impl BlockType {
    /// 规范标签
    pub fn tag(self) -> &'static str {
        match self {
            BlockType::Mcq => "mcq",
            BlockType::TrueFalse => "true_false",
            BlockType::GapFill => "gap_fill",
            BlockType::ShortAnswer => "short_answer",
            BlockType::Matching => "matching",
            BlockType::MapLabeling => "map_labeling",
            BlockType::DiagramLabeling => "diagram_labeling",
            BlockType::MultipleAnswer => "multiple_answer",
            BlockType::Unknown => "unknown",
        }
    }

    /// 从任意写法的标签解析（`trueFalse`、`TRUE-FALSE`、`tfng` 等）
    pub fn from_tag(tag: &str) -> Self {
        let normalized: String = tag
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        BLOCK_TYPE_TAGS
            .get(normalized.as_str())
            .copied()
            .unwrap_or(BlockType::Unknown)
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl Serialize for BlockType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for BlockType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = lenient::text(deserializer)?;
        Ok(BlockType::from_tag(&tag))
    }
}

/// 题目条目（选择题、判断题、填空题的每一小题，或嵌套子题）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestionItem {
    #[serde(
        default,
        deserialize_with = "lenient::opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// 题干、选项等展示内容，原样透传
    #[serde(flatten)]
    pub content: Map<String, JsonValue>,
}

/// 地图 / 图表标注题的拖放区
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropZone {
    #[serde(
        default,
        deserialize_with = "lenient::opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub question_id: Option<String>,
    #[serde(flatten)]
    pub content: Map<String, JsonValue>,
}

/// 嵌套数据对象（匹配题、标注题、多选题等）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<QuestionItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_zones: Vec<DropZone>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<QuestionItem>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// 题组：一条作答说明 + 同一题型的若干题目
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBlock {
    #[serde(rename = "type", default)]
    pub block_type: BlockType,
    #[serde(default, deserialize_with = "lenient::text")]
    pub heading: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub instruction: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_positive_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<QuestionItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BlockData>,
    /// 规范化后按顺序写入的全局题目ID
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub question_ids: Vec<QuestionId>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl QuestionBlock {
    /// 从原始 JSON 宽松解析，永不失败
    ///
    /// 载荷损坏时只保留题型、标题、说明和 startId，作为单题占位。
    /// 第二个返回值表示是否降级为占位。
    pub fn from_raw(raw: &JsonValue) -> (Self, bool) {
        match serde_json::from_value::<QuestionBlock>(raw.clone()) {
            Ok(block) => (block, false),
            Err(_) => (Self::placeholder_from(raw), true),
        }
    }

    fn placeholder_from(raw: &JsonValue) -> Self {
        let field_text = |key: &str| -> String {
            match raw.get(key) {
                Some(JsonValue::String(s)) => s.trim().to_string(),
                Some(JsonValue::Number(n)) => n.to_string(),
                _ => String::new(),
            }
        };
        let start_id = match raw.get("startId") {
            Some(JsonValue::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0),
            Some(JsonValue::String(s)) => s.trim().parse::<u32>().ok().filter(|v| *v > 0),
            _ => None,
        };
        Self {
            block_type: BlockType::from_tag(&field_text("type")),
            heading: field_text("heading"),
            instruction: field_text("instruction"),
            start_id,
            ..Self::default()
        }
    }

    /// 本题组的题目数量（规范化之后有效）
    pub fn question_count(&self) -> usize {
        self.question_ids.len()
    }
}
