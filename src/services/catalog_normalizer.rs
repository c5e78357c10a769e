//! 题目目录规范化服务 - 业务能力层
//!
//! 把服务端返回的模块原始数据整理成有序题组，并为每道题分配全局唯一、可重复推导的ID。
//!
//! 规则：
//! - 每个模块一个计数器，从 1 开始，每次调用重新开始
//! - 题组自带 `startId` 时原样采用，计数器推进到 `max(counter, startId + count)`
//! - 否则 `startId = counter`，`counter += count`
//! - 子条目ID统一加模块前缀，已带前缀的跳过
//! - 载荷损坏的题组按单题占位处理，从不报错
//!
//! 对自己的输出再次规范化不会改变任何ID。

use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::models::{BlockType, ExamModule, QuestionBlock, QuestionId, QuestionItem};

/// 一个阅读 section 或听力 part
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogSection {
    /// 题组以外的字段（标题、文章、音频地址……）原样保留
    pub meta: Map<String, JsonValue>,
    pub blocks: Vec<QuestionBlock>,
}

/// 规范化后的模块题目目录
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuestionCatalog {
    pub module: Option<ExamModule>,
    pub sections: Vec<CatalogSection>,
    ids: Vec<QuestionId>,
}

impl QuestionCatalog {
    /// 空目录（写作、口语等没有编号题目的模块）
    pub fn empty(module: ExamModule) -> Self {
        Self {
            module: Some(module),
            ..Self::default()
        }
    }

    /// 离线降级目录：`count` 道简答题，ID 为 1..=count
    pub fn synthetic(module: ExamModule, count: usize) -> Self {
        let items: Vec<JsonValue> = (1..=count).map(|n| json!({ "id": n })).collect();
        let raw = json!([{
            "questionGroups": [{
                "type": "short_answer",
                "heading": format!("Questions 1-{}", count),
                "startId": 1,
                "items": items
            }]
        }]);
        CatalogNormalizer::normalize(module, &raw)
    }

    /// 按顺序排列的全部题目ID
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.ids
    }

    pub fn total_questions(&self) -> usize {
        self.ids.len()
    }

    pub fn id_at(&self, index: usize) -> Option<&QuestionId> {
        self.ids.get(index)
    }

    pub fn index_of(&self, id: &QuestionId) -> Option<usize> {
        self.ids.iter().position(|q| q == id)
    }

    /// 所有题组（跨 section 顺序展开）
    pub fn blocks(&self) -> impl Iterator<Item = &QuestionBlock> {
        self.sections.iter().flat_map(|s| s.blocks.iter())
    }

    /// 还原为服务端原始形状，可再次交给 `CatalogNormalizer::normalize`
    pub fn to_raw(&self) -> JsonValue {
        let sections: Vec<JsonValue> = self
            .sections
            .iter()
            .map(|section| {
                let mut obj = section.meta.clone();
                let blocks = serde_json::to_value(&section.blocks).unwrap_or(JsonValue::Null);
                obj.insert("questionGroups".to_string(), blocks);
                JsonValue::Object(obj)
            })
            .collect();
        let key = self.module.map(module_section_key).unwrap_or("sections");
        let mut root = Map::new();
        root.insert(key.to_string(), JsonValue::Array(sections));
        JsonValue::Object(root)
    }
}

/// 模块原始数据中 section 列表的键名
fn module_section_key(module: ExamModule) -> &'static str {
    match module {
        ExamModule::Listening => "parts",
        _ => "sections",
    }
}

// ========== 题型策略表 ==========

/// 子条目ID的改写方式
type PrefixFn<'a> = &'a mut dyn FnMut(Option<&str>, usize) -> QuestionId;

/// 单个题型的计数与改写策略
struct BlockStrategy {
    /// 题目数量，至少为 1
    count: fn(&QuestionBlock) -> usize,
    /// 改写子条目ID，返回按顺序的题目ID；没有可改写的条目时返回空
    rewrite_ids: fn(&mut QuestionBlock, PrefixFn<'_>) -> Vec<QuestionId>,
}

static ITEM_LIST: BlockStrategy = BlockStrategy {
    count: item_list_count,
    rewrite_ids: item_list_rewrite,
};

static MATCHING: BlockStrategy = BlockStrategy {
    count: matching_count,
    rewrite_ids: matching_rewrite,
};

static LABELING: BlockStrategy = BlockStrategy {
    count: labeling_count,
    rewrite_ids: labeling_rewrite,
};

static SINGLE: BlockStrategy = BlockStrategy {
    count: single_count,
    rewrite_ids: single_rewrite,
};

fn strategy_for(block_type: BlockType) -> &'static BlockStrategy {
    match block_type {
        BlockType::Mcq
        | BlockType::TrueFalse
        | BlockType::GapFill
        | BlockType::ShortAnswer
        | BlockType::Unknown => &ITEM_LIST,
        BlockType::Matching => &MATCHING,
        BlockType::MapLabeling | BlockType::DiagramLabeling => &LABELING,
        BlockType::MultipleAnswer => &SINGLE,
    }
}

/// 题目条目所在的位置
#[derive(Clone, Copy)]
enum ItemSource {
    Top,
    DataQuestions,
    DataItems,
}

fn source_len(block: &QuestionBlock, source: ItemSource) -> usize {
    match (source, block.data.as_ref()) {
        (ItemSource::Top, _) => block.items.len(),
        (ItemSource::DataQuestions, Some(d)) => d.questions.len(),
        (ItemSource::DataItems, Some(d)) => d.items.len(),
        _ => 0,
    }
}

fn source_mut(block: &mut QuestionBlock, source: ItemSource) -> Option<&mut Vec<QuestionItem>> {
    match source {
        ItemSource::Top => Some(&mut block.items),
        ItemSource::DataQuestions => block.data.as_mut().map(|d| &mut d.questions),
        ItemSource::DataItems => block.data.as_mut().map(|d| &mut d.items),
    }
}

/// 按优先级选出第一个非空的条目列表
fn first_source(block: &QuestionBlock, order: &[ItemSource]) -> Option<ItemSource> {
    order.iter().copied().find(|src| source_len(block, *src) > 0)
}

/// 列表题：顶层 items → data.questions → data.items
const ITEM_LIST_ORDER: [ItemSource; 3] = [
    ItemSource::Top,
    ItemSource::DataQuestions,
    ItemSource::DataItems,
];

/// 匹配题：data.items → data.questions → 顶层 items
const MATCHING_ORDER: [ItemSource; 3] = [
    ItemSource::DataItems,
    ItemSource::DataQuestions,
    ItemSource::Top,
];

fn item_list_count(block: &QuestionBlock) -> usize {
    first_source(block, &ITEM_LIST_ORDER)
        .map(|src| source_len(block, src))
        .unwrap_or(1)
}

fn matching_count(block: &QuestionBlock) -> usize {
    first_source(block, &MATCHING_ORDER)
        .map(|src| source_len(block, src))
        .unwrap_or(1)
}

fn labeling_count(block: &QuestionBlock) -> usize {
    block
        .data
        .as_ref()
        .map(|d| d.drop_zones.len())
        .unwrap_or(0)
        .max(1)
}

fn single_count(_block: &QuestionBlock) -> usize {
    1
}

fn rewrite_items(items: &mut [QuestionItem], prefix: PrefixFn<'_>) -> Vec<QuestionId> {
    items
        .iter_mut()
        .enumerate()
        .map(|(idx, item)| {
            let id = prefix(item.id.as_deref(), idx);
            item.id = Some(id.as_str().to_string());
            id
        })
        .collect()
}

fn rewrite_source(
    block: &mut QuestionBlock,
    order: &[ItemSource],
    prefix: PrefixFn<'_>,
) -> Vec<QuestionId> {
    let Some(source) = first_source(block, order) else {
        return Vec::new();
    };
    match source_mut(block, source) {
        Some(items) => rewrite_items(items, prefix),
        None => Vec::new(),
    }
}

fn item_list_rewrite(block: &mut QuestionBlock, prefix: PrefixFn<'_>) -> Vec<QuestionId> {
    rewrite_source(block, &ITEM_LIST_ORDER, prefix)
}

fn matching_rewrite(block: &mut QuestionBlock, prefix: PrefixFn<'_>) -> Vec<QuestionId> {
    rewrite_source(block, &MATCHING_ORDER, prefix)
}

fn labeling_rewrite(block: &mut QuestionBlock, prefix: PrefixFn<'_>) -> Vec<QuestionId> {
    let Some(data) = block.data.as_mut() else {
        return Vec::new();
    };
    data.drop_zones
        .iter_mut()
        .enumerate()
        .map(|(idx, zone)| {
            let id = prefix(zone.question_id.as_deref(), idx);
            zone.question_id = Some(id.as_str().to_string());
            id
        })
        .collect()
}

/// 多选题整体只占一个题号，选项ID不改写
fn single_rewrite(_block: &mut QuestionBlock, _prefix: PrefixFn<'_>) -> Vec<QuestionId> {
    Vec::new()
}

// ========== 规范化 ==========

/// 题目目录规范化服务
///
/// 职责：
/// - 把一个模块的原始数据变成 `QuestionCatalog`
/// - 纯函数，不持有状态；计数器随每次调用重新开始
pub struct CatalogNormalizer;

impl CatalogNormalizer {
    /// 规范化一个模块的原始数据
    ///
    /// 接受 `{ sections: [...] }`、`{ parts: [...] }` 或直接的 section 数组；
    /// 每个 section 的题组放在 `questionGroups`（或 `questions`）下。
    pub fn normalize(module: ExamModule, raw: &JsonValue) -> QuestionCatalog {
        let raw_sections = extract_sections(raw);
        let mut counter: u32 = 1;
        let mut seen: HashSet<QuestionId> = HashSet::new();
        let mut ids = Vec::new();
        let mut sections = Vec::with_capacity(raw_sections.len());

        for (section_idx, raw_section) in raw_sections.iter().enumerate() {
            let (meta, raw_blocks) = split_section(raw_section);
            let mut blocks = Vec::with_capacity(raw_blocks.len());

            for (block_idx, raw_block) in raw_blocks.iter().enumerate() {
                let (mut block, degraded) = QuestionBlock::from_raw(raw_block);
                if degraded {
                    warn!(
                        "[{}] section {} 题组 {} 载荷损坏，按单题占位处理",
                        module, section_idx, block_idx
                    );
                }

                let block_ids = Self::normalize_block(module, &mut block, &mut counter, &mut seen);
                debug!(
                    "[{}] 题组 {} ({}) startId={:?} 题数={}",
                    module,
                    block_idx,
                    block.block_type,
                    block.start_id,
                    block_ids.len()
                );
                ids.extend(block_ids);
                blocks.push(block);
            }

            sections.push(CatalogSection { meta, blocks });
        }

        QuestionCatalog {
            module: Some(module),
            sections,
            ids,
        }
    }

    /// 规范化单个题组，返回它的题目ID并推进计数器
    fn normalize_block(
        module: ExamModule,
        block: &mut QuestionBlock,
        counter: &mut u32,
        seen: &mut HashSet<QuestionId>,
    ) -> Vec<QuestionId> {
        let strategy = strategy_for(block.block_type);
        let count = (strategy.count)(block).max(1);
        let count_u32 = u32::try_from(count).unwrap_or(u32::MAX);

        let start = match block.start_id {
            Some(explicit) => {
                *counter = (*counter).max(explicit.saturating_add(count_u32));
                explicit
            }
            None => {
                let start = *counter;
                block.start_id = Some(start);
                *counter = counter.saturating_add(count_u32);
                start
            }
        };

        let mut prefix = |existing: Option<&str>, idx: usize| -> QuestionId {
            let candidate = match existing {
                Some(raw) => QuestionId::prefixed(module, raw),
                None => QuestionId::numbered(module, start.saturating_add(idx as u32)),
            };
            unique_id(module, candidate, seen)
        };

        let mut block_ids = (strategy.rewrite_ids)(block, &mut prefix);
        if block_ids.is_empty() {
            block_ids.push(prefix(None, 0));
        }
        block.question_ids = block_ids.clone();
        block_ids
    }
}

/// 模块内ID重复时追加序号，保证唯一
fn unique_id(module: ExamModule, candidate: QuestionId, seen: &mut HashSet<QuestionId>) -> QuestionId {
    if seen.insert(candidate.clone()) {
        return candidate;
    }
    let mut n = 2;
    loop {
        let alt = QuestionId::prefixed(module, &format!("{}.{}", candidate.raw(), n));
        if seen.insert(alt.clone()) {
            warn!("[{}] 题目ID {} 重复，改为 {}", module, candidate, alt);
            return alt;
        }
        n += 1;
    }
}

fn extract_sections(raw: &JsonValue) -> Vec<JsonValue> {
    match raw {
        JsonValue::Array(list) => list.clone(),
        JsonValue::Object(obj) => ["sections", "parts"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(|v| v.as_array()))
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn split_section(raw: &JsonValue) -> (Map<String, JsonValue>, Vec<JsonValue>) {
    let Some(obj) = raw.as_object() else {
        return (Map::new(), Vec::new());
    };
    let mut meta = obj.clone();
    let blocks = ["questionGroups", "questions"]
        .iter()
        .find_map(|key| match obj.get(*key) {
            Some(JsonValue::Array(list)) => {
                meta.remove(*key);
                Some(list.clone())
            }
            _ => None,
        })
        .unwrap_or_default();
    (meta, blocks)
}
