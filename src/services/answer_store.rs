//! 答案与状态存储 - 业务能力层
//!
//! 只负责"记住作答、标记和当前位置"，不关心计时和网络。

use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::models::{AnswerValue, ExamModule, NestedAnswers, QuestionId, QuestionStatus, Status};

/// 内部扁平答案表：全局题目ID → 答案
pub type FlatAnswers = BTreeMap<QuestionId, AnswerValue>;

/// 答案与状态存储
///
/// 职责：
/// - 持有扁平答案表（包含所有模块，切换模块时整体交接）
/// - 维护标记集合，状态由"是否标记 + 是否有答案"推导
/// - 维护当前题目索引，范围 `[0, total_questions - 1]`
pub struct AnswerStore {
    module: ExamModule,
    answers: FlatAnswers,
    flagged: BTreeSet<QuestionId>,
    question_ids: Vec<QuestionId>,
    current_index: usize,
}

impl AnswerStore {
    /// 创建新的存储
    ///
    /// # 参数
    /// - `module`: 当前模块（原始ID按它加前缀）
    /// - `question_ids`: 当前模块目录的题目ID（决定导航范围和状态列表）
    /// - `seeded`: 之前保存的答案
    pub fn new(module: ExamModule, question_ids: Vec<QuestionId>, seeded: FlatAnswers) -> Self {
        debug!(
            "[{}] 答案存储初始化: {} 道题, 已有答案 {} 条",
            module,
            question_ids.len(),
            seeded.len()
        );
        Self {
            module,
            answers: seeded,
            flagged: BTreeSet::new(),
            question_ids,
            current_index: 0,
        }
    }

    /// 把原始ID解析为全局题目ID
    pub fn resolve(&self, raw_id: &str) -> QuestionId {
        QuestionId::prefixed(self.module, raw_id)
    }

    /// 写入答案；未标记的题目状态变为已作答
    pub fn set_answer(&mut self, raw_id: &str, value: AnswerValue) -> QuestionId {
        let id = self.resolve(raw_id);
        debug!("[{}] 作答 {} → {}", self.module, id, value.preview());
        self.answers.insert(id.clone(), value);
        id
    }

    /// 切换标记
    ///
    /// 已标记 → 按是否有答案恢复为已作答 / 未作答；否则一律变为已标记。
    pub fn toggle_flag(&mut self, raw_id: &str) -> Status {
        let id = self.resolve(raw_id);
        if !self.flagged.remove(&id) {
            self.flagged.insert(id.clone());
        }
        let status = self.status_of(&id);
        debug!("[{}] 标记切换 {} → {:?}", self.module, id, status);
        status
    }

    /// 单题状态
    pub fn status_of(&self, id: &QuestionId) -> Status {
        if self.flagged.contains(id) {
            Status::Flagged
        } else if self.answers.contains_key(id) {
            Status::Answered
        } else {
            Status::Unanswered
        }
    }

    /// 当前模块全部题目的状态（目录顺序）
    pub fn question_status(&self) -> Vec<QuestionStatus> {
        self.question_ids
            .iter()
            .map(|id| QuestionStatus {
                id: id.clone(),
                status: self.status_of(id),
            })
            .collect()
    }

    pub fn answer(&self, id: &QuestionId) -> Option<&AnswerValue> {
        self.answers.get(id)
    }

    pub fn answers(&self) -> &FlatAnswers {
        &self.answers
    }

    /// 取出答案表（切换模块时交接给下一个会话）
    pub fn into_answers(self) -> FlatAnswers {
        self.answers
    }

    /// 当前模块已作答的题数
    pub fn answered_count(&self) -> usize {
        self.question_ids
            .iter()
            .filter(|id| self.answers.contains_key(*id))
            .count()
    }

    pub fn total_questions(&self) -> usize {
        self.question_ids.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&QuestionId> {
        self.question_ids.get(self.current_index)
    }

    // ========== 导航 ==========

    /// 跳转到指定题目；越界请求直接忽略
    pub fn go_to_question(&mut self, index: usize) -> bool {
        if index < self.question_ids.len() {
            self.current_index = index;
            true
        } else {
            debug!(
                "[{}] 忽略越界跳转: {} (共 {} 题)",
                self.module,
                index,
                self.question_ids.len()
            );
            false
        }
    }

    /// 下一题，停在最后一题
    pub fn go_to_next_question(&mut self) -> bool {
        self.go_to_question(self.current_index + 1)
    }

    /// 上一题，停在第一题
    pub fn go_to_prev_question(&mut self) -> bool {
        match self.current_index.checked_sub(1) {
            Some(prev) => self.go_to_question(prev),
            None => false,
        }
    }
}

// ========== 嵌套 / 扁平答案转换 ==========

/// 嵌套（按模块）→ 扁平（带前缀）
pub fn flatten_answers(nested: &NestedAnswers) -> FlatAnswers {
    let mut flat = FlatAnswers::new();
    for (module_key, inner) in nested {
        let Some(module) = ExamModule::from_str(module_key) else {
            warn!("忽略未知模块的答案: {}", module_key);
            continue;
        };
        for (raw_id, value) in inner {
            flat.insert(QuestionId::prefixed(module, raw_id), value.clone());
        }
    }
    flat
}

/// 扁平（带前缀）→ 嵌套（按模块）
pub fn nest_answers(flat: &FlatAnswers) -> NestedAnswers {
    let mut nested = NestedAnswers::new();
    for (id, value) in flat {
        match QuestionId::split(id.as_str()) {
            Some((module, raw)) => {
                nested
                    .entry(module.key().to_string())
                    .or_default()
                    .insert(raw.to_string(), value.clone());
            }
            None => warn!("忽略没有模块前缀的答案: {}", id),
        }
    }
    nested
}

/// 宽松解析服务端保存的答案
///
/// 兼容嵌套形状 `{ reading: { "3": .. } }` 和已经扁平化的 `{ "reading-3": .. }`；
/// 无法识别的值被跳过。
pub fn flatten_saved_answers(saved: &JsonValue) -> FlatAnswers {
    let mut flat = FlatAnswers::new();
    let Some(obj) = saved.as_object() else {
        return flat;
    };
    for (key, value) in obj {
        if let Some(module) = ExamModule::from_str(key).filter(|m| m.key() == key) {
            if let Some(inner) = value.as_object() {
                for (raw_id, raw_value) in inner {
                    if let Some(answer) = AnswerValue::from_json(raw_value) {
                        flat.insert(QuestionId::prefixed(module, raw_id), answer);
                    }
                }
                continue;
            }
        }
        if let Some(id) = QuestionId::parse(key) {
            if let Some(answer) = AnswerValue::from_json(value) {
                flat.insert(id, answer);
            }
        } else {
            warn!("忽略无法识别的已保存答案: {}", key);
        }
    }
    flat
}
