//! 考试会话聚合 - 流程层
//!
//! 每进入一个模块创建一个 `ExamSession`，模块切换时整体重建；
//! 考试结束后会话冻结，所有修改操作返回 `SessionError::ExamEnded`。

use std::path::Path;
use tracing::{debug, info, warn};

use crate::clients::ExamApi;
use crate::config::Config;
use crate::error::{AppResult, SessionError, SessionResult};
use crate::models::{
    load_exam_fixture, AnswerValue, ExamData, ExamLocation, ExamModule, QuestionId,
    QuestionStatus, Status, SyncEnvelope, WritingResponses, WritingTask,
};
use crate::services::{
    flatten_saved_answers, nest_answers, AnswerStore, CatalogNormalizer, ClockTick, ExamClock,
    FlatAnswers, ListeningPhase, ListeningPhaseMachine, QuestionCatalog, SyncService,
};
use crate::workflow::session_ctx::SessionCtx;

/// 已加载的考试数据
#[derive(Debug, Clone)]
pub struct LoadedExam {
    pub data: ExamData,
    /// 离线降级：题目目录用默认数量的简答题代替
    pub offline: bool,
    fallback_question_count: usize,
}

impl LoadedExam {
    pub fn online(data: ExamData) -> Self {
        Self {
            data,
            offline: false,
            fallback_question_count: 0,
        }
    }

    pub fn offline(fallback_question_count: usize) -> Self {
        Self {
            data: ExamData::default(),
            offline: true,
            fallback_question_count,
        }
    }

    /// 构建指定模块的题目目录
    pub fn catalog_for(&self, module: ExamModule) -> QuestionCatalog {
        if !module.has_question_catalog() {
            return QuestionCatalog::empty(module);
        }
        if self.offline {
            return QuestionCatalog::synthetic(module, self.fallback_question_count);
        }
        CatalogNormalizer::normalize(module, self.data.module_raw(module))
    }
}

/// 加载考试数据
///
/// - 配置了本地文件时直接读文件，读失败就报错
/// - 否则请求服务端；失败时生产环境报加载错误，非生产环境降级为离线目录
pub async fn load_exam(config: &Config, api: &dyn ExamApi) -> AppResult<LoadedExam> {
    if let Some(path) = &config.fixture_path {
        let data = load_exam_fixture(Path::new(path)).await?;
        return Ok(LoadedExam::online(data));
    }

    match api.fetch_exam(&config.session_id).await {
        Ok(data) => {
            info!("✓ 考试数据已加载 (会话: {})", config.session_id);
            Ok(LoadedExam::online(data))
        }
        Err(e) if config.production => Err(SessionError::LoadFailed {
            session_id: config.session_id.clone(),
            reason: e.to_string(),
        }
        .into()),
        Err(e) => {
            warn!(
                "⚠️ 考试数据加载失败: {}，使用 {} 道默认题目继续",
                e, config.fallback_question_count
            );
            Ok(LoadedExam::offline(config.fallback_question_count))
        }
    }
}

/// 模块切换时交接给下一个会话的状态
#[derive(Debug, Clone, Default)]
pub struct ModuleCarryover {
    pub answers: FlatAnswers,
    pub writing_responses: WritingResponses,
    pub time_left: u32,
}

/// 考试会话
///
/// 单一所有者：计时、作答、导航都通过这里的方法修改，调用方只读观察值。
pub struct ExamSession {
    ctx: SessionCtx,
    location: ExamLocation,
    catalog: QuestionCatalog,
    store: AnswerStore,
    clock: ExamClock,
    listening: ListeningPhaseMachine,
    writing_tasks: Vec<WritingTask>,
    writing_responses: WritingResponses,
    writing_dirty: bool,
    is_exam_ended: bool,
    is_hidden: bool,
    module_finishing: bool,
}

impl ExamSession {
    /// 进入模块时创建会话
    ///
    /// 有交接状态时沿用上一个模块的答案、写作内容和剩余时间；
    /// 否则从服务端保存的进度恢复，剩余时间为 0 或缺失时用配置的整场时长。
    pub fn new(
        config: &Config,
        module: ExamModule,
        loaded: &LoadedExam,
        carryover: Option<ModuleCarryover>,
    ) -> Self {
        let ctx = SessionCtx::new(config.session_id.clone(), module);
        let catalog = loaded.catalog_for(module);

        let (answers, writing_responses, time_left) = match carryover {
            Some(c) => (c.answers, c.writing_responses, c.time_left),
            None => (
                flatten_saved_answers(&loaded.data.saved_answers),
                loaded.data.saved_writing_responses(),
                loaded
                    .data
                    .time_remaining
                    .unwrap_or(config.exam_duration_secs),
            ),
        };

        info!(
            "{} 📋 进入模块 {}: {} 道题, 已有答案 {} 条, 剩余 {} 秒",
            ctx,
            module.name(),
            catalog.total_questions(),
            answers.len(),
            time_left
        );

        let store = AnswerStore::new(module, catalog.question_ids().to_vec(), answers);

        Self {
            location: ExamLocation::new(config.session_id.clone(), module),
            ctx,
            catalog,
            store,
            clock: ExamClock::new(time_left),
            listening: ListeningPhaseMachine::new(config.review_duration_secs),
            writing_tasks: loaded.data.writing_tasks(),
            writing_responses,
            writing_dirty: false,
            is_exam_ended: false,
            is_hidden: false,
            module_finishing: false,
        }
    }

    fn ensure_active(&self, operation: &'static str) -> SessionResult<()> {
        if self.is_exam_ended {
            warn!("{} 考试已结束，拒绝操作: {}", self.ctx, operation);
            return Err(SessionError::ExamEnded { operation });
        }
        Ok(())
    }

    // ========== 作答与导航 ==========

    pub fn set_answer(&mut self, raw_id: &str, value: AnswerValue) -> SessionResult<QuestionId> {
        self.ensure_active("set_answer")?;
        Ok(self.store.set_answer(raw_id, value))
    }

    pub fn toggle_flag(&mut self, raw_id: &str) -> SessionResult<Status> {
        self.ensure_active("toggle_flag")?;
        Ok(self.store.toggle_flag(raw_id))
    }

    pub fn go_to_question(&mut self, index: usize) -> SessionResult<bool> {
        self.ensure_active("go_to_question")?;
        Ok(self.store.go_to_question(index))
    }

    pub fn go_to_next_question(&mut self) -> SessionResult<bool> {
        self.ensure_active("go_to_next_question")?;
        Ok(self.store.go_to_next_question())
    }

    pub fn go_to_prev_question(&mut self) -> SessionResult<bool> {
        self.ensure_active("go_to_prev_question")?;
        Ok(self.store.go_to_prev_question())
    }

    /// 写作文本；调用方负责安排防抖同步
    pub fn set_writing_response(&mut self, key: &str, text: impl Into<String>) -> SessionResult<()> {
        self.ensure_active("set_writing_response")?;
        self.writing_responses.insert(key.to_string(), text.into());
        self.writing_dirty = true;
        Ok(())
    }

    /// 取出"写作有未同步修改"标记
    pub fn take_writing_dirty(&mut self) -> bool {
        std::mem::take(&mut self.writing_dirty)
    }

    // ========== 计时 ==========

    /// 暂停 / 继续整场计时，返回是否在计时
    pub fn toggle_timer(&mut self) -> SessionResult<bool> {
        self.ensure_active("toggle_timer")?;
        let running = self.clock.toggle();
        info!(
            "{} {} (剩余 {} 秒)",
            self.ctx,
            if running { "▶️ 继续计时" } else { "⏸️ 暂停计时" },
            self.clock.time_left()
        );
        Ok(running)
    }

    /// 整场计时推进一秒；考试结束后不再计时
    pub fn tick_clock(&mut self) -> ClockTick {
        if self.is_exam_ended {
            return ClockTick::Stopped;
        }
        let tick = self.clock.tick();
        if tick == ClockTick::Expired {
            warn!("{} ⏰ 考试时间到", self.ctx);
        }
        tick
    }

    /// 音频播放结束信号；只在听力模块的 Audio 阶段生效
    pub fn start_review_phase(&mut self) -> SessionResult<bool> {
        self.ensure_active("start_review_phase")?;
        if self.ctx.module != ExamModule::Listening {
            debug!("{} 非听力模块，忽略音频结束信号", self.ctx);
            return Ok(false);
        }
        let entered = self.listening.start_review_phase();
        if entered {
            info!(
                "{} 🎧 音频结束，进入检查阶段 ({} 秒)",
                self.ctx,
                self.listening.review_time_left()
            );
        }
        Ok(entered)
    }

    /// 检查阶段推进一秒；本次进入 Ended 时返回 true
    pub fn tick_review(&mut self) -> bool {
        if self.is_exam_ended {
            return false;
        }
        let ended = self.listening.tick();
        if ended {
            info!("{} 🔚 检查时间结束", self.ctx);
        }
        ended
    }

    // ========== 生命周期 ==========

    /// 模块结束守卫：只有第一次调用且考试未结束时返回 true
    pub fn begin_finish_module(&mut self) -> bool {
        if self.is_exam_ended || self.module_finishing {
            return false;
        }
        self.module_finishing = true;
        true
    }

    /// 标记考试结束：停止计时，冻结会话；只有第一次调用返回 true
    pub fn mark_exam_ended(&mut self) -> bool {
        if self.is_exam_ended {
            return false;
        }
        self.is_exam_ended = true;
        self.clock.stop();
        self.listening.end();
        true
    }

    /// 隐私遮挡状态，由外部事件源切换
    pub fn set_hidden(&mut self, hidden: bool) {
        if self.is_hidden != hidden {
            debug!("{} 遮挡状态: {}", self.ctx, hidden);
        }
        self.is_hidden = hidden;
    }

    /// 生成同步快照
    pub fn sync_envelope(&self, sync: &SyncService) -> SyncEnvelope {
        sync.envelope(
            self.store.answers(),
            &self.writing_responses,
            self.clock.time_left(),
        )
    }

    /// 交接给下一个模块
    pub fn into_carryover(self) -> ModuleCarryover {
        ModuleCarryover {
            time_left: self.clock.time_left(),
            writing_responses: self.writing_responses,
            answers: self.store.into_answers(),
        }
    }

    // ========== 只读观察值 ==========

    pub fn ctx(&self) -> &SessionCtx {
        &self.ctx
    }

    pub fn active_module(&self) -> ExamModule {
        self.ctx.module
    }

    pub fn location(&self) -> &ExamLocation {
        &self.location
    }

    pub fn catalog(&self) -> &QuestionCatalog {
        &self.catalog
    }

    pub fn time_left(&self) -> u32 {
        self.clock.time_left()
    }

    pub fn is_timer_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn review_time_left(&self) -> u32 {
        self.listening.review_time_left()
    }

    pub fn listening_phase(&self) -> ListeningPhase {
        self.listening.phase()
    }

    pub fn question_status(&self) -> Vec<QuestionStatus> {
        self.store.question_status()
    }

    pub fn status_of(&self, id: &QuestionId) -> Status {
        self.store.status_of(id)
    }

    pub fn answers(&self) -> &FlatAnswers {
        self.store.answers()
    }

    pub fn answer(&self, id: &QuestionId) -> Option<&AnswerValue> {
        self.store.answer(id)
    }

    pub fn answered_count(&self) -> usize {
        self.store.answered_count()
    }

    pub fn total_questions(&self) -> usize {
        self.store.total_questions()
    }

    pub fn current_question_index(&self) -> usize {
        self.store.current_index()
    }

    pub fn current_question(&self) -> Option<&QuestionId> {
        self.store.current_question()
    }

    pub fn is_exam_ended(&self) -> bool {
        self.is_exam_ended
    }

    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    pub fn writing_tasks(&self) -> &[WritingTask] {
        &self.writing_tasks
    }

    pub fn writing_responses(&self) -> &WritingResponses {
        &self.writing_responses
    }

    /// 写作任务当前字数
    pub fn word_count(&self, key: &str) -> usize {
        self.writing_responses
            .get(key)
            .map(|text| word_count(text))
            .unwrap_or(0)
    }

    /// 按模块嵌套的答案（网络格式）
    pub fn nested_answers(&self) -> crate::models::NestedAnswers {
        nest_answers(self.store.answers())
    }
}

/// 按空白分词计数
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
