//! 内存版考试服务端，用于测试和离线演示

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::exam_api::ExamApi;
use crate::error::{AppError, AppResult};
use crate::models::{ExamData, FinishRequest, SecurityEvent, SyncEnvelope};

#[derive(Default)]
struct StoreState {
    exams: HashMap<String, ExamData>,
    progress: HashMap<String, SyncEnvelope>,
    finished: HashMap<String, FinishRequest>,
    security_events: Vec<SecurityEvent>,
    save_calls: usize,
    finish_calls: usize,
    discarded_envelopes: usize,
    fail_fetch: bool,
    failing_saves: usize,
    failing_finishes: usize,
}

/// 内存版考试服务端
///
/// - 按会话保存最新进度，丢弃序号不新于已应用快照的请求
/// - 取考试数据时把已保存进度合并回 `savedAnswers` / `writingResponses` / `timeRemaining`，
///   并带回已应用的序号 `progressSequence`
/// - 可以注入失败，模拟网络抖动
#[derive(Clone, Default)]
pub struct InMemoryExamStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryExamStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一场考试
    #[must_use]
    pub fn with_exam(self, session_id: &str, data: ExamData) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.exams.insert(session_id.to_string(), data);
        }
        self
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|e| AppError::Other(format!("内存存储锁异常: {}", e)))
    }

    /// 后续取考试数据全部失败
    pub fn set_fetch_failure(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_fetch = failing;
        }
    }

    /// 接下来 `n` 次保存进度失败
    pub fn fail_next_saves(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_saves = n;
        }
    }

    /// 接下来 `n` 次提交失败
    pub fn fail_next_finishes(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_finishes = n;
        }
    }

    /// 已应用的最新进度
    pub fn saved_progress(&self, session_id: &str) -> Option<SyncEnvelope> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.progress.get(session_id).cloned())
    }

    /// 已成功提交的答案
    pub fn finished(&self, session_id: &str) -> Option<FinishRequest> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.finished.get(session_id).cloned())
    }

    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.state
            .lock()
            .map(|s| s.security_events.clone())
            .unwrap_or_default()
    }

    /// 保存进度的调用次数（包括失败和被丢弃的）
    pub fn save_calls(&self) -> usize {
        self.state.lock().map(|s| s.save_calls).unwrap_or_default()
    }

    /// 提交的调用次数（包括失败的）
    pub fn finish_calls(&self) -> usize {
        self.state.lock().map(|s| s.finish_calls).unwrap_or_default()
    }

    /// 因序号过旧被丢弃的快照数
    pub fn discarded_envelopes(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.discarded_envelopes)
            .unwrap_or_default()
    }
}

fn injected_failure(endpoint: &str) -> AppError {
    AppError::bad_status(endpoint, 503, Some("injected failure".to_string()))
}

#[async_trait]
impl ExamApi for InMemoryExamStore {
    async fn fetch_exam(&self, session_id: &str) -> AppResult<ExamData> {
        let endpoint = format!("exam/{}", session_id);
        let state = self.lock()?;
        if state.fail_fetch {
            return Err(injected_failure(&endpoint));
        }
        let mut data = state
            .exams
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::bad_status(&endpoint, 404, None))?;

        if let Some(progress) = state.progress.get(session_id) {
            data.saved_answers = serde_json::to_value(&progress.answers)?;
            data.writing_responses = serde_json::to_value(&progress.writing_responses)?;
            data.time_remaining = Some(progress.time_remaining).filter(|t| *t > 0);
            data.progress_sequence = progress.sequence;
        }
        Ok(data)
    }

    async fn save_progress(&self, envelope: &SyncEnvelope) -> AppResult<()> {
        let mut state = self.lock()?;
        state.save_calls += 1;
        if state.failing_saves > 0 {
            state.failing_saves -= 1;
            return Err(injected_failure("exam/save-progress"));
        }

        let stale = state
            .progress
            .get(&envelope.session_id)
            .is_some_and(|current| current.sequence >= envelope.sequence);
        if stale {
            debug!("丢弃过旧的进度快照 #{}", envelope.sequence);
            state.discarded_envelopes += 1;
            return Ok(());
        }
        state
            .progress
            .insert(envelope.session_id.clone(), envelope.clone());
        Ok(())
    }

    async fn log_security(&self, event: &SecurityEvent) -> AppResult<()> {
        self.lock()?.security_events.push(event.clone());
        Ok(())
    }

    async fn finish(&self, session_id: &str, request: &FinishRequest) -> AppResult<()> {
        let mut state = self.lock()?;
        state.finish_calls += 1;
        if state.failing_finishes > 0 {
            state.failing_finishes -= 1;
            return Err(injected_failure(&format!("test-session/{}/finish", session_id)));
        }
        state.finished.insert(session_id.to_string(), request.clone());
        Ok(())
    }
}
