//! 进度同步服务 - 业务能力层
//!
//! 所有写操作都"只记录，不抛出"：失败时本地状态仍是权威，下一次定时同步就是重试。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::answer_store::{nest_answers, FlatAnswers};
use crate::clients::ExamApi;
use crate::models::{SecurityEvent, SecurityEventKind, SyncEnvelope, WritingResponses};

/// 进度同步服务
///
/// 每个快照带一个严格递增的序号；可以 clone 后交给后台任务，序号计数共享。
///
/// 起始序号取当前毫秒时间戳，续考时再用 `resume_after` 接上服务端已应用的序号，
/// 进程重启后的快照不会被当成旧快照丢弃。
#[derive(Clone)]
pub struct SyncService {
    api: Arc<dyn ExamApi>,
    session_id: String,
    next_sequence: Arc<AtomicU64>,
    acked_sequence: Arc<AtomicU64>,
}

impl SyncService {
    pub fn new(api: Arc<dyn ExamApi>, session_id: impl Into<String>) -> Self {
        Self {
            api,
            session_id: session_id.into(),
            next_sequence: Arc::new(AtomicU64::new(initial_sequence())),
            acked_sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 服务端已确认的最大序号，0 表示还没有成功过
    pub fn acked_sequence(&self) -> u64 {
        self.acked_sequence.load(Ordering::SeqCst)
    }

    /// 续考：之后的序号从服务端已应用的 `applied` 之后开始
    pub fn resume_after(&self, applied: u64) {
        let next = applied.saturating_add(1);
        let previous = self.next_sequence.fetch_max(next, Ordering::SeqCst);
        self.acked_sequence.fetch_max(applied, Ordering::SeqCst);
        if previous < next {
            debug!("同步序号从 #{} 继续 (服务端已应用 #{})", next, applied);
        }
    }

    /// 生成快照并分配序号
    pub fn envelope(
        &self,
        answers: &FlatAnswers,
        writing_responses: &WritingResponses,
        time_remaining: u32,
    ) -> SyncEnvelope {
        SyncEnvelope {
            session_id: self.session_id.clone(),
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            answers: nest_answers(answers),
            writing_responses: writing_responses.clone(),
            time_remaining,
        }
    }

    /// 推送快照，返回是否成功；从不返回错误
    pub async fn push(&self, envelope: SyncEnvelope) -> bool {
        let sequence = envelope.sequence;
        match self.api.save_progress(&envelope).await {
            Ok(()) => {
                let previous = self.acked_sequence.fetch_max(sequence, Ordering::SeqCst);
                if previous > sequence {
                    debug!("快照 #{} 的确认晚于 #{}，忽略", sequence, previous);
                    return true;
                }
                info!(
                    "💾 进度已同步 #{} (剩余 {} 秒)",
                    sequence, envelope.time_remaining
                );
                true
            }
            Err(e) => {
                warn!("⚠️ 进度同步失败 #{}: {}，等待下次定时同步", sequence, e);
                false
            }
        }
    }

    /// 后台推送，不等待结果
    pub fn spawn_push(&self, envelope: SyncEnvelope) -> JoinHandle<bool> {
        let service = self.clone();
        tokio::spawn(async move { service.push(envelope).await })
    }

    /// 上报安全事件；失败只记日志
    pub async fn log_security(&self, kind: SecurityEventKind) {
        let event = SecurityEvent::now(self.session_id.clone(), kind);
        match self.api.log_security(&event).await {
            Ok(()) => debug!("安全事件已上报: {:?}", kind),
            Err(e) => warn!("⚠️ 安全事件上报失败 {:?}: {}", kind, e),
        }
    }

    /// 后台上报安全事件
    pub fn spawn_security_event(&self, kind: SecurityEventKind) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move { service.log_security(kind).await })
    }
}

fn initial_sequence() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis())
        .unwrap_or_default()
        .max(1)
}
