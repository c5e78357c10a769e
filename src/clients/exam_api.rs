use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{ExamData, FinishRequest, SecurityEvent, SyncEnvelope};

/// 考试服务端接口
///
/// 会话引擎只依赖这个 trait，HTTP 实现和内存实现可以互换。
#[async_trait]
pub trait ExamApi: Send + Sync {
    /// `GET /exam/{sessionId}`
    async fn fetch_exam(&self, session_id: &str) -> AppResult<ExamData>;

    /// `POST /exam/save-progress`
    async fn save_progress(&self, envelope: &SyncEnvelope) -> AppResult<()>;

    /// `POST /exam/log-security`
    async fn log_security(&self, event: &SecurityEvent) -> AppResult<()>;

    /// `POST /test-session/{sessionId}/finish`
    async fn finish(&self, session_id: &str, request: &FinishRequest) -> AppResult<()>;
}
