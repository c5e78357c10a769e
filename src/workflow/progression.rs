//! 模块推进与提交 - 流程层
//!
//! 核心职责：决定"一个模块结束后去哪里"
//!
//! 流程顺序：
//! 1. 同步一次进度（等待结果，但失败不阻塞）
//! 2. 有下一个模块 → 改写模块选择器
//! 3. 已是最后一个模块 → 提交整场考试

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clients::ExamApi;
use crate::config::Config;
use crate::models::{ExamLocation, FinishRequest};
use crate::services::SyncService;
use crate::workflow::exam_session::ExamSession;

/// 提交结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// 服务端已确认
    Submitted { attempts: usize },
    /// 之前已经提交过，本次什么都没做
    AlreadySubmitted,
    /// 重试耗尽；考试仍视为结束
    Failed { attempts: usize, reason: String },
}

/// 模块结束后的去向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleTransition {
    /// 进入下一个模块
    Advanced(ExamLocation),
    /// 整场考试已提交
    Submitted(SubmissionOutcome),
    /// 模块结束已经处理过（或考试已结束），本次忽略
    AlreadyHandled,
}

/// 模块推进协调器
///
/// - 不持有会话，只在调用时借用
/// - 同步失败只记录，提交失败按配置重试
pub struct ProgressionCoordinator {
    api: Arc<dyn ExamApi>,
    sync: SyncService,
    submit_max_retries: usize,
    submit_retry_delay: Duration,
}

impl ProgressionCoordinator {
    pub fn new(config: &Config, api: Arc<dyn ExamApi>, sync: SyncService) -> Self {
        Self {
            api,
            sync,
            submit_max_retries: config.submit_max_retries,
            submit_retry_delay: Duration::from_secs(config.submit_retry_delay_secs),
        }
    }

    pub fn sync_service(&self) -> &SyncService {
        &self.sync
    }

    /// 同步进度并等待结果；失败只记录日志
    pub async fn sync_progress_to_server(&self, session: &ExamSession) -> bool {
        let envelope = session.sync_envelope(&self.sync);
        self.sync.push(envelope).await
    }

    /// 后台同步，不等待结果（定时同步和写作防抖使用）
    pub fn spawn_sync(&self, session: &ExamSession) -> JoinHandle<bool> {
        let envelope = session.sync_envelope(&self.sync);
        self.sync.spawn_push(envelope)
    }

    /// 结束当前模块；同一个会话只处理一次
    pub async fn finish_module(&self, session: &mut ExamSession) -> ModuleTransition {
        if !session.begin_finish_module() {
            return ModuleTransition::AlreadyHandled;
        }
        let ctx = session.ctx().clone();
        info!("{} 📤 模块结束，同步进度...", ctx);
        self.sync_progress_to_server(session).await;

        match ctx.module.next() {
            Some(next) => {
                let location = session.location().with_module(next);
                info!("{} ➡️ 进入下一个模块: {}", ctx, location);
                ModuleTransition::Advanced(location)
            }
            None => ModuleTransition::Submitted(self.submit_exam(session).await),
        }
    }

    /// 提交整场考试
    ///
    /// 第一次调用立即结束考试并停止计时；之后的调用直接返回 `AlreadySubmitted`。
    /// 提交失败按配置重试，重试耗尽时考试仍保持结束状态。
    pub async fn submit_exam(&self, session: &mut ExamSession) -> SubmissionOutcome {
        if !session.mark_exam_ended() {
            return SubmissionOutcome::AlreadySubmitted;
        }
        let ctx = session.ctx().clone();
        let request = FinishRequest {
            answers: session.nested_answers(),
        };
        let max_attempts = self.submit_max_retries + 1;
        info!(
            "{} 🏁 提交考试 ({} 个模块有作答)",
            ctx,
            request.answers.len()
        );

        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self.api.finish(&ctx.session_id, &request).await {
                Ok(()) => {
                    info!("{} ✅ 考试已提交 (第 {} 次尝试)", ctx, attempt);
                    return SubmissionOutcome::Submitted { attempts: attempt };
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        warn!(
                            "{} ⚠️ 提交失败 ({}/{}): {}，{} 秒后重试",
                            ctx,
                            attempt,
                            max_attempts,
                            e,
                            self.submit_retry_delay.as_secs()
                        );
                        tokio::time::sleep(self.submit_retry_delay).await;
                    }
                }
            }
        }

        error!(
            "{} ❌ 提交彻底失败 (已尝试 {} 次): {}",
            ctx, max_attempts, last_error
        );
        SubmissionOutcome::Failed {
            attempts: max_attempts,
            reason: last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::InMemoryExamStore;
    use crate::models::{AnswerValue, ExamData, ExamModule};
    use crate::workflow::exam_session::LoadedExam;

    fn setup(store: &InMemoryExamStore) -> (Config, ProgressionCoordinator) {
        let config = Config {
            submit_max_retries: 2,
            submit_retry_delay_secs: 0,
            ..Config::for_session("s1")
        };
        let api: Arc<dyn ExamApi> = Arc::new(store.clone());
        let sync = SyncService::new(api.clone(), "s1");
        let coordinator = ProgressionCoordinator::new(&config, api, sync);
        (config, coordinator)
    }

    fn session(config: &Config, module: ExamModule) -> ExamSession {
        ExamSession::new(config, module, &LoadedExam::offline(5), None)
    }

    #[tokio::test]
    async fn test_finish_module_advances_once() {
        let store = InMemoryExamStore::new();
        let (config, coordinator) = setup(&store);
        let mut reading = session(&config, ExamModule::Reading);

        let first = coordinator.finish_module(&mut reading).await;
        assert_eq!(
            first,
            ModuleTransition::Advanced(ExamLocation::new("s1", ExamModule::Listening))
        );
        assert_eq!(store.save_calls(), 1);

        let second = coordinator.finish_module(&mut reading).await;
        assert_eq!(second, ModuleTransition::AlreadyHandled);
        assert_eq!(store.save_calls(), 1);
    }

    #[tokio::test]
    async fn test_last_module_submits() {
        let store = InMemoryExamStore::new();
        let (config, coordinator) = setup(&store);
        let mut speaking = session(&config, ExamModule::Speaking);

        let transition = coordinator.finish_module(&mut speaking).await;
        assert_eq!(
            transition,
            ModuleTransition::Submitted(SubmissionOutcome::Submitted { attempts: 1 })
        );
        assert!(speaking.is_exam_ended());
        assert!(store.finished("s1").is_some());
    }

    #[tokio::test]
    async fn test_submit_is_idempotent() {
        let store = InMemoryExamStore::new();
        let (config, coordinator) = setup(&store);
        let mut reading = session(&config, ExamModule::Reading);
        reading
            .set_answer("3", AnswerValue::Text("B".into()))
            .unwrap();

        let first = coordinator.submit_exam(&mut reading).await;
        let second = coordinator.submit_exam(&mut reading).await;
        assert_eq!(first, SubmissionOutcome::Submitted { attempts: 1 });
        assert_eq!(second, SubmissionOutcome::AlreadySubmitted);
        assert_eq!(store.finish_calls(), 1);

        let finished = store.finished("s1").unwrap();
        assert_eq!(
            finished.answers["reading"].get("3"),
            Some(&AnswerValue::Text("B".into()))
        );
    }

    #[tokio::test]
    async fn test_submit_retries_then_succeeds() {
        let store = InMemoryExamStore::new();
        store.fail_next_finishes(2);
        let (config, coordinator) = setup(&store);
        let mut reading = session(&config, ExamModule::Reading);

        let outcome = coordinator.submit_exam(&mut reading).await;
        assert_eq!(outcome, SubmissionOutcome::Submitted { attempts: 3 });
        assert_eq!(store.finish_calls(), 3);
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_exam_ended() {
        let store = InMemoryExamStore::new();
        store.fail_next_finishes(10);
        let (config, coordinator) = setup(&store);
        let mut reading = session(&config, ExamModule::Reading);

        let outcome = coordinator.submit_exam(&mut reading).await;
        assert!(matches!(outcome, SubmissionOutcome::Failed { attempts: 3, .. }));
        assert!(reading.is_exam_ended());
        assert!(store.finished("s1").is_none());
    }

    #[tokio::test]
    async fn test_finish_module_syncs_even_when_sync_fails() {
        let store = InMemoryExamStore::new().with_exam("s1", ExamData::default());
        store.fail_next_saves(1);
        let (config, coordinator) = setup(&store);
        let mut listening = session(&config, ExamModule::Listening);

        let transition = coordinator.finish_module(&mut listening).await;
        assert_eq!(
            transition,
            ModuleTransition::Advanced(ExamLocation::new("s1", ExamModule::Writing))
        );
        assert_eq!(coordinator.sync_service().acked_sequence(), 0);
    }
}
