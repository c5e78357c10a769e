//! 考试运行器 - 编排层
//!
//! ## 职责
//!
//! 1. **加载**：取考试数据（服务端 / 本地文件 / 离线降级）
//! 2. **事件循环**：单任务 `select!`，驱动计时、定时同步、写作防抖和外部命令
//! 3. **模块切换**：模块结束后丢弃本模块的全部定时器，用交接状态重建会话
//!
//! 会话只被这个循环持有；网络写入在后台任务里进行，不阻塞计时。

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clients::ExamApi;
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{AnswerValue, ExamLocation, ExamModule, SecurityEventKind};
use crate::services::{ClockTick, SyncService};
use crate::utils::logging::{format_clock, log_module_start};
use crate::workflow::{
    load_exam, ExamSession, ModuleTransition, ProgressionCoordinator, SubmissionOutcome,
};

/// 外部命令（展示层 / 终端输入）
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Answer { id: String, value: AnswerValue },
    Flag(String),
    /// 从 0 开始的题目索引
    GoTo(usize),
    Next,
    Prev,
    Write { key: String, text: String },
    /// 听力音频播放结束
    AudioEnded,
    ToggleTimer,
    SetHidden(bool),
    Security(SecurityEventKind),
    FinishModule,
    Submit,
    Status,
    Quit,
}

impl SessionCommand {
    /// 解析一行终端输入
    ///
    /// ```text
    /// answer reading-3 TRUE        文本
    /// select listening-7 B         单选
    /// multi listening-8 A,C        多选
    /// blanks reading-5 1=cat;2=dog 多空
    /// goto 12                      跳到第 12 题（从 1 开始）
    /// write task1 some text...     写作
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let (arg, tail) = rest
            .split_once(char::is_whitespace)
            .map(|(a, t)| (a, t.trim()))
            .unwrap_or((rest, ""));

        let command = match cmd.to_ascii_lowercase().as_str() {
            "answer" | "select" | "multi" | "blanks" if !arg.is_empty() && !tail.is_empty() => {
                let value = match cmd.to_ascii_lowercase().as_str() {
                    "select" => AnswerValue::Selection(tail.to_string()),
                    "multi" => AnswerValue::MultiSelection(
                        tail.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect(),
                    ),
                    "blanks" => AnswerValue::MultiBlank(
                        tail.split(';')
                            .filter_map(|pair| pair.split_once('='))
                            .filter_map(|(k, v)| {
                                k.trim().parse().ok().map(|k| (k, v.trim().to_string()))
                            })
                            .collect(),
                    ),
                    _ => AnswerValue::Text(tail.to_string()),
                };
                Self::Answer {
                    id: arg.to_string(),
                    value,
                }
            }
            "flag" if !arg.is_empty() => Self::Flag(arg.to_string()),
            "goto" => {
                let n: usize = arg.parse().ok()?;
                Self::GoTo(n.checked_sub(1)?)
            }
            "next" => Self::Next,
            "prev" => Self::Prev,
            "write" if !arg.is_empty() => Self::Write {
                key: arg.to_string(),
                text: tail.to_string(),
            },
            "audio-ended" | "audio_ended" => Self::AudioEnded,
            "pause" | "resume" => Self::ToggleTimer,
            "hide" => Self::SetHidden(true),
            "show" => Self::SetHidden(false),
            "security" => Self::Security(SecurityEventKind::from_str(arg)?),
            "finish" => Self::FinishModule,
            "submit" => Self::Submit,
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}

/// 从标准输入读取命令
pub fn spawn_stdin_commands() -> mpsc::Receiver<SessionCommand> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match SessionCommand::parse(&line) {
                Some(cmd) => {
                    if tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                None => warn!("无法识别的命令: {}", line.trim()),
            }
        }
    });
    rx
}

/// 运行结果
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// 依次进入过的模块
    pub visited: Vec<ExamModule>,
    /// 提交结果；被中断时为 None
    pub submission: Option<SubmissionOutcome>,
}

enum ModuleExit {
    Advance(ExamLocation),
    Finished(SubmissionOutcome),
    Interrupted,
}

/// 考试运行器
pub struct ExamRunner {
    config: Config,
    api: Arc<dyn ExamApi>,
    coordinator: ProgressionCoordinator,
    tick_period: Duration,
}

impl ExamRunner {
    pub fn new(config: Config, api: Arc<dyn ExamApi>) -> Self {
        let sync = SyncService::new(api.clone(), config.session_id.clone());
        let coordinator = ProgressionCoordinator::new(&config, api.clone(), sync);
        Self {
            config,
            api,
            coordinator,
            tick_period: Duration::from_secs(1),
        }
    }

    /// 修改计时步长（一次 tick 仍代表一秒考试时间）
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// 运行整场考试，直到提交或命令通道关闭
    pub async fn run(&self, mut commands: mpsc::Receiver<SessionCommand>) -> AppResult<RunReport> {
        let loaded = load_exam(&self.config, self.api.as_ref()).await?;
        self.coordinator
            .sync_service()
            .resume_after(loaded.data.progress_sequence);
        let mut location = ExamLocation::new(self.config.session_id.clone(), self.config.start_module);
        let mut carryover = None;
        let mut visited = Vec::new();

        loop {
            let mut session =
                ExamSession::new(&self.config, location.module, &loaded, carryover.take());
            visited.push(location.module);
            log_module_start(
                location.module.name(),
                session.total_questions(),
                session.time_left(),
            );

            match self.run_module(&mut session, &mut commands).await {
                ModuleExit::Advance(next) => {
                    carryover = Some(session.into_carryover());
                    location = next;
                }
                ModuleExit::Finished(outcome) => {
                    return Ok(RunReport {
                        visited,
                        submission: Some(outcome),
                    })
                }
                ModuleExit::Interrupted => {
                    return Ok(RunReport {
                        visited,
                        submission: None,
                    })
                }
            }
        }
    }

    /// 单个模块的事件循环；返回时本模块的定时器随之销毁
    async fn run_module(
        &self,
        session: &mut ExamSession,
        commands: &mut mpsc::Receiver<SessionCommand>,
    ) -> ModuleExit {
        let sync_period = Duration::from_secs(self.config.sync_interval_secs.max(1));
        let debounce_delay = Duration::from_millis(self.config.writing_debounce_millis);

        let mut clock = interval_at(Instant::now() + self.tick_period, self.tick_period);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut periodic_sync = interval_at(Instant::now() + sync_period, sync_period);
        periodic_sync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let debounce = tokio::time::sleep(debounce_delay);
        tokio::pin!(debounce);
        let mut debounce_armed = false;

        loop {
            tokio::select! {
                _ = clock.tick() => {
                    if session.tick_clock() == ClockTick::Expired {
                        return ModuleExit::Finished(self.coordinator.submit_exam(session).await);
                    }
                    if session.tick_review() {
                        if let Some(exit) = self.finish_module(session).await {
                            return exit;
                        }
                    }
                }
                _ = periodic_sync.tick() => {
                    debug!("{} 定时同步", session.ctx());
                    self.coordinator.spawn_sync(session);
                }
                _ = &mut debounce, if debounce_armed => {
                    debounce_armed = false;
                    if session.take_writing_dirty() {
                        debug!("{} 写作防抖同步", session.ctx());
                        self.coordinator.spawn_sync(session);
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        info!("{} 命令通道已关闭，保存进度后退出", session.ctx());
                        self.coordinator.sync_progress_to_server(session).await;
                        return ModuleExit::Interrupted;
                    };
                    if let SessionCommand::Write { .. } = command {
                        debounce.as_mut().reset(Instant::now() + debounce_delay);
                        debounce_armed = true;
                    }
                    if let Some(exit) = self.handle_command(session, command).await {
                        return exit;
                    }
                }
            }
        }
    }

    async fn finish_module(&self, session: &mut ExamSession) -> Option<ModuleExit> {
        match self.coordinator.finish_module(session).await {
            ModuleTransition::Advanced(next) => Some(ModuleExit::Advance(next)),
            ModuleTransition::Submitted(outcome) => Some(ModuleExit::Finished(outcome)),
            ModuleTransition::AlreadyHandled => None,
        }
    }

    async fn handle_command(
        &self,
        session: &mut ExamSession,
        command: SessionCommand,
    ) -> Option<ModuleExit> {
        // 考试结束后的拒绝已由会话记录日志
        match command {
            SessionCommand::Answer { id, value } => {
                let _ = session.set_answer(&id, value);
            }
            SessionCommand::Flag(id) => {
                let _ = session.toggle_flag(&id);
            }
            SessionCommand::GoTo(index) => {
                let _ = session.go_to_question(index);
            }
            SessionCommand::Next => {
                let _ = session.go_to_next_question();
            }
            SessionCommand::Prev => {
                let _ = session.go_to_prev_question();
            }
            SessionCommand::Write { key, text } => {
                let _ = session.set_writing_response(&key, text);
            }
            SessionCommand::AudioEnded => {
                let _ = session.start_review_phase();
            }
            SessionCommand::ToggleTimer => {
                let _ = session.toggle_timer();
            }
            SessionCommand::SetHidden(hidden) => session.set_hidden(hidden),
            SessionCommand::Security(kind) => {
                warn!("{} 🚨 安全事件: {:?}", session.ctx(), kind);
                if kind.hides_exam() {
                    session.set_hidden(true);
                }
                self.coordinator.sync_service().spawn_security_event(kind);
            }
            SessionCommand::FinishModule => return self.finish_module(session).await,
            SessionCommand::Submit => {
                return Some(ModuleExit::Finished(
                    self.coordinator.submit_exam(session).await,
                ))
            }
            SessionCommand::Status => log_status(session),
            SessionCommand::Quit => {
                self.coordinator.sync_progress_to_server(session).await;
                return Some(ModuleExit::Interrupted);
            }
        }
        None
    }
}

fn log_status(session: &ExamSession) {
    info!(
        "{} ⏱️ {} | 第 {}/{} 题 | 已答 {} | 听力阶段 {:?} (检查剩余 {} 秒){}",
        session.ctx(),
        format_clock(session.time_left()),
        session.current_question_index() + 1,
        session.total_questions(),
        session.answered_count(),
        session.listening_phase(),
        session.review_time_left(),
        if session.is_timer_running() { "" } else { " | 已暂停" }
    );
    for task in session.writing_tasks() {
        info!(
            "  ✍️ {}: {} 词{}",
            task.key,
            session.word_count(&task.key),
            task.min_words
                .map(|m| format!(" / 至少 {}", m))
                .unwrap_or_default()
        );
    }
}
