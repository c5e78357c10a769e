//! # Exam Session
//!
//! 多模块限时考试（阅读 / 听力 / 写作 / 口语）的会话状态引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 与考试服务端通信，只暴露 `ExamApi`
//! - `ExamClient` - 基于 reqwest 的 HTTP 实现
//! - `InMemoryExamStore` - 内存实现，用于测试和离线演示
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，互相独立
//! - `CatalogNormalizer` - 题目目录规范化（编号、加前缀）
//! - `AnswerStore` - 答案、标记和导航
//! - `ExamClock` / `ListeningPhaseMachine` - 整场计时与听力阶段
//! - `SyncService` - 进度同步与安全事件上报
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个模块"的生命周期
//! - `SessionCtx` - 上下文封装（session_id + module）
//! - `ExamSession` - 会话聚合，考试结束后冻结
//! - `ProgressionCoordinator` - 模块推进与提交
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/exam_runner` - 事件循环，持有会话和全部定时器
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ExamApi, ExamClient, InMemoryExamStore};
pub use config::Config;
pub use error::{AppError, AppResult, SessionError, SessionResult};
pub use models::{AnswerValue, ExamData, ExamLocation, ExamModule, QuestionId, Status};
pub use orchestrator::{ExamRunner, RunReport, SessionCommand};
pub use services::{CatalogNormalizer, QuestionCatalog};
pub use workflow::{ExamSession, ProgressionCoordinator, SessionCtx, SubmissionOutcome};
