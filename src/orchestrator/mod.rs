//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责事件循环和生命周期，是整个系统的"指挥中心"。
//!
//! ### `exam_runner` - 考试运行器
//! - 加载考试数据（服务端 / 本地文件 / 离线降级）
//! - 持有会话和全部定时器（整场计时、检查阶段、定时同步、写作防抖）
//! - 接收外部命令并转交给会话
//! - 模块结束后销毁定时器，用交接状态进入下一个模块
//!
//! ## 层次关系
//!
//! ```text
//! exam_runner (事件循环，持有 ExamSession)
//!     ↓
//! workflow::ProgressionCoordinator (模块结束 / 提交)
//!     ↓
//! services (能力层：目录规范化 / 答案存储 / 计时 / 同步)
//!     ↓
//! clients (ExamApi：HTTP / 内存)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一所有者**：只有运行器持有会话，其他层只借用
//! 2. **向下依赖**：编排层 → workflow → services → clients
//! 3. **无业务逻辑**：只做调度，不做具体业务判断

pub mod exam_runner;

pub use exam_runner::{spawn_stdin_commands, ExamRunner, RunReport, SessionCommand};
