//! 会话上下文
//!
//! 封装"我正在进行哪场考试的哪个模块"这一信息，主要用于日志前缀

use std::fmt::Display;

use crate::models::ExamModule;

/// 会话上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCtx {
    /// 考试会话ID
    pub session_id: String,

    /// 当前模块
    pub module: ExamModule,
}

impl SessionCtx {
    pub fn new(session_id: impl Into<String>, module: ExamModule) -> Self {
        Self {
            session_id: session_id.into(),
            module,
        }
    }
}

impl Display for SessionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[会话 {} 模块 {}]", self.session_id, self.module)
    }
}
