use serde::{Deserialize, Serialize};

/// 考试模块枚举（固定顺序：阅读 → 听力 → 写作 → 口语）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamModule {
    /// 阅读
    Reading,
    /// 听力
    Listening,
    /// 写作
    Writing,
    /// 口语
    Speaking,
}

impl ExamModule {
    /// 模块固定顺序
    pub const ORDER: [ExamModule; 4] = [
        ExamModule::Reading,
        ExamModule::Listening,
        ExamModule::Writing,
        ExamModule::Speaking,
    ];

    /// 获取模块键名（用于题目ID前缀和嵌套答案的键）
    pub fn key(self) -> &'static str {
        match self {
            ExamModule::Reading => "reading",
            ExamModule::Listening => "listening",
            ExamModule::Writing => "writing",
            ExamModule::Speaking => "speaking",
        }
    }

    /// 获取中文名称
    pub fn name(self) -> &'static str {
        match self {
            ExamModule::Reading => "阅读",
            ExamModule::Listening => "听力",
            ExamModule::Writing => "写作",
            ExamModule::Speaking => "口语",
        }
    }

    /// 从键名解析模块（忽略大小写和首尾空白）
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reading" => Some(ExamModule::Reading),
            "listening" => Some(ExamModule::Listening),
            "writing" => Some(ExamModule::Writing),
            "speaking" => Some(ExamModule::Speaking),
            _ => None,
        }
    }

    /// 固定顺序中的下一个模块，最后一个模块返回 None
    pub fn next(self) -> Option<Self> {
        let pos = Self::ORDER.iter().position(|m| *m == self)?;
        Self::ORDER.get(pos + 1).copied()
    }

    /// 是否为最后一个模块
    pub fn is_last(self) -> bool {
        self.next().is_none()
    }

    /// 是否带有可编号的题目目录（阅读、听力）
    pub fn has_question_catalog(self) -> bool {
        matches!(self, ExamModule::Reading | ExamModule::Listening)
    }
}

impl std::fmt::Display for ExamModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// 客户端可寻址位置：`/exam/{session_id}?module={module}`
///
/// 进入下一个模块就是改写这里的模块选择器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamLocation {
    pub session_id: String,
    pub module: ExamModule,
}

impl ExamLocation {
    pub fn new(session_id: impl Into<String>, module: ExamModule) -> Self {
        Self {
            session_id: session_id.into(),
            module,
        }
    }

    /// 改写模块选择器
    pub fn with_module(&self, module: ExamModule) -> Self {
        Self {
            session_id: self.session_id.clone(),
            module,
        }
    }

    /// 渲染为路径
    pub fn to_path(&self) -> String {
        format!("/exam/{}?module={}", self.session_id, self.module)
    }
}

impl std::fmt::Display for ExamLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_order() {
        assert_eq!(ExamModule::Reading.next(), Some(ExamModule::Listening));
        assert_eq!(ExamModule::Listening.next(), Some(ExamModule::Writing));
        assert_eq!(ExamModule::Writing.next(), Some(ExamModule::Speaking));
        assert_eq!(ExamModule::Speaking.next(), None);
        assert!(ExamModule::Speaking.is_last());
    }

    #[test]
    fn test_from_str() {
        assert_eq!(ExamModule::from_str(" Listening "), Some(ExamModule::Listening));
        assert_eq!(ExamModule::from_str("maths"), None);
    }

    #[test]
    fn test_location_rewrites_module() {
        let loc = ExamLocation::new("s1", ExamModule::Listening);
        assert_eq!(loc.to_path(), "/exam/s1?module=listening");
        assert_eq!(
            loc.with_module(ExamModule::Writing).to_path(),
            "/exam/s1?module=writing"
        );
    }
}
