use crate::error::{AppResult, FixtureError};
use crate::models::exam::{ExamData, ExamResponse};
use std::path::Path;
use tokio::fs;

/// 从本地文件加载考试数据（离线调试用）
///
/// 支持 `.toml` 和 `.json`；文件既可以是 `{ examData: {...} }` 外壳，也可以直接是考试数据。
pub async fn load_exam_fixture(path: &Path) -> AppResult<ExamData> {
    let path_str = path.display().to_string();
    if !path.exists() {
        return Err(FixtureError::NotFound { path: path_str }.into());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|source| FixtureError::ReadFailed {
            path: path_str.clone(),
            source,
        })?;

    let value: serde_json::Value = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| FixtureError::ParseFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?,
        _ => serde_json::from_str(&content).map_err(|e| FixtureError::ParseFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?,
    };

    let data = if value.get("examData").is_some() {
        serde_json::from_value::<ExamResponse>(value).map(|r| r.exam_data)
    } else {
        serde_json::from_value::<ExamData>(value)
    }
    .map_err(|e| FixtureError::ParseFailed {
        path: path_str.clone(),
        reason: e.to_string(),
    })?;

    tracing::info!("✓ 已从本地文件加载考试数据: {}", path_str);
    Ok(data)
}
