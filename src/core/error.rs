//! Agent 错误类型、恢复动作与对外错误码
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt / Abort。
//! ErrorCode 是 AgentResponse::Failed 中对调用方稳定的错误码。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::StorageError;

/// 编排循环内部可能出现的错误（参数、存储、工具、决策、注册表等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 决策协作者（LLM 或脚本策略）在超时内未返回
    #[error("Decision timeout after {0}s")]
    DecisionTimeout(u64),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// 决策输出无法解析（如 JSON 格式错误）
    #[error("Decision failed: {0}")]
    DecisionFailed(String),

    /// 工具注册表不可用（重名、空注册表、schema 非法），属于不可恢复错误
    #[error("Tool registry error: {0}")]
    Registry(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 映射为对外错误码
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AgentError::InvalidArgument(_) => ErrorCode::InvalidInputFormat,
            AgentError::Storage(_) => ErrorCode::DatabaseQueryFailed,
            AgentError::UnknownTool(_) => ErrorCode::InvalidInputFormat,
            _ => ErrorCode::ToolExecutionError,
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 将提示注入下一轮 Thinking，让决策协作者重试
    RetryWithPrompt(String),
    /// 终止当前请求
    Abort,
}

/// AgentResponse::Failed 的错误码（序列化为 SCREAMING_SNAKE_CASE）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoDataFound,
    DatabaseQueryFailed,
    ToolExecutionError,
    InvalidInputFormat,
    ProtocolViolation,
    NoSupportingData,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoDataFound => "NO_DATA_FOUND",
            ErrorCode::DatabaseQueryFailed => "DATABASE_QUERY_FAILED",
            ErrorCode::ToolExecutionError => "TOOL_EXECUTION_ERROR",
            ErrorCode::InvalidInputFormat => "INVALID_INPUT_FORMAT",
            ErrorCode::ProtocolViolation => "PROTOCOL_VIOLATION",
            ErrorCode::NoSupportingData => "NO_SUPPORTING_DATA",
        }
    }

    /// 宽松解析（忽略大小写与首尾空白），未知值返回 None
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace('-', "_");
        [
            ErrorCode::NoDataFound,
            ErrorCode::DatabaseQueryFailed,
            ErrorCode::ToolExecutionError,
            ErrorCode::InvalidInputFormat,
            ErrorCode::ProtocolViolation,
            ErrorCode::NoSupportingData,
        ]
        .into_iter()
        .find(|code| code.as_str() == normalized)
    }

    /// 默认建议（Failed 响应的 suggestion 永不为空）
    pub fn default_suggestion(&self) -> &'static str {
        match self {
            ErrorCode::NoDataFound => {
                "Try a broader time window (e.g. \"all\" or \"1y\") or check the spelling of the skill or role names."
            }
            ErrorCode::DatabaseQueryFailed => {
                "The job-market database is unavailable right now. Please try again in a few minutes."
            }
            ErrorCode::ToolExecutionError => {
                "Rephrase the request or narrow it to specific skills or roles and try again."
            }
            ErrorCode::InvalidInputFormat => {
                "Check the request format: provide skill or role names and an optional window such as \"3m\" or \"2024-01-01 to 2024-06-30\"."
            }
            ErrorCode::ProtocolViolation => {
                "The agent produced an invalid final status. Retry the request."
            }
            ErrorCode::NoSupportingData => {
                "No analysis backed this answer. Ask about specific skills or roles so the data can be queried."
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_parse_is_lenient() {
        assert_eq!(ErrorCode::parse(" no_data_found "), Some(ErrorCode::NoDataFound));
        assert_eq!(ErrorCode::parse("DATABASE-QUERY-FAILED"), Some(ErrorCode::DatabaseQueryFailed));
        assert_eq!(ErrorCode::parse("AI_PROCESSING_ERROR"), None);
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::NoSupportingData).unwrap();
        assert_eq!(json, "\"NO_SUPPORTING_DATA\"");
    }

    #[test]
    fn test_every_code_has_suggestion() {
        for code in [
            ErrorCode::NoDataFound,
            ErrorCode::DatabaseQueryFailed,
            ErrorCode::ToolExecutionError,
            ErrorCode::InvalidInputFormat,
            ErrorCode::ProtocolViolation,
            ErrorCode::NoSupportingData,
        ] {
            assert!(!code.default_suggestion().is_empty());
        }
    }

    #[test]
    fn test_storage_error_maps_to_database_code() {
        let err = AgentError::from(StorageError::Timeout("statement timeout".into()));
        assert_eq!(err.error_code(), ErrorCode::DatabaseQueryFailed);
    }
}
