//! 任务信封：调用方提交的 AgentTask 与返回的 TaskOutput

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{AgentError, TranscriptEntry};
use crate::llm::{Message, Role};
use crate::protocol::AgentResponse;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<TaskMessage>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 校验后的任务：最后一条 user 消息为请求，之前的消息作为先前上下文
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedTask {
    pub session_id: String,
    pub query: String,
    pub prior_context: Vec<Message>,
}

impl AgentTask {
    /// 单条用户消息的任务
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            session_id: None,
            messages: vec![TaskMessage {
                role: "user".to_string(),
                content: query.into(),
            }],
            metadata: Map::new(),
        }
    }

    pub fn validate(&self) -> Result<ValidatedTask, AgentError> {
        if self.messages.is_empty() {
            return Err(AgentError::InvalidArgument(
                "task must contain at least one message".to_string(),
            ));
        }

        let mut messages = Vec::with_capacity(self.messages.len());
        for (i, m) in self.messages.iter().enumerate() {
            let role = Role::parse(&m.role).ok_or_else(|| {
                AgentError::InvalidArgument(format!("messages[{i}]: unknown role \"{}\"", m.role))
            })?;
            // model 与 assistant 等价
            let role = if role == Role::Model { Role::Assistant } else { role };
            messages.push(Message {
                role,
                content: m.content.clone(),
            });
        }

        let query_index = messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .ok_or_else(|| AgentError::InvalidArgument("task has no user message".to_string()))?;
        let query = messages[query_index].content.trim().to_string();
        if query.is_empty() {
            return Err(AgentError::InvalidArgument("user query must not be empty".to_string()));
        }
        messages.truncate(query_index);

        Ok(ValidatedTask {
            session_id: self
                .session_id
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            query,
            prior_context: messages,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskOutput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub session_id: String,
    /// 与 final_response 的 status 一致
    pub state: String,
    pub process_sequence: Vec<TranscriptEntry>,
    pub final_response: AgentResponse,
    pub metadata: Map<String, Value>,
}

impl TaskOutput {
    pub fn new(
        session_id: String,
        start_time: DateTime<Utc>,
        process_sequence: Vec<TranscriptEntry>,
        final_response: AgentResponse,
        mut metadata: Map<String, Value>,
    ) -> Self {
        let end_time = Utc::now();
        let elapsed = (end_time - start_time).num_milliseconds().max(0) as f64 / 1000.0;
        metadata.insert("execution_time_seconds".to_string(), Value::from(elapsed));
        Self {
            start_time,
            end_time,
            session_id,
            state: final_response.status().to_string(),
            process_sequence,
            final_response,
            metadata,
        }
    }
}
