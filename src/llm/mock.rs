//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置回复；脚本用完后返回错误。记录最近一次收到的消息，便于断言 prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    last_prompt: Mutex<Vec<Message>>,
}

impl MockLlmClient {
    pub fn scripted<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last_prompt: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Vec<Message> {
        self.last_prompt
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = messages.to_vec();
        }
        self.replies
            .lock()
            .map_err(|_| "mock script poisoned".to_string())?
            .pop_front()
            .ok_or_else(|| "mock script exhausted".to_string())
    }
}
