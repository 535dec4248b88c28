//! 对外协议：最终响应与任务信封

pub mod response;
pub mod task;

pub use response::{
    AgentResponse, Analysis, CompletedPayload, FailedPayload, InputRequiredPayload, Intelligence,
    RequiredField, ResponseProtocol,
};
pub use task::{AgentTask, TaskMessage, TaskOutput, ValidatedTask};
