//! 核心层：错误与恢复、循环状态、工具并发调度、文本截断

pub mod error;
pub mod recovery;
pub mod state;
pub mod task_scheduler;
pub mod text;

pub use error::{AgentError, ErrorCode, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use state::{LoopPhase, LoopState, ToolCall, TranscriptEntry};
pub use task_scheduler::TaskScheduler;
pub use text::preview;
