//! LLM 层：消息类型、客户端抽象与 Mock 实现、文本嵌入

pub mod embedding;
pub mod message;
pub mod mock;
pub mod traits;

pub use embedding::{
    cosine_similarity, create_embedder_from_config, EmbeddingProvider, HashingEmbedder,
    OpenAiEmbedder,
};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use traits::LlmClient;
