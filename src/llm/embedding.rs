//! 文本嵌入：职位推荐用的向量化
//!
//! - OpenAiEmbedder：调用 OpenAI 兼容的 /embeddings 端点（批量输入）
//! - HashingEmbedder：本地特征哈希（无网络、确定性），未配置 API Key 时的默认实现

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::RecommendSection;

/// 嵌入提供方
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 将文本编码为向量；失败时返回错误字符串
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;

    /// 批量编码，输出与输入一一对应
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// 余弦相似度；长度不一致或存在零向量时为 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// 特征哈希嵌入：小写 token 按哈希落桶，哈希最高位决定符号，结果做 L2 归一化
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMS: usize = 256;

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(8) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dims as u64) as usize;
            v[idx] += if h >> 63 == 1 { -1.0 } else { 1.0 };
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMS)
    }
}

/// 字母数字 token；保留 `+` `#` 以区分 C++ / C#
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(self.vectorize(text))
    }
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        Ok(vectors.pop().unwrap_or_default())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(format!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                data.len()
            ));
        }
        data.sort_by_key(|e| e.index);
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

/// 按 [recommend] 段创建嵌入提供方；openai 缺少 API Key 或 provider 未知时回退到 hashing
pub fn create_embedder_from_config(cfg: &RecommendSection) -> Arc<dyn EmbeddingProvider> {
    match cfg.provider.as_str() {
        "openai" => {
            let key = cfg
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .filter(|k| !k.trim().is_empty());
            match key {
                Some(key) => Arc::new(OpenAiEmbedder::new(
                    cfg.base_url.as_deref(),
                    &cfg.model,
                    &key,
                )),
                None => {
                    tracing::warn!("embedding provider openai has no OPENAI_API_KEY; using hashing");
                    Arc::new(HashingEmbedder::new(cfg.dims))
                }
            }
        }
        "hashing" => Arc::new(HashingEmbedder::new(cfg.dims)),
        other => {
            tracing::warn!(provider = other, "unknown embedding provider; using hashing");
            Arc::new(HashingEmbedder::new(cfg.dims))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_edges() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hashing_is_case_insensitive_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed("Backend Engineer Python SQL").await.unwrap();
        let b = e.embed("python, sql; BACKEND engineer").await.unwrap();
        assert_eq!(a.len(), HashingEmbedder::DEFAULT_DIMS);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let e = HashingEmbedder::new(16);
        let v = e.embed("  ,, ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
        let batch = e.embed_batch(&["C++".to_string(), "C#".to_string()]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|v| v.iter().any(|x| *x != 0.0)));
    }

    #[test]
    fn test_config_falls_back_to_hashing() {
        let cfg = RecommendSection {
            provider: "word2vec".into(),
            ..RecommendSection::default()
        };
        assert_eq!(create_embedder_from_config(&cfg).name(), "hashing");
        let cfg = RecommendSection {
            provider: "openai".into(),
            api_key: Some("sk-test".into()),
            ..RecommendSection::default()
        };
        assert_eq!(create_embedder_from_config(&cfg).name(), "openai");
    }
}
