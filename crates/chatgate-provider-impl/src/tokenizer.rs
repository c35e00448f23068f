use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use chatgate_common::TokenizerConfig;
use chatgate_provider_core::ProviderFamily;

use crate::client::UpstreamClient;

const DEFAULT_HF_URL: &str = "https://huggingface.co";

#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("reference encoding unavailable: {0}")]
    Reference(String),
}

#[derive(Clone)]
pub enum TokenCounter {
    Bpe(Arc<CoreBPE>),
    HuggingFace(Arc<Tokenizer>),
}

impl TokenCounter {
    pub fn count(&self, text: &str) -> i64 {
        match self {
            TokenCounter::Bpe(bpe) => bpe.encode_ordinary(text).len() as i64,
            TokenCounter::HuggingFace(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.get_ids().len() as i64,
                // Only pathological input fails; approximate rather than abort accounting.
                Err(_) => text.split_whitespace().count() as i64,
            },
        }
    }
}

/// Token counters for every provider family.
pub struct TokenizerSet {
    reference: TokenCounter,
    anthropic: TokenCounter,
    google: TokenCounter,
    openai_by_model: Mutex<HashMap<String, TokenCounter>>,
}

impl TokenizerSet {
    /// Uses the reference encoding for every non-OpenAI family.
    pub fn reference_only() -> Result<Self, TokenizerError> {
        let reference = TokenCounter::Bpe(Arc::new(
            cl100k_base().map_err(|err| TokenizerError::Reference(err.to_string()))?,
        ));
        Ok(Self {
            anthropic: reference.clone(),
            google: reference.clone(),
            reference,
            openai_by_model: Mutex::new(HashMap::new()),
        })
    }

    /// Loads HuggingFace tokenizers for Anthropic and Google from the data dir
    /// cache, downloading them on first use. Any miss falls back to the
    /// reference encoding.
    pub async fn load(
        config: &TokenizerConfig,
        data_dir: &str,
        client: &UpstreamClient,
    ) -> Result<Self, TokenizerError> {
        let mut set = Self::reference_only()?;
        if let Some(repo) = config.anthropic_repo.as_deref() {
            if let Some(tokenizer) = load_hf_tokenizer(repo, config, data_dir, client).await {
                set.anthropic = tokenizer;
            }
        }
        if let Some(repo) = config.google_repo.as_deref() {
            if let Some(tokenizer) = load_hf_tokenizer(repo, config, data_dir, client).await {
                set.google = tokenizer;
            }
        }
        Ok(set)
    }

    pub fn count(&self, family: ProviderFamily, model: &str, text: &str) -> i64 {
        match family {
            ProviderFamily::OpenAI => self.openai_counter(model).count(text),
            ProviderFamily::Anthropic => self.anthropic.count(text),
            ProviderFamily::Google => self.google.count(text),
            ProviderFamily::Mistral | ProviderFamily::Together | ProviderFamily::Perplexity => {
                self.reference.count(text)
            }
        }
    }

    fn openai_counter(&self, model: &str) -> TokenCounter {
        if let Ok(cache) = self.openai_by_model.lock()
            && let Some(counter) = cache.get(model)
        {
            return counter.clone();
        }
        // Building a BPE takes a while; other models must not wait on it.
        let counter = match get_bpe_from_model(model).or_else(|_| o200k_base()) {
            Ok(bpe) => TokenCounter::Bpe(Arc::new(bpe)),
            Err(_) => self.reference.clone(),
        };
        if let Ok(mut cache) = self.openai_by_model.lock() {
            return cache.entry(model.to_string()).or_insert(counter).clone();
        }
        counter
    }
}

async fn load_hf_tokenizer(
    repo: &str,
    config: &TokenizerConfig,
    data_dir: &str,
    client: &UpstreamClient,
) -> Option<TokenCounter> {
    let path = tokenizer_path(repo, data_dir);
    if let Ok(bytes) = tokio::fs::read(&path).await
        && let Ok(tokenizer) = Tokenizer::from_bytes(bytes.as_slice())
    {
        return Some(TokenCounter::HuggingFace(Arc::new(tokenizer)));
    }

    let base = config
        .hf_url
        .as_deref()
        .map(|value| value.trim_end_matches('/'))
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_HF_URL);
    let url = format!("{base}/{repo}/resolve/main/tokenizer.json");
    let bytes = match client.get_bytes(&url, config.hf_token.as_deref()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(event = "tokenizer_download_failed", repo = %repo, error = %err);
            return None;
        }
    };
    let tokenizer = match Tokenizer::from_bytes(bytes.as_ref()) {
        Ok(tokenizer) => tokenizer,
        Err(err) => {
            warn!(event = "tokenizer_invalid", repo = %repo, error = %err);
            return None;
        }
    };
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    if let Err(err) = tokio::fs::write(&path, bytes.as_ref()).await {
        warn!(event = "tokenizer_cache_write_failed", path = %path.display(), error = %err);
    }
    info!(event = "tokenizer_loaded", repo = %repo);
    Some(TokenCounter::HuggingFace(Arc::new(tokenizer)))
}

fn tokenizer_path(repo: &str, data_dir: &str) -> PathBuf {
    let base = Some(data_dir.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or("./data");
    Path::new(base)
        .join("cache")
        .join("tokenizers")
        .join(sanitize_repo_name(repo))
        .join("tokenizer.json")
}

fn sanitize_repo_name(repo: &str) -> String {
    repo.chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => ch,
            _ => '_',
        })
        .collect()
}
