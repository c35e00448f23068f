use std::collections::HashMap;

use chatgate_protocol::chat::ModelInfo;

use crate::family::ProviderFamily;

/// Nano-USD in one USD.
pub const NANOS_PER_USD: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    Standard,
    Premium,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
    pub family: ProviderFamily,
    pub tier: ModelTier,
    /// Who trained the model; informational only.
    pub vendor: String,
    /// Nano-USD per one million input tokens.
    pub input_nanos_per_million: i64,
    /// Nano-USD per one million output tokens.
    pub output_nanos_per_million: i64,
}

impl ModelDescriptor {
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            id: self.id.clone(),
            family: self.family.as_str().to_string(),
            vendor: self.vendor.clone(),
            premium: self.tier == ModelTier::Premium,
            input_cost_per_million: nanos_to_usd(self.input_nanos_per_million),
            output_cost_per_million: nanos_to_usd(self.output_nanos_per_million),
        }
    }
}

pub fn nanos_to_usd(nanos: i64) -> f64 {
    nanos as f64 / NANOS_PER_USD as f64
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model: {0}")]
pub struct UnknownModel(pub String);

/// Immutable model catalog keyed by model id.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        let mut registry = Self::default();
        for model in models {
            match registry.index.get(&model.id) {
                Some(&slot) => registry.models[slot] = model,
                None => {
                    registry.index.insert(model.id.clone(), registry.models.len());
                    registry.models.push(model);
                }
            }
        }
        registry
    }

    pub fn builtin() -> Self {
        use ModelTier::{Premium, Standard};
        use ProviderFamily::*;

        // (id, family, tier, vendor, input cents/M, output cents/M)
        let table: &[(&str, ProviderFamily, ModelTier, &str, i64, i64)] = &[
            ("gpt-3.5-turbo", OpenAI, Standard, "OpenAI", 50, 150),
            ("gpt-4-turbo-preview", OpenAI, Premium, "OpenAI", 1000, 3000),
            ("gpt-4o-mini", OpenAI, Standard, "OpenAI", 15, 60),
            ("gpt-4o", OpenAI, Premium, "OpenAI", 500, 1500),
            ("claude-3-opus-20240229", Anthropic, Premium, "Anthropic", 1500, 7500),
            ("claude-3-sonnet-20240229", Anthropic, Premium, "Anthropic", 300, 1500),
            ("claude-3-haiku-20240307", Anthropic, Standard, "Anthropic", 25, 125),
            ("claude-3-5-sonnet-20240620", Anthropic, Premium, "Anthropic", 300, 1500),
            ("mistral-tiny-2312", Mistral, Standard, "Mistral", 25, 25),
            ("mistral-small-2312", Mistral, Standard, "Mistral", 70, 70),
            ("mistral-small-2402", Mistral, Standard, "Mistral", 100, 300),
            ("mistral-medium-2312", Mistral, Premium, "Mistral", 270, 810),
            ("mistral-large-2402", Mistral, Premium, "Mistral", 400, 1200),
            ("gemini-1.0-pro", Google, Standard, "Google", 50, 150),
            ("gemini-1.5-flash-latest", Google, Standard, "Google", 35, 105),
            ("gemini-1.5-pro-latest", Google, Premium, "Google", 350, 1050),
            ("llama-3-sonar-small-32k-online", Perplexity, Standard, "Perplexity", 20, 20),
            ("llama-3-sonar-small-32k-chat", Perplexity, Premium, "Perplexity", 20, 20),
            ("llama-3-sonar-large-32k-online", Perplexity, Standard, "Perplexity", 100, 100),
            ("llama-3-sonar-large-32k-chat", Perplexity, Premium, "Perplexity", 100, 100),
            ("llama-3.1-sonar-small-128k-online", Perplexity, Premium, "Perplexity", 20, 20),
            ("llama-3.1-sonar-small-128k-chat", Perplexity, Premium, "Perplexity", 20, 20),
            ("llama-3.1-sonar-large-128k-online", Perplexity, Premium, "Perplexity", 100, 100),
            ("llama-3.1-sonar-large-128k-chat", Perplexity, Premium, "Perplexity", 100, 100),
            ("codellama/CodeLlama-34b-Instruct-hf", Together, Standard, "Meta", 78, 78),
            ("codellama/CodeLlama-70b-Instruct-hf", Together, Premium, "Meta", 90, 90),
            ("meta-llama/Llama-2-13b-chat-hf", Together, Standard, "Meta", 22, 22),
            ("meta-llama/Llama-2-70b-chat-hf", Together, Premium, "Meta", 90, 90),
            ("meta-llama/Llama-3-8b-chat-hf", Together, Standard, "Meta", 20, 20),
            ("meta-llama/Llama-3-70b-chat-hf", Together, Premium, "Meta", 90, 90),
            ("meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo", Together, Premium, "Meta", 70, 80),
            ("meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo", Together, Premium, "Meta", 70, 80),
            ("meta-llama/Meta-Llama-3.1-405B-Instruct-Turbo", Together, Premium, "Meta", 70, 80),
            ("google/gemma-2b-it", Together, Standard, "Google", 10, 10),
            ("google/gemma-7b-it", Together, Standard, "Google", 20, 20),
        ];

        const NANOS_PER_CENT: i64 = NANOS_PER_USD / 100;
        Self::new(
            table
                .iter()
                .map(|(id, family, tier, vendor, input, output)| ModelDescriptor {
                    id: (*id).to_string(),
                    family: *family,
                    tier: *tier,
                    vendor: (*vendor).to_string(),
                    input_nanos_per_million: input * NANOS_PER_CENT,
                    output_nanos_per_million: output * NANOS_PER_CENT,
                })
                .collect(),
        )
    }

    pub fn describe(&self, model_id: &str) -> Result<&ModelDescriptor, UnknownModel> {
        self.index
            .get(model_id)
            .map(|slot| &self.models[*slot])
            .ok_or_else(|| UnknownModel(model_id.to_string()))
    }

    /// All descriptors in catalog order.
    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
