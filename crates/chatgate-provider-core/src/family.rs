use serde::{Deserialize, Serialize};

/// Upstream backends that share one adapter implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    OpenAI,
    Anthropic,
    Mistral,
    Google,
    /// Open-weight models (Llama, CodeLlama, Gemma) served by Together.
    Together,
    Perplexity,
}

impl ProviderFamily {
    pub const ALL: [ProviderFamily; 6] = [
        ProviderFamily::OpenAI,
        ProviderFamily::Anthropic,
        ProviderFamily::Mistral,
        ProviderFamily::Google,
        ProviderFamily::Together,
        ProviderFamily::Perplexity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderFamily::OpenAI => "openai",
            ProviderFamily::Anthropic => "anthropic",
            ProviderFamily::Mistral => "mistral",
            ProviderFamily::Google => "google",
            ProviderFamily::Together => "together",
            ProviderFamily::Perplexity => "perplexity",
        }
    }

    /// Inclusive temperature range the family's API accepts.
    pub fn temperature_range(&self) -> (f64, f64) {
        match self {
            ProviderFamily::OpenAI | ProviderFamily::Google | ProviderFamily::Together => {
                (0.0, 2.0)
            }
            ProviderFamily::Anthropic | ProviderFamily::Mistral => (0.0, 1.0),
            // Perplexity rejects exactly 2.0.
            ProviderFamily::Perplexity => (0.0, 1.99),
        }
    }

    /// Clamps into [`Self::temperature_range`]. `None` for NaN or negative input.
    pub fn clamp_temperature(&self, temperature: f64) -> Option<f64> {
        if !temperature.is_finite() || temperature < 0.0 {
            return None;
        }
        let (low, high) = self.temperature_range();
        Some(temperature.clamp(low, high))
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
