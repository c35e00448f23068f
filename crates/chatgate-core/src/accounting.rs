use std::sync::Arc;

use chatgate_provider_core::{ChatProvider, ModelDescriptor};

use crate::error::GatewayError;

/// Token counts and cost of one completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// Nano-USD.
    pub cost_nanos: i64,
}

/// `tokens * rate / 1e6` for input plus output, in nano-USD.
pub fn cost_nanos(descriptor: &ModelDescriptor, input_tokens: i64, output_tokens: i64) -> i64 {
    let input = i128::from(input_tokens) * i128::from(descriptor.input_nanos_per_million);
    let output = i128::from(output_tokens) * i128::from(descriptor.output_nanos_per_million);
    let total = (input + output) / 1_000_000;
    i64::try_from(total).unwrap_or(i64::MAX)
}

pub fn compute_usage(
    provider: &dyn ChatProvider,
    descriptor: &ModelDescriptor,
    input_text: &str,
    output_text: &str,
) -> Usage {
    let input_tokens = provider.count_tokens(input_text, &descriptor.id);
    let output_tokens = provider.count_tokens(output_text, &descriptor.id);
    Usage {
        input_tokens,
        output_tokens,
        cost_nanos: cost_nanos(descriptor, input_tokens, output_tokens),
    }
}

/// Tokenizing a long transcript is CPU-bound, so it runs on the blocking pool.
pub async fn measure_usage(
    provider: Arc<dyn ChatProvider>,
    descriptor: ModelDescriptor,
    input_text: String,
    output_text: String,
) -> Result<Usage, GatewayError> {
    tokio::task::spawn_blocking(move || {
        compute_usage(provider.as_ref(), &descriptor, &input_text, &output_text)
    })
    .await
    .map_err(|err| GatewayError::Internal(format!("token counting task failed: {err}")))
}
