use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use chatgate_protocol::chat::{
    ChatRequest, ExchangeEntryView, ExchangeSummary, ModelInfo, StreamEvent, UsageStats,
};
use chatgate_provider_core::{
    ChatProvider, CompletionRequest, ModelDescriptor, ModelRegistry, PromptMessage,
    ProviderError, ProviderSet, assemble_messages, nanos_to_usd, render_transcript,
};
use chatgate_storage::{HistoryStore, NewEntry, QuotaLedger, StorageError};

use crate::accounting::{Usage, measure_usage};
use crate::error::GatewayError;
use crate::locks::ExchangeLocks;

pub const TITLE_MODEL: &str = "gpt-4o-mini";
const TITLE_INSTRUCTION: &str = "Generate a concise and relevant 5-word title for the above chat based on the main topic discussed. Do not include any creative or ambiguous terms.";
pub const MAX_PAGE_SIZE: u64 = 100;
const EVENT_BUFFER: usize = 32;

pub type ChatEventStream = ReceiverStream<StreamEvent>;

/// Metered streaming gateway: quota reservation, upstream streaming,
/// accounting and exactly-once finalize.
pub struct ChatGateway {
    registry: Arc<ModelRegistry>,
    providers: ProviderSet,
    quota: Arc<dyn QuotaLedger>,
    history: Arc<dyn HistoryStore>,
    locks: ExchangeLocks,
}

impl ChatGateway {
    pub fn new(
        registry: Arc<ModelRegistry>,
        providers: ProviderSet,
        quota: Arc<dyn QuotaLedger>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            registry,
            providers,
            quota,
            history,
            locks: ExchangeLocks::new(),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Validates, reserves one generation and spawns the exchange task.
    /// Every error returned here happens before any provider call.
    pub async fn open_stream(
        &self,
        user_id: &str,
        request: ChatRequest,
    ) -> Result<ChatEventStream, GatewayError> {
        let descriptor = self.registry.describe(&request.model)?.clone();
        let temperature = descriptor
            .family
            .clamp_temperature(request.temperature)
            .ok_or_else(|| {
                GatewayError::BadRequest("temperature must be a non-negative number".to_string())
            })?;
        if request.user_input.trim().is_empty() {
            return Err(GatewayError::BadRequest("user_input must not be empty".to_string()));
        }
        let provider = self.providers.adapter(descriptor.family).clone();

        if let Some(exchange_id) = request.exchange_id.as_deref()
            && let Some(owner) = self.history.exchange_owner(exchange_id).await?
            && owner != user_id
        {
            return Err(GatewayError::Forbidden);
        }

        if self.quota.remaining(user_id).await? <= 0 {
            return Err(GatewayError::QuotaExceeded);
        }
        if !self.quota.decrement_one(user_id).await? {
            return Err(GatewayError::QuotaExceeded);
        }

        let exchange_id = request
            .exchange_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let messages = assemble_messages(&request.history, &request.user_input);
        info!(
            event = "chat_received",
            user_id = %user_id,
            exchange_id = %exchange_id,
            model = %descriptor.id,
            family = %descriptor.family,
            history_turns = request.history.len(),
            regenerate = request.regenerate
        );

        let run = ExchangeRun {
            user_id: user_id.to_string(),
            exchange_id,
            descriptor,
            provider,
            messages,
            temperature,
            user_input: request.user_input,
            regenerate: request.regenerate,
            quota: self.quota.clone(),
            history: self.history.clone(),
            locks: self.locks.clone(),
        };
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(run.drive(tx));
        Ok(ReceiverStream::new(rx))
    }

    /// Single-shot title for a conversation. Reads quota but never consumes it.
    pub async fn generate_title(
        &self,
        user_id: &str,
        request: ChatRequest,
    ) -> Result<String, GatewayError> {
        if let Some(exchange_id) = request.exchange_id.as_deref() {
            match self.history.exchange_owner(exchange_id).await? {
                None => return Err(GatewayError::NotFound("exchange")),
                Some(owner) if owner != user_id => return Err(GatewayError::Forbidden),
                Some(_) => {}
            }
        }
        if self.quota.remaining(user_id).await? <= 0 {
            return Err(GatewayError::QuotaExceeded);
        }

        let descriptor = self.registry.describe(TITLE_MODEL)?;
        let temperature = descriptor
            .family
            .clamp_temperature(request.temperature)
            .ok_or_else(|| {
                GatewayError::BadRequest("temperature must be a non-negative number".to_string())
            })?;
        let messages = assemble_messages(&request.history, TITLE_INSTRUCTION);
        let raw = self
            .providers
            .adapter(descriptor.family)
            .complete(CompletionRequest {
                model: descriptor.id.clone(),
                messages,
                temperature,
            })
            .await?;
        let title = clean_title(&raw);

        if let Some(exchange_id) = request.exchange_id.as_deref() {
            self.history.set_title(exchange_id, user_id, &title).await?;
        }
        Ok(title)
    }

    pub async fn generations(&self, user_id: &str) -> Result<i64, GatewayError> {
        Ok(self.quota.remaining(user_id).await?)
    }

    pub async fn history(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
    ) -> Result<Vec<ExchangeSummary>, GatewayError> {
        if page == 0 {
            return Err(GatewayError::BadRequest("page starts at 1".to_string()));
        }
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(GatewayError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        let rows = self.history.list_exchanges(user_id, page, limit).await?;
        Ok(rows
            .into_iter()
            .map(|row| ExchangeSummary {
                chat_id: row.id,
                chat_title: row.title,
                chat_model: Some(row.model),
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    pub async fn exchange(
        &self,
        user_id: &str,
        exchange_id: &str,
    ) -> Result<Vec<ExchangeEntryView>, GatewayError> {
        let entries = self.history.entries(exchange_id, user_id).await?;
        Ok(entries
            .into_iter()
            .map(|entry| ExchangeEntryView {
                user_message: entry.user_message,
                ai_message: entry.ai_message,
                created_at: entry.created_at,
                updated_at: entry.created_at,
                regenerate_message: entry.regenerate,
                model: entry.model,
                stats: UsageStats {
                    input_token_length: entry.input_tokens,
                    output_token_length: entry.output_tokens,
                    cost: nanos_to_usd(entry.cost_nanos),
                },
            })
            .collect())
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.registry.list().iter().map(ModelDescriptor::info).collect()
    }
}

fn clean_title(raw: &str) -> String {
    raw.replace(['"', '/'], "").trim().to_string()
}

enum StreamOutcome {
    Completed(String),
    Failed(ProviderError),
    Cancelled,
}

/// One accepted chat request, owned by its spawned task.
struct ExchangeRun {
    user_id: String,
    exchange_id: String,
    descriptor: ModelDescriptor,
    provider: Arc<dyn ChatProvider>,
    messages: Vec<PromptMessage>,
    temperature: f64,
    user_input: String,
    regenerate: bool,
    quota: Arc<dyn QuotaLedger>,
    history: Arc<dyn HistoryStore>,
    locks: ExchangeLocks,
}

impl ExchangeRun {
    async fn drive(self, tx: mpsc::Sender<StreamEvent>) {
        let started_at = Instant::now();
        let outcome = tokio::select! {
            outcome = self.pump(&tx) => outcome,
            _ = tx.closed() => StreamOutcome::Cancelled,
        };

        match outcome {
            StreamOutcome::Completed(_) | StreamOutcome::Cancelled if tx.is_closed() => {
                self.refund().await;
                self.log_cancelled(started_at);
            }
            StreamOutcome::Cancelled => {
                self.refund().await;
            }
            StreamOutcome::Failed(err) => {
                self.refund().await;
                warn!(
                    event = "chat_upstream_failed",
                    user_id = %self.user_id,
                    exchange_id = %self.exchange_id,
                    model = %self.descriptor.id,
                    error = %err,
                    elapsed_ms = started_at.elapsed().as_millis() as u64
                );
                let _ = tx.send(StreamEvent::error(err.public_message())).await;
            }
            StreamOutcome::Completed(reply) => {
                let measure = measure_usage(
                    self.provider.clone(),
                    self.descriptor.clone(),
                    render_transcript(&self.messages),
                    reply.clone(),
                );
                // The write below is not raced against the client: once it
                // commits, the generation stays charged.
                let usage = tokio::select! {
                    usage = measure => usage,
                    _ = tx.closed() => {
                        self.refund().await;
                        self.log_cancelled(started_at);
                        return;
                    }
                };
                let finalized = match usage {
                    Ok(usage) => self.finalize(reply, usage, started_at).await,
                    Err(err) => Err(err),
                };
                let event = match finalized {
                    Ok(exchange_id) => StreamEvent::done(exchange_id),
                    Err(err) => {
                        self.refund().await;
                        StreamEvent::error(err.public_message())
                    }
                };
                let _ = tx.send(event).await;
            }
        }
    }

    fn log_cancelled(&self, started_at: Instant) {
        info!(
            event = "chat_cancelled",
            user_id = %self.user_id,
            exchange_id = %self.exchange_id,
            model = %self.descriptor.id,
            elapsed_ms = started_at.elapsed().as_millis() as u64
        );
    }

    async fn pump(&self, tx: &mpsc::Sender<StreamEvent>) -> StreamOutcome {
        let request = CompletionRequest {
            model: self.descriptor.id.clone(),
            messages: self.messages.clone(),
            temperature: self.temperature,
        };
        let mut stream = match self.provider.stream(request).await {
            Ok(stream) => stream,
            Err(err) => return StreamOutcome::Failed(err),
        };

        let mut reply = String::new();
        while let Some(item) = stream.next().await {
            let fragment = match item {
                Ok(fragment) => fragment,
                Err(err) => return StreamOutcome::Failed(err),
            };
            reply.push_str(&fragment);
            if tx.send(StreamEvent::fragment(fragment)).await.is_err() {
                return StreamOutcome::Cancelled;
            }
        }
        StreamOutcome::Completed(reply)
    }

    async fn finalize(
        &self,
        reply: String,
        usage: Usage,
        started_at: Instant,
    ) -> Result<String, GatewayError> {
        let entry = NewEntry {
            user_message: self.user_input.clone(),
            ai_message: reply,
            regenerate: self.regenerate,
            model: self.descriptor.id.clone(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_nanos: usage.cost_nanos,
        };

        let _guard = self.locks.lock(&self.exchange_id).await;
        match self
            .history
            .record_exchange(Some(self.exchange_id.clone()), &self.user_id, entry.clone())
            .await
        {
            Ok(exchange_id) => {
                info!(
                    event = "chat_finalized",
                    user_id = %self.user_id,
                    exchange_id = %exchange_id,
                    model = %self.descriptor.id,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    cost_usd = nanos_to_usd(usage.cost_nanos),
                    elapsed_ms = started_at.elapsed().as_millis() as u64
                );
                Ok(exchange_id)
            }
            Err(err @ StorageError::OwnerMismatch { .. }) => {
                warn!(
                    event = "chat_forbidden",
                    user_id = %self.user_id,
                    exchange_id = %self.exchange_id
                );
                Err(err.into())
            }
            Err(err) => {
                self.log_persist_failure(&err, &entry, usage);
                Err(err.into())
            }
        }
    }

    fn log_persist_failure(&self, err: &StorageError, entry: &NewEntry, usage: Usage) {
        error!(
            event = "chat_persist_failed",
            user_id = %self.user_id,
            exchange_id = %self.exchange_id,
            model = %entry.model,
            user_message = %entry.user_message,
            ai_message = %entry.ai_message,
            regenerate = entry.regenerate,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_nanos = usage.cost_nanos,
            error = %err
        );
    }

    async fn refund(&self) {
        if let Err(err) = self.quota.refund_one(&self.user_id).await {
            error!(
                event = "quota_refund_failed",
                user_id = %self.user_id,
                exchange_id = %self.exchange_id,
                error = %err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_cleaned() {
        assert_eq!(clean_title(" \"Rust/Go async comparison\"\n"), "RustGo async comparison");
    }
}
