//! Provider-agnostic abstractions for chatgate.
//!
//! This crate does not depend on any HTTP client; concrete adapters live in
//! `chatgate-provider-impl`.

pub mod errors;
pub mod family;
pub mod prompt;
pub mod provider;
pub mod registry;

pub use errors::{ProviderError, ProviderResult, UpstreamTransportErrorKind};
pub use family::ProviderFamily;
pub use prompt::{PromptMessage, Role, assemble_messages, render_transcript};
pub use provider::{ChatProvider, CompletionRequest, FragmentStream, ProviderSet};
pub use registry::{
    ModelDescriptor, ModelRegistry, ModelTier, NANOS_PER_USD, UnknownModel, nanos_to_usd,
};
