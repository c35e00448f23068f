pub mod anthropic;
pub mod chat;
pub mod gemini;
pub mod openai;
pub mod payment;
pub mod sse;
