//! Tool-augmented anime chat backend.
//!
//! The crate wires four pieces together:
//! - A language model abstraction (`LanguageModel`) with a Gemini client that
//!   speaks both structured function calling and a strict marker-text
//!   fallback encoding.
//! - A tool interface (`Tool` and `ToolRegistry`) with Jikan-backed anime
//!   search tools.
//! - Session-keyed, append-only transcripts (`Transcript`, `SessionStore`).
//! - The conversation loop (`Agent`) that alternates between the model and
//!   the tools until a final text reply, behind an axum HTTP endpoint.

mod agent;
mod config;
mod error;
mod llm;
mod marker;
mod message;
mod server;
mod tool;
mod transcript;

pub mod tools;

pub use agent::Agent;
pub use config::{AppConfig, ChatConfig, ModelConfig, ServerConfig, ToolCallEncoding};
pub use error::{ChatError, Result};
pub use llm::{GeminiClient, LanguageModel, ModelReply, StubModel, StubReply};
pub use marker::{parse as parse_marker, MarkerReply};
pub use message::{Role, ToolCall, Turn};
pub use server::{serve, router, AppState, ChatRequest, ChatResponse};
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use transcript::{SessionStore, Transcript};
