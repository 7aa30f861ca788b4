//! # Codex20
//!
//! A tabletop rules assistant. Every user message is matched against a local
//! corpus of JSON rule documents; matching records are prepended to the
//! model prompt so the answer is grounded in the actual rules text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌─────────┐
//! │ Telegram │──▶│    Bot    │──▶│  Prompt  │──▶│   LLM   │
//! │ / CLI    │   │           │   │ Composer │   │ client  │
//! └──────────┘   └─────┬─────┘   └──────────┘   └─────────┘
//!                      │
//!                      ▼
//!            ┌─────────────────────┐
//!            │ Assembler           │
//!            │ walker ▸ extractor  │
//!            │ ▸ keyword matcher   │
//!            └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Records, categories, and the document sum type |
//! | [`walker`] | Corpus walker |
//! | [`document`] | Document record extraction |
//! | [`matcher`] | Query keywords and record matching |
//! | [`augment`] | Size- and time-bounded augmentation assembly |
//! | [`persona`] | Persona context loading |
//! | [`prompt`] | Prompt composition |
//! | [`llm`] | Language model clients |
//! | [`character`] | Random character sheets grounded in corpus names |
//! | [`bot`] | Per-message handling and reply formatting |
//! | [`telegram`] | Telegram transport |
//! | [`server`] | Liveness HTTP server |

pub mod augment;
pub mod bot;
pub mod character;
pub mod config;
pub mod document;
pub mod llm;
pub mod matcher;
pub mod models;
pub mod persona;
pub mod prompt;
pub mod server;
pub mod telegram;
pub mod walker;
