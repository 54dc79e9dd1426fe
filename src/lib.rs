//! storykeeper - bounded narrative memory for AI-assisted novel writing
//!
//! Tracks characters, relationships, plot threads and world facts chapter by
//! chapter in a JSON file per book, keeps that state bounded with LRU caches,
//! and rebuilds what the next chapter needs to know before it is generated.
//! Chapter prose can be turned into tracking updates through an LLM
//! (Anthropic, OpenAI, OpenAI-compatible, Gemini).

pub mod cache;
pub mod cli;
pub mod config;
pub mod llm;
pub mod series;
pub mod store;
pub mod tracker;
pub mod util;
