//! # Dive Log Assistant
//!
//! A local-first conversational assistant for a personal scuba dive log.
//!
//! Dives and user preferences live in a single SQLite file. A hosted language
//! model answers questions about them by calling a small set of tools that
//! search, list, fetch and create dive log entries.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────────┐
//! │   chat   │──▶│  agent   │──▶│   tools    │──▶│    store     │
//! │  (loop)  │◀──│ (model)  │◀──│ (registry) │◀──│ SQLite FTS5  │
//! └──────────┘   └────┬─────┘   └────────────┘   │  + vectors   │
//!                     ▼                           └──────────────┘
//!              chat-completions API
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! divelog init                               # create database
//! divelog populate data/sample_dives.json    # load sample dives
//! divelog search "manta ray" --location Palau
//! divelog                                    # start chatting
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy and machine codes |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Record store for dives and preferences |
//! | [`search`] | Keyword, semantic, and filter-only search |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`tools`] | Tool layer exposed to the model |
//! | [`llm`] | Chat model client |
//! | [`agent`] | Tool-calling agent |
//! | [`chat`] | Interactive loop |
//! | [`populate`] | Bulk loading from JSON |

pub mod agent;
pub mod chat;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod error;
pub mod get;
pub mod http;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod populate;
pub mod prefs;
pub mod search;
pub mod stats;
pub mod store;
pub mod tools;
