//! # vibe-radar
//!
//! A small service that finds public GitHub repositories showing signs of
//! AI-assisted ("vibe") coding, scores them by the evidence found, and keeps
//! the ones that clear a threshold.
//!
//! ## Architecture
//!
//! ```text
//!   POST /api/scan/start ──► Scanner::start ──► TaskRegistry (tokio task)
//!                                                   │
//!        ┌──────────────────────────────────────────┘
//!        ▼
//!   repo search ──► code search ──► metadata (opt) ──► persist ──► clone (opt)
//!   (new repos)     (known repos)                      score >= min
//!        │               │               │                 │
//!        └───────────────┴─── SearchApi ─┘            JobStore
//! ```
//!
//! Every phase checks the job's cancel flag before touching the network or
//! the store. Nothing is written until the persistence phase, so a scan that
//! fails or hits the rate limit earlier leaves no partial results.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, data dir, GitHub and pacing
//! - [`models`] - Shared data types: `ScanJob`, `ScanParams`, `RepoCandidate`, request/response types
//! - [`github`] - GitHub REST client with retry and rate-limit detection, behind the `SearchApi` trait
//! - [`scan::evidence`] - Evidence tags, weights and the deduplicating score accumulator
//! - [`scan::queries`] - Default search queries and filter modifiers
//! - [`scan::runner`] - The scan state machine
//! - [`scan::registry`] - Process-wide registry of background scan tasks
//! - [`store`] - `JobStore` contract and the JSON-file implementation
//! - [`export`] - CSV rendering of persisted candidates
//! - [`git`] - Shallow clone of discovered repositories
//! - [`api`] - Axum HTTP handlers for scans, results and clones
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod export;
pub mod git;
pub mod github;
pub mod models;
pub mod scan;
pub mod state;
pub mod store;
