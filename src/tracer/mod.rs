//! Probe lifecycle and ring-buffer event ingestion.
//!
//! `parse` decodes raw records, `ingest` runs the decode → filter → enrich →
//! sample pipeline, `probes` attaches kernel and user-space programs, and
//! `error_handler` keeps ingestion failures from overwhelming the agent.
//! BPF-touching code is gated behind the `bpf` feature.

pub mod error_handler;
pub mod errors;
pub mod ingest;
pub mod parse;
pub mod probes;

#[cfg(feature = "bpf")]
pub mod loader;
