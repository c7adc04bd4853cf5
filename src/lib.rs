#![deny(missing_docs)]

//! Core library for stakeholder-tailored multi-document summary synthesis.

/// Language-model call capability and the Ollama adapter.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Document-fetch capability supplied by the caller.
pub mod documents;
/// Persisted job and result record shapes.
pub mod job;
/// Structured logging and tracing setup.
pub mod logging;
/// Multi-document synthesis pipeline.
pub mod synthesis;
