//! # mlbridge
//!
//! Client-side bridge that lets a machine-learning object (an estimator, a
//! fitted model, an evaluator, or a model's training summary) be operated on
//! either **in-process** against a co-located execution engine or
//! **remotely** by serializing the call into a command for a session
//! service, with both modes behaving identically to calling code.
//!
//! The crate owns the dispatch and lifecycle layer, not the algorithms:
//!
//! - per-call execution mode selection ([`mode`]) feeding an explicit
//!   strategy interface ([`executor`]);
//! - reference-counted cleanup of server-side state ([`remote`]), including
//!   derived references that borrow another object's lifetime;
//! - the command envelope and one-shot recovery of evicted training
//!   summaries ([`command`], [`invoke`], [`summary`]);
//! - a versioned metadata persistence format that round-trips across modes
//!   and format versions ([`persist`], [`registry`]);
//! - composite expansion and uid validation for pipelines and wrappers
//!   ([`composite`], [`pipeline`]).
//!
//! The compute engine, the wire transport, and the dataset abstraction stay
//! behind traits ([`session::LocalEngine`], [`session::CommandTransport`],
//! [`dataset::Dataset`]); the bridge never materializes data itself.

#![deny(missing_docs)]

/// Temporary dataset caching around multi-pass operations.
pub mod cache;
/// Transport-agnostic command envelope for the session protocol.
pub mod command;
/// Composite traversal and uid validation.
pub mod composite;
/// Opaque dataset handle and its logical plan.
pub mod dataset;
/// Error taxonomy for the bridge.
pub mod error;
/// Execution strategy selected once per call.
pub mod executor;
/// Remote command construction, execution, and result decoding.
pub mod invoke;
/// Per-call execution mode selection.
pub mod mode;
/// Identity and parameter model shared by every bridge object.
pub mod object;
/// Estimator, transformer, model, and evaluator descriptors.
pub mod operators;
/// Versioned metadata persistence.
pub mod persist;
/// Composite pipeline and wrapper types.
pub mod pipeline;
/// Registry of loadable class names.
pub mod registry;
/// Reference-counted handles to server-side state.
pub mod remote;
/// Session context and the traits for its external collaborators.
pub mod session;
/// Training summaries attached to fitted models.
pub mod summary;

#[cfg(test)]
mod testutil;

#[cfg(test)]
mod persist_test;
