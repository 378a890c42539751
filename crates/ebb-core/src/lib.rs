#![forbid(unsafe_code)]

//! ebb core data model.
//!
//! This crate defines the value types the ebb runtime produces and
//! consumes, with no interpreter code:
//!
//! - [`Cause`] - a lossless, composable record of why a computation failed
//! - [`Exit`] - the terminal result of a run (success or cause)
//! - [`Defect`] - an unexpected failure outside the typed error channel
//! - [`FiberFailure`] - a cause squashed to a single boundary error
//! - [`Context`] / [`Tag`] - the immutable, type-indexed service map
//! - [`FiberId`] - monotonic fiber identity
//! - [`Deferred`] - a single-assignment cell for an eventual exit
//!
//! # Role in ebb
//! `ebb-core` is the leaf crate: `ebb-runtime` builds the effect algebra
//! and both interpreters on top of these types, and `ebb` re-exports the
//! public surface.

pub mod cause;
pub mod context;
pub mod defect;
pub mod deferred;
pub mod exit;
pub mod fiber_id;

pub use cause::Cause;
pub use context::{Context, ServiceNotFound, Tag};
pub use defect::Defect;
pub use deferred::Deferred;
pub use exit::{Exit, FiberFailure};
pub use fiber_id::FiberId;
