//! Remote (ssh) delegation for the pi coding agent's built-in tools.
//!
//! The agent's read, write, edit, ls, find, grep and bash operations are
//! re-implemented on top of a single remote-shell command channel, keeping
//! the local tools' contracts (limits, truncation notices, ordering, error
//! texts). [`delegation::DelegationController`] decides per session whether
//! calls go to the remote host or stay local; [`tools`] exposes the
//! operations through the agent's JSON tool interface.

#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::uninlined_format_args,
        clippy::missing_const_for_fn
    )
)]
#![allow(
    clippy::must_use_candidate,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::similar_names
)]

pub mod abort;
pub mod cli;
pub mod config;
pub mod delegation;
pub mod error;
pub mod error_hints;
pub mod model;
pub mod remote;
pub mod tools;
pub mod truncate;

pub use delegation::{DelegationController, Operations, RemoteConfiguration};
pub use error::{Error, Result};
