// crates/mlf-transport/src/lib.rs

//! Concrete [`mlf_core::Transport`] implementations: [`HttpTransport`] over
//! `reqwest`, issuing byte-range `GET`s against an HTTP-addressable origin,
//! and [`MockTransport`], an in-memory double used by every async test in
//! this workspace that needs to count or fault-inject `fetch_range` calls.
//!
//! The core never speaks HTTP directly (spec §1: "the core consumes a
//! byte-range fetch interface"); this crate is the one external collaborator
//! that does.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::{FaultSpec, MockTransport};
