// crates/mlf-channel/src/lib.rs

//! The virtual random-access channel: [`Painter`] coordinates fetch-verify-
//! save against a shared [`mlf_merkle::MerkleState`], and [`VirtualFile`] is
//! the public handle a caller reads through.
//!
//! Everything below this layer — geometry, hashing, scheduling, transport —
//! is pure or side-effect-isolated; this crate is where those pieces are
//! wired into something a caller can actually read bytes out of.

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

mod cache;
mod config;
mod error;
mod painter;
mod virtual_file;

pub use config::{PainterConfig, SchedulerChoice};
pub use error::{Error, Result};
pub use painter::Painter;
pub use virtual_file::VirtualFile;
