//! Core catalog model for ledgerline.
//!
//! This crate defines the song and audit-log records, the SQLite schema
//! with its migrations, and the [`Catalog`] handle that performs upserts,
//! cover linking and batch bookkeeping.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;

pub use error::{Error, Result};
pub use model::{LogAddition, SongRecord, TagMap, UpsertOutcome};
pub use schema::Catalog;
