//! Batched loading protocol between the cache and its data source.
//!
//! A [`BatchRequest`] collects page and field lookups keyed by a canonical
//! string; the source answers with a [`BatchResponse`] holding one entry per
//! requested key.

mod request;
mod response;

pub use request::{BatchRequest, FieldRequest, Lookup, PageRequest};
pub use response::BatchResponse;
