//! Domain modules organized as vertical slices.
//!
//! Each record module contains:
//! - `mod.rs`: The canonical, immutable record type
//! - `convert.rs`: Extraction from a loosely-shaped [`payload::Payload`]
//!
//! `payload` holds the placement-tolerant field lookup and the centralized
//! shape heuristics shared by every record.

pub mod activity;
pub mod counts;
pub mod payload;
pub mod transaction;
