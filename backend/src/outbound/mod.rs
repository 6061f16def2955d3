//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL job queue backend using Diesel
//! - **cache**: periodic in-process query-result cache

pub mod cache;
pub mod persistence;
