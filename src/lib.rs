//! Inkpost: cache-aside comment lists for a blogging client.
//!
//! Comments live in a document store; a REST key-value store holds a
//! TTL-bounded copy of each post's list. See [`cache::CommentCache`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
