//! Request-scoped query caching for the managers.
//!
//! This module provides `QueryCache`, a map from a query key to the result of
//! that query. Entries are valid for five minutes from the time they were
//! written and only while the repository revision they were read at is still
//! current. Expiry is checked on read; nothing is swept in the background.

pub mod manager;

pub use manager::{CachedData, QueryCache, CACHE_TTL_MINUTES};
