//! Feed Owner - single-owner ingestion of a bot update feed.
//!
//! Exactly one consumer may long-poll an account's update feed at a time.
//! This library claims the feed, keeps it across restarts and network
//! failures, and backs off when another instance holds it, while
//! persisting a per-account offset so updates are handled at most once.

pub mod config;
pub mod engine;
pub mod feed;
pub mod offset;
pub mod retry;
pub mod runner;
pub mod types;
pub mod webhook;

#[cfg(test)]
mod test_utils;
