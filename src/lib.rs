//! aggre - content aggregation pipeline.
//!
//! Collects discussions from link aggregators, feeds and video channels,
//! deduplicates the content they point at by canonical URL, then downloads,
//! extracts, enriches and transcribes that content in independent stages.

pub mod cli;
pub mod collectors;
pub mod config;
pub mod models;
pub mod repository;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;
