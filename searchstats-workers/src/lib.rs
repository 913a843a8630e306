//! The three long-running daemons of the searchstats pipeline.
//!
//! One binary, one subcommand per worker: the collector harvests raw
//! telemetry into framed batches on the log; the two aggregators consume
//! the same topic under independent groups and persist their documents to
//! the store. Each worker runs until SIGINT/SIGTERM and shuts down
//! cleanly.

pub mod collector;
pub mod config;
pub mod consumer;
pub mod popular_hour;
pub mod shutdown;
pub mod top_queries;
