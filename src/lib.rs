//! tripsync - offline-first sync for trip plans
//!
//! This crate provides the sync engine behind the `tsync` CLI: every write
//! lands in a local SQLite store first and is pushed to the remote store when
//! connectivity allows, with last-write-wins on `updated_at`.
//!
//! # Architecture
//!
//! - [`model`] - Data types (User, Plan, Trip, Feedback) and the tagged [`model::Entity`]
//! - [`storage`] - SQLite local store, audit events and the persisted queue table
//! - [`remote`] - Remote store trait with HTTP and in-memory implementations
//! - [`network`] - Connectivity monitor
//! - [`queue`] - Single-flight drain over the persisted sync queue
//! - [`sync`] - The sync engine: save, push, pull, conflict resolution
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod network;
pub mod queue;
pub mod remote;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
