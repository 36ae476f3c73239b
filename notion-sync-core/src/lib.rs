#![doc = "notion-sync-core: core logic library for notion-sync."]

//! This crate contains the export pipeline that turns a Notion page tree into
//! Markdown files in a GitHub repository: the Source Reader ([`notion`]), the
//! Destination Writer ([`github`]) and the orchestrator ([`synchronise`]).
//!
//! # Usage
//! Build a [`synchronise::Synchroniser`] from a validated [`config::SyncConfig`]
//! and call `sync()`; the CLI crate wraps this behind a command and an HTTP trigger.

pub mod config;
pub mod contract;
pub mod github;
mod http;
pub mod markdown;
pub mod notion;
pub mod synchronise;
