//! Guildbot library: everything the `guildbot` binary is made of.
//!
//! # Architecture
//!
//! - [`store`] - revisioned document store, guild configurations and snapshots
//! - [`guilds`] - registry of guild contexts and per-guild logging
//! - [`commands`] - command catalog, dispatcher and built-in commands
//! - [`upstream`] - platform trait, REST client and event feed
//! - [`bot`] - boot sequence and event loop
//! - [`config`] - YAML configuration with environment variable overrides

pub mod bot;
pub mod commands;
pub mod config;
pub mod guilds;
pub mod store;
pub mod upstream;
