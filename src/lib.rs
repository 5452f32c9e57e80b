//! Tabchat is a terminal client for running several AI chat sessions side
//! by side, each bound to its own model, with streamed responses and file
//! attachments.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session engine: the session table ([`core::store`]),
//!   the visible/overflow tab partition ([`core::tabs`]), attachment
//!   staging ([`core::attachments`]), and streaming orchestration with
//!   cancellation and rollback ([`core::generation`]).
//! - [`api`] defines the backend payloads and the thin async helpers for
//!   the model catalog and title synchronization.
//! - [`commands`] parses the slash commands used by the interactive loop.
//! - [`ui`] runs the line-oriented event loop that multiplexes user input,
//!   stream events, and side-effect results.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
