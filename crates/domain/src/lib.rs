//! `pc-domain` — types shared by every Pangea Chat crate: configuration,
//! the error type, structured trace events and the chat data model.

pub mod config;
pub mod document;
pub mod error;
pub mod guard;
pub mod message;
pub mod principal;
pub mod quota;
pub mod trace;
pub mod transcript;
