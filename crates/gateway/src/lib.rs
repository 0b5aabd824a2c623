//! `pc-gateway` — the Pangea Chat turn orchestrator and its CLI front end.
//!
//! [`runtime`] holds the session state container and the turn pipeline;
//! [`cli`] drives it from a terminal; [`bootstrap`] wires REST
//! collaborators from configuration.

pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
