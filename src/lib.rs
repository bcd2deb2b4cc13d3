//! `defuse` - escape-room bomb prop engine
//!
//! A countdown with a secret disarm code, an ordered wire puzzle that
//! unlocks the keypad, operator overrides, and an HTTP/SSE surface that
//! props and displays talk to.

pub mod cli;
pub mod config;
pub mod error;
pub mod game;
pub mod notifier;
pub mod observability;
pub mod transport;
