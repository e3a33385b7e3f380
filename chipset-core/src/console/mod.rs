//! Operator console shared by the firmware and emulator.
//!
//! Lines are lexed and parsed in [`grammar`] against the tables in
//! [`catalog`], turned into engine requests by [`commands`], and rendered by
//! [`status`]. Everything stays `no_std`.

pub mod catalog;
pub mod commands;
pub mod completion;
pub mod grammar;
pub mod status;
