#![no_std]

// Shared logic for the chipset power sequencing feature set.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Boards plug in through the `board::Board` trait; the
// engine, event sources and console never name a concrete board.

pub mod board;
pub mod button;
pub mod charge;
pub mod console;
pub mod events;
pub mod hooks;
pub mod persist;
pub mod power;
pub mod sequences;
pub mod signals;
pub mod sim;
pub mod telemetry;
pub mod timer;
