//! NightMother host security agent
//!
//! Samples running processes on a fixed delay, flags those above a CPU
//! threshold and records each finding in an append-only SQLite table.

pub mod agent;
pub mod collector;
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod event;
pub mod logging;
