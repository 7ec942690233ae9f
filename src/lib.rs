//! Time tracker for todo.txt style tasks and their `+projects`.
//! Time is kept in a daily csv log and archived into yearly files, which the command line reads
//! back to answer questions like "how much did I spend on +work this month".
//!

pub mod cli;
pub mod config;
pub mod fs;
pub mod stats;
pub mod storage;
pub mod tracker;
pub mod utils;
pub mod watcher;
