//! The tracking engine. [engine::TimeTracker] holds the state, [service::TrackerService] runs it
//! against commands, file notifications, settings changes and the tick.

pub mod engine;
pub mod events;
pub mod ledger;
pub mod service;
pub mod session;
pub mod shutdown;
pub mod task;
pub mod ticker;
