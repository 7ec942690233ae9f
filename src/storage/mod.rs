//!  Storage is organized through [archive::ArchiveWriter].
//!  The basic idea is:
//!   - There is a storage root with a daily log, the current yearly log and a directory of older
//!     yearly logs. See [layout::TrackerLayout].
//!   - The daily log mirrors the in-memory ledger and is rewritten as a whole.
//!   - At the end of a day the daily log is appended to the yearly one and emptied.
//!   - Every log is a sequence of lines in the format of [codec].

pub mod archive;
pub mod codec;
pub mod entities;
pub mod layout;
pub mod self_write;
