//! rollcall-ledger — Durable attendance log.
//!
//! SQLite-backed, append-only record of who was seen and when, with at most
//! one record per identity per civil day.

pub mod export;
mod ledger;
mod migrations;
mod offset;

pub use ledger::{
    AttendanceRecord, Ledger, LedgerError, LedgerOptions, MarkOutcome, TIMESTAMP_FORMAT,
};
pub use migrations::MigrationError;
pub use offset::{parse_day_offset, DayOffsetError};
