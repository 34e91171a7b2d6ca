//! Intern performance scoring.
//!
//! Turns a student's attendance, task, behaviour, feedback and course records
//! into a single 0-100 score with a qualitative category and a per-metric
//! breakdown. Records are read through the [`store::RecordStore`] trait;
//! [`db::PgRecordStore`] reads them from Postgres.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod report;
pub mod score;
pub mod store;
