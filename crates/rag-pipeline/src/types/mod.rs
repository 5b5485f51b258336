//! Shared data model

pub mod job;
pub mod message;
pub mod query;
pub mod stage;
