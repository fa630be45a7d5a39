//! Micro-loan business environment for training and evaluating acceptance
//! policies. Each week a cohort of new and repeat applications is generated,
//! labeled against a score threshold, booked, and the outcomes that fall due
//! that week are resolved.

pub mod analysis;
pub mod book;
pub mod cohort;
pub mod config;
pub mod debt;
pub mod error;
pub mod events;
pub mod policy;
pub mod resolver;
pub mod segments;
pub mod simulation;
pub mod types;
