//! Core simulation types and logic. No I/O happens here.

pub mod error;
pub mod record;
pub mod rolling_stats;
pub mod subclass;
pub mod dna;
pub mod course_of_action;
pub mod influencer;
pub mod investment;
pub mod fitness;
pub mod investor;
pub mod generation;
pub mod config;
pub mod config_validation;
pub mod factory;
pub mod stats;
pub mod simulator;
