//! Command implementations for the parmap CLI

pub mod config;
pub mod run;
