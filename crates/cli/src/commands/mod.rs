//! CLI Commands

pub mod run;
pub mod runs;
pub mod scenarios;
