// src/cli/handlers/mod.rs

pub mod commons;
pub mod count;
pub mod list;
pub mod run;
