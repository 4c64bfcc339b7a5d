// src/core/mod.rs

pub mod error;
pub mod radix;
pub mod space;
pub mod sweep;
pub mod tasks;
pub mod timer;
