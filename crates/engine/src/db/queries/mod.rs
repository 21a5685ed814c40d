//! Database queries for the txflow engine.
//!
//! This module contains database query functions organized by table.

pub mod counter;
pub mod run;
pub mod step_record;
