//! # Prompt Template Modules
//!
//! This module organizes all prompt templates used throughout the `nlsql` library.
//! Templates carry `{placeholder}` markers filled in with `str::replace`.

pub mod agent;
pub mod core;
pub mod examples;
pub mod schema;
