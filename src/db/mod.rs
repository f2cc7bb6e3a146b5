//! SQLite persistence helpers: schema DDL and row converters.

pub mod converters;
pub mod schema;
