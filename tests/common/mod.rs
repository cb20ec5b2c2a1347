//! Test utilities and helpers for the ward backend tests

pub mod db;
pub mod fixtures;
pub mod helpers;

pub use db::TestDb;
pub use fixtures::*;
pub use helpers::*;
