pub mod common;
pub mod service;
pub mod storage;

pub use common::*;

pub mod models {
    pub use crate::common::models::*;
}
