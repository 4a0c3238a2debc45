//! Data models

pub mod reading;

pub use reading::*;
