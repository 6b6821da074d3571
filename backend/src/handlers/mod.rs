//! HTTP handlers for the Field Service Management Platform

pub mod health;
pub mod kardex;

pub use health::*;
pub use kardex::*;
