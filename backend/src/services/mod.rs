//! Business logic services for the Field Service Management Platform

pub mod alert;
pub mod kardex;

pub use alert::AlertService;
pub use kardex::KardexService;
