pub mod accounts;
pub mod auth;
pub mod backup;
pub mod core;
pub mod records;
pub mod stats;
