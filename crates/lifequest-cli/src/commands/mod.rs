pub mod activity;
pub mod character;
pub mod config;
pub mod daily;
pub mod habit;
pub mod loan;
pub mod serve;
pub mod sweep;
