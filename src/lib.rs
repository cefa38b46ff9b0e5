//! Operational monitoring for telecom field incidents (ocorrências):
//! fetch, classify by SLA, roll up per contract and export reports.

pub mod auth;
pub mod cache;
pub mod config;
pub mod hub;
pub mod loader;
pub mod output;
pub mod reports;
pub mod rules;
pub mod source;
pub mod types;
pub mod util;
