//! Price-tracking scrape worker: a job queue of product URLs, store scrapers
//! resolved by host, and a supervised worker loop that records price history.

pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod model;
pub mod scrapers;
pub mod worker;
