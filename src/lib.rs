pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod policy;
pub mod schema;
pub mod seed;
pub mod services;
pub mod store;
pub mod utils;
