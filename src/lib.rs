pub mod audit;
pub mod auth;
pub mod comments;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod service;
pub mod store;
pub mod warnings;
