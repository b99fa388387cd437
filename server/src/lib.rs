pub mod config;
pub mod handlers;
pub mod jobs;
pub mod mail;
pub mod models;
pub mod repository;
pub mod routes;
pub mod state;
pub mod storage;
pub mod utils;
