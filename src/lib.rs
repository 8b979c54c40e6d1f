pub mod app;
pub mod charts;
pub mod config;
pub mod db;
pub mod error;
pub mod meals;
pub mod nutrition;
pub mod state;
