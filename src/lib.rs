pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;
