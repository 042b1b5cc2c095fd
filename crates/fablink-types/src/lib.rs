pub mod api;
pub mod error;
pub mod events;
pub mod models;
pub mod sanitize;
pub mod summary;
