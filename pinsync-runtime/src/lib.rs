pub mod config;
pub mod error;
pub mod extract;
pub mod job;
pub mod main_loop;
pub mod reconcile;
pub mod source_client;
pub mod store_client;
