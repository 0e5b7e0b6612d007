pub mod analysis;
pub mod api_connection;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod rag;
pub mod search;
