pub mod config;
pub mod domain;
pub mod filter;
pub mod fixed;
pub mod geoidx;
pub mod http;
pub mod provider;
pub mod session;
pub mod track;
pub mod types;
