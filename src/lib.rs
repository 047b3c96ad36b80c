pub mod account;
pub mod cli;
pub mod config;
pub mod error;
pub mod login_server;
pub mod session;
pub mod storage;
