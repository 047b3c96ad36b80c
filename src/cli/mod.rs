pub mod account;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "login_gateway")]
#[command(about = "Login server account administration", long_about = None)]
pub struct Cli {
    /// Path to the gateway config file
    #[arg(long, default_value = "login_gateway.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// Defaults to --password
        #[arg(long)]
        confirm_password: Option<String>,
        #[arg(long)]
        email: String,
        /// M or F
        #[arg(long)]
        gender: String,
        #[arg(long, default_value = "")]
        security_code: String,
        /// Code the session was issued, when captcha is enabled
        #[arg(long)]
        issued_code: Option<String>,
        /// Address recorded in the creation log
        #[arg(long, default_value = "127.0.0.1")]
        remote_addr: String,
    },
    /// Check a username/password pair
    Verify {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Ban an account until a given time (e.g. "2025-01-31 12:00" or "+3 days")
    TempBan {
        #[arg(long)]
        account_id: u64,
        #[arg(long, allow_hyphen_values = true)]
        until: String,
    },
    /// Ban an account with no expiry
    PermBan {
        #[arg(long)]
        account_id: u64,
    },
    /// Lift any ban on an account
    Unban {
        #[arg(long)]
        account_id: u64,
    },
    /// Print an account and its creation record as JSON
    Show {
        #[arg(long)]
        account_id: u64,
    },
}
