//! CLI argument parsing types.
//!
//! This module provides the command-line interface structure for the hyperapi binary.

use clap::{Parser, Subcommand};

use crate::request::QueryArgs;

/// Hypermedia API command-line interface.
#[derive(Parser, Debug)]
#[command(name = "hyperapi", about = "Browse a hypermedia API", version)]
pub struct Cli {
    /// Server URL. Defaults to HYPERAPI_URL.
    #[arg(long, global = true, env = "HYPERAPI_URL")]
    pub server: Option<String>,

    /// Output results as JSON instead of a table.
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Log requests and cache decisions.
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the API root.
    Root,

    /// Get the resource at a path below the API root.
    Get {
        /// Path relative to the API root, e.g. `widgets/7`.
        path: String,

        /// Query arguments.
        #[arg(short = 'q', long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// List the items of a list resource.
    List {
        /// Path relative to the API root, e.g. `widgets`.
        path: String,

        /// Follow `next` links through every page.
        #[arg(long)]
        all: bool,

        /// Query arguments.
        #[arg(short = 'q', long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Log in to the server.
    Login {
        /// Log in through the browser instead of with a username and password.
        #[arg(long)]
        web: bool,

        /// Open the login page in a browser (with --web).
        #[arg(long)]
        open_browser: bool,

        /// Seconds to wait for the browser login.
        #[arg(long, default_value = "180")]
        timeout: u64,

        #[arg(long, env = "HYPERAPI_USERNAME")]
        username: Option<String>,

        #[arg(long, env = "HYPERAPI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

/// Parse a `key=value` argument.
pub fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{arg}'")),
    }
}

/// Build query arguments from parsed `-q` pairs.
pub fn query_args(pairs: &[(String, String)]) -> QueryArgs {
    pairs
        .iter()
        .fold(QueryArgs::new(), |args, (key, value)| args.arg(key, value.as_str()))
}
