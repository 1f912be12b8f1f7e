//! Hypermedia API CLI binary.
//!
//! A command-line interface for browsing a hypermedia API.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use hyperapi::cli::{query_args, Cli, Command};
use hyperapi::output::{item_rows, resource_table, PrettyPrint};
use hyperapi::{
    web_login_supported, ApiClient, HyperApiError, HyperResource, Resource, TransportConfig,
    WebLoginManager,
};
use tabled::Table;
use tracing::Level;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let client = match build_client(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Hint: Pass --server or set the HYPERAPI_URL environment variable");
            return ExitCode::FAILURE;
        }
    };

    match run(&client, cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::WARN };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn build_client(cli: &Cli) -> hyperapi::Result<ApiClient> {
    let server = cli.server.as_deref().ok_or_else(|| {
        HyperApiError::ConfigMissing("no server URL was given".to_string())
    })?;

    ApiClient::new(server, TransportConfig::from_env()?)
}

async fn run(client: &ApiClient, cli: Cli) -> hyperapi::Result<()> {
    match cli.command {
        Command::Root => {
            let root = client.get_root().await?;
            output_resource(&Resource::Root(root), cli.json)
        }
        Command::Get { path, query } => {
            let resource = client.get_path(&path, &query_args(&query)).await?;
            output_resource(&resource, cli.json)
        }
        Command::List { path, all, query } => {
            handle_list(client, &path, all, &query_args(&query), cli.json).await
        }
        Command::Login {
            web,
            open_browser,
            timeout,
            username,
            password,
        } => {
            if web {
                handle_web_login(client, open_browser, timeout).await
            } else {
                handle_login(client, username, password).await
            }
        }
    }
}

async fn handle_list(
    client: &ApiClient,
    path: &str,
    all: bool,
    query: &hyperapi::QueryArgs,
    json: bool,
) -> hyperapi::Result<()> {
    let first = client.get_path(path, query).await?.into_list()?;

    let pages = if all {
        first.all_pages().collect_all().await?
    } else {
        vec![first]
    };

    if json {
        let payloads: Vec<_> = pages
            .iter()
            .flat_map(|page| page.iter())
            .map(|item| item.map(|item| item.core().payload().clone()))
            .collect::<hyperapi::Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&payloads)?);
        return Ok(());
    }

    let mut rows = Vec::new();
    for page in &pages {
        rows.extend(item_rows(page)?);
    }
    let shown = rows.len();
    println!("{}", Table::new(rows));

    let total = pages.last().and_then(|page| page.total_results());
    let more = !all && pages.last().is_some_and(|page| page.has_action("next"));
    match total {
        Some(total) => println!("\n{shown} of {total} items"),
        None if more => println!("\n{shown} items (more available, use --all)"),
        None => println!("\n{shown} items"),
    }
    Ok(())
}

async fn handle_login(
    client: &ApiClient,
    username: Option<String>,
    password: Option<String>,
) -> hyperapi::Result<()> {
    let (Some(username), Some(password)) = (username, password) else {
        eprintln!("Hint: Pass --username and --password, or use --web");
        return Err(HyperApiError::ConfigMissing(
            "username and password are required".to_string(),
        ));
    };

    client.login(&username, &password);
    client.get_root().await?;
    println!("Logged in to {} as {username}", client.domain());
    Ok(())
}

async fn handle_web_login(
    client: &ApiClient,
    open_browser: bool,
    timeout: u64,
) -> hyperapi::Result<()> {
    let root = client.get_root().await?;
    if !web_login_supported(root.product_version(), &root.capabilities()) {
        return Err(HyperApiError::ConfigMissing(format!(
            "{} does not support web login",
            client.domain()
        )));
    }

    let logged_in = WebLoginManager::new(client.transport().clone())
        .open_browser(open_browser)
        .timeout(Duration::from_secs(timeout))
        .run()
        .await?;

    if !logged_in {
        return Err(HyperApiError::api(401, None, None, None));
    }

    // Establishes the session cookie for later runs.
    client.get_root().await?;
    println!("Logged in to {}", client.domain());
    Ok(())
}

fn output_resource(resource: &Resource, json: bool) -> hyperapi::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(resource.core().payload())?);
    } else {
        println!("{}\n", resource.pretty_print());
        println!("{}", resource_table(resource)?);
    }
    Ok(())
}
