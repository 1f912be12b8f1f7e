//! Command-line parsing tests.

use clap::Parser;
use hyperapi::cli::{parse_key_value, query_args, Cli, Command};
use serial_test::serial;

#[test]
fn test_get_with_query_arguments() {
    let cli = Cli::try_parse_from([
        "hyperapi",
        "--server",
        "https://reviews.example.com",
        "get",
        "widgets/7",
        "-q",
        "expand=owner",
        "--query",
        "only-fields=name,color",
    ])
    .unwrap();

    assert_eq!(cli.server.as_deref(), Some("https://reviews.example.com"));
    let Command::Get { path, query } = cli.command else {
        panic!("expected the get command");
    };
    assert_eq!(path, "widgets/7");

    let args = query_args(&query);
    assert_eq!(args.len(), 2);
    assert_eq!(args.get("expand").map(ToString::to_string), Some("owner".to_string()));
    assert_eq!(
        args.get("only-fields").map(ToString::to_string),
        Some("name,color".to_string())
    );
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "hyperapi",
        "list",
        "widgets",
        "--all",
        "--json",
        "--debug",
        "--server",
        "http://localhost:8080",
    ])
    .unwrap();

    assert!(cli.json);
    assert!(cli.debug);
    assert!(matches!(cli.command, Command::List { all: true, .. }));
}

#[test]
#[serial]
fn test_login_defaults() {
    std::env::remove_var("HYPERAPI_USERNAME");
    std::env::remove_var("HYPERAPI_PASSWORD");

    let cli = Cli::try_parse_from(["hyperapi", "login", "--web"]).unwrap();

    match cli.command {
        Command::Login {
            web,
            open_browser,
            timeout,
            username,
            password,
        } => {
            assert!(web);
            assert!(!open_browser);
            assert_eq!(timeout, 180);
            assert_eq!(username, None);
            assert_eq!(password, None);
        }
        other => panic!("expected the login command, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_login_credentials_from_env() {
    std::env::set_var("HYPERAPI_USERNAME", "alice");
    std::env::set_var("HYPERAPI_PASSWORD", "secret");

    let cli = Cli::try_parse_from(["hyperapi", "login"]);

    std::env::remove_var("HYPERAPI_USERNAME");
    std::env::remove_var("HYPERAPI_PASSWORD");

    let Command::Login {
        username, password, ..
    } = cli.unwrap().command
    else {
        panic!("expected the login command");
    };
    assert_eq!(username.as_deref(), Some("alice"));
    assert_eq!(password.as_deref(), Some("secret"));
}

#[test]
fn test_invalid_query_argument_is_rejected() {
    let result = Cli::try_parse_from(["hyperapi", "get", "widgets", "-q", "no-equals-sign"]);
    assert!(result.is_err());

    assert_eq!(
        parse_key_value("color=red=ish"),
        Ok(("color".to_string(), "red=ish".to_string()))
    );
    assert!(parse_key_value("=red").is_err());
}

#[test]
fn test_subcommand_is_required() {
    assert!(Cli::try_parse_from(["hyperapi"]).is_err());
}
