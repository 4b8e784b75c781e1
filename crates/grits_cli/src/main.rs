//! Command-line probe for the GRITS core.
//!
//! # Responsibility
//! - Run service operations against a local database file.
//! - Print JSON results so output can be diffed and piped.
//!
//! Usage:
//! `grits_cli <db_path> [--as <login> | --api-key <key>] <command> [args]`
//!
//! Commands: `routes`, `ids`, `search [key=value ...]`,
//! `set-private <item_id> <json>`.

use grits_core::{
    open_db, route_table, Caller, DirectoryRepository, GritsConfig, GritsError, GritsService,
    SqliteDirectoryRepository,
};
use log::info;
use serde_json::json;
use std::collections::HashMap;
use std::process::ExitCode;

const USAGE: &str =
    "usage: grits_cli <db_path> [--as <login> | --api-key <key>] <routes|ids|search|set-private> [args]";

fn main() -> ExitCode {
    match run(std::env::args().skip(1).collect()) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<String, String> {
    let mut args = args.into_iter();
    let db_path = args.next().ok_or_else(|| USAGE.to_string())?;
    let rest = args.collect::<Vec<_>>();

    if let Ok(log_dir) = std::env::var("GRITS_LOG_DIR") {
        grits_core::init_logging(grits_core::default_log_level(), &log_dir, true)
            .map_err(|err| err.to_string())?;
    }

    let config = GritsConfig::load().map_err(|err| err.to_string())?;
    let conn = open_db(&db_path).map_err(|err| err.to_string())?;
    info!(
        "event=cli_start module=cli status=ok version={}",
        grits_core::core_version()
    );

    let (caller_arg, command) = split_caller(&rest)?;
    let caller = match caller_arg {
        CallerArg::Anonymous => Caller::Anonymous,
        CallerArg::ApiKey(key) => Caller::ApiKey(key),
        CallerArg::Login(login) => {
            let directory = SqliteDirectoryRepository::new(&conn);
            let user = directory
                .find_user_by_login(&login)
                .map_err(|err| err.to_string())?
                .ok_or_else(|| format!("unknown user `{login}`"))?;
            Caller::User(user)
        }
    };

    let service = GritsService::open(&conn, &config);
    let (name, command_args) = command.split_first().ok_or_else(|| USAGE.to_string())?;
    let result = match name.as_str() {
        "routes" => serde_json::to_value(route_table()).map_err(|err| err.to_string()),
        "ids" => ids(&service, &caller).map_err(describe),
        "search" => {
            let query = parse_query(command_args)?;
            service
                .search(&caller, &query)
                .and_then(|output| {
                    serde_json::to_value(output)
                        .map_err(|err| GritsError::Validation(err.to_string()))
                })
                .map_err(describe)
        }
        "set-private" => match command_args {
            [item_id, body] => service
                .set_private_metadata(&caller, item_id, body)
                .and_then(|record| {
                    serde_json::to_value(record)
                        .map_err(|err| GritsError::Validation(err.to_string()))
                })
                .map_err(describe),
            _ => Err(USAGE.to_string()),
        },
        _ => Err(USAGE.to_string()),
    }?;

    serde_json::to_string_pretty(&result).map_err(|err| err.to_string())
}

enum CallerArg {
    Anonymous,
    Login(String),
    ApiKey(String),
}

fn split_caller(args: &[String]) -> Result<(CallerArg, &[String]), String> {
    match args {
        [flag, login, rest @ ..] if flag == "--as" => Ok((CallerArg::Login(login.clone()), rest)),
        [flag, key, rest @ ..] if flag == "--api-key" => Ok((CallerArg::ApiKey(key.clone()), rest)),
        [flag, ..] if flag.starts_with("--") => Err(USAGE.to_string()),
        rest => Ok((CallerArg::Anonymous, rest)),
    }
}

fn parse_query(args: &[String]) -> Result<HashMap<String, String>, String> {
    args.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| format!("expected key=value, got `{pair}`"))
        })
        .collect()
}

fn ids<I, D>(service: &GritsService<I, D>, caller: &Caller) -> Result<serde_json::Value, GritsError>
where
    I: grits_core::ItemRepository,
    D: DirectoryRepository,
{
    let privileged = match service.privileged_group_id(caller) {
        Ok(id) => Some(id),
        Err(GritsError::AccessDenied(_)) => None,
        Err(err) => return Err(err),
    };
    Ok(json!({
        "folderId": service.folder_id(caller)?,
        "groupId": service.group_id(caller)?,
        "collectionId": service.collection_id(caller)?,
        "privilegedId": privileged,
    }))
}

fn describe(err: GritsError) -> String {
    format!("status={} error={}", err.status_code(), err)
}
