use std::path::PathBuf;

use serde_json::json;

use super::report;
use crate::config::AppConfig;
use crate::db::Database;
use crate::error::TaskhubError;
use crate::output::json as output;

pub fn run(db: Option<PathBuf>, json_output: bool) -> i32 {
    let path = match db {
        Some(path) => path,
        None => match AppConfig::from_env() {
            Ok(config) => config.database_path,
            Err(e) => return report(&TaskhubError::config(format!("{e:#}")), json_output),
        },
    };

    match Database::open(&path) {
        Ok(db) => {
            if json_output {
                let body = output::success(json!({ "path": db.path().to_string_lossy() }));
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            } else {
                println!("Initialized taskhub database at {}", db.path().display());
            }
            0
        }
        Err(e) => report(&e, json_output),
    }
}
