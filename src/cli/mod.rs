pub mod commands;
pub mod init;
pub mod serve;

pub use commands::*;

use crate::error::TaskhubError;
use crate::output::json as output;

/// Print a failure as the JSON envelope on stdout or as text on stderr.
/// Returns the process exit code.
pub(crate) fn report(e: &TaskhubError, json_output: bool) -> i32 {
    if json_output {
        println!("{}", serde_json::to_string_pretty(&output::error(e)).unwrap_or_default());
    } else {
        eprintln!("Error: {}", e.message);
    }
    1
}
