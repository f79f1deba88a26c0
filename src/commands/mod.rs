use anyhow::Result;
use serde_json::Value;

mod chat;
pub mod config;
mod goals;
mod journal;
mod profile;
mod request;

pub use chat::send as send_chat;
pub use goals::{GoalFilter, add as add_goal, list as list_goals, toggle as toggle_goal};
pub use journal::{add as add_journal, list as list_journal};
pub use profile::{show as show_profile, stats as profile_stats, update as update_profile};
pub use request::{get, parse_body, parse_param, post, put};

/// Prints a response to stdout. Plain-text bodies are printed as is.
pub fn print_json(value: &Value) -> Result<()> {
    match value {
        Value::Null => {}
        Value::String(text) => println!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}
