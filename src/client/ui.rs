//! UI utilities for the terminal client.

use std::io::Write;

/// Redisplay the prompt after printing a notification
pub fn redisplay_prompt(display_name: &str) {
    print!("{}> ", display_name);
    std::io::stdout().flush().ok();
}
