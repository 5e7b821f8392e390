//! Interactive yes/no confirmation for destructive commands.

use std::io::{BufRead, Write};

/// Asks `prompt` on `writer` and reads one answer from `reader`.
///
/// Only `y` or `yes` (any case, surrounding whitespace ignored) confirm.
/// Anything else, end of input, or an I/O error declines.
pub fn confirm(prompt: &str, mut reader: impl BufRead, mut writer: impl Write) -> bool {
    if write!(writer, "{prompt} (y/n): ")
        .and_then(|()| writer.flush())
        .is_err()
    {
        return false;
    }

    let mut answer = String::new();
    match reader.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => is_affirmative(&answer),
    }
}

fn is_affirmative(answer: &str) -> bool {
    let normalised = answer.trim().to_ascii_lowercase();
    normalised == "y" || normalised == "yes"
}
