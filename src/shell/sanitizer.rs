//! Output sanitization for raw shell bytes.
//!
//! A raw shell provides no structured "command complete" event, so the text
//! handed back to users is recovered heuristically: the terminal echo of the
//! typed command and the prompt sentinel (with anything drawn before it on
//! its line) are dropped.
//! This relies on the sentinel never occurring in legitimate output.

use once_cell::sync::Lazy;
use regex::Regex;

/// CSI sequences (`ESC [ params intermediates final`) and single-character
/// escapes (`ESC` followed by one byte in `@`..`_`).
static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ANSI escape pattern")
});

/// Remove terminal escape sequences from text.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Turn raw shell output into user-presentable text.
///
/// Steps:
/// 1. Lossy UTF-8 decode.
/// 2. Strip escape sequences.
/// 3. Drop the first line if it contains the echoed command.
/// 4. Treat every line containing the sentinel as a prompt line: keep only
///    what follows the last sentinel, and drop the line if that is blank.
/// 5. Join with `\n` and trim.
pub fn sanitize(raw: &[u8], sentinel: &str, echoed_command: &str) -> String {
    let decoded = String::from_utf8_lossy(raw);
    let clean = strip_ansi(&decoded);

    let mut lines = clean.lines();
    let mut kept: Vec<&str> = Vec::new();

    if let Some(first) = lines.next()
        && !first.contains(echoed_command)
    {
        kept.push(first);
    }
    kept.extend(lines);

    let kept: Vec<&str> = kept
        .into_iter()
        .filter_map(|line| strip_prompt(line, sentinel))
        .collect();

    kept.join("\n").trim().to_string()
}

/// Remove the prompt from a line. `None` drops the line.
fn strip_prompt<'a>(line: &'a str, sentinel: &str) -> Option<&'a str> {
    if sentinel.is_empty() {
        return Some(line);
    }
    match line.rfind(sentinel) {
        None => Some(line),
        Some(pos) => {
            let rest = line[pos + sentinel.len()..].trim();
            if rest.is_empty() { None } else { Some(rest) }
        }
    }
}
