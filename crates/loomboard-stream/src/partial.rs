//! Partial-JSON parsing of a growing completion buffer.
//!
//! The whole accumulated buffer is re-parsed on every fragment. A buffer
//! that parses verbatim wins; otherwise a best-effort completion closes
//! the open string and brackets and trims any token that cannot be
//! finished (a half-written key, a dangling comma or colon, a truncated
//! number). A buffer that still does not parse is simply not ready —
//! the caller waits for the next fragment. This is deliberately a
//! retry-on-next-input strategy, not an incremental parser.

use serde::Deserialize;

/// The document shape a generation turn streams toward.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratedDoc {
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub nodes: Vec<GeneratedNode>,
}

/// One in-progress node inside a generated document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratedNode {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    #[serde(rename = "parentId", default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub predictions: Vec<String>,
}

/// Parse a (possibly incomplete) completion buffer into a document.
///
/// Returns `None` when the buffer is not yet parsable — the signal to
/// wait for more data. Every successful parse of a longer buffer yields
/// string fields that extend the previous parse's, which is what makes
/// suffix diffing sound.
pub fn parse_partial(raw: &str) -> Option<GeneratedDoc> {
    let raw = raw.trim_start();
    if raw.is_empty() {
        return None;
    }
    if let Ok(doc) = serde_json::from_str(raw) {
        return Some(doc);
    }
    let completed = complete_fragment(raw)?;
    serde_json::from_str(&completed).ok()
}

#[derive(Clone, Copy, PartialEq)]
enum Ctx {
    Obj,
    Arr,
}

/// Close a truncated JSON fragment.
///
/// Single pass tracking string/escape state and the bracket stack.
/// `good_len` marks the longest prefix that ends cleanly after a complete
/// value or a structural open; anything after it that cannot be finished
/// is dropped. A string truncated in *value* position is closed instead
/// of dropped — that is what turns a half-streamed text field into a
/// usable prefix.
fn complete_fragment(raw: &str) -> Option<String> {
    let mut stack: Vec<Ctx> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut string_is_value = false;
    // Whether the next token in the current context is a value (vs. an
    // object key).
    let mut expect_value = true;
    let mut good_len = 0usize;

    for (i, c) in raw.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => {
                    in_string = false;
                    if string_is_value {
                        good_len = i + c.len_utf8();
                        expect_value = false;
                    }
                }
                _ => {}
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                string_is_value = expect_value;
            }
            '{' => {
                stack.push(Ctx::Obj);
                expect_value = false;
                good_len = i + 1;
            }
            '[' => {
                stack.push(Ctx::Arr);
                expect_value = true;
                good_len = i + 1;
            }
            '}' | ']' => {
                stack.pop()?;
                expect_value = false;
                good_len = i + 1;
            }
            ':' => expect_value = true,
            // The value before a comma is complete; the comma itself is
            // dropped if nothing follows it.
            ',' => {
                good_len = i;
                expect_value = matches!(stack.last(), Some(Ctx::Arr));
            }
            _ => {
                // Bare primitive (number / true / false / null). Without a
                // trailing delimiter we cannot know it is finished, so it
                // only survives via the delimiter branches above.
            }
        }
    }

    let mut out: String;
    if in_string && string_is_value {
        // Close the truncated value string, dropping any half escape.
        out = trim_partial_escape(raw).to_string();
        out.push('"');
    } else {
        out = raw[..good_len].trim_end().trim_end_matches(',').to_string();
    }

    // The brackets still open at `good_len` are exactly the ones still
    // open at the end: every push/pop also advanced `good_len`.
    for ctx in stack.iter().rev() {
        out.push(match ctx {
            Ctx::Obj => '}',
            Ctx::Arr => ']',
        });
    }

    if out.is_empty() { None } else { Some(out) }
}

/// Strip a trailing incomplete escape sequence (`\` or `\uXX…`) so the
/// string can be closed.
fn trim_partial_escape(s: &str) -> &str {
    // Trailing lone backslash (odd run of backslashes).
    let trailing_backslashes = s.chars().rev().take_while(|&c| c == '\\').count();
    if trailing_backslashes % 2 == 1 {
        return &s[..s.len() - 1];
    }
    // Trailing `\u` with fewer than four hex digits.
    let bytes = s.as_bytes();
    for hex_len in 0..4usize {
        let Some(u_pos) = s.len().checked_sub(hex_len + 1) else {
            continue;
        };
        if bytes[u_pos] == b'u'
            && u_pos > 0
            && bytes[u_pos - 1] == b'\\'
            && s[u_pos + 1..].bytes().all(|b| b.is_ascii_hexdigit())
        {
            // Only a real escape if the backslash run before `u` is odd.
            let run = s[..u_pos].chars().rev().take_while(|&c| c == '\\').count();
            if run % 2 == 1 {
                return &s[..u_pos - 1];
            }
        }
    }
    s
}
