//! Template compilation with safe variable substitution.
//!
//! Placeholders take the form `$identifier` or `${identifier}`, with `$$`
//! as a literal-dollar escape. Substitution is *safe*: a placeholder with
//! no matching variable is left in the output unchanged,
//! character-for-character. This operation never fails.
//!
//! No other templating features exist — no conditionals, loops, or nested
//! templates.

use kiln_core::PromptRecord;
use std::collections::HashMap;

/// Render a record's system body with the given variables.
///
/// An empty variable map returns the body verbatim (no escape processing).
pub fn compile(record: &PromptRecord, variables: &HashMap<String, String>) -> String {
    if variables.is_empty() {
        return record.system.clone();
    }
    substitute(&record.system, variables)
}

/// Single-pass scanner over the template body.
///
/// Identifiers are ASCII (`[A-Za-z_][A-Za-z0-9_]*`), so all slicing below
/// lands on char boundaries; non-placeholder text is copied through
/// untouched, multi-byte characters included.
fn substitute(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            let next = input[i..].find('$').map_or(bytes.len(), |o| i + o);
            out.push_str(&input[i..next]);
            i = next;
            continue;
        }

        if i + 1 >= bytes.len() {
            out.push('$');
            break;
        }

        match bytes[i + 1] {
            b'$' => {
                out.push('$');
                i += 2;
            }
            b'{' => {
                let braced = input[i + 2..]
                    .find('}')
                    .map(|close| &input[i + 2..i + 2 + close])
                    .filter(|ident| is_identifier(ident));
                match braced {
                    Some(ident) => {
                        match vars.get(ident) {
                            Some(value) => out.push_str(value),
                            None => out.push_str(&input[i..i + ident.len() + 3]),
                        }
                        i += ident.len() + 3;
                    }
                    None => {
                        out.push('$');
                        i += 1;
                    }
                }
            }
            _ => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_ident_byte(bytes[end], end == start) {
                    end += 1;
                }
                if end > start {
                    let ident = &input[start..end];
                    match vars.get(ident) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&input[i..end]),
                    }
                    i = end;
                } else {
                    out.push('$');
                    i += 1;
                }
            }
        }
    }

    out
}

fn is_ident_byte(c: u8, first: bool) -> bool {
    c == b'_' || c.is_ascii_alphabetic() || (!first && c.is_ascii_digit())
}

fn is_identifier(s: &str) -> bool {
    let bytes = s.as_bytes();
    !bytes.is_empty()
        && bytes
            .iter()
            .enumerate()
            .all(|(i, &c)| is_ident_byte(c, i == 0))
}
