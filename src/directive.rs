//! Idempotent rewriting of line-oriented daemon config directives.
//!
//! A directive is a single named setting (`PermitRootLogin yes`) inside a
//! config file such as `/etc/ssh/sshd_config`. This module offers two pure
//! text operations:
//!
//! - [`effective_value`]: resolve the value the daemon would actually use,
//!   with precedence explicit > commented hint > hard-coded daemon default.
//! - [`set_directive`]: rewrite the config so the directive holds a target
//!   value, preceded by a provenance comment recording the previous setting.
//!
//! Applying [`set_directive`] twice with the same target value yields output
//! byte-identical to applying it once: provenance blocks written by an
//! earlier run are stripped (and their recorded previous setting recovered)
//! before the new block is inserted at the same position.

use strum::Display;

/// Marker prefix of the provenance comment this tool writes.
pub const PROVENANCE_MARKER: &str = "Modified by INIQ (Previous setting:";

/// Hard-coded OpenSSH daemon defaults for the directives iniq manages.
const SSHD_DEFAULTS: &[(&str, &str)] = &[
    ("permitrootlogin", "yes"),
    ("passwordauthentication", "yes"),
];

/// Where an effective directive value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DirectiveSource {
    /// An uncommented `Name value` line.
    Explicit,
    /// Only a `#Name value` comment was present (the stock config's way of
    /// documenting the compiled-in default).
    Commented,
    /// Neither form present; value taken from the default table.
    Default,
}

/// Resolved state of one directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveState {
    pub value: Option<String>,
    pub source: DirectiveSource,
}

impl DirectiveState {
    pub fn is_explicit(&self) -> bool {
        self.source == DirectiveSource::Explicit
    }

    /// Interpret the value as an sshd boolean; `yes` enables, anything else
    /// (including `prohibit-password`) does not.
    pub fn enabled(&self) -> bool {
        matches!(self.value.as_deref(), Some("yes"))
    }
}

/// Default value for a known directive.
pub fn sshd_default(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    SSHD_DEFAULTS
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, v)| *v)
}

/// Resolve the value the daemon would use for `name` in `config`.
///
/// Scans top to bottom for the first uncommented occurrence (sshd semantics:
/// first match wins), then for the first commented occurrence, then falls
/// back to the hard-coded default table.
pub fn effective_value(config: &str, name: &str) -> DirectiveState {
    for line in config.lines() {
        if let Some(value) = directive_value(line, name) {
            return DirectiveState {
                value: Some(value.to_string()),
                source: DirectiveSource::Explicit,
            };
        }
    }
    for line in config.lines() {
        if let Some(value) = commented_directive_value(line, name) {
            return DirectiveState {
                value: Some(value.to_string()),
                source: DirectiveSource::Commented,
            };
        }
    }
    DirectiveState {
        value: sshd_default(name).map(str::to_string),
        source: DirectiveSource::Default,
    }
}

/// Rewrite `config` so that directive `name` is set to `value`.
///
/// The new two-line block (provenance comment + directive) lands where the
/// directive previously lived, or at end of file if it never existed. Blocks
/// written by earlier runs are stripped first so history comments never
/// accumulate.
pub fn set_directive(config: &str, name: &str, value: &str) -> String {
    let lines: Vec<&str> = config.lines().collect();
    let mut body: Vec<String> = Vec::with_capacity(lines.len());
    let mut previous: Option<String> = None;
    let mut insert_at: Option<usize> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        // A provenance block from an earlier run: marker comment followed by
        // the directive line we wrote. Recover the recorded previous setting
        // and drop both lines.
        if let Some(recorded) = provenance_previous(line) {
            if i + 1 < lines.len() && directive_value(lines[i + 1], name).is_some() {
                insert_at.get_or_insert(body.len());
                if previous.is_none() && recorded != "none" {
                    previous = Some(recorded.to_string());
                }
                i += 2;
                continue;
            }
        }

        // The first live occurrence becomes the previous setting; it is
        // removed from the body and replaced by the new block. Later
        // duplicates are left alone (sshd takes the first match anyway).
        if directive_value(line, name).is_some() && (insert_at.is_none() || previous.is_none()) {
            previous = Some(line.trim().to_string());
            insert_at.get_or_insert(body.len());
            i += 1;
            continue;
        }

        body.push(line.to_string());
        i += 1;
    }

    // Never found in any form: a commented occurrence still provides context
    // for the provenance comment, but the block goes to end of file.
    if insert_at.is_none() && previous.is_none() {
        previous = body
            .iter()
            .find(|l| commented_directive_value(l, name).is_some())
            .map(|l| l.trim().to_string());
    }

    let comment = format!(
        "# {} {})",
        PROVENANCE_MARKER,
        previous.as_deref().unwrap_or("none")
    );
    let directive = format!("{} {}", name, value);
    let at = insert_at.unwrap_or(body.len());
    body.insert(at, comment);
    body.insert(at + 1, directive);

    let mut out = body.join("\n");
    out.push('\n');
    out
}

/// If `line` is an uncommented `name value` directive, return the value.
fn directive_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    split_directive(trimmed, name)
}

/// If `line` is a commented-out `#name value` directive, return the value.
/// Provenance comments never match: their first token is not the directive.
fn commented_directive_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix('#')?;
    split_directive(rest.trim_start(), name)
}

/// Match `name` as the leading token (case-insensitive, sshd-style) and
/// return the remainder as the value.
fn split_directive<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    // Compare as bytes: lines may contain multibyte text, and slicing the
    // str by name.len() could land inside a character.
    let bytes = text.as_bytes();
    if bytes.len() < name.len() || !bytes[..name.len()].eq_ignore_ascii_case(name.as_bytes()) {
        return None;
    }
    let rest = &text[name.len()..];
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() || c == '=' => Some(rest[c.len_utf8()..].trim()),
        _ => None,
    }
}

/// Extract the recorded previous setting from a provenance comment line.
fn provenance_previous(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix('#')?.trim_start();
    let payload = rest.strip_prefix(PROVENANCE_MARKER)?;
    Some(payload.trim_start().strip_suffix(')')?.trim())
}
