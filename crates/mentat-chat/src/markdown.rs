// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Header-level surgery on markdown documents.
//!
//! Sections are addressed by a hierarchy of header titles (`Chapter 1 >
//! 1.1`).  A section's scope runs from its header to the next header of the
//! same or shallower level, so it includes its child sections; the
//! `__preface` sentinel narrows the target to the text between a section's
//! header and its first child header.

/// Trailing path component that targets a section's preface.
pub const PREFACE_SENTINEL: &str = "__preface";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkdownEditMode {
    /// Replace the targeted scope.
    Update,
    /// Concatenate at the end of the targeted scope.
    Append,
}

struct Header {
    line: usize,
    level: usize,
    title: String,
}

fn parse_headers(lines: &[&str]) -> Vec<Header> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(line, raw)| {
            let trimmed = raw.trim_start();
            let level = trimmed.bytes().take_while(|b| *b == b'#').count();
            if level == 0 || level > 6 {
                return None;
            }
            let title = trimmed[level..].trim();
            if title.is_empty() {
                return None;
            }
            Some(Header {
                line,
                level,
                title: title.to_string(),
            })
        })
        .collect()
}

/// Apply a section edit to `document`.  Returns the rewritten document, or
/// `None` when the addressed section does not exist (callers must then
/// leave the file untouched and surface a warning).
pub fn update_section(
    document: &str,
    section_path: &[String],
    new_content: &str,
    mode: MarkdownEditMode,
) -> Option<String> {
    let (path, is_preface) = split_preface(section_path);
    if path.is_empty() {
        return None;
    }

    let lines: Vec<&str> = document.lines().collect();
    let headers = parse_headers(&lines);

    // Resolve the path one component at a time, narrowing the scope.
    let mut scope_start = 0usize;
    let mut scope_end = lines.len();
    let mut parent_level = 0usize;
    let mut target: Option<&Header> = None;

    for component in path {
        let found = headers.iter().find(|h| {
            h.line >= scope_start && h.line < scope_end && h.level > parent_level && h.title == *component
        })?;
        scope_start = found.line + 1;
        scope_end = headers
            .iter()
            .find(|h| h.line > found.line && h.level <= found.level)
            .map(|h| h.line)
            .unwrap_or(lines.len());
        parent_level = found.level;
        target = Some(found);
    }
    let target = target?;

    // The edited region: the full scope, or just the preface (up to the
    // first child header inside the scope).
    let body_start = target.line + 1;
    let body_end = if is_preface {
        headers
            .iter()
            .find(|h| h.line >= body_start && h.line < scope_end)
            .map(|h| h.line)
            .unwrap_or(scope_end)
    } else {
        scope_end
    };

    let content = ensure_trailing_newline(new_content);
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 8);
    out.extend(lines[..body_start].iter().map(|s| s.to_string()));
    match mode {
        MarkdownEditMode::Update => {
            out.extend(content.lines().map(str::to_string));
        }
        MarkdownEditMode::Append => {
            out.extend(lines[body_start..body_end].iter().map(|s| s.to_string()));
            out.extend(content.lines().map(str::to_string));
        }
    }
    out.extend(lines[body_end..].iter().map(|s| s.to_string()));

    let mut rewritten = out.join("\n");
    rewritten.push('\n');
    Some(rewritten)
}

/// Render a fresh document for a section path that has no file yet: one
/// header per component, deepening a level each time, then the content.
pub fn render_new_document(section_path: &[String], content: &str) -> String {
    let (path, _) = split_preface(section_path);
    let mut out = String::new();
    for (depth, title) in path.iter().enumerate() {
        out.push_str(&format!("{} {title}\n", "#".repeat(depth + 1)));
    }
    out.push_str(&ensure_trailing_newline(content));
    out
}

fn split_preface(section_path: &[String]) -> (&[String], bool) {
    match section_path.last() {
        Some(last) if last == PREFACE_SENTINEL => {
            (&section_path[..section_path.len() - 1], true)
        }
        _ => (section_path, false),
    }
}

fn ensure_trailing_newline(content: &str) -> String {
    if content.ends_with('\n') {
        content.to_string()
    } else {
        format!("{content}\n")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
