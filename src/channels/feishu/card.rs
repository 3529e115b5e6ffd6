//! Markdown to interactive-card rendering.
//!
//! Cards render markdown blocks but not markdown tables or `#` headings, so
//! tables become native `table` elements and headings become bold lines.

use crate::utils::regex::RegexPatterns;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    pub tag: &'static str,
    pub name: String,
    pub display_name: String,
    pub width: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", rename_all = "lowercase")]
pub enum CardElement {
    Markdown {
        content: String,
    },
    Table {
        page_size: usize,
        columns: Vec<TableColumn>,
        rows: Vec<BTreeMap<String, String>>,
    },
}

impl CardElement {
    fn markdown(content: impl Into<String>) -> Self {
        CardElement::Markdown {
            content: content.into(),
        }
    }
}

/// Rewrite `#`..`####` headings as bold lines.
pub fn convert_headings(text: &str) -> String {
    RegexPatterns::markdown_heading()
        .replace_all(text, "**${1}**")
        .into_owned()
}

fn split_row(line: &str) -> Vec<String> {
    line.trim_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// Parse a matched markdown table (header, separator, data rows) into a table element.
pub fn parse_table(table: &str) -> Option<CardElement> {
    let lines: Vec<&str> = table
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 3 {
        return None;
    }

    let headers = split_row(lines[0]);
    let rows: Vec<Vec<String>> = lines[2..].iter().map(|l| split_row(l)).collect();
    let columns = headers
        .iter()
        .enumerate()
        .map(|(i, header)| TableColumn {
            tag: "column",
            name: format!("c{i}"),
            display_name: header.clone(),
            width: "auto",
        })
        .collect();
    let rows_out = rows
        .iter()
        .map(|row| {
            (0..headers.len())
                .map(|i| (format!("c{i}"), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();

    Some(CardElement::Table {
        page_size: rows.len() + 1,
        columns,
        rows: rows_out,
    })
}

/// Split `text` into markdown prose blocks and table blocks, in order.
pub fn build_card_elements(text: &str) -> Vec<CardElement> {
    let mut elements = Vec::new();
    let mut last_end = 0;

    for m in RegexPatterns::markdown_table().find_iter(text) {
        let before = text[last_end..m.start()].trim();
        if !before.is_empty() {
            elements.push(CardElement::markdown(convert_headings(before)));
        }
        elements.push(parse_table(m.as_str()).unwrap_or_else(|| CardElement::markdown(m.as_str())));
        last_end = m.end();
    }

    let remaining = text[last_end..].trim();
    if !remaining.is_empty() {
        elements.push(CardElement::markdown(convert_headings(remaining)));
    }

    if elements.is_empty() {
        elements.push(CardElement::markdown(convert_headings(text)));
    }
    elements
}

/// Full interactive-card body for `text`.
pub fn build_card(text: &str) -> Value {
    json!({
        "config": { "wide_screen_mode": true },
        "elements": build_card_elements(text),
    })
}
