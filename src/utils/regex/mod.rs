use regex::Regex;
use std::sync::LazyLock;

/// Compiled regex patterns that are reused across the codebase
pub struct RegexPatterns;

impl RegexPatterns {
    /// Feishu mention placeholders in group messages (`@_user_1`), plus trailing whitespace
    pub fn feishu_mention() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"@_user_\d+\s*").expect("Failed to compile Feishu mention regex")
        });
        &RE
    }

    /// Markdown table: header row, separator row, then one or more data rows
    pub fn markdown_table() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"(?m)((?:^[ \t]*\|.+\|[ \t]*\n)(?:^[ \t]*\|[-:\s|]+\|[ \t]*\n)(?:^[ \t]*\|.+\|[ \t]*\n?)+)",
            )
            .expect("Failed to compile markdown table regex")
        });
        &RE
    }

    /// Markdown headings, levels 1 to 4
    pub fn markdown_heading() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?m)^#{1,4}\s+(.+)$").expect("Failed to compile markdown heading regex")
        });
        &RE
    }

    /// Model-specific special tokens such as `<|begin_of_box|>`
    pub fn model_special_token() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"<\|[a-z_]+\|>").expect("Failed to compile special token regex")
        });
        &RE
    }
}

/// Remove every Feishu mention placeholder and trim the result.
pub fn strip_feishu_mentions(text: &str) -> String {
    RegexPatterns::feishu_mention()
        .replace_all(text, "")
        .trim()
        .to_string()
}
