//! Line-level merge of inherited configfile text.
//!
//! Override rule: a line is *keyed* when it sits outside any `{ ... }` block
//! and is a single statement of exactly two tokens, `Key Value;`, where `Key`
//! is an identifier and `Value` is one token (a quoted string or a
//! `{placeholder}` counts as one token). A keyed line from a more specific
//! configfile replaces the earlier line with the same key in place. Every
//! other line (blocks, multi-token statements such as `SnmpMibObject`,
//! comments, blank lines) is appended verbatim in chain order.
//!
//! Within a single configfile a repeated key follows the same rule: the last
//! occurrence wins and keeps the position of the first.

use std::collections::HashMap;

/// Merge texts ordered root-first into one effective text
pub fn merge_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for text in texts {
        let mut depth: i32 = 0;
        for line in text.lines() {
            let key = if depth == 0 { override_key(line) } else { None };
            depth = (depth + brace_delta(line)).max(0);

            match key {
                Some(key) => match index.get(key) {
                    Some(&pos) => lines[pos] = line,
                    None => {
                        index.insert(key, lines.len());
                        lines.push(line);
                    }
                },
                None => lines.push(line),
            }
        }
    }

    lines.join("\n")
}

/// Override key of a line, if the line is a keyed `Key Value;` statement
pub fn override_key(line: &str) -> Option<&str> {
    let stmt = line.trim().strip_suffix(';')?.trim_end();
    if brace_delta(stmt) != 0 || stmt.contains(';') {
        return None;
    }

    let tokens = tokenize(stmt);
    if tokens.len() != 2 {
        return None;
    }

    let key = tokens[0];
    let mut chars = key.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(key)
}

/// Split on whitespace, keeping quoted strings together
fn tokenize(stmt: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_quotes = false;

    for (i, c) in stmt.char_indices() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                if start.is_none() {
                    start = Some(i);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if let Some(s) = start.take() {
                    tokens.push(&stmt[s..i]);
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }
    if let Some(s) = start {
        tokens.push(&stmt[s..]);
    }
    tokens
}

/// Net block depth change of a line. Braces inside quotes and
/// `{placeholder}` markers do not open blocks.
fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '"' => in_quotes = !in_quotes,
            '{' if !in_quotes => {
                // placeholder: `{name}` without whitespace or nested braces
                let close = chars[i + 1..]
                    .iter()
                    .position(|c| *c == '}' || *c == '{' || c.is_whitespace());
                match close {
                    Some(off) if off > 0 && chars[i + 1 + off] == '}' => i += off + 1,
                    _ => delta += 1,
                }
            }
            '}' if !in_quotes => delta -= 1,
            _ => {}
        }
        i += 1;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_key() {
        assert_eq!(override_key("MaxCPE 4;"), Some("MaxCPE"));
        assert_eq!(override_key("  NetworkAccess 1 ;"), Some("NetworkAccess"));
        assert_eq!(override_key("SwUpgradeFilename \"fw 1.bin\";"), Some("SwUpgradeFilename"));
        assert_eq!(override_key("MaxCPE {cpe_count};"), Some("MaxCPE"));
        assert_eq!(override_key("SnmpMibObject sysContact.0 String \"x\";"), None);
        assert_eq!(override_key("UsServiceFlow {"), None);
        assert_eq!(override_key("MaxCPE 4"), None);
        assert_eq!(override_key("/* MaxCPE 4; */"), None);
        assert_eq!(override_key(""), None);
    }

    #[test]
    fn test_brace_delta() {
        assert_eq!(brace_delta("UsServiceFlow {"), 1);
        assert_eq!(brace_delta("}"), -1);
        assert_eq!(brace_delta("MaxRateSustained {rate};"), 0);
        assert_eq!(brace_delta("SnmpMibObject x String \"{\";"), 0);
    }

    #[test]
    fn test_merge_keeps_blocks_verbatim() {
        let root = "NetworkAccess 1;\nUsServiceFlow {\n\tQosParamSetType 7;\n}";
        let leaf = "QosParamSetType 1;";
        let merged = merge_texts([root, leaf]);
        // block-internal line is not an override target, so the leaf line is appended
        assert_eq!(
            merged,
            "NetworkAccess 1;\nUsServiceFlow {\n\tQosParamSetType 7;\n}\nQosParamSetType 1;"
        );
    }

    #[test]
    fn test_merge_multi_token_lines_append() {
        let root = "SnmpMibObject sysContact.0 String \"a\";";
        let leaf = "SnmpMibObject sysContact.0 String \"b\";";
        assert_eq!(merge_texts([root, leaf]), format!("{}\n{}", root, leaf));
    }

    #[test]
    fn test_merge_override_keeps_position() {
        let merged = merge_texts(["A 1;\nB 2;\nC 3;", "B 20;", "A 10;\nD 4;"]);
        assert_eq!(merged, "A 10;\nB 20;\nC 3;\nD 4;");
    }

    #[test]
    fn test_merge_duplicate_key_in_same_text() {
        assert_eq!(merge_texts(["A 1;\nA 2;"]), "A 2;");
    }
}
