//! Statement classification and multi-statement splitting.
//!
//! Both routines only look at the lexical surface of the SQL text: leading
//! comments and whitespace are skipped for classification, and the splitter
//! tracks string literals, quoted identifiers, dollar quoting and comments so
//! that semicolons inside them never terminate a statement.

use phf::phf_map;

use super::types::StatementKind;

/// Leading keywords with a known statement kind. `WITH` is treated as a
/// query since common-table expressions in the editor overwhelmingly front
/// read queries; everything not listed here takes the DDL pass-through path.
static LEADING_KEYWORDS: phf::Map<&'static str, StatementKind> = phf_map! {
    "select" => StatementKind::Select,
    "with" => StatementKind::Select,
    "values" => StatementKind::Select,
    "table" => StatementKind::Select,
    "explain" => StatementKind::Select,
    "show" => StatementKind::Select,
    "insert" => StatementKind::Insert,
    "update" => StatementKind::Update,
    "delete" => StatementKind::Delete,
};

/// Determines the statement kind from the first keyword of the text.
///
/// Leading whitespace, `--` line comments and (nested) `/* */` block
/// comments are skipped before the keyword is read.
pub fn classify(sql: &str) -> StatementKind {
    let rest = skip_leading_trivia(sql);
    let keyword: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();

    LEADING_KEYWORDS
        .get(keyword.as_str())
        .copied()
        .unwrap_or(StatementKind::Ddl)
}

/// Skips whitespace and comments at the start of `sql`, returning the
/// remaining text.
fn skip_leading_trivia(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(pos) => &after[pos + 1..],
                None => "",
            };
        } else if trimmed.starts_with("/*") {
            rest = match find_block_comment_end(trimmed) {
                Some(end) => &trimmed[end..],
                // Unterminated comment, nothing classifiable follows.
                None => "",
            };
        } else {
            return trimmed;
        }
    }
}

/// Returns the byte offset just past the block comment opening at the start
/// of `text`, honouring nesting per PostgreSQL rules.
fn find_block_comment_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match &bytes[i..i + 2] {
            b"/*" => {
                depth += 1;
                i += 2;
            }
            b"*/" => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum LexState {
    Normal,
    LineComment,
    BlockComment { depth: usize },
    SingleQuote { escapes: bool },
    DoubleQuote,
    DollarQuote { tag: String },
}

/// Splits a script into individual statements on terminating semicolons.
///
/// Semicolons inside string literals (including `E''` escape strings and
/// `$tag$ … $tag$` dollar quoting), quoted identifiers and comments do not
/// split the text. Empty fragments are dropped, so a trailing semicolon does
/// not produce an empty statement.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = LexState::Normal;

    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        match &state {
            LexState::Normal => match ch {
                ';' => {
                    push_statement(&mut statements, &mut current);
                    i += 1;
                    continue;
                }
                '-' if next == Some('-') => {
                    state = LexState::LineComment;
                    current.push_str("--");
                    i += 2;
                    continue;
                }
                '/' if next == Some('*') => {
                    state = LexState::BlockComment { depth: 1 };
                    current.push_str("/*");
                    i += 2;
                    continue;
                }
                '\'' => {
                    state = LexState::SingleQuote {
                        escapes: is_escape_string_prefix(&chars, i),
                    };
                }
                '"' => state = LexState::DoubleQuote,
                '$' => {
                    if let Some(tag) = read_dollar_tag(&chars, i) {
                        current.push_str(&tag);
                        i += tag.chars().count();
                        state = LexState::DollarQuote { tag };
                        continue;
                    }
                }
                _ => {}
            },
            LexState::LineComment => {
                if ch == '\n' {
                    state = LexState::Normal;
                }
            }
            LexState::BlockComment { depth } => {
                if ch == '/' && next == Some('*') {
                    state = LexState::BlockComment { depth: depth + 1 };
                    current.push_str("/*");
                    i += 2;
                    continue;
                }
                if ch == '*' && next == Some('/') {
                    let remaining = depth - 1;
                    current.push_str("*/");
                    i += 2;
                    state = if remaining == 0 {
                        LexState::Normal
                    } else {
                        LexState::BlockComment { depth: remaining }
                    };
                    continue;
                }
            }
            LexState::SingleQuote { escapes } => {
                if *escapes && ch == '\\' {
                    current.push(ch);
                    if let Some(escaped) = next {
                        current.push(escaped);
                        i += 2;
                    } else {
                        i += 1;
                    }
                    continue;
                } else if ch == '\'' {
                    // A doubled quote re-enters the literal on the next
                    // iteration, which is equivalent for splitting purposes.
                    state = LexState::Normal;
                }
            }
            LexState::DoubleQuote => {
                if ch == '"' {
                    state = LexState::Normal;
                }
            }
            LexState::DollarQuote { tag } => {
                if ch == '$' && matches_at(&chars, i, tag) {
                    current.push_str(tag);
                    i += tag.chars().count();
                    state = LexState::Normal;
                    continue;
                }
            }
        }

        current.push(ch);
        i += 1;
    }

    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// True when the quote at `pos` opens an `E'...'` escape string, in which
/// case backslash escapes are honoured inside the literal.
fn is_escape_string_prefix(chars: &[char], pos: usize) -> bool {
    if pos == 0 {
        return false;
    }
    let prev = chars[pos - 1];
    if !matches!(prev, 'e' | 'E') {
        return false;
    }
    // The E must itself start the token: `table_e'x'` is an identifier
    // followed by a plain literal.
    pos < 2 || !(chars[pos - 2].is_alphanumeric() || chars[pos - 2] == '_')
}

/// Reads a `$tag$` opener at `pos`, returning it (delimiters included) when
/// the tag is a valid dollar-quote tag.
fn read_dollar_tag(chars: &[char], pos: usize) -> Option<String> {
    let mut tag = String::from('$');
    let mut i = pos + 1;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '$' {
            tag.push('$');
            return Some(tag);
        }
        let valid = if i == pos + 1 {
            ch.is_alphabetic() || ch == '_'
        } else {
            ch.is_alphanumeric() || ch == '_'
        };
        if !valid {
            return None;
        }
        tag.push(ch);
        i += 1;
    }
    None
}

fn matches_at(chars: &[char], pos: usize, tag: &str) -> bool {
    let tag_chars: Vec<char> = tag.chars().collect();
    if pos + tag_chars.len() > chars.len() {
        return false;
    }
    chars[pos..pos + tag_chars.len()] == tag_chars[..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_plain_statements() {
        assert_eq!(classify("SELECT 1"), StatementKind::Select);
        assert_eq!(classify("INSERT INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(classify("update t set a = 1"), StatementKind::Update);
        assert_eq!(classify("DELETE FROM t"), StatementKind::Delete);
        assert_eq!(classify("CREATE TABLE t(a int)"), StatementKind::Ddl);
        assert_eq!(classify("DROP TABLE t"), StatementKind::Ddl);
    }

    #[test]
    fn classifies_past_leading_comments() {
        assert_eq!(classify("-- note\nSELECT 1"), StatementKind::Select);
        assert_eq!(classify("/* header */ INSERT INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(
            classify("/* outer /* inner */ still comment */\nUPDATE t SET a = 1"),
            StatementKind::Update
        );
        assert_eq!(classify("  \n\t-- a\n-- b\nDELETE FROM t"), StatementKind::Delete);
    }

    #[test]
    fn cte_and_utility_queries_classify_as_select() {
        assert_eq!(
            classify("WITH x AS (SELECT 1) SELECT * FROM x"),
            StatementKind::Select
        );
        assert_eq!(classify("EXPLAIN SELECT 1"), StatementKind::Select);
        assert_eq!(classify("SHOW search_path"), StatementKind::Select);
    }

    #[test]
    fn unknown_keywords_default_to_ddl() {
        assert_eq!(classify("VACUUM ANALYZE t"), StatementKind::Ddl);
        assert_eq!(classify("GRANT ALL ON t TO alice"), StatementKind::Ddl);
        assert_eq!(classify(""), StatementKind::Ddl);
        assert_eq!(classify("-- only a comment"), StatementKind::Ddl);
    }

    #[test]
    fn splits_on_semicolons() {
        let parts = split_statements("SELECT 1; SELECT 2;\nSELECT 3");
        assert_eq!(parts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn trailing_semicolon_yields_no_empty_statement() {
        assert_eq!(split_statements("SELECT 1;"), vec!["SELECT 1"]);
        assert_eq!(split_statements("SELECT 1;;  ;"), vec!["SELECT 1"]);
        assert!(split_statements("  \n ").is_empty());
    }

    #[test]
    fn semicolons_inside_strings_do_not_split() {
        let parts = split_statements("SELECT 'a;b'; SELECT 'it''s; fine'");
        assert_eq!(parts, vec!["SELECT 'a;b'", "SELECT 'it''s; fine'"]);
    }

    #[test]
    fn semicolons_inside_escape_strings_do_not_split() {
        let parts = split_statements(r"SELECT E'a\';b'; SELECT 2");
        assert_eq!(parts, vec![r"SELECT E'a\';b'", "SELECT 2"]);
    }

    #[test]
    fn semicolons_inside_quoted_identifiers_do_not_split() {
        let parts = split_statements(r#"SELECT 1 AS "a;b"; SELECT 2"#);
        assert_eq!(parts, vec![r#"SELECT 1 AS "a;b""#, "SELECT 2"]);
    }

    #[test]
    fn semicolons_inside_comments_do_not_split() {
        let parts = split_statements("SELECT 1 -- trailing; note\n; SELECT 2 /* a;b */");
        assert_eq!(parts, vec!["SELECT 1 -- trailing; note", "SELECT 2 /* a;b */"]);
    }

    #[test]
    fn semicolons_inside_dollar_quotes_do_not_split() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $body$ BEGIN; END; $body$ LANGUAGE plpgsql; SELECT 1";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("BEGIN; END;"));
        assert_eq!(parts[1], "SELECT 1");
    }

    #[test]
    fn dollar_parameter_is_not_a_dollar_quote() {
        let parts = split_statements("SELECT $1; SELECT $2");
        assert_eq!(parts, vec!["SELECT $1", "SELECT $2"]);
    }
}
