// Query Results and Statement Handling
// Result types handed to callers, statement classification and splitting

use crate::db::traits::{Row, RowSet};
use serde::{Deserialize, Serialize};

/// Result of a data query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    /// More rows existed beyond the requested cap
    pub truncated: bool,
}

impl From<RowSet> for QueryResult {
    fn from(set: RowSet) -> Self {
        Self {
            row_count: set.rows.len(),
            columns: set.columns,
            rows: set.rows,
            truncated: set.truncated,
        }
    }
}

/// Result of a mutating statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonQueryResult {
    pub rows_affected: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionResult {
    Query(QueryResult),
    NonQuery(NonQueryResult),
}

impl ExecutionResult {
    pub fn as_query(&self) -> Option<&QueryResult> {
        match self {
            ExecutionResult::Query(result) => Some(result),
            ExecutionResult::NonQuery(_) => None,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            ExecutionResult::NonQuery(result) => Some(result.rows_affected),
            ExecutionResult::Query(_) => None,
        }
    }
}

/// Outcome of one statement in a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    pub statement: String,
    pub result: Option<ExecutionResult>,
    pub error: Option<String>,
}

impl StatementResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of a multi-statement script, executed until the first error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiStatementResult {
    pub results: Vec<StatementResult>,
    /// Every statement ran
    pub completed: bool,
    pub error_index: Option<usize>,
}

impl MultiStatementResult {
    pub fn has_error(&self) -> bool {
        self.error_index.is_some()
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.success()).count()
    }

    pub fn query_results(&self) -> Vec<&QueryResult> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().and_then(ExecutionResult::as_query))
            .collect()
    }
}

/// Leading keywords of statements that return rows
const DATA_QUERY_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "PRAGMA", "VALUES", "TABLE",
];

/// Skips leading whitespace, `--` line comments and `/* */` block comments
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |idx| &comment[idx + 1..]);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.find("*/").map_or("", |idx| &comment[idx + 2..]);
        } else {
            return rest;
        }
    }
}

/// Whether a statement returns rows and goes through the row-limited path
pub fn is_select_query(sql: &str) -> bool {
    let body = strip_leading_comments(sql).trim_start_matches(|c: char| c == '(' || c.is_whitespace());
    let keyword: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    DATA_QUERY_KEYWORDS.contains(&keyword.as_str())
}

/// Split SQL text into individual statements.
///
/// Separators are semicolons and the `GO` batch keyword on its own line,
/// ignored inside string literals, quoted identifiers and comments. Text
/// without either separator is split on blank lines instead. Pieces that
/// hold nothing but comments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }
    let (statements, separated) = scan_statements(sql, false);
    if separated {
        statements
    } else {
        scan_statements(sql, true).0
    }
}

#[derive(Default)]
struct ScanState {
    in_single: bool,
    in_double: bool,
    in_block_comment: bool,
}

impl ScanState {
    fn at_boundary(&self) -> bool {
        !self.in_single && !self.in_double && !self.in_block_comment
    }
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let stmt = current.trim();
    if !strip_leading_comments(stmt).is_empty() {
        statements.push(stmt.to_string());
    }
    current.clear();
}

/// Returns the statements and whether any separator was seen
fn scan_statements(sql: &str, split_on_blank_lines: bool) -> (Vec<String>, bool) {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = ScanState::default();
    let mut separated = false;

    for line in sql.lines() {
        let trimmed = line.trim();

        if state.at_boundary() {
            if trimmed.eq_ignore_ascii_case("go") {
                push_statement(&mut statements, &mut current);
                separated = true;
                continue;
            }
            if split_on_blank_lines && trimmed.is_empty() {
                push_statement(&mut statements, &mut current);
                continue;
            }
        }

        let mut chars = line.chars().peekable();
        while let Some(ch) = chars.next() {
            if state.in_block_comment {
                current.push(ch);
                if ch == '*' && chars.peek() == Some(&'/') {
                    current.push('/');
                    chars.next();
                    state.in_block_comment = false;
                }
                continue;
            }

            if state.in_single || state.in_double {
                current.push(ch);
                let quote = if state.in_single { '\'' } else { '"' };
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else if ch == quote {
                    // doubled quote stays inside the literal
                    if chars.peek() == Some(&quote) {
                        current.push(quote);
                        chars.next();
                    } else if state.in_single {
                        state.in_single = false;
                    } else {
                        state.in_double = false;
                    }
                }
                continue;
            }

            match ch {
                '\'' => {
                    state.in_single = true;
                    current.push(ch);
                }
                '"' => {
                    state.in_double = true;
                    current.push(ch);
                }
                '-' if chars.peek() == Some(&'-') => {
                    // rest of the line is a comment
                    current.push(ch);
                    current.extend(chars.by_ref());
                }
                '/' if chars.peek() == Some(&'*') => {
                    current.push_str("/*");
                    chars.next();
                    state.in_block_comment = true;
                }
                ';' => {
                    push_statement(&mut statements, &mut current);
                    separated = true;
                }
                _ => current.push(ch),
            }
        }
        current.push('\n');
    }

    push_statement(&mut statements, &mut current);
    (statements, separated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::traits::CellValue;

    #[test]
    fn test_is_select_query() {
        assert!(is_select_query("SELECT 1"));
        assert!(is_select_query("  select * from t"));
        assert!(is_select_query("-- header\n/* block */\nWITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(is_select_query("(SELECT 1) UNION (SELECT 2)"));
        assert!(is_select_query("PRAGMA table_info(users)"));
        assert!(is_select_query("show tables"));

        assert!(!is_select_query("INSERT INTO t VALUES (1)"));
        assert!(!is_select_query("-- SELECT\nDELETE FROM t"));
        assert!(!is_select_query("SELECTED"));
        assert!(!is_select_query(""));
        assert!(!is_select_query("/* unterminated SELECT"));
    }

    #[test]
    fn test_split_on_semicolons() {
        let statements = split_statements("INSERT INTO t VALUES (1); SELECT * FROM t;");
        assert_eq!(statements, vec!["INSERT INTO t VALUES (1)", "SELECT * FROM t"]);
    }

    #[test]
    fn test_split_ignores_semicolons_in_literals_and_comments() {
        let sql = "SELECT 'a;b', \"c;d\" FROM t; -- trailing; comment\nSELECT 'it''s;' /* x; y */ FROM u";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "SELECT 'a;b', \"c;d\" FROM t");
        assert!(statements[1].starts_with("-- trailing; comment\nSELECT 'it''s;'"));
        assert!(statements[1].ends_with("/* x; y */ FROM u"));
    }

    #[test]
    fn test_split_on_go_batches() {
        let sql = "CREATE TABLE t (id INT)\nGO\nINSERT INTO t VALUES (1)\ngo\n";
        assert_eq!(
            split_statements(sql),
            vec!["CREATE TABLE t (id INT)", "INSERT INTO t VALUES (1)"]
        );
    }

    #[test]
    fn test_split_on_blank_lines_without_semicolons() {
        let sql = "SELECT 1\n\n  \nSELECT 'a\n\nb'\n\nSELECT 3";
        assert_eq!(split_statements(sql), vec!["SELECT 1", "SELECT 'a\n\nb'", "SELECT 3"]);
    }

    #[test]
    fn test_split_drops_empty_and_comment_only_pieces() {
        assert!(split_statements("   ").is_empty());
        assert_eq!(split_statements(";;SELECT 1;; -- done"), vec!["SELECT 1"]);
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
    }

    #[test]
    fn test_multi_statement_summary() {
        let query = QueryResult::from(RowSet {
            columns: vec!["n".into()],
            rows: vec![vec![CellValue::Int(1)]],
            truncated: false,
        });
        assert_eq!(query.row_count, 1);

        let summary = MultiStatementResult {
            results: vec![
                StatementResult {
                    statement: "SELECT 1".into(),
                    result: Some(ExecutionResult::Query(query)),
                    error: None,
                },
                StatementResult {
                    statement: "BROKEN".into(),
                    result: None,
                    error: Some("syntax error".into()),
                },
            ],
            completed: false,
            error_index: Some(1),
        };
        assert!(summary.has_error());
        assert_eq!(summary.successful_count(), 1);
        assert_eq!(summary.query_results().len(), 1);
    }
}
