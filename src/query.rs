//! Construction of the projecting rebuild statement.
//!
//! Column names are interpolated without quoting, so they must be plain
//! identifiers and not reserved keywords. Dataset and table ids sit inside backticks and may not
//! contain quotes, backticks, dots, or whitespace. Everything is validated
//! in [`RebuildQuery::new`]; a value of this type always renders safe SQL.

use std::{collections::HashSet, fmt, sync::OnceLock};

use itertools::Itertools;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{kind} identifier '{value}' {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("projection must name at least one column")]
    EmptyProjection,
    #[error("column '{0}' appears more than once in the projection")]
    DuplicateColumn(String),
    #[error("unsupported statement: {0}")]
    Unsupported(String),
}

fn column_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid column regex"))
}

fn statement_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?s)^\s*CREATE OR REPLACE TABLE `([^`]+)` AS SELECT (.+) FROM `([^`]+)`\s*;?\s*$",
        )
        .expect("valid statement regex")
    })
}

/// Reserved keywords of the warehouse SQL dialect, uppercase and sorted.
const RESERVED_KEYWORDS: &[&str] = &[
    "ALL", "AND", "ANY", "ARRAY", "AS", "ASC", "ASSERT_ROWS_MODIFIED", "AT", "BETWEEN", "BY",
    "CASE", "CAST", "COLLATE", "CONTAINS", "CREATE", "CROSS", "CUBE", "CURRENT", "DEFAULT",
    "DEFINE", "DESC", "DISTINCT", "ELSE", "END", "ENUM", "ESCAPE", "EXCEPT", "EXCLUDE", "EXISTS",
    "EXTRACT", "FALSE", "FETCH", "FOLLOWING", "FOR", "FROM", "FULL", "GROUP", "GROUPING",
    "GROUPS", "HASH", "HAVING", "IF", "IGNORE", "IN", "INNER", "INTERSECT", "INTERVAL", "INTO",
    "IS", "JOIN", "LATERAL", "LEFT", "LIKE", "LIMIT", "LOOKUP", "MERGE", "NATURAL", "NEW", "NO",
    "NOT", "NULL", "NULLS", "OF", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRECEDING",
    "PROTO", "QUALIFY", "RANGE", "RECURSIVE", "RESPECT", "RIGHT", "ROLLUP", "ROWS", "SELECT",
    "SET", "SOME", "STRUCT", "TABLESAMPLE", "THEN", "TO", "TREAT", "TRUE", "UNBOUNDED", "UNION",
    "UNNEST", "USING", "WHEN", "WHERE", "WINDOW", "WITH", "WITHIN",
];

fn is_reserved(name: &str) -> bool {
    RESERVED_KEYWORDS
        .binary_search(&name.to_ascii_uppercase().as_str())
        .is_ok()
}

fn has_quote(value: &str) -> bool {
    value.contains(['\'', '"', '`'])
}

pub fn validate_column(name: &str) -> Result<(), QueryError> {
    let reason = if name.is_empty() {
        "is empty"
    } else if has_quote(name) {
        "contains a quote or backtick"
    } else if !column_pattern().is_match(name) {
        "must start with a letter or underscore and contain only letters, digits, and underscores"
    } else if is_reserved(name) {
        "is a reserved keyword"
    } else {
        return Ok(());
    };
    Err(QueryError::InvalidIdentifier {
        kind: "column",
        value: name.to_string(),
        reason,
    })
}

pub fn validate_table_part(kind: &'static str, value: &str) -> Result<(), QueryError> {
    let reason = if value.is_empty() {
        "is empty"
    } else if has_quote(value) {
        "contains a quote or backtick"
    } else if value.contains('.') || value.chars().any(char::is_whitespace) {
        "must not contain dots or whitespace"
    } else {
        return Ok(());
    };
    Err(QueryError::InvalidIdentifier {
        kind,
        value: value.to_string(),
        reason,
    })
}

/// `CREATE OR REPLACE TABLE` over a projection of the same table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildQuery {
    dataset: String,
    table: String,
    projection: Vec<String>,
}

impl RebuildQuery {
    pub fn new<I, S>(dataset: &str, table: &str, projection: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_table_part("dataset", dataset)?;
        validate_table_part("table", table)?;
        let projection = projection.into_iter().map(Into::into).collect::<Vec<String>>();
        if projection.is_empty() {
            return Err(QueryError::EmptyProjection);
        }
        let mut seen = HashSet::with_capacity(projection.len());
        for column in &projection {
            validate_column(column)?;
            if !seen.insert(column.as_str()) {
                return Err(QueryError::DuplicateColumn(column.clone()));
            }
        }
        Ok(Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
            projection,
        })
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    pub fn to_sql(&self) -> String {
        let target = format!("`{}.{}`", self.dataset, self.table);
        format!(
            "CREATE OR REPLACE TABLE {target} AS SELECT {} FROM {target}",
            self.projection.iter().join(", ")
        )
    }

    /// Parses a statement previously produced by [`RebuildQuery::to_sql`].
    pub fn parse(sql: &str) -> Result<Self, QueryError> {
        let captures = statement_pattern()
            .captures(sql)
            .ok_or_else(|| QueryError::Unsupported(sql.trim().to_string()))?;
        let target = &captures[1];
        let source = &captures[3];
        if target != source {
            return Err(QueryError::Unsupported(format!(
                "rebuild must read from its own target (`{target}` vs `{source}`)"
            )));
        }
        let (dataset, table) = target
            .split_once('.')
            .ok_or_else(|| QueryError::Unsupported(format!("`{target}` is not dataset.table")))?;
        let projection = captures[2].split(',').map(|c| c.trim().to_string());
        Self::new(dataset, table, projection)
    }
}

impl fmt::Display for RebuildQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_backticked_target_and_ordered_projection() {
        let query = RebuildQuery::new("ds", "tbl", ["name", "score"]).expect("query");
        assert_eq!(
            query.to_sql(),
            "CREATE OR REPLACE TABLE `ds.tbl` AS SELECT name, score FROM `ds.tbl`"
        );
    }

    #[test]
    fn rejects_quotes_and_backticks_in_columns() {
        for bad in ["a`b", "a'b", "a\"b"] {
            let err = RebuildQuery::new("ds", "tbl", [bad]).unwrap_err();
            assert!(matches!(
                err,
                QueryError::InvalidIdentifier { reason: "contains a quote or backtick", .. }
            ));
        }
    }

    #[test]
    fn rejects_injection_through_projection_separators() {
        let err = RebuildQuery::new("ds", "tbl", ["a FROM x; DROP TABLE y --"]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { kind: "column", .. }));
    }

    #[test]
    fn rejects_reserved_keywords_in_any_case() {
        for bad in ["order", "FROM", "Group"] {
            let err = RebuildQuery::new("ds", "tbl", ["id", bad]).unwrap_err();
            assert!(matches!(
                err,
                QueryError::InvalidIdentifier { reason: "is a reserved keyword", .. }
            ));
        }
        assert!(RebuildQuery::new("ds", "tbl", ["order_id", "from_date"]).is_ok());
    }

    #[test]
    fn reserved_keyword_table_is_sorted_uppercase() {
        assert!(RESERVED_KEYWORDS.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(
            RESERVED_KEYWORDS
                .iter()
                .all(|word| *word == word.to_ascii_uppercase())
        );
    }

    #[test]
    fn rejects_bad_table_parts() {
        assert!(RebuildQuery::new("d`s", "tbl", ["a"]).is_err());
        assert!(RebuildQuery::new("ds", "a.b", ["a"]).is_err());
        assert!(RebuildQuery::new("", "tbl", ["a"]).is_err());
    }

    #[test]
    fn empty_and_duplicate_projections_fail() {
        assert_eq!(
            RebuildQuery::new("ds", "tbl", Vec::<String>::new()).unwrap_err(),
            QueryError::EmptyProjection
        );
        assert_eq!(
            RebuildQuery::new("ds", "tbl", ["a", "a"]).unwrap_err(),
            QueryError::DuplicateColumn("a".to_string())
        );
    }

    #[test]
    fn parse_reads_back_rendered_statement() {
        let query = RebuildQuery::new("sales", "orders", ["id", "total", "_ts"]).expect("query");
        let parsed = RebuildQuery::parse(&query.to_sql()).expect("parse");
        assert_eq!(parsed, query);
    }

    #[test]
    fn parse_rejects_other_statements() {
        assert!(matches!(
            RebuildQuery::parse("SELECT 1"),
            Err(QueryError::Unsupported(_))
        ));
        assert!(RebuildQuery::parse(
            "CREATE OR REPLACE TABLE `a.b` AS SELECT x FROM `a.c`"
        )
        .is_err());
    }
}
