//! In-memory import scripts: an ordered list of parameterized statements
//! built up front and replayed against an endpoint in one go.

use crate::error::{HarnessError, Result};
use crate::sql::{SqlEndpoint, SqlValue};

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Default)]
pub struct ImportScript {
    statements: Vec<Statement>,
    rows: u64,
}

impl ImportScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement without row accounting (DDL and the like).
    pub fn push(&mut self, sql: impl Into<String>, params: Vec<SqlValue>) {
        self.statements.push(Statement {
            sql: sql.into(),
            params,
        });
    }

    /// Append one multi-row `INSERT INTO <table> VALUES (..), (..)` statement.
    ///
    /// Every row must have the same number of columns.
    pub fn push_insert(&mut self, table: &str, rows: Vec<Vec<SqlValue>>) -> Result<()> {
        let Some(width) = rows.first().map(Vec::len) else {
            return Ok(());
        };
        if width == 0 || rows.iter().any(|r| r.len() != width) {
            return Err(HarnessError::Config(format!(
                "rows inserted into {table} must all have {width} column(s)"
            )));
        }

        let mut sql = format!("INSERT INTO {table} VALUES ");
        let mut params = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.into_iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let first = params.len() + 1;
            let placeholders: Vec<String> =
                (first..first + width).map(|n| format!("${n}")).collect();
            sql.push('(');
            sql.push_str(&placeholders.join(", "));
            sql.push(')');
            params.extend(row);
            self.rows += 1;
        }

        self.statements.push(Statement { sql, params });
        Ok(())
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Rows inserted by this script.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Execute every statement in order, stopping at the first failure.
    pub async fn apply(&self, db: &dyn SqlEndpoint) -> Result<()> {
        for stmt in &self.statements {
            db.execute(&stmt.sql, &stmt.params)
                .await
                .map_err(|e| HarnessError::sql(&stmt.sql, e))?;
        }
        tracing::debug!(
            statements = self.statements.len(),
            rows = self.rows,
            "import script applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, payload: &str) -> Vec<SqlValue> {
        vec![SqlValue::Int(id), SqlValue::Int(0), SqlValue::from(payload)]
    }

    #[test]
    fn multi_row_insert_numbers_placeholders() {
        let mut script = ImportScript::new();
        script
            .push_insert("bench.bank", vec![row(0, "a"), row(1, "b")])
            .unwrap();

        let stmt = &script.statements()[0];
        assert_eq!(
            stmt.sql,
            "INSERT INTO bench.bank VALUES ($1, $2, $3), ($4, $5, $6)"
        );
        assert_eq!(stmt.params.len(), 6);
        assert_eq!(stmt.params[3], SqlValue::Int(1));
        assert_eq!(script.rows(), 2);
    }

    #[test]
    fn ragged_rows_rejected() {
        let mut script = ImportScript::new();
        let result = script.push_insert("t", vec![row(0, "a"), vec![SqlValue::Int(1)]]);
        assert!(result.is_err());
        assert!(script.is_empty());
    }

    #[test]
    fn empty_insert_is_noop() {
        let mut script = ImportScript::new();
        script.push_insert("t", vec![]).unwrap();
        assert!(script.is_empty());
        assert_eq!(script.rows(), 0);
    }

    #[test]
    fn ddl_does_not_count_rows() {
        let mut script = ImportScript::new();
        script.push("CREATE TABLE t (id INT PRIMARY KEY)", vec![]);
        assert_eq!(script.statements().len(), 1);
        assert_eq!(script.rows(), 0);
    }
}
