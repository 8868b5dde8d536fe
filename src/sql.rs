//! SQL statement construction
//!
//! Deterministic builders for the statements the transaction handle
//! issues on behalf of callers. Identifiers are double-quoted, values
//! travel as positional parameters (`$1`, `$2`, ...), and column order
//! follows the caller's field order so the produced SQL is stable.

use crate::error::QueryError;
use crate::value::SqlValue;
use async_trait::async_trait;

/// Quote an identifier for Postgres, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn placeholders(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("${}", n)).collect()
}

/// Build a deterministic INSERT statement from a field mapping.
pub fn insert_statement(table: &str, fields: &[(&str, SqlValue)]) -> (String, Vec<SqlValue>) {
    let columns: Vec<String> = fields.iter().map(|(name, _)| quote_ident(name)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders(fields.len()).join(", ")
    );
    let params = fields.iter().map(|(_, value)| value.clone()).collect();
    (sql, params)
}

/// Build an UPDATE statement with parameterized SET pairs and an optional
/// raw WHERE clause.
pub fn update_statement(
    table: &str,
    set: &[(&str, SqlValue)],
    where_clause: Option<&str>,
) -> (String, Vec<SqlValue>) {
    let assignments: Vec<String> = set
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{} = ${}", quote_ident(name), i + 1))
        .collect();
    let mut sql = format!(
        "UPDATE {} SET {}",
        quote_ident(table),
        assignments.join(", ")
    );
    if let Some(clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    let params = set.iter().map(|(_, value)| value.clone()).collect();
    (sql, params)
}

/// Build a DELETE statement with an optional raw WHERE clause.
pub fn delete_statement(table: &str, where_clause: Option<&str>) -> String {
    match where_clause {
        Some(clause) => format!("DELETE FROM {} WHERE {}", quote_ident(table), clause),
        None => format!("DELETE FROM {}", quote_ident(table)),
    }
}

/// Insert-or-update statement builder collaborator
///
/// The coordinator only requires the produced `(sql, params)` pair; how
/// the statement resolves conflicts is the builder's business.
#[async_trait]
pub trait UpsertBuilder: Send + Sync {
    /// Build the upsert statement for `table`, inserting `fields` and
    /// reconciling on `conflict_target`.
    async fn build(
        &self,
        table: &str,
        fields: &[(&str, SqlValue)],
        conflict_target: &[&str],
    ) -> Result<(String, Vec<SqlValue>), QueryError>;
}

/// Default Postgres upsert builder using `ON CONFLICT ... DO UPDATE`
///
/// Every non-conflict column is updated from `EXCLUDED`; if the conflict
/// target covers every field the statement degrades to `DO NOTHING`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnConflictUpdate;

#[async_trait]
impl UpsertBuilder for OnConflictUpdate {
    async fn build(
        &self,
        table: &str,
        fields: &[(&str, SqlValue)],
        conflict_target: &[&str],
    ) -> Result<(String, Vec<SqlValue>), QueryError> {
        if conflict_target.is_empty() {
            return Err(QueryError::new("upsert requires a conflict target"));
        }
        for key in conflict_target {
            if !fields.iter().any(|(name, _)| name == key) {
                return Err(QueryError::new(format!(
                    "conflict target column {} is not in the field list",
                    key
                )));
            }
        }

        let (insert_sql, params) = insert_statement(table, fields);
        let target: Vec<String> = conflict_target.iter().map(|c| quote_ident(c)).collect();
        let updates: Vec<String> = fields
            .iter()
            .filter(|(name, _)| !conflict_target.contains(name))
            .map(|(name, _)| format!("{} = EXCLUDED.{}", quote_ident(name), quote_ident(name)))
            .collect();

        let sql = if updates.is_empty() {
            format!("{} ON CONFLICT ({}) DO NOTHING", insert_sql, target.join(", "))
        } else {
            format!(
                "{} ON CONFLICT ({}) DO UPDATE SET {}",
                insert_sql,
                target.join(", "),
                updates.join(", ")
            )
        };
        Ok((sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserves_field_order() {
        let (sql, params) = insert_statement(
            "pets",
            &[("name", SqlValue::from("bar")), ("legs", SqlValue::I64(4))],
        );
        assert_eq!(
            sql,
            r#"INSERT INTO "pets" ("name", "legs") VALUES ($1, $2)"#
        );
        assert_eq!(params, vec![SqlValue::from("bar"), SqlValue::I64(4)]);
    }

    #[test]
    fn identifiers_with_quotes_are_doubled() {
        let (sql, _) = insert_statement("odd\"name", &[("a", SqlValue::I64(1))]);
        assert!(sql.starts_with(r#"INSERT INTO "odd""name""#));
    }

    #[test]
    fn update_numbers_placeholders_from_one() {
        let (sql, params) = update_statement(
            "pets",
            &[("name", SqlValue::from("wombat")), ("legs", SqlValue::I64(4))],
            Some(r#""id" = 7"#),
        );
        assert_eq!(
            sql,
            r#"UPDATE "pets" SET "name" = $1, "legs" = $2 WHERE "id" = 7"#
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn delete_without_where_covers_the_table() {
        assert_eq!(delete_statement("pets", None), r#"DELETE FROM "pets""#);
    }

    #[tokio::test]
    async fn upsert_updates_non_conflict_columns() {
        let (sql, params) = OnConflictUpdate
            .build(
                "pets",
                &[("id", SqlValue::I64(1)), ("name", SqlValue::from("bar"))],
                &["id"],
            )
            .await
            .unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "pets" ("id", "name") VALUES ($1, $2) ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name""#
        );
        assert_eq!(params.len(), 2);
    }

    #[tokio::test]
    async fn upsert_with_full_conflict_target_does_nothing() {
        let (sql, _) = OnConflictUpdate
            .build("pets", &[("id", SqlValue::I64(1))], &["id"])
            .await
            .unwrap();
        assert!(sql.ends_with(r#"ON CONFLICT ("id") DO NOTHING"#));
    }

    #[tokio::test]
    async fn upsert_rejects_unknown_conflict_target() {
        let err = OnConflictUpdate
            .build("pets", &[("id", SqlValue::I64(1))], &["owner"])
            .await
            .unwrap_err();
        assert!(err.message().contains("owner"));
    }
}
