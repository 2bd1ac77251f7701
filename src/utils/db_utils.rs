use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::{FromRow, MySqlPool};
use tracing::debug;

use crate::error::AppError;
use crate::utils::pagination::{PageQuery, Paginated};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// Binds a [`SqlValue`] onto any of sqlx's MySQL query builders.
pub trait BindSql: Sized {
    fn bind_sql(self, value: SqlValue) -> Self;

    fn bind_all(self, values: &[SqlValue]) -> Self {
        values
            .iter()
            .cloned()
            .fold(self, |query, value| query.bind_sql(value))
    }
}

macro_rules! impl_bind_sql {
    ($ty:ty $(, $gen:ident)?) => {
        impl<'q $(, $gen)?> BindSql for $ty {
            fn bind_sql(self, value: SqlValue) -> Self {
                match value {
                    SqlValue::String(v) => self.bind(v),
                    SqlValue::I64(v) => self.bind(v),
                    SqlValue::U64(v) => self.bind(v),
                    SqlValue::F64(v) => self.bind(v),
                    SqlValue::Bool(v) => self.bind(v),
                    SqlValue::Date(v) => self.bind(v),
                    SqlValue::DateTime(v) => self.bind(v),
                    SqlValue::Null => self.bind(None::<String>),
                }
            }
        }
    };
}

impl_bind_sql!(Query<'q, MySql, MySqlArguments>);
impl_bind_sql!(QueryAs<'q, MySql, O, MySqlArguments>, O);
impl_bind_sql!(QueryScalar<'q, MySql, O, MySqlArguments>, O);

/// ===============================
/// WHERE clause builder for list endpoints
/// ===============================
#[derive(Debug, Default)]
pub struct Filters {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `column = ?` when a value is present.
    pub fn eq<V: Into<SqlValue>>(&mut self, column: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(format!("{column} = ?"));
            self.values.push(v.into());
        }
        self
    }

    /// Adds a raw condition with its bound values.
    pub fn raw(&mut self, condition: &str, values: Vec<SqlValue>) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.values.extend(values);
        self
    }

    /// `LIKE %term%` across each column, OR-ed together.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
            let like = format!("%{term}%");
            let condition = columns
                .iter()
                .map(|c| format!("{c} LIKE ?"))
                .collect::<Vec<_>>()
                .join(" OR ");
            self.conditions.push(format!("({condition})"));
            self.values
                .extend(columns.iter().map(|_| SqlValue::String(like.clone())));
        }
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// ===============================
/// Partial-update target
/// ===============================
pub struct Updatable {
    pub table: &'static str,
    /// Columns a client may change. Anything else is rejected.
    pub columns: &'static [&'static str],
    /// Skip rows that sit in the recycle bin.
    pub soft_delete: bool,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn json_to_sql(value: &Value) -> Result<SqlValue, AppError> {
    Ok(match value {
        Value::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                SqlValue::Date(d)
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                SqlValue::DateTime(dt)
            } else {
                SqlValue::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::I64(i)
            } else if let Some(u) = n.as_u64() {
                SqlValue::U64(u)
            } else if let Some(f) = n.as_f64() {
                SqlValue::F64(f)
            } else {
                return Err(AppError::BadRequest("Unsupported number".into()));
            }
        }
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        _ => return Err(AppError::BadRequest("Unsupported JSON value type".into())),
    })
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
pub fn build_update_sql(
    target: &Updatable,
    payload: &Value,
    id_value: u64,
    updated_by: &str,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Payload must be a JSON object".into()))?;

    if obj.is_empty() {
        return Err(AppError::BadRequest("No fields provided for update".into()));
    }

    if let Some(unknown) = obj.keys().find(|k| !target.columns.contains(&k.as_str())) {
        return Err(AppError::BadRequest(format!(
            "Field `{unknown}` cannot be updated"
        )));
    }

    // Iterate the whitelist, not the payload, so column names never come from the client.
    let mut assignments = Vec::with_capacity(obj.len() + 1);
    let mut values = Vec::with_capacity(obj.len() + 2);
    for column in target.columns {
        if let Some(value) = obj.get(*column) {
            assignments.push(format!("{column} = ?"));
            values.push(json_to_sql(value)?);
        }
    }
    assignments.push("updated_by = ?".to_string());
    values.push(SqlValue::String(updated_by.to_string()));

    let mut sql = format!(
        "UPDATE {} SET {} WHERE id = ?",
        target.table,
        assignments.join(", ")
    );
    if target.soft_delete {
        sql.push_str(" AND deleted_at IS NULL");
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let result = sqlx::query(&update.sql)
        .bind_all(&update.values)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// ===============================
/// Paginated list query
/// ===============================
pub async fn fetch_page<T>(
    pool: &MySqlPool,
    columns: &str,
    from: &str,
    filters: &Filters,
    order_by: &str,
    page: &PageQuery,
) -> Result<Paginated<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM {from} {where_clause}");
    debug!(sql = %count_sql, "Counting rows");
    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind_all(filters.values())
        .fetch_one(pool)
        .await?;

    let data_sql =
        format!("SELECT {columns} FROM {from} {where_clause} ORDER BY {order_by} LIMIT ? OFFSET ?");
    debug!(sql = %data_sql, page = page.page(), per_page = page.per_page(), "Fetching rows");
    let data = sqlx::query_as::<_, T>(&data_sql)
        .bind_all(filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(page.wrap(data, total))
}

/// Single row by primary key. `live_only` hides soft-deleted rows.
pub async fn find_by_id<T>(
    pool: &MySqlPool,
    columns: &str,
    table: &str,
    id: u64,
    live_only: bool,
) -> Result<Option<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let live = if live_only { " AND deleted_at IS NULL" } else { "" };
    sqlx::query_as::<_, T>(&format!("SELECT {columns} FROM {table} WHERE id = ?{live}"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EMPLOYEES: Updatable = Updatable {
        table: "employees",
        columns: &["first_name", "status", "date_of_birth"],
        soft_delete: true,
    };

    #[test]
    fn builds_update_from_whitelisted_columns() {
        let update = build_update_sql(
            &EMPLOYEES,
            &json!({ "status": "inactive", "date_of_birth": "1990-04-01" }),
            9,
            "hr.admin",
        )
        .unwrap();

        assert_eq!(
            update.sql,
            "UPDATE employees SET status = ?, date_of_birth = ?, updated_by = ? \
             WHERE id = ? AND deleted_at IS NULL"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("inactive".into()),
                SqlValue::Date(NaiveDate::from_ymd_opt(1990, 4, 1).unwrap()),
                SqlValue::String("hr.admin".into()),
                SqlValue::U64(9),
            ]
        );
    }

    #[test]
    fn rejects_columns_outside_whitelist() {
        let err = build_update_sql(&EMPLOYEES, &json!({ "id": 4 }), 1, "x").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("`id`")));
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql(&EMPLOYEES, &json!({}), 1, "x").is_err());
        assert!(build_update_sql(&EMPLOYEES, &json!([1, 2]), 1, "x").is_err());
    }

    #[test]
    fn filters_compose_where_clause() {
        let mut filters = Filters::new();
        filters
            .eq("status", Some("active"))
            .eq::<u64>("site_id", None)
            .search(&["first_name", "staff_id"], Some(" ann "));

        assert_eq!(
            filters.where_clause(),
            "WHERE status = ? AND (first_name LIKE ? OR staff_id LIKE ?)"
        );
        assert_eq!(filters.values().len(), 3);
        assert_eq!(filters.values()[1], SqlValue::String("%ann%".into()));
    }

    #[test]
    fn empty_filters_produce_no_where() {
        assert_eq!(Filters::new().where_clause(), "");
    }
}
