use carebridge_common::UnknownVariant;
use sqlx::postgres::{PgArguments, PgRow};

use crate::domain::RepositoryError;
use crate::infrastructure::persistence::query::SqlParameter;

mod links;
mod posts;
pub mod query;
mod requests;
pub mod schema;

pub use links::PostgresInstitutionLinkRepository;
pub use posts::PostgresPostRepository;
pub use requests::PostgresLinkRequestRepository;

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::UniqueViolation(db.message().to_string())
            }
            other => RepositoryError::DatabaseError(other.to_string()),
        }
    }
}

impl From<UnknownVariant> for RepositoryError {
    fn from(e: UnknownVariant) -> Self {
        RepositoryError::DatabaseError(format!("corrupt row: {}", e))
    }
}

/// Builds a sqlx query with the builder's parameters bound in order
fn bound_query(sql: &str, params: Vec<SqlParameter>) -> sqlx::query::Query<'_, sqlx::Postgres, PgArguments> {
    tracing::debug!(sql, "generated query");
    params
        .into_iter()
        .fold(sqlx::query(sql), |query, param| param.bind_to_query(query))
}

/// Maps one database row to a domain entity
trait FromRow: Sized {
    fn from_row(row: &PgRow) -> Result<Self, RepositoryError>;
}

fn from_rows<T: FromRow>(rows: Vec<PgRow>) -> Result<Vec<T>, RepositoryError> {
    rows.iter().map(T::from_row).collect()
}

/// `"a", "b", ...` for a RETURNING or SELECT list without table alias
fn plain_columns(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("\"{}\"", column))
        .collect::<Vec<_>>()
        .join(", ")
}
