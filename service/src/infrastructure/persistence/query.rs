use sqlx::postgres::PgArguments;
use sqlx::types::Uuid;

use crate::infrastructure::persistence::schema::{ColumnRef, Table};

/// High-level, composable select builder
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    from_table: Table<'a>,
    select: Vec<ColumnRef<'a>>,
    where_conditions: Vec<Condition<'a>>,
    order_by: Vec<OrderBy<'a>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// A where condition that will be AND'ed together
#[derive(Debug, Clone)]
pub enum Condition<'a> {
    /// field = value
    Equals {
        column: ColumnRef<'a>,
        value: ConditionValue,
    },

    /// field ILIKE '%value%'
    Contains {
        column: ColumnRef<'a>,
        value: String,
    },

    /// field = ANY(values)
    AnyOf {
        column: ColumnRef<'a>,
        values: Vec<Uuid>,
    },

    /// field IS NULL
    IsNull {
        column: ColumnRef<'a>,
    },

    /// Combine multiple conditions with OR
    AnyMatch(Vec<Condition<'a>>),
}

#[derive(Debug, Clone)]
pub enum ConditionValue {
    Text(String),
    Boolean(bool),
    Uuid(Uuid),
}

#[derive(Debug, Clone)]
pub struct OrderBy<'a> {
    pub column: ColumnRef<'a>,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl<'a> From<Table<'a>> for QueryBuilder<'a> {
    fn from(value: Table<'a>) -> Self {
        QueryBuilder {
            from_table: value,
            select: vec![],
            where_conditions: vec![],
            order_by: vec![],
            limit: None,
            offset: None,
        }
    }
}

impl<'a> QueryBuilder<'a> {
    /// Select specified columns
    pub fn select(mut self, columns: Vec<ColumnRef<'a>>) -> Self {
        self.select = columns;
        self
    }

    /// Add where condition
    pub fn where_condition(mut self, condition: Condition<'a>) -> Self {
        self.where_conditions.push(condition);
        self
    }

    pub fn order_by(mut self, column: ColumnRef<'a>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy { column, direction });
        self
    }

    pub fn limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: Option<i64>) -> Self {
        self.offset = offset;
        self
    }

    /// Build the SQL query string
    pub fn build(self) -> (String, Vec<SqlParameter>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        let mut param_counter = 1;

        // SELECT clause
        sql.push_str("SELECT ");
        let columns: Vec<String> = self.select.iter().map(|c| c.qualified()).collect();
        sql.push_str(&columns.join(", "));

        // FROM clause
        sql.push_str(&format!("\nFROM {}", self.from_table.qualified()));

        // WHERE clause
        if !self.where_conditions.is_empty() {
            sql.push_str("\nWHERE ");
            let (where_clause, where_params) =
                Self::generate_where_conditions(&self.where_conditions, &mut param_counter);
            sql.push_str(&where_clause);
            params.extend(where_params);
        }

        // ORDER BY clause
        if !self.order_by.is_empty() {
            sql.push_str("\nORDER BY ");
            let order_clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|ob| {
                    let direction = match ob.direction {
                        SortDirection::Ascending => "ASC",
                        SortDirection::Descending => "DESC",
                    };
                    format!("{} {}", ob.column.qualified(), direction)
                })
                .collect();
            sql.push_str(&order_clauses.join(", "));
        }

        // LIMIT clause
        if let Some(limit) = self.limit {
            sql.push_str(&format!("\nLIMIT ${}", param_counter));
            param_counter += 1;
            params.push(SqlParameter::Integer(limit));
        }
        // OFFSET clause
        if let Some(offset) = self.offset {
            sql.push_str(&format!("\nOFFSET ${}", param_counter));
            params.push(SqlParameter::Integer(offset));
        }

        (sql, params)
    }

    /// Generate WHERE conditions
    fn generate_where_conditions(
        conditions: &[Condition],
        param_counter: &mut usize,
    ) -> (String, Vec<SqlParameter>) {
        let mut where_sql = Vec::new();
        let mut params = Vec::new();

        for condition in conditions {
            let (cond_sql, cond_params) = condition.to_sql(param_counter);
            where_sql.push(cond_sql);
            params.extend(cond_params);
        }

        (where_sql.join(" AND "), params)
    }
}

impl Condition<'_> {
    pub fn to_sql(&self, param_counter: &mut usize) -> (String, Vec<SqlParameter>) {
        match self {
            Condition::Equals { column, value } => {
                let sql = format!("{} = ${}", column.qualified(), param_counter);
                *param_counter += 1;
                (sql, vec![value.into()])
            }

            Condition::Contains { column, value } => {
                let sql = format!("{} ILIKE ${}", column.qualified(), param_counter);
                *param_counter += 1;
                (sql, vec![SqlParameter::Text(format!("%{}%", escape_like(value)))])
            }

            Condition::AnyOf { column, values } => {
                let sql = format!("{} = ANY(${})", column.qualified(), param_counter);
                *param_counter += 1;
                (sql, vec![SqlParameter::UuidArray(values.clone())])
            }

            Condition::IsNull { column } => {
                let sql = format!("{} IS NULL", column.qualified());
                (sql, vec![])
            }

            Condition::AnyMatch(conditions) => {
                let mut parts = Vec::new();
                let mut params = Vec::new();
                for condition in conditions {
                    let (sql, condition_params) = condition.to_sql(param_counter);
                    parts.push(sql);
                    params.extend(condition_params);
                }
                (format!("({})", parts.join(" OR ")), params)
            }
        }
    }
}

/// `%` and `_` in user input match literally
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl From<&ConditionValue> for SqlParameter {
    fn from(value: &ConditionValue) -> Self {
        match value {
            ConditionValue::Text(s) => SqlParameter::Text(s.clone()),
            ConditionValue::Boolean(b) => SqlParameter::Boolean(*b),
            ConditionValue::Uuid(u) => SqlParameter::Uuid(*u),
        }
    }
}

// SQL parameter that will be bound to query
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParameter {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Uuid(Uuid),
    UuidArray(Vec<Uuid>),
}

impl SqlParameter {
    /// Bind to sqlx query
    pub fn bind_to_query<'q>(
        self,
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
        match self {
            SqlParameter::Text(s) => query.bind(s),
            SqlParameter::Integer(i) => query.bind(i),
            SqlParameter::Boolean(b) => query.bind(b),
            SqlParameter::Uuid(u) => query.bind(u),
            SqlParameter::UuidArray(values) => query.bind(values),
        }
    }
}
