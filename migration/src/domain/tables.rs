use std::fmt;

/// Represents table in a database, used for ddl generation
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    pub indexes: Vec<Index>,
}

/// Represents one column in the database table
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub not_null: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
    pub check: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    UuidArray,
    Text,
    Integer,
    Boolean,
    TimestampTZ,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sql = match self {
            ColumnType::Uuid => "UUID",
            ColumnType::UuidArray => "UUID[]",
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::TimestampTZ => "TIMESTAMPTZ",
        };
        f.write_str(sql)
    }
}

/// Represents foreign key constraint in the database table
pub struct ForeignKeyConstraint {
    pub table_name: String,
    pub column_name: String,
    pub referenced_table_name: String,
    pub referenced_column_name: String,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

/// Represents an index in the database table.
/// `columns` may hold expressions, `predicate` makes it a partial index.
pub struct Index {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub predicate: Option<String>,
}

impl Table {
    pub fn new(
        name: String,
        columns: Vec<Column>,
        foreign_keys: Vec<ForeignKeyConstraint>,
        indexes: Vec<Index>,
    ) -> Self {
        Self {
            name,
            columns,
            foreign_keys,
            indexes,
        }
    }
}

impl Column {
    pub fn new<T: Into<String>>(
        name: T,
        column_type: ColumnType,
        not_null: bool,
        default_value: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null,
            unique: false,
            primary_key: false,
            default_value: default_value.map(str::to_string),
            check: None,
        }
    }

    pub fn primary_key<T: Into<String>>(name: T, column_type: ColumnType, default_value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: true,
            unique: false,
            primary_key: true,
            default_value: default_value.map(str::to_string),
            check: None,
        }
    }

    /// Restricts a text column to a closed set of values
    pub fn one_of(mut self, values: &[&str]) -> Self {
        let values = values
            .iter()
            .map(|v| format!("'{}'", v))
            .collect::<Vec<_>>()
            .join(", ");
        self.check = Some(format!("\"{}\" IN ({})", self.name, values));
        self
    }
}

impl ForeignKeyConstraint {
    pub fn new<T: Into<String>>(
        table_name: T,
        column_name: T,
        referenced_table_name: T,
        referenced_column_name: T,
        on_delete: OnDelete,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            referenced_table_name: referenced_table_name.into(),
            referenced_column_name: referenced_column_name.into(),
            on_delete,
        }
    }
}

impl Index {
    pub fn new<T: Into<String>>(table_name: T, columns: Vec<&str>, unique: bool) -> Self {
        let table_name = table_name.into();
        let name = format!("{}_{}_idx", table_name, columns.join("_"));
        Self {
            name,
            table_name,
            columns: columns.into_iter().map(str::to_string).collect(),
            unique,
            predicate: None,
        }
    }

    pub fn named<T: Into<String>>(mut self, name: T) -> Self {
        self.name = name.into();
        self
    }

    pub fn partial<T: Into<String>>(mut self, predicate: T) -> Self {
        self.predicate = Some(predicate.into());
        self
    }
}
