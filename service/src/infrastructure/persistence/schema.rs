use std::borrow::Cow;

// Represents a table in database
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    pub name: &'a str,
    pub alias: &'static str,
}

impl<'a> Table<'a> {
    pub const fn new(name: &'a str, alias: &'static str) -> Self {
        Self { name, alias }
    }

    /// Get qualified table name with alias
    pub fn qualified(&self) -> String {
        format!("\"{}\" AS \"{}\"", self.name, self.alias)
    }

    pub fn column(&self, name: &'a str) -> Column<'a> {
        Column {
            qualifier: self.alias,
            name,
        }
    }
}

/// Represents one column in the database table
#[derive(Debug, Clone)]
pub struct Column<'a> {
    pub qualifier: &'static str,
    pub name: &'a str,
}

impl<'a> Column<'a> {
    /// Get qualified column name
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.qualifier, self.name)
    }
}

/// Column reference which can be either borrowed or owned
pub type ColumnRef<'a> = Cow<'a, Column<'a>>;

