//! Table registry used for schema creation.
//!
//! Tables are registered up front and rendered to MySQL
//! `CREATE TABLE IF NOT EXISTS` statements, so running schema creation against a
//! database that already has them is a no-op.

/// A single column of a registered table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    /// Raw MySQL type, e.g. `BIGINT` or `VARCHAR(255)`
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    /// Raw SQL default expression
    pub default: Option<String>,
}

impl ColumnDefinition {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            primary_key: false,
            auto_increment: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark as (part of) the primary key. Primary key columns are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    fn render(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.sql_type);
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.auto_increment {
            sql.push_str(" AUTO_INCREMENT");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Render the `CREATE TABLE IF NOT EXISTS` statement for this table.
    pub fn create_statement(&self) -> String {
        let mut lines: Vec<String> = self.columns.iter().map(ColumnDefinition::render).collect();

        let keys: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| quote_ident(&c.name))
            .collect();
        if !keys.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            quote_ident(&self.name),
            lines.join(",\n  ")
        )
    }
}

/// Ordered set of table definitions, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: Vec<TableDefinition>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. A table with the same name replaces the earlier one
    /// and keeps its position.
    pub fn register(&mut self, table: TableDefinition) -> &mut Self {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_table(mut self, table: TableDefinition) -> Self {
        self.register(table);
        self
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Quote a MySQL identifier with backticks.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
