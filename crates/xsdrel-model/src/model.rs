//! The in-memory relational model derived from an XSD (spec.md §3).
//!
//! The model is built once and treated as immutable afterwards: the
//! importer reads it concurrently from any number of workers, and the DDL
//! emitter reads it once. Nothing here mutates a [`Model`] after
//! [`crate::builder::build_model`] returns it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One of the SQL Server column types this engine ever emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlType {
    NVarChar(NVarCharLen),
    Decimal { precision: u8, scale: u8 },
    Int,
    BigInt,
    SmallInt,
    TinyInt,
    Bit,
    Float,
    Real,
    Date,
    DateTime2,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NVarCharLen {
    Fixed(u16),
    Max,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::NVarChar(NVarCharLen::Fixed(n)) => write!(f, "NVARCHAR({n})"),
            SqlType::NVarChar(NVarCharLen::Max) => write!(f, "NVARCHAR(MAX)"),
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            SqlType::Int => write!(f, "INT"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::SmallInt => write!(f, "SMALLINT"),
            SqlType::TinyInt => write!(f, "TINYINT"),
            SqlType::Bit => write!(f, "BIT"),
            SqlType::Float => write!(f, "FLOAT"),
            SqlType::Real => write!(f, "REAL"),
            SqlType::Date => write!(f, "DATE"),
            SqlType::DateTime2 => write!(f, "DATETIME2"),
            SqlType::Time => write!(f, "TIME"),
        }
    }
}

impl SqlType {
    /// Whether this type is the "widened" catch-all used when merging two
    /// incompatible NVARCHAR lengths (spec.md §4.3 column merging rule).
    pub fn is_nvarchar(&self) -> bool {
        matches!(self, SqlType::NVarChar(_))
    }

    pub fn nvarchar_max() -> SqlType {
        SqlType::NVarChar(NVarCharLen::Max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub identity: bool,
    pub is_primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable,
            identity: false,
            is_primary_key: false,
        }
    }

    /// Merge another occurrence of the same (case-insensitively equal)
    /// column into this one, per spec.md §4.3: nullability becomes
    /// `old && new`, and a type clash between two NVARCHAR variants widens
    /// to `NVARCHAR(MAX)`.
    pub fn merge(&mut self, other: &Column) {
        self.nullable = self.nullable && other.nullable;
        if self.sql_type != other.sql_type && (self.sql_type.is_nvarchar() || other.sql_type.is_nvarchar())
        {
            self.sql_type = SqlType::nvarchar_max();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub column_name: String,
    pub ref_schema: String,
    pub ref_table: String,
    pub ref_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub column_name: String,
    pub expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
    pub uniques: Vec<UniqueConstraint>,
    pub checks: Vec<CheckConstraint>,
    /// Per-table counter backing `CK_<Table>_<Col>_<n>` check names.
    #[serde(default)]
    pub(crate) check_counter: u32,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let pk_name = format!("{name}Id");
        let mut table = Self {
            schema: schema.into(),
            name,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
            checks: Vec::new(),
            check_counter: 0,
        };
        table.columns.push(Column {
            name: pk_name,
            sql_type: SqlType::Int,
            nullable: false,
            identity: true,
            is_primary_key: true,
        });
        table
    }

    pub fn pk_name(&self) -> String {
        format!("{}Id", self.name)
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn find_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    /// Add a column, or merge it into an existing same-named column
    /// (case-insensitively), per spec.md invariant 3 and the §4.3 merge
    /// rule. Returns the final index of the column.
    pub fn add_or_merge_column(&mut self, column: Column) -> usize {
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&column.name)) {
            existing.merge(&column);
            return self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(&column.name)).unwrap();
        }
        self.columns.push(column);
        self.columns.len() - 1
    }

    pub fn next_check_name(&mut self, column_name: &str) -> String {
        self.check_counter += 1;
        format!("CK_{}_{}_{}", self.name, column_name, self.check_counter)
    }

    /// Add a CHECK constraint unless a CHECK with identical predicate text
    /// already exists on this table (spec.md §4.2: duplicates are not
    /// added twice).
    pub fn add_check_if_new(&mut self, column_name: &str, expression: String) {
        if self.checks.iter().any(|c| c.expression == expression) {
            return;
        }
        let name = self.next_check_name(column_name);
        self.checks.push(CheckConstraint {
            name,
            column_name: column_name.to_string(),
            expression,
        });
    }

    pub fn qualified_name(&self) -> String {
        crate::ident::qualify(&self.schema, &self.name)
    }
}

/// `(xmlNamespace, localName) -> tableName` for global elements (spec.md §3).
pub type ElementBindings = HashMap<(Option<String>, String), String>;

/// JSON object keys must be strings, so a tuple-keyed map can't serialize
/// directly; this adapter round-trips [`ElementBindings`] as a flat array of
/// `(namespace, localName, tableName)` triples instead.
mod element_bindings_serde {
    use super::ElementBindings;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Entry(Option<String>, String, String);

    pub fn serialize<S: Serializer>(bindings: &ElementBindings, serializer: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry> = bindings
            .iter()
            .map(|((ns, local), table)| Entry(ns.clone(), local.clone(), table.clone()))
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ElementBindings, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|Entry(ns, local, table)| ((ns, local), table)).collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Model {
    pub schema: String,
    pub tables: Vec<Table>,
    #[serde(with = "element_bindings_serde")]
    pub element_bindings: ElementBindings,
    #[serde(skip)]
    name_index: HashMap<String, usize>,
}

/// `name_index` is derived, not stored, so deserialization goes through a
/// shadow struct and rebuilds it afterwards rather than leaving it empty.
impl<'de> Deserialize<'de> for Model {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            schema: String,
            tables: Vec<Table>,
            #[serde(with = "element_bindings_serde")]
            element_bindings: ElementBindings,
        }

        let raw = Raw::deserialize(deserializer)?;
        let mut model = Model {
            schema: raw.schema,
            tables: raw.tables,
            element_bindings: raw.element_bindings,
            name_index: HashMap::new(),
        };
        model.rebuild_name_index();
        Ok(model)
    }
}

impl Model {
    pub fn new(schema: impl Into<String>) -> Self {
        let mut model = Self {
            schema: schema.into(),
            tables: Vec::new(),
            element_bindings: HashMap::new(),
            name_index: HashMap::new(),
        };
        model.rebuild_name_index();
        model
    }

    /// Recomputes the table-name index from `tables`. Needed after
    /// deserialization, since `name_index` is never serialized itself.
    pub fn rebuild_name_index(&mut self) {
        self.name_index = self.tables.iter().enumerate().map(|(i, t)| (t.name.clone(), i)).collect();
    }

    /// Stable string-keyed lookup-or-insert: returns the index of the table
    /// named `name`, creating it if it does not exist yet (Design Notes §9:
    /// "the table map is mutated during model build; use a stable
    /// string-keyed map with lookup-or-insert").
    pub fn lookup_or_insert(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.name_index.get(name) {
            return idx;
        }
        let idx = self.tables.len();
        self.tables.push(Table::new(&self.schema, name));
        self.name_index.insert(name.to_string(), idx);
        idx
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.name_index.get(name).map(|&idx| &self.tables[idx])
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    pub fn table(&self, idx: usize) -> &Table {
        &self.tables[idx]
    }

    pub fn table_mut(&mut self, idx: usize) -> &mut Table {
        &mut self.tables[idx]
    }

    pub fn bind_element(&mut self, ns: Option<String>, local_name: String, table: String) {
        self.element_bindings.insert((ns, local_name), table);
    }

    /// Validate the invariants of spec.md §3 and return human-readable
    /// warnings instead of panicking (SPEC_FULL.md §C.2).
    pub fn validate(&self) -> Vec<ModelWarning> {
        let mut warnings = Vec::new();
        for table in &self.tables {
            let pk_count = table.columns.iter().filter(|c| c.is_primary_key).count();
            if pk_count != 1 {
                warnings.push(ModelWarning(format!(
                    "table {} has {} primary key columns, expected exactly 1",
                    table.name, pk_count
                )));
            } else if !table.columns[0].is_primary_key {
                warnings.push(ModelWarning(format!(
                    "table {}: primary key is not the first column",
                    table.name
                )));
            }

            let mut seen = std::collections::HashSet::new();
            for col in &table.columns {
                let lower = col.name.to_ascii_lowercase();
                if !seen.insert(lower) {
                    warnings.push(ModelWarning(format!(
                        "table {} has duplicate column name {}",
                        table.name, col.name
                    )));
                }
            }
        }
        warnings
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelWarning(pub String);

impl fmt::Display for ModelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
