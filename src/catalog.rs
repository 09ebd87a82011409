//! Catalog and table storage: tables, columns, indexes and foreign keys.
//!
//! Tables keep their rows in insertion order. Deleted rows become
//! tombstones so that row positions stay stable and hash indexes never
//! need a global rebuild on DELETE; scans and index lookups skip dead
//! rows. Single-column `normal` indexes are live hash maps from value
//! key to row positions; composite and fulltext indexes are recorded
//! for SHOW INDEX but are not used as lookup structures.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::{DataType, Value};

/// Default expression of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDefault {
    /// A literal value, coerced to the column type on use
    Literal(Value),
    /// `DEFAULT CURRENT_TIMESTAMP`
    CurrentTimestamp,
}

/// A table column with all its declared properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared data type
    pub data_type: DataType,
    /// Whether NULL is allowed (default true unless NOT NULL)
    pub nullable: bool,
    /// Whether the column carries a UNIQUE constraint
    pub unique: bool,
    /// Whether the column is the primary key
    pub primary_key: bool,
    /// Whether the column auto-increments
    pub auto_increment: bool,
    /// Declared DEFAULT expression
    pub default: Option<ColumnDefault>,
    /// `ON UPDATE CURRENT_TIMESTAMP`
    pub on_update_current_timestamp: bool,
}

impl Column {
    /// Creates a nullable, unconstrained column of the given type.
    #[must_use]
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: true,
            unique: false,
            primary_key: false,
            auto_increment: false,
            default: None,
            on_update_current_timestamp: false,
        }
    }

    /// Whether this column must reject duplicate non-null values.
    #[must_use]
    pub fn requires_unique(&self) -> bool {
        self.unique || self.primary_key
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// RESTRICT / NO ACTION: block the parent DML
    Restrict,
    /// CASCADE: propagate delete or new value to child rows
    Cascade,
    /// SET NULL
    SetNull,
    /// SET DEFAULT
    SetDefault,
}

impl ReferentialAction {
    /// SQL spelling, for SHOW output.
    #[must_use]
    pub fn sql_name(self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// A foreign key constraint, outgoing from the table that declares it.
/// Tables are referenced by name only; the graph is resolved per
/// operation against the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name
    pub name: String,
    /// Column in the declaring (child) table
    pub column: String,
    /// Referenced (parent) table name
    pub ref_table: String,
    /// Referenced column name (must be unique or primary key)
    pub ref_column: String,
    /// Action on parent DELETE
    pub on_delete: ReferentialAction,
    /// Action on parent UPDATE
    pub on_update: ReferentialAction,
}

/// Index kind as declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Plain index; single-column normal indexes are live hash maps
    Normal,
    /// FULLTEXT: recorded, never used for lookups
    Fulltext,
}

/// A declared index. Only single-column [`IndexKind::Normal`] indexes
/// maintain a live map; everything else is metadata for SHOW INDEX.
#[derive(Debug, Clone)]
pub struct TableIndex {
    /// Index name
    pub name: String,
    /// Indexed columns, in order
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness
    pub unique: bool,
    /// Declared kind
    pub kind: IndexKind,
    map: Option<HashMap<String, Vec<usize>>>,
}

impl TableIndex {
    /// Creates an index; a live hash map is allocated only for
    /// single-column normal indexes.
    #[must_use]
    pub fn new(name: &str, columns: Vec<String>, unique: bool, kind: IndexKind) -> Self {
        let map = (kind == IndexKind::Normal && columns.len() == 1).then(HashMap::new);
        Self {
            name: name.to_string(),
            columns,
            unique,
            kind,
            map,
        }
    }

    /// Whether the index is backed by a live hash map.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.map.is_some()
    }

    /// Row positions currently holding `key` in the indexed column.
    #[must_use]
    pub fn positions(&self, key: &str) -> Option<&[usize]> {
        self.map.as_ref()?.get(key).map(Vec::as_slice)
    }

    fn insert(&mut self, key: String, pos: usize) {
        if let Some(map) = self.map.as_mut() {
            map.entry(key).or_default().push(pos);
        }
    }

    fn remove(&mut self, key: &str, pos: usize) {
        if let Some(map) = self.map.as_mut()
            && let Some(list) = map.get_mut(key)
        {
            list.retain(|p| *p != pos);
            if list.is_empty() {
                map.remove(key);
            }
        }
    }
}

/// A stored row: the value vector plus a tombstone flag.
#[derive(Debug, Clone)]
pub struct Row {
    /// Cell values, aligned with the table's column list
    pub values: Vec<Value>,
    live: bool,
}

impl Row {
    /// Whether the row is visible to scans.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// An in-memory table: ordered columns, insertion-ordered rows, live
/// hash indexes, auto-increment counter and outgoing foreign keys.
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name as created (lookups are case-insensitive)
    pub name: String,
    /// Ordered column list
    pub columns: Vec<Column>,
    /// Outgoing foreign keys
    pub foreign_keys: Vec<ForeignKey>,
    /// Declared indexes by name
    pub indexes: IndexMap<String, TableIndex>,
    rows: Vec<Row>,
    auto_increment: i64,
}

impl Table {
    /// Creates an empty table with the given columns.
    #[must_use]
    pub fn new(name: &str, columns: Vec<Column>) -> Self {
        Self {
            name: name.to_string(),
            columns,
            foreign_keys: Vec::new(),
            indexes: IndexMap::new(),
            rows: Vec::new(),
            auto_increment: 1,
        }
    }

    /// Position of `name` in the column list (case-insensitive).
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The column named `name`, or a schema error naming the table.
    pub fn column(&self, name: &str) -> Result<(usize, &Column)> {
        self.column_index(name)
            .map(|i| (i, &self.columns[i]))
            .ok_or_else(|| Error::unknown_column(&self.name, name))
    }

    /// The auto-increment column, if one is declared.
    #[must_use]
    pub fn auto_increment_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.auto_increment)
    }

    /// Next auto-increment value; the counter advances.
    pub fn take_auto_increment(&mut self) -> i64 {
        let v = self.auto_increment;
        self.auto_increment += 1;
        v
    }

    /// Reads the counter without advancing it.
    #[must_use]
    pub fn auto_increment_value(&self) -> i64 {
        self.auto_increment
    }

    /// Records an explicitly inserted value: the counter becomes
    /// `max(counter, given + 1)`.
    pub fn observe_auto_increment(&mut self, given: i64) {
        if given >= self.auto_increment {
            self.auto_increment = given + 1;
        }
    }

    /// Restores the counter to an exact value (undo replay, TRUNCATE).
    pub fn set_auto_increment(&mut self, value: i64) {
        self.auto_increment = value;
    }

    /// Iterates live rows as `(position, values)`.
    pub fn live_rows(&self) -> impl Iterator<Item = (usize, &[Value])> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.live)
            .map(|(pos, r)| (pos, r.values.as_slice()))
    }

    /// Number of live rows.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.rows.iter().filter(|r| r.live).count()
    }

    /// Total number of row slots, tombstones included.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.rows.len()
    }

    /// The row at `pos` when it is live.
    #[must_use]
    pub fn live_row(&self, pos: usize) -> Option<&[Value]> {
        self.rows
            .get(pos)
            .filter(|r| r.live)
            .map(|r| r.values.as_slice())
    }

    /// Appends a live row and indexes it. The caller has already coerced
    /// and validated the values.
    pub fn append_row(&mut self, values: Vec<Value>) -> usize {
        let pos = self.rows.len();
        self.index_row(pos, &values);
        self.rows.push(Row { values, live: true });
        pos
    }

    /// Tombstones the row at `pos`, unindexing it. Returns the values the
    /// row held, for undo logging.
    pub fn kill_row(&mut self, pos: usize) -> Result<Vec<Value>> {
        let row = self
            .rows
            .get_mut(pos)
            .filter(|r| r.live)
            .ok_or_else(|| Error::Schema(format!("no live row {pos} in table '{}'", self.name)))?;
        row.live = false;
        let values = row.values.clone();
        self.unindex_row(pos, &values);
        Ok(values)
    }

    /// Brings a tombstoned row back (ROLLBACK of a delete).
    pub fn revive_row(&mut self, pos: usize) -> Result<()> {
        let row = self
            .rows
            .get_mut(pos)
            .filter(|r| !r.live)
            .ok_or_else(|| Error::Schema(format!("no dead row {pos} in table '{}'", self.name)))?;
        row.live = true;
        let values = row.values.clone();
        self.index_row(pos, &values);
        Ok(())
    }

    /// Takes back a row appended during the current statement/transaction
    /// (ROLLBACK of an insert). The slot is tombstoned rather than popped
    /// so that later positions stay valid.
    pub fn retract_row(&mut self, pos: usize) -> Result<()> {
        self.kill_row(pos).map(|_| ())
    }

    /// Replaces the values of the live row at `pos`, fixing up indexes.
    /// Returns the previous values, for undo logging.
    pub fn replace_row(&mut self, pos: usize, values: Vec<Value>) -> Result<Vec<Value>> {
        let row = self
            .rows
            .get_mut(pos)
            .filter(|r| r.live)
            .ok_or_else(|| Error::Schema(format!("no live row {pos} in table '{}'", self.name)))?;
        let old = std::mem::replace(&mut row.values, values.clone());
        self.unindex_row(pos, &old);
        self.index_row(pos, &values);
        Ok(old)
    }

    /// Removes every row and resets the auto-increment counter to 1.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.auto_increment = 1;
        for index in self.indexes.values_mut() {
            if index.is_active() {
                index.map = Some(HashMap::new());
            }
        }
    }

    /// Adds an index and, when it is an active single-column one, fills
    /// it from the existing rows.
    pub fn add_index(&mut self, index: TableIndex) -> Result<()> {
        if self.indexes.contains_key(&index.name.to_lowercase()) {
            return Err(Error::Schema(format!(
                "index '{}' already exists on table '{}'",
                index.name, self.name
            )));
        }
        for col in &index.columns {
            if self.column_index(col).is_none() {
                return Err(Error::unknown_column(&self.name, col));
            }
        }
        let key = index.name.to_lowercase();
        let mut index = index;
        if index.is_active()
            && let Some(col) = self.column_index(&index.columns[0])
        {
            for (pos, values) in self.rows.iter().enumerate().filter(|(_, r)| r.live) {
                if let Some(k) = values.values[col].index_key() {
                    index.insert(k, pos);
                }
            }
        }
        self.indexes.insert(key, index);
        Ok(())
    }

    /// Removes an index by name.
    pub fn drop_index(&mut self, name: &str) -> Result<TableIndex> {
        self.indexes
            .shift_remove(&name.to_lowercase())
            .ok_or_else(|| {
                Error::Schema(format!(
                    "index '{name}' does not exist on table '{}'",
                    self.name
                ))
            })
    }

    /// Whether the column at `idx` must hold distinct non-null values:
    /// declared PRIMARY KEY/UNIQUE, or covered by a single-column unique
    /// index.
    #[must_use]
    pub fn is_unique_column(&self, idx: usize) -> bool {
        let column = &self.columns[idx];
        column.requires_unique()
            || self.indexes.values().any(|ix| {
                ix.unique
                    && ix.columns.len() == 1
                    && ix.columns[0].eq_ignore_ascii_case(&column.name)
            })
    }

    /// Row positions holding `value` in `column`, when an active index
    /// covers that column. `None` means the caller must scan.
    #[must_use]
    pub fn indexed_lookup(&self, column: &str, value: &Value) -> Option<Vec<usize>> {
        let key = value.index_key()?;
        self.indexes
            .values()
            .find(|ix| ix.is_active() && ix.columns[0].eq_ignore_ascii_case(column))
            .map(|ix| ix.positions(&key).unwrap_or_default().to_vec())
    }

    /// First live row position (other than `skip`) whose `col` cell equals
    /// `value`. Uses an active index when one covers the column.
    #[must_use]
    pub fn find_matching_row(
        &self,
        col: usize,
        value: &Value,
        skip: Option<usize>,
    ) -> Option<usize> {
        let name = &self.columns[col].name;
        if let Some(positions) = self.indexed_lookup(name, value) {
            return positions
                .into_iter()
                .find(|p| Some(*p) != skip && self.live_row(*p).is_some());
        }
        let key = value.index_key()?;
        self.live_rows()
            .find(|(pos, values)| {
                Some(*pos) != skip && values[col].index_key().as_deref() == Some(key.as_str())
            })
            .map(|(pos, _)| pos)
    }

    fn index_row(&mut self, pos: usize, values: &[Value]) {
        let columns = &self.columns;
        for index in self.indexes.values_mut() {
            if !index.is_active() {
                continue;
            }
            let col = columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(&index.columns[0]));
            if let Some(col) = col
                && let Some(key) = values[col].index_key()
            {
                index.insert(key, pos);
            }
        }
    }

    fn unindex_row(&mut self, pos: usize, values: &[Value]) {
        let columns = &self.columns;
        for index in self.indexes.values_mut() {
            if !index.is_active() {
                continue;
            }
            let col = columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(&index.columns[0]));
            if let Some(col) = col
                && let Some(key) = values[col].index_key()
            {
                index.remove(&key, pos);
            }
        }
    }
}

/// The catalog: every table of the database, keyed case-insensitively
/// while preserving the names as created.
#[derive(Debug, Default)]
pub struct Database {
    tables: IndexMap<String, Table>,
}

impl Database {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table names in creation order, as created.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|t| t.name.clone()).collect()
    }

    /// Whether a table named `name` exists.
    #[must_use]
    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    /// The table named `name`.
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(&name.to_lowercase())
            .ok_or_else(|| Error::unknown_table(name))
    }

    /// Mutable access to the table named `name`.
    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| Error::unknown_table(name))
    }

    /// Registers a new table after validating its definition: unique
    /// name, at most one auto-increment column (INT and PRIMARY KEY),
    /// and resolvable foreign keys referencing unique parent columns.
    pub fn create_table(&mut self, table: Table) -> Result<()> {
        if self.contains_table(&table.name) {
            return Err(Error::Schema(format!(
                "table '{}' already exists",
                table.name
            )));
        }
        let ai_columns: Vec<&Column> = table.columns.iter().filter(|c| c.auto_increment).collect();
        if ai_columns.len() > 1 {
            return Err(Error::Schema(format!(
                "table '{}' declares more than one AUTO_INCREMENT column",
                table.name
            )));
        }
        if let Some(ai) = ai_columns.first() {
            if ai.data_type != DataType::Integer {
                return Err(Error::Schema(format!(
                    "AUTO_INCREMENT column '{}' must be an integer",
                    ai.name
                )));
            }
            if !ai.primary_key {
                return Err(Error::Schema(format!(
                    "AUTO_INCREMENT column '{}' must be the primary key",
                    ai.name
                )));
            }
        }
        if table.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::Schema(format!(
                "table '{}' declares more than one primary key column",
                table.name
            )));
        }
        for fk in &table.foreign_keys {
            if table.column_index(&fk.column).is_none() {
                return Err(Error::unknown_column(&table.name, &fk.column));
            }
            // self-referencing keys resolve against the table being created
            let parent = if fk.ref_table.eq_ignore_ascii_case(&table.name) {
                &table
            } else {
                self.table(&fk.ref_table)?
            };
            let (_, parent_col) = parent.column(&fk.ref_column)?;
            if !parent_col.requires_unique() {
                return Err(Error::Schema(format!(
                    "foreign key '{}' references non-unique column '{}.{}'",
                    fk.name, fk.ref_table, fk.ref_column
                )));
            }
        }
        self.tables.insert(table.name.to_lowercase(), table);
        Ok(())
    }

    /// Removes a table outright. Referential checks are the executor's
    /// job; this is also the undo path for CREATE TABLE.
    pub fn remove_table(&mut self, name: &str) -> Result<Table> {
        self.tables
            .shift_remove(&name.to_lowercase())
            .ok_or_else(|| Error::unknown_table(name))
    }

    /// Puts a previously removed table back (undo path for DROP TABLE).
    pub fn restore_table(&mut self, table: Table) {
        self.tables.insert(table.name.to_lowercase(), table);
    }

    /// Every foreign key in the catalog that references `parent`, with
    /// the name of the declaring child table.
    #[must_use]
    pub fn incoming_foreign_keys(&self, parent: &str) -> Vec<(String, ForeignKey)> {
        let mut found = Vec::new();
        for table in self.tables.values() {
            for fk in &table.foreign_keys {
                if fk.ref_table.eq_ignore_ascii_case(parent) {
                    found.push((table.name.clone(), fk.clone()));
                }
            }
        }
        found
    }
}

// --- Schema snapshots (DESCRIBE / SHOW / JSON export) ---

/// Serializable description of one column, in SHOW FULL FIELDS shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescription {
    /// Column name
    pub field: String,
    /// SQL type rendering
    pub sql_type: String,
    /// "YES" / "NO"
    pub null: String,
    /// "PRI", "UNI" or empty
    pub key: String,
    /// Rendered default, if any
    pub default: Option<String>,
    /// "auto_increment", "on update CURRENT_TIMESTAMP" or empty
    pub extra: String,
}

/// Serializable description of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    /// Table name as created
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDescription>,
    /// Index names with their column lists and kinds
    pub indexes: Vec<IndexDescription>,
    /// Outgoing foreign keys
    pub foreign_keys: Vec<ForeignKey>,
}

/// Serializable description of one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDescription {
    /// Index name
    pub name: String,
    /// Indexed columns in order
    pub columns: Vec<String>,
    /// Whether the index is unique
    pub unique: bool,
    /// "BTREE"-style kind label for SHOW INDEX
    pub kind: String,
}

/// A whole-catalog snapshot, exportable as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// All tables, in creation order
    pub tables: Vec<TableDescription>,
}

impl Table {
    /// Describes the table in SHOW FULL FIELDS shape.
    #[must_use]
    pub fn describe(&self) -> TableDescription {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut extra = String::new();
                if c.auto_increment {
                    extra.push_str("auto_increment");
                }
                if c.on_update_current_timestamp {
                    if !extra.is_empty() {
                        extra.push(' ');
                    }
                    extra.push_str("on update CURRENT_TIMESTAMP");
                }
                ColumnDescription {
                    field: c.name.clone(),
                    sql_type: c.data_type.sql_name(),
                    null: if c.nullable { "YES" } else { "NO" }.to_string(),
                    key: if c.primary_key {
                        "PRI"
                    } else if c.unique {
                        "UNI"
                    } else {
                        ""
                    }
                    .to_string(),
                    default: c.default.as_ref().map(|d| match d {
                        ColumnDefault::Literal(v) => v.to_text(),
                        ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
                    }),
                    extra,
                }
            })
            .collect();
        let indexes = self
            .indexes
            .values()
            .map(|ix| IndexDescription {
                name: ix.name.clone(),
                columns: ix.columns.clone(),
                unique: ix.unique,
                kind: match ix.kind {
                    IndexKind::Normal => "BTREE".to_string(),
                    IndexKind::Fulltext => "FULLTEXT".to_string(),
                },
            })
            .collect();
        TableDescription {
            name: self.name.clone(),
            columns,
            indexes,
            foreign_keys: self.foreign_keys.clone(),
        }
    }
}
