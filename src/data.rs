//! Typed tabular data.
//!
//! A [`Table`] holds rows of typed scalar values together with shared
//! column metadata. Tables are loaded once from the line-oriented text
//! format and then partitioned repeatedly during tree induction; every
//! derived table shares its parent's schema by reference and owns an
//! independent row sequence.
use crate::errors::ArborError;
use crate::utils::{items_to_strings, round_to};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::fs;
use std::str::FromStr;
use std::sync::Arc;

/// Semantic type of a column, declared once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Whole numbers.
    Integer,
    /// Real numbers, optionally rounded at parse time.
    Float,
    /// Opaque categorical strings.
    Symbol,
    /// The ground-truth class label column.
    Target,
}

impl ColumnType {
    /// The token used for this type in the table text format.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Symbol => "symbol",
            ColumnType::Target => "target",
        }
    }

    /// Whether values of this type are ordered numbers, and thus
    /// split on thresholds rather than on exact matches.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl FromStr for ColumnType {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(ColumnType::Integer),
            "float" => Ok(ColumnType::Float),
            "symbol" => Ok(ColumnType::Symbol),
            "target" => Ok(ColumnType::Target),
            _ => Err(ArborError::UnknownColumnType(
                s.to_string(),
                items_to_strings(&["integer", "float", "symbol", "target"]),
            )),
        }
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// An integer column value.
    Int(i64),
    /// A float column value.
    Float(f64),
    /// A symbol or target column value.
    Str(String),
}

impl Value {
    /// Numeric view of the value, used for threshold comparison.
    /// Strings are not ordered and map to NaN, which fails every
    /// threshold test.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            Value::Str(_) => f64::NAN,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            // Debug formatting keeps the shortest form that round-trips,
            // including the trailing .0 on whole floats.
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(v) => f.write_str(v),
        }
    }
}

/// Metadata for one declared column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within a table.
    pub name: String,
    /// Declared semantic type.
    pub kind: ColumnType,
    /// Ordinal position of the column in every row.
    pub index: usize,
    /// Parse-time rounding digits, float columns only.
    pub precision: Option<u32>,
}

/// Column metadata shared between a table and the tables derived from
/// it. A schema is fixed once its columns are declared; the only later
/// mutation is explicit column deletion, which copies the schema first
/// so siblings and ancestors never observe the change.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    target: Option<String>,
}

impl Schema {
    fn declare(&mut self, name: &str, kind: ColumnType, precision: Option<u32>) -> Result<(), ArborError> {
        // All checks run before any state is touched, so a failed
        // declaration leaves the schema exactly as it was.
        if self.by_name.contains_key(name) {
            return Err(ArborError::DuplicateColumn(name.to_string()));
        }
        if kind == ColumnType::Target {
            if let Some(existing) = &self.target {
                return Err(ArborError::DuplicateTarget(existing.clone()));
            }
        }
        if precision.is_some() && kind != ColumnType::Float {
            return Err(ArborError::InvalidPrecision(
                name.to_string(),
                kind.as_str().to_string(),
            ));
        }
        let index = self.columns.len();
        if kind == ColumnType::Target {
            self.target = Some(name.to_string());
        }
        self.by_name.insert(name.to_string(), index);
        self.columns.push(Column {
            name: name.to_string(),
            kind,
            index,
            precision,
        });
        Ok(())
    }

    fn remove(&mut self, index: usize) {
        let removed = self.columns.remove(index);
        if self.target.as_deref() == Some(removed.name.as_str()) {
            self.target = None;
        }
        // Re-derive a dense 0..n-1 ordinal range and the name map.
        self.by_name.clear();
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.index = i;
            self.by_name.insert(column.name.clone(), i);
        }
    }

    fn get(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name).map(|i| &self.columns[*i])
    }

    fn len(&self) -> usize {
        self.columns.len()
    }
}

/// An ordered sequence of typed rows plus shared column metadata.
#[derive(Debug, Clone, Default)]
pub struct Table {
    schema: Arc<Schema>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with no declared columns.
    pub fn new() -> Self {
        Table {
            schema: Arc::new(Schema::default()),
            rows: Vec::new(),
        }
    }

    /// An empty table sharing this table's schema, the starting point
    /// of every split/extract/select operation.
    fn derived(&self) -> Self {
        Table {
            schema: Arc::clone(&self.schema),
            rows: Vec::new(),
        }
    }

    /// Append a new column declaration.
    ///
    /// * `name` - Column name, unique within the table.
    /// * `kind` - Semantic type of the column.
    /// * `precision` - Parse-time rounding digits, float columns only.
    pub fn declare_column(&mut self, name: &str, kind: ColumnType, precision: Option<u32>) -> Result<(), ArborError> {
        Arc::make_mut(&mut self.schema).declare(name, kind, precision)
    }

    /// Append a data row, which must have one value per declared column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), ArborError> {
        if row.len() != self.schema.len() {
            return Err(ArborError::FieldCount(self.rows.len() + 1, row.len(), self.schema.len()));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Parse a table from the line-oriented text format.
    ///
    /// Blank lines and `#` comment lines are skipped. Lines starting
    /// with `@` declare a column as `name type [precision]`, with the
    /// target column declared as `name target`. All other lines are
    /// comma-separated data rows parsed according to each column's
    /// declared type.
    pub fn from_text(text: &str) -> Result<Self, ArborError> {
        let mut table = Table::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(directive) = line.strip_prefix('@') {
                table.parse_directive(directive)?;
            } else {
                let row = table.parse_row(line, number + 1)?;
                table.rows.push(row);
            }
        }
        if table.schema.target.is_none() {
            return Err(ArborError::MissingTarget);
        }
        Ok(table)
    }

    /// Load a table from a file in the text format.
    pub fn from_file(path: &str) -> Result<Self, ArborError> {
        let text = match fs::read_to_string(path) {
            Ok(s) => Ok(s),
            Err(e) => Err(ArborError::UnableToRead(e.to_string())),
        }?;
        Self::from_text(&text)
    }

    /// Re-emit the table in the text format: directives for every
    /// non-target column, the target directive, a separator line,
    /// then one comma-joined line per row.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for column in &self.schema.columns {
            if column.kind == ColumnType::Target {
                continue;
            }
            match column.precision {
                Some(p) => out.push_str(&format!("@{} {} {}\n", column.name, column.kind, p)),
                None => out.push_str(&format!("@{} {}\n", column.name, column.kind)),
            }
        }
        if let Some(target) = &self.schema.target {
            out.push_str(&format!("@{} target\n", target));
        }
        out.push('\n');
        for row in &self.rows {
            let items: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            out.push_str(&items.join(","));
            out.push('\n');
        }
        out
    }

    /// Save the table to a file in the text format.
    pub fn save(&self, path: &str) -> Result<(), ArborError> {
        match fs::write(path, self.to_text()) {
            Err(e) => Err(ArborError::UnableToWrite(e.to_string())),
            Ok(_) => Ok(()),
        }
    }

    fn parse_directive(&mut self, directive: &str) -> Result<(), ArborError> {
        let mut parts = directive.split_whitespace();
        let (name, kind) = match (parts.next(), parts.next()) {
            (Some(name), Some(kind)) => (name, kind),
            _ => return Err(ArborError::MalformedDirective(directive.to_string())),
        };
        let kind: ColumnType = kind.parse()?;
        let precision = match parts.next() {
            Some(digits) => match digits.parse::<u32>() {
                Ok(p) => Some(p),
                Err(_) => return Err(ArborError::MalformedDirective(directive.to_string())),
            },
            None => None,
        };
        self.declare_column(name, kind, precision)
    }

    fn parse_row(&self, line: &str, number: usize) -> Result<Vec<Value>, ArborError> {
        let items: Vec<&str> = line.split(',').collect();
        if items.len() != self.schema.len() {
            return Err(ArborError::FieldCount(number, items.len(), self.schema.len()));
        }
        let mut row = Vec::with_capacity(items.len());
        for (item, column) in items.iter().zip(self.schema.columns.iter()) {
            row.push(parse_value(item, column, number)?);
        }
        Ok(row)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The rows of the table, in load order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Name of the target column, if one has been declared.
    pub fn target_name(&self) -> Option<&str> {
        self.schema.target.as_deref()
    }

    /// The target value of one row.
    pub fn target_value(&self, row: usize) -> Option<&Value> {
        let target = self.schema.target.as_deref()?;
        let column = self.schema.get(target)?;
        Some(&self.rows[row][column.index])
    }

    /// Distinct target values present, in first-seen order.
    pub fn targets(&self) -> Vec<&Value> {
        let index = match self.schema.target.as_deref().and_then(|t| self.schema.get(t)) {
            Some(column) => column.index,
            None => return Vec::new(),
        };
        let mut seen: Vec<&Value> = Vec::new();
        for row in &self.rows {
            let value = &row[index];
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        seen
    }

    /// Number of rows whose target equals `value`.
    pub fn count_target(&self, value: &Value) -> usize {
        let index = match self.schema.target.as_deref().and_then(|t| self.schema.get(t)) {
            Some(column) => column.index,
            None => return 0,
        };
        self.rows.iter().filter(|row| row[index] == *value).count()
    }

    /// Names of all non-target columns, in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        self.schema
            .columns
            .iter()
            .filter(|c| c.kind != ColumnType::Target)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Declared type of a column.
    pub fn column_type(&self, name: &str) -> Result<ColumnType, ArborError> {
        self.schema
            .get(name)
            .map(|c| c.kind)
            .ok_or_else(|| ArborError::UnknownColumn(name.to_string()))
    }

    /// Ordinal position of a column.
    pub fn column_index(&self, name: &str) -> Result<usize, ArborError> {
        self.schema
            .get(name)
            .map(|c| c.index)
            .ok_or_else(|| ArborError::UnknownColumn(name.to_string()))
    }

    /// Remove columns by name, stripping the matching position from
    /// every row and re-deriving the ordinals of the columns after it.
    /// The schema is copied on first write, so tables derived earlier
    /// keep the original layout.
    pub fn delete_columns(&mut self, names: &[&str]) -> Result<(), ArborError> {
        for name in names {
            let index = self.column_index(name)?;
            for row in &mut self.rows {
                row.remove(index);
            }
            Arc::make_mut(&mut self.schema).remove(index);
        }
        Ok(())
    }

    /// Distinct values of a column, in first-seen order.
    pub fn values(&self, name: &str) -> Result<Vec<&Value>, ArborError> {
        let index = self.column_index(name)?;
        let mut seen: Vec<&Value> = Vec::new();
        for row in &self.rows {
            let value = &row[index];
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        Ok(seen)
    }

    /// Candidate split points for a column.
    ///
    /// Numeric columns yield the sorted boundary midpoints: distinct
    /// values are sorted ascending and a midpoint is emitted between
    /// each adjacent pair whose target-label sets differ. Thresholds
    /// that cannot change the label composition on either side are
    /// never candidates. Symbol columns yield their distinct values in
    /// first-seen order, each an exact-match candidate.
    pub fn split_candidates(&self, name: &str) -> Result<Vec<Value>, ArborError> {
        let column = self
            .schema
            .get(name)
            .ok_or_else(|| ArborError::UnknownColumn(name.to_string()))?;
        if column.kind.is_numeric() {
            self.boundary_midpoints(column.index)
        } else {
            Ok(self.values(name)?.into_iter().cloned().collect())
        }
    }

    fn boundary_midpoints(&self, index: usize) -> Result<Vec<Value>, ArborError> {
        let target = self.schema.target.as_deref().ok_or(ArborError::MissingTarget)?;
        let target_index = self.column_index(target)?;

        // Group rows by distinct numeric value, collecting the set of
        // target labels seen with each value.
        let mut groups: Vec<(f64, Vec<&Value>)> = Vec::new();
        for row in &self.rows {
            let value = row[index].as_f64();
            let label = &row[target_index];
            match groups.iter_mut().find(|(v, _)| *v == value) {
                Some((_, labels)) => {
                    if !labels.contains(&label) {
                        labels.push(label);
                    }
                }
                None => groups.push((value, vec![label])),
            }
        }
        groups.sort_by(|a, b| a.0.total_cmp(&b.0));

        // There might be no boundary at all.
        let mut gaps = Vec::new();
        for pair in groups.windows(2) {
            let (prev_value, prev_labels) = &pair[0];
            let (value, labels) = &pair[1];
            if !same_label_set(prev_labels, labels) {
                gaps.push(Value::Float(prev_value + (value - prev_value) / 2.0));
            }
        }
        Ok(gaps)
    }

    /// Binary partition on one column. Numeric columns send rows with
    /// `value < threshold` left and the rest right; symbol columns send
    /// exact matches left and the rest right. Both sides share this
    /// table's schema and own their rows.
    pub fn split(&self, name: &str, value: &Value) -> Result<(Table, Table), ArborError> {
        let column = self
            .schema
            .get(name)
            .ok_or_else(|| ArborError::UnknownColumn(name.to_string()))?;
        let mut left = self.derived();
        let mut right = self.derived();
        if column.kind.is_numeric() {
            let threshold = value.as_f64();
            for row in &self.rows {
                if row[column.index].as_f64() < threshold {
                    left.rows.push(row.clone());
                } else {
                    right.rows.push(row.clone());
                }
            }
        } else {
            for row in &self.rows {
                if row[column.index] == *value {
                    left.rows.push(row.clone());
                } else {
                    right.rows.push(row.clone());
                }
            }
        }
        Ok((left, right))
    }

    /// The subset of rows with an exact match on one column, used for
    /// multi-way splits with one call per distinct value.
    pub fn extract(&self, name: &str, value: &Value) -> Result<Table, ArborError> {
        let index = self.column_index(name)?;
        let mut subset = self.derived();
        for row in &self.rows {
            if row[index] == *value {
                subset.rows.push(row.clone());
            }
        }
        Ok(subset)
    }

    /// A new table holding the rows at the given positions, in the
    /// order given. Duplicate positions yield duplicate rows.
    pub fn select(&self, indices: &[usize]) -> Table {
        let mut subset = self.derived();
        for i in indices {
            subset.rows.push(self.rows[*i].clone());
        }
        subset
    }

    /// Attribute-keyed view of one row, the shape consumed by the
    /// generated decision procedure.
    pub fn row_map(&self, row: usize) -> HashMap<&str, &Value> {
        self.schema
            .columns
            .iter()
            .map(|c| (c.name.as_str(), &self.rows[row][c.index]))
            .collect()
    }
}

fn same_label_set(a: &[&Value], b: &[&Value]) -> bool {
    a.len() == b.len() && a.iter().all(|v| b.contains(v))
}

fn parse_value(item: &str, column: &Column, number: usize) -> Result<Value, ArborError> {
    match column.kind {
        ColumnType::Integer => match item.trim().parse::<i64>() {
            Ok(v) => Ok(Value::Int(v)),
            Err(_) => Err(invalid_value(column, item, number)),
        },
        ColumnType::Float => match item.trim().parse::<f64>() {
            Ok(v) => match column.precision {
                Some(digits) => Ok(Value::Float(round_to(v, digits))),
                None => Ok(Value::Float(v)),
            },
            Err(_) => Err(invalid_value(column, item, number)),
        },
        ColumnType::Symbol | ColumnType::Target => Ok(Value::Str(item.to_string())),
    }
}

fn invalid_value(column: &Column, item: &str, number: usize) -> ArborError {
    ArborError::InvalidValue(
        column.name.clone(),
        column.kind.as_str().to_string(),
        item.to_string(),
        number,
    )
}
