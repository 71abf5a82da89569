//! Errors
//!
//! Custom error types used throughout the `arbor` crate.
use thiserror::Error;

/// Errors that can occur while declaring columns, loading tables,
/// or inducing trees.
#[derive(Debug, Error)]
pub enum ArborError {
    /// A column with this name is already declared.
    #[error("Column [{0}] is already defined.")]
    DuplicateColumn(String),
    /// A second target column was declared.
    #[error("Target is already defined as [{0}].")]
    DuplicateTarget(String),
    /// Rounding precision is only available for float columns.
    #[error("Precision given for column [{0}] of type [{1}]. Precision is only available for float columns.")]
    InvalidPrecision(String, String),
    /// A column directive that could not be understood.
    #[error("Malformed column directive [@{0}].")]
    MalformedDirective(String),
    /// Unknown column type token in a directive.
    #[error("Invalid column type [{0}], expected one of {1}.")]
    UnknownColumnType(String, String),
    /// A data line with the wrong number of fields.
    #[error("Line {0} has {1} fields, expected {2}.")]
    FieldCount(usize, usize, usize),
    /// A field that could not be parsed as its column's declared type.
    #[error("Invalid {1} value [{2}] for column [{0}] on line {3}.")]
    InvalidValue(String, String, String, usize),
    /// No target column was declared.
    #[error("No target column defined.")]
    MissingTarget,
    /// Lookup of a column name that does not exist.
    #[error("Unknown column [{0}].")]
    UnknownColumn(String),
    /// Unable to read a table or model from a file.
    #[error("Unable to read from file: {0}")]
    UnableToRead(String),
    /// Unable to write a table or model to a file.
    #[error("Unable to write to file: {0}")]
    UnableToWrite(String),
    /// Tree induction requires at least one row.
    #[error("Cannot induce a tree from an empty table.")]
    EmptyTable,
}
