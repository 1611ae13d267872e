//! Per data type failure ledger.
//!
//! Each data type carries at most one [`SyncError`] at a time. Recording a
//! new error for a type replaces whatever was stored for it before.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_type::{DataType, DataTypeSet};

/// Classification of a data type failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Engine or controller failure. Sticks until the table is reset.
    Fatal,
    /// Missing key material. Cleared once the cryptographer is ready again.
    Crypto,
    /// Preconditions not met yet; local data is kept.
    Unready,
    /// Administratively disallowed; local data is cleared.
    Policy,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Fatal => "fatal",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Unready => "unready",
            ErrorKind::Policy => "policy",
        };
        f.write_str(name)
    }
}

/// A failure attributed to one data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    pub data_type: DataType,
    pub kind: ErrorKind,
    pub message: String,
}

impl SyncError {
    pub fn new(data_type: DataType, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            data_type,
            kind,
            message: message.into(),
        }
    }

    pub fn fatal(data_type: DataType, message: impl Into<String>) -> Self {
        Self::new(data_type, ErrorKind::Fatal, message)
    }

    pub fn crypto(data_type: DataType) -> Self {
        Self::new(data_type, ErrorKind::Crypto, "")
    }

    pub fn unready(data_type: DataType, message: impl Into<String>) -> Self {
        Self::new(data_type, ErrorKind::Unready, message)
    }

    pub fn policy(data_type: DataType, message: impl Into<String>) -> Self {
        Self::new(data_type, ErrorKind::Policy, message)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error for {}", self.kind, self.data_type)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Errors keyed by the data type they belong to.
pub type TypeErrorMap = BTreeMap<DataType, SyncError>;

/// In-memory ledger mapping data types to their current failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTypeStatusTable {
    errors: TypeErrorMap,
}

impl DataTypeStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `errors` into the table. For each type the incoming error wins.
    pub fn update_failed_data_types(&mut self, errors: TypeErrorMap) {
        for (data_type, error) in errors {
            self.update_failed_data_type(data_type, error);
        }
    }

    /// Records `error` for `data_type`. Returns true if the classification
    /// of the type changed.
    pub fn update_failed_data_type(&mut self, data_type: DataType, error: SyncError) -> bool {
        debug_assert_eq!(data_type, error.data_type);
        let kind = error.kind;
        let previous = self.errors.insert(data_type, error);
        previous.map_or(true, |e| e.kind != kind)
    }

    pub fn reset(&mut self) {
        self.errors.clear();
    }

    pub fn reset_crypto_errors(&mut self) {
        self.errors.retain(|_, e| e.kind != ErrorKind::Crypto);
    }

    /// Clears a policy error for `data_type`. Returns true if one was present.
    pub fn reset_policy_error_for(&mut self, data_type: DataType) -> bool {
        self.reset_error_of_kind(data_type, ErrorKind::Policy)
    }

    /// Clears an unready error for `data_type`. Returns true if one was present.
    pub fn reset_unready_error_for(&mut self, data_type: DataType) -> bool {
        self.reset_error_of_kind(data_type, ErrorKind::Unready)
    }

    fn reset_error_of_kind(&mut self, data_type: DataType, kind: ErrorKind) -> bool {
        match self.errors.get(&data_type) {
            Some(existing) if existing.kind == kind => {
                self.errors.remove(&data_type);
                true
            }
            _ => false,
        }
    }

    pub fn error_for(&self, data_type: DataType) -> Option<&SyncError> {
        self.errors.get(&data_type)
    }

    pub fn all_errors(&self) -> &TypeErrorMap {
        &self.errors
    }

    /// Types with an error of any kind.
    pub fn failed_types(&self) -> DataTypeSet {
        self.errors.keys().copied().collect()
    }

    /// Types that stay excluded until explicitly reset: fatal and policy
    /// errors.
    pub fn fatal_error_types(&self) -> DataTypeSet {
        self.types_with(|kind| matches!(kind, ErrorKind::Fatal | ErrorKind::Policy))
    }

    pub fn crypto_error_types(&self) -> DataTypeSet {
        self.types_with(|kind| kind == ErrorKind::Crypto)
    }

    pub fn unready_error_types(&self) -> DataTypeSet {
        self.types_with(|kind| kind == ErrorKind::Unready)
    }

    pub fn policy_error_types(&self) -> DataTypeSet {
        self.types_with(|kind| kind == ErrorKind::Policy)
    }

    fn types_with(&self, pred: impl Fn(ErrorKind) -> bool) -> DataTypeSet {
        self.errors
            .values()
            .filter(|e| pred(e.kind))
            .map(|e| e.data_type)
            .collect()
    }
}
