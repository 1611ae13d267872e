//! Data types and sets of data types.
//!
//! The set of data types is closed and known at compile time. Each type is
//! statically assigned one [`Priority`] class, which decides the order in
//! which types are configured.

mod set;
mod types;

pub use set::{DataTypeSet, Iter};
pub use types::{DataType, Priority};

fn types_with_priority(priority: Priority) -> DataTypeSet {
    DataType::ALL
        .into_iter()
        .filter(|t| t.priority() == priority)
        .collect()
}

/// Types the engine itself depends on. Always configured before anything else.
pub fn control_types() -> DataTypeSet {
    types_with_priority(Priority::Control)
}

pub fn high_priority_user_types() -> DataTypeSet {
    types_with_priority(Priority::High)
}

pub fn low_priority_user_types() -> DataTypeSet {
    types_with_priority(Priority::Low)
}

/// Every type that is not a control type.
pub fn user_types() -> DataTypeSet {
    DataTypeSet::all().difference(control_types())
}

/// Types that never need to be downloaded.
pub fn commit_only_types() -> DataTypeSet {
    DataType::ALL
        .into_iter()
        .filter(|t| t.is_commit_only())
        .collect()
}
