//! Fixed-size set of data types backed by a bitmask.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::DataType;

/// A set of [`DataType`]s.
///
/// Iteration always follows declaration order of [`DataType`], so two equal
/// sets produce identical sequences.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<DataType>", from = "Vec<DataType>")]
pub struct DataTypeSet {
    bits: u32,
}

const ALL_BITS: u32 = (1 << DataType::COUNT) - 1;

impl DataTypeSet {
    /// An empty set.
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Every known data type.
    pub const fn all() -> Self {
        Self { bits: ALL_BITS }
    }

    const fn bit(data_type: DataType) -> u32 {
        1 << data_type.index()
    }

    pub fn put(&mut self, data_type: DataType) {
        self.bits |= Self::bit(data_type);
    }

    pub fn put_all(&mut self, other: DataTypeSet) {
        self.bits |= other.bits;
    }

    pub fn remove(&mut self, data_type: DataType) {
        self.bits &= !Self::bit(data_type);
    }

    pub fn remove_all(&mut self, other: DataTypeSet) {
        self.bits &= !other.bits;
    }

    pub fn retain_all(&mut self, other: DataTypeSet) {
        self.bits &= other.bits;
    }

    pub fn clear(&mut self) {
        self.bits = 0;
    }

    pub const fn has(&self, data_type: DataType) -> bool {
        self.bits & Self::bit(data_type) != 0
    }

    pub const fn has_all(&self, other: DataTypeSet) -> bool {
        self.bits & other.bits == other.bits
    }

    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub const fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    #[must_use]
    pub const fn union(self, other: DataTypeSet) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    #[must_use]
    pub const fn intersection(self, other: DataTypeSet) -> Self {
        Self {
            bits: self.bits & other.bits,
        }
    }

    #[must_use]
    pub const fn difference(self, other: DataTypeSet) -> Self {
        Self {
            bits: self.bits & !other.bits,
        }
    }

    pub fn iter(&self) -> Iter {
        Iter {
            bits: self.bits,
            next: 0,
        }
    }
}

/// Iterator over the members of a [`DataTypeSet`].
#[derive(Debug, Clone)]
pub struct Iter {
    bits: u32,
    next: usize,
}

impl Iterator for Iter {
    type Item = DataType;

    fn next(&mut self) -> Option<DataType> {
        while self.next < DataType::COUNT {
            let index = self.next;
            self.next += 1;
            if self.bits & (1 << index) != 0 {
                return Some(DataType::ALL[index]);
            }
        }
        None
    }
}

impl IntoIterator for DataTypeSet {
    type Item = DataType;
    type IntoIter = Iter;

    fn into_iter(self) -> Iter {
        self.iter()
    }
}

impl IntoIterator for &DataTypeSet {
    type Item = DataType;
    type IntoIter = Iter;

    fn into_iter(self) -> Iter {
        self.iter()
    }
}

impl FromIterator<DataType> for DataTypeSet {
    fn from_iter<I: IntoIterator<Item = DataType>>(iter: I) -> Self {
        let mut set = DataTypeSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<DataType> for DataTypeSet {
    fn extend<I: IntoIterator<Item = DataType>>(&mut self, iter: I) {
        for data_type in iter {
            self.put(data_type);
        }
    }
}

impl<const N: usize> From<[DataType; N]> for DataTypeSet {
    fn from(types: [DataType; N]) -> Self {
        types.into_iter().collect()
    }
}

impl From<Vec<DataType>> for DataTypeSet {
    fn from(types: Vec<DataType>) -> Self {
        types.into_iter().collect()
    }
}

impl From<DataTypeSet> for Vec<DataType> {
    fn from(set: DataTypeSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for DataTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for DataTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(DataType::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
