//! Mock encryption handler for testing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::data_type::DataTypeSet;
use crate::encryption::DataTypeEncryptionHandler;

#[derive(Debug, Default)]
struct Inner {
    crypto_error: bool,
    encrypted_types: DataTypeSet,
}

/// Mock implementation of [`DataTypeEncryptionHandler`].
///
/// Starts without a crypto error and with nothing encrypted.
#[derive(Debug, Clone, Default)]
pub struct MockEncryptionHandler {
    inner: Arc<Mutex<Inner>>,
}

impl MockEncryptionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_crypto_error(&self, crypto_error: bool) {
        self.inner().crypto_error = crypto_error;
    }

    pub fn set_encrypted_types(&self, types: DataTypeSet) {
        self.inner().encrypted_types = types;
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataTypeEncryptionHandler for MockEncryptionHandler {
    fn has_crypto_error(&self) -> bool {
        self.inner().crypto_error
    }

    fn encrypted_data_types(&self) -> DataTypeSet {
        self.inner().encrypted_types
    }
}
