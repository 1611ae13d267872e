//! Read-only view of the encryption subsystem.

use crate::data_type::DataTypeSet;

/// Reports whether encrypted data types can currently be decrypted.
pub trait DataTypeEncryptionHandler: Send {
    /// True while key material is missing for encrypted types.
    fn has_crypto_error(&self) -> bool;

    /// Types whose data is encrypted.
    fn encrypted_data_types(&self) -> DataTypeSet;
}
