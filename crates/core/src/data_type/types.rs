//! The closed set of sync-able data types and their static classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scheduling class of a data type. Decides which configuration batch the
/// type travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Bookkeeping types the engine depends on internally.
    Control,
    /// Important and/or urgent user types.
    High,
    /// Everything that is neither control, high nor low priority.
    Regular,
    /// High-volume types, downloaded last.
    Low,
}

/// One independently synchronizable category of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataType {
    Nigori = 0,
    DeviceInfo,
    UserConsents,
    SecurityEvents,
    SharingMessage,
    Bookmarks,
    Preferences,
    Passwords,
    Autofill,
    Themes,
    Sessions,
    SavedTabGroups,
    ReadingList,
    History,
    HistoryDeleteDirectives,
    UserEvents,
}

impl DataType {
    /// Number of variants.
    pub const COUNT: usize = 16;

    /// All variants, in declaration order.
    pub const ALL: [DataType; Self::COUNT] = [
        DataType::Nigori,
        DataType::DeviceInfo,
        DataType::UserConsents,
        DataType::SecurityEvents,
        DataType::SharingMessage,
        DataType::Bookmarks,
        DataType::Preferences,
        DataType::Passwords,
        DataType::Autofill,
        DataType::Themes,
        DataType::Sessions,
        DataType::SavedTabGroups,
        DataType::ReadingList,
        DataType::History,
        DataType::HistoryDeleteDirectives,
        DataType::UserEvents,
    ];

    /// Position of this type in [`DataType::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn priority(self) -> Priority {
        match self {
            DataType::Nigori => Priority::Control,
            DataType::DeviceInfo
            | DataType::UserConsents
            | DataType::SecurityEvents
            | DataType::SharingMessage => Priority::High,
            DataType::History | DataType::HistoryDeleteDirectives | DataType::UserEvents => {
                Priority::Low
            }
            _ => Priority::Regular,
        }
    }

    /// Commit-only types upload local changes but never download anything.
    pub const fn is_commit_only(self) -> bool {
        matches!(
            self,
            DataType::UserConsents
                | DataType::SecurityEvents
                | DataType::SharingMessage
                | DataType::UserEvents
        )
    }

    pub const fn is_control(self) -> bool {
        matches!(self.priority(), Priority::Control)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Nigori => "nigori",
            DataType::DeviceInfo => "device_info",
            DataType::UserConsents => "user_consents",
            DataType::SecurityEvents => "security_events",
            DataType::SharingMessage => "sharing_message",
            DataType::Bookmarks => "bookmarks",
            DataType::Preferences => "preferences",
            DataType::Passwords => "passwords",
            DataType::Autofill => "autofill",
            DataType::Themes => "themes",
            DataType::Sessions => "sessions",
            DataType::SavedTabGroups => "saved_tab_groups",
            DataType::ReadingList => "reading_list",
            DataType::History => "history",
            DataType::HistoryDeleteDirectives => "history_delete_directives",
            DataType::UserEvents => "user_events",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_indexed_by_discriminant() {
        for (i, data_type) in DataType::ALL.iter().enumerate() {
            assert_eq!(data_type.index(), i);
        }
    }

    #[test]
    fn test_priority_classification() {
        assert_eq!(DataType::Nigori.priority(), Priority::Control);
        assert_eq!(DataType::DeviceInfo.priority(), Priority::High);
        assert_eq!(DataType::Bookmarks.priority(), Priority::Regular);
        assert_eq!(DataType::Passwords.priority(), Priority::Regular);
        assert_eq!(DataType::History.priority(), Priority::Low);
        assert!(DataType::Nigori.is_control());
        assert!(!DataType::Bookmarks.is_control());
    }

    #[test]
    fn test_commit_only_types() {
        assert!(DataType::UserEvents.is_commit_only());
        assert!(DataType::UserConsents.is_commit_only());
        assert!(!DataType::Bookmarks.is_commit_only());
    }

    #[test]
    fn test_serde_names_match_as_str() {
        for data_type in DataType::ALL {
            let json = serde_json::to_string(&data_type).unwrap();
            assert_eq!(json, format!("\"{}\"", data_type.as_str()));
        }
        let parsed: DataType = serde_json::from_str("\"saved_tab_groups\"").unwrap();
        assert_eq!(parsed, DataType::SavedTabGroups);
    }
}
