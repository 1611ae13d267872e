//! Splits a set of data types into ordered configuration batches.

use std::collections::VecDeque;

use crate::data_type::{
    control_types, high_priority_user_types, low_priority_user_types, DataTypeSet,
};

/// Divides `types` into batches ordered from highest to lowest priority:
/// control, high priority, regular, low priority. Empty classes are skipped.
///
/// An empty input still yields one empty batch, so that the engine gets a
/// purge-only pass.
pub fn prioritize_types(types: DataTypeSet) -> VecDeque<DataTypeSet> {
    // Control types are normally configured by the engine before anything
    // else, but listing them first keeps migration and ephemeral restarts
    // consistent.
    let control = control_types().intersection(types);
    let high_priority = high_priority_user_types().intersection(types);
    // Low priority types tend to be large; they must not delay initial sync
    // of everything else.
    let low_priority = low_priority_user_types().intersection(types);
    let regular = types.difference(control.union(high_priority).union(low_priority));

    let mut batches: VecDeque<DataTypeSet> = [control, high_priority, regular, low_priority]
        .into_iter()
        .filter(|batch| !batch.is_empty())
        .collect();

    if batches.is_empty() {
        batches.push_back(DataTypeSet::new());
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::DataType;

    #[test]
    fn test_all_priority_classes_in_order() {
        let types = DataTypeSet::from([
            DataType::History,
            DataType::Bookmarks,
            DataType::DeviceInfo,
            DataType::Nigori,
            DataType::Passwords,
        ]);

        let batches: Vec<DataTypeSet> = prioritize_types(types).into_iter().collect();

        assert_eq!(
            batches,
            vec![
                DataTypeSet::from([DataType::Nigori]),
                DataTypeSet::from([DataType::DeviceInfo]),
                DataTypeSet::from([DataType::Bookmarks, DataType::Passwords]),
                DataTypeSet::from([DataType::History]),
            ]
        );
    }

    #[test]
    fn test_skips_empty_classes() {
        let types = DataTypeSet::from([DataType::Nigori, DataType::Bookmarks]);
        let batches = prioritize_types(types);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], DataTypeSet::from([DataType::Nigori]));
        assert_eq!(batches[1], DataTypeSet::from([DataType::Bookmarks]));
    }

    #[test]
    fn test_empty_input_yields_single_empty_batch() {
        let batches = prioritize_types(DataTypeSet::new());
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
    }

    #[test]
    fn test_batches_are_disjoint_and_cover_input() {
        let types = DataTypeSet::all();
        let batches = prioritize_types(types);
        assert_eq!(batches.len(), 4);

        let mut seen = DataTypeSet::new();
        for batch in &batches {
            assert!(seen.intersection(*batch).is_empty());
            seen.put_all(*batch);
        }
        assert_eq!(seen, types);
    }
}
