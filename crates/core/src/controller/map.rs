//! Fixed-size arena of controllers indexed by data type.

use crate::data_type::{DataType, DataTypeSet};
use crate::manager::ManagerError;

use super::traits::DataTypeController;

/// A boxed controller as stored by the manager.
pub type BoxedController = Box<dyn DataTypeController>;

/// Controllers keyed by their data type.
///
/// Built once when the manager is constructed. Controllers are never
/// replaced afterwards, only started and stopped.
pub struct ControllerMap {
    slots: [Option<BoxedController>; DataType::COUNT],
}

impl ControllerMap {
    /// Build the map, rejecting duplicates and controllers for control types.
    pub fn new(controllers: Vec<BoxedController>) -> Result<Self, ManagerError> {
        let mut slots: [Option<BoxedController>; DataType::COUNT] = std::array::from_fn(|_| None);

        for controller in controllers {
            let data_type = controller.data_type();
            if data_type.is_control() {
                return Err(ManagerError::ControlTypeController(data_type));
            }
            let slot = &mut slots[data_type.index()];
            if slot.is_some() {
                return Err(ManagerError::DuplicateController(data_type));
            }
            *slot = Some(controller);
        }

        Ok(Self { slots })
    }

    pub fn get(&self, data_type: DataType) -> Option<&BoxedController> {
        self.slots[data_type.index()].as_ref()
    }

    pub fn get_mut(&mut self, data_type: DataType) -> Option<&mut BoxedController> {
        self.slots[data_type.index()].as_mut()
    }

    pub fn contains(&self, data_type: DataType) -> bool {
        self.slots[data_type.index()].is_some()
    }

    /// Types that have a controller.
    pub fn types(&self) -> DataTypeSet {
        self.iter().map(|(data_type, _)| data_type).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataType, &BoxedController)> {
        DataType::ALL
            .into_iter()
            .zip(self.slots.iter())
            .filter_map(|(data_type, slot)| slot.as_ref().map(|c| (data_type, c)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (DataType, &mut BoxedController)> {
        DataType::ALL
            .into_iter()
            .zip(self.slots.iter_mut())
            .filter_map(|(data_type, slot)| slot.as_mut().map(|c| (data_type, c)))
    }
}

impl std::fmt::Debug for ControllerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(data_type, c)| (data_type, c.state())))
            .finish()
    }
}
