use super::Reducer;
use crate::{node::NodePartial, state::VersionedState};

#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddErrors;

impl Reducer for AddErrors {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(errors) = &update.errors
            && !errors.is_empty()
        {
            for error in errors {
                state.errors.push(error.clone());
            }
        }
    }
}
