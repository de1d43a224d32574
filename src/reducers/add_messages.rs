use super::Reducer;
use crate::{node::NodePartial, state::VersionedState};

#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddMessages;

impl Reducer for AddMessages {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(messages) = &update.messages
            && !messages.is_empty()
        {
            state.messages.extend(messages.iter().cloned());
        }
    }
}
