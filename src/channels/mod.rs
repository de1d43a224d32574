//! Versioned channels backing `VersionedState`.
//!
//! Each channel is a named slot in a thread's state with its own version
//! counter (`spec.md` GLOSSARY: "Channel"). Reducers append/merge into a
//! channel's contents; the channel itself only tracks the monotonic version
//! bump once a merge actually changed something (see `engine::apply_barrier`).

pub mod errors;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;
use errors::ErrorEvent;

/// Common surface every versioned channel exposes to reducers and the barrier step.
pub trait Channel {
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
    fn bump(&mut self) {
        self.set_version(self.version().saturating_add(1));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MessagesChannel {
    version: u32,
    items: Vec<Message>,
}

impl MessagesChannel {
    pub fn new(items: Vec<Message>, version: u32) -> Self {
        Self { version, items }
    }

    pub fn push(&mut self, message: Message) {
        self.items.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.items.extend(messages);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.items.clone()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.items
    }
}

impl Channel for MessagesChannel {
    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExtrasChannel {
    version: u32,
    map: FxHashMap<String, Value>,
}

impl ExtrasChannel {
    pub fn new(map: FxHashMap<String, Value>, version: u32) -> Self {
        Self { version, map }
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.map.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn snapshot(&self) -> FxHashMap<String, Value> {
        self.map.clone()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }
}

impl Channel for ExtrasChannel {
    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ErrorsChannel {
    version: u32,
    items: Vec<ErrorEvent>,
}

impl ErrorsChannel {
    pub fn new(items: Vec<ErrorEvent>, version: u32) -> Self {
        Self { version, items }
    }

    pub fn push(&mut self, error: ErrorEvent) {
        self.items.push(error);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ErrorEvent> {
        self.items.clone()
    }
}

impl Channel for ErrorsChannel {
    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}
