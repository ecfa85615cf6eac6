use std::collections::HashMap;

use crate::hub::Mailbox;

pub type SubscriberId = u64;

/// Subscribers of a single topic, keyed by subscriber id.
#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscribers: HashMap<SubscriberId, Mailbox>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
        }
    }

    pub fn subscribe(&mut self, id: SubscriberId, mailbox: Mailbox) {
        self.subscribers.insert(id, mailbox);
    }

    /// Returns whether `id` was subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Topic to subscriber mapping owned by a hub.
///
/// The registry never keeps an empty topic around: removing the last
/// subscriber of a topic removes the topic itself.
#[derive(Debug, Default)]
pub struct Registry {
    topics: HashMap<String, Topic>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber, creating the topic if it doesn't exist.
    pub fn insert(&mut self, topic: &str, id: SubscriberId, mailbox: Mailbox) {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(id, mailbox);
    }

    /// Removes a subscriber and drops the topic once it has no subscribers.
    /// Returns whether the subscriber was registered.
    pub fn remove(&mut self, topic: &str, id: SubscriberId) -> bool {
        let Some(t) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = t.unsubscribe(id);
        if t.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Iterates over the mailboxes registered under `topic`.
    pub fn subscribers<'a>(
        &'a self,
        topic: &str,
    ) -> impl Iterator<Item = (SubscriberId, &'a Mailbox)> + use<'a> {
        self.topics
            .get(topic)
            .into_iter()
            .flat_map(|t| t.subscribers.iter().map(|(id, mailbox)| (*id, mailbox)))
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |t| t.subscribers.len())
    }
}
