//! Content items and the subscriber interest map.
//!
//! Both are opaque facts computed outside the pool: which items are worth
//! fetching, and which subscribers follow which channels.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One downloadable item, keyed by a stable content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Content Identifier. Two fetches with the same id are the same item.
    pub id: String,
    pub title: String,
    /// Upstream source the item was published on
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<NaiveDate>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            channel: channel.into(),
            published: None,
        }
    }
}

/// A subscriber and the channels they follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub name: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

impl Subscriber {
    pub fn new<I, S>(name: impl Into<String>, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn follows(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }
}

/// Read-only mapping from subscriber to followed channels for one run.
///
/// Subscriber order is preserved so link creation and logs are reproducible.
#[derive(Debug, Clone, Default)]
pub struct InterestMap {
    subscribers: Vec<Subscriber>,
}

impl InterestMap {
    pub fn new(subscribers: Vec<Subscriber>) -> Self {
        Self { subscribers }
    }

    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.subscribers.iter().map(|s| s.name.as_str())
    }

    /// Subscribers who should receive `item`.
    pub fn interested_in(&self, item: &ContentItem) -> Vec<&Subscriber> {
        self.subscribers
            .iter()
            .filter(|s| s.follows(&item.channel))
            .collect()
    }

    /// Every channel followed by at least one subscriber, first-seen order.
    pub fn channel_pool(&self) -> Vec<&str> {
        let mut pool: Vec<&str> = Vec::new();
        for channel in self.subscribers.iter().flat_map(|s| s.channels.iter()) {
            if !pool.contains(&channel.as_str()) {
                pool.push(channel);
            }
        }
        pool
    }
}
