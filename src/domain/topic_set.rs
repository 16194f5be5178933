//! Per-connection topic subscriptions.
//!
//! Matching is a literal prefix test: a subscription `"img"` matches
//! `"img/42"` and `"imgs"`, but not `"images/42"`. The wildcard `"*"` matches everything and, when
//! requested, replaces every other entry.

/// Wildcard sentinel subscription.
pub const WILDCARD: &str = "*";

/// Ordered, de-duplicated set of topic prefixes a connection listens to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSet {
    topics: Vec<String>,
}

impl TopicSet {
    /// Creates an empty set that matches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the subscription set granted on successful authorization.
    ///
    /// If `requested` contains [`WILDCARD`] the result is exactly `["*"]`;
    /// otherwise it is `requested` followed by `always_on`, keeping first
    /// occurrences only.
    #[must_use]
    pub fn granted<I, S>(requested: I, always_on: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested: Vec<String> = requested.into_iter().map(Into::into).collect();
        if requested.iter().any(|t| t == WILDCARD) {
            return Self {
                topics: vec![WILDCARD.to_string()],
            };
        }

        let mut topics: Vec<String> = Vec::with_capacity(requested.len() + always_on.len());
        for topic in requested
            .into_iter()
            .chain(always_on.iter().map(|t| (*t).to_string()))
        {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        Self { topics }
    }

    /// Returns `true` if any subscription is the wildcard or a prefix of `topic`.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        self.topics
            .iter()
            .any(|t| t == WILDCARD || topic.starts_with(t.as_str()))
    }

    /// Returns `true` if the set collapsed to the wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.topics.len() == 1 && self.topics.iter().all(|t| t == WILDCARD)
    }

    /// Subscriptions in grant order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.topics
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Returns `true` if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
