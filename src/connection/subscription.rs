//! Per-connection subscription registry.
//!
//! Remembers the one topic the client is interested in and hands out
//! subscription ids. An id is only valid for the session it was issued
//! in: after a link loss the topic is kept and a fresh id is issued on the
//! next handshake.

/// A subscription issued on the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Wire id, `sub-<n>`.
    pub id: String,
    /// Destination subscribed to.
    pub topic: String,
}

/// Tracks the registered topic and the active subscription id.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Last number handed out; ids are strictly increasing.
    issued: u64,
    /// Topic to (re-)subscribe after each handshake.
    topic: Option<String>,
    /// Id valid on the current session.
    active: Option<String>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `topic`, replacing any previous one.
    ///
    /// Returns the id that was active for the previous topic so the caller
    /// can unsubscribe it.
    pub fn register(&mut self, topic: &str) -> Option<String> {
        self.topic = Some(topic.to_owned());
        self.active.take()
    }

    /// Forgets the topic, returning the id that was active for it.
    pub fn clear(&mut self) -> Option<String> {
        self.topic = None;
        self.active.take()
    }

    /// Issues a fresh id for the registered topic, if there is one.
    pub fn activate(&mut self) -> Option<Subscription> {
        let topic = self.topic.clone()?;
        self.issued += 1;
        let id = format!("sub-{}", self.issued);
        self.active = Some(id.clone());
        Some(Subscription { id, topic })
    }

    /// Marks the active id as dead. The topic stays registered.
    pub fn invalidate(&mut self) {
        self.active = None;
    }

    /// Returns `true` if `id` is the active subscription.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    /// Registered topic.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Active subscription id.
    #[must_use]
    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_activates_nothing() {
        let mut reg = SubscriptionRegistry::new();
        assert!(reg.activate().is_none());
        assert!(!reg.matches("sub-1"));
    }

    #[test]
    fn first_id_is_sub_1() {
        let mut reg = SubscriptionRegistry::new();
        reg.register("/list/score");
        let Some(sub) = reg.activate() else {
            panic!("expected a subscription");
        };
        assert_eq!(sub.id, "sub-1");
        assert_eq!(sub.topic, "/list/score");
        assert!(reg.matches("sub-1"));
    }

    #[test]
    fn invalidate_keeps_topic_and_next_id_is_fresh() {
        let mut reg = SubscriptionRegistry::new();
        reg.register("/list/score");
        reg.activate();
        reg.invalidate();
        assert!(!reg.matches("sub-1"));
        assert_eq!(reg.topic(), Some("/list/score"));
        let Some(sub) = reg.activate() else {
            panic!("expected a subscription");
        };
        assert_eq!(sub.id, "sub-2");
    }

    #[test]
    fn register_returns_previous_active_id() {
        let mut reg = SubscriptionRegistry::new();
        reg.register("/a");
        reg.activate();
        assert_eq!(reg.register("/b").as_deref(), Some("sub-1"));
        assert!(reg.active_id().is_none());
    }

    #[test]
    fn clear_forgets_topic() {
        let mut reg = SubscriptionRegistry::new();
        reg.register("/a");
        reg.activate();
        assert_eq!(reg.clear().as_deref(), Some("sub-1"));
        assert!(reg.topic().is_none());
        assert!(reg.activate().is_none());
    }
}
