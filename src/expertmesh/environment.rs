//! Message bus.
//!
//! The [`Environment`] owns every registered [`Worker`] and routes published
//! [`AgentMessage`]s into their mailboxes. Workers are kept in a map keyed by id plus a
//! registration-order vector, which is the order broadcasts are delivered and reactive rounds
//! poll workers in.
//!
//! Routing rules:
//! - a broadcast reaches every registered worker except the sender
//! - a direct message reaches every registered id in its recipient set
//! - unknown recipients are dropped with a [`RoutingWarning`] logged at `warn`
//!
//! ```rust
//! use expertmesh::clients::mock::MockClient;
//! use expertmesh::message::{CauseBy, Recipients};
//! use expertmesh::{Environment, Role, Worker};
//! use std::sync::Arc;
//!
//! let client = Arc::new(MockClient::new());
//! let mut env = Environment::default();
//! env.register(Worker::new("A", "Alice", client.clone())).unwrap();
//! env.register(Worker::new("B", "Bob", client)).unwrap();
//!
//! let msg = env.create_message("hi", Recipients::one("B"), CauseBy::DirectCommunication, Role::User);
//! assert!(env.publish("A", msg));
//! assert_eq!(env.worker("B").unwrap().context().mailbox().len(), 1);
//! assert_eq!(env.worker("A").unwrap().context().mailbox().len(), 0);
//! ```

use crate::expertmesh::client_wrapper::Role;
use crate::expertmesh::config::BusConfig;
use crate::expertmesh::error::{RegistryError, RoutingWarning};
use crate::expertmesh::message::{AgentMessage, CauseBy, Recipients};
use crate::expertmesh::worker::Worker;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Where a published message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub message_id: String,
    /// Ids whose mailbox received the message, in delivery order.
    pub delivered_to: Vec<String>,
    pub warnings: Vec<RoutingWarning>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        !self.delivered_to.is_empty()
    }
}

/// Serializable snapshot returned by [`Environment::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentStatus {
    pub worker_count: usize,
    pub message_count: usize,
    pub is_idle: bool,
    pub workers: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Environment {
    workers: HashMap<String, Worker>,
    order: Vec<String>,
    history: VecDeque<AgentMessage>,
    config: BusConfig,
}

impl Environment {
    pub fn new(config: BusConfig) -> Self {
        Self {
            workers: HashMap::new(),
            order: Vec::new(),
            history: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Add `worker` to the bus, sizing its mailbox to the configured capacity.
    ///
    /// Fails if a worker with the same id is already registered.
    pub fn register(&mut self, mut worker: Worker) -> Result<(), RegistryError> {
        if self.workers.contains_key(&worker.id) {
            return Err(RegistryError::DuplicateWorker(worker.id.clone()));
        }
        worker.set_mailbox_capacity(self.config.mailbox_capacity);
        log::info!("worker {} ({}) joined the environment", worker.id, worker.name);
        self.order.push(worker.id.clone());
        self.workers.insert(worker.id.clone(), worker);
        Ok(())
    }

    /// Remove and return the worker registered as `id`, if any.
    pub fn unregister(&mut self, id: &str) -> Option<Worker> {
        let worker = self.workers.remove(id)?;
        self.order.retain(|existing| existing != id);
        log::info!("worker {} left the environment", id);
        Some(worker)
    }

    /// Publish `message` on behalf of `sender`. Returns `true` if at least one mailbox
    /// received it.
    pub fn publish(&mut self, sender: &str, message: AgentMessage) -> bool {
        self.publish_with_report(sender, message).delivered()
    }

    /// Like [`publish`](Environment::publish) but reports exactly where the message went.
    pub fn publish_with_report(&mut self, sender: &str, mut message: AgentMessage) -> DeliveryReport {
        message.sent_from = sender.to_string();

        let targets: Vec<String> = if message.send_to.is_broadcast() {
            self.order
                .iter()
                .filter(|id| id.as_str() != sender)
                .cloned()
                .collect()
        } else {
            message.send_to.ids().map(str::to_string).collect()
        };

        let mut report = DeliveryReport {
            message_id: message.id.clone(),
            delivered_to: Vec::with_capacity(targets.len()),
            warnings: Vec::new(),
        };

        for target in targets {
            match self.workers.get_mut(&target) {
                Some(worker) => {
                    worker.receive(message.clone());
                    report.delivered_to.push(target);
                }
                None => report.warnings.push(RoutingWarning::UnknownRecipient {
                    message_id: message.id.clone(),
                    recipient: target,
                }),
            }
        }

        if report.delivered_to.is_empty() {
            report.warnings.push(RoutingWarning::Undelivered {
                message_id: message.id.clone(),
            });
        }
        for warning in &report.warnings {
            log::warn!("{}", warning);
        }

        log::debug!(
            "published {} -> {}: {}",
            message.sent_from,
            message.send_to,
            message.preview(50)
        );
        self.remember(message);
        report
    }

    fn remember(&mut self, message: AgentMessage) {
        self.history.push_back(message);
        while self.history.len() > self.config.history_limit.max(1) {
            self.history.pop_front();
        }
    }

    /// The last `limit` retained messages, or all of them for `None`, oldest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<&AgentMessage> {
        let skip = match limit {
            Some(limit) => self.history.len().saturating_sub(limit),
            None => 0,
        };
        self.history.iter().skip(skip).collect()
    }

    /// Messages sent between `a` and `b` in either direction, oldest first.
    pub fn conversation_between(&self, a: &str, b: &str) -> Vec<&AgentMessage> {
        self.history
            .iter()
            .filter(|m| {
                (m.sent_from == a && m.send_to.contains(b))
                    || (m.sent_from == b && m.send_to.contains(a))
            })
            .collect()
    }

    /// Every registered worker is idle. Vacuously true for an empty bus.
    pub fn is_idle(&self) -> bool {
        self.workers.values().all(Worker::is_idle)
    }

    /// Build an unpublished message. `sent_from` is filled in by [`publish`](Environment::publish).
    pub fn create_message(
        &self,
        content: impl Into<String>,
        send_to: Recipients,
        cause_by: CauseBy,
        role: Role,
    ) -> AgentMessage {
        AgentMessage::new(content, role, cause_by, send_to)
    }

    pub fn status(&self) -> EnvironmentStatus {
        EnvironmentStatus {
            worker_count: self.workers.len(),
            message_count: self.history.len(),
            is_idle: self.is_idle(),
            workers: self.order.clone(),
        }
    }

    /// Drop every worker and the message history.
    pub fn clear(&mut self) {
        self.workers.clear();
        self.order.clear();
        self.history.clear();
        log::info!("environment cleared");
    }

    /// Registered ids in registration order.
    pub fn worker_ids(&self) -> &[String] {
        &self.order
    }

    pub fn worker(&self, id: &str) -> Option<&Worker> {
        self.workers.get(id)
    }

    pub fn worker_mut(&mut self, id: &str) -> Option<&mut Worker> {
        self.workers.get_mut(id)
    }

    /// Workers in registration order.
    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.order.iter().filter_map(|id| self.workers.get(id))
    }

    pub fn workers_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.workers.values_mut()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expertmesh::clients::mock::MockClient;
    use std::sync::Arc;

    fn env_with(ids: &[&str], config: BusConfig) -> Environment {
        let client = Arc::new(MockClient::new());
        let mut env = Environment::new(config);
        for id in ids {
            env.register(Worker::new(*id, id.to_uppercase(), client.clone()))
                .unwrap();
        }
        env
    }

    fn direct(env: &Environment, to: &str) -> AgentMessage {
        env.create_message("hello", Recipients::one(to), CauseBy::DirectCommunication, Role::User)
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut env = env_with(&["a"], BusConfig::default());
        let again = Worker::new("a", "Again", Arc::new(MockClient::new()));
        assert_eq!(
            env.register(again).unwrap_err(),
            RegistryError::DuplicateWorker("a".into())
        );
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut env = env_with(&["a", "b"], BusConfig::default());
        assert!(env.unregister("a").is_some());
        assert!(env.unregister("a").is_none());
        assert_eq!(env.worker_ids(), &["b".to_string()]);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let mut env = env_with(&["a", "b", "c"], BusConfig::default());
        let msg = env.create_message("all", Recipients::broadcast(), CauseBy::Broadcast, Role::User);
        let report = env.publish_with_report("a", msg);
        assert_eq!(report.delivered_to, vec!["b".to_string(), "c".to_string()]);
        assert!(report.warnings.is_empty());
        assert!(env.worker("a").unwrap().context().mailbox().is_empty());
    }

    #[test]
    fn test_unknown_recipient_warns_but_delivers_to_known() {
        let mut env = env_with(&["a", "b"], BusConfig::default());
        let msg = env.create_message(
            "x",
            Recipients::many(vec!["b", "ghost"]).unwrap(),
            CauseBy::DirectCommunication,
            Role::User,
        );
        let report = env.publish_with_report("a", msg);
        assert_eq!(report.delivered_to, vec!["b".to_string()]);
        assert!(matches!(
            &report.warnings[..],
            [RoutingWarning::UnknownRecipient { recipient, .. }] if recipient == "ghost"
        ));
    }

    #[test]
    fn test_undelivered_message_still_recorded() {
        let mut env = env_with(&["a"], BusConfig::default());
        let msg = direct(&env, "nobody");
        assert!(!env.publish("a", msg));
        assert_eq!(env.history(None).len(), 1);
        assert_eq!(env.history(None)[0].sent_from, "a");
    }

    #[test]
    fn test_history_is_bounded() {
        let config = BusConfig {
            history_limit: 2,
            ..BusConfig::default()
        };
        let mut env = env_with(&["a", "b"], config);
        for content in ["1", "2", "3"] {
            let msg = env.create_message(content, Recipients::one("b"), CauseBy::DirectCommunication, Role::User);
            env.publish("a", msg);
        }
        let kept: Vec<&str> = env.history(None).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(kept, vec!["2", "3"]);
        assert_eq!(env.history(Some(1))[0].content, "3");
    }

    #[test]
    fn test_conversation_between_both_directions() {
        let mut env = env_with(&["a", "b", "c"], BusConfig::default());
        let ab = direct(&env, "b");
        env.publish("a", ab);
        let ba = direct(&env, "a");
        env.publish("b", ba);
        let ca = direct(&env, "a");
        env.publish("c", ca);
        assert_eq!(env.conversation_between("a", "b").len(), 2);
        assert_eq!(env.conversation_between("b", "a").len(), 2);
        assert_eq!(env.conversation_between("a", "c").len(), 1);
    }

    #[test]
    fn test_status_and_clear() {
        let mut env = env_with(&["a", "b"], BusConfig::default());
        let msg = direct(&env, "b");
        env.publish("a", msg);
        let status = env.status();
        assert_eq!(status.worker_count, 2);
        assert_eq!(status.message_count, 1);
        assert!(status.is_idle);
        assert_eq!(status.workers, vec!["a".to_string(), "b".to_string()]);

        env.clear();
        assert!(env.is_empty());
        assert!(env.history(None).is_empty());
    }
}
