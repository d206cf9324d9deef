/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing agent configuration types.
 */

use std::time::Duration;

/// Default number of pending acknowledgments the agent tracks for a single
/// connection.
///
/// The agent tracks commands (such as PUBLISH and SUBSCRIBE) that are still
/// waiting to be acknowledged by the broker.  The higher this number is, the
/// greater the agent's memory consumption will be.
pub const DEFAULT_MAX_OUTSTANDING_ACKS: usize = 20;

/// Default time the agent thread will block waiting for a command to arrive
/// in its queue before waking up to drive the client's process loop.
///
/// It is important the process loop runs often if there is known MQTT
/// traffic, but running it too often wastes CPU time.  Messaging
/// implementations that wake the queue on socket-readable notifications make
/// this bound irrelevant in practice.
pub const DEFAULT_EVENT_QUEUE_WAIT: Duration = Duration::from_millis(1000);

/// Configuration for a single agent instance.
///
/// Use [`AgentConfig::builder`] to override the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub(crate) max_outstanding_acks: usize,
    pub(crate) event_queue_wait: Duration,
}

impl AgentConfig {

    /// Creates a new builder initialized with the default configuration.
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder {
            config: AgentConfig::default()
        }
    }

    /// Capacity of the pending-acknowledgment table.
    pub fn max_outstanding_acks(&self) -> usize {
        self.max_outstanding_acks
    }

    /// Maximum time the agent blocks on its command queue per loop iteration.
    pub fn event_queue_wait(&self) -> Duration {
        self.event_queue_wait
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_outstanding_acks: DEFAULT_MAX_OUTSTANDING_ACKS,
            event_queue_wait: DEFAULT_EVENT_QUEUE_WAIT,
        }
    }
}

/// Builder type for [`AgentConfig`]
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig
}

impl AgentConfigBuilder {

    /// Sets the capacity of the pending-acknowledgment table.
    ///
    /// A capacity of zero makes every acknowledged operation fail with a
    /// no-memory status; QoS 0 publishes remain usable.
    pub fn with_max_outstanding_acks(mut self, max_outstanding_acks: usize) -> Self {
        self.config.max_outstanding_acks = max_outstanding_acks;
        self
    }

    /// Sets the maximum time the agent blocks on its command queue per loop
    /// iteration.
    pub fn with_event_queue_wait(mut self, event_queue_wait: Duration) -> Self {
        self.config.event_queue_wait = event_queue_wait;
        self
    }

    /// Creates a new agent configuration from the builder's current state
    pub fn build(self) -> AgentConfig {
        self.config
    }
}
