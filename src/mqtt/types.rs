/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing the argument and data types exchanged between producers, the
agent, and the underlying MQTT client.
 */

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// MQTT message delivery quality of service.
///
/// Enum values match MQTT spec encoding values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum QualityOfService {

    /// The message arrives at the receiver either once or not at all.  No
    /// acknowledgment is sent by the broker and no retry is performed.
    #[default]
    AtMostOnce = 0,

    /// A level of service that ensures that the message arrives at the
    /// receiver at least once.
    AtLeastOnce = 1,

    /// A level of service that ensures that the message arrives at the
    /// receiver exactly once.
    ExactlyOnce = 2,
}

impl fmt::Display for QualityOfService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityOfService::AtMostOnce => { write!(f, "AtMostOnce") }
            QualityOfService::AtLeastOnce => { write!(f, "AtLeastOnce") }
            QualityOfService::ExactlyOnce => { write!(f, "ExactlyOnce") }
        }
    }
}

/// An application message to be published to the broker.
///
/// The producer retains its handle to the shared instance until the
/// publish command's completion callback fires; the agent reads the fields
/// but never copies the payload.
#[derive(Debug, Default)]
pub struct PublishInfo {

    /// Topic this message should be published to.
    pub topic: String,

    /// Message payload bytes.
    pub payload: Vec<u8>,

    /// Delivery quality of service for this message.
    pub qos: QualityOfService,

    /// True if the broker should retain this message on the topic.
    pub retain: bool,

    // Set by the agent thread when the publish is retransmitted as part of a
    // session resume.  A producer may share the instance while that happens,
    // hence the atomic.
    dup: AtomicBool,
}

impl PublishInfo {

    /// Creates a publish message description.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QualityOfService) -> Self {
        PublishInfo {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
            dup: AtomicBool::new(false),
        }
    }

    /// True if this message is a retransmission of an earlier attempt.
    pub fn dup(&self) -> bool {
        self.dup.load(Ordering::Relaxed)
    }

    pub(crate) fn set_dup(&self) {
        self.dup.store(true, Ordering::Relaxed);
    }
}

impl fmt::Display for PublishInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublishInfo {{ topic:\"{}\" qos:{} retain:{} dup:{} payload:<{} Bytes> }}",
               self.topic, self.qos, self.retain, self.dup(), self.payload.len())
    }
}

/// An application message received from the broker, handed to the agent's
/// incoming-publish callback.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PublishReceived {

    /// Topic this message was published to.
    pub topic: String,

    /// Message payload bytes.
    pub payload: Vec<u8>,

    /// Delivery quality of service of the message.
    pub qos: QualityOfService,

    /// True if this message was sent because of a retained-message rule.
    pub retain: bool,

    /// True if this message is a broker-side retransmission.
    pub dup: bool,
}

/// A single subscription entry within a SUBSCRIBE or UNSUBSCRIBE operation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Subscription {

    /// Topic filter to (un)subscribe.
    pub topic_filter: String,

    /// Maximum delivery quality of service requested for the subscription.
    /// Ignored for unsubscribes.
    pub qos: QualityOfService,
}

impl Subscription {

    /// Creates a subscription entry.
    pub fn new(topic_filter: impl Into<String>, qos: QualityOfService) -> Self {
        Subscription {
            topic_filter: topic_filter.into(),
            qos,
        }
    }
}

/// Arguments for a SUBSCRIBE or UNSUBSCRIBE command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubscribeArgs {

    /// List of subscription entries; must not be empty.
    pub subscriptions: Vec<Subscription>,
}

/// MQTT CONNECT packet information.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectInfo {

    /// Client identifier presented to the broker.
    pub client_id: String,

    /// Keep-alive interval, in seconds, negotiated with the broker.
    pub keep_alive_seconds: u16,

    /// True if the connection must start without prior session state.
    pub clean_session: bool,

    /// Optional username credential.
    pub username: Option<String>,

    /// Optional password credential.
    pub password: Option<Vec<u8>>,
}

impl Default for ConnectInfo {
    fn default() -> Self {
        ConnectInfo {
            client_id: String::new(),
            keep_alive_seconds: 60,
            clean_session: true,
            username: None,
            password: None,
        }
    }
}

/// Arguments for a CONNECT command.
///
/// `session_present` is an output: the agent stores the broker's CONNACK
/// session-present flag here before the command's completion fires, so a
/// producer holding its handle can inspect it afterwards.
#[derive(Debug)]
pub struct ConnectArgs {

    /// CONNECT packet information.
    pub connect: ConnectInfo,

    /// Optional last-will message registered with the broker.
    pub will: Option<PublishInfo>,

    /// Maximum time to wait for the broker's CONNACK.
    pub connack_timeout: Duration,

    session_present: AtomicBool,
}

impl ConnectArgs {

    /// Creates connect arguments with no will message.
    pub fn new(connect: ConnectInfo, connack_timeout: Duration) -> Self {
        ConnectArgs {
            connect,
            will: None,
            connack_timeout,
            session_present: AtomicBool::new(false),
        }
    }

    /// Attaches a last-will message to register with the broker.
    pub fn with_will(mut self, will: PublishInfo) -> Self {
        self.will = Some(will);
        self
    }

    /// True if the broker reported prior session state in its CONNACK.  Only
    /// meaningful after the connect command's completion has fired.
    pub fn session_present(&self) -> bool {
        self.session_present.load(Ordering::Relaxed)
    }

    pub(crate) fn set_session_present(&self, session_present: bool) {
        self.session_present.store(session_present, Ordering::Relaxed);
    }
}
