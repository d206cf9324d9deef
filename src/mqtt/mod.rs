/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing the narrow interface the agent consumes from an MQTT
protocol implementation, together with the inbound packet model used to
route broker traffic back through the agent.
 */

pub mod types;

use crate::error::AgentResult;
use crate::mqtt::types::*;

use std::time::Duration;

/// Fixed-header type byte of a PUBLISH packet (flags live in the lower nibble).
pub const PACKET_TYPE_PUBLISH: u8 = 0x30;

/// Fixed-header type byte of a PUBACK packet.
pub const PACKET_TYPE_PUBACK: u8 = 0x40;

/// Fixed-header type byte of a PUBREC packet.
pub const PACKET_TYPE_PUBREC: u8 = 0x50;

/// Fixed-header type byte of a PUBREL packet.
pub const PACKET_TYPE_PUBREL: u8 = 0x62;

/// Fixed-header type byte of a PUBCOMP packet.
pub const PACKET_TYPE_PUBCOMP: u8 = 0x70;

/// Fixed-header type byte of a SUBACK packet.
pub const PACKET_TYPE_SUBACK: u8 = 0x90;

/// Fixed-header type byte of an UNSUBACK packet.
pub const PACKET_TYPE_UNSUBACK: u8 = 0xB0;

/// Fixed-header type byte of a PINGRESP packet.
pub const PACKET_TYPE_PINGRESP: u8 = 0xD0;

/// A deserialized inbound packet as surfaced by [`MqttClient::process_loop`].
///
/// The borrowed fields are only valid for the duration of the
/// [`InboundHandler::on_packet`] call that delivers them.
#[derive(Debug)]
pub struct InboundPacket<'a> {

    /// The packet's full fixed-header type byte.  For PUBLISH packets the
    /// lower nibble carries the dup/QoS/retain flags, so consumers must mask
    /// with `0xF0` before comparing against [`PACKET_TYPE_PUBLISH`].
    pub type_byte: u8,

    /// Packet identifier carried by the packet, or 0 if the packet type does
    /// not carry one.
    pub packet_id: u16,

    /// The packet's remaining data: every byte after the fixed header,
    /// starting at the variable header.
    pub remaining_data: &'a [u8],

    /// Deserialized message, present only for PUBLISH packets.
    pub publish: Option<&'a PublishReceived>,

    /// Result of deserializing the packet.  Forwarded verbatim into the
    /// completion of the command the packet acknowledges.
    pub deserialization_status: AgentResult<()>,
}

/// Receiver for inbound packets surfaced during a process-loop drive.
///
/// Invoked synchronously from inside [`MqttClient::process_loop`], and
/// therefore always on the thread driving the client.
pub trait InboundHandler {

    /// Called once per deserialized inbound packet.
    fn on_packet(&mut self, packet: &InboundPacket<'_>);
}

/// Iteration state for [`MqttClient::publish_to_resend`].  A fresh cursor
/// starts at zero.
pub type ResendCursor = usize;

/// The narrow interface the agent requires from an MQTT protocol
/// implementation.
///
/// Implementations are not expected to be thread-safe: the agent guarantees
/// that after construction every method is invoked from the single agent
/// thread.  The implementation's transport reads must be non-blocking, since
/// a blocking read inside [`MqttClient::process_loop`] would stall the
/// agent's command processing.
pub trait MqttClient: Send {

    /// Performs whatever initialization the client requires before any other
    /// operation, e.g. binding its transport and resetting protocol state.
    /// Invoked exactly once, when the agent is constructed.  After a
    /// successful return, [`MqttClient::next_packet_id`] must be non-zero.
    fn init(&mut self) -> AgentResult<()>;

    /// Sends a CONNECT packet and blocks until the broker's CONNACK arrives
    /// or `connack_timeout` elapses.  Returns the CONNACK's session-present
    /// flag.
    fn connect(&mut self, connect: &ConnectInfo, will: Option<&PublishInfo>, connack_timeout: Duration) -> AgentResult<bool>;

    /// Serializes and sends a PUBLISH packet.  `packet_id` must be 0 for
    /// QoS 0 messages and a previously allocated non-zero id otherwise.
    fn publish(&mut self, publish: &PublishInfo, packet_id: u16) -> AgentResult<()>;

    /// Serializes and sends a SUBSCRIBE packet under the given packet id.
    fn subscribe(&mut self, subscriptions: &[Subscription], packet_id: u16) -> AgentResult<()>;

    /// Serializes and sends an UNSUBSCRIBE packet under the given packet id.
    fn unsubscribe(&mut self, subscriptions: &[Subscription], packet_id: u16) -> AgentResult<()>;

    /// Serializes and sends a DISCONNECT packet and closes the connection.
    fn disconnect(&mut self) -> AgentResult<()>;

    /// Serializes and sends a PINGREQ packet.
    fn ping(&mut self) -> AgentResult<()>;

    /// Drains whatever inbound bytes are currently readable, surfacing each
    /// deserialized packet through `handler`, and performs internal protocol
    /// housekeeping (QoS 2 handshakes, ping bookkeeping).  Must not block on
    /// the transport.
    fn process_loop(&mut self, handler: &mut dyn InboundHandler) -> AgentResult<()>;

    /// The next packet identifier the client would allocate.  Zero means the
    /// client has not been initialized; zero is never a valid identifier.
    fn next_packet_id(&self) -> u16;

    /// Allocates and returns a fresh non-zero packet identifier.
    fn allocate_packet_id(&mut self) -> u16;

    /// Iterates the client's record of QoS 1+ publishes that require
    /// retransmission after a session resume.  Each call returns the next
    /// packet id in original transmission order, advancing `cursor`; `None`
    /// once exhausted.
    fn publish_to_resend(&mut self, cursor: &mut ResendCursor) -> Option<u16>;

    /// True while the client holds an established MQTT connection.
    fn is_connected(&self) -> bool;

    /// Size in bytes of the client's network serialization buffer.  Outbound
    /// packets larger than this cannot be sent.
    fn network_buffer_size(&self) -> usize;
}
