/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing the command records producers enqueue and the result types
their completion callbacks receive.
 */

use crate::error::AgentResult;
use crate::mqtt::types::*;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The kind of operation a command asks the agent to perform.
///
/// Discriminant values are stable; zero is reserved for the no-command case
/// used when the agent's queue receive times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {

    /// No command received; drives the client's process loop.
    None = 0,

    /// Drive the client's process loop.
    ProcessLoop = 1,

    /// Publish an application message.
    Publish = 2,

    /// Subscribe to one or more topic filters.
    Subscribe = 3,

    /// Unsubscribe from one or more topic filters.
    Unsubscribe = 4,

    /// Send a PINGREQ to the broker.
    Ping = 5,

    /// Establish the MQTT connection.
    Connect = 6,

    /// Tear down the MQTT connection and end the command loop.
    Disconnect = 7,

    /// Cancel all queued and in-flight commands and end the command loop.
    Terminate = 8,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandType::None => { write!(f, "None") }
            CommandType::ProcessLoop => { write!(f, "ProcessLoop") }
            CommandType::Publish => { write!(f, "Publish") }
            CommandType::Subscribe => { write!(f, "Subscribe") }
            CommandType::Unsubscribe => { write!(f, "Unsubscribe") }
            CommandType::Ping => { write!(f, "Ping") }
            CommandType::Connect => { write!(f, "Connect") }
            CommandType::Disconnect => { write!(f, "Disconnect") }
            CommandType::Terminate => { write!(f, "Terminate") }
        }
    }
}

// Argument payloads are shared with the producer that created the command so
// the producer's handle stays valid until the completion fires.
pub(crate) enum CommandArgs {
    None,
    Publish(Arc<PublishInfo>),
    Subscribe(Arc<SubscribeArgs>),
    Unsubscribe(Arc<SubscribeArgs>),
    Connect(Arc<ConnectArgs>),
}

/// Status and outputs a command's completion callback receives.
#[derive(Debug)]
pub struct ReturnInfo<'a> {

    /// Terminal status of the command.
    pub status: AgentResult<()>,

    /// For a completed SUBSCRIBE, the SUBACK's per-subscription reason-code
    /// bytes, borrowed from the inbound packet for the duration of the
    /// callback.
    pub suback_codes: Option<&'a [u8]>,
}

impl<'a> ReturnInfo<'a> {
    pub(crate) fn new(status: AgentResult<()>) -> Self {
        ReturnInfo {
            status,
            suback_codes: None,
        }
    }
}

/// Completion callback attached to a command.
///
/// Runs on the agent thread when the command reaches a terminal outcome, and
/// must not block.  If the callback enqueues further commands it must do so
/// with a zero block time, otherwise the agent thread can deadlock against
/// its own full queue.
pub type CommandCompletion = Box<dyn for<'a> FnOnce(ReturnInfo<'a>) + Send>;

/// A queued work item describing one MQTT operation plus its completion.
///
/// Commands are acquired from the messaging interface's pool, populated by a
/// producer, owned by the agent from the moment the queue accepts them, and
/// released back to the pool exactly once.
pub struct Command {
    pub(crate) command_type: CommandType,
    pub(crate) args: CommandArgs,
    pub(crate) completion: Option<CommandCompletion>,
}

impl Command {

    /// Creates an empty command record, suitable for seeding a pool.
    pub fn blank() -> Self {
        Command {
            command_type: CommandType::None,
            args: CommandArgs::None,
            completion: None,
        }
    }

    /// The kind of operation this command describes.
    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    // Returns the record to its blank state.  Dropping the argument payload
    // here is what lets a waiting producer observe completion-then-reuse.
    pub(crate) fn reset(&mut self) {
        self.command_type = CommandType::None;
        self.args = CommandArgs::None;
        self.completion = None;
    }

    // Fires the completion callback, if any.  Idempotent by construction;
    // the callback can only ever run once.
    pub(crate) fn complete(&mut self, return_info: ReturnInfo<'_>) {
        if let Some(completion) = self.completion.take() {
            completion(return_info);
        }
    }
}

/// Options common to every producer-facing agent operation.
#[derive(Default)]
pub struct CommandOptions {
    pub(crate) completion: Option<CommandCompletion>,
    pub(crate) block_time: Duration,
}

impl CommandOptions {

    /// Creates options with no completion callback and a zero block time.
    pub fn new() -> Self {
        CommandOptions {
            ..Default::default()
        }
    }

    /// Attaches a completion callback to be invoked on the agent thread when
    /// the command reaches a terminal outcome.
    pub fn with_completion(mut self, completion: impl for<'a> FnOnce(ReturnInfo<'a>) + Send + 'static) -> Self {
        self.completion = Some(Box::new(completion));
        self
    }

    /// Sets the maximum time the producer is willing to block while acquiring
    /// a command record and while enqueueing the command.
    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }
}
