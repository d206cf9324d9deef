/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing the messaging abstraction that hides the concrete command
queue and command pool from the agent.
 */

use crate::command::Command;

use std::time::Duration;

/// Outcome of a queue receive attempt.
pub enum ReceiveOutcome {

    /// A command was dequeued.
    Command(Box<Command>),

    /// The queue was woken without a command, e.g. by a socket-readable
    /// notification.  The agent treats this as a request to drive the
    /// client's process loop promptly.
    Wake,

    /// No command arrived within the block time.
    TimedOut,
}

/// Queue and pool operations backing a single agent.
///
/// Every method must be safe to call concurrently with the agent thread;
/// [`AgentMessaging::recv`] is only ever called by the agent thread itself.
/// Typical implementations pair a bounded FIFO queue with a fixed command
/// pool, but anything honoring these contracts may be substituted.
pub trait AgentMessaging: Send + Sync {

    /// Enqueues one command, blocking up to `block_time` if the queue is
    /// full.  On timeout, ownership of the command is handed back to the
    /// caller so it can be released.
    fn send(&self, command: Box<Command>, block_time: Duration) -> Result<(), Box<Command>>;

    /// Dequeues one command, blocking up to `block_time`.
    fn recv(&self, block_time: Duration) -> ReceiveOutcome;

    /// Hands out a free command record, blocking up to `block_time` if the
    /// pool is empty.  Returns `None` on timeout.
    fn acquire_command(&self, block_time: Duration) -> Option<Box<Command>>;

    /// Returns ownership of a previously acquired record to the pool.  The
    /// record's contents are dropped in the process.  Returns false if the
    /// pool refused the record.
    fn release_command(&self, command: Box<Command>) -> bool;
}
