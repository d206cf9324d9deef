/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing a ready-made messaging implementation backed by bounded
crossbeam channels.
 */

use crate::command::Command;
use crate::messaging::{AgentMessaging, ReceiveOutcome};

use crossbeam_channel::{bounded, Receiver, Sender};

use std::time::Duration;

// A queue entry is either a command or a bare wake-up token.
type QueueEntry = Option<Box<Command>>;

/// Messaging implementation pairing a bounded FIFO command queue with a
/// fixed-size command pool, both realized as crossbeam channels.
///
/// The pool channel doubles as the free list: acquiring receives a record,
/// releasing sends it back.  Exactly `pool_size` records circulate, so pool
/// exhaustion surfaces as an acquire timeout rather than an allocation.
pub struct ChannelMessaging {
    queue_sender: Sender<QueueEntry>,
    queue_receiver: Receiver<QueueEntry>,
    pool_sender: Sender<Box<Command>>,
    pool_receiver: Receiver<Box<Command>>,
}

impl ChannelMessaging {

    /// Creates a messaging instance with a command queue holding up to
    /// `queue_depth` entries and a pool of `pool_size` command records.
    pub fn new(queue_depth: usize, pool_size: usize) -> Self {
        let (queue_sender, queue_receiver) = bounded(queue_depth);
        let (pool_sender, pool_receiver) = bounded(pool_size);

        for _ in 0..pool_size {
            // seeding a channel within its capacity cannot fail
            pool_sender.send(Box::new(Command::blank())).unwrap();
        }

        ChannelMessaging {
            queue_sender,
            queue_receiver,
            pool_sender,
            pool_receiver,
        }
    }

    /// Wakes the agent's queue receive without delivering a command.  Wire
    /// this to a socket-readable notification so inbound broker traffic gets
    /// processed ahead of the queue-wait timeout.  Best-effort: if the queue
    /// is full the agent is about to wake anyway and the token is dropped.
    pub fn wake(&self) {
        let _ = self.queue_sender.try_send(None);
    }

    /// Number of command records currently available for acquisition.
    pub fn available_commands(&self) -> usize {
        self.pool_receiver.len()
    }
}

impl AgentMessaging for ChannelMessaging {
    fn send(&self, command: Box<Command>, block_time: Duration) -> Result<(), Box<Command>> {
        self.queue_sender.send_timeout(Some(command), block_time).map_err(|error| {
            match error.into_inner() {
                Some(command) => { command }
                // wake tokens are never sent through this path
                None => { unreachable!("command send returned a wake token") }
            }
        })
    }

    fn recv(&self, block_time: Duration) -> ReceiveOutcome {
        match self.queue_receiver.recv_timeout(block_time) {
            Ok(Some(command)) => { ReceiveOutcome::Command(command) }
            Ok(None) => { ReceiveOutcome::Wake }
            Err(_) => { ReceiveOutcome::TimedOut }
        }
    }

    fn acquire_command(&self, block_time: Duration) -> Option<Box<Command>> {
        self.pool_receiver.recv_timeout(block_time).ok()
    }

    fn release_command(&self, mut command: Box<Command>) -> bool {
        command.reset();
        self.pool_sender.try_send(command).is_ok()
    }
}
