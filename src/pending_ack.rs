/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing the table of commands awaiting broker acknowledgment.
 */

use crate::command::Command;

use log::*;

// One table slot.  A zero packet id marks the slot free; an occupied slot
// always holds a command.
struct PendingAck {
    packet_id: u16,
    command: Option<Box<Command>>,
}

/// Fixed-capacity table mapping in-flight packet ids to the commands that
/// produced them.
///
/// Only the agent thread touches the table after construction, which is what
/// makes the lock-free linear-scan representation sound.  The capacity is
/// small (20 by default), so scanning beats any keyed structure here.
pub(crate) struct PendingAckTable {
    slots: Vec<PendingAck>,
}

impl PendingAckTable {

    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || {
            PendingAck {
                packet_id: 0,
                command: None,
            }
        });

        PendingAckTable {
            slots
        }
    }

    // Records a command as awaiting the acknowledgment for `packet_id`,
    // taking the first free slot.  On a full table, ownership of the command
    // is handed back to the caller.
    pub(crate) fn insert(&mut self, packet_id: u16, command: Box<Command>) -> Result<(), Box<Command>> {
        debug_assert_ne!(0, packet_id);
        debug_assert!(self.find(packet_id).is_none());

        for slot in self.slots.iter_mut() {
            if slot.packet_id == 0 {
                slot.packet_id = packet_id;
                slot.command = Some(command);
                return Ok(());
            }
        }

        Err(command)
    }

    // Looks up the command awaiting `packet_id` without removing it.  A zero
    // packet id never matches; it is the free-slot marker and is never
    // assigned by the protocol layer.
    pub(crate) fn find(&self, packet_id: u16) -> Option<&Command> {
        if packet_id == 0 {
            return None;
        }

        self.slots.iter()
            .find(|slot| slot.packet_id == packet_id)
            .and_then(|slot| slot.command.as_deref())
    }

    // Removes and returns the command awaiting `packet_id`, freeing its slot.
    pub(crate) fn take(&mut self, packet_id: u16) -> Option<Box<Command>> {
        if packet_id == 0 {
            return None;
        }

        for slot in self.slots.iter_mut() {
            if slot.packet_id == packet_id {
                slot.packet_id = 0;

                let command = slot.command.take();
                if command.is_none() {
                    error!("Pending ack for packet id {} had no command", packet_id);
                }

                return command;
            }
        }

        None
    }

    // Empties the table, returning every in-flight command in slot order so
    // the caller can fail and release them.
    pub(crate) fn drain(&mut self) -> Vec<Box<Command>> {
        let mut drained = Vec::new();

        for slot in self.slots.iter_mut() {
            if slot.packet_id != 0 {
                slot.packet_id = 0;
                if let Some(command) = slot.command.take() {
                    drained.push(command);
                }
            }
        }

        drained
    }

    pub(crate) fn occupancy(&self) -> usize {
        self.slots.iter().filter(|slot| slot.packet_id != 0).count()
    }
}
