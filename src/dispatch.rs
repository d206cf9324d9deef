/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing the per-variant command handlers the agent loop dispatches
to.

Each handler invokes the corresponding MQTT client operation and reports,
through [`ReturnFlags`], what the loop should do next.  Handlers never touch
the pending-acknowledgment table themselves; recording an in-flight operation
is the loop's job, driven by the returned flags.
 */

use crate::agent::AgentCore;
use crate::command::*;
use crate::error::{AgentError, AgentResult};
use crate::messaging::ReceiveOutcome;
use crate::mqtt::MqttClient;
use crate::mqtt::types::*;

use log::*;

use std::sync::Arc;
use std::time::Duration;

// Handler outputs consumed by the agent loop.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct ReturnFlags {

    // Packet id the operation was sent under; 0 when the operation carries
    // none.
    pub(crate) packet_id: u16,

    // True if the command must be parked in the pending-acknowledgment table
    // instead of completing now.
    pub(crate) add_to_pending_acks: bool,

    // True if the loop should drive the client's process loop after the
    // command.
    pub(crate) run_process_loop: bool,

    // True if the loop should stop after the command.
    pub(crate) end_loop: bool,
}

impl<C: MqttClient> AgentCore<C> {

    // Selects and runs the handler for a dequeued command; `None` stands for
    // a queue-receive timeout or bare wake-up and drives the process loop.
    pub(crate) fn execute_command(&mut self, command: Option<&mut Command>) -> (AgentResult<()>, ReturnFlags) {
        let Some(command) = command else {
            return self.handle_process_loop();
        };

        debug!("Executing {} command", command.command_type);

        match command.command_type {
            CommandType::None | CommandType::ProcessLoop => {
                self.handle_process_loop()
            }
            CommandType::Publish => {
                match &command.args {
                    CommandArgs::Publish(publish) => {
                        let publish = publish.clone();
                        self.handle_publish(&publish)
                    }
                    _ => { self.mismatched_arguments(command.command_type) }
                }
            }
            CommandType::Subscribe => {
                match &command.args {
                    CommandArgs::Subscribe(args) => {
                        let args = args.clone();
                        self.handle_subscribe(&args)
                    }
                    _ => { self.mismatched_arguments(command.command_type) }
                }
            }
            CommandType::Unsubscribe => {
                match &command.args {
                    CommandArgs::Unsubscribe(args) => {
                        let args = args.clone();
                        self.handle_unsubscribe(&args)
                    }
                    _ => { self.mismatched_arguments(command.command_type) }
                }
            }
            CommandType::Ping => {
                self.handle_ping()
            }
            CommandType::Connect => {
                match &command.args {
                    CommandArgs::Connect(args) => {
                        let args = args.clone();
                        self.handle_connect(&args)
                    }
                    _ => { self.mismatched_arguments(command.command_type) }
                }
            }
            CommandType::Disconnect => {
                self.handle_disconnect()
            }
            CommandType::Terminate => {
                self.handle_terminate()
            }
        }
    }

    fn mismatched_arguments(&self, command_type: CommandType) -> (AgentResult<()>, ReturnFlags) {
        error!("{} command carried mismatched arguments", command_type);
        (Err(AgentError::BadParameter), ReturnFlags::default())
    }

    fn handle_process_loop(&mut self) -> (AgentResult<()>, ReturnFlags) {
        let flags = ReturnFlags {
            run_process_loop: true,
            ..Default::default()
        };

        (Ok(()), flags)
    }

    fn handle_publish(&mut self, publish: &Arc<PublishInfo>) -> (AgentResult<()>, ReturnFlags) {
        let mut flags = ReturnFlags::default();

        if publish.qos != QualityOfService::AtMostOnce {
            flags.packet_id = self.client.allocate_packet_id();
        }

        info!("Publishing message to {}", publish.topic);
        let status = self.client.publish(publish, flags.packet_id);

        flags.add_to_pending_acks = publish.qos != QualityOfService::AtMostOnce && status.is_ok();
        flags.run_process_loop = true;

        (status, flags)
    }

    fn handle_subscribe(&mut self, args: &Arc<SubscribeArgs>) -> (AgentResult<()>, ReturnFlags) {
        let mut flags = ReturnFlags {
            packet_id: self.client.allocate_packet_id(),
            ..Default::default()
        };

        let status = self.client.subscribe(&args.subscriptions, flags.packet_id);

        flags.add_to_pending_acks = status.is_ok();
        flags.run_process_loop = true;

        (status, flags)
    }

    fn handle_unsubscribe(&mut self, args: &Arc<SubscribeArgs>) -> (AgentResult<()>, ReturnFlags) {
        let mut flags = ReturnFlags {
            packet_id: self.client.allocate_packet_id(),
            ..Default::default()
        };

        let status = self.client.unsubscribe(&args.subscriptions, flags.packet_id);

        flags.add_to_pending_acks = status.is_ok();
        flags.run_process_loop = true;

        (status, flags)
    }

    // Connect blocks until the broker's CONNACK (or the timeout), so no
    // follow-up flags are needed; a successful connect immediately performs
    // session resumption based on the returned session-present value.
    fn handle_connect(&mut self, args: &Arc<ConnectArgs>) -> (AgentResult<()>, ReturnFlags) {
        let status = self.client.connect(&args.connect, args.will.as_ref(), args.connack_timeout);

        match status {
            Ok(session_present) => {
                debug!("Connected, session present: {}", session_present);
                args.set_session_present(session_present);
                (self.resume_session(session_present), ReturnFlags::default())
            }
            Err(error) => {
                (Err(error), ReturnFlags::default())
            }
        }
    }

    fn handle_disconnect(&mut self) -> (AgentResult<()>, ReturnFlags) {
        let status = self.client.disconnect();

        let flags = ReturnFlags {
            end_loop: true,
            ..Default::default()
        };

        (status, flags)
    }

    fn handle_ping(&mut self) -> (AgentResult<()>, ReturnFlags) {
        let status = self.client.ping();

        let flags = ReturnFlags {
            run_process_loop: true,
            ..Default::default()
        };

        (status, flags)
    }

    // Cancels every queued command and every pending acknowledgment with a
    // bad-response status, releasing each record, then ends the loop.
    fn handle_terminate(&mut self) -> (AgentResult<()>, ReturnFlags) {
        info!("Terminating command loop");

        loop {
            match self.messaging.recv(Duration::from_millis(0)) {
                ReceiveOutcome::Command(mut command) => {
                    command.complete(ReturnInfo::new(Err(AgentError::BadResponse)));
                    self.messaging.release_command(command);
                }
                ReceiveOutcome::Wake => {
                    continue;
                }
                ReceiveOutcome::TimedOut => {
                    break;
                }
            }
        }

        for mut command in self.pending_acks.drain() {
            command.complete(ReturnInfo::new(Err(AgentError::BadResponse)));
            self.messaging.release_command(command);
        }

        self.sync_ack_occupancy();

        let flags = ReturnFlags {
            end_loop: true,
            ..Default::default()
        };

        (Ok(()), flags)
    }
}
