/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing the agent's command loop and the thread-safe producer
handle used to submit commands to it.
 */

use crate::command::*;
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::messaging::{AgentMessaging, ReceiveOutcome};
use crate::mqtt::*;
use crate::mqtt::types::*;
use crate::pending_ack::PendingAckTable;
use crate::validate::*;

use log::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;

/// Application callback invoked on the agent thread for every PUBLISH the
/// broker delivers.  The agent keeps no per-topic subscription state; fan-out
/// across interested parties is the application's concern.
///
/// The callback must not block.  If it submits further commands through a
/// [`MqttAgent`] handle, it must do so with a zero block time, otherwise the
/// agent thread can deadlock against its own full queue.
pub type IncomingPublishCallback = Box<dyn FnMut(u16, &PublishReceived) + Send>;

// State shared between producer handles and the agent thread.  Everything in
// here is advisory or immutable; authoritative state lives in the core.
pub(crate) struct AgentShared {
    messaging: Arc<dyn AgentMessaging>,

    // Snapshot of the client's next packet id taken after initialization.
    // Zero means the client never initialized; producer entry points refuse
    // to enqueue while it is zero.
    packet_id_hint: AtomicU16,

    // Best-effort mirror of the pending-acknowledgment table's occupancy,
    // written by the agent thread after every table mutation.  Producers read
    // it for early rejection only; admission is re-checked on the agent
    // thread.
    ack_occupancy: AtomicUsize,
    ack_capacity: usize,

    network_buffer_size: usize,
}

/// Thread-safe handle for submitting commands to an agent.
///
/// Any number of handles may be cloned and used concurrently; every call
/// packages its arguments into a command record and enqueues it for the
/// agent thread, which dispatches commands in FIFO order across all
/// producers.
///
/// Each call returns as soon as the command is accepted by the queue.  The
/// operation's terminal outcome is delivered through the completion callback
/// attached via [`CommandOptions`], on the agent thread.
#[derive(Clone)]
pub struct MqttAgent {
    shared: Arc<AgentShared>,
}

impl MqttAgent {

    /// Submits a publish command.
    ///
    /// The caller retains its handle to the message; the payload stays
    /// readable by both sides until the completion fires, after which the
    /// producer may drop or reuse it.
    pub fn publish(&self, publish: Arc<PublishInfo>, options: CommandOptions) -> AgentResult<()> {
        validate_publish(&publish, self.shared.network_buffer_size)?;

        // QoS 0 publishes complete without an acknowledgment, so they do not
        // need a table slot.
        if publish.qos != QualityOfService::AtMostOnce {
            self.check_pending_ack_space()?;
        }

        self.create_and_enqueue(CommandType::Publish, CommandArgs::Publish(publish), options)
    }

    /// Submits a subscribe command.  The completion's
    /// [`ReturnInfo::suback_codes`] carries the broker's per-subscription
    /// reason codes.
    pub fn subscribe(&self, args: Arc<SubscribeArgs>, options: CommandOptions) -> AgentResult<()> {
        validate_subscriptions(&args)?;
        self.check_pending_ack_space()?;

        self.create_and_enqueue(CommandType::Subscribe, CommandArgs::Subscribe(args), options)
    }

    /// Submits an unsubscribe command.
    pub fn unsubscribe(&self, args: Arc<SubscribeArgs>, options: CommandOptions) -> AgentResult<()> {
        validate_subscriptions(&args)?;
        self.check_pending_ack_space()?;

        self.create_and_enqueue(CommandType::Unsubscribe, CommandArgs::Unsubscribe(args), options)
    }

    /// Submits a connect command.  The agent blocks in the command's handler
    /// until the broker's CONNACK arrives or the argument's timeout elapses;
    /// on success, in-flight QoS 1+ publishes are retransmitted or failed
    /// according to the broker's session-present flag before the completion
    /// fires.
    pub fn connect(&self, args: Arc<ConnectArgs>, options: CommandOptions) -> AgentResult<()> {
        self.create_and_enqueue(CommandType::Connect, CommandArgs::Connect(args), options)
    }

    /// Submits a disconnect command.  The agent loop exits after processing
    /// it; pending acknowledgments are kept for a later session resume.
    pub fn disconnect(&self, options: CommandOptions) -> AgentResult<()> {
        self.create_and_enqueue(CommandType::Disconnect, CommandArgs::None, options)
    }

    /// Submits a ping command.
    pub fn ping(&self, options: CommandOptions) -> AgentResult<()> {
        self.create_and_enqueue(CommandType::Ping, CommandArgs::None, options)
    }

    /// Submits a command whose only effect is driving the client's process
    /// loop.  Useful to wake the agent when data is known to be readable on
    /// the connection's socket.
    pub fn process_loop(&self, options: CommandOptions) -> AgentResult<()> {
        self.create_and_enqueue(CommandType::ProcessLoop, CommandArgs::None, options)
    }

    /// Submits a terminate command.  When the agent dequeues it, every
    /// command still in the queue and every pending acknowledgment completes
    /// with [`AgentError::BadResponse`], and the agent loop exits
    /// successfully.
    pub fn terminate(&self, options: CommandOptions) -> AgentResult<()> {
        self.create_and_enqueue(CommandType::Terminate, CommandArgs::None, options)
    }

    // Best-effort early rejection when the pending-acknowledgment table looks
    // full.  The mirror may be stale; the agent-side insert is the
    // authoritative check.
    fn check_pending_ack_space(&self) -> AgentResult<()> {
        if self.shared.ack_occupancy.load(Ordering::Relaxed) >= self.shared.ack_capacity {
            error!("No space to wait for an acknowledgment; command rejected");
            return Err(AgentError::NoMemory);
        }

        Ok(())
    }

    // Common tail of every producer entry point: acquire a record, populate
    // it, enqueue it, and unwind cleanly on failure.
    fn create_and_enqueue(&self, command_type: CommandType, args: CommandArgs, options: CommandOptions) -> AgentResult<()> {
        // A zero packet id means the MQTT client was never initialized; zero
        // is the uninitialized value and never a valid id.
        if self.shared.packet_id_hint.load(Ordering::Relaxed) == 0 {
            error!("MQTT client must be initialized before commands are accepted");
            return Err(AgentError::BadParameter);
        }

        let Some(mut command) = self.shared.messaging.acquire_command(options.block_time) else {
            error!("Command pool empty; {} command rejected", command_type);
            return Err(AgentError::NoMemory);
        };

        command.command_type = command_type;
        command.args = args;
        command.completion = options.completion;

        if let Err(command) = self.shared.messaging.send(command, options.block_time) {
            error!("Command queue did not accept {} command within the block time", command_type);
            self.shared.messaging.release_command(command);
            return Err(AgentError::SendFailed);
        }

        Ok(())
    }
}

/// The single-threaded half of an agent: owns the MQTT client and processes
/// commands one at a time.
///
/// Construct with [`AgentCore::new`], hand out [`MqttAgent`] handles via
/// [`AgentCore::handle`], then run [`AgentCore::command_loop`] on a dedicated
/// thread.  Nothing here is shared: the pending-acknowledgment table, the
/// client, and the packet-received flag are all private to the loop thread,
/// which is what removes any need for locking around them.
pub struct AgentCore<C: MqttClient> {
    pub(crate) client: C,
    pub(crate) messaging: Arc<dyn AgentMessaging>,
    pub(crate) shared: Arc<AgentShared>,
    pub(crate) pending_acks: PendingAckTable,
    pub(crate) incoming_publish: IncomingPublishCallback,
    pub(crate) packet_received_in_loop: bool,
    pub(crate) event_queue_wait: Duration,
}

impl<C: MqttClient> AgentCore<C> {

    /// Creates an agent around an MQTT client and a messaging implementation.
    ///
    /// Initializes the client and snapshots the state producer-side checks
    /// need.  `incoming_publish` receives every PUBLISH the broker delivers,
    /// on the agent thread.
    pub fn new(mut client: C,
               messaging: Arc<dyn AgentMessaging>,
               config: AgentConfig,
               incoming_publish: impl FnMut(u16, &PublishReceived) + Send + 'static) -> AgentResult<AgentCore<C>> {
        client.init()?;

        let shared = Arc::new(AgentShared {
            messaging: messaging.clone(),
            packet_id_hint: AtomicU16::new(client.next_packet_id()),
            ack_occupancy: AtomicUsize::new(0),
            ack_capacity: config.max_outstanding_acks,
            network_buffer_size: client.network_buffer_size(),
        });

        Ok(AgentCore {
            client,
            messaging,
            shared,
            pending_acks: PendingAckTable::new(config.max_outstanding_acks),
            incoming_publish: Box::new(incoming_publish),
            packet_received_in_loop: false,
            event_queue_wait: config.event_queue_wait,
        })
    }

    /// Creates a new thread-safe producer handle for this agent.
    pub fn handle(&self) -> MqttAgent {
        MqttAgent {
            shared: self.shared.clone(),
        }
    }

    /// Processes commands from the queue until a disconnect command, a
    /// terminate command, or an error.
    ///
    /// Queue-receive timeouts are not idle: each one drives the client's
    /// process loop so inbound traffic keeps flowing even when producers are
    /// quiet.  The loop returns the first non-success command status, leaving
    /// the host to decide whether to reconnect and run it again.
    pub fn command_loop(&mut self) -> AgentResult<()> {
        info!("Starting agent command loop");

        loop {
            let command = match self.messaging.recv(self.event_queue_wait) {
                ReceiveOutcome::Command(command) => { Some(command) }
                ReceiveOutcome::Wake | ReceiveOutcome::TimedOut => { None }
            };

            let (status, end_loop) = self.process_command(command);

            if let Err(error) = status {
                error!("Agent command loop failed: {}", error);
                return Err(error);
            }

            if end_loop {
                info!("Agent command loop ended");
                return Ok(());
            }
        }
    }

    /// Retransmits or fails in-flight QoS 1+ publishes after a reconnect,
    /// according to the broker's CONNACK session-present flag.
    ///
    /// With a resumed session, every publish the client still holds for
    /// retransmission is re-sent with its original packet id and the DUP flag
    /// set, in the client's retransmission order; the first failure is
    /// surfaced.  Without one, every pending acknowledgment completes with
    /// [`AgentError::RecvFailed`] so producers can re-publish at application
    /// level.
    ///
    /// Runs as part of every successful connect command.  Public for hosts
    /// that drive the command loop manually; must only be called from the
    /// loop's thread.
    pub fn resume_session(&mut self, session_present: bool) -> AgentResult<()> {
        if self.client.next_packet_id() == 0 {
            return Err(AgentError::BadParameter);
        }

        let result = if session_present {
            self.resend_publishes()
        } else {
            self.clear_pending_acknowledgments();
            Ok(())
        };

        self.sync_ack_occupancy();
        result
    }

    // Drives one dequeued command (or a timeout) through its handler,
    // records the operation in the pending-acknowledgment table when the
    // handler asks for it, completes and releases the command when no
    // acknowledgment is expected, and drains the client's process loop.
    // Returns the command's status and whether the loop should end.
    fn process_command(&mut self, mut command: Option<Box<Command>>) -> (AgentResult<()>, bool) {
        let (mut status, flags) = self.execute_command(command.as_deref_mut());

        if status.is_ok() && flags.add_to_pending_acks {
            match command.take() {
                Some(owned) => {
                    match self.pending_acks.insert(flags.packet_id, owned) {
                        Ok(()) => {
                            // the command now completes from the inbound path
                        }
                        Err(returned) => {
                            error!("No memory to wait for acknowledgment for packet {}", flags.packet_id);
                            status = Err(AgentError::NoMemory);
                            command = Some(returned);
                        }
                    }
                }
                None => {
                    error!("Handler requested an acknowledgment wait without a command");
                    status = Err(AgentError::BadParameter);
                }
            }

            self.sync_ack_occupancy();
        }

        if let Some(mut owned) = command.take() {
            // the command is complete; fire the callback and recycle it
            owned.complete(ReturnInfo::new(status));
            self.messaging.release_command(owned);
        }

        if status.is_ok() && flags.run_process_loop {
            status = self.drive_process_loop();
        }

        let end_loop = flags.end_loop || status.is_err();
        (status, end_loop)
    }

    // Runs the client's process loop until a pass completes without any
    // inbound packet, so a burst of broker traffic is fully drained before
    // the agent goes back to waiting on its queue.  The client must never
    // block in here; the loop's only blocking point is the queue receive.
    fn drive_process_loop(&mut self) -> AgentResult<()> {
        let mut status = Ok(());

        loop {
            self.packet_received_in_loop = false;

            if status.is_ok() && self.client.is_connected() {
                let mut dispatcher = InboundDispatcher {
                    pending_acks: &mut self.pending_acks,
                    packet_received: &mut self.packet_received_in_loop,
                    incoming_publish: self.incoming_publish.as_mut(),
                    messaging: self.messaging.as_ref(),
                };

                status = self.client.process_loop(&mut dispatcher);
            }

            if !self.packet_received_in_loop {
                break;
            }
        }

        self.sync_ack_occupancy();
        status
    }

    fn resend_publishes(&mut self) -> AgentResult<()> {
        let mut cursor: ResendCursor = 0;

        while let Some(packet_id) = self.client.publish_to_resend(&mut cursor) {
            // Retrieve the operation but leave it in the table; it still
            // completes through the inbound acknowledgment path.
            let publish = match self.pending_acks.find(packet_id) {
                Some(command) => {
                    match &command.args {
                        CommandArgs::Publish(publish) => { Some(publish.clone()) }
                        _ => {
                            error!("Pending ack for packet id {} is not a publish", packet_id);
                            None
                        }
                    }
                }
                None => {
                    // The client may track state the agent does not mirror.
                    error!("No pending ack found for resend packet id {}", packet_id);
                    None
                }
            };

            let Some(publish) = publish else {
                continue;
            };

            publish.set_dup();

            if let Err(error) = self.client.publish(&publish, packet_id) {
                error!("Error resending publishes: {}", error);
                return Err(error);
            }
        }

        Ok(())
    }

    fn clear_pending_acknowledgments(&mut self) {
        for mut command in self.pending_acks.drain() {
            command.complete(ReturnInfo::new(Err(AgentError::RecvFailed)));
            self.messaging.release_command(command);
        }
    }

    pub(crate) fn sync_ack_occupancy(&self) {
        self.shared.ack_occupancy.store(self.pending_acks.occupancy(), Ordering::Relaxed);
    }
}

// Inbound packet routing, invoked synchronously from inside the client's
// process loop and therefore always on the agent thread.  Borrows the
// disjoint pieces of core state it needs so the client can stay mutably
// borrowed for the duration of the drive.
struct InboundDispatcher<'a> {
    pending_acks: &'a mut PendingAckTable,
    packet_received: &'a mut bool,
    incoming_publish: &'a mut (dyn FnMut(u16, &PublishReceived) + Send),
    messaging: &'a dyn AgentMessaging,
}

impl InboundHandler for InboundDispatcher<'_> {
    fn on_packet(&mut self, packet: &InboundPacket<'_>) {
        // Tells the loop driver another pass may find more readable data.
        *self.packet_received = true;

        // The lower nibble of a PUBLISH type byte carries the dup, QoS, and
        // retain flags; mask them off before comparing.
        if packet.type_byte & 0xF0 == PACKET_TYPE_PUBLISH {
            match packet.publish {
                Some(publish) => {
                    (self.incoming_publish)(packet.packet_id, publish);
                }
                None => {
                    error!("Publish packet id {} delivered without a deserialized message", packet.packet_id);
                }
            }

            return;
        }

        match packet.type_byte {
            PACKET_TYPE_PUBACK | PACKET_TYPE_PUBCOMP | PACKET_TYPE_SUBACK | PACKET_TYPE_UNSUBACK => {
                match self.pending_acks.take(packet.packet_id) {
                    Some(mut command) => {
                        // A SUBACK's status codes start 2 bytes after the
                        // variable header.
                        let suback_codes = if packet.type_byte == PACKET_TYPE_SUBACK {
                            packet.remaining_data.get(2..)
                        } else {
                            None
                        };

                        let return_info = ReturnInfo {
                            status: packet.deserialization_status,
                            suback_codes,
                        };

                        command.complete(return_info);
                        self.messaging.release_command(command);
                    }
                    None => {
                        error!("No operation found matching packet id {}", packet.packet_id);
                    }
                }
            }

            // Handled internally by the client; they complete nothing.
            PACKET_TYPE_PUBREC | PACKET_TYPE_PUBREL => {}

            other => {
                error!("Unknown packet type received: ({:#04x})", other);
            }
        }
    }
}
