/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */


use crate::agent::{AgentCore, MqttAgent};
use crate::channel::ChannelMessaging;
use crate::command::{CommandOptions, ReturnInfo};
use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::mqtt::*;
use crate::mqtt::types::*;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const TEST_BLOCK_TIME: Duration = Duration::from_millis(100);

// A protocol operation observed by the mock client, in invocation order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ClientCall {
    Connect { clean_session: bool, has_will: bool },
    Publish { topic: String, packet_id: u16, qos: QualityOfService, dup: bool },
    Subscribe { topic_filters: Vec<String>, packet_id: u16 },
    Unsubscribe { topic_filters: Vec<String>, packet_id: u16 },
    Disconnect,
    Ping,
}

// An inbound packet the mock delivers on its next process-loop drive.
pub(crate) struct QueuedInbound {
    pub(crate) type_byte: u8,
    pub(crate) packet_id: u16,
    pub(crate) remaining_data: Vec<u8>,
    pub(crate) publish: Option<PublishReceived>,
    pub(crate) status: AgentResult<()>,
}

// Scripted state backing the mock client.  Tests keep a shared handle to
// inspect calls and queue broker behavior while the client itself is owned
// by the agent core.
pub(crate) struct MockClientState {
    pub(crate) connected: bool,
    pub(crate) next_packet_id: u16,

    // next_packet_id is reset to this by init(); zero simulates a client
    // that never initialized
    pub(crate) init_packet_id: u16,
    pub(crate) init_result: AgentResult<()>,

    // explicit ids for allocate_packet_id to hand out before falling back to
    // the counter
    pub(crate) packet_id_script: VecDeque<u16>,

    pub(crate) connect_results: VecDeque<AgentResult<bool>>,
    pub(crate) publish_results: VecDeque<AgentResult<()>>,
    pub(crate) subscribe_results: VecDeque<AgentResult<()>>,
    pub(crate) unsubscribe_results: VecDeque<AgentResult<()>>,
    pub(crate) ping_result: AgentResult<()>,
    pub(crate) disconnect_result: AgentResult<()>,
    pub(crate) process_loop_result: AgentResult<()>,

    pub(crate) resend_packet_ids: Vec<u16>,
    pub(crate) network_buffer_size: usize,

    // when set, the mock behaves like a well-behaved broker: every
    // acknowledged operation gets its matching ack queued for the next
    // process-loop drive
    pub(crate) auto_ack: bool,

    pub(crate) inbound: VecDeque<QueuedInbound>,
    pub(crate) calls: Vec<ClientCall>,
    pub(crate) process_loop_count: usize,
}

impl Default for MockClientState {
    fn default() -> Self {
        MockClientState {
            connected: false,
            next_packet_id: 0,
            init_packet_id: 1,
            init_result: Ok(()),
            packet_id_script: VecDeque::new(),
            connect_results: VecDeque::new(),
            publish_results: VecDeque::new(),
            subscribe_results: VecDeque::new(),
            unsubscribe_results: VecDeque::new(),
            ping_result: Ok(()),
            disconnect_result: Ok(()),
            process_loop_result: Ok(()),
            resend_packet_ids: Vec::new(),
            network_buffer_size: 1024,
            auto_ack: false,
            inbound: VecDeque::new(),
            calls: Vec::new(),
            process_loop_count: 0,
        }
    }
}

impl MockClientState {

    // Most scenarios start from an established connection.
    pub(crate) fn connected() -> Self {
        MockClientState {
            connected: true,
            ..Default::default()
        }
    }

    // Queues an acknowledgment whose remaining data is the packet id
    // followed by any payload bytes (reason codes for a SUBACK).
    fn queue_ack_locked(&mut self, type_byte: u8, packet_id: u16, payload: Vec<u8>) {
        let mut remaining_data = vec!((packet_id >> 8) as u8, packet_id as u8);
        remaining_data.extend_from_slice(&payload);

        self.inbound.push_back(QueuedInbound {
            type_byte,
            packet_id,
            remaining_data,
            publish: None,
            status: Ok(()),
        });
    }
}

pub(crate) struct MockMqttClient {
    pub(crate) state: Arc<Mutex<MockClientState>>,
}

impl MqttClient for MockMqttClient {
    fn init(&mut self) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        let init_packet_id = state.init_packet_id;
        state.next_packet_id = init_packet_id;
        state.init_result
    }

    fn connect(&mut self, connect: &ConnectInfo, will: Option<&PublishInfo>, _connack_timeout: Duration) -> AgentResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClientCall::Connect {
            clean_session: connect.clean_session,
            has_will: will.is_some(),
        });

        let result = state.connect_results.pop_front().unwrap_or(Ok(false));
        if result.is_ok() {
            state.connected = true;
        }

        result
    }

    fn publish(&mut self, publish: &PublishInfo, packet_id: u16) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClientCall::Publish {
            topic: publish.topic.clone(),
            packet_id,
            qos: publish.qos,
            dup: publish.dup(),
        });

        let result = state.publish_results.pop_front().unwrap_or(Ok(()));

        if state.auto_ack && result.is_ok() && packet_id != 0 {
            let type_byte = if publish.qos == QualityOfService::ExactlyOnce {
                PACKET_TYPE_PUBCOMP
            } else {
                PACKET_TYPE_PUBACK
            };
            state.queue_ack_locked(type_byte, packet_id, Vec::new());
        }

        result
    }

    fn subscribe(&mut self, subscriptions: &[Subscription], packet_id: u16) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClientCall::Subscribe {
            topic_filters: subscriptions.iter().map(|subscription| subscription.topic_filter.clone()).collect(),
            packet_id,
        });

        let result = state.subscribe_results.pop_front().unwrap_or(Ok(()));

        if state.auto_ack && result.is_ok() {
            let reason_codes = vec!(1u8; subscriptions.len());
            state.queue_ack_locked(PACKET_TYPE_SUBACK, packet_id, reason_codes);
        }

        result
    }

    fn unsubscribe(&mut self, subscriptions: &[Subscription], packet_id: u16) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClientCall::Unsubscribe {
            topic_filters: subscriptions.iter().map(|subscription| subscription.topic_filter.clone()).collect(),
            packet_id,
        });

        let result = state.unsubscribe_results.pop_front().unwrap_or(Ok(()));

        if state.auto_ack && result.is_ok() {
            state.queue_ack_locked(PACKET_TYPE_UNSUBACK, packet_id, Vec::new());
        }

        result
    }

    fn disconnect(&mut self) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClientCall::Disconnect);
        state.connected = false;
        state.disconnect_result
    }

    fn ping(&mut self) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClientCall::Ping);
        state.ping_result
    }

    fn process_loop(&mut self, handler: &mut dyn InboundHandler) -> AgentResult<()> {
        // Deliver outside the lock; the handler may run completions that
        // inspect this state.
        let (inbound, result) = {
            let mut state = self.state.lock().unwrap();
            state.process_loop_count += 1;
            (state.inbound.drain(..).collect::<Vec<_>>(), state.process_loop_result)
        };

        for queued in &inbound {
            let packet = InboundPacket {
                type_byte: queued.type_byte,
                packet_id: queued.packet_id,
                remaining_data: &queued.remaining_data,
                publish: queued.publish.as_ref(),
                deserialization_status: queued.status,
            };

            handler.on_packet(&packet);
        }

        result
    }

    fn next_packet_id(&self) -> u16 {
        self.state.lock().unwrap().next_packet_id
    }

    fn allocate_packet_id(&mut self) -> u16 {
        let mut state = self.state.lock().unwrap();

        if let Some(packet_id) = state.packet_id_script.pop_front() {
            return packet_id;
        }

        let packet_id = state.next_packet_id;
        state.next_packet_id = packet_id.checked_add(1).unwrap_or(1);
        packet_id
    }

    fn publish_to_resend(&mut self, cursor: &mut ResendCursor) -> Option<u16> {
        let state = self.state.lock().unwrap();

        if *cursor < state.resend_packet_ids.len() {
            let packet_id = state.resend_packet_ids[*cursor];
            *cursor += 1;
            return Some(packet_id);
        }

        None
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn network_buffer_size(&self) -> usize {
        self.state.lock().unwrap().network_buffer_size
    }
}

// Completion outcome captured by a CompletionRecorder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct RecordedOutcome {
    pub(crate) status: AgentResult<()>,
    pub(crate) suback_codes: Option<Vec<u8>>,
}

// Records every completion invocation of the commands it is attached to,
// preserving order across commands.
#[derive(Clone, Default)]
pub(crate) struct CompletionRecorder {
    outcomes: Arc<Mutex<Vec<RecordedOutcome>>>,
}

impl CompletionRecorder {
    pub(crate) fn new() -> Self {
        CompletionRecorder {
            ..Default::default()
        }
    }

    pub(crate) fn completion(&self) -> impl for<'a> FnOnce(ReturnInfo<'a>) + Send + 'static {
        let outcomes = self.outcomes.clone();
        move |return_info| {
            outcomes.lock().unwrap().push(RecordedOutcome {
                status: return_info.status,
                suback_codes: return_info.suback_codes.map(|codes| codes.to_vec()),
            });
        }
    }

    pub(crate) fn outcomes(&self) -> Vec<RecordedOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

pub(crate) struct AgentTestFixture {
    pub(crate) core: AgentCore<MockMqttClient>,
    pub(crate) agent: MqttAgent,
    pub(crate) messaging: Arc<ChannelMessaging>,
    pub(crate) client_state: Arc<Mutex<MockClientState>>,
    pub(crate) publishes_received: Arc<Mutex<Vec<(u16, PublishReceived)>>>,
    pub(crate) pool_size: usize,
}

impl AgentTestFixture {

    pub(crate) fn new(state: MockClientState) -> Self {
        Self::with_capacities(AgentConfig::builder().with_event_queue_wait(Duration::from_millis(10)).build(), 16, 16, state)
    }

    pub(crate) fn with_capacities(config: AgentConfig, queue_depth: usize, pool_size: usize, state: MockClientState) -> Self {
        let client_state = Arc::new(Mutex::new(state));
        let client = MockMqttClient {
            state: client_state.clone()
        };

        let messaging = Arc::new(ChannelMessaging::new(queue_depth, pool_size));

        let publishes_received: Arc<Mutex<Vec<(u16, PublishReceived)>>> = Arc::new(Mutex::new(Vec::new()));
        let publish_sink = publishes_received.clone();

        let core = AgentCore::new(client, messaging.clone(), config, move |packet_id, publish: &PublishReceived| {
            publish_sink.lock().unwrap().push((packet_id, publish.clone()));
        }).unwrap();

        let agent = core.handle();

        AgentTestFixture {
            core,
            agent,
            messaging,
            client_state,
            publishes_received,
            pool_size,
        }
    }

    pub(crate) fn run(&mut self) -> AgentResult<()> {
        self.core.command_loop()
    }

    pub(crate) fn calls(&self) -> Vec<ClientCall> {
        self.client_state.lock().unwrap().calls.clone()
    }

    pub(crate) fn process_loop_count(&self) -> usize {
        self.client_state.lock().unwrap().process_loop_count
    }

    pub(crate) fn pending_ack_occupancy(&self) -> usize {
        self.core.pending_acks.occupancy()
    }

    // Commands parked in the pending-ack table or sitting in the queue are
    // not in the pool; everything completed must have been released exactly
    // once for this to return the full pool size.
    pub(crate) fn available_commands(&self) -> usize {
        self.messaging.available_commands()
    }

    pub(crate) fn enqueue_publish(&self, topic: &str, qos: QualityOfService) -> CompletionRecorder {
        let recorder = CompletionRecorder::new();
        let publish = Arc::new(PublishInfo::new(topic, "payload", qos));

        self.agent.publish(publish, CommandOptions::new()
            .with_block_time(TEST_BLOCK_TIME)
            .with_completion(recorder.completion())).unwrap();

        recorder
    }

    pub(crate) fn enqueue_subscribe(&self, topic_filter: &str) -> CompletionRecorder {
        let recorder = CompletionRecorder::new();
        let args = Arc::new(SubscribeArgs {
            subscriptions: vec!(Subscription::new(topic_filter, QualityOfService::AtLeastOnce))
        });

        self.agent.subscribe(args, CommandOptions::new()
            .with_block_time(TEST_BLOCK_TIME)
            .with_completion(recorder.completion())).unwrap();

        recorder
    }

    pub(crate) fn enqueue_connect(&self) -> (Arc<ConnectArgs>, CompletionRecorder) {
        let recorder = CompletionRecorder::new();
        let args = Arc::new(ConnectArgs::new(ConnectInfo::default(), Duration::from_millis(500)));

        self.agent.connect(args.clone(), CommandOptions::new()
            .with_block_time(TEST_BLOCK_TIME)
            .with_completion(recorder.completion())).unwrap();

        (args, recorder)
    }

    pub(crate) fn enqueue_disconnect(&self) {
        self.agent.disconnect(CommandOptions::new().with_block_time(TEST_BLOCK_TIME)).unwrap();
    }

    pub(crate) fn enqueue_terminate(&self) {
        self.agent.terminate(CommandOptions::new().with_block_time(TEST_BLOCK_TIME)).unwrap();
    }

    pub(crate) fn queue_puback(&self, packet_id: u16) {
        self.queue_ack(PACKET_TYPE_PUBACK, packet_id, vec!((packet_id >> 8) as u8, packet_id as u8));
    }

    pub(crate) fn queue_suback(&self, packet_id: u16, reason_codes: &[u8]) {
        let mut remaining_data = vec!((packet_id >> 8) as u8, packet_id as u8);
        remaining_data.extend_from_slice(reason_codes);
        self.queue_ack(PACKET_TYPE_SUBACK, packet_id, remaining_data);
    }

    pub(crate) fn queue_unsuback(&self, packet_id: u16) {
        self.queue_ack(PACKET_TYPE_UNSUBACK, packet_id, vec!((packet_id >> 8) as u8, packet_id as u8));
    }

    pub(crate) fn queue_ack(&self, type_byte: u8, packet_id: u16, remaining_data: Vec<u8>) {
        self.client_state.lock().unwrap().inbound.push_back(QueuedInbound {
            type_byte,
            packet_id,
            remaining_data,
            publish: None,
            status: Ok(()),
        });
    }

    pub(crate) fn queue_incoming_publish(&self, type_byte: u8, packet_id: u16, publish: PublishReceived) {
        self.client_state.lock().unwrap().inbound.push_back(QueuedInbound {
            type_byte,
            packet_id,
            remaining_data: Vec::new(),
            publish: Some(publish),
            status: Ok(()),
        });
    }
}
