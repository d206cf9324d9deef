/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
This crate provides a command agent that makes a single-threaded MQTT client
usable, safely, from any number of threads over one connection.

MQTT protocol implementations are frequently single-threaded: one state
machine, one serialization buffer, one socket.  This crate wraps such a
client in a dedicated *agent thread* that is the only code ever allowed to
touch it.  Producer threads submit typed commands (publish, subscribe,
connect, ...) through a cloneable [`MqttAgent`] handle; the agent dequeues
them in FIFO order, performs the protocol operation, tracks which packet ids
still await broker acknowledgment, and fires each command's completion
callback once its outcome is known: when the matching PUBACK/SUBACK/UNSUBACK
arrives, immediately for operations without acknowledgments, or with an error
when the command is cancelled.

The crate is deliberately agnostic about its collaborators:

* The MQTT protocol engine is consumed through the narrow [`MqttClient`]
  trait; any implementation with non-blocking transport reads fits.
* The command queue and pool are consumed through the [`AgentMessaging`]
  trait.  A ready-made implementation backed by bounded crossbeam channels,
  [`ChannelMessaging`], is included.

# Example

```no_run
use mqtt_agent::*;
use std::sync::Arc;
use std::time::Duration;

# struct MyProtocolClient {}
# impl MqttClient for MyProtocolClient {
#     fn init(&mut self) -> AgentResult<()> { unimplemented!() }
#     fn connect(&mut self, _: &ConnectInfo, _: Option<&PublishInfo>, _: Duration) -> AgentResult<bool> { unimplemented!() }
#     fn publish(&mut self, _: &PublishInfo, _: u16) -> AgentResult<()> { unimplemented!() }
#     fn subscribe(&mut self, _: &[Subscription], _: u16) -> AgentResult<()> { unimplemented!() }
#     fn unsubscribe(&mut self, _: &[Subscription], _: u16) -> AgentResult<()> { unimplemented!() }
#     fn disconnect(&mut self) -> AgentResult<()> { unimplemented!() }
#     fn ping(&mut self) -> AgentResult<()> { unimplemented!() }
#     fn process_loop(&mut self, _: &mut dyn InboundHandler) -> AgentResult<()> { unimplemented!() }
#     fn next_packet_id(&self) -> u16 { unimplemented!() }
#     fn allocate_packet_id(&mut self) -> u16 { unimplemented!() }
#     fn publish_to_resend(&mut self, _: &mut ResendCursor) -> Option<u16> { unimplemented!() }
#     fn is_connected(&self) -> bool { unimplemented!() }
#     fn network_buffer_size(&self) -> usize { unimplemented!() }
# }
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Your protocol implementation, wired to its transport.
    let client = MyProtocolClient {};

    let messaging = Arc::new(ChannelMessaging::new(16, 16));
    let mut core = AgentCore::new(client, messaging, AgentConfig::default(), |packet_id, publish| {
        println!("received publish {} on {}", packet_id, publish.topic);
    })?;

    let agent = core.handle();
    let loop_thread = std::thread::spawn(move || core.command_loop());

    // Any thread may now submit commands through the handle (or a clone).
    let message = Arc::new(PublishInfo::new("hello/world", "hi", QualityOfService::AtLeastOnce));
    agent.publish(message, CommandOptions::new()
        .with_block_time(Duration::from_millis(500))
        .with_completion(|return_info| {
            println!("publish finished: {:?}", return_info.status);
        }))?;

    agent.terminate(CommandOptions::new())?;
    loop_thread.join().unwrap()?;

    Ok(())
}
```
*/

#![warn(missing_docs)]

mod agent;
mod channel;
mod command;
mod config;
mod dispatch;
mod error;
mod messaging;
pub mod mqtt;
mod pending_ack;
mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{AgentCore, IncomingPublishCallback, MqttAgent};
pub use channel::ChannelMessaging;
pub use command::{Command, CommandCompletion, CommandOptions, CommandType, ReturnInfo};
pub use config::{AgentConfig, AgentConfigBuilder, DEFAULT_EVENT_QUEUE_WAIT, DEFAULT_MAX_OUTSTANDING_ACKS};
pub use error::{AgentError, AgentResult};
pub use messaging::{AgentMessaging, ReceiveOutcome};

/* Re-export the client-facing interface types at the root level */
pub use mqtt::{InboundHandler, InboundPacket, MqttClient, ResendCursor};
pub use mqtt::types::{ConnectArgs, ConnectInfo, PublishInfo, PublishReceived, QualityOfService, SubscribeArgs, Subscription};
