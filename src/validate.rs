/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing producer-side validation of command arguments.

These checks run on the producer's thread, before a command record is
acquired, so rejected calls have no side effects on the agent.
 */

use crate::error::{AgentError, AgentResult};
use crate::mqtt::types::*;

use log::*;

// Control byte, remaining-length encoding, and topic-length bytes of a
// serialized PUBLISH fixed header.
const PUBLISH_CONTROL_AND_LENGTH_BYTES: usize = 4;

// The publish fixed header and topic name must fit strictly inside the
// client's network buffer, leaving at least one byte for payload framing.
pub(crate) fn validate_publish(publish: &PublishInfo, network_buffer_size: usize) -> AgentResult<()> {
    let header_bytes = PUBLISH_CONTROL_AND_LENGTH_BYTES + publish.topic.len();

    if header_bytes >= network_buffer_size {
        error!("Publish to \"{}\" rejected: header of {} bytes does not fit in a {} byte network buffer",
               publish.topic, header_bytes, network_buffer_size);
        return Err(AgentError::BadParameter);
    }

    Ok(())
}

pub(crate) fn validate_subscriptions(args: &SubscribeArgs) -> AgentResult<()> {
    if args.subscriptions.is_empty() {
        error!("Subscription command rejected: subscription list is empty");
        return Err(AgentError::BadParameter);
    }

    Ok(())
}
