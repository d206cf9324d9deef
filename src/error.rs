/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
A module containing the crate-wide status/error enumeration and result alias.
 */

use std::error::Error;
use std::fmt;

/// Basic error type for the entire mqtt-agent crate.
///
/// Unlike a conventional error hierarchy, these values double as command
/// statuses: the same value that a producer-facing API returns synchronously
/// is also what a completion callback receives when a command reaches a
/// terminal outcome on the agent thread.  Statuses returned by the underlying
/// MQTT client implementation pass through to completions verbatim, so the
/// client-facing variants live in this enum as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AgentError {

    /// A producer-facing API was invoked with invalid arguments, or before the
    /// underlying MQTT client was initialized.  Returned synchronously; the
    /// agent's state is untouched.
    BadParameter,

    /// A resource needed by the operation was exhausted: either no command
    /// record could be acquired from the pool, or the pending-acknowledgment
    /// table had no free slot when the agent tried to record the operation.
    NoMemory,

    /// The command queue did not accept the command within the caller's
    /// block time.  The acquired command record is released before this is
    /// returned.
    SendFailed,

    /// The deliberate cancellation status.  Applied to every queued command
    /// and every pending acknowledgment when the agent processes a Terminate
    /// command; it tells the waiter the command will never complete.
    BadResponse,

    /// The broker's response for an in-flight operation will never arrive,
    /// because the connection was re-established without prior session state.
    /// Applied to pending acknowledgments during a clean session resume.
    RecvFailed,

    /// The underlying client reported that the network connection was closed
    /// while an operation was in progress.
    ConnectionClosed,

    /// The broker did not respond to a CONNECT packet within the timeout
    /// supplied with the connect command.
    ConnackTimeout,

    /// The underlying client encountered broker behavior that violates the
    /// MQTT specification.
    ProtocolError,

    /// An operation was invoked against the underlying client in a state
    /// where it is not legal, e.g. publishing while disconnected.
    IllegalState,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::BadParameter => { write!(f, "bad parameter - invalid argument or agent not initialized") }
            AgentError::NoMemory => { write!(f, "no memory - command pool empty or pending-acknowledgment table full") }
            AgentError::SendFailed => { write!(f, "send failed - command queue did not accept the command within the block time") }
            AgentError::BadResponse => { write!(f, "bad response - command cancelled by agent termination") }
            AgentError::RecvFailed => { write!(f, "recv failed - broker response lost to a clean session resume") }
            AgentError::ConnectionClosed => { write!(f, "connection closed - network connection dropped during an operation") }
            AgentError::ConnackTimeout => { write!(f, "connack timeout - the broker did not respond in time to the connect packet") }
            AgentError::ProtocolError => { write!(f, "protocol error - broker behavior disallowed by the mqtt spec") }
            AgentError::IllegalState => { write!(f, "illegal state - operation not legal in the client's current state") }
        }
    }
}

impl Error for AgentError {
}

/// Crate-wide result type for functions that can fail
pub type AgentResult<T> = Result<T, AgentError>;
