// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The seam between the test engine and an iSCSI or SG_IO session.

use crate::payload::DataIn;
use crate::payload::DecodeError;
use crate::sense::Sense;
use futures::channel::oneshot;
use scsi_defs::ScsiOp;
use scsi_defs::ScsiStatus;
use scsi_defs::SenseData;
use thiserror::Error;
use zerocopy::Immutable;
use zerocopy::IntoBytes;

/// An event-driven session to a SCSI target.
///
/// Commands are queued with [`Transport::submit`] and complete from inside
/// [`Transport::service`], which runs one iteration of the session's event
/// loop on the calling thread.
pub trait Transport {
    /// Queues `task` for `lun`. An error means nothing was sent.
    fn submit(
        &mut self,
        lun: u32,
        task: ScsiTask,
        completion: Completion,
    ) -> Result<(), SubmitError>;

    /// Drives the event loop, blocking until some progress is made.
    ///
    /// A returned error means the session is dead. Outstanding completions
    /// may be dropped, which cancels them.
    fn service(&mut self) -> Result<(), TransportError>;
}

/// Logs in to a network target, producing a session.
pub trait Connector {
    fn login(
        &mut self,
        initiator_name: &str,
        url: &crate::device::IscsiUrl,
    ) -> Result<Session, LoginError>;
}

/// A logged-in session and the logical unit it negotiated.
pub struct Session {
    pub transport: Box<dyn Transport>,
    pub lun: u32,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("command queue is full")]
    QueueFull,
    #[error("session is not connected")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection lost")]
    ConnectionLost,
    #[error("socket error")]
    Io(#[source] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
#[error("login to {target} as {initiator} failed")]
pub struct LoginError {
    pub initiator: String,
    pub target: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// The sending half of a one-shot completion token.
///
/// Dropping it without calling [`Completion::complete`] cancels the command.
#[derive(Debug)]
pub struct Completion(oneshot::Sender<TaskResult>);

impl Completion {
    pub(crate) fn new() -> (Self, oneshot::Receiver<TaskResult>) {
        let (send, recv) = oneshot::channel();
        (Self(send), recv)
    }

    pub fn complete(self, result: TaskResult) {
        // The waiter only goes away if it has already given up.
        let _ = self.0.send(result);
    }
}

/// A command ready for submission.
#[derive(Debug, Clone)]
pub struct ScsiTask {
    pub cdb: Vec<u8>,
    /// Bytes sent to the target.
    pub data_out: Vec<u8>,
    /// Bytes the initiator is prepared to receive.
    pub data_in_length: u32,
}

impl ScsiTask {
    /// A command with no data phase.
    pub fn new<T: IntoBytes + Immutable>(cdb: &T) -> Self {
        Self {
            cdb: cdb.as_bytes().to_vec(),
            data_out: Vec::new(),
            data_in_length: 0,
        }
    }

    pub fn read<T: IntoBytes + Immutable>(cdb: &T, data_in_length: u32) -> Self {
        Self {
            data_in_length,
            ..Self::new(cdb)
        }
    }

    pub fn write<T: IntoBytes + Immutable>(cdb: &T, data_out: Vec<u8>) -> Self {
        Self {
            data_out,
            ..Self::new(cdb)
        }
    }

    pub fn opcode(&self) -> ScsiOp {
        ScsiOp(self.cdb.first().copied().unwrap_or_default())
    }

    /// The service action of commands that carry one in byte 1.
    pub fn service_action(&self) -> Option<u16> {
        match self.opcode() {
            ScsiOp::SERVICE_ACTION_IN16
            | ScsiOp::MAINTENANCE_IN
            | ScsiOp::PERSISTENT_RESERVE_IN
            | ScsiOp::PERSISTENT_RESERVE_OUT
            | ScsiOp::EXTENDED_COPY
            | ScsiOp::RECEIVE_COPY_RESULTS => self.cdb.get(1).map(|&b| (b & 0x1f).into()),
            _ => None,
        }
    }
}

/// The completed state of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub status: ScsiStatus,
    /// Raw sense data, empty unless the status is CHECK CONDITION.
    pub sense: Vec<u8>,
    pub data_in: Vec<u8>,
}

impl TaskResult {
    pub fn good(data_in: Vec<u8>) -> Self {
        Self {
            status: ScsiStatus::GOOD,
            sense: Vec::new(),
            data_in,
        }
    }

    pub fn status(status: ScsiStatus) -> Self {
        Self {
            status,
            sense: Vec::new(),
            data_in: Vec::new(),
        }
    }

    pub fn check_condition(sense: SenseData) -> Self {
        Self {
            status: ScsiStatus::CHECK_CONDITION,
            sense: sense.as_bytes().to_vec(),
            data_in: Vec::new(),
        }
    }

    /// Decodes the sense data, if any.
    pub fn decoded_sense(&self) -> Option<Sense> {
        Sense::parse(&self.sense)
    }

    /// Decodes the data-in buffer as `T`.
    pub fn decode<T: DataIn>(&self) -> Result<T, DecodeError> {
        T::decode(&self.data_in)
    }
}
