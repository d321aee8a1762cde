// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Turns callback-driven command completion into a blocking call.

use crate::device::ScsiDevice;
use crate::transport::Completion;
use crate::transport::ScsiTask;
use crate::transport::SubmitError;
use crate::transport::TaskResult;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to submit command")]
    Submit(#[source] SubmitError),
    #[error("transport failed while waiting for completion")]
    Transport(#[source] TransportError),
    #[error("command was cancelled by the transport")]
    Cancelled,
}

/// Submits `task` and drives the device's event loop on this thread until it
/// completes.
///
/// There is no timeout. A session that never completes the command blocks
/// the caller forever.
pub fn dispatch_and_wait(
    device: &mut ScsiDevice,
    task: ScsiTask,
) -> Result<TaskResult, DispatchError> {
    let opcode = task.opcode();
    let lun = device.lun();
    let (completion, mut pending) = Completion::new();

    device.clear_error();
    if let Err(err) = device.transport_mut().submit(lun, task, completion) {
        device.set_error(format!("failed to send {opcode}: {err}"));
        return Err(DispatchError::Submit(err));
    }

    loop {
        match pending.try_recv() {
            Ok(Some(result)) => {
                tracing::trace!(?opcode, status = ?result.status, "command completed");
                return Ok(result);
            }
            Ok(None) => {}
            Err(_) => {
                device.set_error(format!("{opcode} was cancelled"));
                return Err(DispatchError::Cancelled);
            }
        }

        if let Err(err) = device.transport_mut().service() {
            device.set_error(format!("transport failed during {opcode}: {err}"));
            return Err(DispatchError::Transport(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdb;
    use crate::test_helpers::init_tracing;
    use crate::test_helpers::ScriptedTransport;
    use crate::test_helpers::SimConfig;
    use crate::test_helpers::SimTarget;
    use scsi_defs::ScsiStatus;

    #[test]
    fn completes_after_service() {
        init_tracing();
        let sim = SimTarget::new(SimConfig::default());
        let mut sd = sim.device("iqn.test:a");
        let result = dispatch_and_wait(&mut sd, cdb::test_unit_ready()).unwrap();
        assert_eq!(result.status, ScsiStatus::GOOD);
        assert_eq!(sim.commands_received(), 1);
        assert!(sd.error().is_empty());
    }

    #[test]
    fn submit_failure_is_immediate() {
        init_tracing();
        let sim = SimTarget::new(SimConfig::default());
        let mut sd = sim.device("iqn.test:a");
        sim.fail_next_submit();
        let err = dispatch_and_wait(&mut sd, cdb::test_unit_ready()).unwrap_err();
        assert!(matches!(err, DispatchError::Submit(SubmitError::QueueFull)));
        assert_eq!(sim.commands_received(), 0);
        assert!(!sd.error().is_empty());
    }

    #[test]
    fn transport_death_aborts_wait() {
        init_tracing();
        let sim = SimTarget::new(SimConfig::default());
        let mut sd = sim.device("iqn.test:a");
        sim.kill_sessions();
        let err = dispatch_and_wait(&mut sd, cdb::test_unit_ready()).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Submit(SubmitError::Disconnected)
        ));
    }

    #[test]
    fn transport_death_while_pending() {
        init_tracing();
        let sim = SimTarget::new(SimConfig::default());
        let mut sd = sim.device("iqn.test:a");
        sim.kill_sessions_on_service();
        let err = dispatch_and_wait(&mut sd, cdb::test_unit_ready()).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Transport(TransportError::ConnectionLost)
        ));
        assert!(sd.error().contains("TEST_UNIT_READY"));
    }

    #[test]
    fn dropped_completion_is_cancelled() {
        init_tracing();
        let (transport, _log) = ScriptedTransport::new(Vec::new());
        let mut sd = ScsiDevice::new(
            crate::device::DeviceTarget::Local("/dev/sg0".into()),
            Box::new(transport),
            0,
        );
        let err = dispatch_and_wait(&mut sd, cdb::test_unit_ready()).unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
    }
}
