// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-process targets for exercising the test engine without a network.
//!
//! [`SimTarget`] hosts one simulated block logical unit. Every handle from
//! [`SimTarget::device`] is a separate I_T nexus with its own unit attention
//! queue. [`ScriptedTransport`] instead answers with canned results and
//! records what it was sent.

mod lun;
mod reservation;

use crate::device::DeviceTarget;
use crate::device::IscsiUrl;
use crate::device::ScsiDevice;
use crate::transport::Completion;
use crate::transport::Connector;
use crate::transport::Session;
use crate::transport::LoginError;
use crate::transport::ScsiTask;
use crate::transport::SubmitError;
use crate::transport::TaskResult;
use crate::transport::Transport;
use crate::transport::TransportError;
use lun::SimLun;
use parking_lot::Mutex;
use scsi_defs::ScsiOp;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Once;

pub use lun::NAA_DESIGNATOR;

/// Identifies one initiator session to the simulated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct NexusId(pub u32);

/// Installs a test-writer tracing subscriber once per process.
pub fn init_tracing() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Geometry and feature set of the simulated logical unit.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub block_size: u32,
    pub num_blocks: u64,
    /// Logical blocks per physical block, as a power of two.
    pub lbppb_exponent: u8,
    /// Thin provisioned, with UNMAP and GET LBA STATUS.
    pub thin: bool,
    pub removable: bool,
    pub read_only: bool,
    pub max_unmap_block_descriptors: u32,
    /// Largest transfer in blocks, zero for no limit.
    pub max_transfer_length: u32,
    /// Whether REPORT SUPPORTED OPERATION CODES is implemented.
    pub report_opcodes: bool,
    /// Opcodes rejected with INVALID OPERATION CODE.
    pub unsupported: Vec<ScsiOp>,
    /// Queue POWER ON OCCURRED for every new nexus.
    pub power_on_unit_attention: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            num_blocks: 2048,
            lbppb_exponent: 0,
            thin: true,
            removable: false,
            read_only: false,
            max_unmap_block_descriptors: 4,
            max_transfer_length: 128,
            report_opcodes: true,
            unsupported: vec![ScsiOp::WRITE_ATOMIC16],
            power_on_unit_attention: false,
        }
    }
}

struct SimShared {
    lun: SimLun,
    commands: usize,
    fail_next: bool,
    dead: bool,
    die_on_service: bool,
    next_nexus: u32,
}

/// A target with one simulated logical unit, shared by all its sessions.
#[derive(Clone)]
pub struct SimTarget {
    shared: Arc<Mutex<SimShared>>,
}

impl SimTarget {
    pub const TARGET_NAME: &'static str = "iqn.2024-01.com.example:sim";

    pub fn new(config: SimConfig) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SimShared {
                lun: SimLun::new(config),
                commands: 0,
                fail_next: false,
                dead: false,
                die_on_service: false,
                next_nexus: 1,
            })),
        }
    }

    /// The URL sessions log in to.
    pub fn url(&self) -> IscsiUrl {
        format!("iscsi://127.0.0.1/{}/0", Self::TARGET_NAME)
            .parse()
            .expect("valid url")
    }

    pub fn connector(&self) -> SimConnector {
        SimConnector {
            target: self.clone(),
        }
    }

    /// Logs in a new session as `initiator_name`.
    pub fn device(&self, initiator_name: &str) -> ScsiDevice {
        ScsiDevice::login(&mut self.connector(), initiator_name, self.url())
            .expect("simulated login cannot fail")
    }

    /// A session addressed as a local device node.
    pub fn local_device(&self) -> ScsiDevice {
        ScsiDevice::new(
            DeviceTarget::Local("/dev/sg0".into()),
            Box::new(self.transport()),
            0,
        )
    }

    fn transport(&self) -> SimTransport {
        let mut shared = self.shared.lock();
        let nexus = NexusId(shared.next_nexus);
        shared.next_nexus += 1;
        shared.lun.add_nexus(nexus);
        SimTransport {
            target: self.clone(),
            nexus,
            pending: VecDeque::new(),
        }
    }

    /// Commands that reached the logical unit.
    pub fn commands_received(&self) -> usize {
        self.shared.lock().commands
    }

    /// Makes the next submit fail with a full queue.
    pub fn fail_next_submit(&self) {
        self.shared.lock().fail_next = true;
    }

    /// Disconnects every session. Later submits fail.
    pub fn kill_sessions(&self) {
        self.shared.lock().dead = true;
    }

    /// Makes the next event loop iteration lose the connection.
    pub fn kill_sessions_on_service(&self) {
        self.shared.lock().die_on_service = true;
    }

    pub fn read_block(&self, lba: u64) -> Vec<u8> {
        self.shared.lock().lun.block(lba).to_vec()
    }

    pub fn is_mapped(&self, lba: u64) -> bool {
        self.shared.lock().lun.is_mapped(lba)
    }

    pub fn registered_keys(&self) -> Vec<u64> {
        self.shared.lock().lun.reservations().keys()
    }

    pub fn software_write_protect(&self) -> bool {
        self.shared.lock().lun.software_write_protect()
    }

    pub fn medium_present(&self) -> bool {
        self.shared.lock().lun.medium_present()
    }
}

pub struct SimConnector {
    target: SimTarget,
}

impl Connector for SimConnector {
    fn login(&mut self, initiator_name: &str, url: &IscsiUrl) -> Result<Session, LoginError> {
        if url.target != SimTarget::TARGET_NAME {
            return Err(LoginError {
                initiator: initiator_name.into(),
                target: url.target.clone(),
                source: "no such target".into(),
            });
        }
        Ok(Session {
            transport: Box::new(self.target.transport()),
            lun: url.lun,
        })
    }
}

/// One session to a [`SimTarget`]. Commands queue on submit and one runs
/// per call to `service`.
struct SimTransport {
    target: SimTarget,
    nexus: NexusId,
    pending: VecDeque<(ScsiTask, Completion)>,
}

impl Transport for SimTransport {
    fn submit(
        &mut self,
        _lun: u32,
        task: ScsiTask,
        completion: Completion,
    ) -> Result<(), SubmitError> {
        let mut shared = self.target.shared.lock();
        if shared.dead {
            return Err(SubmitError::Disconnected);
        }
        if std::mem::take(&mut shared.fail_next) {
            return Err(SubmitError::QueueFull);
        }
        self.pending.push_back((task, completion));
        Ok(())
    }

    fn service(&mut self) -> Result<(), TransportError> {
        let mut shared = self.target.shared.lock();
        if std::mem::take(&mut shared.die_on_service) {
            shared.dead = true;
            self.pending.clear();
            return Err(TransportError::ConnectionLost);
        }
        if let Some((task, completion)) = self.pending.pop_front() {
            shared.commands += 1;
            let result = shared.lun.execute(self.nexus, &task);
            drop(shared);
            completion.complete(result);
        }
        Ok(())
    }
}

/// Completes commands with results from a script, in order. Once the script
/// runs out, completions are dropped.
pub struct ScriptedTransport {
    script: VecDeque<TaskResult>,
    sent: Arc<Mutex<Vec<ScsiTask>>>,
    pending: VecDeque<Completion>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<TaskResult>) -> (Self, Arc<Mutex<Vec<ScsiTask>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                script: script.into(),
                sent: sent.clone(),
                pending: VecDeque::new(),
            },
            sent,
        )
    }
}

impl Transport for ScriptedTransport {
    fn submit(
        &mut self,
        _lun: u32,
        task: ScsiTask,
        completion: Completion,
    ) -> Result<(), SubmitError> {
        self.sent.lock().push(task);
        self.pending.push_back(completion);
        Ok(())
    }

    fn service(&mut self) -> Result<(), TransportError> {
        if let Some(completion) = self.pending.pop_front() {
            if let Some(result) = self.script.pop_front() {
                completion.complete(result);
            }
        }
        Ok(())
    }
}
