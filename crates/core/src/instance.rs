//! Instance handle.
//!
//! ptrace only accepts requests from the thread that attached to a tracee.
//! An [`Instance`] therefore spawns one worker thread that creates the tracee
//! and then serves every operation on it; the handle itself only ships
//! closures to that worker and waits for their results. The handle can move
//! between threads freely, and any number of instances can coexist, each with
//! its own worker.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use nix::errno::Errno;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::common::error::{Error, Result, SpawnStage};
use crate::config::InstanceConfig;
use crate::registers::{RegisterSet, Registers};
use crate::sandbox::image::{CODE_ADDRESS, CODE_CAPACITY};
use crate::sandbox::maps::Mapping;
use crate::sandbox::{MunmapFlags, SandboxFlags};
use crate::tracee::Tracee;
use crate::tracee::outcome::ExecutionOutcome;

/// Work item run on the worker thread against its tracee.
type Job = Box<dyn FnOnce(&mut Tracee) + Send>;

/// A sandboxed tracee and the worker thread that controls it.
///
/// Dropping the handle kills and reaps the tracee, as does [`Instance::destroy`].
#[derive(Debug)]
pub struct Instance {
    pid: Pid,
    jobs: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl Instance {
    /// Creates an instance with default limits.
    ///
    /// # Arguments
    ///
    /// * `sandbox` - Isolation options.
    /// * `munmap` - Mapping classes to remove before the first stop.
    ///
    /// # Returns
    ///
    /// A stopped, sandboxed tracee ready for [`Instance::execute`], or
    /// `SpawnFailed` if any creation step failed.
    pub fn create(sandbox: SandboxFlags, munmap: MunmapFlags) -> Result<Self> {
        Self::with_config(&InstanceConfig::new(sandbox, munmap))
    }

    /// Creates an instance from a full configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Sandbox options and limits; validated before anything is spawned.
    pub fn with_config(config: &InstanceConfig) -> Result<Self> {
        config.validate()?;
        let config = config.clone();

        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Pid>>();

        let worker = thread::Builder::new()
            .name("asmbox-tracee".to_string())
            .spawn(move || {
                let mut tracee = match Tracee::spawn(&config) {
                    Ok(tracee) => tracee,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(tracee.pid())).is_err() {
                    return;
                }
                for job in jobs_rx {
                    job(&mut tracee);
                }
                tracee.kill();
            })
            .map_err(|e| {
                Error::spawn(
                    SpawnStage::Fork,
                    Errno::from_raw(e.raw_os_error().unwrap_or(libc::EAGAIN)),
                )
            })?;

        let pid = match ready_rx.recv() {
            Ok(Ok(pid)) => pid,
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(Error::spawn(SpawnStage::Attach, Errno::ECHILD));
            }
        };
        debug!(pid = pid.as_raw(), "instance created");

        Ok(Self {
            pid,
            jobs: Some(jobs_tx),
            worker: Some(worker),
        })
    }

    /// Runs `f` on the worker thread and waits for its result.
    fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Tracee) -> Result<T> + Send + 'static,
    {
        let gone = || Error::ProcessGone {
            pid: self.pid.as_raw(),
        };
        let jobs = self.jobs.as_ref().ok_or_else(gone)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        let job: Job = Box::new(move |tracee| {
            let _ = reply_tx.send(f(tracee));
        });
        jobs.send(job).map_err(|_| gone())?;
        reply_rx.recv().unwrap_or_else(|_| Err(gone()))
    }

    /// Returns the tracee's process id.
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Returns the address injected code is placed at.
    pub const fn code_address(&self) -> u64 {
        CODE_ADDRESS
    }

    /// Returns the largest buffer [`Instance::execute`] accepts.
    pub const fn code_capacity(&self) -> usize {
        CODE_CAPACITY - crate::tracee::code::TRAP.len()
    }

    /// Runs `code` in the tracee until it stops or terminates.
    ///
    /// Blocks for as long as the code runs; there is no timeout.
    ///
    /// # Arguments
    ///
    /// * `code` - Machine code. Empty input is a no-op that reports the
    ///   current stop again.
    ///
    /// # Returns
    ///
    /// The decoded wait status, or `ProcessGone` if the tracee had already
    /// terminated, or `CodeTooLarge`.
    pub fn execute(&mut self, code: &[u8]) -> Result<ExecutionOutcome> {
        let code = code.to_vec();
        self.call(move |tracee| tracee.execute(&code))
    }

    /// Snapshots every register in `mask`, in presentation order.
    pub fn get_registers(&self, mask: RegisterSet) -> Result<Registers> {
        self.call(move |tracee| tracee.registers(mask))
    }

    /// Reads tracee memory.
    ///
    /// # Arguments
    ///
    /// * `address` - First byte.
    /// * `length` - Bytes requested.
    ///
    /// # Returns
    ///
    /// The accessible prefix of the range, possibly shorter than `length`,
    /// or `BadAddress` if the first byte is not mapped.
    pub fn read_memory(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        self.call(move |tracee| tracee.read_memory(address, length))
    }

    /// Lists the tracee's memory mappings.
    pub fn mappings(&self) -> Result<Vec<Mapping>> {
        self.call(Tracee::mappings)
    }

    /// Kills and reaps the tracee, then stops the worker.
    pub fn destroy(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        // Closing the queue ends the worker loop, which reaps the tracee.
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(pid = self.pid.as_raw(), "tracee worker panicked");
            }
            debug!(pid = self.pid.as_raw(), "instance destroyed");
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.teardown();
    }
}
