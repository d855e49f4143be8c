//! # Maintenance Worker
//!
//! Background thread for re-ranking and snapshot writes.
//!
//! Request handlers never run the global re-rank or the snapshot write
//! themselves; they ask this worker to do it. At most one job waits in the
//! queue, so a burst of triggers while a refresh is running collapses into
//! a single follow-up refresh.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender, TrySendError};
use log::{debug, error, info};

#[derive(Debug)]
enum Job {
    Refresh,
}

/// Handle to the maintenance thread. Dropping it lets the thread finish
/// the queued job and exit; [`MaintenanceWorker::shutdown`] also waits.
#[derive(Debug)]
pub struct MaintenanceWorker {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Start the thread; `task` runs once per accepted refresh request.
    pub fn spawn<F>(task: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (sender, receiver) = bounded::<Job>(1);
        let handle = thread::Builder::new()
            .name("muse-graph-maintenance".to_string())
            .spawn(move || {
                debug!("Maintenance worker started");
                for job in receiver.iter() {
                    match job {
                        Job::Refresh => task(),
                    }
                }
                debug!("Maintenance worker stopped");
            })?;

        Ok(Self { sender: Some(sender), handle: Some(handle) })
    }

    /// Queue a refresh. Returns `false` when one is already waiting.
    pub fn request_refresh(&self) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(Job::Refresh) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Refresh already queued, skipping");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("Maintenance worker is gone, refresh dropped");
                false
            }
        }
    }

    /// Close the queue and wait for the thread to finish pending work.
    pub fn shutdown(mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Maintenance worker panicked");
            } else {
                info!("Maintenance worker shut down");
            }
        }
    }
}
