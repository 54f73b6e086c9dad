use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// Why background work is being asked to wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StopReason {
    /// The operator interrupted the run, for example with Ctrl-C.
    #[display("interrupted by operator")]
    Interrupted,
    /// The run reached its end and helpers such as the progress bar should exit.
    #[display("run complete")]
    RunComplete,
}

#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<StopReason>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
        }
    }

    pub fn shutdown(&self, reason: StopReason) {
        if let Err(e) = self.sender.send(reason) {
            // Nobody is listening any more, which is fine once every helper has exited.
            log::debug!("Shutdown signal ({reason}) had no listeners: {e:?}");
        }
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

/// Receiving side of a [ShutdownHandle].
///
/// Once a reason has been observed it is latched, so repeated checks keep reporting the shutdown.
#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<StopReason>>>,
    received: Option<StopReason>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<StopReason>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            received: None,
        }
    }

    /// Point in time check of whether a shutdown has been requested.
    pub fn should_shutdown(&mut self) -> bool {
        if self.received.is_some() {
            return true;
        }

        match self.receiver.try_lock() {
            Ok(mut guard) => match guard.try_recv() {
                Ok(reason) => {
                    self.received = Some(reason);
                    true
                }
                Err(TryRecvError::Closed) => {
                    self.received = Some(StopReason::RunComplete);
                    true
                }
                // Empty or lagged, keep going.
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// The reason observed by the last successful check, if any.
    pub fn reason(&self) -> Option<StopReason> {
        self.received
    }

    /// Wait until a shutdown is requested and return why. Safe to race against other futures.
    ///
    /// If every [ShutdownHandle] has been dropped then nobody can request a shutdown any more and
    /// this resolves with [StopReason::RunComplete].
    pub async fn wait_for_shutdown(&mut self) -> StopReason {
        if let Some(reason) = self.received {
            return reason;
        }

        let mut guard = self.receiver.lock().await;
        let reason = loop {
            match guard.recv().await {
                Ok(reason) => break reason,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break StopReason::RunComplete,
            }
        };
        drop(guard);

        self.received = Some(reason);
        reason
    }
}
