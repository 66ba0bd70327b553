mod actor;
mod backoff;
mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, instrument};

use self::actor::{Actor, CommandRequest, Observers};
pub use self::snapshot::{ConnectionPhase, Snapshot};
use crate::codec::{Backlight, Command};
use crate::config::{CoordinatorConfig, DeviceConfig};
use crate::detect::{DeviceModel, Generation};
use crate::error::CommandError;
use crate::hw::Transport;

const COMMAND_QUEUE_DEPTH: usize = 8;

/// How a successfully written command was acknowledged.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// A decoded update arrived after the write.
    #[strum(to_string = "confirmed")]
    Confirmed,
    /// No update arrived within the confirmation timeout.
    #[strum(to_string = "unconfirmed")]
    Unconfirmed,
}

/// Handle to a task that keeps one Power Watchdog connected.
///
/// The task connects, initializes the detected generation, decodes
/// notifications into [`Snapshot`]s, reconnects with exponential backoff and
/// forces a reconnect when data goes stale. Dropping the handle tears the
/// task down; [`Coordinator::shutdown`] also waits for it to finish.
///
/// ```no_run
/// # async fn demo() -> Result<(), hughes::CommandError> {
/// use hughes::{Coordinator, CoordinatorConfig, DeviceConfig, FakeTransport, FakeTransportConfig};
///
/// let transport = FakeTransport::new(FakeTransportConfig::builder().local_name("WD_V6_01").build());
/// let device = DeviceConfig::builder().address("FA:KE").name("WD_V6_01").build();
/// let coordinator = Coordinator::spawn(Box::new(transport), device, CoordinatorConfig::default());
/// let outcome = coordinator.set_relay(false).await?;
/// println!("relay off: {outcome}");
/// coordinator.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Coordinator {
    model: DeviceModel,
    command_timeout: Duration,
    commands: mpsc::Sender<CommandRequest>,
    snapshots: watch::Receiver<Snapshot>,
    observers: Observers,
    cancel_guard: DropGuard,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("model", &self.model)
            .field("phase", &self.snapshots.borrow().phase())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Spawns the coordinator task on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        transport: Box<dyn Transport>,
        device: DeviceConfig,
        config: CoordinatorConfig,
    ) -> Self {
        let model = device.model();
        let (snapshot_tx, snapshots) = watch::channel(Snapshot::new(
            device.clone(),
            model.clone(),
            config.stale_threshold(),
        ));
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let observers: Observers = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let actor = Actor::new(
            transport,
            device,
            config,
            snapshot_tx,
            Arc::clone(&observers),
            cancel.clone(),
        );
        let task = tokio::spawn(actor.run(command_rx));

        Self {
            model,
            command_timeout: config.command_timeout(),
            commands,
            snapshots,
            observers,
            cancel_guard: cancel.drop_guard(),
            task,
        }
    }

    /// Returns the latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Streams snapshots, starting with the current one.
    ///
    /// Rapid successive changes may be coalesced; register an observer with
    /// [`Coordinator::on_update`] to see every one.
    #[must_use]
    pub fn updates(&self) -> WatchStream<Snapshot> {
        WatchStream::new(self.snapshots.clone())
    }

    /// Registers a callback invoked synchronously by the coordinator task for
    /// every published snapshot.
    ///
    /// Callbacks must not block and must not register further callbacks.
    pub fn on_update<F>(&self, observer: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.observers.lock().push(Box::new(observer));
    }

    /// Switches the relay (Gen2 only).
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the device is Gen1, not connected, the
    /// write fails or the coordinator has been torn down.
    pub async fn set_relay(&self, on: bool) -> Result<CommandOutcome, CommandError> {
        self.issue(Command::SetRelay(on)).await
    }

    /// Sets the display backlight level `0..=5` (Gen2 only).
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidBacklight`] for levels above 5, and the
    /// same errors as [`Coordinator::set_relay`] otherwise.
    pub async fn set_backlight(&self, level: u8) -> Result<CommandOutcome, CommandError> {
        let level = Backlight::new(level)?;
        self.issue(Command::SetBacklight(level)).await
    }

    /// Enables or disables neutral detection (Gen2 only).
    ///
    /// # Errors
    ///
    /// See [`Coordinator::set_relay`].
    pub async fn set_neutral_detection(
        &self,
        enabled: bool,
    ) -> Result<CommandOutcome, CommandError> {
        self.issue(Command::SetNeutralDetection(enabled)).await
    }

    /// Resets the cumulative energy counter (Gen2 only).
    ///
    /// # Errors
    ///
    /// See [`Coordinator::set_relay`].
    pub async fn reset_energy(&self) -> Result<CommandOutcome, CommandError> {
        self.issue(Command::ResetEnergy).await
    }

    /// Sets the device clock to `at`, sent as UTC (Gen2 only).
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Encode`] for years outside the device range,
    /// and the same errors as [`Coordinator::set_relay`] otherwise.
    pub async fn sync_time(&self, at: OffsetDateTime) -> Result<CommandOutcome, CommandError> {
        self.issue(Command::SyncTime(at)).await
    }

    /// Tears the coordinator down and waits for its task to finish.
    #[instrument(skip(self), level = "debug")]
    pub async fn shutdown(self) {
        let Self {
            cancel_guard, task, ..
        } = self;
        drop(cancel_guard);
        if let Err(error) = task.await {
            debug!(%error, "coordinator task ended abnormally");
        }
    }

    #[instrument(skip(self), level = "debug", fields(%command))]
    async fn issue(&self, command: Command) -> Result<CommandOutcome, CommandError> {
        if self.model.generation() == Generation::Gen1 {
            return Err(CommandError::Unsupported {
                generation: Generation::Gen1,
            });
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(CommandRequest { command, reply })
            .await
            .map_err(|_closed| CommandError::TornDown)?;
        let baseline = response.await.map_err(|_closed| CommandError::TornDown)??;

        let mut snapshots = self.snapshots.clone();
        let confirmed = timeout(
            self.command_timeout,
            snapshots.wait_for(|snapshot| snapshot.update_count() > baseline),
        )
        .await
        .is_ok_and(|waited| waited.is_ok());

        debug!(confirmed, "command completed");
        Ok(if confirmed {
            CommandOutcome::Confirmed
        } else {
            CommandOutcome::Unconfirmed
        })
    }
}
