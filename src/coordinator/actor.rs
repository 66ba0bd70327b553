use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout_at};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::backoff::ReconnectPolicy;
use super::snapshot::{ConnectionPhase, Snapshot};
use crate::codec::{CodecError, Command, ProtocolCodec, codec_for};
use crate::config::{CoordinatorConfig, DeviceConfig};
use crate::detect::{DeviceModel, Generation};
use crate::error::{CommandError, ConnectError, InteractionError};
use crate::hw::{LinkEvent, LinkEventStream, Transport, TransportSession, validate_identity};
use crate::protocol::{GEN2_PROTOCOL_OPEN, endpoints_for, is_gen2_open_ack};
use crate::state::DeviceState;
use crate::utils::format_hex;

pub(crate) type Observer = Box<dyn Fn(&Snapshot) + Send + Sync>;
pub(crate) type Observers = Arc<Mutex<Vec<Observer>>>;

/// A command waiting for the owner task, answered with the update count at
/// write time.
#[derive(Debug)]
pub(crate) struct CommandRequest {
    pub(crate) command: Command,
    pub(crate) reply: oneshot::Sender<Result<u64, CommandError>>,
}

impl CommandRequest {
    fn reject(self, error: CommandError) {
        if self.reply.send(Err(error)).is_err() {
            debug!("command caller went away before rejection");
        }
    }
}

enum AttemptOutcome {
    Connected(Link),
    Failed(ConnectError),
    Cancelled,
}

/// An initialized session plus chunks that arrived during the handshake.
struct Link {
    session: Box<dyn TransportSession>,
    events: LinkEventStream,
    early_chunks: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum LinkEnd {
    Lost,
    Stale,
    Cancelled,
}

/// Single owner of the transport session, codec and published state.
pub(crate) struct Actor {
    transport: Box<dyn Transport>,
    device: DeviceConfig,
    model: DeviceModel,
    config: CoordinatorConfig,
    policy: ReconnectPolicy,
    codec: Box<dyn ProtocolCodec>,
    snapshots: watch::Sender<Snapshot>,
    observers: Observers,
    cancel: CancellationToken,
}

impl Actor {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        device: DeviceConfig,
        config: CoordinatorConfig,
        snapshots: watch::Sender<Snapshot>,
        observers: Observers,
        cancel: CancellationToken,
    ) -> Self {
        let model = device.model();
        Self {
            transport,
            codec: codec_for(&model),
            policy: ReconnectPolicy::from_config(&config),
            device,
            model,
            config,
            snapshots,
            observers,
            cancel,
        }
    }

    #[instrument(
        skip_all,
        name = "coordinator",
        fields(address = %self.device.address(), generation = %self.model.generation())
    )]
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<CommandRequest>) {
        let mut failures: u32 = 0;

        loop {
            self.publish(|snapshot| snapshot.set_phase(ConnectionPhase::Connecting));

            let outcome = {
                let attempt = self.attempt_connection();
                tokio::pin!(attempt);
                loop {
                    tokio::select! {
                        outcome = &mut attempt => break outcome,
                        Some(request) = commands.recv() => request.reject(CommandError::NotConnected),
                    }
                }
            };

            match outcome {
                AttemptOutcome::Cancelled => break,
                AttemptOutcome::Failed(error) => {
                    warn!(error = %error, attempt = failures + 1, "connection attempt failed");
                }
                AttemptOutcome::Connected(link) => {
                    failures = 0;
                    match self.run_connected(link, &mut commands).await {
                        LinkEnd::Cancelled => break,
                        LinkEnd::Lost | LinkEnd::Stale => {}
                    }
                }
            }

            let delay = self.policy.delay_for(failures);
            failures = failures.saturating_add(1);
            info!(
                attempt = failures,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling reconnect"
            );
            self.publish(|snapshot| {
                snapshot.set_reconnect_failures(failures);
                snapshot.set_phase(ConnectionPhase::Reconnecting {
                    attempt: failures,
                    delay,
                });
            });

            let wait = sleep(delay);
            tokio::pin!(wait);
            let cancelled = loop {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break true,
                    () = &mut wait => break false,
                    Some(request) = commands.recv() => request.reject(CommandError::NotConnected),
                }
            };
            if cancelled {
                break;
            }
        }

        commands.close();
        while let Ok(request) = commands.try_recv() {
            request.reject(CommandError::TornDown);
        }
        self.publish(|snapshot| snapshot.set_phase(ConnectionPhase::TornDown));
        info!("coordinator torn down");
    }

    async fn attempt_connection(&mut self) -> AttemptOutcome {
        let cancel = self.cancel.clone();

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => return AttemptOutcome::Cancelled,
            result = self.transport.connect(self.device.address()) => result,
        };
        let session = match connected {
            Ok(session) => session,
            Err(error) => return AttemptOutcome::Failed(error.into()),
        };

        let peripheral = session.device().clone();
        info!(peripheral = peripheral.address(), "transport connected; initializing");
        self.publish(|snapshot| {
            snapshot.set_peripheral(peripheral);
            snapshot.set_phase(ConnectionPhase::Initializing);
        });

        let initialized = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.initialize(session.as_ref()) => Some(result),
        };

        match initialized {
            Some(Ok((events, early_chunks))) => AttemptOutcome::Connected(Link {
                session,
                events,
                early_chunks,
            }),
            Some(Err(error)) => {
                close_session(session).await;
                AttemptOutcome::Failed(error)
            }
            None => {
                close_session(session).await;
                AttemptOutcome::Cancelled
            }
        }
    }

    async fn initialize(
        &mut self,
        session: &dyn TransportSession,
    ) -> Result<(LinkEventStream, Vec<Vec<u8>>), ConnectError> {
        validate_identity(&self.model, session.services(), session.device().local_name())?;
        let endpoints = endpoints_for(self.model.generation());
        self.codec.reset();

        match self.model.generation() {
            Generation::Gen1 => {
                sleep(self.config.gen1_settle()).await;
                sleep(self.config.operation_delay()).await;
                let events = session.subscribe(endpoints.notify).await?;
                info!("gen1 notifications enabled");
                Ok((events, Vec::new()))
            }
            Generation::Gen2 => {
                if let Err(error) = session.request_mtu(self.config.requested_mtu()).await {
                    debug!(%error, "MTU request not supported");
                }
                sleep(self.config.operation_delay()).await;
                let mut events = session.subscribe(endpoints.notify).await?;
                info!("gen2 notifications enabled");

                if let Err(error) = session.write(endpoints.write, GEN2_PROTOCOL_OPEN).await {
                    warn!(%error, "protocol open write failed; continuing");
                }
                let early_chunks =
                    await_open_ack(&mut events, self.config.handshake_timeout()).await?;
                sleep(self.config.gen2_settle()).await;
                Ok((events, early_chunks))
            }
        }
    }

    async fn run_connected(
        &mut self,
        link: Link,
        commands: &mut mpsc::Receiver<CommandRequest>,
    ) -> LinkEnd {
        let Link {
            session,
            mut events,
            early_chunks,
        } = link;
        let connected_at = Instant::now();
        info!("connected");
        self.publish(|snapshot| {
            snapshot.set_reconnect_failures(0);
            snapshot.set_phase(ConnectionPhase::Connected);
        });

        for chunk in early_chunks {
            self.ingest(&chunk);
        }

        let watchdog_interval = self.config.watchdog_interval();
        let mut watchdog = interval_at(connected_at + watchdog_interval, watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.cancel.clone();

        let end = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break LinkEnd::Cancelled,
                event = events.next() => match event {
                    Some(LinkEvent::Notification(chunk)) => self.ingest(&chunk),
                    Some(LinkEvent::Disconnected) | None => {
                        warn!("device disconnected");
                        break LinkEnd::Lost;
                    }
                },
                Some(request) = commands.recv() => tokio::select! {
                    biased;
                    () = cancel.cancelled() => break LinkEnd::Cancelled,
                    () = self.execute(session.as_ref(), request) => {}
                },
                _ = watchdog.tick() => {
                    if self.is_stale(connected_at) {
                        warn!(
                            stale_threshold = ?self.config.stale_threshold(),
                            "no data within staleness threshold; forcing reconnect"
                        );
                        break LinkEnd::Stale;
                    }
                }
            }
        };

        drop(events);
        match end {
            LinkEnd::Lost => {}
            LinkEnd::Stale | LinkEnd::Cancelled => close_session(session).await,
        }
        self.publish(|snapshot| snapshot.set_phase(ConnectionPhase::Disconnected));
        end
    }

    fn is_stale(&self, connected_at: Instant) -> bool {
        let snapshot = self.snapshots.borrow();
        let baseline = snapshot
            .state()
            .map_or(connected_at, |state| state.last_seen().max(connected_at));
        Instant::now().saturating_duration_since(baseline) > self.config.stale_threshold()
    }

    fn ingest(&mut self, chunk: &[u8]) {
        let now = Instant::now();
        for update in self.codec.ingest(chunk, now) {
            let model = &self.model;
            self.publish(|snapshot| {
                match snapshot.state_mut() {
                    Some(state) => state.apply(update, now),
                    slot => {
                        let first = DeviceState::from_first_update(model, update, now);
                        info!(
                            voltage = first.line1().voltage(),
                            current = first.line1().current(),
                            error = first.line1().error_text(),
                            "first data received"
                        );
                        *slot = Some(first);
                    }
                }
                snapshot.record_update();
            });
        }
    }

    async fn execute(&mut self, session: &dyn TransportSession, request: CommandRequest) {
        let CommandRequest { command, reply } = request;
        let result = match self.codec.encode(&command) {
            Err(CodecError::Unsupported { generation }) => {
                Err(CommandError::Unsupported { generation })
            }
            Err(error) => Err(CommandError::Encode(error)),
            Ok(payload) => {
                info!(%command, payload = %format_hex(&payload), "sending command");
                let baseline = self.snapshots.borrow().update_count();
                let endpoint = endpoints_for(self.model.generation()).write;
                match session.write(endpoint, &payload).await {
                    Ok(()) => Ok(baseline),
                    Err(error) => {
                        warn!(%error, %command, "command write failed");
                        Err(CommandError::Write(error))
                    }
                }
            }
        };

        if reply.send(result).is_err() {
            debug!(%command, "command caller went away before the reply");
        }
    }

    fn publish(&self, change: impl FnOnce(&mut Snapshot)) {
        self.snapshots.send_modify(change);

        let observers = self.observers.lock();
        if observers.is_empty() {
            return;
        }
        let snapshot = self.snapshots.borrow().clone();
        for observer in observers.iter() {
            observer(&snapshot);
        }
    }
}

/// Waits for the `ok` acknowledgement, keeping any other chunks for replay.
async fn await_open_ack(
    events: &mut LinkEventStream,
    handshake_timeout: Duration,
) -> Result<Vec<Vec<u8>>, ConnectError> {
    let deadline = Instant::now() + handshake_timeout;
    let mut early_chunks = Vec::new();

    loop {
        match timeout_at(deadline, events.next()).await {
            Err(_elapsed) => {
                info!("no protocol open acknowledgement; continuing");
                return Ok(early_chunks);
            }
            Ok(Some(LinkEvent::Notification(chunk))) if is_gen2_open_ack(&chunk) => {
                debug!("protocol open acknowledged");
                return Ok(early_chunks);
            }
            Ok(Some(LinkEvent::Notification(chunk))) => early_chunks.push(chunk),
            Ok(Some(LinkEvent::Disconnected) | None) => {
                return Err(InteractionError::LinkClosed.into());
            }
        }
    }
}

async fn close_session(session: Box<dyn TransportSession>) {
    if let Err(error) = session.disconnect().await {
        debug!(%error, "failed to disconnect cleanly");
    }
}
