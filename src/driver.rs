//! Tokio event-loop driver for the sync engine.
//!
//! The engine itself performs no I/O; this module supplies the host side:
//! a [`Transport`] abstraction over the packet substrate, a [`run`] loop
//! that feeds the engine and carries out its outputs, and a [`SyncHandle`]
//! through which applications publish and subscribe.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::engine::{Command, InEvent, OutEvent, SyncPubsub, Timer, UpdateCb};
use crate::error::{PubsyncError, Result};
use crate::name::Name;
use crate::publication::Publication;

/// A packet exchanged through the substrate.
///
/// The substrate pairs each reply with the request it satisfies by name;
/// the driver recovers the request nonce locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Packet {
    /// A sync request carrying the requester's summary in its name.
    Request {
        /// Request name: reconciliation prefix plus IBLT component.
        name: Name,
        /// Requester's nonce.
        nonce: u32,
        /// Request lifetime in milliseconds.
        lifetime_ms: u64,
    },
    /// A reply carrying a publication block.
    Reply {
        /// Name of the request being satisfied.
        name: Name,
        /// Publication block payload.
        payload: Vec<u8>,
        /// Freshness period in milliseconds.
        freshness_ms: u64,
    },
}

/// Packet substrate the driver runs over.
///
/// Implementations register a prefix with loopback disabled, deliver at
/// most one reply per expressed request, and surface incoming packets
/// through `recv`. Specific wire bindings are out of scope here.
pub trait Transport: Send {
    /// Register interest in packets under `prefix`; resolves once the
    /// forwarder confirms the registration.
    fn register(&mut self, prefix: &Name) -> impl Future<Output = Result<()>> + Send;

    /// Emit a packet.
    fn send(&mut self, packet: Packet) -> impl Future<Output = Result<()>> + Send;

    /// Receive the next packet, or `None` once the substrate closes.
    ///
    /// Must be cancellation-safe: the driver polls it inside a select loop
    /// and drops the future when another branch wins.
    fn recv(&mut self) -> impl Future<Output = Option<Packet>> + Send;
}

/// Application-side command consumed by a running driver.
pub enum DriverCommand {
    /// Publish a publication.
    Publish(Publication),
    /// Subscribe a callback under a prefix.
    Subscribe(Name, UpdateCb),
    /// Remove the subscription under a prefix.
    Unsubscribe(Name),
}

/// Handle through which applications talk to a running driver.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<DriverCommand>,
}

impl SyncHandle {
    /// Publish a publication. Its name should already end in a timestamp
    /// component.
    ///
    /// # Errors
    ///
    /// Returns `Stopped` if the driver has shut down.
    pub fn publish(&self, publication: Publication) -> Result<()> {
        self.tx
            .send(DriverCommand::Publish(publication))
            .map_err(|_| PubsyncError::Stopped)
    }

    /// Subscribe `cb` to publications under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `Stopped` if the driver has shut down.
    pub fn subscribe(
        &self,
        prefix: Name,
        cb: impl FnMut(&Publication) + Send + 'static,
    ) -> Result<()> {
        self.tx
            .send(DriverCommand::Subscribe(prefix, Box::new(cb)))
            .map_err(|_| PubsyncError::Stopped)
    }

    /// Remove the subscription under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `Stopped` if the driver has shut down.
    pub fn unsubscribe(&self, prefix: Name) -> Result<()> {
        self.tx
            .send(DriverCommand::Unsubscribe(prefix))
            .map_err(|_| PubsyncError::Stopped)
    }

    /// Run `cb` after `delay`. Aborting the returned handle cancels it.
    ///
    /// Convenience timer primitive for applications built on the engine;
    /// must be called within a tokio runtime.
    pub fn schedule(
        &self,
        delay: Duration,
        cb: impl FnOnce() + Send + 'static,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cb();
        })
    }
}

/// Create a command channel: the handle for the application, the receiver
/// for [`run`].
#[must_use]
pub fn channel() -> (SyncHandle, mpsc::UnboundedReceiver<DriverCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SyncHandle { tx }, rx)
}

async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Drive the engine over a transport until the command channel or the
/// transport closes.
///
/// Registers the reconciliation prefix first; the engine sends its first
/// sync request on confirmation.
///
/// # Errors
///
/// Returns `RegisterFailed` if the prefix cannot be installed, or the
/// transport's error if sending fails.
pub async fn run<R, T>(
    mut engine: SyncPubsub<R>,
    mut transport: T,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
) -> Result<()>
where
    R: Rng,
    T: Transport,
{
    let prefix = engine.prefix().clone();
    let event = match transport.register(&prefix).await {
        Ok(()) => InEvent::RegisterConfirmed,
        Err(e) => InEvent::RegisterFailed {
            reason: e.to_string(),
        },
    };

    let mut timers: BTreeMap<Instant, Vec<Timer>> = BTreeMap::new();
    let mut last_request: Option<(Name, u32)> = None;
    step(&mut engine, event, &mut transport, &mut timers, &mut last_request).await?;

    loop {
        let deadline = timers.keys().next().copied();
        let event = tokio::select! {
            packet = transport.recv() => match packet {
                Some(Packet::Request { name, nonce, .. }) => InEvent::RecvRequest { name, nonce },
                Some(Packet::Reply { name, payload, .. }) => {
                    // Recover which of our requests this reply satisfies.
                    let nonce = last_request
                        .as_ref()
                        .filter(|(request, _)| *request == name)
                        .map_or(0, |(_, nonce)| *nonce);
                    InEvent::RecvReply { name, nonce, payload }
                }
                None => return Ok(()),
            },
            command = commands.recv() => match command {
                Some(DriverCommand::Publish(publication)) => {
                    InEvent::Command(Command::Publish(publication))
                }
                Some(DriverCommand::Subscribe(prefix, cb)) => {
                    engine.subscribe(prefix, cb);
                    continue;
                }
                Some(DriverCommand::Unsubscribe(prefix)) => {
                    engine.unsubscribe(&prefix);
                    continue;
                }
                None => return Ok(()),
            },
            () = maybe_sleep(deadline), if deadline.is_some() => {
                let now = Instant::now();
                let due: Vec<Instant> = timers
                    .keys()
                    .take_while(|&&at| at <= now)
                    .copied()
                    .collect();
                for at in due {
                    for timer in timers.remove(&at).unwrap_or_default() {
                        step(
                            &mut engine,
                            InEvent::TimerExpired(timer),
                            &mut transport,
                            &mut timers,
                            &mut last_request,
                        )
                        .await?;
                    }
                }
                continue;
            }
        };
        step(&mut engine, event, &mut transport, &mut timers, &mut last_request).await?;
    }
}

#[allow(clippy::cast_possible_truncation)]
async fn step<R: Rng, T: Transport>(
    engine: &mut SyncPubsub<R>,
    event: InEvent,
    transport: &mut T,
    timers: &mut BTreeMap<Instant, Vec<Timer>>,
    last_request: &mut Option<(Name, u32)>,
) -> Result<()> {
    let now = Instant::now();
    let outs: Vec<OutEvent> = engine.handle(event, now.into_std()).collect();
    for out in outs {
        match out {
            OutEvent::SendRequest {
                name,
                nonce,
                lifetime,
            } => {
                *last_request = Some((name.clone(), nonce));
                transport
                    .send(Packet::Request {
                        name,
                        nonce,
                        lifetime_ms: lifetime.as_millis() as u64,
                    })
                    .await?;
            }
            OutEvent::SendReply {
                name,
                payload,
                freshness,
            } => {
                transport
                    .send(Packet::Reply {
                        name,
                        payload,
                        freshness_ms: freshness.as_millis() as u64,
                    })
                    .await?;
            }
            OutEvent::ScheduleTimer(delay, timer) => {
                timers.entry(now + delay).or_default().push(timer);
            }
            OutEvent::RegistrationFailed { reason } => {
                return Err(PubsyncError::RegisterFailed { reason });
            }
        }
    }
    Ok(())
}
