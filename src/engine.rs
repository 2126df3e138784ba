//! Publish/subscribe synchronization engine.
//!
//! [`SyncPubsub`] keeps a lifetime-bounded set of active publications in
//! loose agreement with an arbitrary group of peers. It advertises its set
//! as a compressed IBLT inside a sync request name; peers answer with the
//! publications the requester appears to lack, and expiry needs no delete
//! messages.
//!
//! The engine is a state machine with no I/O of its own: feed it
//! [`InEvent`]s through [`SyncPubsub::handle`] and carry out the returned
//! [`OutEvent`]s — sending packets and scheduling timers is the host's job.
//! This realizes a single-threaded cooperative model: every event runs to
//! completion, and no locking is needed.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use tracing::{debug, error, info, warn};

use crate::iblt::Iblt;
use crate::name::{Component, Name};
use crate::publication::{AcceptAll, Blake3Signer, Publication, Signer, Validator};
use crate::wire::{self, PayloadBuilder};

/// Default expected entries in the IBLT (≈128 cells / 1.5).
pub const DEFAULT_EXPECTED_ENTRIES: usize = 85;

/// Default publication lifetime.
pub const DEFAULT_PUB_LIFETIME: Duration = Duration::from_secs(1);

/// Default bound on peer clock skew.
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(1);

/// Default sync request lifetime.
pub const DEFAULT_REQUEST_LIFETIME: Duration = Duration::from_secs(4);

/// Default maximum reply payload in bytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 1300;

/// Requests are re-sent this far ahead of their expiry so the summary
/// stays outstanding through propagation delays.
const RESEND_MARGIN: Duration = Duration::from_millis(20);

/// Delay before re-advertising after an expired entry leaves the IBLT.
const READVERTISE_DELAY: Duration = Duration::from_millis(3);

/// Publication has not yet reached one lifetime; required to be offered.
const FRESH: u8 = 1;

/// Publication originated at this peer.
const MINE: u8 = 2;

/// Callback invoked for each newly learned publication matching a
/// subscription.
pub type UpdateCb = Box<dyn FnMut(&Publication) + Send>;

/// Callback testing whether a publication's embedded timestamp lies outside
/// its lifetime window.
pub type IsExpiredCb = Box<dyn Fn(&Publication) -> bool + Send>;

/// Callback ordering reply candidates, given the candidates this peer
/// originated and those learned from others.
pub type FilterPubsCb =
    Box<dyn Fn(Vec<Arc<Publication>>, Vec<Arc<Publication>>) -> Vec<Arc<Publication>> + Send>;

/// Wall-clock reading in milliseconds since the Unix epoch; stamps
/// publication timestamps and drives the default expiry test.
pub type ClockFn = Box<dyn Fn() -> u64 + Send>;

#[allow(clippy::cast_possible_truncation)]
fn system_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[allow(clippy::cast_possible_truncation)]
fn as_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

struct ActiveEntry {
    publication: Arc<Publication>,
    flags: u8,
}

/// Input event to the engine.
#[derive(Debug)]
pub enum InEvent {
    /// Execute a command from the application.
    Command(Command),
    /// A peer's sync request arrived under the reconciliation prefix.
    RecvRequest {
        /// Full request name: prefix plus the peer's IBLT component.
        name: Name,
        /// The peer's request nonce.
        nonce: u32,
    },
    /// A reply to one of our sync requests arrived.
    RecvReply {
        /// Name of the satisfied request.
        name: Name,
        /// Nonce of the satisfied request.
        nonce: u32,
        /// Publication block payload.
        payload: Vec<u8>,
    },
    /// A previously scheduled timer fired.
    TimerExpired(Timer),
    /// The forwarder confirmed the reconciliation prefix registration.
    RegisterConfirmed,
    /// The forwarder refused the reconciliation prefix registration. Fatal.
    RegisterFailed {
        /// Reason reported by the forwarder.
        reason: String,
    },
}

/// Application command.
#[derive(Debug)]
pub enum Command {
    /// Add a publication to the active set and advertise it.
    Publish(Publication),
}

/// A timer the host schedules on the engine's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timer {
    /// Re-send the current sync request before it expires. Stale
    /// generations are ignored, which is how a replaced schedule cancels.
    ResendRequest {
        /// Generation current when this timer was scheduled.
        generation: u64,
    },
    /// One lifetime elapsed: stop offering the publication.
    ClearFresh {
        /// Fingerprint of the affected publication.
        fingerprint: u32,
    },
    /// Lifetime plus clock skew elapsed: remove from the summary.
    EraseIblt {
        /// Fingerprint of the affected publication.
        fingerprint: u32,
    },
    /// Two lifetimes elapsed: drop from the active set.
    DropActive {
        /// Fingerprint of the affected publication.
        fingerprint: u32,
    },
}

/// An output event from the engine.
#[derive(Debug)]
pub enum OutEvent {
    /// Express a sync request with freshness required and the given
    /// lifetime.
    SendRequest {
        /// Request name: prefix plus our compressed IBLT.
        name: Name,
        /// Nonce identifying this request.
        nonce: u32,
        /// Request lifetime.
        lifetime: Duration,
    },
    /// Emit a reply to a peer's sync request.
    SendReply {
        /// Name of the request being satisfied.
        name: Name,
        /// Publication block payload.
        payload: Vec<u8>,
        /// Freshness period of the reply.
        freshness: Duration,
    },
    /// Schedule a timer; the host feeds back [`InEvent::TimerExpired`]
    /// after the duration.
    ScheduleTimer(Duration, Timer),
    /// Prefix registration failed; the engine has stopped.
    RegistrationFailed {
        /// Reason reported by the forwarder.
        reason: String,
    },
}

/// Counters kept across the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Publications added locally via publish.
    pub publications: u64,
    /// Sync requests sent.
    pub requests_sent: u64,
    /// Sync replies sent.
    pub replies_sent: u64,
    /// Publications delivered to subscriptions.
    pub deliveries: u64,
}

/// Configuration fixed for an engine's lifetime.
pub struct SyncConfig {
    /// Name prefix under which reconciliation runs.
    pub prefix: Name,
    /// Expected concurrent entries; sizes the IBLT.
    pub expected_entries: usize,
    /// Publication lifetime L.
    pub pub_lifetime: Duration,
    /// Maximum tolerated peer clock skew S.
    pub max_clock_skew: Duration,
    /// Sync request lifetime T.
    pub request_lifetime: Duration,
    /// Maximum reply payload in bytes.
    pub max_payload: usize,
    /// Signs publications on publish.
    pub signer: Box<dyn Signer>,
    /// Validates incoming replies.
    pub validator: Box<dyn Validator>,
    /// Expiry test override; the default checks the embedded timestamp
    /// against `[now − L − S, now + S]`.
    pub is_expired: Option<IsExpiredCb>,
    /// Reply ordering override; the default answers only when at least one
    /// candidate is ours, newest first, ours before others.
    pub filter_pubs: Option<FilterPubsCb>,
    /// Wall-clock source.
    pub clock: ClockFn,
}

/// Builder for [`SyncConfig`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use pubsync::{Name, SyncBuilder, SyncPubsub};
///
/// let config = SyncBuilder::new(Name::from("/room/sync"))
///     .expected_entries(32)
///     .pub_lifetime(Duration::from_secs(2))
///     .build();
/// let engine = SyncPubsub::new(config);
/// assert!(!engine.is_running());
/// ```
pub struct SyncBuilder {
    config: SyncConfig,
}

impl SyncBuilder {
    /// Start from defaults with the given reconciliation prefix.
    #[must_use]
    pub fn new(prefix: Name) -> Self {
        Self {
            config: SyncConfig {
                prefix,
                expected_entries: DEFAULT_EXPECTED_ENTRIES,
                pub_lifetime: DEFAULT_PUB_LIFETIME,
                max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
                request_lifetime: DEFAULT_REQUEST_LIFETIME,
                max_payload: DEFAULT_MAX_PAYLOAD,
                signer: Box::new(Blake3Signer),
                validator: Box::new(AcceptAll),
                is_expired: None,
                filter_pubs: None,
                clock: Box::new(system_clock_ms),
            },
        }
    }

    /// Set the expected concurrent entries.
    ///
    /// # Panics
    ///
    /// Panics if `entries` is zero.
    #[must_use]
    pub fn expected_entries(mut self, entries: usize) -> Self {
        assert!(entries > 0, "expected entries must be nonzero");
        self.config.expected_entries = entries;
        self
    }

    /// Set the publication lifetime.
    ///
    /// # Panics
    ///
    /// Panics if `lifetime` is zero.
    #[must_use]
    pub fn pub_lifetime(mut self, lifetime: Duration) -> Self {
        assert!(!lifetime.is_zero(), "publication lifetime must be nonzero");
        self.config.pub_lifetime = lifetime;
        self
    }

    /// Set the maximum tolerated peer clock skew.
    #[must_use]
    pub fn max_clock_skew(mut self, skew: Duration) -> Self {
        self.config.max_clock_skew = skew;
        self
    }

    /// Set the sync request lifetime.
    ///
    /// # Panics
    ///
    /// Panics if `lifetime` does not exceed the re-send margin (20 ms).
    #[must_use]
    pub fn request_lifetime(mut self, lifetime: Duration) -> Self {
        assert!(
            lifetime > RESEND_MARGIN,
            "request lifetime must exceed the re-send margin"
        );
        self.config.request_lifetime = lifetime;
        self
    }

    /// Set the maximum reply payload in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is smaller than the payload framing minimum.
    #[must_use]
    pub fn max_payload(mut self, bytes: usize) -> Self {
        assert!(bytes >= 16, "payload budget too small to frame anything");
        self.config.max_payload = bytes;
        self
    }

    /// Set the publication signer.
    #[must_use]
    pub fn signer(mut self, signer: impl Signer + 'static) -> Self {
        self.config.signer = Box::new(signer);
        self
    }

    /// Set the reply validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.config.validator = Box::new(validator);
        self
    }

    /// Override the expiry test.
    #[must_use]
    pub fn is_expired(mut self, cb: impl Fn(&Publication) -> bool + Send + 'static) -> Self {
        self.config.is_expired = Some(Box::new(cb));
        self
    }

    /// Override the reply candidate ordering.
    #[must_use]
    pub fn filter_pubs(
        mut self,
        cb: impl Fn(Vec<Arc<Publication>>, Vec<Arc<Publication>>) -> Vec<Arc<Publication>>
            + Send
            + 'static,
    ) -> Self {
        self.config.filter_pubs = Some(Box::new(cb));
        self
    }

    /// Override the wall-clock source.
    #[must_use]
    pub fn clock(mut self, clock: impl Fn() -> u64 + Send + 'static) -> Self {
        self.config.clock = Box::new(clock);
        self
    }

    /// Finish the configuration.
    #[must_use]
    pub fn build(self) -> SyncConfig {
        self.config
    }
}

/// The synchronization engine.
///
/// Constructed in the *registering* state: it sends nothing until the host
/// confirms the reconciliation prefix with [`InEvent::RegisterConfirmed`],
/// then transitions to *running* and issues its first sync request.
pub struct SyncPubsub<R = StdRng> {
    config: SyncConfig,
    iblt: Iblt,
    active: FxHashMap<u32, ActiveEntry>,
    interests: BTreeMap<Name, Instant>,
    subscriptions: BTreeMap<Name, UpdateCb>,
    outbox: VecDeque<OutEvent>,
    rng: R,
    current_nonce: u32,
    resend_generation: u64,
    delivering: bool,
    registering: bool,
    stopped: bool,
    stats: SyncStats,
}

impl SyncPubsub<StdRng> {
    /// Create an engine with an entropy-seeded nonce generator.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> SyncPubsub<R> {
    /// Create an engine with a caller-supplied nonce generator.
    #[must_use]
    pub fn with_rng(config: SyncConfig, rng: R) -> Self {
        let iblt = Iblt::new(config.expected_entries);
        Self {
            config,
            iblt,
            active: FxHashMap::default(),
            interests: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            outbox: VecDeque::new(),
            rng,
            current_nonce: 0,
            resend_generation: 0,
            delivering: false,
            registering: true,
            stopped: false,
            stats: SyncStats::default(),
        }
    }

    /// The reconciliation prefix.
    #[must_use]
    pub fn prefix(&self) -> &Name {
        &self.config.prefix
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Engine counters.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Check whether the engine is past registration and not stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.registering && !self.stopped
    }

    /// Iterate over the active publications.
    pub fn active(&self) -> impl Iterator<Item = &Publication> {
        self.active.values().map(|entry| entry.publication.as_ref())
    }

    /// Number of active publications.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Check whether a publication with this exact name is active.
    #[must_use]
    pub fn contains(&self, name: &Name) -> bool {
        self.active
            .values()
            .any(|entry| entry.publication.name() == name)
    }

    /// Subscribe `cb` to publications under `prefix`, replacing any
    /// existing subscription for that prefix. Only future arrivals are
    /// delivered.
    pub fn subscribe(&mut self, prefix: Name, cb: UpdateCb) {
        info!(prefix = %prefix, "subscribe");
        self.subscriptions.insert(prefix, cb);
    }

    /// Remove the subscription for `prefix`, if any.
    pub fn unsubscribe(&mut self, prefix: &Name) -> bool {
        info!(prefix = %prefix, "unsubscribe");
        self.subscriptions.remove(prefix).is_some()
    }

    /// Handle an incoming event.
    ///
    /// Returns an iterator of outgoing events that the host must process:
    /// packets to send and timers to schedule.
    pub fn handle(&mut self, event: InEvent, now: Instant) -> impl Iterator<Item = OutEvent> + '_ {
        if !self.stopped {
            match event {
                InEvent::Command(Command::Publish(publication)) => {
                    self.publish(publication, now);
                }
                InEvent::RecvRequest { name, nonce } => self.on_request(name, nonce, now),
                InEvent::RecvReply {
                    name,
                    nonce,
                    payload,
                } => self.on_reply(&name, nonce, &payload, now),
                InEvent::TimerExpired(timer) => self.on_timer(timer, now),
                InEvent::RegisterConfirmed => {
                    debug!(prefix = %self.config.prefix, "prefix registered");
                    self.registering = false;
                    self.send_request();
                }
                InEvent::RegisterFailed { reason } => {
                    error!(prefix = %self.config.prefix, reason = %reason, "prefix registration failed");
                    self.stopped = true;
                    self.outbox.push_back(OutEvent::RegistrationFailed { reason });
                }
            }
        }
        self.outbox.drain(..)
    }

    /// Add a local publication to the active set.
    ///
    /// A publication is published at most once and lives for at most one
    /// lifetime; republishing a known fingerprint is dropped.
    fn publish(&mut self, mut publication: Publication, now: Instant) {
        self.config.signer.sign(&mut publication);
        let fingerprint = match publication.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!(name = %publication.name(), "publish dropped: {e}");
                return;
            }
        };
        if self.active.contains_key(&fingerprint) {
            warn!(name = %publication.name(), "republish ignored");
            return;
        }
        info!(name = %publication.name(), "publish");
        self.stats.publications += 1;
        self.add_to_active(publication, fingerprint, true);
        // The new publication may satisfy pending peer requests.
        if !self.delivering {
            self.send_request();
            self.scan_interests(now);
        }
    }

    /// Send a sync request advertising our current summary, and schedule
    /// its re-expression ahead of expiry.
    fn send_request(&mut self) {
        // Nothing can reach us before the initial registration finishes;
        // the confirmation callback sends the first request.
        if self.registering || self.stopped {
            return;
        }
        self.resend_generation += 1;
        self.outbox.push_back(OutEvent::ScheduleTimer(
            self.config.request_lifetime.saturating_sub(RESEND_MARGIN),
            Timer::ResendRequest {
                generation: self.resend_generation,
            },
        ));

        let component = match self.iblt.encode() {
            Ok(component) => component,
            Err(e) => {
                error!("summary encode failed: {e}");
                return;
            }
        };
        let name = self
            .config
            .prefix
            .clone()
            .appended(Component::new(component));
        self.current_nonce = self.rng.gen();
        self.stats.requests_sent += 1;
        debug!(nonce = self.current_nonce, "send sync request");
        self.outbox.push_back(OutEvent::SendRequest {
            name,
            nonce: self.current_nonce,
            lifetime: self.config.request_lifetime,
        });
    }

    fn on_timer(&mut self, timer: Timer, now: Instant) {
        match timer {
            Timer::ResendRequest { generation } => {
                if generation == self.resend_generation {
                    self.send_request();
                }
            }
            Timer::ClearFresh { fingerprint } => {
                if let Some(entry) = self.active.get_mut(&fingerprint) {
                    entry.flags &= !FRESH;
                }
            }
            Timer::EraseIblt { fingerprint } => {
                if let Err(e) = self.iblt.erase(fingerprint) {
                    warn!("{e}");
                }
                // Peers should learn of the shrunk summary promptly.
                self.resend_generation += 1;
                self.outbox.push_back(OutEvent::ScheduleTimer(
                    READVERTISE_DELAY,
                    Timer::ResendRequest {
                        generation: self.resend_generation,
                    },
                ));
            }
            Timer::DropActive { fingerprint } => {
                if let Some(entry) = self.active.remove(&fingerprint) {
                    debug!(name = %entry.publication.name(), "drop from active set");
                }
            }
        }
    }

    /// Process a peer's sync request.
    fn on_request(&mut self, name: Name, nonce: u32, now: Instant) {
        if nonce == self.current_nonce {
            // The forwarder looped back our own request.
            return;
        }
        if name.len() != self.config.prefix.len() + 1
            || !self.config.prefix.is_prefix_of(&name)
        {
            info!(name = %name, "invalid sync request");
            return;
        }
        debug!(nonce, "recv sync request");
        if !self.answer_request(&name) {
            // Can't answer now; remember it until we can or it times out.
            self.interests
                .insert(name, now + self.config.request_lifetime);
        }
    }

    /// Try to answer one peer request. Returns true when the request needs
    /// no further tracking: answered, or malformed and dropped.
    fn answer_request(&mut self, name: &Name) -> bool {
        let Some(component) = name.last() else {
            return true;
        };
        let peer = match Iblt::decode(self.config.expected_entries, component.as_bytes()) {
            Ok(peer) => peer,
            Err(e) => {
                warn!("undecodable peer summary: {e}");
                return true;
            }
        };

        // Peeling the difference between our summary and the peer's yields
        // the fingerprints we hold that they lack (positive side).
        let peeled = self.iblt.difference(&peer).list();
        if let Some(e) = &peeled.error {
            debug!("{e}; serving the known subset");
        }
        debug!(
            have = peeled.positive.len(),
            need = peeled.negative.len(),
            "peer summary difference"
        );

        let mut mine = Vec::new();
        let mut others = Vec::new();
        for fingerprint in &peeled.positive {
            if let Some(entry) = self.active.get(fingerprint) {
                if entry.flags & FRESH != 0 {
                    if entry.flags & MINE != 0 {
                        mine.push(Arc::clone(&entry.publication));
                    } else {
                        others.push(Arc::clone(&entry.publication));
                    }
                }
            }
        }

        let selected = match &self.config.filter_pubs {
            Some(cb) => cb(mine, others),
            None => default_filter(mine, others),
        };
        if selected.is_empty() {
            return false;
        }

        let mut builder = PayloadBuilder::new(self.config.max_payload);
        for publication in &selected {
            match builder.push(publication) {
                Ok(true) => debug!(name = %publication.name(), "offer"),
                Ok(false) => break,
                Err(e) => warn!("skipping unencodable publication: {e}"),
            }
        }
        if builder.is_empty() {
            return false;
        }
        self.stats.replies_sent += 1;
        debug!(count = builder.count(), "send sync reply");
        self.outbox.push_back(OutEvent::SendReply {
            name: name.clone(),
            payload: builder.finish(),
            freshness: self.config.pub_lifetime / 2,
        });
        true
    }

    /// Re-run pending peer requests after the active set changed, dropping
    /// the expired and the answered.
    fn scan_interests(&mut self, now: Instant) {
        let names: Vec<Name> = self.interests.keys().cloned().collect();
        for name in names {
            let Some(&expires) = self.interests.get(&name) else {
                continue;
            };
            if expires <= now || self.answer_request(&name) {
                self.interests.remove(&name);
            }
        }
    }

    /// Process a validated reply to one of our sync requests.
    fn on_reply(&mut self, name: &Name, nonce: u32, payload: &[u8], now: Instant) {
        if !self.config.validator.validate(name, payload) {
            info!(name = %name, "reply failed validation");
            return;
        }
        let publications = match wire::parse_payload(payload) {
            Ok(publications) => publications,
            Err(e) => {
                warn!("malformed reply payload: {e}");
                return;
            }
        };

        // Hold off answering peers until the whole batch is delivered.
        self.delivering = true;
        let mut added = 0usize;
        for publication in publications {
            let fingerprint = match publication.fingerprint() {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    warn!("{e}");
                    continue;
                }
            };
            if self.is_expired(&publication) || self.active.contains_key(&fingerprint) {
                debug!(name = %publication.name(), "ignore expired or known");
                continue;
            }
            let publication = self.add_to_active(publication, fingerprint, false);
            added += 1;
            self.dispatch(&publication);
        }
        self.delivering = false;

        // Our outstanding request was consumed by this reply; replace it
        // with one carrying the updated summary.
        if nonce == self.current_nonce {
            self.send_request();
        }
        if added > 0 {
            self.scan_interests(now);
        }
    }

    fn is_expired(&self, publication: &Publication) -> bool {
        if let Some(cb) = &self.config.is_expired {
            return cb(publication);
        }
        let Some(timestamp) = publication.timestamp() else {
            return true;
        };
        let now = (self.config.clock)();
        let lifetime = as_ms(self.config.pub_lifetime);
        let skew = as_ms(self.config.max_clock_skew);
        timestamp < now.saturating_sub(lifetime + skew) || timestamp > now + skew
    }

    /// Deliver to the longest subscription prefix matching the name.
    fn dispatch(&mut self, publication: &Publication) {
        let name = publication.name().clone();
        let matched = self
            .subscriptions
            .range_mut(..=name)
            .rev()
            .find(|(prefix, _)| prefix.is_prefix_of(publication.name()));
        if let Some((prefix, cb)) = matched {
            debug!(name = %publication.name(), prefix = %prefix, "deliver");
            cb(publication);
            self.stats.deliveries += 1;
        } else {
            debug!(name = %publication.name(), "no matching subscription");
        }
    }

    /// Enter a publication into the active set and schedule its lifecycle.
    ///
    /// An entry stops being offered after one lifetime, but stays in the
    /// IBLT for the clock-skew interval past that so a peer with a late
    /// clock cannot hand it straight back, and stays in the active set for
    /// a second lifetime so a late reply cannot re-add it.
    fn add_to_active(
        &mut self,
        publication: Publication,
        fingerprint: u32,
        mine: bool,
    ) -> Arc<Publication> {
        debug!(name = %publication.name(), fingerprint, "add to active set");
        let publication = Arc::new(publication);
        self.active.insert(
            fingerprint,
            ActiveEntry {
                publication: Arc::clone(&publication),
                flags: if mine { FRESH | MINE } else { FRESH },
            },
        );
        self.iblt.insert(fingerprint);

        let lifetime = self.config.pub_lifetime;
        self.outbox.push_back(OutEvent::ScheduleTimer(
            lifetime,
            Timer::ClearFresh { fingerprint },
        ));
        self.outbox.push_back(OutEvent::ScheduleTimer(
            lifetime + self.config.max_clock_skew,
            Timer::EraseIblt { fingerprint },
        ));
        self.outbox.push_back(OutEvent::ScheduleTimer(
            lifetime * 2,
            Timer::DropActive { fingerprint },
        ));
        publication
    }
}

/// Default reply policy: answer only when at least one candidate is ours
/// (otherwise two peers relaying third-party publications echo them back
/// and forth), ours before others, newest timestamps first.
fn default_filter(
    mut mine: Vec<Arc<Publication>>,
    mut others: Vec<Arc<Publication>>,
) -> Vec<Arc<Publication>> {
    if mine.is_empty() {
        return Vec::new();
    }
    let newest_first =
        |a: &Arc<Publication>, b: &Arc<Publication>| b.timestamp().cmp(&a.timestamp());
    mine.sort_by(newest_first);
    others.sort_by(newest_first);
    mine.append(&mut others);
    mine
}
