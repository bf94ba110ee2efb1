//! # Orchestrator
//!
//! The agent's single scheduling loop.
//!
//! Every cycle runs `ACQUIRE -> ROUTE -> (DIRECT_SEND | BUFFER) -> DRAIN_CHECK`:
//!
//! 1. **ACQUIRE**: poll the meter. A [`SensorError`] skips straight to the
//!    drain check; no reading is fabricated.
//! 2. **ROUTE**: probe connectivity. A reading goes out directly only when the
//!    endpoint is online *and* the ledger is empty, so it can never overtake
//!    older pending readings.
//! 3. **DIRECT_SEND**: on a transient failure the same reading is appended to
//!    the ledger once and the rest of the cycle is treated as offline. A
//!    rejected reading is logged and dropped.
//! 4. **BUFFER**: durable append to the [`LocalLedger`].
//! 5. **DRAIN_CHECK**: when online, send the oldest pending chunk, commit on
//!    acknowledgement, repeat until empty or a send fails.
//!
//! Only ledger failures escape a cycle; they stop the agent.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{DeliveryError, LedgerError, SensorError};
use crate::ledger::LocalLedger;
use crate::meter::MeterClient;
use crate::probe::{ConnectivityProbe, ConnectivityState};
use crate::reading::Reading;
use crate::uploader::Uploader;

/// Number of cycles between statistics log messages
const STATS_LOG_INTERVAL_CYCLES: u64 = 60;

/// Loop tunables, usually derived from [`Config`]
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Meter identifier reported in heartbeats
    pub meter_id: u8,
    /// Maximum readings per `send_batch` call
    pub drain_chunk_size: usize,
    /// Time between cycle starts
    pub poll_interval: Duration,
    /// Time between heartbeats, `None` disables them
    pub heartbeat_interval: Option<Duration>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let heartbeat_interval = match config.agent.heartbeat_interval_s {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            meter_id: config.meter.device_id,
            drain_chunk_size: config.ledger.drain_chunk_size.max(1),
            poll_interval: Duration::from_secs(config.agent.poll_interval_s),
            heartbeat_interval,
        }
    }
}

/// Running totals since the agent started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    /// Successful meter polls
    pub polled: u64,
    /// Failed meter polls
    pub sensor_errors: u64,
    /// Readings acknowledged on the direct path
    pub sent_direct: u64,
    /// Readings appended to the ledger
    pub buffered: u64,
    /// Ledger entries acknowledged by a batch send
    pub drained: u64,
    /// Readings lost to rejection or retention
    pub dropped: u64,
}

/// What happened to the reading acquired in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingOutcome {
    /// Acknowledged by the endpoint on the direct path
    Sent,
    /// Appended to the ledger
    Buffered,
    /// Refused by the endpoint and dropped
    Rejected,
}

/// Result of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Connectivity as seen by the drain check
    pub connectivity: ConnectivityState,
    /// Fate of this cycle's reading, `None` when the poll failed
    pub reading: Option<ReadingOutcome>,
    pub sensor_error: Option<SensorError>,
    /// Ledger entries delivered during the drain check
    pub drained: usize,
    /// Readings dropped during this cycle
    pub dropped: usize,
    /// A batch send failed and draining stopped early
    pub drain_interrupted: bool,
    /// The cycle ran out of time and the rest of the backlog waits for the next one
    pub drain_deferred: bool,
    /// Ledger size at the end of the cycle
    pub pending: usize,
}

#[derive(Debug, Default)]
struct DrainOutcome {
    drained: usize,
    dropped: usize,
    interrupted: bool,
    deferred: bool,
}

/// Drives meter, probe, uploader and ledger through the cycle state machine
pub struct Orchestrator<M, P, U> {
    meter: M,
    probe: P,
    uploader: U,
    ledger: LocalLedger,
    settings: OrchestratorSettings,
    stats: AgentStats,
    last_heartbeat: Option<Instant>,
}

impl<M, P, U> Orchestrator<M, P, U>
where
    M: MeterClient,
    P: ConnectivityProbe,
    U: Uploader,
{
    pub fn new(meter: M, probe: P, uploader: U, ledger: LocalLedger, settings: OrchestratorSettings) -> Self {
        Self {
            meter,
            probe,
            uploader,
            ledger,
            settings,
            stats: AgentStats::default(),
            last_heartbeat: None,
        }
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    pub fn ledger(&self) -> &LocalLedger {
        &self.ledger
    }

    /// Run cycles on the poll interval until `shutdown` resolves
    ///
    /// A cycle in progress is always finished before the loop observes the
    /// shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns the first [`LedgerError`]; the agent cannot keep its delivery
    /// guarantee without the ledger.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<AgentStats, LedgerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting poll loop every {:?} ({} readings pending)",
            self.settings.poll_interval,
            self.ledger.size()
        );

        let mut cycles: u64 = 0;
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping poll loop");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("Ledger failure, stopping agent: {}", e);
                        self.log_stats();
                        return Err(e);
                    }

                    cycles += 1;
                    if cycles % STATS_LOG_INTERVAL_CYCLES == 0 {
                        self.log_stats();
                    }
                }
            }
        }

        self.log_stats();
        Ok(self.stats)
    }

    /// Execute one full cycle
    ///
    /// Draining stops once the cycle has used up its poll interval, so a slow
    /// endpoint never delays the next poll by more than one batch.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, LedgerError> {
        let deadline = Instant::now() + self.settings.poll_interval;

        // ACQUIRE
        let acquired = match self.meter.poll().await {
            Ok(reading) => {
                self.stats.polled += 1;
                Ok(reading)
            }
            Err(e) => {
                self.stats.sensor_errors += 1;
                warn!("Meter poll failed, skipping reading: {}", e);
                Err(e)
            }
        };

        // ROUTE
        let mut connectivity = self.probe.check().await;
        debug!("Endpoint is {}", connectivity);

        let mut report = CycleReport {
            connectivity,
            reading: None,
            sensor_error: None,
            drained: 0,
            dropped: 0,
            drain_interrupted: false,
            drain_deferred: false,
            pending: 0,
        };

        match acquired {
            Ok(reading) => {
                let direct = connectivity.is_online() && self.ledger.is_empty();
                let outcome = if direct {
                    match self.uploader.send(&reading).await {
                        Ok(_) => {
                            self.stats.sent_direct += 1;
                            debug!("Sent reading {} directly", reading.id());
                            ReadingOutcome::Sent
                        }
                        Err(e) if e.is_transient() => {
                            warn!("Direct send of {} failed, buffering: {}", reading.id(), e);
                            connectivity = ConnectivityState::Offline;
                            report.dropped += self.buffer(&reading)?;
                            ReadingOutcome::Buffered
                        }
                        Err(e) => {
                            report.dropped += 1;
                            self.record_dropped(&reading, &e);
                            ReadingOutcome::Rejected
                        }
                    }
                } else {
                    report.dropped += self.buffer(&reading)?;
                    ReadingOutcome::Buffered
                };
                report.reading = Some(outcome);
            }
            Err(e) => report.sensor_error = Some(e),
        }

        // DRAIN_CHECK
        if connectivity.is_online() && !self.ledger.is_empty() {
            let drain = self.drain(deadline).await?;
            report.drained = drain.drained;
            report.dropped += drain.dropped;
            report.drain_interrupted = drain.interrupted;
            report.drain_deferred = drain.deferred;
        }

        if connectivity.is_online() {
            self.maybe_heartbeat().await;
        }

        report.connectivity = connectivity;
        report.pending = self.ledger.size();
        Ok(report)
    }

    /// Append to the ledger, returning how many old entries retention dropped
    fn buffer(&mut self, reading: &Reading) -> Result<usize, LedgerError> {
        let dropped = self.ledger.append(reading)?;
        self.stats.buffered += 1;
        self.stats.dropped += dropped as u64;
        debug!("Buffered reading {} ({} pending)", reading.id(), self.ledger.size());
        Ok(dropped)
    }

    /// Flush the ledger oldest-first
    ///
    /// Stops at the first transient failure, or after the chunk that crosses
    /// `deadline`. Undelivered entries stay at the front of the ledger.
    async fn drain(&mut self, deadline: Instant) -> Result<DrainOutcome, LedgerError> {
        let mut outcome = DrainOutcome::default();
        let backlog = self.ledger.size();

        loop {
            let batch = self.ledger.peek_oldest(self.settings.drain_chunk_size)?;
            if batch.is_empty() {
                break;
            }

            match self.uploader.send_batch(&batch).await {
                Ok(_) => {
                    self.ledger.commit(batch.len())?;
                    outcome.drained += batch.len();
                    self.stats.drained += batch.len() as u64;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Drain stopped with {} readings pending: {}",
                        self.ledger.size(),
                        e
                    );
                    outcome.interrupted = true;
                    break;
                }
                Err(e) => {
                    for reading in &batch {
                        self.record_dropped(reading, &e);
                    }
                    self.ledger.discard(batch.len())?;
                    outcome.dropped += batch.len();
                }
            }

            if Instant::now() >= deadline && !self.ledger.is_empty() {
                info!(
                    "Cycle time used up, deferring {} buffered readings to the next cycle",
                    self.ledger.size()
                );
                outcome.deferred = true;
                break;
            }
        }

        if outcome.drained > 0 {
            info!(
                "Drained {} of {} buffered readings ({} pending)",
                outcome.drained,
                backlog,
                self.ledger.size()
            );
        }

        Ok(outcome)
    }

    async fn maybe_heartbeat(&mut self) {
        let Some(period) = self.settings.heartbeat_interval else {
            return;
        };
        let due = self
            .last_heartbeat
            .map_or(true, |last| last.elapsed() >= period);
        if !due {
            return;
        }

        match self.uploader.heartbeat(self.settings.meter_id).await {
            Ok(_) => {
                debug!("Heartbeat sent for meter {}", self.settings.meter_id);
                self.last_heartbeat = Some(Instant::now());
            }
            Err(e) => warn!("Heartbeat failed: {}", e),
        }
    }

    /// Count and log a reading the endpoint refused
    fn record_dropped(&mut self, reading: &Reading, reason: &DeliveryError) {
        self.stats.dropped += 1;
        error!(
            reading_id = %reading.id(),
            timestamp = %reading.timestamp(),
            reason = %reason,
            "Endpoint rejected reading, dropped"
        );
    }

    fn log_stats(&self) {
        let s = &self.stats;
        info!(
            "Stats: polled={} sensor_errors={} sent_direct={} buffered={} drained={} dropped={} pending={}",
            s.polled,
            s.sensor_errors,
            s.sent_direct,
            s.buffered,
            s.drained,
            s.dropped,
            self.ledger.size()
        );
    }
}
