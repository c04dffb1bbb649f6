use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::client::GasSource;
use crate::config::{Strategy, TX_WINDOWS};
use crate::error::FetchError;

/// Body of the node's gas estimation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasEstimate {
    pub gas_estimate: u64,
    pub prioritized_gas_estimate: Option<u64>,
    pub deprioritized_gas_estimate: Option<u64>,
}

/// One entry of the recent transaction list. Non-user transactions carry
/// neither field, and the price usually arrives as a decimal string.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionRecord {
    #[serde(default)]
    pub gas_unit_price: Option<Value>,
    #[serde(default)]
    pub gas_used: Option<Value>,
}

impl TransactionRecord {
    /// The price this record contributes to aggregation, if it is well formed.
    pub fn unit_price(&self) -> Option<u64> {
        self.gas_used.as_ref()?;
        match self.gas_unit_price.as_ref()? {
            Value::String(raw) => raw.trim().parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    Direct,
    Transactions { window: usize, valid: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GasPriceSample {
    pub fast: u64,
    pub standard: u64,
    pub slow: u64,
    pub time: DateTime<Utc>,
    pub source: SampleSource,
}

impl GasPriceSample {
    /// Missing tiers default to zero.
    pub fn from_estimate(estimate: &GasEstimate, time: DateTime<Utc>) -> Self {
        Self {
            fast: estimate.prioritized_gas_estimate.unwrap_or(0),
            standard: estimate.gas_estimate,
            slow: estimate.deprioritized_gas_estimate.unwrap_or(0),
            time,
            source: SampleSource::Direct,
        }
    }

    /// Max, rounded mean and min over the well-formed records. Returns `None`
    /// when no record qualifies, which callers treat as "no new data".
    pub fn from_transactions(
        records: &[TransactionRecord],
        window: usize,
        time: DateTime<Utc>,
    ) -> Option<Self> {
        let mut sum: u128 = 0;
        let mut count: usize = 0;
        let mut max = 0;
        let mut min = u64::MAX;

        for record in records {
            let Some(price) = record.unit_price() else {
                trace!(?record, "skipping transaction without usable gas price");
                continue;
            };
            sum += u128::from(price);
            count += 1;
            max = max.max(price);
            min = min.min(price);
        }

        if count == 0 {
            return None;
        }

        // round half up
        let n = count as u128;
        let standard = ((2 * sum + n) / (2 * n)) as u64;

        Some(Self {
            fast: max,
            standard,
            slow: min,
            time,
            source: SampleSource::Transactions {
                window,
                valid: count,
            },
        })
    }
}

/// Identity of a remote query. Results are only applied for the key that is
/// current when they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Direct,
    Transactions { limit: usize },
}

/// What the user has picked; the direct strategy ignores the window but the
/// choice is remembered for when sampling is switched back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySelection {
    pub strategy: Strategy,
    pub window: usize,
}

impl QuerySelection {
    pub fn new(strategy: Strategy, window: usize) -> Self {
        Self { strategy, window }
    }

    pub fn key(&self) -> QueryKey {
        match self.strategy {
            Strategy::Direct => QueryKey::Direct,
            Strategy::Transactions => QueryKey::Transactions { limit: self.window },
        }
    }

    pub fn toggle_strategy(self) -> Self {
        Self {
            strategy: self.strategy.toggled(),
            ..self
        }
    }

    pub fn next_window(self) -> Self {
        let idx = TX_WINDOWS
            .iter()
            .position(|w| *w == self.window)
            .map(|i| (i + 1) % TX_WINDOWS.len())
            .unwrap_or(0);
        Self {
            window: TX_WINDOWS[idx],
            ..self
        }
    }

    /// `idx` outside the window table leaves the selection unchanged.
    pub fn with_window_index(self, idx: usize) -> Self {
        match TX_WINDOWS.get(idx) {
            Some(window) => Self {
                window: *window,
                ..self
            },
            None => self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: u64,
    pub key: QueryKey,
}

/// Timer and single-slot result cache behind the polling loop.
///
/// The poller never performs I/O. The UI loop asks [`Poller::poll_due`] for a
/// ticket, runs the fetch, and hands the outcome back to
/// [`Poller::complete`], which applies it only when the ticket is still the
/// one in flight for the current query and polling is not paused.
#[derive(Debug)]
pub struct Poller {
    selection: QuerySelection,
    interval: Duration,
    paused: bool,
    next_id: u64,
    in_flight: Option<FetchTicket>,
    last_started: Option<Instant>,
    cache: Option<(QueryKey, GasPriceSample)>,
    consecutive_failures: u32,
}

impl Poller {
    pub fn new(selection: QuerySelection, interval: Duration) -> Self {
        Self {
            selection,
            interval,
            paused: false,
            next_id: 0,
            in_flight: None,
            last_started: None,
            cache: None,
            consecutive_failures: 0,
        }
    }

    pub fn selection(&self) -> QuerySelection {
        self.selection
    }

    pub fn key(&self) -> QueryKey {
        self.selection.key()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Latest sample for the current query key.
    pub fn cached(&self) -> Option<&GasPriceSample> {
        self.cache
            .as_ref()
            .filter(|(key, _)| *key == self.key())
            .map(|(_, sample)| sample)
    }

    /// Starts a fetch if the interval has elapsed and nothing is in flight.
    pub fn poll_due(&mut self, now: Instant) -> Option<FetchTicket> {
        if self.paused || self.in_flight.is_some() {
            return None;
        }
        if let Some(started) = self.last_started {
            if now.saturating_duration_since(started) < self.interval {
                return None;
            }
        }

        let ticket = FetchTicket {
            id: self.next_id,
            key: self.key(),
        };
        self.next_id += 1;
        self.in_flight = Some(ticket);
        self.last_started = Some(now);
        debug!(id = ticket.id, key = ?ticket.key, "starting fetch");
        Some(ticket)
    }

    /// Pausing abandons the fetch in flight; its result will be discarded.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if paused {
            self.in_flight = None;
        }
        debug!(paused, "polling toggled");
    }

    /// Switching to a different query abandons the fetch in flight and makes
    /// the next tick fetch immediately.
    pub fn set_selection(&mut self, selection: QuerySelection) {
        let changed_key = selection.key() != self.key();
        self.selection = selection;
        if changed_key {
            self.in_flight = None;
            self.last_started = None;
            debug!(key = ?self.key(), "query changed");
        }
    }

    /// Returns the sample to display when the outcome was accepted and
    /// produced new data.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        outcome: Result<Option<GasPriceSample>, FetchError>,
    ) -> Option<GasPriceSample> {
        if self.paused || self.in_flight != Some(ticket) || ticket.key != self.key() {
            debug!(id = ticket.id, key = ?ticket.key, "discarding stale fetch result");
            return None;
        }
        self.in_flight = None;

        match outcome {
            Ok(Some(sample)) => {
                self.consecutive_failures = 0;
                self.cache = Some((ticket.key, sample.clone()));
                Some(sample)
            }
            Ok(None) => {
                self.consecutive_failures = 0;
                debug!(key = ?ticket.key, "no usable prices in this cycle");
                None
            }
            Err(err) => {
                self.consecutive_failures += 1;
                warn!(
                    key = ?ticket.key,
                    failures = self.consecutive_failures,
                    "gas price fetch failed: {err}"
                );
                None
            }
        }
    }
}

/// Runs the remote call for `key` and derives a sample from it.
pub async fn fetch_sample(
    source: &dyn GasSource,
    key: QueryKey,
) -> Result<Option<GasPriceSample>, FetchError> {
    match key {
        QueryKey::Direct => {
            let estimate = source.estimate_gas_price().await?;
            Ok(Some(GasPriceSample::from_estimate(&estimate, Utc::now())))
        }
        QueryKey::Transactions { limit } => {
            let records = source.recent_transactions(limit).await?;
            Ok(GasPriceSample::from_transactions(&records, limit, Utc::now()))
        }
    }
}
