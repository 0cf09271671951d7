//! Core rate limiter implementation.

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use super::counter::{ClientCounter, CounterTable};
use super::decision::{Decision, ReasonCode};
use crate::config::{LimiterConfig, StoreFailurePolicy};
use crate::error::{LimiterError, Result};
use crate::store::Store;

/// The counter table as read from the store.
struct LoadedTable {
    /// Bytes that were in the store, `None` if absent or discarded
    raw: Option<Vec<u8>>,
    table: CounterTable,
}

/// What one evaluation does to a client's entry.
enum Step {
    /// Leave the table untouched and skip the write-back
    Frozen(Decision),
    /// Store the updated counter and return the decision
    Update(ClientCounter, Decision),
}

/// Per-client submission rate limiter.
///
/// Every evaluation is a read-modify-write of the single counter table held
/// in the store. Without `optimistic_retries` two concurrent evaluations can
/// both read the same table and one update is lost; the limiter then
/// undercounts rather than blocking early.
pub struct RateLimiter<S: Store> {
    config: LimiterConfig,
    store: S,
}

impl<S: Store> RateLimiter<S> {
    /// Create a new rate limiter over `store`.
    pub fn new(config: LimiterConfig, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decide whether a submission from `client` at `now` is admitted.
    ///
    /// An absent client identifier is admitted without touching the store.
    /// Store failures are handled according to `on_store_error`.
    pub async fn evaluate(&self, client: Option<&str>, now: DateTime<Utc>) -> Result<Decision> {
        let Some(client) = client else {
            trace!("No client identifier, admitting submission");
            return Ok(Decision::admit());
        };

        match self.evaluate_client(client, now.timestamp()).await {
            Ok(decision) => Ok(decision),
            Err(e) => self.on_store_failure(client, e),
        }
    }

    /// Evaluate a submission at the current wall-clock time.
    pub async fn evaluate_now(&self, client: Option<&str>) -> Result<Decision> {
        self.evaluate(client, Utc::now()).await
    }

    /// Read the current counter table.
    pub async fn snapshot(&self) -> Result<CounterTable> {
        Ok(self.load_table().await?.table)
    }

    /// Drop a client's counters, lifting any block on it.
    ///
    /// Returns `true` if the client had an entry.
    pub async fn forget(&self, client: &str) -> Result<bool> {
        let mut loaded = self.load_table().await?;
        if loaded.table.remove(client).is_none() {
            return Ok(false);
        }

        let bytes = loaded.table.to_bytes()?;
        self.store
            .set(&self.config.store_key, bytes, self.config.store_ttl())
            .await?;

        debug!(client = %client, "Removed client counters");
        Ok(true)
    }

    async fn evaluate_client(&self, client: &str, now: i64) -> Result<Decision> {
        let conditional = self.config.optimistic_retries > 0;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let LoadedTable { raw, mut table } = self.load_table().await?;

            trace!(
                client = %client,
                now = now,
                clients = table.len(),
                attempt = attempt,
                "Evaluating submission"
            );

            let decision = match self.decide(client, table.get(client).copied(), now) {
                Step::Frozen(decision) => return Ok(decision),
                Step::Update(counter, decision) => {
                    table.insert(client, counter);
                    decision
                }
            };

            let bytes = table.to_bytes()?;
            let key = &self.config.store_key;
            let ttl = self.config.store_ttl();

            if !conditional {
                self.store.set(key, bytes, ttl).await?;
                return Ok(decision);
            }

            if self
                .store
                .set_if_unchanged(key, raw.as_deref(), bytes, ttl)
                .await?
            {
                return Ok(decision);
            }

            if attempt > self.config.optimistic_retries {
                warn!(
                    client = %client,
                    attempts = attempt,
                    "Counter table kept changing, dropping this update"
                );
                return Ok(decision);
            }

            debug!(
                client = %client,
                attempt = attempt,
                "Counter table changed during evaluation, retrying"
            );
        }
    }

    /// Apply the windowing rules to one client's entry.
    fn decide(&self, client: &str, entry: Option<ClientCounter>, now: i64) -> Step {
        let window = i64::try_from(self.config.window_secs).unwrap_or(i64::MAX);

        match entry {
            Some(counter) if counter.total >= self.config.max_total => {
                debug!(
                    client = %client,
                    total = counter.total,
                    max_total = self.config.max_total,
                    "Lifetime submission cap reached"
                );
                Step::Frozen(Decision::reject(
                    ReasonCode::SubmissionLimitExceeded,
                    self.config.max_total_message.clone(),
                ))
            }
            None => Step::Update(ClientCounter::first(now), Decision::admit()),
            Some(mut counter) if counter.elapsed(now) < window => {
                counter.count = counter.count.saturating_add(1);
                if counter.count > self.config.burst_limit {
                    debug!(
                        client = %client,
                        count = counter.count,
                        burst_limit = self.config.burst_limit,
                        "Submission burst limit exceeded"
                    );
                    Step::Update(
                        counter,
                        Decision::reject(ReasonCode::TooFast, self.config.limit_message.clone()),
                    )
                } else {
                    Step::Update(counter, Decision::admit())
                }
            }
            Some(counter) => {
                let next = counter.next_window(now);
                debug!(
                    client = %client,
                    total = next.total,
                    "Opening new submission window"
                );
                Step::Update(next, Decision::admit())
            }
        }
    }

    /// Load the table, discarding oversized blobs from the store.
    async fn load_table(&self) -> Result<LoadedTable> {
        let key = &self.config.store_key;

        match self.store.get(key).await? {
            None => Ok(LoadedTable {
                raw: None,
                table: CounterTable::new(),
            }),
            Some(raw) if raw.len() > self.config.max_stored_bytes => {
                warn!(
                    bytes = raw.len(),
                    max_bytes = self.config.max_stored_bytes,
                    "Counter table too large, resetting"
                );
                self.store.delete(key).await?;
                Ok(LoadedTable {
                    raw: None,
                    table: CounterTable::new(),
                })
            }
            Some(raw) => {
                let table = CounterTable::parse_or_default(&raw);
                Ok(LoadedTable {
                    raw: Some(raw),
                    table,
                })
            }
        }
    }

    fn on_store_failure(&self, client: &str, err: LimiterError) -> Result<Decision> {
        match self.config.on_store_error {
            StoreFailurePolicy::Propagate => Err(err),
            StoreFailurePolicy::FailOpen => {
                warn!(client = %client, error = %err, "Store unavailable, admitting submission");
                Ok(Decision::admit())
            }
            StoreFailurePolicy::FailClosed => {
                warn!(client = %client, error = %err, "Store unavailable, rejecting submission");
                Ok(Decision::reject(
                    ReasonCode::TooFast,
                    self.config.limit_message.clone(),
                ))
            }
        }
    }
}
