//! Daily upstream-call budget.
//!
//! The counter resets when the calendar day changes in a fixed reference
//! timezone (the upstream's own quota day, America/Los_Angeles by default),
//! independent of the server's local zone. State is written through to a
//! small JSON file on every mutation; write failures are logged and the
//! in-memory state stays authoritative.

use crate::error::StoreError;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_RESET_TZ: Tz = chrono_tz::America::Los_Angeles;

/// Persisted counter state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaState {
    pub count: u32,
    pub last_reset: DateTime<Utc>,
    #[serde(default)]
    pub limit_exceeded: bool,
}

impl QuotaState {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            last_reset: now,
            limit_exceeded: false,
        }
    }
}

/// Durable storage for the quota state.
pub trait QuotaStore: Send + Sync {
    fn load(&self) -> Option<QuotaState>;
    fn save(&self, state: &QuotaState) -> Result<(), StoreError>;
}

/// Quota state as pretty JSON on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl QuotaStore for JsonFileStore {
    fn load(&self) -> Option<QuotaState> {
        let data = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&data)
            .map_err(|e| warn!("Ignoring unreadable quota file {}: {}", self.path.display(), e))
            .ok()
    }

    fn save(&self, state: &QuotaState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// The daily limit has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Daily quota exhausted: {current}/{limit} used")]
pub struct QuotaExceeded {
    pub current: u32,
    pub limit: u32,
}

pub struct QuotaTracker {
    state: RwLock<QuotaState>,
    limit: u32,
    reset_tz: Tz,
    store: Box<dyn QuotaStore>,
}

impl QuotaTracker {
    /// Load state from the store (or start fresh) and apply any pending reset.
    pub fn new(limit: u32, reset_tz: Tz, store: Box<dyn QuotaStore>) -> Self {
        Self::new_at(limit, reset_tz, store, Utc::now())
    }

    pub fn new_at(limit: u32, reset_tz: Tz, store: Box<dyn QuotaStore>, now: DateTime<Utc>) -> Self {
        let mut state = store.load().unwrap_or_else(|| QuotaState::fresh(now));
        if state.count >= limit {
            state.limit_exceeded = true;
        }
        let tracker = Self {
            state: RwLock::new(state),
            limit,
            reset_tz,
            store,
        };
        {
            let mut state = tracker.state.write().unwrap_or_else(PoisonError::into_inner);
            tracker.reset_if_new_day(&mut state, now);
        }
        tracker
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Account one upstream call. Returns the new count and the limit.
    pub fn check_and_increment(&self) -> Result<(u32, u32), QuotaExceeded> {
        self.check_and_increment_at(Utc::now())
    }

    pub fn check_and_increment_at(&self, now: DateTime<Utc>) -> Result<(u32, u32), QuotaExceeded> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.reset_if_new_day(&mut state, now);

        if state.limit_exceeded || state.count >= self.limit {
            state.limit_exceeded = true;
            return Err(QuotaExceeded {
                current: state.count,
                limit: self.limit,
            });
        }

        state.count += 1;
        if state.count >= self.limit {
            state.limit_exceeded = true;
        }
        self.persist(&state);
        Ok((state.count, self.limit))
    }

    /// Current usage. Applies a pending reset but never increments.
    pub fn usage(&self) -> (u32, u32) {
        self.usage_at(Utc::now())
    }

    pub fn usage_at(&self, now: DateTime<Utc>) -> (u32, u32) {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if self.same_day(state.last_reset, now) {
                return (state.count, self.limit);
            }
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.reset_if_new_day(&mut state, now);
        (state.count, self.limit)
    }

    /// Usage as "current/limit".
    pub fn usage_string(&self) -> String {
        let (current, limit) = self.usage();
        format!("{}/{}", current, limit)
    }

    /// Whether further calls will be refused today.
    pub fn is_exceeded(&self) -> bool {
        self.is_exceeded_at(Utc::now())
    }

    pub fn is_exceeded_at(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.reset_if_new_day(&mut state, now);
        state.limit_exceeded
    }

    /// Trip the exceeded flag, e.g. when the upstream itself reports exhaustion.
    pub fn mark_exceeded(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.limit_exceeded = true;
        self.persist(&state);
    }

    /// Zero the counter immediately.
    pub fn reset(&self) {
        self.reset_at(Utc::now());
    }

    pub fn reset_at(&self, now: DateTime<Utc>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = QuotaState::fresh(now);
        self.persist(&state);
    }

    /// Time left until the next midnight in the reference timezone.
    pub fn time_until_reset(&self) -> std::time::Duration {
        self.time_until_reset_at(Utc::now())
    }

    pub fn time_until_reset_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        next_midnight(self.reset_tz, now)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or_default()
    }

    /// "now" in the reference timezone, for display.
    pub fn reference_time(&self) -> String {
        let now = Utc::now().with_timezone(&self.reset_tz);
        format!("{}: {}", self.reset_tz.name(), now.format("%Y-%m-%d %H:%M:%S"))
    }

    fn local_day(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.reset_tz).date_naive()
    }

    fn same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.local_day(a) == self.local_day(b)
    }

    fn reset_if_new_day(&self, state: &mut QuotaState, now: DateTime<Utc>) {
        if self.same_day(state.last_reset, now) {
            return;
        }
        info!(
            "Resetting quota counter: new day in {} ({})",
            self.reset_tz.name(),
            now.with_timezone(&self.reset_tz).format("%Y-%m-%d %H:%M:%S")
        );
        *state = QuotaState::fresh(now);
        self.persist(state);
    }

    fn persist(&self, state: &QuotaState) {
        if let Err(e) = self.store.save(state) {
            warn!("Failed to persist quota state, keeping it in memory: {}", e);
        }
    }
}

/// The first instant of the next calendar day in `tz`.
///
/// Where a DST jump skips local midnight, the day starts at the first local
/// time that exists, searched in 15-minute steps.
fn next_midnight(tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.with_timezone(&tz).date_naive() + Duration::days(1);
    let midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default();
    (0..24 * 4)
        .find_map(|step| {
            tz.from_local_datetime(&(midnight + Duration::minutes(15 * step)))
                .earliest()
        })
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| now + Duration::days(1))
}

/// Render a reset ETA as e.g. "7h5m12s", omitting zero components.
pub fn format_reset_eta(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);

    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{}s", s));
    }
    out
}
