/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Trusted timestamps for the manifest.
//!
//! The signing time comes from an external time authority, never from the
//! local clock. A failed fetch is retried with capped exponential backoff
//! for as long as it takes; the only way out of the loop other than success
//! is a [`CancelToken`].
//!
//! The authority and the sleeper are traits so the retry loop can be driven
//! without network access or real waiting.

use crate::error::SignerError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

pub const DEFAULT_TIME_URL: &str = "https://worldtimeapi.org/api/timezone/Etc/UTC";

/// Manifest timestamp layout: whole seconds, `Z` suffix.
pub const MANIFEST_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Shared flag used to abandon an in-flight signing operation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retry schedule for the time authority.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Cap for the exponential growth
    pub max_delay: Duration,
    /// Bound on a single request, independent of the backoff
    pub attempt_timeout: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(8),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Wait after the `failures`-th consecutive failure (0-indexed).
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let exp = failures.min(i32::MAX as u32) as i32;
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

/// A source of authoritative UTC time.
pub trait TimeAuthority: Send + Sync {
    fn fetch(&self) -> Result<DateTime<Utc>, SignerError>;

    fn describe(&self) -> String;
}

/// Waits between attempts. Implementations return early once cancelled.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration, cancel: &CancelToken);
}

/// Real sleeper: sleeps in short slices so cancellation is noticed quickly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        const SLICE: Duration = Duration::from_millis(100);
        let mut remaining = duration;
        while !remaining.is_zero() && !cancel.is_cancelled() {
            let step = remaining.min(SLICE);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorldTimeResponse {
    datetime: String,
}

/// HTTPS time authority speaking the worldtimeapi JSON format.
pub struct HttpTimeAuthority {
    url: String,
    client: ureq::Agent,
}

impl HttpTimeAuthority {
    pub fn new(url: impl Into<String>, attempt_timeout: Duration) -> Self {
        // Non-2xx statuses come back as responses so they can be reported.
        let client = ureq::Agent::config_builder()
            .timeout_global(Some(attempt_timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            url: url.into(),
            client,
        }
    }
}

impl TimeAuthority for HttpTimeAuthority {
    fn fetch(&self) -> Result<DateTime<Utc>, SignerError> {
        let response = self.client.get(&self.url).call().map_err(|e| {
            SignerError::TimeAuthority(format!("request to {} failed: {}", self.url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignerError::TimeAuthority(format!(
                "{} returned HTTP {}",
                self.url,
                status.as_u16()
            )));
        }

        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| SignerError::TimeAuthority(format!("failed to read body: {}", e)))?;
        let parsed: WorldTimeResponse = serde_json::from_str(&body)
            .map_err(|e| SignerError::TimeAuthority(format!("unexpected body: {}", e)))?;
        parse_authority_time(&parsed.datetime)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Parses an RFC 3339 instant with any offset into UTC.
pub fn parse_authority_time(raw: &str) -> Result<DateTime<Utc>, SignerError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SignerError::TimeAuthority(format!("invalid datetime `{}`: {}", raw, e)))
}

/// Formats an instant the way the manifest stores it.
pub fn format_manifest_time(instant: &DateTime<Utc>) -> String {
    instant.format(MANIFEST_TIME_FORMAT).to_string()
}

/// Trusted time next to the local clock.
#[derive(Debug, Clone)]
pub struct ClockReport {
    pub trusted: DateTime<Utc>,
    pub local: DateTime<Utc>,
}

impl ClockReport {
    /// Local clock minus trusted clock; positive means the local clock runs ahead.
    pub fn skew(&self) -> chrono::Duration {
        self.local - self.trusted
    }

    pub fn trusted_rfc3339(&self) -> String {
        self.trusted.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn local_rfc3339(&self) -> String {
        self.local.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Retrying front-end over a [`TimeAuthority`].
pub struct TrustedClock {
    authority: Box<dyn TimeAuthority>,
    sleeper: Box<dyn Sleeper>,
    policy: RetryPolicy,
}

impl TrustedClock {
    pub fn new(authority: Box<dyn TimeAuthority>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(authority, Box::new(ThreadSleeper), policy)
    }

    pub fn with_sleeper(
        authority: Box<dyn TimeAuthority>,
        sleeper: Box<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            authority,
            sleeper,
            policy,
        }
    }

    /// Clock backed by the HTTPS authority at `url`.
    pub fn http(url: &str) -> Self {
        let policy = RetryPolicy::default();
        let authority = HttpTimeAuthority::new(url, policy.attempt_timeout);
        Self::new(Box::new(authority), policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches the trusted instant, retrying until success or cancellation.
    pub fn fetch(&self, cancel: &CancelToken) -> Result<DateTime<Utc>, SignerError> {
        let mut failures: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                log::info!("Timestamp fetch cancelled after {} failed attempts", failures);
                return Err(SignerError::Cancelled);
            }

            match self.authority.fetch() {
                Ok(instant) => {
                    log::debug!(
                        "Trusted time {} from {} (attempt {})",
                        instant,
                        self.authority.describe(),
                        failures + 1
                    );
                    return Ok(instant);
                }
                Err(e) => {
                    let delay = self.policy.delay_for_attempt(failures);
                    failures = failures.saturating_add(1);
                    if let Some(max) = self.policy.max_attempts {
                        if failures >= max {
                            return Err(e);
                        }
                    }
                    log::warn!(
                        "Time authority attempt {} failed: {}. Retrying in {:.1}s",
                        failures,
                        e,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay, cancel);
                }
            }
        }
    }

    /// Trusted instant formatted for the manifest `timestamp` field.
    pub fn fetch_timestamp(&self, cancel: &CancelToken) -> Result<String, SignerError> {
        self.fetch(cancel).map(|t| format_manifest_time(&t))
    }

    pub fn report(&self, cancel: &CancelToken) -> Result<ClockReport, SignerError> {
        let trusted = self.fetch(cancel)?;
        Ok(ClockReport {
            trusted,
            local: Utc::now(),
        })
    }
}
