//! Per-user daily request quotas.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tadabbur_core::config::QuotaConfig;
use tadabbur_core::{AppError, AppResult};

/// Plan assigned to users with no explicit assignment.
pub const DEFAULT_PLAN: &str = "free";

/// Message shown when a user has used up their day.
pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "Limite quotidienne atteinte. Passez à un forfait supérieur ou revenez demain.";

/// Admission control for questions.
#[async_trait]
pub trait QuotaGate: Send + Sync {
    /// Whether `user` may ask another question today.
    async fn can_proceed(&self, user: &str) -> AppResult<bool>;

    /// Count one answered question; returns the user's total for today.
    async fn commit(&self, user: &str) -> AppResult<u32>;

    /// When the quota next resets (RFC 3339).
    fn reset_time(&self) -> String;
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Usage {
    day: NaiveDate,
    count: u32,
}

/// In-memory quota keyed by user, with plan-based limits.
///
/// Counts reset when the UTC date changes. A limit of `-1` is unlimited.
pub struct DailyQuota {
    config: QuotaConfig,
    usage: Mutex<HashMap<String, Usage>>,
    clock: Clock,
}

impl DailyQuota {
    pub fn new(config: QuotaConfig) -> Self {
        Self::with_clock(config, Arc::new(Utc::now))
    }

    pub fn with_clock(config: QuotaConfig, clock: Clock) -> Self {
        Self {
            config,
            usage: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Daily limit for a user, from their plan.
    pub fn limit_for(&self, user: &str) -> i64 {
        let plan = self
            .config
            .users
            .get(user)
            .map(String::as_str)
            .unwrap_or(DEFAULT_PLAN);

        self.config
            .plans
            .get(plan)
            .copied()
            .unwrap_or(self.config.daily_limit)
    }

    /// Questions `user` has asked today.
    pub fn used_today(&self, user: &str) -> AppResult<u32> {
        let today = (self.clock)().date_naive();
        let usage = self.lock()?;
        Ok(usage
            .get(user)
            .filter(|u| u.day == today)
            .map(|u| u.count)
            .unwrap_or(0))
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, Usage>>> {
        self.usage
            .lock()
            .map_err(|_| AppError::Storage("Quota state is poisoned".to_string()))
    }
}

impl std::fmt::Debug for DailyQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyQuota")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QuotaGate for DailyQuota {
    async fn can_proceed(&self, user: &str) -> AppResult<bool> {
        let limit = self.limit_for(user);
        if limit < 0 {
            return Ok(true);
        }

        Ok(i64::from(self.used_today(user)?) < limit)
    }

    async fn commit(&self, user: &str) -> AppResult<u32> {
        let today = (self.clock)().date_naive();
        let mut usage = self.lock()?;

        let entry = usage.entry(user.to_string()).or_insert(Usage {
            day: today,
            count: 0,
        });
        if entry.day != today {
            *entry = Usage {
                day: today,
                count: 0,
            };
        }
        entry.count += 1;

        tracing::debug!(user, requests_today = entry.count, "Quota committed");
        Ok(entry.count)
    }

    fn reset_time(&self) -> String {
        next_utc_midnight((self.clock)()).to_rfc3339()
    }
}

/// Gate that admits everything and counts nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedQuota;

#[async_trait]
impl QuotaGate for UnlimitedQuota {
    async fn can_proceed(&self, _user: &str) -> AppResult<bool> {
        Ok(true)
    }

    async fn commit(&self, _user: &str) -> AppResult<u32> {
        Ok(0)
    }

    fn reset_time(&self) -> String {
        next_utc_midnight(Utc::now()).to_rfc3339()
    }
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow.and_time(chrono::NaiveTime::MIN).and_utc()
}
