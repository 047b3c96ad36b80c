//! Administrative ban-state transitions
//!
//! Every transition is a single update keyed by account id. The account is not
//! looked up first; the returned flag reports whether a row was updated.

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::store::DataStore;
use super::types::{AccountId, AccountState};
use crate::error::StoreError;

#[derive(Error, Debug)]
pub enum BanError {
    #[error("Unrecognized ban expiry '{0}'")]
    InvalidTimestamp(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct BanManager {
    store: Arc<dyn DataStore>,
}

impl BanManager {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Ban until a time given as free text (see [`parse_until`]).
    ///
    /// The state code is written as normal, with only the expiry recording
    /// the ban. This matches how existing login tables encode temporary bans.
    pub fn temporarily_ban(&self, account_id: AccountId, until: &str) -> Result<bool, BanError> {
        let until = parse_until(until, Utc::now())?;
        Ok(self.temporarily_ban_until(account_id, until)?)
    }

    pub fn temporarily_ban_until(&self, account_id: AccountId, until: DateTime<Utc>) -> Result<bool, StoreError> {
        let updated = self.apply(account_id, AccountState::NORMAL, Some(until))?;
        if updated {
            info!(account_id, unban_time = %until, "account temporarily banned");
        }
        Ok(updated)
    }

    pub fn permanently_ban(&self, account_id: AccountId) -> Result<bool, StoreError> {
        let updated = self.apply(account_id, AccountState::PERMANENTLY_BANNED, None)?;
        if updated {
            info!(account_id, "account permanently banned");
        }
        Ok(updated)
    }

    pub fn unban(&self, account_id: AccountId) -> Result<bool, StoreError> {
        let updated = self.apply(account_id, AccountState::NORMAL, None)?;
        if updated {
            info!(account_id, "account unbanned");
        }
        Ok(updated)
    }

    fn apply(
        &self,
        account_id: AccountId,
        state: AccountState,
        unban_time: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let rows = self.store.update_ban_state(account_id, state, unban_time)?;
        if rows == 0 {
            warn!(account_id, "ban update matched no account");
        }
        Ok(rows > 0)
    }
}

/// Parse a ban expiry into an absolute UTC instant.
///
/// Accepted forms:
/// - `now`, and `today`, `tomorrow`, `yesterday` (each at midnight)
/// - `@<unix seconds>`
/// - `YYYYMMDD`, `YYYY-MM-DD` (midnight)
/// - RFC 3339, `YYYY-MM-DD HH:MM[:SS]`, `YYYY-MM-DDTHH:MM:SS`
/// - offsets from `now`: `+3 days`, `2 weeks`, `-90 minutes`, `+1 month`,
///   `next year`, `last week`
///
/// Wall-clock forms without an offset are read as UTC. Month and year offsets
/// land on the last day of the target month when the day does not exist there.
pub fn parse_until(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, BanError> {
    let text = input.trim();
    let invalid = || BanError::InvalidTimestamp(input.to_string());
    let midnight = |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));

    match text.to_ascii_lowercase().as_str() {
        "now" => return Ok(now),
        "today" | "midnight" => return midnight(now.date_naive()).ok_or_else(invalid),
        "tomorrow" => return now.date_naive().succ_opt().and_then(midnight).ok_or_else(invalid),
        "yesterday" => return now.date_naive().pred_opt().and_then(midnight).ok_or_else(invalid),
        _ => {}
    }

    if let Some(secs) = text.strip_prefix('@') {
        if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let secs: i64 = secs.parse().map_err(|_| invalid())?;
        return Utc.timestamp_opt(secs, 0).single().ok_or_else(invalid);
    }

    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        // Bare digits are a compact date, never epoch seconds
        if text.len() != 8 {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(text, "%Y%m%d").map_err(|_| invalid())?;
        return midnight(date).ok_or_else(invalid);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return midnight(date).ok_or_else(invalid);
    }

    apply_offset(text, now).ok_or_else(invalid)
}

fn apply_offset(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut parts = text.split_whitespace();
    let amount = parts.next()?.to_ascii_lowercase();
    let unit = parts.next()?.to_ascii_lowercase();
    if parts.next().is_some() {
        return None;
    }

    let n: i64 = match amount.as_str() {
        "next" => 1,
        "last" => -1,
        _ => {
            let (negative, magnitude) = match amount.as_bytes().first().copied()? {
                b'+' => (false, &amount[1..]),
                b'-' => (true, &amount[1..]),
                _ => (false, amount.as_str()),
            };
            // One sign at most
            if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let n: i64 = magnitude.parse().ok()?;
            if negative {
                -n
            } else {
                n
            }
        }
    };

    let unit = unit.strip_suffix('s').unwrap_or(&unit);
    let duration = match unit {
        "sec" | "second" => Duration::try_seconds(n),
        "min" | "minute" => Duration::try_minutes(n),
        "hour" => Duration::try_hours(n),
        "day" => Duration::try_days(n),
        "week" => Duration::try_weeks(n),
        "month" => return shift_months(now, n),
        "year" => return shift_months(now, n.checked_mul(12)?),
        _ => None,
    }?;
    now.checked_add_signed(duration)
}

fn shift_months(now: DateTime<Utc>, n: i64) -> Option<DateTime<Utc>> {
    let months = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
    if n < 0 {
        now.checked_sub_months(months)
    } else {
        now.checked_add_months(months)
    }
}
