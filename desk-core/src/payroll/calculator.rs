use chrono::Timelike;
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use shared::models::{AttendanceKind, AttendanceLog, Deduction, Timestamp, User};

use crate::utils::{EngineError, EngineResult};

/// Shift start used when the profile has none
pub const DEFAULT_SHIFT_START: &str = "09:00";

/// Minutes after shift start that still count as on time
pub const GRACE_MINUTES: i64 = 5;

/// Working hours per month used to derive the hourly rate
pub const MONTHLY_HOURS: u32 = 240;

/// Parse "HH:MM" into minutes since midnight; blank falls back to 09:00
pub fn parse_shift_start(shift_start: Option<&str>) -> EngineResult<i64> {
    let raw = shift_start
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SHIFT_START);

    let invalid = || EngineError::InvalidShiftStart(raw.to_string());
    let (hour, minute) = raw.split_once(':').ok_or_else(invalid)?;
    let hour: i64 = hour.trim().parse().map_err(|_| invalid())?;
    let minute: i64 = minute.trim().parse().map_err(|_| invalid())?;
    if !(0..24).contains(&hour) || !(0..60).contains(&minute) {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

/// Minutes late for one clock-in.
///
/// Only the local wall-clock time (hour:minute in `tz`) is compared with the
/// shift start; seconds are ignored. Anything within the grace period is 0.
pub fn calculate_lateness(log_time: Timestamp, shift_start: Option<&str>, tz: Tz) -> EngineResult<i64> {
    let shift = parse_shift_start(shift_start)?;
    let local = log_time
        .to_datetime()
        .ok_or_else(|| EngineError::Validation(format!("timestamp out of range: {}", log_time.seconds)))?
        .with_timezone(&tz);

    let logged = i64::from(local.hour()) * 60 + i64::from(local.minute());
    let diff = logged - shift;
    Ok(if diff > GRACE_MINUTES { diff } else { 0 })
}

/// Monthly figures for one employee
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    /// Minutes
    pub total_lateness: i64,
    pub total_deductions: Decimal,
    pub hourly_rate: Decimal,
    /// Rounded to whole currency units
    pub late_cost: Decimal,
    pub net_salary: Decimal,
}

/// Lateness over `in` logs, deductions and the resulting net salary
pub fn calculate_financials(
    employee: &User,
    logs: &[AttendanceLog],
    deductions: &[Deduction],
    tz: Tz,
) -> EngineResult<FinancialSummary> {
    let shift_start = employee.shift_start.as_deref();

    let mut total_lateness = 0;
    for log in logs.iter().filter(|l| l.kind == AttendanceKind::In) {
        total_lateness += calculate_lateness(log.timestamp, shift_start, tz)?;
    }

    let total_deductions: Decimal = deductions.iter().map(|d| d.amount).sum();
    let salary = employee.salary.unwrap_or(Decimal::ZERO);
    let hourly_rate = salary / Decimal::from(MONTHLY_HOURS);

    let late_cost = (Decimal::from(total_lateness) / Decimal::from(60) * hourly_rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    Ok(FinancialSummary {
        total_lateness,
        total_deductions,
        hourly_rate,
        late_cost,
        net_salary: salary - total_deductions - late_cost,
    })
}
