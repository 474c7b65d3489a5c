use crate::errors::{AppError, AppResult};
use chrono::{Datelike, Local, NaiveDate};

/// Tab name for a record's month, optionally namespaced by a project slug.
///
/// The scope is used exactly as given, whitespace included; callers pass an
/// already-slugified value. An empty scope means no scope.
pub fn resolve<D: Datelike>(date: &D, scope: Option<&str>) -> String {
    format_name(date.month(), date.year(), scope)
}

/// Tab name for a read request. Missing month or year default to the current month.
pub fn resolve_month(month: Option<&str>, year: Option<&str>, scope: Option<&str>) -> AppResult<String> {
    let today = Local::now().date_naive();
    let month = match non_empty(month) {
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|value| (1..=12).contains(value))
            .ok_or_else(|| AppError::Validation(format!("Invalid month '{}'", raw)))?,
        None => today.month(),
    };
    let year = match non_empty(year) {
        Some(raw) => raw
            .parse::<i32>()
            .ok()
            .filter(|value| (1..=9999).contains(value))
            .ok_or_else(|| AppError::Validation(format!("Invalid year '{}'", raw)))?,
        None => today.year(),
    };
    Ok(format_name(month, year, scope))
}

/// Parses a `YYYY-MM-DD` record date.
pub fn parse_record_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn format_name(month: u32, year: i32, scope: Option<&str>) -> String {
    match scope.filter(|scope| !scope.is_empty()) {
        Some(scope) => format!("{}_{:02}-{:04}", scope, month, year),
        None => format!("{:02}-{:04}", month, year),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
