pub mod admin;
pub mod client;
pub mod health;

use chrono::{NaiveDate, NaiveTime};

use crate::engine::parse_hhmm;
use crate::errors::AppError;

/// Parse a "YYYY-MM-DD" calendar date from client input.
pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {}", s)))
}

/// Parse an "HH:MM" time-of-day from client input.
pub(crate) fn parse_time(s: &str) -> Result<NaiveTime, AppError> {
    parse_hhmm(s).ok_or_else(|| AppError::Validation(format!("invalid time: {}", s)))
}

/// Parse a comma-separated service id list ("1,3").
pub(crate) fn parse_service_ids(s: &str) -> Result<Vec<i64>, AppError> {
    let ids: Result<Vec<i64>, _> = s
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect();
    ids.map_err(|_| AppError::Validation(format!("invalid service ids: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_valid() {
        assert!(parse_date("2024-06-10").is_ok());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date("10.06.2024").is_err());
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_parse_time_valid() {
        assert!(parse_time("09:30").is_ok());
    }

    #[test]
    fn test_parse_time_invalid() {
        assert!(parse_time("9.30").is_err());
        assert!(parse_time("24:00").is_err());
    }

    #[test]
    fn test_parse_service_ids() {
        assert_eq!(parse_service_ids("1,3").unwrap(), vec![1, 3]);
        assert_eq!(parse_service_ids(" 2 , 5 ").unwrap(), vec![2, 5]);
        assert!(parse_service_ids("").unwrap().is_empty());
        assert!(parse_service_ids("1,x").is_err());
    }
}
