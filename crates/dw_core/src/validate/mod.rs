use crate::error::AppError;

pub const MAX_RESOLUTION_NOTE_CHARS: usize = 1000;
pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 1000;
pub const MIN_REPORT_YEAR: i32 = 2000;
pub const MAX_REPORT_YEAR: i32 = 2100;

/// Trim a resolution note and reject empty or oversized notes.
pub fn resolution_note(note: &str) -> Result<&str, AppError> {
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_argument("Resolution note is required"));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_RESOLUTION_NOTE_CHARS {
        return Err(AppError::invalid_argument(format!(
            "Resolution note must be at most {MAX_RESOLUTION_NOTE_CHARS} characters"
        ))
        .with_details(format!("chars={chars}")));
    }
    Ok(trimmed)
}

/// Clamp a store-level limit into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIST_LIMIT)
}

/// Validate a caller-supplied list limit: absent means the default, non-positive is rejected,
/// anything above the maximum is clamped.
pub fn list_limit(limit: Option<i64>) -> Result<i64, AppError> {
    match limit {
        None => Ok(DEFAULT_LIST_LIMIT),
        Some(n) if n < 1 => Err(AppError::invalid_argument("Limit must be at least 1")
            .with_details(format!("limit={n}"))),
        Some(n) => Ok(clamp_limit(n)),
    }
}

pub fn report_period(year: i32, month: u8) -> Result<(), AppError> {
    if !(MIN_REPORT_YEAR..=MAX_REPORT_YEAR).contains(&year) {
        return Err(AppError::invalid_argument(format!(
            "Year must be between {MIN_REPORT_YEAR} and {MAX_REPORT_YEAR}"
        ))
        .with_details(format!("year={year}")));
    }
    if !(1..=12).contains(&month) {
        return Err(AppError::invalid_argument("Month must be between 1 and 12")
            .with_details(format!("month={month}")));
    }
    Ok(())
}

/// Narrow user-supplied numbers to a report period, with the same errors as `report_period`.
pub fn parse_report_period(year: i64, month: i64) -> Result<(i32, u8), AppError> {
    let year_out_of_range = || {
        AppError::invalid_argument(format!(
            "Year must be between {MIN_REPORT_YEAR} and {MAX_REPORT_YEAR}"
        ))
        .with_details(format!("year={year}"))
    };
    let year = i32::try_from(year).map_err(|_| year_out_of_range())?;
    let month = u8::try_from(month).map_err(|_| {
        AppError::invalid_argument("Month must be between 1 and 12")
            .with_details(format!("month={month}"))
    })?;
    report_period(year, month)?;
    Ok((year, month))
}

pub fn principal(field: &str, id: &str) -> Result<(), AppError> {
    if id.trim().is_empty() {
        return Err(AppError::invalid_argument(format!("{field} is required")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_rules() {
        assert_eq!(resolution_note("  fixed dns  ").unwrap(), "fixed dns");
        assert_eq!(resolution_note("   ").unwrap_err().code, "INVALID_ARGUMENT");
        assert!(resolution_note(&"x".repeat(1000)).is_ok());
        assert!(resolution_note(&"x".repeat(1001)).is_err());
    }

    #[test]
    fn limit_rules() {
        assert_eq!(list_limit(None).unwrap(), 50);
        assert_eq!(list_limit(Some(5000)).unwrap(), 1000);
        assert!(list_limit(Some(0)).is_err());
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(5000), 1000);
    }

    #[test]
    fn period_rules() {
        assert!(report_period(2024, 3).is_ok());
        assert!(report_period(2024, 13).is_err());
        assert!(report_period(2024, 0).is_err());
        assert!(report_period(1899, 1).is_err());
        assert!(report_period(2101, 1).is_err());
    }

    #[test]
    fn period_parsing_from_wide_input() {
        assert_eq!(parse_report_period(2024, 3).unwrap(), (2024, 3));
        assert_eq!(parse_report_period(2024, 300).unwrap_err().code, "INVALID_ARGUMENT");
        assert_eq!(parse_report_period(2024, -1).unwrap_err().code, "INVALID_ARGUMENT");
        assert_eq!(parse_report_period(2024, 13).unwrap_err().code, "INVALID_ARGUMENT");
        assert_eq!(
            parse_report_period(i64::MAX, 3).unwrap_err().code,
            "INVALID_ARGUMENT"
        );
    }
}
