use crate::error::ValidationError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 界面使用的日期格式
pub const DATE_FMT: &str = "%d/%m/%Y";

/// 闭区间日期范围，整个计划共享
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(with = "dmy")]
    pub start: NaiveDate,
    #[serde(with = "dmy")]
    pub end: NaiveDate,
}

impl DateRange {
    /// 创建日期范围，要求 start <= end
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::DateRangeInverted {
                start: start.format(DATE_FMT).to_string(),
                end: end.format(DATE_FMT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// 从 dd/mm/yyyy 文本解析
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::new(parse_dmy(start)?, parse_dmy(end)?)
    }

    pub fn start_text(&self) -> String {
        self.start.format(DATE_FMT).to_string()
    }

    pub fn end_text(&self) -> String {
        self.end.format(DATE_FMT).to_string()
    }

    /// 结束日期所在的年月（日历导航目标）
    pub fn end_year_month(&self) -> YearMonth {
        YearMonth::new(self.end.year(), self.end.month())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start_text(), self.end_text())
    }
}

/// 解析 dd/mm/yyyy
pub fn parse_dmy(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FMT).map_err(|_| {
        ValidationError::InvalidDateFormat {
            value: value.to_string(),
        }
    })
}

/// 年月序数位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// year * 12 + month
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.month, self.year)
    }
}

mod dmy {
    use super::DATE_FMT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(DATE_FMT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&text, DATE_FMT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_after_end_is_rejected() {
        let err = DateRange::parse("31/12/2024", "01/01/2024").unwrap_err();
        assert!(matches!(err, ValidationError::DateRangeInverted { .. }));
    }

    #[test]
    fn test_single_day_range_is_valid() {
        let range = DateRange::parse("15/03/2024", "15/03/2024").unwrap();
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn test_bad_format_is_rejected() {
        let err = DateRange::parse("2024-01-01", "31/01/2024").unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidDateFormat {
                value: "2024-01-01".to_string()
            }
        );
    }

    #[test]
    fn test_serializes_as_dmy_text() {
        let range = DateRange::parse("01/02/2024", "29/02/2024").unwrap();
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, r#"{"start":"01/02/2024","end":"29/02/2024"}"#);
    }

    #[test]
    fn test_end_year_month() {
        let range = DateRange::parse("01/01/2024", "20/05/2024").unwrap();
        assert_eq!(range.end_year_month(), YearMonth::new(2024, 5));
        assert_eq!(YearMonth::new(2024, 5).ordinal(), 2024 * 12 + 5);
    }
}
