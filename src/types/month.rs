//! Calendar month type used as the time axis of every series

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar month, stored as the first day of that month.
///
/// Any day-of-month information is discarded at construction, so two dates in
/// the same month always compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "NaiveDate", into = "NaiveDate")]
pub struct Month(NaiveDate);

impl Month {
    /// Build a month from year and month number (1-12)
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    /// The following calendar month
    pub fn succ(self) -> Self {
        self.add_months(1)
    }

    /// The preceding calendar month
    pub fn pred(self) -> Self {
        self.add_months(-1)
    }

    /// Shift by `n` calendar months (negative moves backwards).
    ///
    /// Saturates at the earliest or latest representable month.
    pub fn add_months(self, n: i32) -> Self {
        let index = self.index().saturating_add(n);
        Self::from_index(index).unwrap_or_else(|| {
            if n < 0 {
                Self::from(NaiveDate::MIN)
            } else {
                Self::from(NaiveDate::MAX)
            }
        })
    }

    /// Number of months from `self` to `other` (positive when `other` is later)
    pub fn months_until(self, other: Month) -> i32 {
        other.index() - self.index()
    }

    /// Every month in the closed range `[start, end]`; empty when `start > end`
    pub fn range_inclusive(start: Month, end: Month) -> Vec<Month> {
        let count = start.months_until(end);
        if count < 0 {
            return Vec::new();
        }
        let mut months = Vec::with_capacity(count as usize + 1);
        let mut current = start;
        for _ in 0..=count {
            months.push(current);
            current = current.succ();
        }
        months
    }

    /// Short axis label, e.g. "Sep 23"
    pub fn short_label(self) -> String {
        self.0.format("%b %y").to_string()
    }

    fn index(self) -> i32 {
        self.0.year() * 12 + self.0.month0() as i32
    }

    fn from_index(index: i32) -> Option<Self> {
        let year = index.div_euclid(12);
        let month0 = index.rem_euclid(12) as u32;
        Self::new(year, month0 + 1)
    }
}

impl From<NaiveDate> for Month {
    fn from(date: NaiveDate) -> Self {
        // with_day(1) cannot fail for a valid date
        Self(date.with_day(1).unwrap_or(date))
    }
}

impl From<Month> for NaiveDate {
    fn from(month: Month) -> Self {
        month.0
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m"))
    }
}
