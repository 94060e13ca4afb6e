//! Core domain types for the vaccination calendar.
//!
//! This module defines the fundamental types used throughout the system:
//! - Age offsets and due-date arithmetic
//! - Catalog entries and per-country catalogs
//! - The child profile
//! - Derived schedule rows

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

// ============================================================================
// Age Offset
// ============================================================================

/// A relative displacement from a birth date
///
/// Absent components count as zero. Components are applied years first, then
/// months, then days; month arithmetic clamps to the last day of the target
/// month (Jan 31 + 1 month = Feb 28 or 29).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgeOffset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years: Option<i32>,
}

impl AgeOffset {
    pub fn days(days: i32) -> Self {
        Self {
            days: Some(days),
            ..Self::default()
        }
    }

    pub fn months(months: i32) -> Self {
        Self {
            months: Some(months),
            ..Self::default()
        }
    }

    pub fn years(years: i32) -> Self {
        Self {
            years: Some(years),
            ..Self::default()
        }
    }

    /// Apply the offset to `base`
    ///
    /// Returns `None` only when the result falls outside the representable
    /// calendar range.
    pub fn apply(&self, base: NaiveDate) -> Option<NaiveDate> {
        let mut date = base;
        if let Some(years) = self.years.filter(|y| *y != 0) {
            date = shift_months(date, i64::from(years) * 12)?;
        }
        if let Some(months) = self.months.filter(|m| *m != 0) {
            date = shift_months(date, i64::from(months))?;
        }
        if let Some(days) = self.days.filter(|d| *d != 0) {
            let magnitude = Days::new(u64::from(days.unsigned_abs()));
            date = if days > 0 {
                date.checked_add_days(magnitude)?
            } else {
                date.checked_sub_days(magnitude)?
            };
        }
        Some(date)
    }

    /// True when every component is absent or zero
    pub fn is_zero(&self) -> bool {
        self.days.unwrap_or(0) == 0 && self.months.unwrap_or(0) == 0 && self.years.unwrap_or(0) == 0
    }
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

impl std::fmt::Display for AgeOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_zero() {
            return write!(f, "at birth");
        }
        let parts: Vec<String> = [(self.years, "y"), (self.months, "m"), (self.days, "d")]
            .into_iter()
            .filter_map(|(value, unit)| value.filter(|v| *v != 0).map(|v| format!("{}{}", v, unit)))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

// ============================================================================
// Catalog Types
// ============================================================================

/// A single vaccination in a country catalog
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaccineScheduleEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age_offset: AgeOffset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Country-specific reference calendar
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaccineCatalog {
    pub country: String,
    /// Human-readable country name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mandatory: Vec<VaccineScheduleEntry>,
    #[serde(default)]
    pub recommended: Vec<VaccineScheduleEntry>,
}

impl VaccineCatalog {
    pub fn is_recommended(&self, id: &str) -> bool {
        self.recommended.iter().any(|e| e.id == id)
    }

    /// Find an entry by id in either list
    pub fn entry(&self, id: &str) -> Option<&VaccineScheduleEntry> {
        self.mandatory
            .iter()
            .chain(self.recommended.iter())
            .find(|e| e.id == id)
    }
}

/// A supported country, as offered during onboarding
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Country {
    pub code: String,
    pub name: String,
}

// ============================================================================
// Profile and Schedule Types
// ============================================================================

/// The child whose schedule is tracked
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    pub date_of_birth: NaiveDate,
    pub country_code: String,
}

/// Which catalog list an entry came from
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Mandatory,
    Optional,
}

/// Where an entry stands relative to a reference day
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DueStatus {
    Done,
    Overdue,
    Upcoming,
    Unknown,
}

/// One row of the active schedule: catalog data merged with the overlays
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleItem {
    pub entry: VaccineScheduleEntry,
    pub kind: EntryKind,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub note: Option<String>,
    pub status: DueStatus,
}
