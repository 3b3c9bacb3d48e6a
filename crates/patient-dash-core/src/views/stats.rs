//! Statistical aggregations: ages, registrations per month, age groups.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::Patient;

/// Trailing months shown by default.
pub const DEFAULT_WINDOW_MONTHS: u32 = 6;

/// Longest window [`monthly_registrations`] produces; larger requests are clamped.
pub const MAX_WINDOW_MONTHS: u32 = 120;

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Whole years between `date_of_birth` and `as_of`.
///
/// Year difference, minus one when `as_of`'s (month, day) is before the birthday's.
pub fn age_of(date_of_birth: NaiveDate, as_of: NaiveDate) -> i32 {
    let mut age = as_of.year() - date_of_birth.year();
    if (as_of.month(), as_of.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Mean age rounded to the nearest year; 0 for no records.
pub fn average_age(records: &[Patient], as_of: NaiveDate) -> i32 {
    if records.is_empty() {
        return 0;
    }
    let total: i64 = records
        .iter()
        .map(|p| i64::from(age_of(p.date_of_birth, as_of)))
        .sum();
    (total as f64 / records.len() as f64).round() as i32
}

/// Months since year 0, for ordering (year, month) pairs.
fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// Registrations within one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    /// Short month and year, e.g. "Mar 2024".
    pub label: String,
    pub year: i32,
    /// 1-12
    pub month: u32,
    /// Records registered in this month.
    pub registrations: usize,
    /// Records registered up to and including this month.
    pub cumulative_patients: usize,
}

/// `window_months` trailing month buckets ending at `as_of`'s month, oldest first.
///
/// Months without registrations are still present with a zero count.
/// The window is capped at [`MAX_WINDOW_MONTHS`].
pub fn monthly_registrations(
    records: &[Patient],
    window_months: u32,
    as_of: NaiveDate,
) -> Vec<MonthlyBucket> {
    let last = month_index(as_of);
    let registered: Vec<i64> = records.iter().map(|p| month_index(p.registered_date)).collect();

    (0..i64::from(window_months.min(MAX_WINDOW_MONTHS)))
        .rev()
        .map(|back| {
            let index = last - back;
            let year = index.div_euclid(12) as i32;
            let month0 = index.rem_euclid(12) as usize;

            MonthlyBucket {
                label: format!("{} {}", MONTH_ABBR[month0], year),
                year,
                month: month0 as u32 + 1,
                registrations: registered.iter().filter(|m| **m == index).count(),
                cumulative_patients: registered.iter().filter(|m| **m <= index).count(),
            }
        })
        .collect()
}

/// Month-over-month change of the last bucket, in percent.
///
/// Defined as 0 when there is no previous bucket or it has no registrations.
/// That is a reporting policy to avoid dividing by zero, not a measured rate.
pub fn growth_rate(buckets: &[MonthlyBucket]) -> f64 {
    let [.., previous, last] = buckets else {
        return 0.0;
    };
    if previous.registrations == 0 {
        return 0.0;
    }
    let previous_count = previous.registrations as f64;
    (last.registrations as f64 - previous_count) / previous_count * 100.0
}

/// Fixed age partition used by the analytics view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    /// 0-18
    Minor,
    /// 19-30
    YoungAdult,
    /// 31-50
    Adult,
    /// 51-70
    MiddleAged,
    /// Over 70
    Senior,
}

impl AgeGroup {
    /// Every group, in display order.
    pub const ALL: [AgeGroup; 5] = [
        AgeGroup::Minor,
        AgeGroup::YoungAdult,
        AgeGroup::Adult,
        AgeGroup::MiddleAged,
        AgeGroup::Senior,
    ];

    pub fn for_age(age: i32) -> Self {
        match age {
            i32::MIN..=18 => AgeGroup::Minor,
            19..=30 => AgeGroup::YoungAdult,
            31..=50 => AgeGroup::Adult,
            51..=70 => AgeGroup::MiddleAged,
            _ => AgeGroup::Senior,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeGroup::Minor => "0-18",
            AgeGroup::YoungAdult => "19-30",
            AgeGroup::Adult => "31-50",
            AgeGroup::MiddleAged => "51-70",
            AgeGroup::Senior => "70+",
        }
    }
}

/// Count and share of one age group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeGroupCount {
    pub group: AgeGroup,
    pub label: String,
    pub count: usize,
    /// Share of all records, 0-100. 0 when there are no records.
    pub percentage: f64,
}

/// Records per age group, always all five groups in fixed order.
pub fn age_group_histogram(records: &[Patient], as_of: NaiveDate) -> Vec<AgeGroupCount> {
    let mut counts = [0usize; AgeGroup::ALL.len()];
    for patient in records {
        let group = AgeGroup::for_age(age_of(patient.date_of_birth, as_of));
        counts[group as usize] += 1;
    }

    let total = records.len();
    AgeGroup::ALL
        .iter()
        .zip(counts)
        .map(|(group, count)| AgeGroupCount {
            group: *group,
            label: group.label().to_string(),
            count,
            percentage: if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect()
}
