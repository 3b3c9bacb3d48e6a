//! Whole-screen aggregates for the dashboard and analytics pages.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::stats::{
    age_group_histogram, average_age, growth_rate, monthly_registrations, AgeGroupCount,
    MonthlyBucket, DEFAULT_WINDOW_MONTHS,
};
use crate::models::Patient;

/// Records shown in the dashboard's "recent" panel.
pub const RECENT_PATIENTS: usize = 5;

/// Headline numbers for the dashboard page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_patients: usize,
    /// Registered in `as_of`'s calendar month.
    pub new_this_month: usize,
    /// Every cached record counts as active; the record service has no status field.
    pub active_patients: usize,
    /// `new_this_month` as a percentage of the total, 0 when empty.
    pub new_patient_share: f64,
    /// First records in cache order.
    pub recent: Vec<Patient>,
}

impl DashboardSummary {
    pub fn compute(records: &[Patient], as_of: NaiveDate) -> Self {
        let total = records.len();
        let new_this_month = records
            .iter()
            .filter(|p| {
                p.registered_date.year() == as_of.year()
                    && p.registered_date.month() == as_of.month()
            })
            .count();

        Self {
            total_patients: total,
            new_this_month,
            active_patients: total,
            new_patient_share: if total > 0 {
                new_this_month as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            recent: records.iter().take(RECENT_PATIENTS).cloned().collect(),
        }
    }
}

/// Aggregates for the analytics page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub total_patients: usize,
    pub average_age: i32,
    /// Trailing six months, oldest first.
    pub monthly: Vec<MonthlyBucket>,
    pub age_groups: Vec<AgeGroupCount>,
    pub this_month_registrations: usize,
    /// See [`growth_rate`].
    pub growth_rate: f64,
}

impl AnalyticsReport {
    pub fn compute(records: &[Patient], as_of: NaiveDate) -> Self {
        let monthly = monthly_registrations(records, DEFAULT_WINDOW_MONTHS, as_of);
        let this_month_registrations = monthly.last().map_or(0, |b| b.registrations);
        let growth_rate = growth_rate(&monthly);

        Self {
            total_patients: records.len(),
            average_age: average_age(records, as_of),
            age_groups: age_group_histogram(records, as_of),
            monthly,
            this_month_registrations,
            growth_rate,
        }
    }
}
