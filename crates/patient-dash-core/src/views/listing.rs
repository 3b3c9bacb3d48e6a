//! Filtered and sorted patient listings.

use std::cmp::Ordering;

use crate::models::{Patient, SortDirection, SortField, ViewState};

/// Natural ordering of two patients on one field.
///
/// Strings compare by code point, dates chronologically.
pub fn compare_by(a: &Patient, b: &Patient, field: SortField) -> Ordering {
    match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::Name => a.name.cmp(&b.name),
        SortField::Email => a.email.cmp(&b.email),
        SortField::Address => a.address.cmp(&b.address),
        SortField::DateOfBirth => a.date_of_birth.cmp(&b.date_of_birth),
        SortField::RegisteredDate => a.registered_date.cmp(&b.registered_date),
    }
}

/// Case-insensitive substring match on name, email or address.
///
/// `needle` must already be lower-cased. An empty needle matches everything.
pub fn matches_search(patient: &Patient, needle: &str) -> bool {
    needle.is_empty()
        || patient.name.to_lowercase().contains(needle)
        || patient.email.to_lowercase().contains(needle)
        || patient.address.to_lowercase().contains(needle)
}

/// Filter by `search_term`, then stable-sort by `sort_field`.
///
/// Equal keys keep their filtered input order in both directions.
pub fn filter_and_sort(
    records: &[Patient],
    search_term: &str,
    sort_field: SortField,
    sort_direction: SortDirection,
) -> Vec<Patient> {
    let needle = search_term.to_lowercase();
    let mut listing: Vec<Patient> = records
        .iter()
        .filter(|p| matches_search(p, &needle))
        .cloned()
        .collect();

    // Reverse the comparator, not the output, so ties stay in input order.
    listing.sort_by(|a, b| match sort_direction {
        SortDirection::Ascending => compare_by(a, b, sort_field),
        SortDirection::Descending => compare_by(b, a, sort_field),
    });
    listing
}

impl ViewState {
    /// Listing of `records` under this state.
    pub fn apply(&self, records: &[Patient]) -> Vec<Patient> {
        filter_and_sort(records, &self.search_term, self.sort_field, self.sort_direction)
    }
}
