//! Local validation of patient drafts.
//!
//! Runs before any remote call; a draft that fails here is never sent.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{parse_date_of_birth, DateError, PatientDraft};

/// Minimum length of a patient name, in characters.
pub const MIN_NAME_LEN: usize = 2;

/// Minimum length of an address, in characters.
pub const MIN_ADDRESS_LEN: usize = 5;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Draft field a validation message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DraftField {
    Name,
    Email,
    Address,
    DateOfBirth,
}

impl DraftField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftField::Name => "name",
            DraftField::Email => "email",
            DraftField::Address => "address",
            DraftField::DateOfBirth => "dateOfBirth",
        }
    }
}

/// One failed field rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: DraftField,
    pub message: String,
}

/// All failed rules for a draft, in field order.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field.as_str(), e.message))
            .collect();
        write!(f, "Invalid draft ({})", parts.join("; "))
    }
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// First message reported for `field`, if any.
    pub fn message_for(&self, field: DraftField) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn push(&mut self, field: DraftField, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }
}

impl PatientDraft {
    /// Check every field against the form rules, collecting all failures.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.name.trim().chars().count() < MIN_NAME_LEN {
            errors.push(DraftField::Name, "Name must be at least 2 characters");
        }

        if !EMAIL_RE.is_match(self.email.trim()) {
            errors.push(DraftField::Email, "Invalid email address");
        }

        if self.address.trim().chars().count() < MIN_ADDRESS_LEN {
            errors.push(DraftField::Address, "Address must be at least 5 characters");
        }

        match parse_date_of_birth(&self.date_of_birth, today) {
            Ok(_) => {}
            Err(DateError::Malformed(_)) => {
                errors.push(DraftField::DateOfBirth, "Invalid date format")
            }
            Err(DateError::InFuture(_)) => {
                errors.push(DraftField::DateOfBirth, "Date of birth cannot be in the future")
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
