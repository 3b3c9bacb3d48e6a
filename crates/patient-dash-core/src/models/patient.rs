//! Patient models.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed calendar-date format used on the wire.
pub const CALENDAR_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("Unparseable date: {0:?}")]
    Malformed(String),

    #[error("Date is in the future: {0}")]
    InFuture(NaiveDate),
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_calendar_date(raw: &str) -> Result<NaiveDate, DateError> {
    let bytes = raw.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());

    if !shape_ok {
        return Err(DateError::Malformed(raw.to_string()));
    }

    NaiveDate::parse_from_str(raw, CALENDAR_DATE_FORMAT)
        .map_err(|_| DateError::Malformed(raw.to_string()))
}

/// Parse a server-assigned date, accepting a trailing `T...` or ` ...` time part.
pub fn parse_server_date(raw: &str) -> Result<NaiveDate, DateError> {
    let trimmed = raw.trim();
    let date_part = match trimmed.as_bytes().get(10) {
        Some(b'T') | Some(b' ') => &trimmed[..10],
        _ => trimmed,
    };
    parse_calendar_date(date_part).map_err(|_| DateError::Malformed(raw.to_string()))
}

/// Parse a date of birth and reject dates after `today`.
pub fn parse_date_of_birth(raw: &str, today: NaiveDate) -> Result<NaiveDate, DateError> {
    let dob = parse_calendar_date(raw)?;
    if dob > today {
        return Err(DateError::InFuture(dob));
    }
    Ok(dob)
}

/// Server-assigned patient identifier. Never generated client-side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PatientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A patient record as acknowledged by the record service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Server-assigned ID
    pub id: PatientId,
    /// Full name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Postal address
    pub address: String,
    /// Date of birth
    pub date_of_birth: NaiveDate,
    /// Registration date, assigned by the server
    pub registered_date: NaiveDate,
}

impl Patient {
    /// Convert a wire record, checking ID and dates.
    pub fn from_remote(remote: RemotePatient, today: NaiveDate) -> Result<Self, IngestError> {
        if remote.id.trim().is_empty() {
            return Err(IngestError::MissingId);
        }
        let date_of_birth =
            parse_date_of_birth(&remote.date_of_birth, today).map_err(IngestError::DateOfBirth)?;
        let registered_date =
            parse_server_date(&remote.registered_date).map_err(IngestError::RegisteredDate)?;

        Ok(Self {
            id: PatientId(remote.id),
            name: remote.name,
            email: remote.email,
            address: remote.address,
            date_of_birth,
            registered_date,
        })
    }

    /// Initials from each whitespace-separated part of the name, upper-cased.
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }
}

/// Patient record exactly as the record service sends it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemotePatient {
    pub id: String,
    pub name: String,
    pub email: String,
    pub address: String,
    pub date_of_birth: String,
    pub registered_date: String,
}

impl From<&Patient> for RemotePatient {
    fn from(patient: &Patient) -> Self {
        Self {
            id: patient.id.to_string(),
            name: patient.name.clone(),
            email: patient.email.clone(),
            address: patient.address.clone(),
            date_of_birth: patient.date_of_birth.format(CALENDAR_DATE_FORMAT).to_string(),
            registered_date: patient.registered_date.format(CALENDAR_DATE_FORMAT).to_string(),
        }
    }
}

/// Why a wire record was refused at ingestion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Record has no id")]
    MissingId,

    #[error("Invalid dateOfBirth: {0}")]
    DateOfBirth(DateError),

    #[error("Invalid registeredDate: {0}")]
    RegisteredDate(DateError),
}

/// Patient fields being composed before submission (no id, no registration date).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatientDraft {
    pub name: String,
    pub email: String,
    pub address: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
}

impl PatientDraft {
    /// Create a draft from its four fields.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        address: impl Into<String>,
        date_of_birth: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            address: address.into(),
            date_of_birth: date_of_birth.into(),
        }
    }

    /// Prefill a draft for editing an existing patient.
    pub fn from_patient(patient: &Patient) -> Self {
        Self {
            name: patient.name.clone(),
            email: patient.email.clone(),
            address: patient.address.clone(),
            date_of_birth: patient.date_of_birth.format(CALENDAR_DATE_FORMAT).to_string(),
        }
    }

    /// Copy with surrounding whitespace stripped from every field, as sent to the service.
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            address: self.address.trim().to_string(),
            date_of_birth: self.date_of_birth.trim().to_string(),
        }
    }
}
