//! Patient Dashboard Core Library
//!
//! Client-side core of the patient management dashboard: session handling,
//! a write-through cache of patient records, and derived views.
//!
//! # Architecture
//!
//! ```text
//!   Auth service                         Record service
//!  (/auth/login, /auth/validate)        (/api/patients)
//!        │                                    │
//!        ▼                                    ▼
//!  SessionManager ──── SessionGate ────▶ RecordStore
//!        │                                    │
//!  [kv_state: auth_token, auth_user]    [cache + version]
//!                                             │
//!                                             ▼
//!                                  views: listing, stats, summaries
//! ```
//!
//! # Core Principle
//!
//! **The cache only holds what the record service acknowledged.** Mutations
//! are applied after the remote call succeeds, never optimistically.
//!
//! # Modules
//!
//! - [`session`]: Restore, login, logout and credential invalidation
//! - [`records`]: Record store with single-flight mutations
//! - [`views`]: Pure listing and statistics functions
//! - [`remote`]: Auth and record service clients
//! - [`db`]: SQLite persistence for the session pair
//! - [`models`]: Domain types (Patient, Identity, ViewState, etc.)

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod records;
pub mod remote;
pub mod session;
pub mod validation;
pub mod views;

// Re-export commonly used types
pub use config::{ConfigError, ServiceConfig};
pub use db::Database;
pub use models::{
    Credential, Identity, Patient, PatientDraft, PatientId, Role, SortDirection, SortField,
    ViewState,
};
pub use records::{LoadReport, RecordError, RecordStore, Snapshot, StoreEvent};
pub use remote::{AuthApi, HttpAuthClient, HttpRecordClient, RecordApi, RemoteError};
pub use session::{SessionEvent, SessionGate, SessionLease, SessionManager, SignOutReason};
pub use validation::ValidationErrors;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio::runtime::Runtime;

use models::CALENDAR_DATE_FORMAT;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum DashboardError {
    #[error("No active session")]
    NoSession,

    #[error("Session expired, please sign in again")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote error: {0}")]
    RemoteError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<db::DbError> for DashboardError {
    fn from(e: db::DbError) -> Self {
        DashboardError::DatabaseError(e.to_string())
    }
}

impl From<ConfigError> for DashboardError {
    fn from(e: ConfigError) -> Self {
        DashboardError::ConfigError(e.to_string())
    }
}

impl From<RemoteError> for DashboardError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Config(message) => DashboardError::ConfigError(message),
            other => DashboardError::RemoteError(other.to_string()),
        }
    }
}

impl From<RecordError> for DashboardError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::NoSession | RecordError::SessionEnded => DashboardError::NoSession,
            RecordError::Unauthorized => DashboardError::Unauthorized,
            RecordError::NotFound(id) => DashboardError::NotFound(id.to_string()),
            RecordError::InFlight(id) => DashboardError::Busy(id.to_string()),
            RecordError::Validation(errors) => DashboardError::InvalidInput(errors.to_string()),
            other => DashboardError::RemoteError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for DashboardError {
    fn from(e: std::io::Error) -> Self {
        DashboardError::RuntimeError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install the global log subscriber. `level` is a tracing level name; unknown names mean `info`.
///
/// Returns `false` if logging was already initialized.
#[uniffi::export]
pub fn init_logging(level: String) -> bool {
    let level = level.parse().unwrap_or(tracing::Level::INFO);
    logging::init_logging(&logging::LogConfig::default().with_level(level))
}

/// Build the dashboard core from a service configuration.
#[uniffi::export]
pub fn open_dashboard(config: FfiServiceConfig) -> Result<Arc<DashboardCore>, DashboardError> {
    let config = ServiceConfig::try_from(config)?;
    DashboardCore::build(&config).map(Arc::new)
}

/// Dashboard core with in-memory persistence (for testing).
#[uniffi::export]
pub fn open_dashboard_in_memory(
    auth_url: String,
    api_url: String,
) -> Result<Arc<DashboardCore>, DashboardError> {
    let config = ServiceConfig {
        auth_base_url: auth_url,
        record_base_url: api_url,
        ..ServiceConfig::default()
    };
    DashboardCore::build(&config).map(Arc::new)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Session, record store and the runtime driving them, for FFI callers.
///
/// Every method blocks the calling thread; call from a background thread on the host side.
#[derive(uniffi::Object)]
pub struct DashboardCore {
    runtime: Runtime,
    session: Arc<SessionManager>,
    store: RecordStore,
}

impl DashboardCore {
    fn build(config: &ServiceConfig) -> Result<Self, DashboardError> {
        let db = match &config.database_path {
            Some(path) => Database::open(path)?,
            None => Database::open_in_memory()?,
        };

        let auth = HttpAuthClient::from_config(config)?;
        let api = HttpRecordClient::from_config(config)?;
        let session = Arc::new(SessionManager::new(
            Arc::new(auth),
            Arc::new(Mutex::new(db)),
            config.default_role,
        ));
        let store = RecordStore::new(Arc::new(api), session.clone());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            session,
            store,
        })
    }

    fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

#[uniffi::export]
impl DashboardCore {
    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Reactivate the persisted session if the auth service still accepts it.
    pub fn restore(&self) -> bool {
        self.runtime.block_on(self.session.restore())
    }

    pub fn login(&self, email: String, password: String) -> bool {
        self.runtime.block_on(self.session.login(&email, &password))
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    pub fn current_identity(&self) -> Option<FfiIdentity> {
        self.session.identity().map(Into::into)
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Replace the cache with the record service's full list.
    pub fn load_patients(&self) -> Result<FfiLoadReport, DashboardError> {
        let report = self.runtime.block_on(self.store.load_all())?;
        Ok(report.into())
    }

    pub fn create_patient(&self, draft: FfiDraft) -> Result<FfiPatient, DashboardError> {
        let draft = PatientDraft::from(draft);
        let patient = self.runtime.block_on(self.store.create(&draft))?;
        Ok(patient.into())
    }

    pub fn update_patient(&self, id: String, draft: FfiDraft) -> Result<FfiPatient, DashboardError> {
        let id = PatientId::new(id);
        let draft = PatientDraft::from(draft);
        let patient = self.runtime.block_on(self.store.update(&id, &draft))?;
        Ok(patient.into())
    }

    pub fn delete_patient(&self, id: String) -> Result<(), DashboardError> {
        let id = PatientId::new(id);
        self.runtime.block_on(self.store.delete(&id))?;
        Ok(())
    }

    // =========================================================================
    // View Operations
    // =========================================================================

    /// Cached patients matching `search_term`, sorted.
    pub fn list_patients(
        &self,
        search_term: String,
        sort_field: FfiSortField,
        direction: FfiSortDirection,
    ) -> Vec<FfiPatient> {
        let records = self.store.records();
        views::filter_and_sort(&records, &search_term, sort_field.into(), direction.into())
            .into_iter()
            .map(Into::into)
            .collect()
    }

    /// Trailing `window` months of registrations, oldest first. Windows
    /// longer than ten years are clamped.
    pub fn monthly_registrations(&self, window: u32) -> Vec<FfiMonthlyBucket> {
        let records = self.store.records();
        views::monthly_registrations(&records, window, Self::today())
            .into_iter()
            .map(Into::into)
            .collect()
    }

    pub fn age_groups(&self) -> Vec<FfiAgeGroup> {
        let records = self.store.records();
        views::age_group_histogram(&records, Self::today())
            .into_iter()
            .map(Into::into)
            .collect()
    }

    pub fn dashboard_summary(&self) -> FfiDashboardSummary {
        let records = self.store.records();
        views::DashboardSummary::compute(&records, Self::today()).into()
    }

    pub fn analytics_report(&self) -> FfiAnalyticsReport {
        let records = self.store.records();
        views::AnalyticsReport::compute(&records, Self::today()).into()
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe service configuration.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiServiceConfig {
    pub auth_base_url: String,
    pub record_base_url: String,
    pub request_timeout_secs: u64,
    /// "ADMIN" or "USER".
    pub default_role: String,
    pub database_path: Option<String>,
}

impl TryFrom<FfiServiceConfig> for ServiceConfig {
    type Error = ConfigError;

    fn try_from(config: FfiServiceConfig) -> Result<Self, Self::Error> {
        if config.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs".into(),
                message: "must be positive".into(),
            });
        }
        let default_role = config
            .default_role
            .parse()
            .map_err(|message| ConfigError::InvalidValue {
                key: "default_role".into(),
                message,
            })?;

        Ok(ServiceConfig {
            auth_base_url: config.auth_base_url,
            record_base_url: config.record_base_url,
            request_timeout_secs: config.request_timeout_secs,
            default_role,
            database_path: config.database_path.map(PathBuf::from),
        })
    }
}

/// FFI-safe patient. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub email: String,
    pub address: String,
    pub date_of_birth: String,
    pub registered_date: String,
    pub initials: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            initials: patient.initials(),
            id: patient.id.to_string(),
            name: patient.name,
            email: patient.email,
            address: patient.address,
            date_of_birth: patient.date_of_birth.format(CALENDAR_DATE_FORMAT).to_string(),
            registered_date: patient.registered_date.format(CALENDAR_DATE_FORMAT).to_string(),
        }
    }
}

/// FFI-safe patient form input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDraft {
    pub name: String,
    pub email: String,
    pub address: String,
    pub date_of_birth: String,
}

impl From<FfiDraft> for PatientDraft {
    fn from(draft: FfiDraft) -> Self {
        PatientDraft::new(draft.name, draft.email, draft.address, draft.date_of_birth)
    }
}

/// FFI-safe signed-in user.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiIdentity {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl From<Identity> for FfiIdentity {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            role: identity.role.as_str().to_string(),
        }
    }
}

/// FFI-safe load result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLoadReport {
    pub loaded: u32,
    pub skipped_ids: Vec<String>,
}

impl From<LoadReport> for FfiLoadReport {
    fn from(report: LoadReport) -> Self {
        Self {
            loaded: report.loaded as u32,
            skipped_ids: report.skipped.into_iter().map(|s| s.id).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiSortField {
    Id,
    Name,
    Email,
    Address,
    DateOfBirth,
    RegisteredDate,
}

impl From<FfiSortField> for SortField {
    fn from(field: FfiSortField) -> Self {
        match field {
            FfiSortField::Id => SortField::Id,
            FfiSortField::Name => SortField::Name,
            FfiSortField::Email => SortField::Email,
            FfiSortField::Address => SortField::Address,
            FfiSortField::DateOfBirth => SortField::DateOfBirth,
            FfiSortField::RegisteredDate => SortField::RegisteredDate,
        }
    }
}

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiSortDirection {
    Ascending,
    Descending,
}

impl From<FfiSortDirection> for SortDirection {
    fn from(direction: FfiSortDirection) -> Self {
        match direction {
            FfiSortDirection::Ascending => SortDirection::Ascending,
            FfiSortDirection::Descending => SortDirection::Descending,
        }
    }
}

/// FFI-safe monthly bucket.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMonthlyBucket {
    pub label: String,
    pub year: i32,
    pub month: u32,
    pub registrations: u32,
    pub cumulative_patients: u32,
}

impl From<views::MonthlyBucket> for FfiMonthlyBucket {
    fn from(bucket: views::MonthlyBucket) -> Self {
        Self {
            label: bucket.label,
            year: bucket.year,
            month: bucket.month,
            registrations: bucket.registrations as u32,
            cumulative_patients: bucket.cumulative_patients as u32,
        }
    }
}

/// FFI-safe age group count.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAgeGroup {
    pub label: String,
    pub count: u32,
    pub percentage: f64,
}

impl From<views::AgeGroupCount> for FfiAgeGroup {
    fn from(group: views::AgeGroupCount) -> Self {
        Self {
            label: group.label,
            count: group.count as u32,
            percentage: group.percentage,
        }
    }
}

/// FFI-safe dashboard summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDashboardSummary {
    pub total_patients: u32,
    pub new_this_month: u32,
    pub active_patients: u32,
    pub new_patient_share: f64,
    pub recent: Vec<FfiPatient>,
}

impl From<views::DashboardSummary> for FfiDashboardSummary {
    fn from(summary: views::DashboardSummary) -> Self {
        Self {
            total_patients: summary.total_patients as u32,
            new_this_month: summary.new_this_month as u32,
            active_patients: summary.active_patients as u32,
            new_patient_share: summary.new_patient_share,
            recent: summary.recent.into_iter().map(Into::into).collect(),
        }
    }
}

/// FFI-safe analytics report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAnalyticsReport {
    pub total_patients: u32,
    pub average_age: i32,
    pub monthly: Vec<FfiMonthlyBucket>,
    pub age_groups: Vec<FfiAgeGroup>,
    pub this_month_registrations: u32,
    pub growth_rate: f64,
}

impl From<views::AnalyticsReport> for FfiAnalyticsReport {
    fn from(report: views::AnalyticsReport) -> Self {
        Self {
            total_patients: report.total_patients as u32,
            average_age: report.average_age,
            monthly: report.monthly.into_iter().map(Into::into).collect(),
            age_groups: report.age_groups.into_iter().map(Into::into).collect(),
            this_month_registrations: report.this_month_registrations as u32,
            growth_rate: report.growth_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffi_config(role: &str, timeout: u64) -> FfiServiceConfig {
        FfiServiceConfig {
            auth_base_url: "http://localhost:4004/auth".into(),
            record_base_url: "http://localhost:4004/api".into(),
            request_timeout_secs: timeout,
            default_role: role.into(),
            database_path: None,
        }
    }

    #[test]
    fn test_ffi_config_conversion() {
        let config = ServiceConfig::try_from(ffi_config("USER", 10)).unwrap();
        assert_eq!(config.default_role, Role::User);
        assert_eq!(config.request_timeout_secs, 10);

        assert!(ServiceConfig::try_from(ffi_config("ROOT", 10)).is_err());
        assert!(ServiceConfig::try_from(ffi_config("ADMIN", 0)).is_err());
    }

    #[test]
    fn test_record_error_mapping() {
        let e: DashboardError = RecordError::InFlight(PatientId::new("p1")).into();
        assert!(matches!(e, DashboardError::Busy(id) if id == "p1"));

        let e: DashboardError = RecordError::Remote(RemoteError::Network("down".into())).into();
        assert!(matches!(e, DashboardError::RemoteError(_)));

        let e: DashboardError = RecordError::NoSession.into();
        assert!(matches!(e, DashboardError::NoSession));
    }

    #[test]
    fn test_open_rejects_bad_base_url() {
        let result = open_dashboard_in_memory("not a url".into(), "http://localhost/api".into());
        assert!(matches!(result, Err(DashboardError::ConfigError(_))));
    }
}
