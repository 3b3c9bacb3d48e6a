//! Write-through record cache.
//!
//! The cache only ever holds values the record service acknowledged. A
//! mutation awaits the remote call first and then applies its result in
//! one synchronous step, so a failed or cancelled call leaves the cache
//! untouched.
//!
//! The cache belongs to one session generation. When the session ends or
//! is replaced it reads as empty, and results of calls issued under the
//! old session are discarded.

mod inflight;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::models::{IngestError, Patient, PatientDraft, PatientId};
use crate::remote::{RecordApi, RemoteError};
use crate::session::{SessionGate, SessionLease};
use crate::validation::ValidationErrors;
use inflight::InFlight;

/// Record store errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("No active session")]
    NoSession,

    #[error("Session ended before the record service answered")]
    SessionEnded,

    #[error("Session rejected by the record service")]
    Unauthorized,

    #[error("Patient not found: {0}")]
    NotFound(PatientId),

    #[error("Another change to patient {0} is still in progress")]
    InFlight(PatientId),

    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("Record service returned an invalid record: {0}")]
    InvalidRecord(#[from] IngestError),

    #[error("Record service returned patient {actual} for an update of {expected}")]
    IdMismatch {
        expected: PatientId,
        actual: PatientId,
    },

    #[error("Record service error: {0}")]
    Remote(RemoteError),
}

impl RecordError {
    /// Short text for a transient notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            RecordError::NoSession | RecordError::SessionEnded => "Please sign in to continue.",
            RecordError::Unauthorized => "Your session has expired. Please sign in again.",
            RecordError::NotFound(_) => "Patient not found.",
            RecordError::InFlight(_) => "This patient is still being saved. Please wait.",
            RecordError::Validation(_) => "Please correct the highlighted fields.",
            RecordError::InvalidRecord(_)
            | RecordError::IdMismatch { .. }
            | RecordError::Remote(_) => "Something went wrong. Please try again.",
        }
    }

    /// Whether trying the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecordError::InFlight(_) | RecordError::Remote(RemoteError::Network(_))
        )
    }
}

pub type RecordResult<T> = Result<T, RecordError>;

/// Store operation, for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Text for a transient failure notification.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Operation::Load => "Failed to fetch patients. Please try again.",
            Operation::Create | Operation::Update => "Failed to save patient. Please try again.",
            Operation::Delete => "Failed to delete patient. Please try again.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Load => "load",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Outcome notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Loaded { count: usize, skipped: usize },
    Created(PatientId),
    Updated(PatientId),
    Deleted(PatientId),
    Failed { operation: Operation, error: RecordError },
}

impl StoreEvent {
    /// Short user-facing text.
    pub fn message(&self) -> String {
        match self {
            StoreEvent::Loaded { count, .. } => {
                format!("{} patient{} loaded.", count, if *count == 1 { "" } else { "s" })
            }
            StoreEvent::Created(_) => "Patient added successfully.".into(),
            StoreEvent::Updated(_) => "Patient updated successfully.".into(),
            StoreEvent::Deleted(_) => "Patient deleted successfully.".into(),
            StoreEvent::Failed { operation, .. } => operation.failure_message().into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StoreEvent::Failed { .. })
    }
}

/// Why `load_all` left a record out of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Invalid(IngestError),
    DuplicateId,
}

/// A record the service sent that did not make it into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Raw id as sent (may be empty).
    pub id: String,
    pub reason: SkipReason,
}

/// Result of a full reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Read-only copy of the cache. `version` changes whenever the cache does.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: u64,
    pub records: Vec<Patient>,
}

#[derive(Debug, Default)]
struct Cache {
    records: Vec<Patient>,
    version: u64,
    generation: u64,
}

impl Cache {
    /// Hand the cache over to `generation`, dropping records of any other.
    fn adopt(&mut self, generation: u64) {
        if self.generation == generation {
            return;
        }
        self.generation = generation;
        if !self.records.is_empty() {
            self.records.clear();
            self.bump();
        }
    }

    fn position(&self, id: &PatientId) -> Option<usize> {
        self.records.iter().position(|p| &p.id == id)
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Owns the in-memory patient cache and mediates every change to it.
pub struct RecordStore {
    api: Arc<dyn RecordApi>,
    session: Arc<dyn SessionGate>,
    cache: RwLock<Cache>,
    in_flight: InFlight,
    events: broadcast::Sender<StoreEvent>,
    today: fn() -> NaiveDate,
}

impl RecordStore {
    pub fn new(api: Arc<dyn RecordApi>, session: Arc<dyn SessionGate>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            api,
            session,
            cache: RwLock::new(Cache::default()),
            in_flight: InFlight::default(),
            events,
            today: local_today,
        }
    }

    /// Replace the clock used for date-of-birth checks.
    #[must_use]
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Fetch every record and replace the cache with the result.
    pub async fn load_all(&self) -> RecordResult<LoadReport> {
        let lease = self.require_session(Operation::Load)?;

        let remote = match self.api.list(&lease.credential).await {
            Ok(remote) => remote,
            Err(e) => return Err(self.remote_failure(Operation::Load, &lease, None, e)),
        };

        let today = (self.today)();
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(remote.len());
        let mut skipped = Vec::new();

        for item in remote {
            let raw_id = item.id.clone();
            match Patient::from_remote(item, today) {
                Ok(patient) if seen.insert(patient.id.clone()) => records.push(patient),
                Ok(_) => skipped.push(SkippedRecord {
                    id: raw_id,
                    reason: SkipReason::DuplicateId,
                }),
                Err(e) => skipped.push(SkippedRecord {
                    id: raw_id,
                    reason: SkipReason::Invalid(e),
                }),
            }
        }

        for record in &skipped {
            warn!(id = %record.id, reason = ?record.reason, "Skipping record from record service");
        }

        let loaded = records.len();
        self.commit(Operation::Load, &lease, |cache| {
            cache.records = records;
            cache.bump();
        })?;
        info!(loaded, skipped = skipped.len(), "Patient cache replaced");

        self.emit(StoreEvent::Loaded {
            count: loaded,
            skipped: skipped.len(),
        });
        Ok(LoadReport { loaded, skipped })
    }

    /// Submit a new patient and append the acknowledged record.
    pub async fn create(&self, draft: &PatientDraft) -> RecordResult<Patient> {
        let today = (self.today)();
        let draft = draft.normalized();
        draft.validate(today)?;
        let lease = self.require_session(Operation::Create)?;

        let remote = match self.api.create(&lease.credential, &draft).await {
            Ok(remote) => remote,
            Err(e) => return Err(self.remote_failure(Operation::Create, &lease, None, e)),
        };
        let patient = Patient::from_remote(remote, today)
            .map_err(|e| self.invalid_response(Operation::Create, e.into()))?;

        self.commit(Operation::Create, &lease, |cache| {
            match cache.position(&patient.id) {
                Some(index) => {
                    warn!(id = %patient.id, "Created id already cached, replacing entry");
                    cache.records[index] = patient.clone();
                }
                None => cache.records.push(patient.clone()),
            }
            cache.bump();
        })?;
        debug!(id = %patient.id, "Patient created");

        self.emit(StoreEvent::Created(patient.id.clone()));
        Ok(patient)
    }

    /// Replace an existing patient with the acknowledged result of `draft`.
    pub async fn update(&self, id: &PatientId, draft: &PatientDraft) -> RecordResult<Patient> {
        let today = (self.today)();
        let draft = draft.normalized();
        draft.validate(today)?;
        let lease = self.require_session(Operation::Update)?;

        if self.current_cache().position(id).is_none() {
            return Err(self.fail(Operation::Update, RecordError::NotFound(id.clone())));
        }
        let Some(_guard) = self.in_flight.acquire(id) else {
            return Err(self.fail(Operation::Update, RecordError::InFlight(id.clone())));
        };

        let remote = match self.api.update(&lease.credential, id, &draft).await {
            Ok(remote) => remote,
            Err(e) => return Err(self.remote_failure(Operation::Update, &lease, Some(id), e)),
        };
        let patient = Patient::from_remote(remote, today)
            .map_err(|e| self.invalid_response(Operation::Update, e.into()))?;
        if &patient.id != id {
            return Err(self.invalid_response(
                Operation::Update,
                RecordError::IdMismatch {
                    expected: id.clone(),
                    actual: patient.id.clone(),
                },
            ));
        }

        self.commit(Operation::Update, &lease, |cache| match cache.position(id) {
            Some(index) => {
                cache.records[index] = patient.clone();
                cache.bump();
            }
            // Removed by a reload while the call was in flight.
            None => debug!(%id, "Updated patient no longer cached, skipping cache write"),
        })?;

        self.emit(StoreEvent::Updated(id.clone()));
        Ok(patient)
    }

    /// Delete a patient remotely, then drop it from the cache.
    pub async fn delete(&self, id: &PatientId) -> RecordResult<()> {
        let lease = self.require_session(Operation::Delete)?;
        let Some(_guard) = self.in_flight.acquire(id) else {
            return Err(self.fail(Operation::Delete, RecordError::InFlight(id.clone())));
        };

        if let Err(e) = self.api.delete(&lease.credential, id).await {
            return Err(self.remote_failure(Operation::Delete, &lease, Some(id), e));
        }

        self.commit(Operation::Delete, &lease, |cache| {
            if let Some(index) = cache.position(id) {
                cache.records.remove(index);
                cache.bump();
            }
        })?;
        debug!(%id, "Patient deleted");

        self.emit(StoreEvent::Deleted(id.clone()));
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        let cache = self.current_cache();
        Snapshot {
            version: cache.version,
            records: cache.records.clone(),
        }
    }

    pub fn records(&self) -> Vec<Patient> {
        self.current_cache().records.clone()
    }

    pub fn get(&self, id: &PatientId) -> Option<Patient> {
        let cache = self.current_cache();
        cache.position(id).map(|index| cache.records[index].clone())
    }

    pub fn len(&self) -> usize {
        self.current_cache().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        self.current_cache().version
    }

    /// Whether a mutation on `id` is awaiting the record service.
    pub fn is_in_flight(&self, id: &PatientId) -> bool {
        self.in_flight.contains(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn require_session(&self, operation: Operation) -> RecordResult<SessionLease> {
        self.session
            .lease()
            .ok_or_else(|| self.fail(operation, RecordError::NoSession))
    }

    /// Apply `change` if the session that issued `lease` is still the active one.
    fn commit<T>(
        &self,
        operation: Operation,
        lease: &SessionLease,
        change: impl FnOnce(&mut Cache) -> T,
    ) -> RecordResult<T> {
        let mut cache = self.write_cache();
        if self.session.generation() != lease.generation {
            drop(cache);
            info!(%operation, "Session ended while the call was in flight, discarding result");
            return Err(self.fail(operation, RecordError::SessionEnded));
        }
        cache.adopt(lease.generation);
        Ok(change(&mut cache))
    }

    fn remote_failure(
        &self,
        operation: Operation,
        lease: &SessionLease,
        id: Option<&PatientId>,
        error: RemoteError,
    ) -> RecordError {
        let error = match (error, id) {
            (e, _) if e.is_auth_rejection() => {
                self.session.invalidate(&lease.credential);
                RecordError::Unauthorized
            }
            (RemoteError::NotFound, Some(id)) => RecordError::NotFound(id.clone()),
            (e, _) => RecordError::Remote(e),
        };
        self.fail(operation, error)
    }

    fn invalid_response(&self, operation: Operation, error: RecordError) -> RecordError {
        warn!(%operation, error = %error, "Discarding invalid record service response");
        self.fail(operation, error)
    }

    fn fail(&self, operation: Operation, error: RecordError) -> RecordError {
        warn!(%operation, error = %error, "Record operation failed");
        self.emit(StoreEvent::Failed {
            operation,
            error: error.clone(),
        });
        error
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    /// The cache as seen by the active session generation.
    fn current_cache(&self) -> std::sync::RwLockReadGuard<'_, Cache> {
        let generation = self.session.generation();
        {
            let cache = self.read_cache();
            if cache.generation == generation {
                return cache;
            }
        }
        self.write_cache().adopt(generation);
        self.read_cache()
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, Cache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, Cache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}
