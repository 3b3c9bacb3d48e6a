//! SQLite schema definition.

/// Complete database schema for persisted dashboard state.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Key/value state (survives restarts of the host shell)
-- ============================================================================

CREATE TABLE IF NOT EXISTS kv_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
