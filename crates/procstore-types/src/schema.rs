//! Canonical schema constants for structured logging
//!
//! Every boot-time event uses these keys so migration and repair logs can be
//! filtered the same way regardless of which store produced them.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Boot entities
pub const FIELD_REPOSITORY: &str = "repository";
pub const FIELD_UNIT: &str = "unit";
pub const FIELD_PROCEDURE: &str = "procedure";
pub const FIELD_TABLE: &str = "table";
pub const FIELD_FINGERPRINT: &str = "fingerprint";

// Counters
pub const FIELD_APPLIED: &str = "applied";
pub const FIELD_ROWS: &str = "rows";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
