//! Constants
//!
//! TigerStyle: every limit and default has a name, a unit, and lives here.

// =============================================================================
// Transactional Backend
// =============================================================================

/// Default database name opened on the transactional engine
pub const DATABASE_NAME_DEFAULT: &str = "storage_js";

/// Default database schema version
pub const DATABASE_VERSION_DEFAULT: u32 = 1;

/// Default object store holding the key/value pairs
pub const STORE_NAME_DEFAULT: &str = "keyvaluepairs";

/// Maximum database or store name length in bytes
pub const NAME_BYTES_MAX: usize = 256;

// =============================================================================
// Flat Backend
// =============================================================================

/// Marker key of the envelope wrapping structured values in the flat engine
pub const ENVELOPE_MARKER_KEY: &str = "-moz-stringifier";

/// Default quota of the in-memory flat engine (5 MiB, same as common browsers)
pub const FLAT_QUOTA_BYTES_DEFAULT: usize = 5 * 1024 * 1024;

// =============================================================================
// Environment
// =============================================================================

/// Enables diagnostics output when set to a truthy value
pub const ENV_DEBUG: &str = "KVSHIM_DEBUG";

/// Overrides the database name
pub const ENV_DB_NAME: &str = "KVSHIM_DB_NAME";

/// Overrides the database version
pub const ENV_DB_VERSION: &str = "KVSHIM_DB_VERSION";

/// Overrides the object store name
pub const ENV_STORE_NAME: &str = "KVSHIM_STORE_NAME";

/// Selects the flat codec (`legacy` or `plain`)
pub const ENV_CODEC: &str = "KVSHIM_CODEC";

/// Disables the transactional backend when set to a truthy value
pub const ENV_FORCE_FLAT: &str = "KVSHIM_FORCE_FLAT";

// =============================================================================
// On-disk Layout
// =============================================================================

/// Snapshot file of the transactional engine inside the data directory
pub const OBJECT_STORE_FILE_NAME: &str = "object_store.json";

/// Backing file of the flat engine inside the data directory
pub const FLAT_STORE_FILE_NAME: &str = "flat_store.json";
