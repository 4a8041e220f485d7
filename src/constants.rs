//! System-wide constants for the podcast orchestration core.
//!
//! Stage identifiers match the names recorded on `task_instance` rows so that
//! operators can correlate API responses, logs, and database state.

/// Stage identifiers for the fixed generation pipeline.
pub mod stage_names {
    /// Web content harvesting stage.
    pub const HARVEST: &str = "WCHA";
    /// Podcast script weaving stage.
    pub const SCRIPT: &str = "PSWA";
    /// Voice synthesis stage.
    pub const VOICE: &str = "VFA";
    /// Audio stream feeder notification stage.
    pub const NOTIFY: &str = "ASF_NOTIFY";
}

/// Task names for top-level and auxiliary collaborator operations.
pub mod operation_names {
    pub const GENERATE_PODCAST: &str = "generate_podcast";
    pub const TOPIC_DISCOVERY: &str = "TOPIC_DISCOVERY";
    pub const SNIPPET_CRAFT: &str = "SNIPPET_CRAFT";
}

/// HTTP headers carried on every internal stage call.
pub mod headers {
    pub const IDEMPOTENCY_KEY: &str = "X-Idempotency-Key";
    pub const WORKFLOW_ID: &str = "X-Workflow-ID";
}

/// Default tuning values, overridable through configuration.
pub mod defaults {
    /// Seconds after which a PROCESSING idempotency lock is considered stale.
    pub const LOCK_TIMEOUT_SECONDS: u64 = 300;
    /// Submit retry budget for collaborator calls.
    pub const MAX_RETRIES: u32 = 3;
    /// Base factor for exponential submit backoff, in seconds.
    pub const BACKOFF_FACTOR: f64 = 0.5;
    /// Milliseconds between status-URL polls.
    pub const POLL_INTERVAL_MS: u64 = 500;
    /// Milliseconds before a polling loop gives up.
    pub const POLL_TIMEOUT_MS: u64 = 120_000;
    /// Seconds before an individual HTTP request times out.
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
}
