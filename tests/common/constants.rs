//! Shared constants for end-to-end tests

/// Job class that returns its params as the result.
pub const ECHO_CLASS: &str = "builtin.Echo";

/// Job class that sleeps for `seconds` and honours interrupts.
pub const SLEEP_CLASS: &str = "builtin.Sleep";

/// Job id attached to every test trigger.
pub const TEST_JOB_ID: &str = "job-1";

/// Worker pool size of the test server.
pub const TEST_WORKERS: usize = 2;

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for a server to become ready.
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness and state polls.
pub const POLL_INTERVAL_MS: u64 = 20;

/// Maximum time to wait for an asynchronous condition in a test.
pub const CONDITION_TIMEOUT_MS: u64 = 5000;

/// Request timeout of the test client.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// First retry interval of the test notifier.
pub const TEST_RETRY_INIT_MS: u64 = 50;
