//! Engine configuration
//!
//! The values here are owned by the embedding application (config loading
//! itself is out of scope); the engine consumes them read-only. The
//! backend flag decides whether sessions live purely in-process or are
//! checkpointed to an external archive between events.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum accepted session TTL
const MIN_TTL: Duration = Duration::from_secs(1);

/// Which session store backend the engine runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreBackend {
    /// Sessions live only in the process's own map
    #[default]
    InProcess,
    /// Sessions are additionally checkpointed to a [`SessionArchive`]
    ///
    /// [`SessionArchive`]: crate::SessionArchive
    External,
}

/// Configuration for the session engine
///
/// # Example
///
/// ```
/// use reverb_session::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.session_ttl(), Duration::from_secs(30 * 60));
///
/// let config = EngineConfig::default().with_session_ttl(Duration::from_secs(60));
/// assert_eq!(config.session_ttl(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long an idle session survives before the sweeper retires it
    ///
    /// Clamped to at least one second.
    session_ttl: Duration,
    /// Selected session store backend
    backend: StoreBackend,
}

impl EngineConfig {
    /// Create a configuration with the given TTL and backend
    pub fn new(session_ttl: Duration, backend: StoreBackend) -> Self {
        Self {
            session_ttl: session_ttl.max(MIN_TTL),
            backend,
        }
    }

    /// Replace the session TTL (clamped to at least one second)
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl.max(MIN_TTL);
        self
    }

    /// Replace the store backend
    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    /// The configured session TTL
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// The configured store backend
    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    /// How often the TTL sweeper wakes up
    ///
    /// A quarter of the TTL, kept between one second and one minute.
    pub fn sweep_interval(&self) -> Duration {
        (self.session_ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(30 * 60),
            backend: StoreBackend::InProcess,
        }
    }
}
