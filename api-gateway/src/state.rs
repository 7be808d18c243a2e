//! Shared application state.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ledger::{AdminStore, RateTiers, TokenService, VotingMachine};

/// Shared state held by the API and background tasks.
///
/// This is wrapped in an [`Arc`] and passed to request handlers via
/// Axum's `State` extractor. The voting machine is the only access path
/// to voting state; handlers never reach around it.
pub struct AppState {
    /// The voting state machine (registries, pending buffer, chain).
    pub machine: Arc<VotingMachine>,
    /// Bearer-token issue/validate/refresh.
    pub tokens: TokenService,
    /// Admin credential store, seeded at boot.
    pub admins: AdminStore,
    /// The three rate-limit tiers, shared with the sweeper task.
    pub tiers: RateTiers,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;

/// Returns the current wall-clock time as seconds since Unix epoch.
///
/// This is the only clock source in the gateway; the core takes `now`
/// values as parameters.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}
