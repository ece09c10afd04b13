//! Shared server state: the sampler, the database and the token issuer.

use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::metrics::Sampler;
use crate::probe::HostProbe;
use crate::store::Database;

/// One sampler serves the live endpoint, the save endpoint and the
/// optional collector, so they share one counter store.
pub type SharedSampler = Arc<Sampler<Box<dyn HostProbe>>>;

#[derive(Clone)]
pub struct AppState {
    pub sampler: SharedSampler,
    pub db: Arc<Database>,
    pub tokens: Arc<TokenIssuer>,
    // required as `?token=` on the save endpoint when set
    pub collect_token: Option<String>,
}

impl AppState {
    pub fn new(sampler: Sampler<Box<dyn HostProbe>>, db: Database, tokens: TokenIssuer) -> Self {
        Self {
            sampler: Arc::new(sampler),
            db: Arc::new(db),
            tokens: Arc::new(tokens),
            collect_token: None,
        }
    }

    pub fn with_collect_token(mut self, token: Option<String>) -> Self {
        self.collect_token = token;
        self
    }
}
