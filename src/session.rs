use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::time::Timestamp;

/// What we persist per session, as a json blob alongside its
/// expiry. Looked up on every authenticated request.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionData {
    pub logged_in: bool,
    pub username: String,
}

/// Expired rows are already invisible to lookups; this just stops
/// them accumulating.
pub fn spawn_purge(backend: Backend, every: ::time::Duration) {
    let period = std::time::Duration::from_secs(every.whole_seconds().max(1) as u64);

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.tick().await; // completes immediately

        loop {
            tick.tick().await;

            let Ok(now) = Timestamp::now() else {
                continue;
            };

            match backend.delete_expired_sessions(now).await {
                Ok(0) => {}
                Ok(n) => debug!("purged {n} expired sessions"),
                Err(e) => error!("session purge failed: {e:?}"),
            }
        }
    });
}
