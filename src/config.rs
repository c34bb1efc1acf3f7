use std::env;

use log::warn;
use time::Duration;

const DEFAULT_SECRET: &str = "So many books, so little time";
const DEFAULT_ROUNDS: u32 = 4;

/// Built once at startup and injected into the server,
/// rather than read from the environment at request time.
#[derive(Debug, Clone)]
pub struct Config {
    pub cookie_name: String,
    pub session_secret: String,
    pub secure_cookies: bool,
    pub hash_rounds: u32,
    pub session_max_age: Duration,
    pub purge_interval: Duration,
}

impl Config {
    pub fn from_env(secure_flag: bool) -> Self {
        let session_secret =
            env::var("SESSION_SECRET").unwrap_or_else(|_| DEFAULT_SECRET.to_string());

        let secure_cookies = secure_flag
            || env::var("USE_SECURE_COOKIES")
                .map(|v| matches!(&*v, "1" | "true" | "yes"))
                .unwrap_or(false);

        let hash_rounds = match env::var("HASH_ROUNDS") {
            Ok(v) => match v.parse() {
                // bcrypt only accepts costs in 4..=31
                Ok(n) if (4..=31).contains(&n) => n,
                _ => {
                    warn!("ignoring invalid HASH_ROUNDS {v:?}");
                    DEFAULT_ROUNDS
                }
            },
            Err(_) => DEFAULT_ROUNDS,
        };

        Self {
            cookie_name: "book".to_string(),
            session_secret,
            secure_cookies,
            hash_rounds,
            session_max_age: Duration::minutes(5),
            purge_interval: Duration::minutes(30),
        }
    }
}
