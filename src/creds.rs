use log::error;
use serde::Deserialize;

/// What register and login bodies deserialise into, before any
/// handler logic runs.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One-way, salted. `rounds` is the bcrypt cost factor.
pub fn hash_password(plain: &str, rounds: u32) -> Result<String, ()> {
    bcrypt::hash(plain, rounds).map_err(|e| {
        error!("couldn't hash password: {e:?}");
    })
}

pub fn verify_password(plain: &str, pwhash: &str) -> bool {
    match bcrypt::verify(plain, pwhash) {
        Ok(matched) => matched,
        Err(e) => {
            error!("couldn't verify password against stored hash: {e:?}");
            false
        }
    }
}
