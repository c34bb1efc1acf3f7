use std::fmt;
use std::str::FromStr;

use cookie::Cookie;
use log::error;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for SessionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self).map_err(|_| ())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

fn tag(sid: &str, secret: &str) -> String {
    sha256::digest(format!("{sid}{secret}"))
}

/// Cookie value: the session id with a keyed digest appended,
/// so a client can't forge another session's id.
pub fn sign(session_id: &SessionId, secret: &str) -> String {
    let sid = session_id.to_string();
    let tag = tag(&sid, secret);
    format!("{sid}.{tag}")
}

pub fn verify(value: &str, secret: &str) -> Result<SessionId, ()> {
    let (sid, got) = value.split_once('.').ok_or(())?;

    if tag(sid, secret) != got {
        error!("session cookie failed signature check");
        return Err(());
    }

    SessionId::from_str(sid)
}

pub fn session_cookie(session_id: &SessionId, config: &Config) -> String {
    Cookie::build((config.cookie_name.clone(), sign(session_id, &config.session_secret)))
        .http_only(true)
        .secure(config.secure_cookies)
        .max_age(config.session_max_age)
        .path("/")
        .build()
        .to_string()
}

/// Pull our session cookie out of a raw Cookie header, if present
/// and untampered.
pub fn session_from_header(header: &str, config: &Config) -> Option<SessionId> {
    Cookie::split_parse(header)
        .filter_map(|c| c.ok())
        .find(|c| c.name() == config.cookie_name)
        .and_then(|c| verify(c.value(), &config.session_secret).ok())
}
