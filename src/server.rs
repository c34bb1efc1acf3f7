use std::sync::Arc;

use log::{debug, error, info, trace};
use warp::http;

use crate::auth::SessionId;
use crate::backend::{Backend, StoreError};
use crate::config::Config;
use crate::creds::{self, Credentials};
use crate::session::SessionData;
use crate::time::Timestamp;
use crate::user::Member;

#[derive(Debug)]
pub struct BookClub {
    backend: Backend,
    config: Config,
}

/// Only obtainable via [`BookClub::authenticate`], so anything
/// reachable from here sits behind the session check.
#[derive(Debug)]
pub struct BookClubAuthed {
    club: Arc<BookClub>,
    username: String,
}

#[derive(Debug)]
pub enum Error {
    Internal(String),
    Unauthorized,
    UsernameTaken,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Into<http::StatusCode> for &Error {
    fn into(self) -> http::StatusCode {
        match self {
            Error::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthorized => http::StatusCode::UNAUTHORIZED,
            // clients expect a 500 here, not a 409
            Error::UsernameTaken => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl warp::reject::Reject for Error {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate => Self::UsernameTaken,
            StoreError::Other(msg) => Self::Internal(msg),
        }
    }
}

impl BookClub {
    pub fn new(backend: Backend, config: Config) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn register(&self, credentials: Credentials) -> Result<Member> {
        let Credentials { username, password } = credentials;

        let pwhash = creds::hash_password(&password, self.config.hash_rounds)
            .map_err(|()| Error::Internal("couldn't hash password".to_string()))?;

        let user = self.backend.add_user(&username, &pwhash).await?;

        info!("{} registered", user.username);
        Ok(user.into())
    }

    pub async fn login(&self, credentials: Credentials) -> Result<SessionId> {
        let Some(user) = self.backend.find_user(&credentials.username).await? else {
            // same response as a wrong password, to avoid
            // confirming which usernames exist
            error!("rejecting login for unknown user {}", credentials.username);
            return Err(Error::Unauthorized);
        };

        if !creds::verify_password(&credentials.password, &user.pwhash) {
            error!("wrong password for user {}", user.username);
            return Err(Error::Unauthorized);
        }

        let session_id = SessionId::new();
        let expires = now()?.plus(self.config.session_max_age);
        let data = SessionData {
            logged_in: true,
            username: user.username.clone(),
        };

        self.backend
            .create_session(&session_id.to_string(), &data, expires)
            .await?;

        info!("{} login: new session created", user.username);
        Ok(session_id)
    }

    pub async fn authenticate(self: &Arc<Self>, session_id: SessionId) -> Result<BookClubAuthed> {
        let now = now()?;

        let data = self
            .backend
            .find_session(&session_id.to_string(), now)
            .await?;

        match data {
            Some(session) if session.logged_in => {
                debug!("found session for {}", session.username);
                Ok(BookClubAuthed {
                    club: Arc::clone(self),
                    username: session.username,
                })
            }
            Some(_) => {
                error!("session {session_id} isn't logged in");
                Err(Error::Unauthorized)
            }
            None => {
                error!("no live session {session_id}");
                Err(Error::Unauthorized)
            }
        }
    }
}

impl BookClubAuthed {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn members(&self) -> Result<Vec<Member>> {
        trace!("{} listing members", self.username);

        let users = self.club.backend.list_users().await?;

        Ok(users.into_iter().map(Member::from).collect())
    }
}

fn now() -> Result<Timestamp> {
    Timestamp::now().map_err(|()| Error::Internal("couldn't get time".to_string()))
}
