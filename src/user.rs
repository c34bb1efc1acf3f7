use serde::Serialize;

#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub username: String,
    pub pwhash: String,
}

/// What user-facing responses serialise to. The stored hash
/// never leaves the server.
#[derive(Debug, Serialize)]
pub struct Member {
    pub username: String,
}

impl From<User> for Member {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
        }
    }
}
