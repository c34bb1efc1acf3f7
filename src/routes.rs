use std::convert::Infallible;
use std::sync::Arc;

use log::error;
use serde::Serialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth;
use crate::creds::Credentials;
use crate::server::{BookClub, BookClubAuthed, Error};

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

#[derive(Serialize)]
struct Saved<T> {
    data: T,
}

pub fn routes(club: Arc<BookClub>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let register = warp::path!("api" / "register")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_club(Arc::clone(&club)))
        .and_then(handle_register);

    let login = warp::path!("api" / "login")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_club(Arc::clone(&club)))
        .and_then(handle_login);

    let users = warp::path!("api" / "users")
        .and(warp::get())
        .and(authenticated(club))
        .and_then(handle_users);

    register
        .or(login)
        .or(users)
        .recover(handle_rejection)
        .with(warp::reply::with::header(
            "x-content-type-options",
            "nosniff",
        ))
        .with(warp::reply::with::header("x-frame-options", "DENY"))
        .with(warp::reply::with::header("x-xss-protection", "0"))
        .with(warp::log("bookclub"))
}

fn with_club(
    club: Arc<BookClub>,
) -> impl Filter<Extract = (Arc<BookClub>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&club))
}

/// The gate in front of /api/users: a request only reaches its
/// handler with a cookie naming a live, logged-in session.
fn authenticated(
    club: Arc<BookClub>,
) -> impl Filter<Extract = (BookClubAuthed,), Error = Rejection> + Clone {
    warp::header::optional::<String>("cookie")
        .and(with_club(club))
        .and_then(|header: Option<String>, club: Arc<BookClub>| async move {
            let session_id = header
                .as_deref()
                .and_then(|h| auth::session_from_header(h, club.config()));

            let Some(session_id) = session_id else {
                return Err(warp::reject::custom(Error::Unauthorized));
            };

            club.authenticate(session_id)
                .await
                .map_err(warp::reject::custom)
        })
}

async fn handle_register(
    credentials: Credentials,
    club: Arc<BookClub>,
) -> Result<impl Reply, Rejection> {
    let member = club
        .register(credentials)
        .await
        .map_err(warp::reject::custom)?;

    Ok(warp::reply::with_status(
        warp::reply::json(&Saved { data: member }),
        StatusCode::CREATED,
    ))
}

async fn handle_login(
    credentials: Credentials,
    club: Arc<BookClub>,
) -> Result<impl Reply, Rejection> {
    let session_id = club.login(credentials).await.map_err(warp::reject::custom)?;

    let cookie = auth::session_cookie(&session_id, club.config());

    Ok(warp::reply::with_header(
        warp::reply::json(&Message {
            message: "Welcome!",
        }),
        "set-cookie",
        cookie,
    ))
}

async fn handle_users(authed: BookClubAuthed) -> Result<impl Reply, Rejection> {
    let members = authed.members().await.map_err(warp::reject::custom)?;

    Ok(warp::reply::json(&members))
}

/// Every rejection lands here, so each request resolves to
/// exactly one json response.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(e) = err.find::<Error>() {
        let status: StatusCode = e.into();
        let body = match e {
            Error::UsernameTaken => json!({ "message": "That username is already taken." }),
            Error::Unauthorized => json!({ "message": "You shall not pass!" }),
            Error::Internal(msg) => json!({ "error": msg }),
        };
        (status, body)
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, json!({ "message": "no such route" }))
    } else if err.find::<warp::body::BodyDeserializeError>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            json!({ "message": "couldn't parse request body" }),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "message": "method not allowed" }),
        )
    } else {
        error!("unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "internal error" }),
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

#[cfg(test)]
mod test {
    use super::*;

    use serde_json::Value;
    use warp::test::RequestBuilder;

    use crate::auth::SessionId;
    use crate::backend::{self, Backend};
    use crate::config::Config;
    use crate::session::SessionData;
    use crate::time::Timestamp;

    const SECRET: &str = "test secret";

    fn test_config() -> Config {
        Config {
            cookie_name: "book".to_string(),
            session_secret: SECRET.to_string(),
            secure_cookies: false,
            hash_rounds: 4,
            session_max_age: ::time::Duration::minutes(5),
            purge_interval: ::time::Duration::minutes(30),
        }
    }

    async fn create_club() -> (Arc<BookClub>, Backend) {
        let db = backend::test::create_db().await;
        let club = Arc::new(BookClub::new(db.clone(), test_config()));
        (club, db)
    }

    fn post_creds(path: &str, username: &str, password: &str) -> RequestBuilder {
        warp::test::request()
            .method("POST")
            .path(path)
            .json(&json!({ "username": username, "password": password }))
    }

    fn register(username: &str, password: &str) -> RequestBuilder {
        post_creds("/api/register", username, password)
    }

    fn login(username: &str, password: &str) -> RequestBuilder {
        post_creds("/api/login", username, password)
    }

    fn body_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn register_saves_member_without_hash() {
        let (club, db) = create_club().await;
        let api = routes(club);

        let res = register("alice", "secret1").reply(&api).await;

        assert_eq!(res.status(), 201);
        assert_eq!(
            body_json(res.body()),
            json!({ "data": { "username": "alice" } })
        );

        let user = db.find_user("alice").await.unwrap().unwrap();
        assert_ne!(user.pwhash, "secret1");
    }

    #[tokio::test]
    async fn register_duplicate_username() {
        let (club, _db) = create_club().await;
        let api = routes(club);

        let res = register("alice", "secret1").reply(&api).await;
        assert_eq!(res.status(), 201);

        let res = register("alice", "secret2").reply(&api).await;
        assert_eq!(res.status(), 500);
        assert_eq!(
            body_json(res.body()),
            json!({ "message": "That username is already taken." })
        );
    }

    #[tokio::test]
    async fn login_matrix() {
        let (club, _db) = create_club().await;
        let api = routes(club);

        register("alice", "secret1").reply(&api).await;

        let res = login("alice", "secret1").reply(&api).await;
        assert_eq!(res.status(), 200);
        assert_eq!(body_json(res.body()), json!({ "message": "Welcome!" }));

        let cookie = res.headers()["set-cookie"].to_str().unwrap();
        assert!(cookie.starts_with("book="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=300"));
        assert!(!cookie.contains("Secure"));

        // wrong password and unknown user read the same
        let denied = json!({ "message": "You shall not pass!" });

        let res = login("alice", "wrong").reply(&api).await;
        assert_eq!(res.status(), 401);
        assert_eq!(body_json(res.body()), denied);

        let res = login("mallory", "secret1").reply(&api).await;
        assert_eq!(res.status(), 401);
        assert_eq!(body_json(res.body()), denied);
    }

    #[tokio::test]
    async fn users_requires_session() {
        let (club, _db) = create_club().await;
        let api = routes(club);

        register("alice", "secret1").reply(&api).await;

        let res = warp::test::request().path("/api/users").reply(&api).await;
        assert_eq!(res.status(), 401);

        let res = login("alice", "secret1").reply(&api).await;
        let cookie = res.headers()["set-cookie"].to_str().unwrap();
        let pair = cookie.split(';').next().unwrap().to_string();

        let res = warp::test::request()
            .path("/api/users")
            .header("cookie", pair)
            .reply(&api)
            .await;

        assert_eq!(res.status(), 200);
        assert_eq!(body_json(res.body()), json!([{ "username": "alice" }]));
    }

    #[tokio::test]
    async fn users_rejects_forged_cookie() {
        let (club, _db) = create_club().await;
        let api = routes(club);

        register("alice", "secret1").reply(&api).await;
        login("alice", "secret1").reply(&api).await;

        let res = warp::test::request()
            .path("/api/users")
            .header("cookie", "book=garbage")
            .reply(&api)
            .await;

        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn users_rejects_expired_session() {
        let (club, db) = create_club().await;
        let api = routes(club);

        register("alice", "secret1").reply(&api).await;

        let stale = SessionId::new();
        db.create_session(
            &stale.to_string(),
            &SessionData {
                logged_in: true,
                username: "alice".to_string(),
            },
            Timestamp::from_i64(1),
        )
        .await
        .unwrap();

        let res = warp::test::request()
            .path("/api/users")
            .header("cookie", format!("book={}", auth::sign(&stale, SECRET)))
            .reply(&api)
            .await;

        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (club, _db) = create_club().await;
        let api = routes(club);

        let res = warp::test::request()
            .method("POST")
            .path("/api/register")
            .header("content-type", "application/json")
            .body("{")
            .reply(&api)
            .await;

        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let (club, _db) = create_club().await;
        let api = routes(club);

        let res = warp::test::request().path("/nowhere").reply(&api).await;

        assert_eq!(res.status(), 404);
        assert_eq!(res.headers()["x-content-type-options"], "nosniff");
        assert_eq!(res.headers()["x-frame-options"], "DENY");
    }
}
