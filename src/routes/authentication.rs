use chrono::prelude::*;
use rand::Rng;
use std::collections::HashMap;
use std::future;
use tracing::{Level, event, instrument};
use warp::Filter;
use warp::http::{Uri, header::SET_COOKIE};

use crate::store::Store;
use crate::types::page::{ModerationQueue, Page};
use crate::types::session::Session;

pub const SESSION_COOKIE: &str = "session";

/// Everything needed to issue and check admin sessions. The admin password
/// is only kept as an argon2 hash.
#[derive(Clone)]
pub struct Auth {
    key: Vec<u8>,
    password_hash: String,
    lifetime: chrono::Duration,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl Auth {
    pub fn new(
        secret_key: &str,
        admin_password: &str,
        lifetime: chrono::Duration,
    ) -> Result<Self, handle_errors::Error> {
        if secret_key.len() != 32 {
            return Err(handle_errors::Error::InvalidSecretKey(secret_key.len()));
        }
        Ok(Auth {
            key: secret_key.as_bytes().to_vec(),
            password_hash: hash_password(admin_password.as_bytes())?,
            lifetime,
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Session, handle_errors::Error> {
        let token = paseto::tokens::validate_local_token(
            token,
            None,
            &self.key,
            &paseto::tokens::TimeBackend::Chrono,
        )
        .map_err(|_| handle_errors::Error::CannotDecryptToken)?;

        serde_json::from_value::<Session>(token)
            .map_err(|_| handle_errors::Error::CannotDecryptToken)
    }

    pub fn issue_token(&self) -> Result<String, handle_errors::Error> {
        let now = Utc::now();
        let dt = now + self.lifetime;

        paseto::tokens::PasetoBuilder::new()
            .set_encryption_key(&self.key)
            .set_expiration(&dt)
            .set_not_before(&now)
            .set_claim("sid", serde_json::json!(uuid::Uuid::new_v4().to_simple().to_string()))
            .build()
            .map_err(|_| handle_errors::Error::CannotIssueToken)
    }

    fn verify_password(&self, password: &[u8]) -> Result<bool, handle_errors::Error> {
        argon2::verify_encoded(&self.password_hash, password)
            .map_err(handle_errors::Error::ArgonLibraryError)
    }

    fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            self.lifetime.num_seconds()
        )
    }
}

pub fn hash_password(password: &[u8]) -> Result<String, handle_errors::Error> {
    let salt = rand::thread_rng().r#gen::<[u8; 32]>();
    let config = argon2::Config::default();
    argon2::hash_encoded(password, &salt, &config).map_err(handle_errors::Error::ArgonLibraryError)
}

/// The admin session of the request, if its cookie holds a valid token.
pub fn session(
    auth: Auth,
) -> impl Filter<Extract = (Option<Session>,), Error = std::convert::Infallible> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE)
        .map(move |token: Option<String>| {
            token.and_then(|token| match auth.verify_token(&token) {
                Ok(session) => Some(session),
                Err(_) => {
                    event!(Level::DEBUG, "ignoring invalid session cookie");
                    None
                }
            })
        })
}

/// Rejects with `Unauthorized` unless the request carries an admin session.
pub fn admin(auth: Auth) -> impl Filter<Extract = (Session,), Error = warp::Rejection> + Clone {
    session(auth).and_then(|session: Option<Session>| {
        future::ready(session.ok_or_else(|| warp::reject::custom(handle_errors::Error::Unauthorized)))
    })
}

#[instrument(skip(store))]
pub async fn admin_page(
    session: Option<Session>,
    store: Store,
) -> Result<warp::reply::Response, warp::Rejection> {
    use warp::Reply;

    match session {
        Some(_) => {
            let unapproved = store.get_questions_by_approval(false).await?;
            let approved = store.get_questions_by_approval(true).await?;
            Ok(warp::reply::json(&ModerationQueue { unapproved, approved }).into_response())
        }
        None => Ok(warp::reply::json(&Page { page: "admin_login" }).into_response()),
    }
}

#[instrument(skip(auth, form))]
pub async fn login(
    session: Option<Session>,
    auth: Auth,
    form: HashMap<String, String>,
) -> Result<warp::reply::Response, warp::Rejection> {
    use warp::Reply;

    let admin = Uri::from_static("/admin");
    if session.is_some() {
        return Ok(warp::redirect::see_other(admin).into_response());
    }

    let password = form
        .get("password")
        .ok_or(handle_errors::Error::MissingParameters)?;

    if auth.verify_password(password.as_bytes())? {
        let token = auth.issue_token()?;
        event!(Level::INFO, "admin logged in");
        Ok(warp::reply::with_header(
            warp::redirect::see_other(admin),
            SET_COOKIE,
            auth.session_cookie(&token),
        )
        .into_response())
    } else {
        Err(warp::reject::custom(handle_errors::Error::WrongPassword))
    }
}

pub async fn logout() -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::with_header(
        warp::redirect::see_other(Uri::from_static("/")),
        SET_COOKIE,
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE),
    ))
}
