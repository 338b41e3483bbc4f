use argon2::Error as ArgonError;
use warp::{
    Rejection, Reply,
    filters::{body::BodyDeserializeError, cors::CorsForbidden},
    http::{StatusCode, uri::InvalidUri},
    reject::{PayloadTooLarge, Reject, UnsupportedMediaType},
};

use tracing::{Level, event, instrument};

#[derive(Debug)]
pub enum Error {
    ParseError(std::num::ParseIntError),
    MissingParameters,
    WrongPassword,
    CannotDecryptToken,
    CannotIssueToken,
    Unauthorized,
    QuestionNotFound,
    ArgonLibraryError(ArgonError),
    DatabaseQueryError(sqlx::Error),
    MigrationError(sqlx::migrate::MigrateError),
    MultipartError(warp::Error),
    ImageStorageError(std::io::Error),
    InvalidLocation(InvalidUri),
    ConfigError(config::ConfigError),
    /// The session key must be exactly 32 bytes; carries the length we got.
    InvalidSecretKey(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::ParseError(err) => {
                write!(f, "Cannot parse parameter: {}", err)
            }
            Error::MissingParameters => {
                write!(f, "Missing parameters")
            }
            Error::WrongPassword => {
                write!(f, "Wrong password")
            }
            Error::CannotDecryptToken => {
                write!(f, "Cannot decrypt session")
            }
            Error::CannotIssueToken => {
                write!(f, "Cannot issue session")
            }
            Error::Unauthorized => {
                write!(f, "Admin session required")
            }
            Error::QuestionNotFound => {
                write!(f, "Question not found")
            }
            Error::ArgonLibraryError(_) => {
                write!(f, "Cannot verify password")
            }
            Error::DatabaseQueryError(_) => {
                write!(f, "Cannot update, invalid data.")
            }
            Error::MigrationError(err) => {
                write!(f, "Cannot run migrations: {}", err)
            }
            Error::MultipartError(err) => {
                write!(f, "Cannot read form data: {}", err)
            }
            Error::ImageStorageError(err) => {
                write!(f, "Cannot store image: {}", err)
            }
            Error::InvalidLocation(err) => {
                write!(f, "Invalid redirect location: {}", err)
            }
            Error::ConfigError(err) => {
                write!(f, "Invalid configuration: {}", err)
            }
            Error::InvalidSecretKey(len) => {
                write!(f, "Secret key must be 32 bytes, got {}", len)
            }
        }
    }
}

impl Reject for Error {}

#[instrument]
pub async fn return_error(r: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(crate::Error::DatabaseQueryError(e)) = r.find() {
        event!(Level::ERROR, "Database query error: {}", e);
        Ok(warp::reply::with_status(
            "Cannot update data".to_string(),
            StatusCode::UNPROCESSABLE_ENTITY,
        ))
    } else if let Some(crate::Error::QuestionNotFound) = r.find() {
        event!(Level::WARN, "Question not found");
        Ok(warp::reply::with_status(
            "Question not found".to_string(),
            StatusCode::NOT_FOUND,
        ))
    } else if let Some(crate::Error::WrongPassword) = r.find() {
        event!(Level::WARN, "Entered wrong admin password");
        Ok(warp::reply::with_status(
            "Wrong password".to_string(),
            StatusCode::FORBIDDEN,
        ))
    } else if let Some(crate::Error::Unauthorized) = r.find() {
        event!(Level::WARN, "Admin route without session");
        Ok(warp::reply::with_status(
            "Admin session required".to_string(),
            StatusCode::UNAUTHORIZED,
        ))
    } else if let Some(crate::Error::CannotDecryptToken) = r.find() {
        Ok(warp::reply::with_status(
            "Admin session required".to_string(),
            StatusCode::UNAUTHORIZED,
        ))
    } else if let Some(crate::Error::ImageStorageError(e)) = r.find() {
        event!(Level::ERROR, "{}", e);
        Ok(warp::reply::with_status(
            "Internal Server Error".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    } else if let Some(crate::Error::ArgonLibraryError(e)) = r.find() {
        event!(Level::ERROR, "{}", e);
        Ok(warp::reply::with_status(
            "Internal Server Error".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    } else if let Some(crate::Error::CannotIssueToken) = r.find() {
        event!(Level::ERROR, "Cannot issue session token");
        Ok(warp::reply::with_status(
            "Internal Server Error".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    } else if let Some(crate::Error::InvalidLocation(e)) = r.find() {
        event!(Level::ERROR, "{}", e);
        Ok(warp::reply::with_status(
            "Internal Server Error".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    } else if let Some(error) = r.find::<CorsForbidden>() {
        event!(Level::ERROR, "CORS forbidden error: {}", error);
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::FORBIDDEN,
        ))
    } else if let Some(error) = r.find::<BodyDeserializeError>() {
        event!(Level::ERROR, "Cannot deserialize request body: {}", error);
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::UNPROCESSABLE_ENTITY,
        ))
    } else if let Some(error) = r.find::<PayloadTooLarge>() {
        event!(Level::WARN, "{}", error);
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::PAYLOAD_TOO_LARGE,
        ))
    } else if let Some(error) = r.find::<UnsupportedMediaType>() {
        event!(Level::WARN, "{}", error);
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ))
    } else if let Some(error) = r.find::<Error>() {
        event!(Level::ERROR, "{}", error);
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::BAD_REQUEST,
        ))
    } else {
        event!(Level::WARN, "Requested route was not found");
        Ok(warp::reply::with_status(
            "Route not found".to_string(),
            StatusCode::NOT_FOUND,
        ))
    }
}
