use chrono::prelude::*;
use serde::{Deserialize, Serialize};

/// Claims of an admin session token. Only a password match issues one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub exp: DateTime<Utc>,
    pub nbf: DateTime<Utc>,
    pub sid: String,
}
