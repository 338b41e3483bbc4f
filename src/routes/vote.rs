use std::collections::HashMap;
use tracing::{Level, event, instrument};

use crate::routes::see_other;
use crate::store::Store;
use crate::types::question::{ChoiceId, QuestionId};

/// Records one vote. A choice that does not belong to the question is
/// skipped quietly and the visitor still lands on the result page.
#[instrument(skip(store))]
pub async fn add_vote(
    id: i32,
    store: Store,
    params: HashMap<String, String>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if store.get_question(QuestionId(id)).await?.is_none() {
        return Err(warp::reject::custom(handle_errors::Error::QuestionNotFound));
    }

    let choice_id = params
        .get("choice")
        .ok_or(handle_errors::Error::MissingParameters)?
        .trim()
        .parse::<i32>()
        .map_err(handle_errors::Error::ParseError)?;

    if store.add_vote(QuestionId(id), ChoiceId(choice_id)).await? {
        event!(Level::INFO, question_id = id, choice_id, "vote recorded");
    } else {
        event!(Level::WARN, question_id = id, choice_id, "vote for unknown choice ignored");
    }

    see_other(format!("/result/{}", id))
}
