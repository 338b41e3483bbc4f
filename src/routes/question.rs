use chrono::Utc;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use tracing::{Level, event, instrument};
use warp::multipart::FormData;

use crate::images::ImageStore;
use crate::routes::form::{Upload, read_form};
use crate::routes::see_other;
use crate::store::Store;
use crate::types::page::{AuthorPage, CategoryPage, Page, ResultView, SearchResults};
use crate::types::question::{Question, QuestionId, recent_cutoff};
use crate::types::session::Session;

/// Path segments arrive percent-encoded.
fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

async fn load_question(store: &Store, id: i32) -> Result<Question, warp::Rejection> {
    match store.get_question(QuestionId(id)).await? {
        Some(question) => Ok(question),
        None => Err(warp::reject::custom(handle_errors::Error::QuestionNotFound)),
    }
}

async fn save_image(images: &ImageStore, upload: Option<&Upload>) -> Result<Option<String>, warp::Rejection> {
    match upload {
        Some(upload) => Ok(Some(images.save(&upload.filename, &upload.data).await?)),
        None => Ok(None),
    }
}

/// Drops a file saved for a request that did not go through.
async fn discard_image(images: &ImageStore, image_path: Option<String>) {
    if let Some(image_path) = image_path {
        if let Err(e) = images.remove(&image_path).await {
            event!(Level::WARN, image_path = %image_path, "cannot discard image: {}", e);
        }
    }
}

#[instrument(skip(store))]
pub async fn get_recent_questions(
    store: Store,
    recent_days: i64,
) -> Result<impl warp::Reply, warp::Rejection> {
    event!(target: "poll_board", Level::INFO, "querying recent questions");
    let since = recent_cutoff(Utc::now(), recent_days);
    match store.get_recent_questions(since).await {
        Ok(res) => Ok(warp::reply::json(&res)),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub async fn submit_page() -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&Page { page: "submit" }))
}

#[instrument(skip(store, images, form))]
pub async fn add_question(
    store: Store,
    images: ImageStore,
    form: FormData,
) -> Result<impl warp::Reply, warp::Rejection> {
    let form = read_form(form).await?;
    let mut new_question = form.new_question(None)?;
    new_question.image_path = save_image(&images, form.image.as_ref()).await?;

    let image_path = new_question.image_path.clone();
    let question = match store.add_question(new_question).await {
        Ok(question) => question,
        Err(e) => {
            discard_image(&images, image_path).await;
            return Err(warp::reject::custom(e));
        }
    };
    event!(
        Level::INFO,
        question_id = question.id.0,
        choices = question.choices.len(),
        "question submitted"
    );
    see_other("/thank_you".to_string())
}

#[instrument(skip(store))]
pub async fn get_ballot(id: i32, store: Store) -> Result<impl warp::Reply, warp::Rejection> {
    let question = load_question(&store, id).await?;
    Ok(warp::reply::json(&question))
}

#[instrument(skip(store))]
pub async fn get_result(id: i32, store: Store) -> Result<impl warp::Reply, warp::Rejection> {
    let question = load_question(&store, id).await?;
    Ok(warp::reply::json(&ResultView::from(question)))
}

#[instrument(skip(store))]
pub async fn get_edit_form(
    id: i32,
    _session: Session,
    store: Store,
) -> Result<impl warp::Reply, warp::Rejection> {
    let question = load_question(&store, id).await?;
    Ok(warp::reply::json(&question))
}

/// Saves the admin edit and approves the question, whatever its state was.
/// A replaced image stays on disk.
#[instrument(skip(store, images, form))]
pub async fn update_question(
    id: i32,
    session: Session,
    store: Store,
    images: ImageStore,
    form: FormData,
) -> Result<impl warp::Reply, warp::Rejection> {
    load_question(&store, id).await?;

    let form = read_form(form).await?;
    let edit = form.question_edit()?;
    let image_path = save_image(&images, form.image.as_ref()).await?;

    match store.update_question(QuestionId(id), &edit, image_path.clone()).await {
        Ok(Some(question)) => {
            event!(Level::INFO, question_id = question.id.0, sid = %session.sid, "question approved");
            see_other("/admin".to_string())
        }
        Ok(None) => {
            discard_image(&images, image_path).await;
            Err(warp::reject::custom(handle_errors::Error::QuestionNotFound))
        }
        Err(e) => {
            discard_image(&images, image_path).await;
            Err(warp::reject::custom(e))
        }
    }
}

#[instrument(skip(store, images))]
pub async fn delete_question(
    id: i32,
    session: Session,
    store: Store,
    images: ImageStore,
) -> Result<impl warp::Reply, warp::Rejection> {
    let question = match store.delete_question(QuestionId(id)).await? {
        Some(question) => question,
        None => return Err(warp::reject::custom(handle_errors::Error::QuestionNotFound)),
    };

    if let Some(image_path) = &question.image_path {
        images.remove(image_path).await?;
    }
    event!(Level::INFO, question_id = id, sid = %session.sid, "question deleted");
    see_other("/admin".to_string())
}

#[instrument(skip(store))]
pub async fn search_questions(
    params: HashMap<String, String>,
    store: Store,
) -> Result<impl warp::Reply, warp::Rejection> {
    let keyword = params.get("q").cloned().unwrap_or_default();
    let results = if keyword.is_empty() {
        Vec::new()
    } else {
        store.search_questions(&keyword).await?
    };
    Ok(warp::reply::json(&SearchResults { keyword, results }))
}

#[instrument(skip(store))]
pub async fn get_author_questions(
    author: String,
    store: Store,
) -> Result<impl warp::Reply, warp::Rejection> {
    let author = decode_segment(&author);
    let questions = store.get_questions_by_author(&author).await?;
    Ok(warp::reply::json(&AuthorPage { author, questions }))
}

#[instrument(skip(store))]
pub async fn get_category_questions(
    category: String,
    store: Store,
) -> Result<impl warp::Reply, warp::Rejection> {
    let category = decode_segment(&category);
    let questions = store.get_questions_by_category(&category).await?;
    Ok(warp::reply::json(&CategoryPage { category, questions }))
}
