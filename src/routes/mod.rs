use handle_errors::return_error;
use warp::{Filter, http::Method, http::Uri};

use crate::images::ImageStore;
use crate::routes::authentication::Auth;
use crate::store::Store;

pub mod authentication;
pub mod form;
pub mod pages;
pub mod question;
pub mod vote;

const FORM_LIMIT: u64 = 16 * 1024;

pub(crate) fn see_other(location: String) -> Result<impl warp::Reply, warp::Rejection> {
    let uri = location
        .parse::<Uri>()
        .map_err(handle_errors::Error::InvalidLocation)?;
    Ok(warp::redirect::see_other(uri))
}

/// The whole HTTP surface, errors recovered into responses.
pub fn routes(
    store: Store,
    images: ImageStore,
    auth: Auth,
    recent_days: i64,
    max_upload_bytes: u64,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let store_filter = warp::any().map(move || store.clone());
    let images_filter = warp::any().map(move || images.clone());
    let auth_filter = {
        let auth = auth.clone();
        warp::any().map(move || auth.clone())
    };
    let recent_days_filter = warp::any().map(move || recent_days);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("Content-Type")
        .allow_methods(&[Method::GET, Method::POST]);

    let home = warp::get()
        .and(warp::path::end())
        .and(store_filter.clone())
        .and(recent_days_filter)
        .and_then(question::get_recent_questions);

    let submit_page = warp::get()
        .and(warp::path("submit"))
        .and(warp::path::end())
        .and_then(question::submit_page);

    let add_question = warp::post()
        .and(warp::path("submit"))
        .and(warp::path::end())
        .and(store_filter.clone())
        .and(images_filter.clone())
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and_then(question::add_question);

    let get_ballot = warp::get()
        .and(warp::path("vote"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(store_filter.clone())
        .and_then(question::get_ballot);

    let add_vote = warp::post()
        .and(warp::path("vote"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(store_filter.clone())
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form())
        .and_then(vote::add_vote);

    let get_result = warp::get()
        .and(warp::path("result"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(store_filter.clone())
        .and_then(question::get_result);

    let get_edit_form = warp::get()
        .and(warp::path("edit"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(authentication::admin(auth.clone()))
        .and(store_filter.clone())
        .and_then(question::get_edit_form);

    let update_question = warp::post()
        .and(warp::path("edit"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(authentication::admin(auth.clone()))
        .and(store_filter.clone())
        .and(images_filter.clone())
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and_then(question::update_question);

    let delete_question = warp::post()
        .and(warp::path("delete"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(authentication::admin(auth.clone()))
        .and(store_filter.clone())
        .and(images_filter)
        .and_then(question::delete_question);

    let admin_page = warp::get()
        .and(warp::path("admin"))
        .and(warp::path::end())
        .and(authentication::session(auth.clone()))
        .and(store_filter.clone())
        .and_then(authentication::admin_page);

    let login = warp::post()
        .and(warp::path("admin"))
        .and(warp::path::end())
        .and(authentication::session(auth))
        .and(auth_filter)
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form())
        .and_then(authentication::login);

    let logout = warp::get()
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and_then(authentication::logout);

    let search = warp::get()
        .and(warp::path("search"))
        .and(warp::path::end())
        .and(warp::query())
        .and(store_filter.clone())
        .and_then(question::search_questions);

    let author = warp::get()
        .and(warp::path("author"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(store_filter.clone())
        .and_then(question::get_author_questions);

    let category = warp::get()
        .and(warp::path("category"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(store_filter)
        .and_then(question::get_category_questions);

    home.or(submit_page)
        .or(add_question)
        .or(get_ballot)
        .or(add_vote)
        .or(get_result)
        .or(get_edit_form)
        .or(update_question)
        .or(delete_question)
        .or(admin_page)
        .or(login)
        .or(logout)
        .or(search)
        .or(author)
        .or(category)
        .or(pages::static_pages())
        .with(cors)
        .with(warp::trace(|info| {
            tracing::info_span!(
                "request",
                method = %info.method(),
                path = %info.path(),
                id = %uuid::Uuid::new_v4(),
            )
        }))
        .recover(return_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::form::tests::{BOUNDARY, file_part, multipart_body, text_part};
    use crate::types::question::QuestionId;
    use sqlx::Row;
    use sqlx::postgres::{PgPoolOptions, PgRow};
    use warp::http::StatusCode;

    const KEY: &str = "RANDOM WORDS WINTER MACINTOSH PC";

    /// Routes over a pool that never connects; only handlers that stay away
    /// from the database can be exercised with it.
    async fn offline_routes(
        dir: &tempfile::TempDir,
    ) -> (
        impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone + 'static,
        Auth,
    ) {
        let pool = PgPoolOptions::new()
            .connect_timeout(std::time::Duration::from_millis(250))
            .connect_lazy("postgres://localhost:1/unused")
            .unwrap();
        let images = ImageStore::new(dir.path()).await.unwrap();
        let auth = Auth::new(KEY, "hunter2", chrono::Duration::hours(24)).unwrap();
        (
            routes(Store::from_pool(pool), images, auth.clone(), 14, 1024 * 1024),
            auth,
        )
    }

    /// Routes over `DATABASE_URL`, or `None` when no database is configured.
    async fn db_routes(
        dir: &tempfile::TempDir,
    ) -> Option<(
        impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone + 'static,
        Store,
        Auth,
    )> {
        let store = crate::store::tests::test_store().await?;
        let images = ImageStore::new(dir.path()).await.unwrap();
        let auth = Auth::new(KEY, "hunter2", chrono::Duration::hours(24)).unwrap();
        Some((
            routes(store.clone(), images, auth.clone(), 14, 1024 * 1024),
            store,
            auth,
        ))
    }

    fn body_json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    fn multipart_request(path: &str, parts: &[String]) -> warp::test::RequestBuilder {
        warp::test::request()
            .method("POST")
            .path(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(multipart_body(parts))
    }

    fn vote_request(path: &str, body: String) -> warp::test::RequestBuilder {
        warp::test::request()
            .method("POST")
            .path(path)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
    }

    fn upload_dir_is_empty(dir: &tempfile::TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn submit_without_text_is_rejected_before_storing_image() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        let res = multipart_request(
            "/submit",
            &[
                text_part("author", "kim"),
                text_part("choices", "Tea"),
                file_part("image", "mug.png", "PNGDATA"),
                text_part("choices", "Coffee"),
            ],
        )
        .reply(&routes)
        .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body().as_ref(), b"Missing parameters");
        assert!(upload_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn failed_submit_discards_stored_image() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        let res = multipart_request(
            "/submit",
            &[
                text_part("text", "Tea or coffee?"),
                text_part("choices", "Tea"),
                file_part("image", "mug.png", "PNGDATA"),
            ],
        )
        .reply(&routes)
        .await;

        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(upload_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn submit_vote_edit_and_delete_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let Some((routes, store, auth)) = db_routes(&dir).await else { return };
        let author = format!("http-{}", uuid::Uuid::new_v4().to_simple());

        let res = multipart_request(
            "/submit",
            &[
                text_part("text", "Tea or coffee?"),
                text_part("author", &author),
                text_part("choices", "Tea"),
                text_part("choices", " "),
                file_part("image", "mug.png", "PNGDATA"),
                text_part("choices", "Coffee"),
            ],
        )
        .reply(&routes)
        .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/thank_you");

        let id = sqlx::query("SELECT id FROM question WHERE author = $1")
            .bind(&author)
            .map(|row: PgRow| row.get::<i32, _>("id"))
            .fetch_one(&store.connection)
            .await
            .unwrap();
        let question = store.get_question(QuestionId(id)).await.unwrap().unwrap();
        assert!(!question.approved);
        assert_eq!(question.choices.len(), 2);
        let image_path = question.image_path.clone().unwrap();
        assert!(dir.path().join(&image_path).exists());

        let tea = question.choices[0].id.0;
        let vote_path = format!("/vote/{}", id);
        for _ in 0..2 {
            let res = vote_request(&vote_path, format!("choice={}", tea))
                .reply(&routes)
                .await;
            assert_eq!(res.status(), StatusCode::SEE_OTHER);
            assert_eq!(res.headers()["location"], format!("/result/{}", id).as_str());
        }
        let res = vote_request(&vote_path, String::new()).reply(&routes).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = warp::test::request()
            .path(&format!("/result/{}", id))
            .reply(&routes)
            .await;
        let body = body_json(res.body());
        assert_eq!(body["total_votes"], 2);

        let cookie = format!("session={}", auth.issue_token().unwrap());
        let res = multipart_request(
            &format!("/edit/{}", id),
            &[
                text_part("text", "Tea or coffee, really?"),
                text_part("category", " drinks "),
                text_part(&format!("choice_{}", tea), "Green tea"),
            ],
        )
        .header("cookie", cookie.as_str())
        .reply(&routes)
        .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/admin");

        let question = store.get_question(QuestionId(id)).await.unwrap().unwrap();
        assert!(question.approved);
        assert_eq!(question.text, "Tea or coffee, really?");
        assert_eq!(question.category.as_deref(), Some("drinks"));
        assert_eq!(question.choices[0].text, "Green tea");
        assert_eq!(question.choices[0].votes, 2);
        assert_eq!(question.image_path.as_deref(), Some(image_path.as_str()));

        let res = warp::test::request()
            .method("POST")
            .path(&format!("/delete/{}", id))
            .header("cookie", cookie.as_str())
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert!(!dir.path().join(&image_path).exists());

        let res = vote_request(&vote_path, format!("choice={}", tea))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn static_pages_are_served() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        for name in pages::STATIC_PAGES {
            let res = warp::test::request()
                .path(&format!("/{}", name))
                .reply(&routes)
                .await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(body_json(res.body())["page"], name);
        }

        let res = warp::test::request().path("/submit").reply(&routes).await;
        assert_eq!(body_json(res.body())["page"], "submit");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        let res = warp::test::request().path("/nowhere").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let res = warp::test::request().path("/vote/abc").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_password_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        let res = warp::test::request()
            .method("POST")
            .path("/admin")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("password=hunter3")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.body().as_ref(), b"Wrong password");
        assert!(res.headers().get("set-cookie").is_none());
    }

    #[tokio::test]
    async fn login_sets_session_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, auth) = offline_routes(&dir).await;

        let res = warp::test::request()
            .method("POST")
            .path("/admin")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("password=hunter2")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/admin");

        let cookie = res.headers()["set-cookie"].to_str().unwrap();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=86400"));
        let token = cookie
            .strip_prefix("session=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert!(auth.verify_token(token).is_ok());

        let res = warp::test::request()
            .method("POST")
            .path("/admin")
            .header("cookie", format!("session={}", token))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("password=anything")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn admin_page_without_session_asks_for_login() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        let res = warp::test::request().path("/admin").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body())["page"], "admin_login");
    }

    #[tokio::test]
    async fn moderation_routes_require_session() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        let res = warp::test::request()
            .method("POST")
            .path("/delete/1")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = warp::test::request()
            .path("/edit/1")
            .header("cookie", "session=forged")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_expires_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        let res = warp::test::request().path("/logout").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/");
        let cookie = res.headers()["set-cookie"].to_str().unwrap();
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn empty_search_skips_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let (routes, _) = offline_routes(&dir).await;

        let res = warp::test::request().path("/search?q=").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res.body());
        assert_eq!(body["keyword"], "");
        assert_eq!(body["results"], serde_json::json!([]));
    }

    #[test]
    fn redirect_locations_parse() {
        assert!(see_other("/result/12".to_string()).is_ok());
    }
}
