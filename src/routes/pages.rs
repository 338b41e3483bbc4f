use std::future;
use warp::Filter;

use crate::types::page::Page;

pub const STATIC_PAGES: [&str; 6] = [
    "privacy",
    "terms",
    "disclaimer",
    "operator",
    "index",
    "thank_you",
];

/// `GET /<name>` for the fixed informational pages.
pub fn static_pages() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone
{
    warp::get()
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and_then(|name: String| {
            future::ready(match STATIC_PAGES.iter().find(|page| **page == name) {
                Some(page) => Ok(warp::reply::json(&Page { page: *page })),
                None => Err(warp::reject::not_found()),
            })
        })
}
