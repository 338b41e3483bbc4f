use serde::Serialize;

use crate::types::question::Question;

/// A page with nothing but its name to show.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Page {
    pub page: &'static str,
}

#[derive(Serialize, Debug, Clone)]
pub struct ResultView {
    pub question: Question,
    pub total_votes: i64,
}

impl From<Question> for ResultView {
    fn from(question: Question) -> Self {
        ResultView {
            total_votes: question.total_votes(),
            question,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct SearchResults {
    pub keyword: String,
    pub results: Vec<Question>,
}

#[derive(Serialize, Debug, Clone)]
pub struct AuthorPage {
    pub author: String,
    pub questions: Vec<Question>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CategoryPage {
    pub category: String,
    pub questions: Vec<Question>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ModerationQueue {
    pub unapproved: Vec<Question>,
    pub approved: Vec<Question>,
}
