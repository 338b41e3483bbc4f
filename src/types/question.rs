use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Debug, Deserialize, Clone)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub author: Option<String>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub image_path: Option<String>,
    pub category: Option<String>,
    pub choices: Vec<Choice>,
}

#[derive(Serialize, Debug, Clone, Copy, Eq, Hash, Deserialize, PartialEq)]
pub struct QuestionId(pub i32);

#[derive(Serialize, Debug, Deserialize, Clone, PartialEq)]
pub struct Choice {
    pub id: ChoiceId,
    pub text: String,
    pub votes: i32,
    pub question_id: QuestionId,
}

#[derive(Serialize, Debug, Clone, Copy, Eq, Hash, Deserialize, PartialEq)]
pub struct ChoiceId(pub i32);

impl Question {
    pub fn total_votes(&self) -> i64 {
        self.choices.iter().map(|c| i64::from(c.votes)).sum()
    }
}

/// A visitor submission. Always stored unapproved.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub text: String,
    pub author: Option<String>,
    pub choices: Vec<String>,
    pub image_path: Option<String>,
}

impl NewQuestion {
    /// Choice texts are trimmed and blank ones dropped. There is no minimum
    /// number of choices.
    pub fn new<I>(text: String, author: Option<String>, choices: I, image_path: Option<String>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        NewQuestion {
            text,
            author,
            choices: choices
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            image_path,
        }
    }
}

/// What the admin edit form submits. Saving it always approves the question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionEdit {
    pub text: String,
    pub category: String,
    pub choices: HashMap<ChoiceId, String>,
}

const CHOICE_FIELD_PREFIX: &str = "choice_";

impl QuestionEdit {
    pub fn new(text: String, category: &str) -> Self {
        QuestionEdit {
            text,
            category: category.trim().to_string(),
            choices: HashMap::new(),
        }
    }

    /// Picks up a `choice_<id>` form field. Returns false for any other field name.
    pub fn add_choice_field(&mut self, name: &str, value: String) -> bool {
        match name
            .strip_prefix(CHOICE_FIELD_PREFIX)
            .and_then(|id| id.parse::<i32>().ok())
        {
            Some(id) => {
                self.choices.insert(ChoiceId(id), value);
                true
            }
            None => false,
        }
    }

    /// New texts for the choices that actually belong to `question`, in choice order.
    pub fn choice_updates<'a>(&'a self, question: &Question) -> Vec<(ChoiceId, &'a str)> {
        question
            .choices
            .iter()
            .filter_map(|c| self.choices.get(&c.id).map(|text| (c.id, text.as_str())))
            .collect()
    }
}

/// Start of the home page window.
pub fn recent_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}
