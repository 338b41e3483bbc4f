use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::collections::HashMap;

use crate::types::question::{
    Choice, ChoiceId, NewQuestion, Question, QuestionEdit, QuestionId,
};

use handle_errors::Error;

#[derive(Debug, Clone)]
pub struct Store {
    pub connection: PgPool,
}

fn question_from_row(row: PgRow) -> Question {
    Question {
        id: QuestionId(row.get("id")),
        text: row.get("text"),
        author: row.get("author"),
        approved: row.get("approved"),
        created_at: row.get("created_at"),
        image_path: row.get("image_path"),
        category: row.get("category"),
        choices: Vec::new(),
    }
}

fn choice_from_row(row: PgRow) -> Choice {
    Choice {
        id: ChoiceId(row.get("id")),
        text: row.get("text"),
        votes: row.get("votes"),
        question_id: QuestionId(row.get("question_id")),
    }
}

fn query_error(error: sqlx::Error) -> Error {
    tracing::event!(tracing::Level::ERROR, "{:?}", error);
    Error::DatabaseQueryError(error)
}

impl Store {
    pub async fn new(db_url: &str, max_connections: u32) -> Result<Self, Error> {
        let db_pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .map_err(query_error)?;

        Ok(Store::from_pool(db_pool))
    }

    pub fn from_pool(connection: PgPool) -> Self {
        Store { connection }
    }

    pub async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, Error> {
        let question = sqlx::query(
            "SELECT id, text, author, approved, created_at, image_path, category
            FROM question WHERE id = $1",
        )
        .bind(id.0)
        .map(question_from_row)
        .fetch_optional(&self.connection)
        .await
        .map_err(query_error)?;

        match question {
            Some(question) => Ok(self.with_choices(vec![question]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Approved questions created at or after `since`, newest first.
    pub async fn get_recent_questions(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Question>, Error> {
        let questions = sqlx::query(
            "SELECT id, text, author, approved, created_at, image_path, category
            FROM question
            WHERE approved = TRUE AND created_at >= $1
            ORDER BY created_at DESC",
        )
        .bind(since)
        .map(question_from_row)
        .fetch_all(&self.connection)
        .await
        .map_err(query_error)?;

        self.with_choices(questions).await
    }

    /// Literal substring match on the text of approved questions.
    pub async fn search_questions(&self, keyword: &str) -> Result<Vec<Question>, Error> {
        let questions = sqlx::query(
            "SELECT id, text, author, approved, created_at, image_path, category
            FROM question
            WHERE approved = TRUE AND strpos(text, $1) > 0
            ORDER BY id",
        )
        .bind(keyword)
        .map(question_from_row)
        .fetch_all(&self.connection)
        .await
        .map_err(query_error)?;

        self.with_choices(questions).await
    }

    pub async fn get_questions_by_author(&self, author: &str) -> Result<Vec<Question>, Error> {
        let questions = sqlx::query(
            "SELECT id, text, author, approved, created_at, image_path, category
            FROM question
            WHERE author = $1 AND approved = TRUE
            ORDER BY id",
        )
        .bind(author)
        .map(question_from_row)
        .fetch_all(&self.connection)
        .await
        .map_err(query_error)?;

        self.with_choices(questions).await
    }

    /// Every question in the category, approved or not, highest id first.
    pub async fn get_questions_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<Question>, Error> {
        let questions = sqlx::query(
            "SELECT id, text, author, approved, created_at, image_path, category
            FROM question
            WHERE category = $1
            ORDER BY id DESC",
        )
        .bind(category)
        .map(question_from_row)
        .fetch_all(&self.connection)
        .await
        .map_err(query_error)?;

        self.with_choices(questions).await
    }

    pub async fn get_questions_by_approval(
        &self,
        approved: bool,
    ) -> Result<Vec<Question>, Error> {
        let questions = sqlx::query(
            "SELECT id, text, author, approved, created_at, image_path, category
            FROM question
            WHERE approved = $1
            ORDER BY id",
        )
        .bind(approved)
        .map(question_from_row)
        .fetch_all(&self.connection)
        .await
        .map_err(query_error)?;

        self.with_choices(questions).await
    }

    /// Inserts the question and its choices in one transaction.
    pub async fn add_question(&self, new_question: NewQuestion) -> Result<Question, Error> {
        let mut tx = self.connection.begin().await.map_err(query_error)?;

        let mut question = sqlx::query(
            "INSERT INTO question (text, author, image_path)
            VALUES ($1, $2, $3)
            RETURNING id, text, author, approved, created_at, image_path, category",
        )
        .bind(new_question.text)
        .bind(new_question.author)
        .bind(new_question.image_path)
        .map(question_from_row)
        .fetch_one(&mut tx)
        .await
        .map_err(query_error)?;

        for text in new_question.choices {
            let choice = sqlx::query(
                "INSERT INTO choice (text, question_id)
                VALUES ($1, $2)
                RETURNING id, text, votes, question_id",
            )
            .bind(text)
            .bind(question.id.0)
            .map(choice_from_row)
            .fetch_one(&mut tx)
            .await
            .map_err(query_error)?;
            question.choices.push(choice);
        }

        tx.commit().await.map_err(query_error)?;
        Ok(question)
    }

    /// Adds one vote in a single statement. Returns false when the choice does
    /// not exist or belongs to another question.
    pub async fn add_vote(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<bool, Error> {
        match sqlx::query(
            "UPDATE choice SET votes = votes + 1
            WHERE id = $1 AND question_id = $2",
        )
        .bind(choice_id.0)
        .bind(question_id.0)
        .execute(&self.connection)
        .await
        {
            Ok(result) => Ok(result.rows_affected() > 0),
            Err(error) => {
                tracing::event!(tracing::Level::ERROR, "{:?}", error);
                Err(Error::DatabaseQueryError(error))
            }
        }
    }

    /// Applies an admin edit and approves the question. A `None` image keeps
    /// the current one. Returns `None` if the question does not exist.
    pub async fn update_question(
        &self,
        id: QuestionId,
        edit: &QuestionEdit,
        image_path: Option<String>,
    ) -> Result<Option<Question>, Error> {
        let mut tx = self.connection.begin().await.map_err(query_error)?;

        let question = sqlx::query(
            "UPDATE question
            SET text = $1, category = $2, approved = TRUE,
                image_path = COALESCE($3, image_path)
            WHERE id = $4
            RETURNING id, text, author, approved, created_at, image_path, category",
        )
        .bind(&edit.text)
        .bind(&edit.category)
        .bind(image_path)
        .bind(id.0)
        .map(question_from_row)
        .fetch_optional(&mut tx)
        .await
        .map_err(query_error)?;

        let mut question = match question {
            Some(question) => question,
            None => return Ok(None),
        };

        question.choices = sqlx::query(
            "SELECT id, text, votes, question_id FROM choice
            WHERE question_id = $1
            ORDER BY id",
        )
        .bind(id.0)
        .map(choice_from_row)
        .fetch_all(&mut tx)
        .await
        .map_err(query_error)?;

        let updates: Vec<(ChoiceId, String)> = edit
            .choice_updates(&question)
            .into_iter()
            .map(|(choice_id, text)| (choice_id, text.to_string()))
            .collect();

        for (choice_id, text) in updates {
            sqlx::query("UPDATE choice SET text = $1 WHERE id = $2 AND question_id = $3")
                .bind(&text)
                .bind(choice_id.0)
                .bind(id.0)
                .execute(&mut tx)
                .await
                .map_err(query_error)?;

            if let Some(choice) = question.choices.iter_mut().find(|c| c.id == choice_id) {
                choice.text = text;
            }
        }

        tx.commit().await.map_err(query_error)?;
        Ok(Some(question))
    }

    /// Removes the choices and then the question in one transaction. The
    /// returned row still carries `image_path` so the caller can remove the file.
    pub async fn delete_question(&self, id: QuestionId) -> Result<Option<Question>, Error> {
        let mut tx = self.connection.begin().await.map_err(query_error)?;

        sqlx::query("DELETE FROM choice WHERE question_id = $1")
            .bind(id.0)
            .execute(&mut tx)
            .await
            .map_err(query_error)?;

        let question = sqlx::query(
            "DELETE FROM question WHERE id = $1
            RETURNING id, text, author, approved, created_at, image_path, category",
        )
        .bind(id.0)
        .map(question_from_row)
        .fetch_optional(&mut tx)
        .await
        .map_err(query_error)?;

        if question.is_some() {
            tx.commit().await.map_err(query_error)?;
        }
        Ok(question)
    }

    async fn with_choices(&self, mut questions: Vec<Question>) -> Result<Vec<Question>, Error> {
        if questions.is_empty() {
            return Ok(questions);
        }

        let ids: Vec<i32> = questions.iter().map(|q| q.id.0).collect();
        let choices = sqlx::query(
            "SELECT id, text, votes, question_id FROM choice
            WHERE question_id = ANY($1)
            ORDER BY id",
        )
        .bind(ids)
        .map(choice_from_row)
        .fetch_all(&self.connection)
        .await
        .map_err(query_error)?;

        let mut by_question: HashMap<QuestionId, Vec<Choice>> = HashMap::new();
        for choice in choices {
            by_question.entry(choice.question_id).or_default().push(choice);
        }
        for question in questions.iter_mut() {
            question.choices = by_question.remove(&question.id).unwrap_or_default();
        }

        Ok(questions)
    }
}
