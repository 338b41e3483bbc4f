use bytes::BufMut;
use futures_util::TryStreamExt;
use warp::multipart::{FormData, Part};

use crate::types::question::{NewQuestion, QuestionEdit};
use handle_errors::Error;

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A decoded `multipart/form-data` body: text fields in order, plus the
/// `image` file part when one with a file name was sent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FormFields {
    pub fields: Vec<(String, String)>,
    pub image: Option<Upload>,
}

impl FormFields {
    pub fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn new_question(&self, image_path: Option<String>) -> Result<NewQuestion, Error> {
        let text = self.first("text").ok_or(Error::MissingParameters)?;
        Ok(NewQuestion::new(
            text.to_string(),
            self.first("author").map(str::to_string),
            self.all("choices").map(str::to_string),
            image_path,
        ))
    }

    pub fn question_edit(&self) -> Result<QuestionEdit, Error> {
        let text = self.first("text").ok_or(Error::MissingParameters)?;
        let mut edit = QuestionEdit::new(text.to_string(), self.first("category").unwrap_or(""));
        for (name, value) in &self.fields {
            edit.add_choice_field(name, value.clone());
        }
        Ok(edit)
    }
}

/// Parts come off one shared body stream, so each is drained before the
/// next one is requested.
pub async fn read_form(form: FormData) -> Result<FormFields, Error> {
    futures_util::pin_mut!(form);

    let mut fields = FormFields::default();
    while let Some(part) = form.try_next().await.map_err(Error::MultipartError)? {
        let name = part.name().to_string();
        let filename = part.filename().map(str::to_string);
        let data = read_part(part).await?;

        match filename {
            Some(filename) if name == IMAGE_FIELD && !filename.is_empty() => {
                fields.image = Some(Upload { filename, data });
            }
            Some(_) => {}
            None => fields
                .fields
                .push((name, String::from_utf8_lossy(&data).into_owned())),
        }
    }

    Ok(fields)
}

async fn read_part(part: Part) -> Result<Vec<u8>, Error> {
    part.stream()
        .try_fold(Vec::new(), |mut data, buf| async move {
            data.put(buf);
            Ok(data)
        })
        .await
        .map_err(Error::MultipartError)
}
