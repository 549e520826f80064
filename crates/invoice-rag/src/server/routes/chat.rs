//! Chat endpoint: questions, greetings and page-form uploads on `POST /`

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use std::time::Instant;
use tower_sessions::Session;

use super::upload::{store_upload, FilePart};
use super::{index_page, session_filename};
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::query::{QueryKind, QuestionForm};
use crate::types::response::{
    BotResponse, GREETING_WITHOUT_FILE, GREETING_WITH_FILE, NOT_INITIALIZED, UPLOAD_FIRST,
};

/// Fields of a multipart `POST /`
#[derive(Default)]
struct ChatForm {
    question: Option<String>,
    file: Option<FilePart>,
}

/// POST / - answer `question` from a urlencoded or multipart form.
///
/// A multipart body without a question but with a `file` part is stored as an upload.
/// Anything else gets the chat page.
pub async fn chat(State(state): State<AppState>, session: Session, request: Request) -> Response {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = match Multipart::from_request(request, &state).await {
            Ok(multipart) => multipart,
            Err(rejection) => return rejection.into_response(),
        };
        let form = match read_chat_form(multipart).await {
            Ok(form) => form,
            Err(e) => return e.into_response(),
        };

        if let Some(question) = form.question {
            return answer_question(&state, &session, &question).await;
        }
        if let Some(file) = form.file {
            return match store_upload(&state, &session, file).await {
                Ok(message) => Json(message).into_response(),
                Err(e) => e.into_response(),
            };
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        match Form::<QuestionForm>::from_request(request, &state).await {
            Ok(Form(QuestionForm {
                question: Some(question),
            })) => return answer_question(&state, &session, &question).await,
            Ok(_) => {}
            Err(rejection) => return rejection.into_response(),
        }
    }

    index_page().await.into_response()
}

async fn read_chat_form(mut multipart: Multipart) -> Result<ChatForm> {
    let mut form = ChatForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidUpload(format!("Invalid multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "question" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidUpload(format!("Failed to read question: {}", e)))?;
                form.question = Some(text);
            }
            "file" if form.file.is_none() => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::InvalidUpload(format!("Failed to read file: {}", e)))?;
                form.file = Some(FilePart { filename, data });
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Greeting, missing-upload and not-ready replies come before the QA chain runs
async fn answer_question(state: &AppState, session: &Session, question: &str) -> Response {
    let filename = match session_filename(session).await {
        Ok(filename) => filename,
        Err(e) => return e.into_response(),
    };

    if QueryKind::detect(question) == QueryKind::Greeting {
        let reply = if filename.is_some() {
            GREETING_WITH_FILE
        } else {
            GREETING_WITHOUT_FILE
        };
        return Json(BotResponse::text(reply)).into_response();
    }

    let Some(filename) = filename else {
        return Json(BotResponse::text(UPLOAD_FIRST)).into_response();
    };

    let Some(chain) = state.qa_chain(&filename) else {
        return Json(BotResponse::text(NOT_INITIALIZED)).into_response();
    };

    let start = Instant::now();
    tracing::info!("Query for '{}': \"{}\"", filename, question);

    match chain.answer(question).await {
        Ok(answer) => {
            tracing::info!(
                "Answered in {}ms with {} sources",
                start.elapsed().as_millis(),
                answer.source_documents.len()
            );
            Json(BotResponse::answer(
                answer.result.clone(),
                &answer.source_texts(),
                state.config().retrieval.snippet_chars,
            ))
            .into_response()
        }
        Err(e) => {
            tracing::error!("Query error for '{}': {:?}", filename, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(BotResponse::text(format!("Error: {}", e))),
            )
                .into_response()
        }
    }
}
