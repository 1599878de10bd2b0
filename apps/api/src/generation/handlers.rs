//! Axum route handlers for the Generation API.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{authenticate, BearerToken};
use crate::errors::AppError;
use crate::generation::{ArticlePipeline, GeneratedArticle, GenerationRequest};
use crate::history::{ArticleRecord, HistoryOwner};
use crate::state::AppState;

const MAX_TITLE_CHARS: usize = 200;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Body of `POST /`. Which fields are required depends on `action`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRequest {
    pub action: Option<String>,
    pub subject: Option<String>,
    pub article_content: Option<String>,
    pub section_title: Option<String>,
    pub user_id: Option<String>,
}

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleAction {
    Generate {
        subject: String,
        user_id: Option<String>,
    },
    Summarize {
        article_content: String,
    },
    Expand {
        article_content: String,
        section_title: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateArticleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<Uuid>,
    #[serde(flatten)]
    pub article: GeneratedArticle,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    pub summary: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandSectionResponse {
    pub success: bool,
    pub expanded_content: String,
}

fn required(value: Option<String>, field: &str, action: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("'{field}' is required for the '{action}' action")))
}

fn within_limit(value: String, field: &str) -> Result<String, AppError> {
    if value.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "'{field}' must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(value)
}

impl ArticleRequest {
    pub fn into_action(self) -> Result<ArticleAction, AppError> {
        let action = self
            .action
            .ok_or_else(|| AppError::Validation("'action' is required".to_string()))?;

        match action.as_str() {
            "generateArticle" => Ok(ArticleAction::Generate {
                subject: within_limit(required(self.subject, "subject", &action)?, "subject")?,
                user_id: self
                    .user_id
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty()),
            }),
            "summarizeArticle" => Ok(ArticleAction::Summarize {
                article_content: required(self.article_content, "articleContent", &action)?,
            }),
            "expandSection" => Ok(ArticleAction::Expand {
                article_content: required(self.article_content, "articleContent", &action)?,
                section_title: within_limit(
                    required(self.section_title, "sectionTitle", &action)?,
                    "sectionTitle",
                )?,
            }),
            other => Err(AppError::Validation(format!(
                "Unknown action '{other}'. Expected generateArticle, summarizeArticle or expandSection"
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /
///
/// Single entry point dispatching on `action`. Rejected with 503/500 until the
/// service has initialized; the whole action is bounded by `REQUEST_TIMEOUT_SECS`.
/// A generated article is saved only for a verified caller.
pub async fn handle_article_action(
    State(state): State<AppState>,
    token: BearerToken,
    payload: Result<Json<ArticleRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let pipeline = state.service.pipeline().await?;

    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let action = request.into_action()?;

    let owner = match &action {
        ArticleAction::Generate { user_id, .. } => {
            history_owner(&state, &token, user_id.as_deref()).await?
        }
        _ => None,
    };

    tokio::time::timeout(
        state.config.request_timeout,
        run_action(&state, &pipeline, action, owner),
    )
    .await
    .map_err(|_| AppError::Timeout)?
}

/// Who a generated article is saved for.
///
/// Anonymous requests are not saved. A `userId` in the body must be backed by a token
/// for that same user.
async fn history_owner(
    state: &AppState,
    token: &BearerToken,
    claimed: Option<&str>,
) -> Result<Option<HistoryOwner>, AppError> {
    if token.0.is_none() {
        return match claimed {
            Some(_) => Err(AppError::Unauthorized(
                "A bearer token is required to save articles for a user".to_string(),
            )),
            None => Ok(None),
        };
    }

    let identity = authenticate(state.identity.as_ref(), token).await?;
    if claimed.is_some_and(|user_id| user_id != identity.user_id) {
        return Err(AppError::Forbidden(
            "userId does not match the signed-in user".to_string(),
        ));
    }
    Ok(Some(HistoryOwner::new(
        state.config.app_id.clone(),
        identity.user_id,
    )))
}

async fn run_action(
    state: &AppState,
    pipeline: &ArticlePipeline,
    action: ArticleAction,
    owner: Option<HistoryOwner>,
) -> Result<Response, AppError> {
    match action {
        ArticleAction::Generate { subject, .. } => {
            info!(%subject, "Generating article");
            let article = pipeline
                .generate_article(&GenerationRequest::new(subject))
                .await?;

            let article_id = match owner {
                Some(owner) => persist(state, &owner, &article).await,
                None => None,
            };

            Ok(Json(GenerateArticleResponse {
                success: true,
                article_id,
                article,
            })
            .into_response())
        }
        ArticleAction::Summarize { article_content } => {
            let summary = pipeline.summarize_article(&article_content).await?;
            Ok(Json(SummaryResponse {
                success: true,
                summary,
            })
            .into_response())
        }
        ArticleAction::Expand {
            article_content,
            section_title,
        } => {
            let expanded_content = pipeline
                .expand_section(&article_content, &section_title)
                .await?;
            Ok(Json(ExpandSectionResponse {
                success: true,
                expanded_content,
            })
            .into_response())
        }
    }
}

/// Saves the article to the user's history. A store failure does not fail the request.
async fn persist(state: &AppState, owner: &HistoryOwner, article: &GeneratedArticle) -> Option<Uuid> {
    let record = ArticleRecord::from_article(article);

    match state.history.save(owner, &record).await {
        Ok(()) => {
            info!(article_id = %record.id, user_id = %owner.user_id, "Article saved to history");
            Some(record.id)
        }
        Err(e) => {
            error!(user_id = %owner.user_id, "Failed to save article to history: {e}");
            None
        }
    }
}
