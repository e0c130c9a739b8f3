//! Queue callback endpoint that drives the import pipeline.
//!
//! The durable queue transport delivers each job message here. The raw
//! body is kept as-is until the signature over it has been verified;
//! only then is it parsed and dispatched into the pipeline. Transport
//! redelivery (on a non-2xx response) covers transport-level failures
//! only; page-to-page progression is the pipeline's own explicit
//! continuation, never redelivery.

use rocket::request::{FromRequest, Outcome};
use rocket::serde::json::Json;
use rocket::{Request, State};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::Serialize;

use crate::error::ApiError;
use crate::import::signature::SIGNATURE_HEADER;
use crate::import::{self, ImportContext, ImportMessage};

/// Signature header captured from a queue delivery, if present.
pub struct QueueSignature(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for QueueSignature {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let header = request
            .headers()
            .get_one(SIGNATURE_HEADER)
            .map(|value| value.to_string());
        Outcome::Success(QueueSignature(header))
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CallbackResponse {
    pub response: String,
}

/// Receive one import job message from the queue transport.
#[post("/import/callback", data = "<body>")]
pub async fn import_callback(
    signature: QueueSignature,
    body: String,
    ctx: &State<ImportContext>,
) -> Result<Json<CallbackResponse>, ApiError> {
    if ctx.config.verify_signatures {
        let token = signature
            .0
            .ok_or_else(|| ApiError::Unauthorized("missing queue signature".to_string()))?;
        import::signature::verify(&token, &body, &ctx.config.queue_signing_key)
            .map_err(|err| ApiError::Unauthorized(format!("invalid queue signature: {err}")))?;
    }

    let message: ImportMessage = serde_json::from_str(&body)
        .map_err(|err| ApiError::BadRequest(format!("invalid import message: {err}")))?;

    match import::run_import(ctx, &message).await {
        Ok(summary) => {
            log::info!(
                "workspace {}: processed {} records, inserted {} ({} total, finished={})",
                message.workspace_id,
                summary.fetched,
                summary.inserted,
                summary.total,
                summary.finished
            );
            Ok(Json(CallbackResponse {
                response: "success".to_string(),
            }))
        }
        Err(err) => {
            let label = workspace_label(ctx, message.workspace_id).await;
            log::error!(
                "import failed for workspace {} (id {}): {}",
                label,
                message.workspace_id,
                err
            );
            Err(ApiError::InternalError(err.to_string()))
        }
    }
}

/// Human-readable workspace identifier for operator-facing logs.
async fn workspace_label(ctx: &ImportContext, workspace_id: i32) -> String {
    sqlx::query_scalar::<_, String>("SELECT slug FROM workspaces WHERE id = $1")
        .bind(workspace_id)
        .fetch_optional(&ctx.pool)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| "<unknown>".to_string())
}
