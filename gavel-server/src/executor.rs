use crate::auth::Authorized;

use gavel_judge::JudgeModule;
use gavel_protocol::SubmitRequest;

use actix_web::{error, get, post, web, Responder, Result};
use validator::Validate;

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(submit).service(job_status).service(run_status);
}

/// POST /executor
/// JSON: SubmitRequest => JudgeResult
///
/// Judging blocks on the job pool, so it is bridged off the reactor.
#[post("/executor")]
async fn submit(
    _auth: Authorized,
    judge: web::Data<JudgeModule>,
    body: web::Json<SubmitRequest>,
) -> Result<impl Responder> {
    let request = body.into_inner();
    if let Err(err) = request.validate() {
        return Err(error::ErrorBadRequest(err.to_string()));
    }
    let judge = judge.into_inner();

    let result = web::block(move || judge.submit(request))
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(web::Json(result))
}

/// GET /job/status
#[get("/job/status")]
async fn job_status(judge: web::Data<JudgeModule>) -> impl Responder {
    web::Json(judge.job_status())
}

/// GET /run/status
#[get("/run/status")]
async fn run_status(judge: web::Data<JudgeModule>) -> impl Responder {
    web::Json(judge.run_status())
}
