use gavel_judge::JudgeModule;

use actix_web::{get, web, Responder};

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(languages);
}

/// GET /languages
#[get("/languages")]
async fn languages(judge: web::Data<JudgeModule>) -> impl Responder {
    web::Json(judge.registry().summaries())
}
