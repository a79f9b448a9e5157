use crate::config::Config;

use std::fmt;
use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{error, web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use serde_json::json;

/// Extractor guarding the submit and storage-mutation endpoints: the
/// `Authorization` header must equal the configured token.
pub struct Authorized;

#[derive(Debug)]
struct InvalidToken;

impl fmt::Display for InvalidToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid authentication token")
    }
}

impl ResponseError for InvalidToken {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Unauthorized().json(json!({ "error": self.to_string() }))
    }
}

impl FromRequest for Authorized {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authorize(req))
    }
}

fn authorize(req: &HttpRequest) -> Result<Authorized, actix_web::Error> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| error::ErrorInternalServerError("server configuration missing"))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if token == config.server.token {
        Ok(Authorized)
    } else {
        Err(InvalidToken.into())
    }
}
