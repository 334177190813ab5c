use std::io::Cursor;

use rocket::{
    http::{ContentType, Status},
    response::Responder,
    serde::json::serde_json,
    Request, Response,
};
use serde::Serialize;

/// The uniform response envelope: every success and every failure is wrapped
/// in `{statusCode, data, message, success}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T> {
    status_code: u16,
    data: &'a Option<T>,
    message: &'a str,
    success: bool,
}

/// A successful API response: a status, a payload, and a human-readable
/// message, rendered through the envelope.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: Status,
    data: Option<T>,
    message: String,
}

impl<T: Serialize> ApiResponse<T> {
    /// A `200 OK` response.
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            data: Some(data),
            message: message.into(),
        }
    }

    /// A `201 Created` response.
    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self {
            status: Status::Created,
            data: Some(data),
            message: message.into(),
        }
    }

    /// The serialized envelope.
    fn body(&self) -> serde_json::Result<String> {
        serde_json::to_string(&Envelope {
            status_code: self.status.code,
            data: &self.data,
            message: &self.message,
            success: true,
        })
    }
}

impl<'r, 'o: 'r, T: Serialize> Responder<'r, 'o> for ApiResponse<T> {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'o> {
        let body = self.body().map_err(|_| Status::InternalServerError)?;
        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// A failure response produced outside a route handler, i.e. by a catcher.
/// Route handlers fail through [`crate::error::Error`] instead, which renders
/// the same envelope.
#[derive(Debug)]
pub struct ErrorResponse {
    status: Status,
    message: String,
}

impl ErrorResponse {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ErrorResponse {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'o> {
        let body = error_body(self.status, &self.message);
        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// The serialized failure envelope for the given status and message.
/// Shared by the error responder and the catchers.
pub fn error_body(status: Status, message: &str) -> String {
    serde_json::json!({
        "statusCode": status.code,
        "data": null,
        "message": message,
        "success": false,
    })
    .to_string()
}
