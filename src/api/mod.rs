use rocket::{catcher::Catcher, http::Status, Request, Route};

use crate::error::{Error, Result};
use crate::model::mongodb::Id;

pub mod response;

mod auth;
mod elections;
mod votes;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(elections::routes());
    routes.extend(votes::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![fallback]
}

/// Parse a path segment as a record ID, mapping failure to a 400 rather than
/// the 404 a non-matching route would produce.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Id> {
    raw.parse()
        .map_err(|_| Error::bad_request(format!("Invalid {what} id")))
}

/// Wrap statuses raised outside route handlers (failed guards, unmatched
/// routes, unparsable bodies) in the uniform envelope.
#[catch(default)]
fn fallback(status: Status, _req: &Request<'_>) -> response::ErrorResponse {
    // Rocket reports unparsable JSON as 422; the API contract says 400.
    let status = if status == Status::UnprocessableEntity {
        Status::BadRequest
    } else {
        status
    };
    let message = match status.code {
        400 => "Malformed request body",
        401 => "Unauthorized request",
        403 => "Access denied",
        404 => "Resource not found",
        _ => status.reason().unwrap_or("Unknown error"),
    };
    response::ErrorResponse::new(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_maps_to_bad_request() {
        let err = parse_id("definitely-not-hex", "election").unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(err.public_message(), "Invalid election id");

        let id = Id::new();
        assert_eq!(parse_id(&id.to_string(), "election").unwrap(), id);
    }
}
