use super::structs::ErrorMessage;
use agentdir::Error;
use rocket::{http::Status, response::status::Custom, serde::json::Json};

pub type GenericError = Custom<Json<ErrorMessage>>;

pub fn create_status(status: Status) -> Json<ErrorMessage> {
    Json(ErrorMessage {
        code: status.code,
        message: status.reason_lossy().to_string(),
    })
}

pub fn generic_error(status: Status, message: String) -> GenericError {
    Custom(
        status,
        Json(ErrorMessage {
            code: status.code,
            message,
        }),
    )
}

/// Credential failures share one status so callers cannot learn the allowlist.
pub fn status_of(err: &Error) -> Status {
    match err {
        Error::Conflict(_) => Status::Conflict,
        Error::NotFound(_) => Status::NotFound,
        Error::Unauthorized(_) | Error::Forbidden(_) => Status::Unauthorized,
        Error::Invalid(_) => Status::BadRequest,
        Error::Protocol { .. } | Error::Transport(_) => Status::BadGateway,
        Error::Index(_) | Error::Timeout { .. } | Error::InvalidTransition { .. } => Status::InternalServerError,
    }
}

pub fn from_error(err: Error) -> GenericError {
    let status = status_of(&err);

    if status.code >= 500 {
        log::error!("{err}");
    } else {
        log::warn!("{err}");
    }

    generic_error(status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_share_a_status() {
        assert_eq!(status_of(&Error::Unauthorized("expired".into())), Status::Unauthorized);
        assert_eq!(status_of(&Error::Forbidden("untrusted".into())), Status::Unauthorized);
    }

    #[test]
    fn error_body_carries_the_message() {
        let Custom(status, Json(body)) = from_error(Error::Conflict("http://a".into()));
        assert_eq!(status, Status::Conflict);
        assert_eq!(body.code, 409);
        assert_eq!(body.message, "agent already registered at http://a");
    }
}
