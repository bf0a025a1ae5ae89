use std::fmt::{Display, Formatter};
use std::io::Cursor;

use rocket::http::hyper::header::CONTENT_LANGUAGE;
use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::error::CoreError;

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new(status: Status, type_uri: impl ToString, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: type_uri.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem {
            status,
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let mut body = self.body;

        // Following are required by rfc7807
        body.insert(String::from("type"), Value::from(self.type_uri));
        body.insert(String::from("title"), Value::from(self.title));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = self.detail {
            body.insert(String::from("detail"), Value::from(detail));
        }
        body.insert(String::from("status"), Value::from(self.status.code));
        if let Some(instance) = self.instance_uri {
            body.insert(String::from("instance"), Value::from(instance));
        }

        let body_string = serde_json::to_string(&body).map_err(|e| {
            tracing::error!("unable to serialize problem body: {}", e);
            Status::InternalServerError
        })?;

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header(CONTENT_LANGUAGE.as_str(), "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn not_authenticated() -> Problem {
        Problem::new(
            Status::Unauthorized,
            "/problems/not-authenticated",
            "Sign in to continue.",
        )
    }
}

impl From<CoreError> for Problem {
    fn from(e: CoreError) -> Self {
        let detail = e.to_string();
        let mut problem = match e {
            CoreError::NotAuthenticated => problems::not_authenticated(),
            CoreError::NotFound(_) => Problem::new(
                Status::NotFound,
                "/problems/not-found",
                "Requested resource doesn't exist.",
            ),
            CoreError::AlreadyMember(code) => {
                let mut problem = Problem::new(
                    Status::Conflict,
                    "/problems/already-member",
                    "Already a member of this group.",
                );
                problem.insert_str("code", code);
                problem
            }
            CoreError::InvalidInput(_) => Problem::new(
                Status::BadRequest,
                "/problems/invalid-input",
                "Request contained invalid input.",
            ),
            CoreError::PermissionDenied(_) => Problem::new(
                Status::Forbidden,
                "/problems/permission-denied",
                "Not allowed to access this resource.",
            ),
            CoreError::ExhaustedRetries(_) => Problem::new(
                Status::ServiceUnavailable,
                "/problems/exhausted-retries",
                "Unable to allocate a group code. Try again later.",
            ),
            CoreError::RemoteFailure(_) => Problem::new(
                Status::BadGateway,
                "/problems/remote-failure",
                "Backing store failed while processing request.",
            ),
        };
        problem.detail(detail);
        problem
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => {
                Problem::new_untyped(Status::Unauthorized, "Expired identity token.")
            }
            _ => Problem::new_untyped(Status::Unauthorized, "Error while handling identity token."),
        }
    }
}
