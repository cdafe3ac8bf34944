use axum::http::{HeaderMap, StatusCode};
use log::warn;
use tokio_tungstenite::tungstenite::handshake::server::Request;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingToken,
    InvalidToken,
    OriginNotAllowed(String),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::MissingToken => "Missing Authorization header or token parameter".to_string(),
            Self::InvalidToken => "Unauthorized: Invalid or missing token".to_string(),
            Self::OriginNotAllowed(origin) => format!("Origin not allowed: {}", origin),
        }
    }
}

fn bearer(value: &str) -> Option<String> {
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub fn extract_bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(bearer)
}

pub fn extract_token_from_request(req: &Request) -> Option<String> {
    if let Some(token) = extract_bearer_from_headers(req.headers()) {
        return Some(token);
    }

    let query = req.uri().query()?;
    query
        .split('&')
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| *key == "token")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|decoded| decoded.into_owned())
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    token: String,
    allowed_origins: Vec<String>,
}

impl AccessPolicy {
    pub fn new(token: &str, allowed_origins: Vec<String>) -> Self {
        Self {
            token: token.to_string(),
            allowed_origins,
        }
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    pub fn check_token(&self, presented: Option<&str>) -> Result<(), Rejection> {
        match presented {
            None => Err(Rejection::MissingToken),
            Some(token) if token == self.token => Ok(()),
            Some(_) => Err(Rejection::InvalidToken),
        }
    }

    // No Origin header means a non-browser client
    pub fn check_origin(&self, origin: Option<&str>) -> Result<(), Rejection> {
        match origin {
            None => Ok(()),
            Some(origin) if self.allowed_origins.iter().any(|o| o == origin) => Ok(()),
            Some(origin) => Err(Rejection::OriginNotAllowed(origin.to_string())),
        }
    }

    // Token before origin, so a bad token is always a 401
    pub fn authorize_upgrade(&self, req: &Request) -> Result<(), Rejection> {
        let token = extract_token_from_request(req);
        self.check_token(token.as_deref())?;

        let origin = req.headers().get("Origin").and_then(|v| v.to_str().ok());
        self.check_origin(origin).map_err(|rejection| {
            warn!("Upgrade refused: {}", rejection.message());
            rejection
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AccessPolicy {
        AccessPolicy::new("s3cret/token", vec!["https://app.example.com".to_string()])
    }

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_token_from_header_or_query() {
        let req = request("/ws", &[("Authorization", "Bearer abc")]);
        assert_eq!(extract_token_from_request(&req), Some("abc".to_string()));

        let req = request("/ws?foo=1&token=s3cret%2Ftoken", &[]);
        assert_eq!(extract_token_from_request(&req), Some("s3cret/token".to_string()));

        let req = request("/ws?foo=1", &[("Authorization", "Basic abc")]);
        assert_eq!(extract_token_from_request(&req), None);
    }

    #[test]
    fn test_missing_or_wrong_token_is_unauthorized_regardless_of_origin() {
        let policy = policy();
        for origin in [None, Some("https://app.example.com"), Some("https://evil.example")] {
            let mut headers = vec![];
            if let Some(origin) = origin {
                headers.push(("Origin", origin));
            }

            let missing = policy.authorize_upgrade(&request("/ws", &headers)).unwrap_err();
            assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

            let wrong = policy
                .authorize_upgrade(&request("/ws?token=nope", &headers))
                .unwrap_err();
            assert_eq!(wrong, Rejection::InvalidToken);
            assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_origin_allow_list() {
        let policy = policy();
        let uri = "/ws?token=s3cret%2Ftoken";

        assert!(policy.authorize_upgrade(&request(uri, &[])).is_ok());
        assert!(policy
            .authorize_upgrade(&request(uri, &[("Origin", "https://app.example.com")]))
            .is_ok());

        let rejected = policy
            .authorize_upgrade(&request(uri, &[("Origin", "https://evil.example")]))
            .unwrap_err();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
    }
}
