use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{info, warn};

use super::{AssetLookup, Located};
use crate::models::MatchTier;
use crate::output::logs::{format_size, ActivityLog};

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Transport-neutral answer to one asset request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
    pub resolved: Option<Resolved>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub name: String,
    pub tier: MatchTier,
}

impl AssetResponse {
    pub fn found(name: &str, tier: MatchTier, content_type: String, body: Bytes) -> Self {
        Self {
            status: 200,
            content_type,
            body,
            resolved: Some(Resolved {
                name: name.to_string(),
                tier,
            }),
        }
    }

    pub fn not_found(requested: &str) -> Self {
        Self {
            status: 404,
            content_type: TEXT_CONTENT_TYPE.to_string(),
            body: Bytes::from(format!("Custom model file not found: {requested}")),
            resolved: None,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.status == 200
    }
}

impl IntoResponse for AssetResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        let length = self.body.len();
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, content_type);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

/// Resolves `relative` against `lookup` and builds the response. Every
/// responder funnels through here so they agree on the outcome.
pub fn answer<L>(lookup: &L, relative: &str, source: &str, activity: &ActivityLog) -> AssetResponse
where
    L: AssetLookup + ?Sized,
{
    match lookup.locate(relative) {
        Some(located) => {
            let message = format!(
                "[{source}] served {} ({}) for {relative}",
                located.name,
                format_size(located.body.len() as u64)
            );
            info!("{message}");
            activity.info(message);
            AssetResponse::found(&located.name, located.tier, located.content_type, located.body)
        }
        None => {
            let message = format!("[{source}] no custom model file matches {relative}");
            warn!("{message}");
            activity.warn(message);
            AssetResponse::not_found(relative)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resolver;

    struct Fixed(Vec<(&'static str, &'static str)>);

    impl AssetLookup for Fixed {
        fn locate(&self, relative: &str) -> Option<Located> {
            let resolution =
                Resolver::permissive().resolve(relative, self.0.iter().map(|(name, _)| *name))?;
            let (name, body) = *self.0.iter().find(|(name, _)| *name == resolution.name)?;
            Some(Located {
                name: name.to_string(),
                tier: resolution.tier,
                content_type: crate::models::metadata::infer_content_type(name).to_string(),
                body: Bytes::from_static(body.as_bytes()),
            })
        }
    }

    #[test]
    fn hits_carry_type_and_body() {
        let lookup = Fixed(vec![("config.json", "{}")]);
        let activity = ActivityLog::new();
        let response = answer(&lookup, "config.json", "test", &activity);
        assert!(response.is_hit());
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body, Bytes::from_static(b"{}"));
        assert_eq!(response.resolved.unwrap().tier, MatchTier::Exact);
        assert_eq!(activity.lines().len(), 1);
    }

    #[test]
    fn misses_are_plain_text_404s() {
        let lookup = Fixed(vec![]);
        let activity = ActivityLog::new();
        let response = answer(&lookup, "tokenizer.json", "test", &activity);
        assert_eq!(response.status, 404);
        assert_eq!(response.content_type, TEXT_CONTENT_TYPE);
        assert_eq!(
            response.body,
            Bytes::from("Custom model file not found: tokenizer.json")
        );
    }

    #[test]
    fn http_response_has_cors_and_status() {
        let response = AssetResponse::not_found("x.onnx").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            HeaderValue::from_static("*")
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static(TEXT_CONTENT_TYPE)
        );
    }
}
