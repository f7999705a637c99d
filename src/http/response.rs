//! Gateway-generated responses.
//!
//! # Responsibilities
//! - Render error pages for routing failures and failed executions
//! - Escape any detail text before it reaches HTML
//!
//! # Design Decisions
//! - The default page only names the status; details are opt-in

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

/// A small HTML page for `status`, with optional (escaped) detail text.
pub fn error_page(status: StatusCode, detail: Option<&str>) -> Response<Body> {
    let title = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\n<body><h1>{title}</h1>\n"
    );
    if let Some(detail) = detail {
        html.push_str("<pre>");
        html.push_str(&escape_html(detail));
        html.push_str("</pre>\n");
    }
    html.push_str("</body></html>\n");

    let mut response = Response::new(Body::from(html));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_page() {
        let response = error_page(StatusCode::GATEWAY_TIMEOUT, Some("<script>x</script>"));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("504 Gateway Timeout"));
        assert!(text.contains("&lt;script&gt;"));
        assert!(!text.contains("<script>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"a & "b" 'c'"#), "a &amp; &quot;b&quot; &#39;c&#39;");
    }
}
