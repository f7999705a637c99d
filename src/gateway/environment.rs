//! CGI environment construction.
//!
//! [`build_environment`] is a pure function: the same request, command and
//! server metadata always yield the same mapping. The child process sees
//! nothing else, since the launcher clears the inherited environment.

use std::collections::BTreeMap;

use axum::http::header;

use crate::gateway::context::{RequestContext, ServerMetadata};
use crate::gateway::launcher::ScriptCommand;

/// Variable set handed to one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionEnvironment {
    vars: BTreeMap<String, String>,
}

impl ExecutionEnvironment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }


    fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

impl FromIterator<(String, String)> for ExecutionEnvironment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Build the environment for running `command` on behalf of `ctx`.
pub fn build_environment(
    ctx: &RequestContext,
    command: &ScriptCommand,
    server: &ServerMetadata,
) -> ExecutionEnvironment {
    let mut env = ExecutionEnvironment::default();

    // Request variables below always win over passthrough values.
    for (name, value) in &server.passthrough {
        env.set(name, value);
    }

    env.set("GATEWAY_INTERFACE", &server.gateway_interface);
    env.set("SERVER_SOFTWARE", &server.software);
    env.set("SERVER_NAME", ctx.server_name());
    env.set("SERVER_PORT", ctx.server_port().to_string());
    env.set("SERVER_PROTOCOL", ctx.protocol());
    env.set("REDIRECT_STATUS", "200");

    env.set("REQUEST_METHOD", ctx.method().as_str());
    env.set("QUERY_STRING", ctx.query_string());
    env.set("REQUEST_URI", ctx.request_uri());
    env.set("SCRIPT_NAME", ctx.script_name());
    env.set(
        "SCRIPT_FILENAME",
        command.script_filename().to_string_lossy(),
    );
    env.set("PATH_INFO", ctx.path_info());

    if let Some(root) = &server.document_root {
        env.set("DOCUMENT_ROOT", root.to_string_lossy());
        if !ctx.path_info().is_empty() {
            let translated = format!(
                "{}{}",
                root.to_string_lossy().trim_end_matches('/'),
                ctx.path_info()
            );
            env.set("PATH_TRANSLATED", translated);
        }
    }

    if let Some(addr) = ctx.remote_addr() {
        env.set("REMOTE_ADDR", addr.ip().to_string());
        env.set("REMOTE_PORT", addr.port().to_string());
    }

    if let Some(content_type) = ctx.headers().get(header::CONTENT_TYPE) {
        env.set(
            "CONTENT_TYPE",
            String::from_utf8_lossy(content_type.as_bytes()),
        );
    }
    if !ctx.body().is_empty() {
        env.set("CONTENT_LENGTH", ctx.body().len().to_string());
    }

    let mut names: Vec<_> = ctx.headers().keys().collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    for name in names {
        if *name == header::CONTENT_TYPE || *name == header::CONTENT_LENGTH || name.as_str() == "proxy" {
            // Proxy is never exported (httpoxy).
            continue;
        }
        let separator = if *name == header::COOKIE { "; " } else { ", " };
        let value = ctx
            .headers()
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(separator);
        env.set(cgi_variable_name(name.as_str()), value);
    }

    env
}

/// `HTTP_` plus the header name uppercased, non-alphanumerics replaced by `_`.
pub fn cgi_variable_name(header_name: &str) -> String {
    let mut name = String::with_capacity(header_name.len() + 5);
    name.push_str("HTTP_");
    name.extend(header_name.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, Method};
    use std::path::PathBuf;

    fn command() -> ScriptCommand {
        ScriptCommand::interpreted("/bin/sh", "/srv/cgi-bin/env.sh")
    }

    fn request() -> RequestContext {
        RequestContext::builder(Method::POST, "/cgi-bin/env.sh")
            .path_info("/extra/path")
            .query("a=1&b=2")
            .header(
                HeaderName::from_static("content-type"),
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .header(
                HeaderName::from_static("x-custom-header"),
                HeaderValue::from_static("yes"),
            )
            .body("name=value")
            .remote_addr("192.0.2.7:51234".parse().unwrap())
            .server("example.test", 8080)
            .build()
    }

    #[test]
    fn test_required_variables() {
        let env = build_environment(&request(), &command(), &ServerMetadata::default());

        assert_eq!(env.get("REQUEST_METHOD"), Some("POST"));
        assert_eq!(env.get("QUERY_STRING"), Some("a=1&b=2"));
        assert_eq!(env.get("CONTENT_TYPE"), Some("application/x-www-form-urlencoded"));
        assert_eq!(env.get("CONTENT_LENGTH"), Some("10"));
        assert_eq!(env.get("SCRIPT_NAME"), Some("/cgi-bin/env.sh"));
        assert_eq!(env.get("SCRIPT_FILENAME"), Some("/srv/cgi-bin/env.sh"));
        assert_eq!(env.get("PATH_INFO"), Some("/extra/path"));
        assert_eq!(env.get("SERVER_NAME"), Some("example.test"));
        assert_eq!(env.get("SERVER_PORT"), Some("8080"));
        assert_eq!(env.get("SERVER_PROTOCOL"), Some("HTTP/1.1"));
        assert_eq!(env.get("GATEWAY_INTERFACE"), Some("CGI/1.1"));
        assert_eq!(env.get("REMOTE_ADDR"), Some("192.0.2.7"));
        assert_eq!(env.get("REMOTE_PORT"), Some("51234"));
        assert_eq!(env.get("REQUEST_URI"), Some("/cgi-bin/env.sh/extra/path?a=1&b=2"));
        assert_eq!(env.get("HTTP_X_CUSTOM_HEADER"), Some("yes"));
    }

    #[test]
    fn test_content_length_absent_for_empty_body() {
        let ctx = RequestContext::builder(Method::GET, "/cgi-bin/env.sh").build();
        let env = build_environment(&ctx, &command(), &ServerMetadata::default());
        assert!(!env.contains("CONTENT_LENGTH"));
        assert!(!env.contains("CONTENT_TYPE"));
        assert!(!env.contains("REMOTE_ADDR"));
        assert_eq!(env.get("QUERY_STRING"), Some(""));
        assert_eq!(env.get("PATH_INFO"), Some(""));
    }

    #[test]
    fn test_content_headers_not_duplicated() {
        let env = build_environment(&request(), &command(), &ServerMetadata::default());
        assert!(!env.contains("HTTP_CONTENT_TYPE"));
        assert!(!env.contains("HTTP_CONTENT_LENGTH"));
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let ctx = RequestContext::builder(Method::GET, "/x")
            .header(header::ACCEPT, HeaderValue::from_static("text/html"))
            .header(header::ACCEPT, HeaderValue::from_static("*/*"))
            .header(header::COOKIE, HeaderValue::from_static("a=1"))
            .header(header::COOKIE, HeaderValue::from_static("b=2"))
            .build();
        let env = build_environment(&ctx, &command(), &ServerMetadata::default());
        assert_eq!(env.get("HTTP_ACCEPT"), Some("text/html, */*"));
        assert_eq!(env.get("HTTP_COOKIE"), Some("a=1; b=2"));
    }

    #[test]
    fn test_proxy_header_is_never_exported() {
        let ctx = RequestContext::builder(Method::GET, "/x")
            .header(
                HeaderName::from_static("proxy"),
                HeaderValue::from_static("http://attacker.test:3128"),
            )
            .build();
        let env = build_environment(&ctx, &command(), &ServerMetadata::default());
        assert!(!env.contains("HTTP_PROXY"));
    }

    #[test]
    fn test_document_root_and_passthrough() {
        let mut server = ServerMetadata {
            document_root: Some(PathBuf::from("/var/www/")),
            ..ServerMetadata::default()
        };
        server.passthrough.insert("PATH".into(), "/usr/bin:/bin".into());
        // A passthrough name that collides with a request variable loses.
        server.passthrough.insert("REQUEST_METHOD".into(), "BOGUS".into());

        let env = build_environment(&request(), &command(), &server);
        assert_eq!(env.get("DOCUMENT_ROOT"), Some("/var/www/"));
        assert_eq!(env.get("PATH_TRANSLATED"), Some("/var/www/extra/path"));
        assert_eq!(env.get("PATH"), Some("/usr/bin:/bin"));
        assert_eq!(env.get("REQUEST_METHOD"), Some("POST"));
    }

    #[test]
    fn test_deterministic() {
        let server = ServerMetadata::default();
        let a = build_environment(&request(), &command(), &server);
        let b = build_environment(&request(), &command(), &server);
        assert_eq!(a, b);
    }

    #[test]
    fn test_variable_naming() {
        assert_eq!(cgi_variable_name("user-agent"), "HTTP_USER_AGENT");
        assert_eq!(cgi_variable_name("x.weird~name"), "HTTP_X_WEIRD_NAME");
        assert_eq!(cgi_variable_name("dnt"), "HTTP_DNT");
    }
}
