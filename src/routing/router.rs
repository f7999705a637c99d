//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Each route carries its merged execution limits, computed once here
//! - Explicit NoMatch rather than silent default

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{ExecutionConfig, RouteConfig};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, RouteRequest};
use crate::routing::resolve::{resolve_script, Resolution};

/// A route ready for matching.
#[derive(Debug)]
pub struct CompiledRoute {
    name: String,
    prefix: String,
    matcher: AndMatcher,
    root: PathBuf,
    interpreters: BTreeMap<String, PathBuf>,
    allow_executables: bool,
    limits: ExecutionConfig,
}

impl CompiledRoute {
    fn compile(config: &RouteConfig, defaults: &ExecutionConfig) -> Self {
        let prefix = PathPrefixMatcher::new(config.path_prefix.as_str());
        let normalized = prefix.prefix().to_string();

        let mut matchers: Vec<Box<dyn Matcher>> = vec![Box::new(prefix)];
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.as_str())));
        }

        Self {
            name: config.name.clone(),
            prefix: normalized,
            matcher: AndMatcher::new(matchers),
            root: config.root.clone(),
            interpreters: config
                .interpreters
                .iter()
                .map(|(ext, interpreter)| (ext.to_ascii_lowercase(), interpreter.clone()))
                .collect(),
            allow_executables: config.allow_executables,
            limits: defaults.overridden_by(config),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized path prefix (no trailing slash; empty for `/`).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Interpreter registered for a file extension such as `.py`.
    pub fn interpreter_for(&self, extension: &str) -> Option<&Path> {
        self.interpreters
            .get(&extension.to_ascii_lowercase())
            .map(PathBuf::as_path)
    }

    pub fn allow_executables(&self) -> bool {
        self.allow_executables
    }

    /// Execution limits with this route's overrides applied.
    pub fn limits(&self) -> &ExecutionConfig {
        &self.limits
    }
}

/// The compiled routing table.
#[derive(Debug, Default)]
pub struct CgiRouter {
    routes: Vec<CompiledRoute>,
}

impl CgiRouter {
    /// Compile routes, highest priority first. Equal priorities keep file order.
    pub fn from_config(routes: &[RouteConfig], defaults: &ExecutionConfig) -> Self {
        let mut ordered: Vec<&RouteConfig> = routes.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let routes = ordered
            .into_iter()
            .map(|route| CompiledRoute::compile(route, defaults))
            .collect();
        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route matching the request.
    pub fn match_request(&self, req: &RouteRequest<'_>) -> Option<&CompiledRoute> {
        self.routes.iter().find(|route| route.matcher.matches(req))
    }

    /// Match the request and resolve the script it names.
    pub fn resolve(&self, req: &RouteRequest<'_>) -> Resolution<'_> {
        match self.match_request(req) {
            Some(route) => resolve_script(route, req.path),
            None => Resolution::NoRoute,
        }
    }
}
