//! Script resolution below a matched route.
//!
//! The path remainder after the route prefix is walked one segment at a time.
//! The first segment that names a runnable script ends the script path; the
//! untouched rest of the URL path becomes `PATH_INFO`.

use std::path::Path;

use crate::gateway::ScriptCommand;
use crate::routing::router::CompiledRoute;

/// Result of resolving a request path.
#[derive(Debug)]
pub enum Resolution<'r> {
    Script(ResolvedScript<'r>),
    /// No route matched the request.
    NoRoute,
    /// A route matched, but no script exists at that path.
    NotFound,
    /// The path contains segments that could escape the route root.
    Forbidden,
}

/// A runnable script and the URL split around it.
#[derive(Debug)]
pub struct ResolvedScript<'r> {
    pub route: &'r CompiledRoute,
    /// URL path up to and including the script (`SCRIPT_NAME`).
    pub script_name: String,
    /// Raw remainder of the URL path (`PATH_INFO`), empty when none.
    pub path_info: String,
    pub command: ScriptCommand,
}

/// Find the script named by `path` under `route`.
pub fn resolve_script<'r>(route: &'r CompiledRoute, path: &str) -> Resolution<'r> {
    let Some(rest) = path.strip_prefix(route.prefix()) else {
        return Resolution::NotFound;
    };
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Resolution::NotFound;
    }

    let mut candidate = route.root().to_path_buf();
    let mut consumed = route.prefix().len();

    for segment in rest.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Resolution::Forbidden;
        }
        candidate.push(segment);
        consumed += 1 + segment.len();

        let command = match extension(segment).and_then(|ext| route.interpreter_for(&ext)) {
            Some(interpreter) if candidate.is_file() => {
                Some(ScriptCommand::interpreted(interpreter, &candidate))
            }
            Some(_) => return Resolution::NotFound,
            None if route.allow_executables() && candidate.is_file() => {
                Some(ScriptCommand::direct(&candidate))
            }
            None => None,
        };

        if let Some(command) = command {
            return Resolution::Script(ResolvedScript {
                route,
                script_name: path[..consumed].to_string(),
                path_info: path[consumed..].to_string(),
                command,
            });
        }
        if !candidate.is_dir() {
            return Resolution::NotFound;
        }
    }

    Resolution::NotFound
}

/// `.py` for `app.py`; `None` for names without an extension.
fn extension(segment: &str) -> Option<String> {
    Path::new(segment)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
}
