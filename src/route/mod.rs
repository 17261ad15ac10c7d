//! Route table: map URL patterns and HTTP methods to handler functions.
//!
//! [`RouteTable`] dispatches incoming requests to handlers by request method
//! and URL path. Three pattern styles are supported:
//!
//! | Pattern              | Example match              | Captured params                 |
//! |----------------------|----------------------------|---------------------------------|
//! | `/users`             | `/users`                   | *(none)*                        |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                     |
//! | `/files/*`           | `/files/docs/readme.txt`   | `wildcard → "/docs/readme.txt"` |
//!
//! Literal patterns match exactly; prefix matching is opt-in via the `/*`
//! suffix. Trailing slashes are normalized on both patterns and incoming
//! paths, so `/users/` and `/users` are equivalent.
//!
//! Routes are evaluated in registration order; the first route whose method
//! and pattern both match wins. When nothing matches, dispatch returns
//! `404 Not Found`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::http::{IntoReply, Method, Request, Response, StatusCode};

/// Type-erased, heap-allocated async handler.
///
/// Stored behind `Arc<dyn Fn(…)>` so handlers can be shared across tokio
/// tasks without copying the underlying closure. Registration goes through
/// [`RouteTable::add`] or the server builder; this type is never constructed
/// directly.
pub type Handler =
    Arc<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Request) -> impl Future` whose output converts via [`IntoReply`]
/// implements this automatically, so handlers can return a `String`, a
/// `&'static str`, a [`Response`], or a `Result<Response, serde_json::Error>`.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler, boxing the returned future.
    fn call(&self, request: Request) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<F, Fut, R> IntoHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, request: Request) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let fut = (self)(request);
        Box::pin(async move { fut.await.into_reply() })
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Capture(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/users`.
    Exact(String),
    // Fixed number of segments, some of which may be named captures.
    Parameterized(Vec<Segment>),
    // Matches any path sharing the prefix, e.g. `/files/*`.
    Wildcard(String),
}

impl Pattern {
    // Classification order: `/*` suffix → Wildcard, `:` anywhere →
    // Parameterized, otherwise Exact. A trailing slash (other than the
    // root `/`) is stripped first so `/users/` and `/users` compile alike.
    fn parse(pattern: &str) -> Self {
        let pattern = normalize(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Capture(name.to_string()),
                    None => Segment::Literal(s.to_string()),
                })
                .collect();
            return Pattern::Parameterized(segments);
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path`, returning captured parameters on success.
    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let path = normalize(path);

        match self {
            Pattern::Exact(p) => (p == path).then(HashMap::new),
            Pattern::Parameterized(segments) => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = HashMap::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Literal(s) => {
                            if s != path_seg {
                                return None;
                            }
                        }
                        Segment::Capture(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => path.strip_prefix(prefix.as_str()).map(|suffix| {
                let mut params = HashMap::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                params
            }),
        }
    }
}

// Strips a trailing slash, except on the root path.
fn normalize(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

/// Prefixes `pattern` with `base`, so that registering `pattern` on a server
/// with base path `base` is equivalent to registering `base + pattern` on a
/// server without one.
pub fn compose_path(base: &str, pattern: &str) -> String {
    if base.is_empty() {
        return pattern.to_string();
    }
    let base = base.trim_end_matches('/');
    if pattern == "/" {
        format!("{base}/")
    } else {
        format!("{base}{pattern}")
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    // Returns captured params when both the method and the pattern match.
    fn matches(&self, method: &Method, path: &str) -> Option<HashMap<String, String>> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// Ordered table of routes resolved against incoming requests.
///
/// # Examples
///
/// ```
/// use tinyrest::{Method, RouteTable};
///
/// let mut table = RouteTable::new();
/// table.add(Method::Get, "/ping", |_req| async { "pong" });
/// table.add(Method::Get, "/users/:id", |req: tinyrest::Request| async move {
///     format!("user {}", req.param("id").unwrap_or("?"))
/// });
/// assert_eq!(table.len(), 2);
/// ```
pub struct RouteTable {
    routes: Vec<Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers `handler` for requests matching `method` and `pattern`.
    pub fn add(&mut self, method: Method, pattern: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |request| handler.call(request));
        self.add_erased(method, pattern, handler);
    }

    // Registration path for handlers that are already type-erased.
    pub(crate) fn add_erased(&mut self, method: Method, pattern: &str, handler: Handler) {
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(pattern),
            handler,
        });
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches `request` to the first matching route.
    ///
    /// Routes are tested in registration order; earlier registrations take
    /// precedence over later ones for the same method and pattern. When no
    /// route matches, a `404 Not Found` response is returned.
    pub async fn dispatch(&self, mut request: Request) -> Response {
        for route in &self.routes {
            if let Some(params) = route.matches(request.method(), request.path()) {
                request.set_path_params(params);
                return (route.handler)(request).await;
            }
        }

        debug!(method = %request.method(), path = %request.path(), "no route matched");
        Response::new(StatusCode::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    fn get(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    // ── Pattern ───────────────────────────────────────────────────────────

    #[test]
    fn exact_pattern_matches_itself_only() {
        let pat = Pattern::parse("/users");
        assert!(pat.matches("/users").is_some());
        assert!(pat.matches("/users/").is_some());
        assert!(pat.matches("/users/42").is_none());
        assert!(pat.matches("/posts").is_none());
    }

    #[test]
    fn root_pattern() {
        let pat = Pattern::parse("/");
        assert!(pat.matches("/").is_some());
        assert!(pat.matches("/other").is_none());
    }

    #[test]
    fn capture_pattern_extracts_values() {
        let pat = Pattern::parse("/users/:id/posts/:post_id");
        let params = pat.matches("/users/7/posts/99").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
        assert_eq!(params.get("post_id").map(String::as_str), Some("99"));
    }

    #[test]
    fn capture_pattern_segment_count_must_match() {
        let pat = Pattern::parse("/users/:id");
        assert!(pat.matches("/users").is_none());
        assert!(pat.matches("/users/42/extra").is_none());
    }

    #[test]
    fn wildcard_pattern_prefix_match() {
        let pat = Pattern::parse("/files/*");
        let params = pat.matches("/files/docs/readme.txt").unwrap();
        assert_eq!(
            params.get("wildcard").map(String::as_str),
            Some("/docs/readme.txt")
        );
        assert!(pat.matches("/other/readme.txt").is_none());
    }

    // ── compose_path ──────────────────────────────────────────────────────

    #[test]
    fn compose_empty_base_is_identity() {
        assert_eq!(compose_path("", "/users"), "/users");
        assert_eq!(compose_path("", "/"), "/");
    }

    #[test]
    fn compose_prefixes_base() {
        assert_eq!(compose_path("/ApiMocking", "/"), "/ApiMocking/");
        assert_eq!(
            compose_path("/ApiMocking", "/api/authorize"),
            "/ApiMocking/api/authorize"
        );
        assert_eq!(compose_path("/api/", "/users"), "/api/users");
    }

    // ── dispatch ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_table_returns_404() {
        let table = RouteTable::new();
        let res = table.dispatch(get("/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn matched_route_returns_handler_body() {
        let mut table = RouteTable::new();
        table.add(Method::Get, "/hello", |_req| async { "bonjour" });
        let res = table.dispatch(get("/hello")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"bonjour");
    }

    #[tokio::test]
    async fn unmatched_path_returns_404() {
        let mut table = RouteTable::new();
        table.add(Method::Get, "/hello", |_req| async { "bonjour" });
        let res = table.dispatch(get("/world")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn method_mismatch_returns_404() {
        let mut table = RouteTable::new();
        table.add(Method::Get, "/hello", |_req| async { "bonjour" });
        let res = table.dispatch(request("POST", "/hello")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let mut table = RouteTable::new();
        table.add(Method::Get, "/path", |_req| async { "first" });
        table.add(Method::Get, "/path", |_req| async { "second" });
        let res = table.dispatch(get("/path")).await;
        assert_eq!(res.body_ref(), b"first");
    }

    #[tokio::test]
    async fn captured_params_reach_the_handler() {
        let mut table = RouteTable::new();
        table.add(Method::Get, "/users/:id", |req: Request| async move {
            req.param("id").unwrap_or("?").to_owned()
        });
        let res = table.dispatch(get("/users/42")).await;
        assert_eq!(res.body_ref(), b"42");
    }

    #[tokio::test]
    async fn handler_owned_counter_state() {
        let count = Arc::new(AtomicU64::new(0));
        let mut table = RouteTable::new();
        let counter = Arc::clone(&count);
        table.add(Method::Get, "/", move |_req| {
            let counter = Arc::clone(&counter);
            async move { format!("coucou {}", counter.fetch_add(1, Ordering::SeqCst)) }
        });

        let first = table.dispatch(get("/")).await;
        assert_eq!(first.body_ref(), b"coucou 0");
        let second = table.dispatch(get("/")).await;
        assert_eq!(second.body_ref(), b"coucou 1");
    }

    #[tokio::test]
    async fn json_reply_round_trips() {
        use serde::{Deserialize, Serialize};

        #[derive(Serialize, Deserialize)]
        struct Greeting {
            #[serde(rename = "Text")]
            text: String,
        }

        let mut table = RouteTable::new();
        table.add(Method::Get, "/json", |_req| async {
            Response::json(&Greeting {
                text: "coucou 0".to_owned(),
            })
        });

        let res = table.dispatch(get("/json")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let parsed: Greeting = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(parsed.text, "coucou 0");
    }

    #[tokio::test]
    async fn composed_base_path_equivalent_to_direct_registration() {
        let mut composed = RouteTable::new();
        composed.add(
            Method::Get,
            &compose_path("/learning", "/json"),
            |_req| async { "ok" },
        );

        let mut direct = RouteTable::new();
        direct.add(Method::Get, "/learning/json", |_req| async { "ok" });

        for table in [&composed, &direct] {
            let res = table.dispatch(get("/learning/json")).await;
            assert_eq!(res.status(), StatusCode::Ok);
            let res = table.dispatch(get("/json")).await;
            assert_eq!(res.status(), StatusCode::NotFound);
        }
    }
}
