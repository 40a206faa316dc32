use std::collections::HashSet;

use super::handler::{AuthenticatorRef, HandlerEntry, HandlerRef};
use crate::server::error::ServerError;

/// A route installed at start: path plus the entry's handler and
/// authenticator.
#[derive(Clone)]
pub struct Route {
    path: String,
    handler: HandlerRef,
    authenticator: Option<AuthenticatorRef>,
}

impl Route {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    pub fn authenticator(&self) -> Option<&AuthenticatorRef> {
        self.authenticator.as_ref()
    }
}

/// Route table built once from the registry, read-only afterwards.
///
/// A request path matches every route whose path is a prefix of it; the
/// longest such route wins.
#[derive(Clone, Default)]
pub struct Muxer {
    routes: Vec<Route>,
}

impl Muxer {
    pub fn new(entries: &[HandlerEntry]) -> Result<Self, ServerError> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(entries.len());
        for entry in entries {
            if !seen.insert(entry.path()) {
                return Err(ServerError::DuplicateRoute(entry.path().to_string()));
            }
            routes.push(Route {
                path: entry.path().to_string(),
                handler: entry.handler().clone(),
                authenticator: entry.authenticator().cloned(),
            });
        }
        // longest first, so the first prefix hit is the most specific one
        routes.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Ok(Self { routes })
    }

    pub fn get_route(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| path.starts_with(r.path.as_str()))
    }
}

#[cfg(test)]
mod matcher_test {
    use super::*;
    use crate::server::http::{Request, Response, ExchangeContext, AuthOutcome};

    fn entry(path: &str, body: &'static str) -> HandlerEntry {
        HandlerEntry::new(path, move |_: &Request, res: &mut Response| {
            res.set_body(body);
        })
    }

    fn run(route: &Route) -> String {
        let req = Request::new("GET", route.path(), "HTTP/1.1", Default::default(), b"");
        let mut res = Response::default();
        route.handler().handle(&req, &mut res);
        res.body().to_string()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mux = Muxer::new(&[
            entry("/", "root"),
            entry("/api/users", "users"),
            entry("/api", "api"),
        ]).unwrap();

        assert_eq!(run(mux.get_route("/api/users/7").unwrap()), "users");
        assert_eq!(run(mux.get_route("/api/orders").unwrap()), "api");
        assert_eq!(run(mux.get_route("/index.html").unwrap()), "root");
    }

    #[test]
    fn test_not_matched() {
        let mux = Muxer::new(&[entry("/a", "a"), entry("/b", "b")]).unwrap();
        assert_eq!(run(mux.get_route("/a").unwrap()), "a");
        assert_eq!(run(mux.get_route("/b").unwrap()), "b");
        assert!(mux.get_route("/c").is_none());
        assert!(mux.get_route("").is_none());
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        match Muxer::new(&[entry("/get", "1"), entry("/post", "2"), entry("/get", "3")]) {
            Err(ServerError::DuplicateRoute(path)) => assert_eq!(path, "/get"),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("duplicate path accepted"),
        }
    }

    #[test]
    fn test_authenticator_is_carried() {
        let guarded = entry("/secret", "s")
            .with_authenticator(|_: &ExchangeContext| AuthOutcome::Deny);
        let mux = Muxer::new(&[guarded, entry("/open", "o")]).unwrap();
        assert!(mux.get_route("/secret").unwrap().authenticator().is_some());
        assert!(mux.get_route("/open").unwrap().authenticator().is_none());
    }
}
