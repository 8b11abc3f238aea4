use crate::config::RouteConfig;

/// Access class of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Requires a session.
    Protected,
    /// Only meaningful without a session (sign-in, sign-up).
    AuthOnly,
    Public,
}

#[derive(Debug, Clone)]
pub struct RouteClassifier {
    protected_prefixes: Vec<String>,
    auth_pages: Vec<String>,
}

impl RouteClassifier {
    pub fn new(config: &RouteConfig) -> Self {
        Self {
            protected_prefixes: config.protected_prefixes.clone(),
            auth_pages: config.auth_pages.clone(),
        }
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        if self
            .protected_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            RouteClass::Protected
        } else if self.auth_pages.iter().any(|page| page == path) {
            RouteClass::AuthOnly
        } else {
            RouteClass::Public
        }
    }
}
