//! Route table module
//!
//! Maps URL paths of the single-page front-end to page components and
//! describes how the browser reflects navigation in the URL.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Page-level components of the front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Subscribe,
    Publish,
    DataDisplay,
}

impl Page {
    /// Component name as shipped in the front-end bundle
    pub const fn component(self) -> &'static str {
        match self {
            Self::Subscribe => "Subscribe",
            Self::Publish => "Publish",
            Self::DataDisplay => "DataDisplay",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.component())
    }
}

/// What a route does when it matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteTarget {
    /// Render a page component
    Page { page: Page },
    /// Forward navigation to another path of the table
    Redirect { to: String },
}

/// A single path-to-target entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    #[serde(flatten)]
    pub target: RouteTarget,
}

impl Route {
    pub fn page(path: impl Into<String>, page: Page) -> Self {
        Self {
            path: path.into(),
            target: RouteTarget::Page { page },
        }
    }

    pub fn redirect(path: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            target: RouteTarget::Redirect { to: to.into() },
        }
    }
}

/// Browser navigation strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    /// Path-based URLs (`/subscribe`), needs server-side fallback
    #[default]
    Web,
    /// Fragment-based URLs (`/#/subscribe`)
    Hash,
}

impl HistoryMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Hash => "hash",
        }
    }

    /// Browser-visible location for a route path
    pub fn href(self, path: &str) -> String {
        match self {
            Self::Web => path.to_string(),
            Self::Hash => format!("/#{path}"),
        }
    }
}

/// Route table construction errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("Route path '{0}' must start with '/'")]
    RelativePath(String),

    #[error("Route path '{0}' is not canonical (no query, fragment or trailing slash)")]
    NonCanonicalPath(String),

    #[error("Duplicate route path '{0}'")]
    DuplicatePath(String),

    #[error("Route '{from}' redirects to unknown path '{to}'")]
    UnknownRedirectTarget { from: String, to: String },

    #[error("Redirect cycle starting at '{0}'")]
    RedirectCycle(String),
}

/// Outcome of resolving a navigation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// A page route was reached, possibly through redirects
    Page {
        path: &'a str,
        page: Page,
        redirected_from: Option<String>,
    },
    /// No route is configured for the path
    NoMatch { path: String },
}

/// Immutable, validated route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
    history: HistoryMode,
}

impl RouteTable {
    /// Build a table from an ordered route list
    pub fn new(routes: Vec<Route>, history: HistoryMode) -> Result<Self, RouteTableError> {
        let mut seen = HashSet::new();
        for route in &routes {
            if !route.path.starts_with('/') {
                return Err(RouteTableError::RelativePath(route.path.clone()));
            }
            // Lookups normalise the request path, so only canonical paths can match
            if normalize_path(&route.path) != route.path {
                return Err(RouteTableError::NonCanonicalPath(route.path.clone()));
            }
            if !seen.insert(route.path.as_str()) {
                return Err(RouteTableError::DuplicatePath(route.path.clone()));
            }
        }

        for route in &routes {
            if let RouteTarget::Redirect { to } = &route.target {
                if normalize_path(to) != to.as_str() {
                    return Err(RouteTableError::NonCanonicalPath(to.clone()));
                }
                if !seen.contains(to.as_str()) {
                    return Err(RouteTableError::UnknownRedirectTarget {
                        from: route.path.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        let table = Self { routes, history };
        table.check_redirect_cycles()?;
        Ok(table)
    }

    /// The front-end's canonical table
    pub fn default_table() -> Self {
        Self {
            routes: vec![
                Route::redirect("/", "/subscribe"),
                Route::page("/subscribe", Page::Subscribe),
                Route::page("/publish", Page::Publish),
                Route::page("/analyze", Page::DataDisplay),
            ],
            history: HistoryMode::Web,
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub const fn history(&self) -> HistoryMode {
        self.history
    }

    /// Find the route configured for exactly this path
    pub fn match_path(&self, path: &str) -> Option<&Route> {
        let path = normalize_path(path);
        self.routes.iter().find(|route| route.path == path)
    }

    /// Follow redirects until a page route is reached
    pub fn resolve(&self, path: &str) -> Resolution<'_> {
        let Some(mut route) = self.match_path(path) else {
            return Resolution::NoMatch {
                path: normalize_path(path).to_string(),
            };
        };

        let mut redirected_from = None;
        // Construction rejects cycles, so a chain visits each route at most once
        for _ in 0..=self.routes.len() {
            match &route.target {
                RouteTarget::Page { page } => {
                    return Resolution::Page {
                        path: &route.path,
                        page: *page,
                        redirected_from,
                    };
                }
                RouteTarget::Redirect { to } => {
                    if redirected_from.is_none() {
                        redirected_from = Some(route.path.clone());
                    }
                    match self.match_path(to) {
                        Some(next) => route = next,
                        None => break,
                    }
                }
            }
        }

        Resolution::NoMatch {
            path: normalize_path(path).to_string(),
        }
    }

    fn check_redirect_cycles(&self) -> Result<(), RouteTableError> {
        for start in &self.routes {
            let mut visited = HashSet::new();
            let mut current = start;
            while let RouteTarget::Redirect { to } = &current.target {
                if !visited.insert(current.path.as_str()) {
                    return Err(RouteTableError::RedirectCycle(start.path.clone()));
                }
                match self.routes.iter().find(|r| r.path == *to) {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }
        Ok(())
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::default_table()
    }
}

/// Strip query, fragment and a single trailing slash
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else if path.is_empty() {
        "/"
    } else {
        path
    }
}
