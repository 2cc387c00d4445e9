/// Base URLs of the hosted project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoints {
    pub auth_url: String,
    pub graphql_url: String,
}

impl BackendEndpoints {
    pub fn new(auth_url: impl Into<String>, graphql_url: impl Into<String>) -> Self {
        Self {
            auth_url: trim_trailing_slash(auth_url.into()),
            graphql_url: trim_trailing_slash(graphql_url.into()),
        }
    }

    /// Derives the service URLs Nhost assigns to a project.
    pub fn from_subdomain(subdomain: &str, region: &str) -> Self {
        let subdomain = subdomain.trim();
        let region = region.trim();
        Self::new(
            format!("https://{subdomain}.auth.{region}.nhost.run/v1"),
            format!("https://{subdomain}.graphql.{region}.nhost.run/v1"),
        )
    }

    pub fn auth_route(&self, route: &str) -> String {
        format!("{}/{}", self.auth_url, route.trim_start_matches('/'))
    }

    /// WebSocket form of the GraphQL URL, used for subscriptions.
    pub fn graphql_ws_url(&self) -> String {
        if let Some(rest) = self.graphql_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.graphql_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.graphql_url.clone()
        }
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
