use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use robotstxt::DefaultMatcher;
use trawler_core::error::CrawlError;
use trawler_core::limiter::RateLimiter;

/// Per-origin robots.txt gate.
///
/// Fetches `/robots.txt` once per origin and caches the body with a TTL.
/// Evaluation is conservative in the crawler's favor only when the file
/// cannot be fetched at all: missing or unreachable robots.txt allows
/// everything, a present one is honored exactly.
#[derive(Clone)]
pub struct RobotsGate {
    client: reqwest::Client,
    cache: Cache<String, Arc<String>>,
    /// Product token matched against `User-agent:` groups.
    agent: String,
}

impl RobotsGate {
    pub fn new(agent: impl Into<String>) -> Result<Self, CrawlError> {
        Self::with_ttl(agent, Duration::from_secs(3600))
    }

    pub fn with_ttl(agent: impl Into<String>, ttl: Duration) -> Result<Self, CrawlError> {
        let agent = agent.into();
        let client = reqwest::Client::builder()
            .user_agent(agent.clone())
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CrawlError::Config(format!("failed to build robots client: {e}")))?;

        let cache = Cache::builder().max_capacity(1024).time_to_live(ttl).build();

        Ok(Self {
            client,
            cache,
            agent,
        })
    }

    /// Whether `url` may be fetched according to its origin's robots.txt.
    pub async fn allowed(&self, url: &str) -> bool {
        let Some(origin) = RateLimiter::origin_key(url) else {
            return true;
        };

        let robots = self
            .cache
            .get_with(origin.clone(), async {
                Arc::new(self.fetch_robots(&origin).await)
            })
            .await;

        if robots.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&robots, &self.agent, url)
    }

    async fn fetch_robots(&self, origin: &str) -> String {
        let robots_url = format!("{origin}/robots.txt");
        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => {
                response.text().await.unwrap_or_default()
            }
            Ok(response) => {
                tracing::debug!(
                    robots_url = %robots_url,
                    status = response.status().as_u16(),
                    "No robots.txt; allowing all"
                );
                String::new()
            }
            Err(e) => {
                tracing::debug!(robots_url = %robots_url, error = %e, "robots.txt unreachable; allowing all");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROBOTS: &str = "User-agent: *\nDisallow: /private\n";

    #[tokio::test]
    async fn honors_disallow_rules() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS))
            .mount(&server)
            .await;

        let gate = RobotsGate::new("Trawler").unwrap();
        assert!(gate.allowed(&format!("{}/public/page", server.uri())).await);
        assert!(!gate.allowed(&format!("{}/private/page", server.uri())).await);
    }

    #[tokio::test]
    async fn missing_robots_allows_everything() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gate = RobotsGate::new("Trawler").unwrap();
        assert!(gate.allowed(&format!("{}/anything", server.uri())).await);
    }

    #[tokio::test]
    async fn robots_is_fetched_once_per_origin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS))
            .expect(1)
            .mount(&server)
            .await;

        let gate = RobotsGate::new("Trawler").unwrap();
        for i in 0..5 {
            gate.allowed(&format!("{}/page/{i}", server.uri())).await;
        }
    }

    #[tokio::test]
    async fn agent_specific_group_applies() {
        let server = MockServer::start().await;
        let robots = "User-agent: Trawler\nDisallow: /\n\nUser-agent: *\nAllow: /\n";
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(robots))
            .mount(&server)
            .await;

        let gate = RobotsGate::new("Trawler").unwrap();
        assert!(!gate.allowed(&format!("{}/page", server.uri())).await);

        let other = RobotsGate::new("OtherBot").unwrap();
        assert!(other.allowed(&format!("{}/page", server.uri())).await);
    }
}
