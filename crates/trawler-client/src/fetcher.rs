use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use trawler_core::error::CrawlError;
use trawler_core::fetch::{FetchResponse, Fetcher};
use trawler_core::limiter::RateLimiter;
use url::Url;

use crate::robots::RobotsGate;

/// Fetch policy: per-request timeout, retry budget, and backoff shape.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-attempt request timeout. A timed-out attempt is abandoned and
    /// retried per policy, never resumed.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub backoff_base: Duration,
    /// Ceiling for any single retry delay, including `Retry-After` hints.
    pub backoff_cap: Duration,
    pub max_body_bytes: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
            max_body_bytes: 5_000_000,
            user_agent: "Trawler/0.3 (+https://github.com/trawler-rs/trawler)".to_string(),
        }
    }
}

/// HTTP fetch client using reqwest.
///
/// Every attempt first takes a slot from the shared per-origin
/// [`RateLimiter`]. Transient failures (timeout, connect failure, 5xx, 429)
/// are retried with exponential backoff and jitter up to `max_attempts`;
/// 429 honors a parseable `Retry-After` hint. Permanent failures (other
/// 4xx, DNS failure, SSRF rejection, robots disallow) fail immediately.
///
/// By default SSRF protection is **enabled** — requests to private/reserved
/// IP ranges are blocked. Use [`allow_private_urls`](Self::allow_private_urls)
/// to disable this (e.g., for local testing against a loopback server).
#[derive(Clone)]
pub struct HttpFetchClient {
    client: Client,
    config: FetchConfig,
    limiter: RateLimiter,
    robots: Option<RobotsGate>,
    ssrf_protection: bool,
}

impl HttpFetchClient {
    pub fn new(limiter: RateLimiter) -> Result<Self, CrawlError> {
        Self::with_config(limiter, FetchConfig::default())
    }

    pub fn with_config(limiter: RateLimiter, config: FetchConfig) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CrawlError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            config,
            limiter,
            robots: None,
            ssrf_protection: true,
        })
    }

    /// Check robots.txt before every fetch; disallowed URLs fail
    /// permanently without a request.
    pub fn with_robots_gate(mut self, gate: RobotsGate) -> Self {
        self.robots = Some(gate);
        self
    }

    /// Disable SSRF protection, allowing requests to private/reserved IPs.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }

    /// One attempt. The error side carries an optional server-supplied
    /// retry delay (from `Retry-After` on 429).
    async fn attempt(&self, url: &str) -> Result<FetchResponse, (CrawlError, Option<Duration>)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| (self.classify_send_error(e), None))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        if response.status().is_success() {
            let body = response.text().await.map_err(|e| {
                (
                    CrawlError::fetch_transient(format!("failed to read body: {e}"), Some(status)),
                    None,
                )
            })?;

            if body.len() > self.config.max_body_bytes {
                return Err((
                    CrawlError::fetch_permanent(
                        format!("response too large: {} bytes for {url}", body.len()),
                        Some(status),
                    ),
                    None,
                ));
            }

            return Ok(FetchResponse {
                status,
                headers,
                body,
                final_url,
            });
        }

        if status == 429 {
            let retry_after = headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case("retry-after"))
                .and_then(|(_, v)| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err((
                CrawlError::fetch_transient(format!("HTTP 429 for {url}"), Some(status)),
                retry_after,
            ));
        }

        if response.status().is_server_error() {
            return Err((
                CrawlError::fetch_transient(format!("HTTP {status} for {url}"), Some(status)),
                None,
            ));
        }

        Err((
            CrawlError::fetch_permanent(format!("HTTP {status} for {url}"), Some(status)),
            None,
        ))
    }

    fn classify_send_error(&self, error: reqwest::Error) -> CrawlError {
        if error.is_timeout() {
            return CrawlError::Timeout(self.config.timeout.as_secs());
        }
        let message = error.to_string();
        if error.is_connect() {
            // DNS failure is permanent; refused/reset connections are not.
            if message.contains("dns") {
                return CrawlError::fetch_permanent(format!("DNS failure: {message}"), None);
            }
            return CrawlError::fetch_transient(format!("connection failed: {message}"), None);
        }
        CrawlError::fetch_permanent(message, None)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .backoff_base
            .saturating_mul(1u32 << (attempt - 1).min(16));
        let delay = exp.min(self.config.backoff_cap);
        delay + jitter(delay / 10)
    }
}

impl Fetcher for HttpFetchClient {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, CrawlError> {
        if self.ssrf_protection {
            validate_target(url).await?;
        } else {
            validate_scheme(url)?;
        }

        if let Some(robots) = &self.robots {
            if !robots.allowed(url).await {
                return Err(CrawlError::fetch_permanent(
                    format!("disallowed by robots.txt: {url}"),
                    None,
                ));
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            // A limiter timeout is the caller's problem, not the target's;
            // it is not part of the retry budget.
            self.limiter.acquire_url(url).await?;

            match self.attempt(url).await {
                Ok(response) => {
                    tracing::debug!(url, status = response.status, attempt, "Fetched");
                    return Ok(response);
                }
                Err((error, retry_after)) => {
                    if !error.is_retryable() || attempt >= self.config.max_attempts {
                        return Err(error);
                    }
                    let delay = retry_after
                        .unwrap_or_else(|| self.backoff_delay(attempt))
                        .min(self.config.backoff_cap);
                    tracing::warn!(
                        url,
                        attempt,
                        error = %error,
                        delay_ms = %delay.as_millis(),
                        "Transient fetch failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// Jitter without the rand crate: xorshift over the clock.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    Duration::from_millis(x % max_ms)
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

fn validate_scheme(url: &str) -> Result<Url, CrawlError> {
    let parsed = Url::parse(url)
        .map_err(|e| CrawlError::fetch_permanent(format!("invalid URL '{url}': {e}"), None))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(CrawlError::fetch_permanent(
            format!("URL scheme '{scheme}' is not allowed (only http/https)"),
            None,
        )),
    }
}

/// Validate a URL to prevent server-side request forgery (SSRF).
///
/// 1. Only allow `http` and `https` schemes.
/// 2. Resolve the hostname via DNS.
/// 3. Reject if any resolved IP is private/reserved.
async fn validate_target(url: &str) -> Result<(), CrawlError> {
    let parsed = validate_scheme(url)?;

    let host = parsed
        .host_str()
        .ok_or_else(|| CrawlError::fetch_permanent("URL has no host", None))?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(CrawlError::fetch_permanent(
                format!("SSRF blocked: {host} is a private/reserved IP"),
                None,
            ));
        }
        return Ok(());
    }

    let port = parsed.port_or_known_default().unwrap_or(443);
    let addr = format!("{host}:{port}");
    let addrs: Vec<_> = tokio::net::lookup_host(&addr)
        .await
        .map_err(|e| {
            CrawlError::fetch_permanent(format!("DNS resolution failed for {host}: {e}"), None)
        })?
        .collect();

    if addrs.is_empty() {
        return Err(CrawlError::fetch_permanent(
            format!("DNS resolution returned no addresses for {host}"),
            None,
        ));
    }

    for socket_addr in &addrs {
        if is_private_ip(socket_addr.ip()) {
            return Err(CrawlError::fetch_permanent(
                format!(
                    "SSRF blocked: {host} resolves to private/reserved IP {}",
                    socket_addr.ip()
                ),
                None,
            ));
        }
    }

    Ok(())
}

/// Check if an IP address is in a private/reserved/link-local range.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()           // 127.0.0.0/8
                || v4.is_private()     // 10/8, 172.16/12, 192.168/16
                || v4.is_link_local()  // 169.254.0.0/16 (cloud metadata!)
                || v4.is_unspecified() // 0.0.0.0
                || v4.is_broadcast()   // 255.255.255.255
                || v4.is_documentation() // 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64 // 100.64.0.0/10 (CGN)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()       // ::1
                || v6.is_unspecified() // ::
                // fe80::/10 (link-local)
                || (v6.segments()[0] & 0xFFC0) == 0xFE80
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xFE00) == 0xFC00
                // IPv4-mapped IPv6 (::ffff:x.x.x.x) — check the embedded v4
                || match v6.to_ipv4_mapped() {
                    Some(v4) => is_private_ip(IpAddr::V4(v4)),
                    None => false,
                }
        }
    }
}
