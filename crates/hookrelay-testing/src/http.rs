//! Mock webhook sinks for delivery testing.

use std::time::Duration;

use serde_json::Value;
use wiremock::{
    matchers::{self, method},
    Mock, MockServer, Request, ResponseTemplate,
};

/// A chat webhook stand-in that records every POST.
pub struct MockSink {
    server: MockServer,
}

impl MockSink {
    /// Starts a new sink on a random port.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URL of the sink.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Full webhook URL for `path`.
    pub fn webhook_url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Accepts every POST to `route` with 204.
    pub async fn accept(&self, route: &str) {
        self.respond_always(route, 204).await;
    }

    /// Answers every POST to `route` with `status`.
    pub async fn respond_always(&self, route: &str, status: u16) {
        Mock::given(method("POST"))
            .and(matchers::path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Accepts every POST to `route` after `delay`.
    pub async fn accept_slowly(&self, route: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(matchers::path(route))
            .respond_with(ResponseTemplate::new(204).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Starts a scripted response sequence for `route`.
    pub fn sequence(&self, route: &str) -> ResponseSequence<'_> {
        ResponseSequence { server: &self.server, path: route.to_string(), responses: Vec::new() }
    }

    /// All requests received, in arrival order.
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received on `route`, in arrival order.
    pub async fn requests_to(&self, route: &str) -> Vec<Request> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|request| request.url.path() == route)
            .collect()
    }

    /// The `content` field of every message posted to `route`.
    pub async fn received_contents(&self, route: &str) -> Vec<String> {
        self.requests_to(route).await.iter().filter_map(content_of).collect()
    }

    /// The `content` field of every message, across all paths.
    pub async fn all_contents(&self) -> Vec<String> {
        self.received_requests().await.iter().filter_map(content_of).collect()
    }
}

/// Extracts the `content` field from a webhook POST.
pub fn content_of(request: &Request) -> Option<String> {
    let body: Value = serde_json::from_slice(&request.body).ok()?;
    body.get("content")?.as_str().map(str::to_string)
}

/// Builder for per-request responses, consumed in order.
pub struct ResponseSequence<'a> {
    server: &'a MockServer,
    path: String,
    responses: Vec<ResponseTemplate>,
}

impl ResponseSequence<'_> {
    /// Next request gets 204.
    #[must_use]
    pub fn accepted(mut self) -> Self {
        self.responses.push(ResponseTemplate::new(204));
        self
    }

    /// Next request gets 429, with `X-RateLimit-Reset-After` when given.
    #[must_use]
    pub fn rate_limited(mut self, reset_after: Option<&str>) -> Self {
        let mut response = ResponseTemplate::new(429);
        if let Some(seconds) = reset_after {
            response = response.insert_header("X-RateLimit-Reset-After", seconds);
        }
        self.responses.push(response);
        self
    }

    /// Next request gets 429 with a standard `Retry-After` header.
    #[must_use]
    pub fn retry_after(mut self, seconds: &str) -> Self {
        self.responses.push(ResponseTemplate::new(429).insert_header("Retry-After", seconds));
        self
    }

    /// Next request gets `status` with `body`.
    #[must_use]
    pub fn status(mut self, status: u16, body: &str) -> Self {
        self.responses.push(ResponseTemplate::new(status).set_body_string(body));
        self
    }

    /// Mounts the sequence. Requests beyond its end get 404 from wiremock.
    pub async fn mount(self) {
        for response in self.responses {
            Mock::given(method("POST"))
                .and(matchers::path(self.path.as_str()))
                .respond_with(response)
                .up_to_n_times(1)
                .mount(self.server)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_starts_on_local_address() {
        let sink = MockSink::start().await;

        assert!(sink.url().starts_with("http://"));
        assert_eq!(sink.webhook_url("/hook"), format!("{}/hook", sink.url()));
        assert!(sink.received_requests().await.is_empty());
    }

    #[tokio::test]
    async fn sequence_responses_are_consumed_in_order() {
        let sink = MockSink::start().await;
        sink.sequence("/hook").rate_limited(Some("1")).accepted().mount().await;
        let client = reqwest::Client::new();

        let first = client.post(sink.webhook_url("/hook")).body("{}").send().await.unwrap();
        let second = client.post(sink.webhook_url("/hook")).body("{}").send().await.unwrap();

        assert_eq!(first.status().as_u16(), 429);
        assert_eq!(first.headers()["x-ratelimit-reset-after"], "1");
        assert_eq!(second.status().as_u16(), 204);
        assert_eq!(sink.requests_to("/hook").await.len(), 2);
    }

    #[tokio::test]
    async fn contents_are_extracted_from_json_bodies() {
        let sink = MockSink::start().await;
        sink.accept("/hook").await;

        reqwest::Client::new()
            .post(sink.webhook_url("/hook"))
            .header("content-type", "application/json")
            .body(r#"{"content":"12:00:00 a: `b`"}"#)
            .send()
            .await
            .unwrap();

        assert_eq!(sink.received_contents("/hook").await, vec!["12:00:00 a: `b`"]);
        assert!(sink.received_contents("/other").await.is_empty());
    }
}
