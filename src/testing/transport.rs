//! Scripted HTTP transport.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::source::transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};

/// Failure a route can answer with instead of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Connection,
}

#[derive(Debug, Clone)]
enum MockReply {
    Response(HttpResponse),
    Failure(MockFailure),
}

struct Route {
    method: Method,
    url_suffix: String,
    replies: VecDeque<MockReply>,
}

/// Answers requests by method and URL suffix.
///
/// Replies registered for the same route are served in order; the last one
/// keeps answering once the others are used up. When several routes match,
/// the longest suffix wins. Unmatched requests fail.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<Vec<Route>>>,
    history: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, url_suffix: &str, reply: MockReply) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.url_suffix == url_suffix)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                url_suffix: url_suffix.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn on(&self, method: Method, url_suffix: &str, response: HttpResponse) -> &Self {
        self.push(method, url_suffix, MockReply::Response(response))
    }

    pub fn on_json(&self, method: Method, url_suffix: &str, status: u16, body: Value) -> &Self {
        self.on(method, url_suffix, HttpResponse::json(status, &body))
    }

    pub fn fail(&self, method: Method, url_suffix: &str, failure: MockFailure) -> &Self {
        self.push(method, url_suffix, MockReply::Failure(failure))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.history.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, url_suffix: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url.ends_with(url_suffix))
            .collect()
    }

    /// Bodies sent to a route, in order.
    pub fn bodies_sent_to(&self, method: Method, url_suffix: &str) -> Vec<Value> {
        self.requests_to(method, url_suffix)
            .into_iter()
            .filter_map(|r| r.body)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.history.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .filter(|r| r.method == request.method && request.url.ends_with(&r.url_suffix))
            .max_by_key(|r| r.url_suffix.len());

        let Some(route) = route else {
            return Err(TransportError::Other(format!(
                "no mock route for {} {}",
                request.method, request.url
            )));
        };

        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };

        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Failure(MockFailure::Timeout)) => Err(TransportError::Timeout),
            Some(MockReply::Failure(MockFailure::Connection)) => {
                Err(TransportError::Connection("connection refused".to_string()))
            }
            None => Err(TransportError::Other("mock route has no replies".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: url.to_string(),
            body: None,
            bearer_token: String::new(),
            json_api: true,
        }
    }

    #[tokio::test]
    async fn test_replies_are_served_in_order_and_last_is_sticky() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/plans/plan-1", 200, json!({"n": 1}));
        transport.on_json(Method::Get, "/plans/plan-1", 200, json!({"n": 2}));

        let mut bodies = Vec::new();
        for _ in 0..3 {
            bodies.push(transport.send(get("https://x/api/v2/plans/plan-1")).await.unwrap().body);
        }

        assert_eq!(bodies, vec!["{\"n\":1}", "{\"n\":2}", "{\"n\":2}"]);
    }

    #[tokio::test]
    async fn test_longest_suffix_wins() {
        let transport = MockTransport::new();
        transport.on(Method::Get, "/workspaces", HttpResponse::new(200, "list"));
        transport.on(Method::Get, "/acme/workspaces", HttpResponse::new(200, "org list"));

        let response = transport
            .send(get("https://x/api/v2/organizations/acme/workspaces"))
            .await
            .unwrap();
        assert_eq!(response.body, "org list");
    }

    #[tokio::test]
    async fn test_unmatched_request_fails_and_is_recorded() {
        let transport = MockTransport::new();
        assert!(transport.send(get("https://x/api/v2/teams")).await.is_err());
        assert_eq!(transport.requests().len(), 1);
    }
}
