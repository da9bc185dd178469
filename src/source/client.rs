//! Paginated, filtered retrieval against the source platform's JSON:API.

use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::record::{omit, project, Record};
use super::transport::{HttpRequest, HttpTransport, Method};
use crate::error::{Error, Result};

/// Concatenated `data` items of every page of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One extraction request: where to go, what to keep, which names to accept.
#[derive(Debug, Clone)]
pub struct ApiQuery {
    pub path: String,
    pub method: Method,
    pub body: Option<Value>,
    pub drop_fields: Vec<String>,
    pub fields: Vec<String>,
    pub include: Option<Regex>,
}

impl ApiQuery {
    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            path: path.into(),
            method,
            body,
            drop_fields: Vec::new(),
            fields: Vec::new(),
            include: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path, Some(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, None)
    }

    /// Dotted paths to keep on each item. Without fields items are kept whole.
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Dotted paths removed from the whole response payload before parsing.
    pub fn drop_fields(mut self, fields: &[&str]) -> Self {
        self.drop_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn include(mut self, pattern: Option<Regex>) -> Self {
        self.include = pattern;
        self
    }
}

/// Compile a name filter so that it must match from the start of the name.
pub fn include_pattern(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{pattern})"))?)
}

pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    token: String,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoint: &str, token: &str) -> Self {
        Self {
            transport,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/api/v2{}", self.endpoint, path)
        }
    }

    /// Issue a request and follow `links.next` until exhausted.
    ///
    /// A 404 ends the call with whatever was collected so far: older servers
    /// lack some endpoints and that is not an error.
    pub async fn call(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        drop_fields: &[String],
    ) -> Result<Page> {
        let mut url = self.url_for(path);
        let mut page = Page::default();

        loop {
            debug!("Start calling API: {} {}", method, url);

            let request = HttpRequest {
                method,
                url: url.clone(),
                body: body.cloned(),
                bearer_token: self.token.clone(),
                json_api: true,
            };
            let response = self
                .transport
                .send(request)
                .await
                .map_err(|e| e.into_error(&url))?;

            if response.status == 404 {
                warn!("Non-existent API endpoint ({}). Ignoring.", url);
                break;
            }
            if !response.is_success() {
                debug!("Response body: {}", response.body);
                return Err(Error::HttpStatus {
                    status: response.status,
                    url,
                });
            }
            if response.body.trim().is_empty() {
                break;
            }

            let mut payload: Value =
                serde_json::from_str(&response.body).map_err(|e| Error::UnexpectedResponse {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
            omit(&mut payload, drop_fields);

            match payload.get("data") {
                Some(Value::Array(items)) => page.items.extend(items.iter().cloned()),
                Some(Value::Object(item)) if !item.is_empty() => {
                    page.items.push(Value::Object(item.clone()))
                }
                _ => {}
            }

            match payload
                .get("links")
                .and_then(|links| links.get("next"))
                .and_then(Value::as_str)
            {
                Some(next) if !next.is_empty() => {
                    debug!("Pulling the next page from the API");
                    url = next.to_string();
                }
                _ => break,
            }
        }

        debug!("Stop calling API");
        Ok(page)
    }

    /// Run a query and return the projected records whose name passes the filter.
    pub async fn fetch(&self, query: &ApiQuery) -> Result<Vec<Record>> {
        let page = self
            .call(
                &query.path,
                query.method,
                query.body.as_ref(),
                &query.drop_fields,
            )
            .await?;

        let records = page
            .items
            .iter()
            .filter(|raw| accepts(query.include.as_ref(), raw))
            .map(|raw| {
                if query.fields.is_empty() {
                    Record::from_resource(raw)
                } else {
                    Record::from_resource(&project(raw, &query.fields))
                }
            })
            .collect();

        Ok(records)
    }

    /// First record of a query, for endpoints that return a single resource.
    pub async fn fetch_one(&self, query: &ApiQuery) -> Result<Option<Record>> {
        Ok(self.fetch(query).await?.into_iter().next())
    }

    /// Fire a request whose response body is irrelevant.
    pub async fn send(&self, query: &ApiQuery) -> Result<()> {
        self.call(&query.path, query.method, query.body.as_ref(), &[])
            .await
            .map(|_| ())
    }

    /// Download a text document (redirects followed) with the API token.
    pub async fn download_text(&self, url: &str) -> Result<String> {
        debug!("Start downloading text file");

        let request = HttpRequest {
            method: Method::Get,
            url: url.to_string(),
            body: None,
            bearer_token: self.token.clone(),
            json_api: false,
        };
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.into_error(url))?;

        if !response.is_success() {
            return Err(Error::HttpStatus {
                status: response.status,
                url: url.to_string(),
            });
        }

        debug!("Stop downloading text file");
        Ok(response.body)
    }
}

fn accepts(include: Option<&Regex>, raw: &Value) -> bool {
    let Some(pattern) = include else {
        return true;
    };
    match raw
        .get("attributes")
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
    {
        Some(name) if !name.is_empty() => pattern.is_match(name),
        _ => true,
    }
}
