#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use wxrecall::client::{Transport, TransportResponse};
use wxrecall::config::DashboardConfig;
use wxrecall::error::{FetchError, FetchResult};
use wxrecall::orchestrator::FetchOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Respond(TransportResponse),
    Network(String),
    Panic(String),
}

struct Rule {
    method: Method,
    fragments: Vec<String>,
    reply: Reply,
}

// first rule whose fragments all appear in the decoded url wins, unmatched is a 404
#[derive(Default)]
pub struct MockTransport {
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<(Method, String)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn add(&self, method: Method, fragments: &[&str], reply: Reply) {
        self.rules.lock().unwrap().push(Rule {
            method,
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            reply,
        });
    }

    pub fn on_get_json(&self, fragments: &[&str], body: Value) {
        self.add(
            Method::Get,
            fragments,
            Reply::Respond(response(200, "OK", Some("application/json"), body.to_string())),
        );
    }

    pub fn on_get_status(&self, fragments: &[&str], status: u16, status_text: &str) {
        self.add(
            Method::Get,
            fragments,
            Reply::Respond(response(status, status_text, None, String::new())),
        );
    }

    pub fn on_get_network_error(&self, fragments: &[&str], message: &str) {
        self.add(Method::Get, fragments, Reply::Network(message.to_string()));
    }

    pub fn panic_on_get(&self, fragments: &[&str], message: &str) {
        self.add(Method::Get, fragments, Reply::Panic(message.to_string()));
    }

    pub fn on_head_ok(&self, fragments: &[&str], content_type: &str) {
        self.add(
            Method::Head,
            fragments,
            Reply::Respond(response(200, "OK", Some(content_type), String::new())),
        );
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn urls(&self, method: Method) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, url)| url)
            .collect()
    }

    fn reply(&self, method: Method, url: &str) -> FetchResult<TransportResponse> {
        let decoded = decode_fully(url);
        self.requests.lock().unwrap().push((method, decoded.clone()));

        // lock released before a scripted panic so later requests still work
        let reply = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| {
                rule.method == method && rule.fragments.iter().all(|f| decoded.contains(f.as_str()))
            })
            .map(|rule| rule.reply.clone());

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Network(message)) => Err(FetchError::Network(message)),
            Some(Reply::Panic(message)) => panic!("{}", message),
            None => Ok(response(404, "Not Found", None, String::new())),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> FetchResult<TransportResponse> {
        self.reply(Method::Get, url)
    }

    async fn head(&self, url: &str) -> FetchResult<TransportResponse> {
        self.reply(Method::Head, url)
    }
}

pub fn response(
    status: u16,
    status_text: &str,
    content_type: Option<&str>,
    body: String,
) -> TransportResponse {
    TransportResponse {
        status,
        status_text: status_text.to_string(),
        content_type: content_type.map(str::to_string),
        body,
    }
}

// query values are encoded once by the client and again by the relay wrapper
pub fn decode_fully(url: &str) -> String {
    let mut current = url.to_string();
    loop {
        let next = match urlencoding::decode(&current) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => return current,
        };
        if next == current {
            return current;
        }
        current = next;
    }
}

// config with no throttling and the given sites and selections
pub fn config(sites: &[&str], alpha: &[&str], image: &[&str]) -> DashboardConfig {
    DashboardConfig {
        primary_site: sites.first().map(|s| s.to_string()).unwrap_or_default(),
        additional_sites: sites.iter().skip(1).map(|s| s.to_string()).collect(),
        request_delay: 0,
        alpha_types: alpha.iter().map(|s| s.to_string()).collect(),
        image_types: image.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub fn orchestrator(transport: &Arc<MockTransport>, config: &DashboardConfig) -> FetchOrchestrator {
    FetchOrchestrator::with_transport(transport.clone(), config)
}
