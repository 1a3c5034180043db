//! Per-request context threaded through the middleware chain.
//!
//! Fields written by a layer are set-once: later layers may read them but a
//! second write is rejected and the original value is kept.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::ContextError;

#[derive(Debug, Clone, Default)]
pub struct Context {
    subject_id: Option<String>,
    parsed_body: Option<JsonValue>,
    parsed_query: Option<JsonValue>,
    route_params: HashMap<String, String>,
    client_addr: Option<IpAddr>,
    request_id: Option<String>,
    data: HashMap<String, JsonValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route_params(mut self, params: HashMap<String, String>) -> Self {
        self.route_params = params;
        self
    }

    pub fn with_client_addr(mut self, addr: Option<IpAddr>) -> Self {
        self.client_addr = addr;
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Authenticated subject; `None` means not authenticated
    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.subject_id.is_some()
    }

    pub fn set_subject_id(&mut self, subject_id: impl Into<String>) -> Result<(), ContextError> {
        set_once(&mut self.subject_id, subject_id.into(), "subjectId")
    }

    pub fn parsed_body(&self) -> Option<&JsonValue> {
        self.parsed_body.as_ref()
    }

    pub fn set_parsed_body(&mut self, body: JsonValue) -> Result<(), ContextError> {
        set_once(&mut self.parsed_body, body, "parsedBody")
    }

    /// Decode the validated body into a typed value
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ContextError> {
        decode(self.parsed_body.as_ref(), "parsedBody")
    }

    pub fn parsed_query(&self) -> Option<&JsonValue> {
        self.parsed_query.as_ref()
    }

    pub fn set_parsed_query(&mut self, query: JsonValue) -> Result<(), ContextError> {
        set_once(&mut self.parsed_query, query, "parsedQuery")
    }

    /// Decode the validated query into a typed value
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, ContextError> {
        decode(self.parsed_query.as_ref(), "parsedQuery")
    }

    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params.get(name).map(String::as_str)
    }

    pub fn route_params(&self) -> &HashMap<String, String> {
        &self.route_params
    }

    pub fn client_addr(&self) -> Option<IpAddr> {
        self.client_addr
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Attach a handler-specific value under `key`
    pub fn insert_data(
        &mut self,
        key: impl Into<String>,
        value: JsonValue,
    ) -> Result<(), ContextError> {
        let key = key.into();
        if self.data.contains_key(&key) {
            return Err(ContextError::AlreadySet("data"));
        }
        self.data.insert(key, value);
        Ok(())
    }

    pub fn data(&self, key: &str) -> Option<&JsonValue> {
        self.data.get(key)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), ContextError> {
    if slot.is_some() {
        return Err(ContextError::AlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}

fn decode<T: DeserializeOwned>(
    value: Option<&JsonValue>,
    field: &'static str,
) -> Result<T, ContextError> {
    let value = value.ok_or(ContextError::Missing(field))?;
    T::deserialize(value).map_err(|source| ContextError::Decode { field, source })
}
