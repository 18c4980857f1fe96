//! In-memory stand-in for the remote API.
//!
//! Each [`FakeService`] owns its own state, so tests can run in parallel
//! without sharing anything. It models the parts of the service the
//! convergence core relies on: server-generated ids, PATCH merges, the
//! `/assign` bulk replace and `/assignments` list, scripted faults and a
//! visibility lag between a write and later reads.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use super::error::{ApiError, Result};
use super::Transport;
use crate::kinds;

/// A request the fake received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug)]
struct Fault {
    method: Method,
    fragment: String,
    error: ApiError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct FakeState {
    /// collection path -> id -> object
    collections: BTreeMap<String, BTreeMap<String, Value>>,
    /// object path -> assignments
    assignments: BTreeMap<String, Vec<Value>>,
    faults: Vec<Fault>,
    /// fragment -> number of GETs still answered with 404
    hidden: Vec<(String, usize)>,
    /// Keys the service accepts but never echoes back.
    write_only: BTreeSet<String>,
    journal: Vec<RecordedRequest>,
}

impl FakeState {
    fn take_fault(&mut self, method: &Method, path: &str) -> Option<ApiError> {
        let index = self.faults.iter().position(|f| {
            &f.method == method && path.contains(&f.fragment) && f.remaining != Some(0)
        })?;
        let fault = &mut self.faults[index];
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(fault.error.clone())
    }

    fn take_hidden(&mut self, path: &str) -> bool {
        for (fragment, remaining) in self.hidden.iter_mut() {
            if *remaining > 0 && path.contains(fragment.as_str()) {
                *remaining -= 1;
                return true;
            }
        }
        false
    }

    fn find(&self, path: &str) -> Option<(&String, &String)> {
        let (collection, id) = path.rsplit_once('/')?;
        let (key, items) = self.collections.get_key_value(collection)?;
        items.get_key_value(id).map(|(id, _)| (key, id))
    }

    fn echo(&self, object: &Value) -> Value {
        let mut object = object.clone();
        if let Value::Object(map) = &mut object {
            for key in &self.write_only {
                map.remove(key);
            }
        }
        object
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Caller-owned fake of the remote service.
#[derive(Debug, Default)]
pub struct FakeService {
    state: Mutex<FakeState>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a key as accepted on write but omitted from every read.
    pub async fn write_only(&self, key: &str) {
        self.state.lock().await.write_only.insert(key.to_string());
    }

    /// Inserts an object directly and returns its id.
    pub async fn seed_object(&self, collection: &str, mut object: Value) -> String {
        let id = new_id();
        if let Value::Object(map) = &mut object {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        self.state
            .lock()
            .await
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), object);
        id
    }

    /// Replaces the assignments of an object, assigning ids where missing.
    pub async fn seed_assignments(&self, object_path: &str, assignments: Vec<Value>) {
        let assignments = assignments.into_iter().map(with_id).collect();
        self.state
            .lock()
            .await
            .assignments
            .insert(object_path.to_string(), assignments);
    }

    /// Fails the next matching request with `error`.
    pub async fn fail_next(&self, method: Method, fragment: &str, error: ApiError) {
        self.fail_times(method, fragment, error, Some(1)).await;
    }

    /// Fails every matching request with `error`.
    pub async fn fail_always(&self, method: Method, fragment: &str, error: ApiError) {
        self.fail_times(method, fragment, error, None).await;
    }

    async fn fail_times(&self, method: Method, fragment: &str, error: ApiError, times: Option<usize>) {
        self.state.lock().await.faults.push(Fault {
            method,
            fragment: fragment.to_string(),
            error,
            remaining: times,
        });
    }

    /// Answers the next `count` GETs whose path contains `fragment` with 404,
    /// simulating a write that is not yet visible on read.
    pub async fn hide_reads(&self, fragment: &str, count: usize) {
        self.state
            .lock()
            .await
            .hidden
            .push((fragment.to_string(), count));
    }

    pub async fn object(&self, path: &str) -> Option<Value> {
        let state = self.state.lock().await;
        let (collection, id) = path.rsplit_once('/')?;
        state.collections.get(collection)?.get(id).cloned()
    }

    pub async fn assignments(&self, object_path: &str) -> Vec<Value> {
        self.state
            .lock()
            .await
            .assignments
            .get(object_path)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn object_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .await
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().await.journal.clone()
    }

    /// Number of requests with `method` whose path contains `fragment`.
    pub async fn count(&self, method: Method, fragment: &str) -> usize {
        self.state
            .lock()
            .await
            .journal
            .iter()
            .filter(|r| r.method == method && r.path.contains(fragment))
            .count()
    }

    async fn begin(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<tokio::sync::MutexGuard<'_, FakeState>, ApiError> {
        let mut state = self.state.lock().await;
        state.journal.push(RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            body: body.cloned(),
        });
        if let Some(err) = state.take_fault(&method, path) {
            return Err(err);
        }
        Ok(state)
    }
}

fn with_id(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        if !map.contains_key("id") {
            map.insert("id".to_string(), Value::String(new_id()));
        }
    }
    value
}

#[async_trait::async_trait]
impl Transport for FakeService {
    async fn get(&self, path: &str) -> Result<Value> {
        let mut state = self.begin(Method::GET, path, None).await?;

        if state.take_hidden(path) {
            return Err(ApiError::not_found());
        }

        if let Some(object_path) = path.strip_suffix("/assignments") {
            if state.find(object_path).is_none() {
                return Err(ApiError::not_found());
            }
            let value = state.assignments.get(object_path).cloned().unwrap_or_default();
            return Ok(json!({ "value": value }));
        }

        if let Some(items) = state.collections.get(path) {
            let value: Vec<Value> = items.values().map(|o| state.echo(o)).collect();
            return Ok(json!({ "value": value }));
        }
        if kinds::descriptors().iter().any(|d| d.collection_path == path) {
            return Ok(json!({ "value": [] }));
        }

        let (collection, id) = path.rsplit_once('/').ok_or_else(ApiError::not_found)?;
        let object = state
            .collections
            .get(collection)
            .and_then(|items| items.get(id))
            .ok_or_else(ApiError::not_found)?;
        Ok(state.echo(object))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        let mut state = self.begin(Method::POST, path, Some(body)).await?;

        if let Some(object_path) = path.strip_suffix("/assign") {
            if state.find(object_path).is_none() {
                return Err(ApiError::not_found());
            }
            let entries = body
                .as_object()
                .and_then(|map| map.values().find_map(Value::as_array))
                .ok_or_else(|| ApiError::status(400, "BadRequest", "assign body has no list"))?;
            let stored = entries.iter().cloned().map(|mut entry| {
                if let Value::Object(map) = &mut entry {
                    map.insert("id".to_string(), Value::String(new_id()));
                }
                entry
            });
            let stored: Vec<Value> = stored.collect();
            state.assignments.insert(object_path.to_string(), stored);
            return Ok(None);
        }

        let mut object = match body {
            Value::Object(map) => map.clone(),
            _ => return Err(ApiError::status(400, "BadRequest", "body must be an object")),
        };
        let id = new_id();
        let timestamp = now();
        object.insert("id".to_string(), Value::String(id.clone()));
        object.insert("createdDateTime".to_string(), Value::String(timestamp.clone()));
        object.insert("lastModifiedDateTime".to_string(), Value::String(timestamp));

        let object = Value::Object(object);
        let echoed = state.echo(&object);
        state
            .collections
            .entry(path.to_string())
            .or_default()
            .insert(id, object);
        Ok(Some(echoed))
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        let mut state = self.begin(Method::PATCH, path, Some(body)).await?;

        let (collection, id) = path.rsplit_once('/').ok_or_else(ApiError::not_found)?;
        let existing = state
            .collections
            .get_mut(collection)
            .and_then(|items| items.get_mut(id))
            .ok_or_else(ApiError::not_found)?;

        let updates: Map<String, Value> = body.as_object().cloned().unwrap_or_default();
        if let Value::Object(map) = existing {
            for (key, value) in updates {
                map.insert(key, value);
            }
            map.insert("lastModifiedDateTime".to_string(), Value::String(now()));
        }
        Ok(None)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.begin(Method::DELETE, path, None).await?;

        let (collection, id) = path.rsplit_once('/').ok_or_else(ApiError::not_found)?;
        state
            .collections
            .get_mut(collection)
            .and_then(|items| items.remove(id))
            .ok_or_else(ApiError::not_found)?;
        state.assignments.remove(path);
        Ok(())
    }
}
