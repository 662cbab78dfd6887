use crate::error::EnrichError;
use crate::exchange::{properties, Message, Synchronization};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Message exchange pattern
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum ExchangePattern {
    /// Fire and forget
    #[default]
    InOnly,
    /// Request/reply
    InOut,
}

/// The unit of work flowing through a pipeline.
///
/// Holds the input message, an optional output message, the exception slot
/// and a property bag. Completion callbacks registered on the exchange are
/// never duplicated by [`Exchange::copy`]; they move only through
/// [`Exchange::handover_completions`].
pub struct Exchange {
    id: Uuid,
    pattern: ExchangePattern,
    created_at: DateTime<Utc>,
    in_message: Message,
    out_message: Option<Message>,
    exception: Option<EnrichError>,
    properties: HashMap<String, Value>,
    completions: Vec<Arc<dyn Synchronization>>,
}

impl Exchange {
    /// Create an exchange around the given input message
    pub fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            pattern: ExchangePattern::default(),
            created_at: Utc::now(),
            in_message: message,
            out_message: None,
            exception: None,
            properties: HashMap::new(),
            completions: Vec::new(),
        }
    }

    /// Create an exchange whose input body is `body`
    pub fn with_body(body: impl Into<Value>) -> Self {
        Self::new(Message::new(body))
    }

    /// Builder-style pattern setter
    pub fn with_pattern(mut self, pattern: ExchangePattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pattern(&self) -> ExchangePattern {
        self.pattern
    }

    pub fn set_pattern(&mut self, pattern: ExchangePattern) {
        self.pattern = pattern;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Input message
    pub fn message(&self) -> &Message {
        &self.in_message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.in_message
    }

    pub fn set_message(&mut self, message: Message) {
        self.in_message = message;
    }

    /// Output message, if a reply has been set
    pub fn out(&self) -> Option<&Message> {
        self.out_message.as_ref()
    }

    pub fn has_out(&self) -> bool {
        self.out_message.is_some()
    }

    pub fn set_out(&mut self, message: Option<Message>) {
        self.out_message = message;
    }

    /// The message representing the outcome: the output if present, else the input
    pub fn result_message(&self) -> &Message {
        self.out_message.as_ref().unwrap_or(&self.in_message)
    }

    /// Input body
    pub fn body(&self) -> &Value {
        &self.in_message.body
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.in_message.body = body.into();
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.in_message.header(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.in_message.set_header(name, value);
    }

    pub fn exception(&self) -> Option<&EnrichError> {
        self.exception.as_ref()
    }

    /// Set the exception, replacing any previous one
    pub fn set_exception(&mut self, exception: EnrichError) {
        self.exception = Some(exception);
    }

    pub fn take_exception(&mut self) -> Option<EnrichError> {
        self.exception.take()
    }

    pub fn clear_exception(&mut self) {
        self.exception = None;
    }

    /// True when the exchange carries an exception
    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }

    /// True when the outcome message is a fault
    pub fn is_fault(&self) -> bool {
        self.result_message().fault
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    /// Copy of this exchange with the same id.
    ///
    /// Messages, exception and properties are copied; completion callbacks are not.
    pub fn copy(&self) -> Exchange {
        Exchange {
            id: self.id,
            pattern: self.pattern,
            created_at: self.created_at,
            in_message: self.in_message.clone(),
            out_message: self.out_message.clone(),
            exception: self.exception.clone(),
            properties: self.properties.clone(),
            completions: Vec::new(),
        }
    }

    /// Fresh exchange derived from this one, used for a secondary call.
    ///
    /// Gets a new id, copies the input message and the properties, records
    /// the originating id under [`properties::CORRELATION_ID`] and starts
    /// without an output, an exception or completion callbacks.
    pub fn correlated_copy(&self) -> Exchange {
        let mut copy = Exchange::new(self.in_message.clone());
        copy.pattern = self.pattern;
        copy.properties = self.properties.clone();
        copy.properties.insert(
            properties::CORRELATION_ID.to_string(),
            Value::String(self.id.to_string()),
        );
        copy
    }

    /// Register a callback to run when this exchange is done
    pub fn add_on_completion(&mut self, synchronization: Arc<dyn Synchronization>) {
        self.completions.push(synchronization);
    }

    pub fn completion_count(&self) -> usize {
        self.completions.len()
    }

    /// Move all completion callbacks from this exchange onto `target`
    pub fn handover_completions(&mut self, target: &mut Exchange) {
        target.completions.append(&mut self.completions);
    }

    /// Mark the exchange done, running and draining its completion callbacks
    pub fn done(&mut self) {
        let completions = std::mem::take(&mut self.completions);
        let failed = self.is_failed();
        for synchronization in completions {
            if failed {
                synchronization.on_failure(self);
            } else {
                synchronization.on_complete(self);
            }
        }
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("in", &self.in_message)
            .field("out", &self.out_message)
            .field("exception", &self.exception)
            .field("properties", &self.properties)
            .field("completions", &self.completions.len())
            .finish()
    }
}
