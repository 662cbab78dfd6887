//! Expressions evaluated against an exchange.
//!
//! Used to compute dynamic endpoint URIs and alternate request bodies.

use crate::error::{EnrichError, Result};
use crate::exchange::{value_to_string, Exchange};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Something that computes a value from the current exchange
pub trait Expression: Send + Sync {
    /// Evaluate against the exchange
    fn evaluate(&self, exchange: &Exchange) -> Result<Value>;

    /// Evaluate and render the value as text
    fn evaluate_string(&self, exchange: &Exchange) -> Result<String> {
        self.evaluate(exchange).map(|value| value_to_string(&value))
    }
}

impl<F> Expression for F
where
    F: Fn(&Exchange) -> Result<Value> + Send + Sync,
{
    fn evaluate(&self, exchange: &Exchange) -> Result<Value> {
        self(exchange)
    }
}

/// Always yields the same value
#[derive(Debug, Clone)]
pub struct ConstantExpression(Value);

impl ConstantExpression {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }
}

impl Expression for ConstantExpression {
    fn evaluate(&self, _exchange: &Exchange) -> Result<Value> {
        Ok(self.0.clone())
    }
}

/// Yields an input header, or null when absent
#[derive(Debug, Clone)]
pub struct HeaderExpression(String);

impl HeaderExpression {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Expression for HeaderExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value> {
        Ok(exchange.header(&self.0).cloned().unwrap_or(Value::Null))
    }
}

/// Yields an exchange property, or null when absent
#[derive(Debug, Clone)]
pub struct PropertyExpression(String);

impl PropertyExpression {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Expression for PropertyExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value> {
        Ok(exchange.property(&self.0).cloned().unwrap_or(Value::Null))
    }
}

/// Text template with `${...}` placeholders.
///
/// Supported placeholders: `${body}`, `${header.NAME}` (also `${headers.NAME}`),
/// `${exchangeProperty.NAME}` and `${exchangeId}`. Missing values render empty.
#[derive(Debug, Clone)]
pub struct SimpleExpression {
    template: String,
}

impl SimpleExpression {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn lookup(&self, token: &str, exchange: &Exchange) -> Result<String> {
        let token = token.trim();
        if token == "body" {
            return Ok(exchange.message().body_as_string());
        }
        if token == "exchangeId" {
            return Ok(exchange.id().to_string());
        }
        if let Some(name) = token
            .strip_prefix("header.")
            .or_else(|| token.strip_prefix("headers."))
        {
            return Ok(exchange.header(name).map(value_to_string).unwrap_or_default());
        }
        if let Some(name) = token.strip_prefix("exchangeProperty.") {
            return Ok(exchange
                .property(name)
                .map(value_to_string)
                .unwrap_or_default());
        }
        Err(EnrichError::Expression(format!(
            "unknown function '{}' in '{}'",
            token, self.template
        )))
    }
}

impl Expression for SimpleExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value> {
        let mut rendered = String::with_capacity(self.template.len());
        let mut last = 0;

        for captures in PLACEHOLDER.captures_iter(&self.template) {
            let (Some(whole), Some(token)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            rendered.push_str(&self.template[last..whole.start()]);
            rendered.push_str(&self.lookup(token.as_str(), exchange)?);
            last = whole.end();
        }
        rendered.push_str(&self.template[last..]);

        Ok(Value::String(rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constant_expression() {
        let exchange = Exchange::with_body("ignored");
        let expression = ConstantExpression::new("direct:resource");
        assert_eq!(expression.evaluate_string(&exchange).unwrap(), "direct:resource");
    }

    #[test]
    fn test_header_expression_missing_is_null() {
        let mut exchange = Exchange::with_body("x");
        let expression = HeaderExpression::new("target");
        assert_eq!(expression.evaluate(&exchange).unwrap(), Value::Null);
        assert_eq!(expression.evaluate_string(&exchange).unwrap(), "");

        exchange.set_header("target", "queue:orders");
        assert_eq!(expression.evaluate_string(&exchange).unwrap(), "queue:orders");
    }

    #[test]
    fn test_property_expression() {
        let mut exchange = Exchange::with_body("x");
        exchange.set_property("route", "direct:a");
        let expression = PropertyExpression::new("route");
        assert_eq!(expression.evaluate(&exchange).unwrap(), json!("direct:a"));
    }

    #[test]
    fn test_simple_expression_interpolation() {
        let mut exchange = Exchange::with_body("World");
        exchange.set_header("queue", "orders");
        exchange.set_property("region", "eu");

        let expression =
            SimpleExpression::new("queue:${header.queue}-${exchangeProperty.region}?q=${body}");
        assert_eq!(
            expression.evaluate_string(&exchange).unwrap(),
            "queue:orders-eu?q=World"
        );
    }

    #[test]
    fn test_simple_expression_missing_header_renders_empty() {
        let exchange = Exchange::with_body("x");
        let expression = SimpleExpression::new("queue:${header.missing}");
        assert_eq!(expression.evaluate_string(&exchange).unwrap(), "queue:");
    }

    #[test]
    fn test_simple_expression_unknown_function() {
        let exchange = Exchange::with_body("x");
        let expression = SimpleExpression::new("queue:${random(1,5)}");
        let err = expression.evaluate(&exchange).unwrap_err();
        assert_eq!(err.error_code(), "EXPRESSION_ERROR");
    }

    #[test]
    fn test_closure_expression() {
        let exchange = Exchange::with_body("abc");
        let expression = |e: &Exchange| -> Result<Value> {
            Ok(json!(format!("direct:{}", e.message().body_as_string())))
        };
        assert_eq!(expression.evaluate_string(&exchange).unwrap(), "direct:abc");
    }
}
