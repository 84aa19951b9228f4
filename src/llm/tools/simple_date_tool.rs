use crate::error::{BrokerError, Result};
use crate::llm::tools::{LlmTool, ToolDescriptor};
use chrono::{Duration, Local, NaiveDate};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Resolves relative date expressions ("tomorrow", "3 days ago", "next week") to
/// absolute `YYYY-MM-DD` dates.
///
/// Resolution is relative to a fixed reference date so results are reproducible;
/// [`SimpleDateTool::new`] uses the local date at construction time.
#[derive(Debug, Clone, Copy)]
pub struct SimpleDateTool {
    today: NaiveDate,
}

impl SimpleDateTool {
    pub fn new() -> Self {
        Self::anchored_at(Local::now().date_naive())
    }

    /// Resolve expressions relative to `today`
    pub fn anchored_at(today: NaiveDate) -> Self {
        Self { today }
    }

    fn resolve(&self, expression: &str) -> Result<NaiveDate> {
        let lower = expression.trim().to_lowercase();

        if let Ok(date) = NaiveDate::parse_from_str(&lower, "%Y-%m-%d") {
            return Ok(date);
        }

        let offset = match lower.as_str() {
            s if s.contains("today") || s == "now" => Duration::zero(),
            s if s.contains("tomorrow") => Duration::days(1),
            s if s.contains("yesterday") => Duration::days(-1),
            s if s.contains("next week") => Duration::weeks(1),
            s if s.contains("last week") => Duration::weeks(-1),
            s if s.ends_with("from now") => Duration::days(count_days(s)?),
            s if s.ends_with("ago") => Duration::days(-count_days(s)?),
            _ => {
                return Err(BrokerError::ToolError(format!(
                    "Cannot resolve date expression: {}",
                    expression
                )))
            }
        };

        Ok(self.today + offset)
    }
}

impl Default for SimpleDateTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of days in phrases like "3 days from now" or "a day ago"
fn count_days(text: &str) -> Result<i64> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let position = words
        .iter()
        .position(|w| w.starts_with("day"))
        .filter(|&i| i > 0)
        .ok_or_else(|| BrokerError::ToolError(format!("No day count in: {}", text)))?;

    let count = words[position - 1];
    if let Ok(n) = count.parse::<i64>() {
        return Ok(n);
    }

    match count {
        "a" | "one" => Ok(1),
        "two" => Ok(2),
        "three" => Ok(3),
        "four" => Ok(4),
        "five" => Ok(5),
        "six" => Ok(6),
        "seven" => Ok(7),
        other => Err(BrokerError::ToolError(format!("Unknown day count: {}", other))),
    }
}

impl LlmTool for SimpleDateTool {
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        // Accept the common alternative key models reach for
        let expression = args
            .get("relative_date")
            .or_else(|| args.get("ref"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BrokerError::ToolError("Missing required argument: relative_date".to_string())
            })?;

        let resolved = self.resolve(expression)?.format("%Y-%m-%d").to_string();

        Ok(json!({
            "relative_date": expression,
            "resolved_date": resolved,
            "summary": format!("The date '{}' is {}", expression, resolved)
        }))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "resolve_date",
            "Resolves relative date expressions to absolute dates. Takes text like 'tomorrow', \
             'three days from now', or 'next week' and returns the date in YYYY-MM-DD format.",
            json!({
                "type": "object",
                "properties": {
                    "relative_date": {
                        "type": "string",
                        "description": "The relative date expression to resolve (e.g., 'tomorrow', '3 days from now', 'next week')"
                    }
                },
                "required": ["relative_date"]
            }),
        )
    }
}
