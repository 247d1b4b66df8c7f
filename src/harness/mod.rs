//! Acceptance scenarios for the booking API.
//!
//! A scenario pairs a raw JSON payload with the outcome the API must produce.
//! Outcomes are checked by [`Expectation::evaluate`], which only looks at the
//! status code and the decoded body, so the same suite can be replayed against a
//! live server ([`AcceptanceRunner`]) or an in-process router.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Scenarios shipped with the crate.
const BUILTIN_SCENARIOS: &str = include_str!("../../data/scenarios.json");

/// Path of the booking endpoint relative to the base URL.
pub const BOOK_BUDDY_PATH: &str = "/api/book_buddy";

/// Errors that can occur while loading or replaying scenarios.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Cannot read scenario file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid scenario suite: {0}")]
    Parse(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// A single field assertion on a returned buddy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldCheck {
    pub field: String,

    /// The field must equal this value exactly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,

    /// The field must contain this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}

impl FieldCheck {
    fn holds(&self, buddy: &Value) -> bool {
        let Some(actual) = buddy.get(&self.field).and_then(Value::as_str) else {
            return false;
        };
        self.equals.as_deref().map_or(true, |expected| actual == expected)
            && self.contains.as_deref().map_or(true, |needle| actual.contains(needle))
    }
}

/// Outcome a scenario requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// 200 and the first buddy has this name
    Top { name: String },

    /// 200 and the first buddy has one of these names
    TopOneOf { names: Vec<String> },

    /// 200 and at least one buddy passes every check
    AnyBuddy { checks: Vec<FieldCheck> },

    /// 404
    NotFound,

    /// 422
    Invalid,

    /// At least one nested expectation holds
    AnyOf { options: Vec<Expectation> },
}

impl Expectation {
    /// Check a response against this expectation.
    ///
    /// # Returns
    /// `Err` with a human-readable reason when the response does not comply
    pub fn evaluate(&self, status: u16, body: &Value) -> Result<(), String> {
        match self {
            Expectation::Top { name } => {
                let top = first_name(status, body)?;
                if top == name {
                    Ok(())
                } else {
                    Err(format!("expected top buddy '{}', got '{}'", name, top))
                }
            }
            Expectation::TopOneOf { names } => {
                let top = first_name(status, body)?;
                if names.iter().any(|n| n == top) {
                    Ok(())
                } else {
                    Err(format!("expected top buddy in {:?}, got '{}'", names, top))
                }
            }
            Expectation::AnyBuddy { checks } => {
                let buddies = buddies(status, body)?;
                if buddies.iter().any(|b| checks.iter().all(|c| c.holds(b))) {
                    Ok(())
                } else {
                    Err(format!("no returned buddy satisfies {:?}", checks))
                }
            }
            Expectation::NotFound => expect_status(status, 404),
            Expectation::Invalid => expect_status(status, 422),
            Expectation::AnyOf { options } => {
                let mut reasons = Vec::new();
                for option in options {
                    match option.evaluate(status, body) {
                        Ok(()) => return Ok(()),
                        Err(reason) => reasons.push(reason),
                    }
                }
                Err(format!("no alternative held: {}", reasons.join("; ")))
            }
        }
    }
}

fn expect_status(actual: u16, expected: u16) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected status {}, got {}", expected, actual))
    }
}

fn buddies(status: u16, body: &Value) -> Result<&Vec<Value>, String> {
    expect_status(status, 200)?;
    body.as_array()
        .ok_or_else(|| "response body is not a JSON array".to_string())
}

fn first_name(status: u16, body: &Value) -> Result<&str, String> {
    buddies(status, body)?
        .first()
        .ok_or_else(|| "no buddies returned".to_string())?
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "first buddy has no name".to_string())
}

/// One acceptance scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: u32,
    pub title: String,

    /// Request body, sent verbatim (it may deliberately violate the schema)
    pub payload: Value,

    pub expect: Expectation,
}

/// An ordered set of scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioSuite {
    pub scenarios: Vec<Scenario>,
}

impl ScenarioSuite {
    /// The scenarios bundled with the crate.
    pub fn builtin() -> HarnessResult<Self> {
        Self::from_json(BUILTIN_SCENARIOS)
    }

    pub fn from_json(text: &str) -> HarnessResult<Self> {
        serde_json::from_str(text).map_err(|e| HarnessError::Parse(e.to_string()))
    }

    /// Load a suite from a JSON file.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

/// Result of replaying one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub id: u32,
    pub title: String,

    /// HTTP status, absent when the request never completed
    pub status: Option<u16>,

    /// Failure reason, `None` on success
    pub failure: Option<String>,
}

impl ScenarioOutcome {
    /// Evaluate a completed exchange.
    pub fn from_response(scenario: &Scenario, status: u16, body: &Value) -> Self {
        Self {
            id: scenario.id,
            title: scenario.title.clone(),
            status: Some(status),
            failure: scenario.expect.evaluate(status, body).err(),
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcomes of a whole suite, in scenario order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub outcomes: Vec<ScenarioOutcome>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(ScenarioOutcome::passed)
    }
}

/// Replays scenarios against a running server, one request at a time.
pub struct AcceptanceRunner {
    client: reqwest::Client,
    endpoint: String,
}

impl AcceptanceRunner {
    /// Create a runner.
    ///
    /// # Arguments
    /// * `base_url` - Server root, e.g. `http://127.0.0.1:8000`
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, timeout: Option<Duration>) -> HarnessResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), BOOK_BUDDY_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one scenario; transport failures become a failed outcome.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioOutcome {
        match self.exchange(scenario).await {
            Ok((status, body)) => ScenarioOutcome::from_response(scenario, status, &body),
            Err(e) => ScenarioOutcome {
                id: scenario.id,
                title: scenario.title.clone(),
                status: None,
                failure: Some(format!("request failed: {}", e)),
            },
        }
    }

    async fn exchange(&self, scenario: &Scenario) -> HarnessResult<(u16, Value)> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&scenario.payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        // Error bodies are still JSON; anything else is kept as a string.
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status, body))
    }

    /// Replay every scenario in order.
    pub async fn run_suite(&self, suite: &ScenarioSuite) -> SuiteReport {
        let mut report = SuiteReport::default();
        for scenario in &suite.scenarios {
            let outcome = self.run_scenario(scenario).await;
            match &outcome.failure {
                None => debug!("Scenario {} passed: {}", scenario.id, scenario.title),
                Some(reason) => warn!("Scenario {} failed: {}: {}", scenario.id, scenario.title, reason),
            }
            report.outcomes.push(outcome);
        }
        info!("{} of {} scenarios passed", report.passed(), report.outcomes.len());
        report
    }
}
