//! Shared types for the TouchFish recipe engine.
//!
//! This crate provides the result model exchanged between the engine in
//! touchfish-core, the daemon, and whatever presentation layer consumes its
//! output. All types are serializable so they can cross the daemon's stdio
//! protocol unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Error message used when a recipe exceeds its execution bound.
pub const TIMEOUT_MESSAGE: &str = "timeout";

/// Error message used when recipe output is not a well-formed envelope.
pub const MALFORMED_OUTPUT_MESSAGE: &str = "malformed output";

/// Deserialize a Vec that may be null or missing (both become empty vec)
fn deserialize_null_as_empty_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Deserialize parameters keyed by action index.
///
/// JSON object keys are strings, and buffered content (internally tagged
/// enums) will not coerce them to integers, so keys are parsed here.
fn deserialize_parameters<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<usize, Vec<String>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<BTreeMap<String, Vec<String>>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    raw.into_iter()
        .map(|(key, values)| {
            key.trim()
                .parse::<usize>()
                .map(|index| (index, values))
                .map_err(|_| serde::de::Error::custom(format!("invalid parameter key '{key}'")))
        })
        .collect::<Result<_, _>>()
        .map(Some)
}

/// Events that drive the engine while a recipe is active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Query text changed (one per keystroke)
    QueryChanged { query: String },

    /// Re-run the active recipe with the last known query
    StatusChanged,
}

/// Actions a result item can carry.
///
/// The set is closed: recipe output naming any other action fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Return to the top-level recipe list
    Back,
    /// Deactivate the launcher window
    Hide,
    /// Copy the first parameter to the clipboard as plain text
    Copy,
    /// Open the first parameter as a URL
    Open,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Back => "back",
            Self::Hide => "hide",
            Self::Copy => "copy",
            Self::Open => "open",
        }
    }

    /// Whether the action needs at least one positional parameter
    #[must_use]
    pub fn requires_parameter(self) -> bool {
        matches!(self, Self::Copy | Self::Open)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of output a recipe produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    /// No visible output; a successful, self-dismissing terminal action
    #[default]
    None,
    /// Plain text lines (item titles only)
    Text,
    /// Interactive list of items with actions
    List,
}

/// One entry in a recipe's output.
///
/// Deserialization goes through `ResultItemRaw` so that parameter keys are
/// checked against the action list before an item exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ResultItemRaw")]
pub struct ResultItem {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionKind>,

    /// Positional arguments keyed by index into `actions`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<usize, Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultItemRaw {
    title: String,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    icon: Option<String>,

    // Older recipes emit the singular key
    #[serde(default, alias = "action", deserialize_with = "deserialize_null_as_empty_vec")]
    actions: Vec<ActionKind>,

    #[serde(default, deserialize_with = "deserialize_parameters")]
    parameters: Option<BTreeMap<usize, Vec<String>>>,
}

impl TryFrom<ResultItemRaw> for ResultItem {
    type Error = String;

    fn try_from(raw: ResultItemRaw) -> Result<Self, Self::Error> {
        let parameters = raw.parameters.unwrap_or_default();
        if let Some(index) = parameters.keys().find(|&&idx| idx >= raw.actions.len()) {
            return Err(format!(
                "parameter index {index} out of range for {} action(s) on item '{}'",
                raw.actions.len(),
                raw.title
            ));
        }

        Ok(ResultItem {
            title: raw.title,
            description: raw.description,
            icon: raw.icon,
            actions: raw.actions,
            parameters,
        })
    }
}

impl ResultItem {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            icon: None,
            actions: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Append an action with its positional parameters.
    #[must_use]
    pub fn with_action<I, S>(mut self, action: ActionKind, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        let index = self.actions.len();
        self.actions.push(action);
        if !params.is_empty() {
            self.parameters.insert(index, params);
        }
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parameters for the action at `index`; empty when none were given.
    #[must_use]
    pub fn parameter(&self, index: usize) -> &[String] {
        self.parameters.get(&index).map_or(&[], Vec::as_slice)
    }

    /// First parameter for the action at `index`.
    #[must_use]
    pub fn first_parameter(&self, index: usize) -> Option<&str> {
        self.parameter(index).first().map(String::as_str)
    }
}

/// Envelope a recipe writes to stdout.
///
/// Either `errorMessage` or `type` must be present; `items` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub result_type: Option<ResultType>,

    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub items: Vec<ResultItem>,
}

impl ResultEnvelope {
    /// Parse an envelope from raw recipe stdout.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the bytes are not valid JSON,
    /// do not match the envelope shape, or carry neither `errorMessage` nor `type`.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let envelope: Self = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        if envelope.error_message.is_none() && envelope.result_type.is_none() {
            return Err("envelope has neither errorMessage nor type".to_string());
        }
        Ok(envelope)
    }

    /// Convert into an `ExecuteResult`, stamping the elapsed time.
    #[must_use]
    pub fn into_result(self, time_cost: Duration) -> ExecuteResult {
        match self.error_message {
            Some(message) => ExecuteResult::failure(message, time_cost),
            None => ExecuteResult::success(
                self.result_type.unwrap_or_default(),
                self.items,
                time_cost,
            ),
        }
    }
}

/// Outcome of one recipe execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(rename = "type")]
    pub result_type: ResultType,

    #[serde(default)]
    pub items: Vec<ResultItem>,

    /// Wall time of process invocation plus parsing, in milliseconds on the wire
    #[serde(with = "duration_millis")]
    pub time_cost: Duration,
}

impl ExecuteResult {
    #[must_use]
    pub fn success(result_type: ResultType, items: Vec<ResultItem>, time_cost: Duration) -> Self {
        Self {
            error_message: None,
            result_type,
            items,
            time_cost,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>, time_cost: Duration) -> Self {
        Self {
            error_message: Some(message.into()),
            result_type: ResultType::None,
            items: Vec::new(),
            time_cost,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }

    /// A successful `none` result: hide the window and return to the recipe list.
    #[must_use]
    pub fn is_dismissal(&self) -> bool {
        !self.is_error() && self.result_type == ResultType::None
    }

    /// Items the presentation layer may show; always empty for failures.
    #[must_use]
    pub fn visible_items(&self) -> &[ResultItem] {
        if self.is_error() {
            &[]
        } else {
            self.items.as_slice()
        }
    }

    #[must_use]
    pub fn time_cost_grade(&self) -> TimeCostGrade {
        TimeCostGrade::from_duration(self.time_cost)
    }
}

/// Coarse latency bucket shown next to the time cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeCostGrade {
    /// Under 500 ms
    Fast,
    /// Under one second
    Moderate,
    Slow,
}

impl TimeCostGrade {
    const FAST_BELOW: Duration = Duration::from_millis(500);
    const MODERATE_BELOW: Duration = Duration::from_millis(1000);

    #[must_use]
    pub fn from_duration(cost: Duration) -> Self {
        if cost < Self::FAST_BELOW {
            Self::Fast
        } else if cost < Self::MODERATE_BELOW {
            Self::Moderate
        } else {
            Self::Slow
        }
    }
}

/// A published execution result, tagged with the request that produced it.
///
/// The token lets consumers apply supersession themselves: a result whose
/// token is lower than one already applied for the same recipe is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub recipe_id: String,
    pub query: String,
    pub token: u64,
    pub result: ExecuteResult,
}

/// Recipe summary for the top-level chooser list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSummary {
    pub id: String,
    pub bundle_id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    // Durations past u64::MAX milliseconds saturate
    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
