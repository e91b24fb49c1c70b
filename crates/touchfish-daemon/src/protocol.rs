//! Newline-delimited JSON messages exchanged over stdin/stdout.
//!
//! Every line is one object tagged by `type`.

use serde::{Deserialize, Serialize};
use touchfish_types::{ExecutionOutput, RecipeSummary, SessionEvent};

/// Messages read from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    QueryChanged {
        query: String,
    },
    StatusChanged,
    /// `null` returns to the recipe list
    GoToRecipe {
        #[serde(default)]
        id: Option<String>,
    },
    /// Tap on an item of the last published result
    ItemTapped {
        index: usize,
    },
    /// Re-read the config and rescan recipe directories
    Reload,
}

impl Inbound {
    /// The session event this message maps to, if any.
    #[must_use]
    pub fn session_event(&self) -> Option<SessionEvent> {
        match self {
            Self::QueryChanged { query } => Some(SessionEvent::QueryChanged {
                query: query.clone(),
            }),
            Self::StatusChanged => Some(SessionEvent::StatusChanged),
            _ => None,
        }
    }
}

/// Messages written for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Result(ExecutionOutput),
    Navigation {
        active: Option<String>,
    },
    Recipes {
        recipes: Vec<RecipeSummary>,
    },
    Window {
        visible: bool,
    },
    /// A line that could not be handled
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use touchfish_types::{ActionKind, ExecuteResult, ResultItem, ResultType};

    #[test]
    fn test_parse_inbound() {
        let msg: Inbound = serde_json::from_str(r#"{"type":"query_changed","query":"ab"}"#).unwrap();
        assert_eq!(
            msg.session_event(),
            Some(SessionEvent::QueryChanged {
                query: "ab".to_string()
            })
        );

        let msg: Inbound = serde_json::from_str(r#"{"type":"go_to_recipe","id":null}"#).unwrap();
        assert_eq!(msg, Inbound::GoToRecipe { id: None });
        assert!(msg.session_event().is_none());

        let msg: Inbound = serde_json::from_str(r#"{"type":"go_to_recipe"}"#).unwrap();
        assert_eq!(msg, Inbound::GoToRecipe { id: None });

        let msg: Inbound = serde_json::from_str(r#"{"type":"item_tapped","index":2}"#).unwrap();
        assert_eq!(msg, Inbound::ItemTapped { index: 2 });
    }

    #[test]
    fn test_unknown_inbound_type_rejected() {
        assert!(serde_json::from_str::<Inbound>(r#"{"type":"launch"}"#).is_err());
    }

    #[test]
    fn test_result_is_flattened() {
        let msg = Outbound::Result(ExecutionOutput {
            recipe_id: "r1".to_string(),
            query: "q".to_string(),
            token: 3,
            result: ExecuteResult::failure("timeout", Duration::from_millis(7)),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "result");
        assert_eq!(value["recipeId"], "r1");
        assert_eq!(value["token"], 3);
        assert_eq!(value["result"]["errorMessage"], "timeout");
        assert_eq!(value["result"]["timeCost"], 7);
    }

    #[test]
    fn test_result_with_parameters_reads_back() {
        let item = ResultItem::new("hello")
            .with_action(ActionKind::Copy, ["hello"])
            .with_action(ActionKind::Open, ["https://example.com"]);
        let msg = Outbound::Result(ExecutionOutput {
            recipe_id: "links".to_string(),
            query: String::new(),
            token: 1,
            result: ExecuteResult::success(ResultType::List, vec![item], Duration::from_millis(12)),
        });

        let line = serde_json::to_string(&msg).unwrap();
        let back: Outbound = serde_json::from_str(&line).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_navigation_wire_format() {
        let value = serde_json::to_value(Outbound::Navigation { active: None }).unwrap();
        assert_eq!(value, serde_json::json!({"type": "navigation", "active": null}));
    }
}
