//! Pipeline stages and the transitions allowed between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage of the answering state machine.
///
/// ```text
/// Start -> ExactLookup -> ShortCircuit -> Done
///                      -> FallbackSearch -> Assemble -> Generate -> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    ExactLookup,
    ShortCircuit,
    FallbackSearch,
    Assemble,
    Generate,
    Done,
}

impl Stage {
    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Start, Stage::ExactLookup)
                | (Stage::ExactLookup, Stage::ShortCircuit)
                | (Stage::ExactLookup, Stage::FallbackSearch)
                | (Stage::ShortCircuit, Stage::Done)
                | (Stage::FallbackSearch, Stage::Assemble)
                | (Stage::Assemble, Stage::Generate)
                | (Stage::Generate, Stage::Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Done
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::ExactLookup => "exact_lookup",
            Stage::ShortCircuit => "short_circuit",
            Stage::FallbackSearch => "fallback_search",
            Stage::Assemble => "assemble",
            Stage::Generate => "generate",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Stage; 7] = [
        Stage::Start,
        Stage::ExactLookup,
        Stage::ShortCircuit,
        Stage::FallbackSearch,
        Stage::Assemble,
        Stage::Generate,
        Stage::Done,
    ];

    #[test]
    fn test_short_circuit_path_is_legal() {
        assert!(Stage::Start.can_transition_to(Stage::ExactLookup));
        assert!(Stage::ExactLookup.can_transition_to(Stage::ShortCircuit));
        assert!(Stage::ShortCircuit.can_transition_to(Stage::Done));
    }

    #[test]
    fn test_fallback_path_is_legal() {
        assert!(Stage::ExactLookup.can_transition_to(Stage::FallbackSearch));
        assert!(Stage::FallbackSearch.can_transition_to(Stage::Assemble));
        assert!(Stage::Assemble.can_transition_to(Stage::Generate));
        assert!(Stage::Generate.can_transition_to(Stage::Done));
    }

    #[test]
    fn test_no_cycles_and_done_is_terminal() {
        for stage in ALL {
            assert!(!stage.can_transition_to(stage), "self loop on {stage}");
            assert!(!Stage::Done.can_transition_to(stage));
        }
        assert!(Stage::Done.is_terminal());
    }

    #[test]
    fn test_skipping_assembly_is_illegal() {
        assert!(!Stage::FallbackSearch.can_transition_to(Stage::Generate));
        assert!(!Stage::ShortCircuit.can_transition_to(Stage::Generate));
        assert!(!Stage::Start.can_transition_to(Stage::FallbackSearch));
    }

    #[test]
    fn test_display_snake_case() {
        assert_eq!(Stage::FallbackSearch.to_string(), "fallback_search");
        let json = serde_json::to_string(&Stage::ShortCircuit).unwrap();
        assert_eq!(json, "\"short_circuit\"");
    }
}
