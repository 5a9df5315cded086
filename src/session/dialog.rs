//! # Slot-Filling Dialog Engine
//!
//! The deterministic state machine behind the assistant: given the user's
//! utterance and the prior dialog state, decide what to ask next, when to
//! classify intent, and when to finalize.
//!
//! ## State Transitions:
//! 1. **Unclassified**: the first utterance is classified into an intent
//!    (the label comes from the chat model; mapping and fallback happen
//!    here). The utterance itself is the request, not a slot answer.
//! 2. **Collecting**: answers are stored under the slot they were asked
//!    for; the first unanswered slot in the intent's fixed order becomes
//!    the next question. Each reply carries the partial action link built
//!    from the answers so far.
//! 3. **Finalized**: all slots answered; a summary and the fully
//!    serialized action link are produced. Further input re-emits the
//!    stored summary verbatim (product decision: no silent
//!    re-classification after finalize).
//!
//! ## Locator Serialization:
//! Query parameters appear in slot-fill order, slot keys render
//! underscores as hyphens, blank answers are omitted, and values are
//! percent-encoded. The same slot map always yields the same string.

use serde::Serialize;
use std::str::FromStr;

/// A form the assistant can fill out on the farmer's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// A marketplace product listing (`/farmer/add/product`)
    ProductListing,

    /// An influencer collaboration request (`/farmer/add/collaboration`)
    Collaboration,
}

/// One slot the dialog must collect before finalizing.
pub struct SlotSpec {
    pub key: &'static str,
    pub prompt: &'static str,
}

const PRODUCT_SLOTS: &[SlotSpec] = &[
    SlotSpec {
        key: "name",
        prompt: "What is the name of the product?",
    },
    SlotSpec {
        key: "category",
        prompt: "Which category fits best: vegetables, fruits, grains, dairy, or other?",
    },
    SlotSpec {
        key: "description",
        prompt: "Please describe the product briefly.",
    },
    SlotSpec {
        key: "price",
        prompt: "What price are you asking, in rupees?",
    },
    SlotSpec {
        key: "quantity",
        prompt: "How much quantity do you have available?",
    },
    SlotSpec {
        key: "unit",
        prompt: "Which unit is that in: kg, g, pieces, bundle, liter, or ml?",
    },
];

const COLLABORATION_SLOTS: &[SlotSpec] = &[
    SlotSpec {
        key: "product_name",
        prompt: "Which product is this collaboration for?",
    },
    SlotSpec {
        key: "product_quantity",
        prompt: "How much of the product will you provide to the influencer?",
    },
    SlotSpec {
        key: "budget",
        prompt: "What budget do you have in mind, in rupees?",
    },
    SlotSpec {
        key: "timeline",
        prompt: "What timeline should the collaboration run on?",
    },
    SlotSpec {
        key: "follower_count",
        prompt: "What minimum follower count should the influencer have?",
    },
    SlotSpec {
        key: "deadline",
        prompt: "By when should influencers apply?",
    },
    SlotSpec {
        key: "requirements",
        prompt: "Any specific requirements for the influencer?",
    },
];

impl Intent {
    /// Base path of the app form this intent fills.
    pub fn base_path(&self) -> &'static str {
        match self {
            Intent::ProductListing => "/farmer/add/product",
            Intent::Collaboration => "/farmer/add/collaboration",
        }
    }

    /// The intent's slots in question order.
    pub fn slot_order(&self) -> &'static [SlotSpec] {
        match self {
            Intent::ProductListing => PRODUCT_SLOTS,
            Intent::Collaboration => COLLABORATION_SLOTS,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Intent::ProductListing => "product listing",
            Intent::Collaboration => "collaboration request",
        }
    }

    /// Map a free-form classifier label onto the intent set.
    ///
    /// The chat model is asked for a single word, but anything it says is
    /// accepted as long as it mentions one of the known concepts. Unknown
    /// labels return None and the caller falls back to the configured
    /// default intent.
    pub fn from_label(label: &str) -> Option<Intent> {
        let label = label.to_lowercase();
        if label.contains("collab") || label.contains("influencer") {
            Some(Intent::Collaboration)
        } else if label.contains("product") || label.contains("listing") || label.contains("sell") {
            Some(Intent::ProductListing)
        } else {
            None
        }
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product_listing" => Ok(Intent::ProductListing),
            "collaboration" => Ok(Intent::Collaboration),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// What the orchestrator should do with the engine's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogDecision {
    /// A slot question was asked; keep collecting
    AskSlot,

    /// All slots collected; the reply is the finalize message
    Finalize,

    /// The session was already finalized; the reply is the stored summary
    Reminder,
}

/// Result of one dialog step.
#[derive(Debug, Clone)]
pub struct DialogOutcome {
    pub reply: String,
    pub decision: DialogDecision,
    pub navigation_url: String,
}

/// Per-session dialog state.
///
/// Owned exclusively by the session's in-flight pipeline run; never shared
/// between concurrent turns. `slots` preserves insertion order, which is
/// both the question order and the locator parameter order.
#[derive(Debug, Clone, Default)]
pub struct DialogState {
    intent: Option<Intent>,
    slots: Vec<(String, String)>,
    awaiting_slot: Option<String>,
    done: bool,
    summary: Option<String>,
    url: String,
}

impl DialogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the next step needs a classification label.
    ///
    /// True exactly once per cycle: before the first utterance has been
    /// mapped to an intent.
    pub fn needs_classification(&self) -> bool {
        !self.done && self.intent.is_none()
    }

    pub fn intent(&self) -> Option<Intent> {
        self.intent
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn awaiting_slot(&self) -> Option<&str> {
        self.awaiting_slot.as_deref()
    }

    pub fn slots(&self) -> &[(String, String)] {
        &self.slots
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Advance the state machine by one user utterance.
    ///
    /// ## Parameters:
    /// - **input**: the user's utterance (transcript or typed text)
    /// - **classification**: the classifier label, when one was requested
    ///   via [`needs_classification`]; None means classification failed
    ///   and the fallback applies
    /// - **fallback**: intent to use when the label is missing or unknown
    ///
    /// This function is pure apart from the `&mut self` update: the same
    /// state and inputs always produce the same outcome, which is what
    /// makes the locator and summary reproducible.
    pub fn step(
        &mut self,
        input: &str,
        classification: Option<&str>,
        fallback: Intent,
    ) -> DialogOutcome {
        if self.done {
            // Already finalized: echo the stored summary, ask nothing new.
            return DialogOutcome {
                reply: self.summary.clone().unwrap_or_default(),
                decision: DialogDecision::Reminder,
                navigation_url: self.url.clone(),
            };
        }

        let intent = match self.intent {
            None => {
                let intent = classification.and_then(Intent::from_label).unwrap_or(fallback);
                tracing::debug!(intent = intent.display_name(), "Dialog intent classified");
                self.intent = Some(intent);
                // The first utterance is the request itself ("I want to add
                // a new product"), not an answer to a slot question.
                intent
            }
            Some(intent) => {
                if let Some(key) = self.awaiting_slot.take() {
                    self.slots.push((key, input.trim().to_string()));
                }
                intent
            }
        };

        match intent
            .slot_order()
            .iter()
            .find(|spec| !self.slots.iter().any(|(key, _)| key == spec.key))
        {
            Some(spec) => {
                self.awaiting_slot = Some(spec.key.to_string());
                self.url = self.locator(intent);
                DialogOutcome {
                    reply: spec.prompt.to_string(),
                    decision: DialogDecision::AskSlot,
                    navigation_url: self.url.clone(),
                }
            }
            None => {
                self.done = true;
                self.url = self.locator(intent);
                let summary = self.render_summary(intent);
                self.summary = Some(summary.clone());
                DialogOutcome {
                    reply: summary,
                    decision: DialogDecision::Finalize,
                    navigation_url: self.url.clone(),
                }
            }
        }
    }

    /// Serialize the collected slots into the action link.
    ///
    /// Parameter order is insertion order (first asked, first serialized);
    /// keys render underscores as hyphens; blank values are omitted.
    fn locator(&self, intent: Intent) -> String {
        let query: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| {
                format!("{}={}", key.replace('_', "-"), encode_component(value.trim()))
            })
            .collect();

        format!("{}?{}", intent.base_path(), query.join("&"))
    }

    fn render_summary(&self, intent: Intent) -> String {
        let fields: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| format!("{}: {}", key.replace('_', " "), value.trim()))
            .collect();

        format!(
            "Your {} is ready. {}. Open the pre-filled form to review and publish it.",
            intent.display_name(),
            fields.join("; ")
        )
    }
}

/// Percent-encode a query-string value.
///
/// Unreserved characters pass through; everything else (including spaces)
/// is encoded, so serialization stays byte-stable across runs.
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_product_state() -> (DialogState, DialogOutcome) {
        let mut state = DialogState::new();
        state.step("I want to add a new product", Some("product"), Intent::ProductListing);
        let answers = ["Tomatoes", "vegetables", "Fresh farm tomatoes", "40", "10", "kg"];
        let mut last = None;
        for answer in answers {
            last = Some(state.step(answer, None, Intent::ProductListing));
        }
        (state, last.unwrap())
    }

    #[test]
    fn test_first_utterance_classifies_and_asks_first_slot() {
        let mut state = DialogState::new();
        assert!(state.needs_classification());

        let outcome = state.step(
            "I want to add a new product",
            Some("product"),
            Intent::Collaboration,
        );

        assert_eq!(state.intent(), Some(Intent::ProductListing));
        assert_eq!(outcome.decision, DialogDecision::AskSlot);
        assert_eq!(state.awaiting_slot(), Some("name"));
        assert_eq!(outcome.navigation_url, "/farmer/add/product?");
        assert!(!state.needs_classification());
    }

    #[test]
    fn test_unknown_label_falls_back() {
        let mut state = DialogState::new();
        state.step("help me", Some("weather forecast"), Intent::ProductListing);
        assert_eq!(state.intent(), Some(Intent::ProductListing));

        let mut state = DialogState::new();
        state.step("help me", None, Intent::Collaboration);
        assert_eq!(state.intent(), Some(Intent::Collaboration));
    }

    #[test]
    fn test_full_product_flow_finalizes_in_order() {
        let (state, outcome) = filled_product_state();

        assert!(state.is_done());
        assert_eq!(outcome.decision, DialogDecision::Finalize);
        assert_eq!(
            outcome.navigation_url,
            "/farmer/add/product?name=Tomatoes&category=vegetables\
             &description=Fresh%20farm%20tomatoes&price=40&quantity=10&unit=kg"
        );
        assert!(outcome.reply.contains("product listing"));
        assert!(outcome.reply.contains("Tomatoes"));
    }

    #[test]
    fn test_awaiting_slot_never_already_filled() {
        let mut state = DialogState::new();
        state.step("add product", Some("product"), Intent::ProductListing);

        for answer in ["Tomatoes", "vegetables", "Fresh", "40", "10"] {
            if let Some(awaiting) = state.awaiting_slot() {
                assert!(
                    !state.slots().iter().any(|(key, _)| key == awaiting),
                    "awaiting slot {} already filled",
                    awaiting
                );
            }
            state.step(answer, None, Intent::ProductListing);
        }
    }

    #[test]
    fn test_finalized_echo_is_byte_identical() {
        let (mut state, finalize) = filled_product_state();

        let echo1 = state.step("what about the weather?", None, Intent::Collaboration);
        let echo2 = state.step("anything else", None, Intent::Collaboration);

        assert_eq!(echo1.decision, DialogDecision::Reminder);
        assert_eq!(echo1.reply, finalize.reply);
        assert_eq!(echo1.navigation_url, finalize.navigation_url);
        assert_eq!(echo2.reply, echo1.reply);
        assert_eq!(echo2.navigation_url, echo1.navigation_url);
        // No re-classification, no new questions
        assert_eq!(state.awaiting_slot(), None);
        assert_eq!(state.intent(), Some(Intent::ProductListing));
    }

    #[test]
    fn test_blank_answer_is_stored_but_omitted_from_locator() {
        let mut state = DialogState::new();
        state.step("collaboration please", Some("collab"), Intent::ProductListing);
        assert_eq!(state.awaiting_slot(), Some("product_name"));

        state.step("Mango crate", None, Intent::ProductListing);
        let outcome = state.step("   ", None, Intent::ProductListing);

        // Blank answer for product_quantity was consumed, next slot asked
        assert_eq!(state.awaiting_slot(), Some("budget"));
        assert_eq!(
            outcome.navigation_url,
            "/farmer/add/collaboration?product-name=Mango%20crate"
        );
    }

    #[test]
    fn test_underscore_keys_render_as_hyphens() {
        let mut state = DialogState::new();
        state.step("collab", Some("collaboration"), Intent::ProductListing);
        for answer in ["Rice", "50 kg", "5000", "2 weeks", "10000", "next friday", "none"] {
            state.step(answer, None, Intent::ProductListing);
        }

        assert!(state.is_done());
        let url = state.url();
        assert!(url.contains("product-name=Rice"));
        assert!(url.contains("follower-count=10000"));
        assert!(!url.contains("product_name"));
        // Insertion order equals question order
        let name_pos = url.find("product-name").unwrap();
        let deadline_pos = url.find("deadline").unwrap();
        assert!(name_pos < deadline_pos);
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(Intent::from_label("PRODUCT"), Some(Intent::ProductListing));
        assert_eq!(Intent::from_label("I think they want to sell something"), Some(Intent::ProductListing));
        assert_eq!(Intent::from_label("collaboration"), Some(Intent::Collaboration));
        assert_eq!(Intent::from_label("influencer request"), Some(Intent::Collaboration));
        assert_eq!(Intent::from_label("greeting"), None);
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("kg"), "kg");
        assert_eq!(encode_component("Fresh farm tomatoes"), "Fresh%20farm%20tomatoes");
        assert_eq!(encode_component("a&b=c"), "a%26b%3Dc");
    }
}
