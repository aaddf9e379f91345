//! Static persona table.
//!
//! Personas are process-wide configuration. Which one is active is per
//! session state, changed only by a handoff directive between turns.

/// An agent persona.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Persona {
    pub id: &'static str,
    pub display_name: &'static str,
    pub role: &'static str,
    /// Behavioral rules; becomes the system prompt.
    pub ruleset: &'static str,
    pub voice_id: Option<&'static str>,
    /// Sampling temperature for this persona's runs; `None` keeps the model default.
    pub temperature: Option<f32>,
}

/// Persona used when nothing else is configured.
pub const DEFAULT_PERSONA_ID: &str = "sydney";

pub static PERSONAS: &[Persona] = &[
    Persona {
        id: "sydney",
        display_name: "Sydney",
        role: "Companion",
        ruleset: "You are Sydney, a warm everyday companion. Keep replies short and \
                  conversational. Use tools when the user asks you to get something done. \
                  If another persona fits the request better, hand off with transfer_to_agent.",
        voice_id: Some("alloy"),
        temperature: Some(0.8),
    },
    Persona {
        id: "marcus",
        display_name: "Marcus",
        role: "Concierge",
        ruleset: "You are Marcus, a precise concierge. You handle rides, food orders, \
                  reservations, hotels and appointments. Confirm the key details before \
                  booking. If a service is unavailable, say so plainly and offer an alternative.",
        voice_id: Some("onyx"),
        temperature: Some(0.3),
    },
    Persona {
        id: "luna",
        display_name: "Luna",
        role: "Wellbeing guide",
        ruleset: "You are Luna, a calm wellbeing guide. Listen first, reflect back what you \
                  hear, and suggest small grounding exercises. You are not a therapist; \
                  encourage professional support when appropriate.",
        voice_id: Some("shimmer"),
        temperature: Some(0.6),
    },
    Persona {
        id: "kai",
        display_name: "Kai",
        role: "Activity coach",
        ruleset: "You are Kai, an upbeat activity coach. Help plan workouts, outings and \
                  routines. Keep suggestions concrete and achievable.",
        voice_id: None,
        temperature: None,
    },
];

/// Look up a persona by id.
pub fn find(id: &str) -> Option<&'static Persona> {
    PERSONAS.iter().find(|p| p.id == id)
}

/// Every persona id, in table order.
pub fn ids() -> Vec<&'static str> {
    PERSONAS.iter().map(|p| p.id).collect()
}

/// The default persona.
pub fn default_persona() -> &'static Persona {
    find(DEFAULT_PERSONA_ID).unwrap_or(&PERSONAS[0])
}

impl Persona {
    /// System prompt for a run: the ruleset plus the prior-session summary.
    pub fn system_prompt(&self, memory: Option<&str>) -> String {
        match memory.map(str::trim).filter(|m| !m.is_empty()) {
            Some(summary) => format!(
                "{}\n\nWhat you remember from previous conversations with this user:\n{summary}",
                self.ruleset
            ),
            None => self.ruleset.to_string(),
        }
    }
}
