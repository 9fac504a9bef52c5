//! Static registry of built-in personas.
//!
//! A persona binds a voice identity and delivery style (speed, stylistic
//! traits) to a name. Names are unique within the built-in set (spec.md §3).

/// A named combination of voice id, speed, and stylistic traits.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    /// Unique display name.
    pub name: &'static str,
    /// TTS voice identifier to pass to the synthesis engine.
    pub voice_id: &'static str,
    /// Delivery speed multiplier, in \[0.5, 2.0\].
    pub speed: f32,
    /// Free-text gender descriptor for voice selection UIs.
    pub gender: &'static str,
    /// Short stylistic traits (e.g. "warm", "direct", "playful").
    pub traits: &'static [&'static str],
}

/// Built-in persona registry, ordered by name.
pub const BUILTIN_PERSONAS: &[Persona] = &[
    Persona {
        name: "default",
        voice_id: "af_sky",
        speed: 1.0,
        gender: "female",
        traits: &["neutral", "clear"],
    },
    Persona {
        name: "calm",
        voice_id: "af_nova",
        speed: 0.9,
        gender: "female",
        traits: &["measured", "reassuring"],
    },
    Persona {
        name: "energetic",
        voice_id: "am_adam",
        speed: 1.15,
        gender: "male",
        traits: &["upbeat", "direct"],
    },
];

/// Look up a built-in persona by name (case-sensitive, exact match).
#[must_use]
pub fn find(name: &str) -> Option<&'static Persona> {
    BUILTIN_PERSONAS.iter().find(|p| p.name == name)
}
