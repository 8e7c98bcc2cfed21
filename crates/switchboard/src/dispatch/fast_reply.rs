//! Short-circuit replies for trivial greetings.
//!
//! Checked before any provider or store I/O so the most common input never
//! pays for a reasoning round trip.

/// Inputs that get a canned reply instead of a dispatch round.
const GREETINGS: [&str; 6] = ["hello", "hi", "hey", "hola", "yo", "sup"];

/// Returns the canned greeting when the query is nothing but a greeting.
/// Matching is exact on the trimmed, lowercased text.
pub fn check(query: &str, requester: &str) -> Option<String> {
    let normalized = query.trim().to_lowercase();
    if GREETINGS.contains(&normalized.as_str()) {
        Some(format!("Hello there <@{requester}>!"))
    } else {
        None
    }
}
