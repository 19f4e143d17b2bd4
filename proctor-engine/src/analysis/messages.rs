//! Human-readable messages per violation type

/// Message shown for event types the lookup does not know
pub const GENERIC_MESSAGE: &str = "Suspicious activity detected";

/// Static message lookup by event type
pub fn message_for(event_type: &str) -> &'static str {
    match event_type {
        "NO_FACE" => "Candidate not visible on camera",
        "MULTIPLE_PEOPLE" => "More than one person detected",
        "LOOKING_AWAY" => "Candidate was looking away from the screen",
        "PHONE_USAGE" => "Detected mobile phone usage",
        "SUSPECTED_OBJECT" => "Suspected objects detected",
        "IDENTITY_MISMATCH" => "Candidate identity mismatch detected",
        _ => GENERIC_MESSAGE,
    }
}
