use tracing::debug;

use crate::error::MoveSourceError;
use crate::oracle::Suggestion;

/// Reads `{"row": .., "col": ..}` out of a free-text reply.
///
/// The whole reply is tried as JSON first. Failing that, the first
/// `{ ... }` span (shortest, may cross lines) is parsed instead.
pub fn parse_suggestion(content: &str) -> Result<Suggestion, MoveSourceError> {
    let direct = match serde_json::from_str::<Suggestion>(content.trim()) {
        Ok(suggestion) => return Ok(suggestion),
        Err(err) => err,
    };
    debug!(error = %direct, "reply is not bare JSON, scanning for an object");

    let object = first_object(content).ok_or_else(|| {
        MoveSourceError::Malformed(format!("no JSON object in reply ({direct})"))
    })?;
    Ok(serde_json::from_str(object)?)
}

fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let len = text[start..].find('}')?;
    Some(&text[start..=start + len])
}
