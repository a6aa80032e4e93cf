//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of generated room codes accepted on join.
const ROOM_CODE_MIN: usize = 4;
const ROOM_CODE_MAX: usize = 10;

/// Validates that a room code is 4 to 10 uppercase alphanumeric characters.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("QUIZ42")  // Ok
/// validate_room_code("quiz42")  // Err - lowercase
/// validate_room_code("QZ")      // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.len() < ROOM_CODE_MIN || code.len() > ROOM_CODE_MAX {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be {ROOM_CODE_MIN} to {ROOM_CODE_MAX} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        let mut err = ValidationError::new("room_code_format");
        err.message =
            Some("Room code must contain only uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}
