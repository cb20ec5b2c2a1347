use crate::common::error::Error;
use validator::{Validate, ValidationError};

/// Validates a request DTO using the validator crate
pub fn validate_request<T: Validate>(data: &T) -> Result<(), Error> {
    data.validate().map_err(|e| {
        let messages: Vec<String> = e
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                let field = field.to_string();
                errors.iter().map(move |err| {
                    format!(
                        "{}: {}",
                        field,
                        err.message
                            .as_ref()
                            .unwrap_or(&std::borrow::Cow::Borrowed("validation failed"))
                    )
                })
            })
            .collect();

        Error::BadRequest(messages.join(", "))
    })
}

/// Enforces the password composition rule used on signup, password change,
/// and password reset: at least 8 characters, one uppercase letter, one
/// lowercase letter, and one digit.
pub fn validate_password_strength(value: &str) -> Result<(), ValidationError> {
    if value.len() < 8 {
        return Err(ValidationError::new("password_too_short")
            .with_message("Password must be at least 8 characters".into()));
    }

    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());

    if !has_upper || !has_lower || !has_digit {
        return Err(ValidationError::new("password_too_weak").with_message(
            "Password must contain an uppercase letter, a lowercase letter, and a digit".into(),
        ));
    }

    Ok(())
}
