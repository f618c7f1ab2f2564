//! Account rules shared by signup and the repository layer.

pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;

/// Usernames follow the conventional web-account alphabet: letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.is_empty() {
        return Err("This field is required.");
    }
    if username.chars().count() > USERNAME_MAX_LEN {
        return Err("Ensure this value has at most 150 characters.");
    }
    let valid = username
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'));
    if !valid {
        return Err(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
    Ok(())
}

pub fn validate_password(password: &str, username: &str) -> Result<(), &'static str> {
    if password.is_empty() {
        return Err("This field is required.");
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err("This password is too short. It must contain at least 8 characters.");
    }
    if password.chars().all(|ch| ch.is_ascii_digit()) {
        return Err("This password is entirely numeric.");
    }
    if !username.is_empty() && password.eq_ignore_ascii_case(username) {
        return Err("The password is too similar to the username.");
    }
    Ok(())
}
