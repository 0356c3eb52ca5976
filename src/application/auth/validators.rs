//! Rule sets for account commands.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::application::pipeline::validation::{Rules, ValidationFailure, Validator};

use super::commands::{Login, RegisterAdmin, RegisterUser, Registration};

pub const PASSWORD_MIN_CHARS: usize = 8;
pub const NAME_MAX_CHARS: usize = 100;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"));

fn registration_rules(registration: &Registration) -> Vec<ValidationFailure> {
    let email = registration.email.trim();
    let mut rules = Rules::new();
    rules.required("Email", email, "Email is required");
    if !email.is_empty() {
        rules.check(
            "Email",
            EMAIL_PATTERN.is_match(email),
            "Email must be a valid email address",
        );
    }
    rules
        .check(
            "Password",
            registration.password.chars().count() >= PASSWORD_MIN_CHARS,
            format!("Password must be at least {PASSWORD_MIN_CHARS} characters"),
        )
        .required("FirstName", &registration.first_name, "First name is required")
        .max_chars(
            "FirstName",
            &registration.first_name,
            NAME_MAX_CHARS,
            format!("First name must not exceed {NAME_MAX_CHARS} characters"),
        )
        .required("LastName", &registration.last_name, "Last name is required")
        .max_chars(
            "LastName",
            &registration.last_name,
            NAME_MAX_CHARS,
            format!("Last name must not exceed {NAME_MAX_CHARS} characters"),
        );
    rules.finish()
}

pub struct RegistrationValidator;

impl Validator<RegisterUser> for RegistrationValidator {
    fn validate(&self, op: &RegisterUser) -> Vec<ValidationFailure> {
        registration_rules(&op.0)
    }
}

impl Validator<RegisterAdmin> for RegistrationValidator {
    fn validate(&self, op: &RegisterAdmin) -> Vec<ValidationFailure> {
        registration_rules(&op.0)
    }
}

pub struct LoginValidator;

impl Validator<Login> for LoginValidator {
    fn validate(&self, op: &Login) -> Vec<ValidationFailure> {
        let mut rules = Rules::new();
        rules
            .required("Email", &op.email, "Email is required")
            .check("Password", !op.password.is_empty(), "Password is required");
        rules.finish()
    }
}
