use std::sync::OnceLock;

use fancy_regex::Regex;

/// Permissive email shape: one `@`, at least one `.` after it, no whitespace.
/// Deliberately not full RFC validation.
pub const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

pub const MIN_PASSWORD_CHARS: usize = 8;

/// Localized feedback texts and the global status strings.
pub mod messages {
    pub mod email {
        pub const EMPTY: &str = "Veuillez saisir votre adresse email";
        pub const INVALID: &str =
            "Veuillez saisir une adresse email valide (exemple: nom@domaine.fr)";
    }

    pub mod password {
        pub const EMPTY: &str = "Veuillez saisir votre mot de passe";
        pub const TOO_SHORT: &str = "Le mot de passe doit contenir au moins 8 caractères";
    }

    pub const FORM_SUMMARY_ERROR: &str =
        "Veuillez corriger les erreurs dans le formulaire avant de continuer.";
    pub const SUBMIT_SUCCESS: &str = "Connexion réussie ! Redirection en cours...";
}

/// One validation step: the first rule whose predicate fails determines the
/// displayed message. Predicates receive the trimmed field value.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub predicate: fn(&str) -> bool,
    pub message: &'static str,
}

/// Explicit per-field validation state. The DOM marker and error text are a
/// projection of this value; it is never re-derived by reading attributes
/// back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldValidity {
    #[default]
    Untouched,
    Valid,
    Invalid(&'static str),
}

impl FieldValidity {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::Invalid(message) => Some(message),
            _ => None,
        }
    }
}

static EMAIL_RULES: [FieldRule; 2] = [
    FieldRule {
        predicate: non_empty,
        message: messages::email::EMPTY,
    },
    FieldRule {
        predicate: email_shape,
        message: messages::email::INVALID,
    },
];

static PASSWORD_RULES: [FieldRule; 2] = [
    FieldRule {
        predicate: non_empty,
        message: messages::password::EMPTY,
    },
    FieldRule {
        predicate: long_enough_password,
        message: messages::password::TOO_SHORT,
    },
];

pub fn email_rules() -> &'static [FieldRule] {
    &EMAIL_RULES
}

pub fn password_rules() -> &'static [FieldRule] {
    &PASSWORD_RULES
}

pub fn first_failure(rules: &[FieldRule], value: &str) -> Option<&'static str> {
    rules
        .iter()
        .find(|rule| !(rule.predicate)(value))
        .map(|rule| rule.message)
}

pub fn evaluate(rules: &[FieldRule], value: &str) -> FieldValidity {
    match first_failure(rules, value) {
        Some(message) => FieldValidity::Invalid(message),
        None => FieldValidity::Valid,
    }
}

fn non_empty(value: &str) -> bool {
    !value.is_empty()
}

fn email_shape(value: &str) -> bool {
    email_regex().is_match(value).unwrap_or(false)
}

fn long_enough_password(value: &str) -> bool {
    value.chars().count() >= MIN_PASSWORD_CHARS
}

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_email_fails_with_the_empty_message() {
        assert_eq!(
            evaluate(email_rules(), ""),
            FieldValidity::Invalid(messages::email::EMPTY)
        );
    }

    #[test]
    fn malformed_email_fails_with_the_invalid_message() {
        for input in ["plain", "missing@dot", "two@@x.fr", "white space@x.fr", "a@b."] {
            assert_eq!(
                evaluate(email_rules(), input),
                FieldValidity::Invalid(messages::email::INVALID),
                "input: {input}"
            );
        }
    }

    #[test]
    fn plausible_email_passes() {
        for input in ["a@b.co", "nom@domaine.fr", "user+tag@sub.example.org"] {
            assert_eq!(evaluate(email_rules(), input), FieldValidity::Valid, "input: {input}");
        }
    }

    #[test]
    fn empty_password_fails_before_the_length_rule() {
        assert_eq!(
            evaluate(password_rules(), ""),
            FieldValidity::Invalid(messages::password::EMPTY)
        );
    }

    #[test]
    fn short_password_fails_with_the_too_short_message() {
        assert_eq!(
            evaluate(password_rules(), "short"),
            FieldValidity::Invalid(messages::password::TOO_SHORT)
        );
        assert_eq!(
            evaluate(password_rules(), "1234567"),
            FieldValidity::Invalid(messages::password::TOO_SHORT)
        );
    }

    #[test]
    fn eight_characters_pass_counting_scalar_values() {
        assert_eq!(evaluate(password_rules(), "abcdefgh"), FieldValidity::Valid);
        // Accented characters count once each.
        assert_eq!(evaluate(password_rules(), "àéîôùçüë"), FieldValidity::Valid);
    }

    #[test]
    fn first_failing_rule_wins() {
        // The empty value also fails the shape rule, but the empty message
        // is reported.
        assert_eq!(first_failure(email_rules(), ""), Some(messages::email::EMPTY));
        assert_eq!(first_failure(email_rules(), "a@b.co"), None);
    }

    #[test]
    fn validity_accessors_expose_the_message() {
        let invalid = FieldValidity::Invalid(messages::email::EMPTY);
        assert!(invalid.is_invalid());
        assert_eq!(invalid.message(), Some(messages::email::EMPTY));
        assert!(!FieldValidity::Valid.is_invalid());
        assert_eq!(FieldValidity::Untouched.message(), None);
    }
}
