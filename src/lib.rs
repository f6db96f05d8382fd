use std::error::Error as StdError;
use std::fmt;

mod dom;
mod guard;
mod html;
mod page;
mod rules;

pub use dom::NodeId;
pub use guard::{
    FieldBinding, FormBindings, FormGuard, FormGuardHandle, StatusBinding, REDIRECT_DELAY_MS,
    REDIRECT_TARGET, SCRIPTING_MARKER_CLASS, SUCCESS_ACCENT, SUCCESS_BACKGROUND,
};
pub use page::{
    EventState, ListenerId, LocationNavigation, LocationNavigationKind, Page, PendingTimer,
    TimerId,
};
pub use rules::{
    email_rules, evaluate, first_failure, messages, password_rules, FieldRule, FieldValidity,
    EMAIL_PATTERN, MIN_PASSWORD_CHARS,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    ElementNotFound(String),
    TypeMismatch {
        id: String,
        expected: String,
        actual: String,
    },
    AssertionFailed {
        id: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
    Runtime(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::ElementNotFound(id) => write!(f, "element not found: #{id}"),
            Self::TypeMismatch {
                id,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch for #{id}: expected {expected}, actual {actual}"
            ),
            Self::AssertionFailed {
                id,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for #{id}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
            Self::Runtime(msg) => write!(f, "runtime error: {msg}"),
        }
    }
}

impl StdError for Error {}
