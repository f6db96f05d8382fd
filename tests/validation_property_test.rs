use formguard::{
    email_rules, evaluate, messages, password_rules, FieldValidity, FormGuard, Page, Result,
};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{FileFailurePersistence, TestCaseResult};

const VALIDATION_PROPTEST_REGRESSION_FILE: &str =
    "tests/proptest-regressions/validation_property_test.txt";
const DEFAULT_VALIDATION_PROPTEST_CASES: u32 = 128;

const LOGIN_PAGE: &str = r#"
<html>
  <body>
    <div id="global-error" hidden><span id="error-message"></span></div>
    <form id="login-form">
      <input id="email" type="email">
      <p id="email-error"></p>
      <input id="password" type="password">
      <p id="password-error"></p>
      <button id="login-submit" type="submit">Se connecter</button>
    </form>
  </body>
</html>
"#;

fn validation_proptest_cases() -> u32 {
    std::env::var("FORMGUARD_PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_VALIDATION_PROPTEST_CASES)
}

fn whitespace_strategy() -> BoxedStrategy<String> {
    vec(
        prop_oneof![Just(' '), Just('\t'), Just('\n'), Just('\r')],
        0..=8,
    )
    .prop_map(|chars| chars.into_iter().collect())
    .boxed()
}

fn well_formed_email_strategy() -> BoxedStrategy<String> {
    ("[a-z0-9._+-]{1,12}", "[a-z0-9-]{1,12}", "[a-z]{2,6}")
        .prop_map(|(local, host, tld)| format!("{local}@{host}.{tld}"))
        .boxed()
}

fn malformed_email_strategy() -> BoxedStrategy<String> {
    prop_oneof![
        // No @ at all.
        "[a-z0-9.]{1,16}",
        // An @ but nothing after the last dot, or no dot after the @.
        "[a-z0-9]{1,8}@[a-z0-9]{1,8}",
        "[a-z0-9]{1,8}@[a-z0-9]{1,8}\\.",
        // Whitespace inside the address.
        ("[a-z]{1,5}", "[a-z]{1,5}")
            .prop_map(|(a, b)| format!("{a} {b}@x.fr")),
    ]
    .boxed()
}

fn short_password_strategy() -> BoxedStrategy<String> {
    "[a-zA-Z0-9àéîôù]{1,7}".boxed()
}

fn long_password_strategy() -> BoxedStrategy<String> {
    "[a-zA-Z0-9àéîôù]{8,24}".boxed()
}

fn field_value_strategy() -> BoxedStrategy<String> {
    prop_oneof![
        whitespace_strategy(),
        well_formed_email_strategy(),
        malformed_email_strategy(),
        short_password_strategy(),
        long_password_strategy(),
    ]
    .boxed()
}

fn fail(message: String) -> proptest::test_runner::TestCaseError {
    proptest::test_runner::TestCaseError::fail(message)
}

fn install_login_page() -> std::result::Result<Page, proptest::test_runner::TestCaseError> {
    let mut page =
        Page::from_html(LOGIN_PAGE).map_err(|err| fail(format!("parse failed: {err:?}")))?;
    FormGuard::install(&mut page)
        .map_err(|err| fail(format!("install failed: {err:?}")))?
        .ok_or_else(|| fail("no form bound".into()))?;
    Ok(page)
}

fn field_state(page: &Page, input_id: &str, error_id: &str) -> Result<(Option<String>, String)> {
    Ok((page.attr(input_id, "aria-invalid")?, page.text(error_id)?))
}

/// Blurring a field twice with an unchanged value must leave the same marker
/// and error text both times.
fn assert_blur_is_idempotent(field: &str, value: &str) -> TestCaseResult {
    let mut page = install_login_page()?;
    let error_id = format!("{field}-error");

    page.type_text(field, value)
        .map_err(|err| fail(format!("type_text failed: {err:?}")))?;

    page.focus(field).map_err(|err| fail(format!("{err:?}")))?;
    page.blur(field).map_err(|err| fail(format!("{err:?}")))?;
    let first = field_state(&page, field, &error_id)
        .map_err(|err| fail(format!("{err:?}")))?;

    page.focus(field).map_err(|err| fail(format!("{err:?}")))?;
    page.blur(field).map_err(|err| fail(format!("{err:?}")))?;
    let second = field_state(&page, field, &error_id)
        .map_err(|err| fail(format!("{err:?}")))?;

    prop_assert_eq!(&first, &second, "value={:?}", value);
    Ok(())
}

/// Submitting focuses the first invalid field and leaves the page exactly
/// when both rule chains pass.
fn assert_submit_outcome(email: &str, password: &str) -> TestCaseResult {
    let mut page = install_login_page()?;

    page.type_text("email", email)
        .map_err(|err| fail(format!("{err:?}")))?;
    page.type_text("password", password)
        .map_err(|err| fail(format!("{err:?}")))?;
    page.submit("login-form")
        .map_err(|err| fail(format!("{err:?}")))?;

    let email_invalid = evaluate(email_rules(), email.trim()).is_invalid();
    let password_invalid = evaluate(password_rules(), password.trim()).is_invalid();

    if email_invalid {
        let focused = page.focused_id();
        prop_assert_eq!(focused.as_deref(), Some("email"));
    } else if password_invalid {
        let focused = page.focused_id();
        prop_assert_eq!(focused.as_deref(), Some("password"));
    }

    let message = page
        .text("error-message")
        .map_err(|err| fail(format!("{err:?}")))?;
    let redirects = !page.pending_timers().is_empty();
    if email_invalid || password_invalid {
        prop_assert_eq!(message.as_str(), messages::FORM_SUMMARY_ERROR);
        prop_assert!(!redirects, "failure path must not schedule a redirect");
    } else {
        prop_assert_eq!(message.as_str(), messages::SUBMIT_SUCCESS);
        prop_assert!(redirects, "success path must schedule the redirect");
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: validation_proptest_cases(),
        failure_persistence: Some(Box::new(
            FileFailurePersistence::Direct(VALIDATION_PROPTEST_REGRESSION_FILE),
        )),
        .. ProptestConfig::default()
    })]

    #[test]
    fn whitespace_only_email_reports_the_empty_message(raw in whitespace_strategy()) {
        prop_assert_eq!(
            evaluate(email_rules(), raw.trim()),
            FieldValidity::Invalid(messages::email::EMPTY)
        );
    }

    #[test]
    fn well_formed_emails_pass(address in well_formed_email_strategy()) {
        prop_assert_eq!(evaluate(email_rules(), address.trim()), FieldValidity::Valid);
    }

    #[test]
    fn malformed_emails_report_the_invalid_message(address in malformed_email_strategy()) {
        prop_assert_eq!(
            evaluate(email_rules(), &address),
            FieldValidity::Invalid(messages::email::INVALID),
            "address={:?}", address
        );
    }

    #[test]
    fn short_passwords_report_the_length_message(password in short_password_strategy()) {
        prop_assert_eq!(
            evaluate(password_rules(), &password),
            FieldValidity::Invalid(messages::password::TOO_SHORT)
        );
    }

    #[test]
    fn long_enough_passwords_pass(password in long_password_strategy()) {
        prop_assert_eq!(evaluate(password_rules(), &password), FieldValidity::Valid);
    }

    #[test]
    fn repeated_blur_with_an_unchanged_value_is_idempotent(
        value in field_value_strategy(),
        on_password in any::<bool>(),
    ) {
        let field = if on_password { "password" } else { "email" };
        assert_blur_is_idempotent(field, &value)?;
    }

    #[test]
    fn submit_focuses_the_first_invalid_field_and_gates_the_redirect(
        email in prop_oneof![
            whitespace_strategy(),
            well_formed_email_strategy(),
            malformed_email_strategy(),
        ],
        password in prop_oneof![
            whitespace_strategy(),
            short_password_strategy(),
            long_password_strategy(),
        ],
    ) {
        assert_submit_outcome(&email, &password)?;
    }
}
