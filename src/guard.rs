use std::cell::RefCell;
use std::rc::Rc;

use crate::dom::NodeId;
use crate::page::{ListenerId, LocationNavigationKind, Page, TimerId};
use crate::rules::{self, messages, FieldRule, FieldValidity};
use crate::Result;

pub const SCRIPTING_MARKER_CLASS: &str = "js-enabled";
pub const REDIRECT_TARGET: &str = "index.html";
pub const REDIRECT_DELAY_MS: i64 = 2000;
pub const SUCCESS_BACKGROUND: &str = "#f0f9f4";
pub const SUCCESS_ACCENT: &str = "#4a7c59";

/// An input element paired with its inline error container. A field is only
/// wired when both are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBinding {
    pub input: NodeId,
    pub error: NodeId,
}

impl FieldBinding {
    pub fn resolve(page: &Page, input_id: &str, error_id: &str) -> Option<Self> {
        Some(Self {
            input: page.by_id(input_id)?,
            error: page.by_id(error_id)?,
        })
    }
}

/// The shared status region used for both the success and the summary-error
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBinding {
    pub region: NodeId,
    pub message: NodeId,
}

impl StatusBinding {
    pub fn resolve(page: &Page, region_id: &str, message_id: &str) -> Option<Self> {
        Some(Self {
            region: page.by_id(region_id)?,
            message: page.by_id(message_id)?,
        })
    }
}

/// The elements the controller binds to, resolved up front. Every part
/// except the form itself may be absent; absence skips the dependent wiring
/// and contributes no validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormBindings {
    pub form: NodeId,
    pub email: Option<FieldBinding>,
    pub password: Option<FieldBinding>,
    pub status: Option<StatusBinding>,
}

impl FormBindings {
    /// Looks up the documented element ids. Returns `None` when the page has
    /// no form at all.
    pub fn resolve(page: &Page) -> Option<Self> {
        let form = page.dom().find_first_by_tag("form")?;
        Some(Self {
            form,
            email: FieldBinding::resolve(page, "email", "email-error"),
            password: FieldBinding::resolve(page, "password", "password-error"),
            status: StatusBinding::resolve(page, "global-error", "error-message"),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldSlot {
    Email,
    Password,
}

#[derive(Debug, Default)]
struct GuardState {
    email: FieldValidity,
    password: FieldValidity,
    redirect_timer: Option<TimerId>,
}

impl GuardState {
    fn get(&self, slot: FieldSlot) -> FieldValidity {
        match slot {
            FieldSlot::Email => self.email,
            FieldSlot::Password => self.password,
        }
    }

    fn set(&mut self, slot: FieldSlot, validity: FieldValidity) {
        match slot {
            FieldSlot::Email => self.email = validity,
            FieldSlot::Password => self.password = validity,
        }
    }
}

/// Owns every listener registration and the pending redirect timer, so the
/// controller can be torn down cleanly.
pub struct FormGuardHandle {
    registrations: Vec<(NodeId, &'static str, ListenerId)>,
    state: Rc<RefCell<GuardState>>,
}

impl FormGuardHandle {
    pub fn email_validity(&self) -> FieldValidity {
        self.state.borrow().email
    }

    pub fn password_validity(&self) -> FieldValidity {
        self.state.borrow().password
    }

    /// Removes all handlers and cancels a scheduled redirect.
    pub fn detach(self, page: &mut Page) {
        for (node, event, id) in &self.registrations {
            page.remove_listener(*node, event, *id);
        }
        if let Some(timer) = self.state.borrow_mut().redirect_timer.take() {
            page.clear_timeout(timer);
        }
    }
}

pub struct FormGuard;

impl FormGuard {
    /// Page-load entry point: marks the document as script-enabled, then
    /// wires the form when one exists. No form means no wiring.
    pub fn install(page: &mut Page) -> Result<Option<FormGuardHandle>> {
        mark_scripting_enabled(page)?;
        let Some(bindings) = FormBindings::resolve(page) else {
            return Ok(None);
        };
        Ok(Some(Self::attach(page, bindings)?))
    }

    pub fn attach(page: &mut Page, bindings: FormBindings) -> Result<FormGuardHandle> {
        let state = Rc::new(RefCell::new(GuardState::default()));
        let mut registrations = Vec::new();

        if let Some(field) = bindings.email {
            attach_field(
                page,
                &state,
                &mut registrations,
                field,
                FieldSlot::Email,
                rules::email_rules(),
            );
        }
        if let Some(field) = bindings.password {
            attach_field(
                page,
                &state,
                &mut registrations,
                field,
                FieldSlot::Password,
                rules::password_rules(),
            );
        }

        let submit_state = Rc::clone(&state);
        let listener = page.add_listener(bindings.form, "submit", false, move |page, event| {
            event.prevent_default();

            let email = match bindings.email {
                Some(field) => validate_field(page, field, rules::email_rules())?,
                None => FieldValidity::Valid,
            };
            let password = match bindings.password {
                Some(field) => validate_field(page, field, rules::password_rules())?,
                None => FieldValidity::Valid,
            };
            {
                let mut guard = submit_state.borrow_mut();
                guard.email = email;
                guard.password = password;
            }

            if email.is_invalid() || password.is_invalid() {
                show_global_error(page, bindings.status, messages::FORM_SUMMARY_ERROR)?;
                // Focus the first invalid field, email before password.
                if let (Some(field), true) = (bindings.email, email.is_invalid()) {
                    page.focus_element(field.input)?;
                } else if let (Some(field), true) = (bindings.password, password.is_invalid()) {
                    page.focus_element(field.input)?;
                }
            } else {
                show_success(page, bindings.status, &submit_state)?;
            }
            Ok(())
        });
        registrations.push((bindings.form, "submit", listener));

        Ok(FormGuardHandle {
            registrations,
            state,
        })
    }
}

fn attach_field(
    page: &mut Page,
    state: &Rc<RefCell<GuardState>>,
    registrations: &mut Vec<(NodeId, &'static str, ListenerId)>,
    field: FieldBinding,
    slot: FieldSlot,
    rules: &'static [FieldRule],
) {
    let blur_state = Rc::clone(state);
    let listener = page.add_listener(field.input, "blur", false, move |page, _event| {
        let validity = validate_field(page, field, rules)?;
        blur_state.borrow_mut().set(slot, validity);
        Ok(())
    });
    registrations.push((field.input, "blur", listener));

    // Corrective typing clears a shown error as soon as the value is
    // non-empty again; the full rule chain runs on the next blur or submit.
    let input_state = Rc::clone(state);
    let listener = page.add_listener(field.input, "input", false, move |page, _event| {
        if !input_state.borrow().get(slot).is_invalid() {
            return Ok(());
        }
        let value = page.dom().value(field.input)?;
        if value.trim().is_empty() {
            return Ok(());
        }
        input_state.borrow_mut().set(slot, FieldValidity::Untouched);
        project_validity(page, field, FieldValidity::Untouched)
    });
    registrations.push((field.input, "input", listener));
}

/// Runs the rule chain against the trimmed value and projects the outcome
/// onto the DOM. Idempotent for an unchanged value.
fn validate_field(
    page: &mut Page,
    field: FieldBinding,
    rules: &[FieldRule],
) -> Result<FieldValidity> {
    let value = page.dom().value(field.input)?;
    let validity = rules::evaluate(rules, value.trim());
    project_validity(page, field, validity)?;
    Ok(validity)
}

/// The only writer of the accessibility marker and the inline error text.
fn project_validity(page: &mut Page, field: FieldBinding, validity: FieldValidity) -> Result<()> {
    match validity.message() {
        Some(message) => {
            page.dom_mut().set_attr(field.input, "aria-invalid", "true")?;
            page.dom_mut().set_text_content(field.error, message)?;
        }
        None => {
            page.dom_mut().remove_attr(field.input, "aria-invalid")?;
            page.dom_mut().set_text_content(field.error, "")?;
        }
    }
    Ok(())
}

fn show_success(
    page: &mut Page,
    status: Option<StatusBinding>,
    state: &Rc<RefCell<GuardState>>,
) -> Result<()> {
    // Without a status region there is nowhere to announce the outcome and
    // no redirect either, matching the no-op branch of the error path.
    let Some(status) = status else {
        return Ok(());
    };

    page.dom_mut().remove_attr(status.region, "hidden")?;
    page.dom_mut()
        .set_style_property(status.region, "background", SUCCESS_BACKGROUND)?;
    page.dom_mut()
        .set_style_property(status.region, "border-color", SUCCESS_ACCENT)?;
    page.dom_mut()
        .set_style_property(status.message, "color", SUCCESS_ACCENT)?;
    page.dom_mut()
        .set_text_content(status.message, messages::SUBMIT_SUCCESS)?;

    let timer = page.set_timeout(REDIRECT_DELAY_MS, |page| {
        page.navigate_to(REDIRECT_TARGET, LocationNavigationKind::Assign);
        Ok(())
    });
    if let Some(previous) = state.borrow_mut().redirect_timer.replace(timer) {
        page.clear_timeout(previous);
    }
    Ok(())
}

// The palette is deliberately left alone here: a success palette shown
// earlier persists under a later summary error, as in the original page.
fn show_global_error(
    page: &mut Page,
    status: Option<StatusBinding>,
    message: &str,
) -> Result<()> {
    let Some(status) = status else {
        return Ok(());
    };
    page.dom_mut().remove_attr(status.region, "hidden")?;
    page.dom_mut().set_text_content(status.message, message)
}

fn mark_scripting_enabled(page: &mut Page) -> Result<()> {
    let Some(root) = page.dom().document_element() else {
        return Ok(());
    };
    page.dom_mut().add_class(root, SCRIPTING_MARKER_CLASS)
}
