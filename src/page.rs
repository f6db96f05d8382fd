use std::collections::HashMap;
use std::rc::Rc;

use crate::dom::{truncate_chars, Dom, NodeId};
use crate::html::parse_html;
use crate::{Error, Result};

const DEFAULT_TIMER_STEP_LIMIT: usize = 10_000;
const DEFAULT_LOCATION: &str = "login.html";

pub type ListenerCallback = Rc<dyn Fn(&mut Page, &mut EventState) -> Result<()>>;
pub type TimerCallback = Rc<dyn Fn(&mut Page) -> Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(i64);

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    capture: bool,
    callback: ListenerCallback,
}

#[derive(Default)]
struct ListenerStore {
    map: HashMap<NodeId, HashMap<String, Vec<Listener>>>,
}

impl ListenerStore {
    fn add(&mut self, node_id: NodeId, event: String, listener: Listener) {
        self.map
            .entry(node_id)
            .or_default()
            .entry(event)
            .or_default()
            .push(listener);
    }

    fn remove(&mut self, node_id: NodeId, event: &str, listener_id: ListenerId) -> bool {
        let Some(events) = self.map.get_mut(&node_id) else {
            return false;
        };
        let Some(listeners) = events.get_mut(event) else {
            return false;
        };

        if let Some(pos) = listeners
            .iter()
            .position(|listener| listener.id == listener_id)
        {
            listeners.remove(pos);
            if listeners.is_empty() {
                events.remove(event);
            }
            if events.is_empty() {
                self.map.remove(&node_id);
            }
            return true;
        }

        false
    }

    fn contains(&self, node_id: NodeId, event: &str, listener_id: ListenerId) -> bool {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .map(|listeners| listeners.iter().any(|listener| listener.id == listener_id))
            .unwrap_or(false)
    }

    fn get(&self, node_id: NodeId, event: &str, capture: bool) -> Vec<Listener> {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|listener| listener.capture == capture)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct EventState {
    event_type: String,
    target: NodeId,
    current_target: NodeId,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
}

impl EventState {
    fn new(event_type: &str, target: NodeId) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            current_target: target,
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn current_target(&self) -> NodeId {
        self.current_target
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }
}

struct ScheduledTask {
    id: TimerId,
    due_at: i64,
    order: i64,
    callback: TimerCallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    pub due_at: i64,
    pub order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationNavigationKind {
    Assign,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationNavigation {
    pub kind: LocationNavigationKind,
    pub from: String,
    pub to: String,
}

/// A loaded document plus the single-threaded runtime it lives in: listener
/// table, virtual clock with a one-shot timer queue, focus model, and a log
/// of location navigations. All handlers run to completion; the only
/// asynchrony is the timer queue, which tests drain explicitly.
pub struct Page {
    dom: Dom,
    listeners: ListenerStore,
    task_queue: Vec<ScheduledTask>,
    active_element: Option<NodeId>,
    now_ms: i64,
    timer_step_limit: usize,
    next_timer_id: i64,
    next_listener_id: i64,
    next_task_order: i64,
    location_href: String,
    navigations: Vec<LocationNavigation>,
}

impl Page {
    pub fn from_html(html: &str) -> Result<Self> {
        let dom = parse_html(html)?;
        Ok(Self {
            dom,
            listeners: ListenerStore::default(),
            task_queue: Vec::new(),
            active_element: None,
            now_ms: 0,
            timer_step_limit: DEFAULT_TIMER_STEP_LIMIT,
            next_timer_id: 1,
            next_listener_id: 1,
            next_task_order: 0,
            location_href: DEFAULT_LOCATION.to_string(),
            navigations: Vec::new(),
        })
    }

    pub(crate) fn dom(&self) -> &Dom {
        &self.dom
    }

    pub(crate) fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.dom.by_id(id)
    }

    fn node(&self, id: &str) -> Result<NodeId> {
        self.by_id(id)
            .ok_or_else(|| Error::ElementNotFound(id.to_string()))
    }

    // --- listeners and dispatch ---

    pub fn add_listener<F>(
        &mut self,
        node: NodeId,
        event: &str,
        capture: bool,
        callback: F,
    ) -> ListenerId
    where
        F: Fn(&mut Page, &mut EventState) -> Result<()> + 'static,
    {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.add(
            node,
            event.to_string(),
            Listener {
                id,
                capture,
                callback: Rc::new(callback),
            },
        );
        id
    }

    pub fn remove_listener(&mut self, node: NodeId, event: &str, listener_id: ListenerId) -> bool {
        self.listeners.remove(node, event, listener_id)
    }

    pub fn dispatch(&mut self, id: &str, event: &str) -> Result<EventState> {
        let target = self.node(id)?;
        self.dispatch_node(target, event)
    }

    pub fn dispatch_node(&mut self, target: NodeId, event_type: &str) -> Result<EventState> {
        let mut event = EventState::new(event_type, target);

        let mut path = Vec::new();
        let mut cursor = self.dom.parent(target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.dom.parent(node);
        }
        path.reverse();

        // Capture phase.
        for node in &path {
            event.current_target = *node;
            self.invoke_listeners(*node, &mut event, true)?;
            if event.propagation_stopped {
                return Ok(event);
            }
        }

        // Target phase: capture listeners first, then bubble listeners.
        event.current_target = target;
        self.invoke_listeners(target, &mut event, true)?;
        if event.propagation_stopped {
            return Ok(event);
        }
        self.invoke_listeners(target, &mut event, false)?;
        if event.propagation_stopped {
            return Ok(event);
        }

        // Bubble phase.
        for node in path.iter().rev() {
            event.current_target = *node;
            self.invoke_listeners(*node, &mut event, false)?;
            if event.propagation_stopped {
                return Ok(event);
            }
        }

        Ok(event)
    }

    fn invoke_listeners(
        &mut self,
        node_id: NodeId,
        event: &mut EventState,
        capture: bool,
    ) -> Result<()> {
        let listeners = self.listeners.get(node_id, &event.event_type, capture);
        for listener in listeners {
            // The snapshot may be stale: a listener removed earlier in this
            // dispatch must not fire.
            if !self
                .listeners
                .contains(node_id, &event.event_type, listener.id)
            {
                continue;
            }
            (listener.callback)(self, event)?;
            if event.immediate_propagation_stopped {
                break;
            }
        }
        Ok(())
    }

    // --- user gestures ---

    pub fn type_text(&mut self, id: &str, text: &str) -> Result<()> {
        let target = self.node(id)?;
        if self.dom.disabled(target) {
            return Ok(());
        }

        let tag = self
            .dom
            .tag_name(target)
            .ok_or_else(|| Error::TypeMismatch {
                id: id.to_string(),
                expected: "input or textarea".into(),
                actual: "non-element".into(),
            })?
            .to_ascii_lowercase();

        if tag != "input" && tag != "textarea" {
            return Err(Error::TypeMismatch {
                id: id.to_string(),
                expected: "input or textarea".into(),
                actual: tag,
            });
        }

        self.dom.set_value(target, text)?;
        self.dispatch_node(target, "input")?;
        Ok(())
    }

    pub fn click(&mut self, id: &str) -> Result<()> {
        let target = self.node(id)?;
        if self.dom.disabled(target) {
            return Ok(());
        }

        let click_outcome = self.dispatch_node(target, "click")?;
        if click_outcome.default_prevented {
            return Ok(());
        }

        if self.is_submit_control(target) {
            if let Some(form_id) = self.dom.find_ancestor_by_tag(target, "form") {
                self.dispatch_node(form_id, "submit")?;
            }
        }

        Ok(())
    }

    pub fn submit(&mut self, id: &str) -> Result<EventState> {
        let target = self.node(id)?;
        let form = if self
            .dom
            .tag_name(target)
            .map(|t| t.eq_ignore_ascii_case("form"))
            .unwrap_or(false)
        {
            Some(target)
        } else {
            self.dom.find_ancestor_by_tag(target, "form")
        };

        let form = form.ok_or_else(|| Error::TypeMismatch {
            id: id.to_string(),
            expected: "form or form control".into(),
            actual: self.dom.tag_name(target).unwrap_or("non-element").into(),
        })?;
        self.dispatch_node(form, "submit")
    }

    pub fn focus(&mut self, id: &str) -> Result<()> {
        let target = self.node(id)?;
        self.focus_element(target)
    }

    pub fn blur(&mut self, id: &str) -> Result<()> {
        let target = self.node(id)?;
        self.blur_element(target)
    }

    pub fn focus_element(&mut self, node: NodeId) -> Result<()> {
        if self.dom.disabled(node) {
            return Ok(());
        }
        if self.active_element == Some(node) {
            return Ok(());
        }
        if let Some(current) = self.active_element {
            self.blur_element(current)?;
        }
        self.active_element = Some(node);
        self.dispatch_node(node, "focus")?;
        Ok(())
    }

    pub fn blur_element(&mut self, node: NodeId) -> Result<()> {
        if self.active_element != Some(node) {
            return Ok(());
        }
        self.dispatch_node(node, "blur")?;
        self.active_element = None;
        Ok(())
    }

    pub fn focused_id(&self) -> Option<String> {
        self.active_element
            .and_then(|node| self.dom.attr(node, "id"))
    }

    fn is_submit_control(&self, node: NodeId) -> bool {
        let Some(tag) = self.dom.tag_name(node) else {
            return false;
        };
        let kind = self
            .dom
            .attr(node, "type")
            .unwrap_or_default()
            .to_ascii_lowercase();
        match tag.to_ascii_lowercase().as_str() {
            // A button submits unless explicitly typed otherwise.
            "button" => kind.is_empty() || kind == "submit",
            "input" => kind == "submit",
            _ => false,
        }
    }

    // --- virtual clock and timers ---

    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    pub fn set_timer_step_limit(&mut self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::Runtime(
                "set_timer_step_limit requires at least 1 step".into(),
            ));
        }
        self.timer_step_limit = max_steps;
        Ok(())
    }

    pub fn set_timeout<F>(&mut self, delay_ms: i64, callback: F) -> TimerId
    where
        F: Fn(&mut Page) -> Result<()> + 'static,
    {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        let order = self.next_task_order;
        self.next_task_order += 1;
        self.task_queue.push(ScheduledTask {
            id,
            due_at: self.now_ms.saturating_add(delay_ms.max(0)),
            order,
            callback: Rc::new(callback),
        });
        id
    }

    pub fn clear_timeout(&mut self, timer_id: TimerId) -> bool {
        let before = self.task_queue.len();
        self.task_queue.retain(|task| task.id != timer_id);
        before != self.task_queue.len()
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        let mut timers = self
            .task_queue
            .iter()
            .map(|task| PendingTimer {
                id: task.id,
                due_at: task.due_at,
                order: task.order,
            })
            .collect::<Vec<_>>();
        timers.sort_by_key(|timer| (timer.due_at, timer.order));
        timers
    }

    pub fn advance_time(&mut self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::Runtime(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        self.now_ms = self.now_ms.saturating_add(delta_ms);
        self.run_timer_queue(Some(self.now_ms), false)?;
        Ok(())
    }

    pub fn advance_time_to(&mut self, target_ms: i64) -> Result<()> {
        if target_ms < self.now_ms {
            return Err(Error::Runtime(format!(
                "advance_time_to requires target >= now_ms (target={target_ms}, now_ms={})",
                self.now_ms
            )));
        }
        self.now_ms = target_ms;
        self.run_timer_queue(Some(self.now_ms), false)?;
        Ok(())
    }

    pub fn run_due_timers(&mut self) -> Result<usize> {
        self.run_timer_queue(Some(self.now_ms), false)
    }

    pub fn run_next_timer(&mut self) -> Result<bool> {
        let Some(next_idx) = self.next_task_index(None) else {
            return Ok(false);
        };
        let task = self.task_queue.remove(next_idx);
        if task.due_at > self.now_ms {
            self.now_ms = task.due_at;
        }
        self.execute_timer_task(task)?;
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<usize> {
        self.run_timer_queue(None, true)
    }

    fn run_timer_queue(&mut self, due_limit: Option<i64>, advance_clock: bool) -> Result<usize> {
        let mut steps = 0usize;
        while let Some(next_idx) = self.next_task_index(due_limit) {
            steps += 1;
            if steps > self.timer_step_limit {
                return Err(self.timer_step_limit_error(steps, due_limit));
            }
            let task = self.task_queue.remove(next_idx);
            if advance_clock && task.due_at > self.now_ms {
                self.now_ms = task.due_at;
            }
            self.execute_timer_task(task)?;
        }
        Ok(steps)
    }

    fn next_task_index(&self, due_limit: Option<i64>) -> Option<usize> {
        self.task_queue
            .iter()
            .enumerate()
            .filter(|(_, task)| due_limit.map(|limit| task.due_at <= limit).unwrap_or(true))
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)
    }

    fn execute_timer_task(&mut self, task: ScheduledTask) -> Result<()> {
        (task.callback)(self)
    }

    fn timer_step_limit_error(&self, steps: usize, due_limit: Option<i64>) -> Error {
        let due_limit_desc = due_limit
            .map(|value| value.to_string())
            .unwrap_or_else(|| "none".into());
        let next_task_desc = self
            .next_task_index(due_limit)
            .and_then(|idx| self.task_queue.get(idx))
            .map(|task| format!("id={:?},due_at={},order={}", task.id, task.due_at, task.order))
            .unwrap_or_else(|| "none".into());
        Error::Runtime(format!(
            "timer queue exceeded max task steps (possible self-requeueing callback): limit={}, steps={steps}, now_ms={}, due_limit={due_limit_desc}, pending_tasks={}, next_task={next_task_desc}",
            self.timer_step_limit,
            self.now_ms,
            self.task_queue.len()
        ))
    }

    // --- location ---

    pub fn location_href(&self) -> &str {
        &self.location_href
    }

    pub fn set_location_href(&mut self, url: &str) {
        self.location_href = url.to_string();
    }

    pub fn navigate_to(&mut self, url: &str, kind: LocationNavigationKind) {
        let from = std::mem::replace(&mut self.location_href, url.to_string());
        self.navigations.push(LocationNavigation {
            kind,
            from,
            to: url.to_string(),
        });
    }

    pub fn navigations(&self) -> &[LocationNavigation] {
        &self.navigations
    }

    // --- accessors and assertions ---

    pub fn attr(&self, id: &str, name: &str) -> Result<Option<String>> {
        let target = self.node(id)?;
        Ok(self.dom.attr(target, name))
    }

    pub fn text(&self, id: &str) -> Result<String> {
        let target = self.node(id)?;
        Ok(self.dom.text_content(target))
    }

    pub fn value(&self, id: &str) -> Result<String> {
        let target = self.node(id)?;
        self.dom.value(target)
    }

    pub fn has_attr(&self, id: &str, name: &str) -> Result<bool> {
        let target = self.node(id)?;
        Ok(self.dom.has_attr(target, name))
    }

    pub fn has_class(&self, id: &str, class_name: &str) -> Result<bool> {
        let target = self.node(id)?;
        Ok(self.dom.has_class(target, class_name))
    }

    pub fn style(&self, id: &str, property: &str) -> Result<Option<String>> {
        let target = self.node(id)?;
        Ok(self.dom.style_property(target, property))
    }

    pub fn assert_attr(&self, id: &str, name: &str, expected: Option<&str>) -> Result<()> {
        let target = self.node(id)?;
        let actual = self.dom.attr(target, name);
        if actual.as_deref() != expected {
            return Err(Error::AssertionFailed {
                id: id.to_string(),
                expected: format!("{name}={}", expected.unwrap_or("<absent>")),
                actual: actual.unwrap_or_else(|| "<absent>".to_string()),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_text(&self, id: &str, expected: &str) -> Result<()> {
        let target = self.node(id)?;
        let actual = self.dom.text_content(target);
        if actual != expected {
            return Err(Error::AssertionFailed {
                id: id.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_value(&self, id: &str, expected: &str) -> Result<()> {
        let target = self.node(id)?;
        let actual = self.dom.value(target)?;
        if actual != expected {
            return Err(Error::AssertionFailed {
                id: id.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    fn node_snippet(&self, node_id: NodeId) -> String {
        truncate_chars(&self.dom.dump_node(node_id), 200)
    }
}
