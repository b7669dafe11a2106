//! Readiness aggregation.
//!
//! Upload admission is the conjunction of independently evolving
//! subsystems. Each reports a [`ReadinessComponent`]; the aggregator keeps
//! them in insertion order so the *first* failing one can be surfaced as a
//! single actionable reason.

use std::fmt;

/// A subsystem whose state gates upload admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Remote endpoint reachability and capability.
    Remote,
    /// Local file selection and digest.
    File,
    /// Transfer state.
    Upload,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Remote => "remote",
            Component::File => "file",
            Component::Upload => "upload",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last reported state of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessComponent {
    pub name: Component,
    pub ready: bool,
    pub reason: String,
}

impl ReadinessComponent {
    pub fn new(name: Component, ready: bool, reason: impl Into<String>) -> Self {
        Self {
            name,
            ready,
            reason: reason.into(),
        }
    }
}

/// Change of overall readiness, as delivered to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessChange {
    /// Every tracked component is ready.
    Ready,
    /// `component` is the first (in insertion order) that is not ready.
    NotReady { component: Component, reason: String },
}

impl ReadinessChange {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessChange::Ready)
    }

    pub fn component(&self) -> Option<Component> {
        match self {
            ReadinessChange::Ready => None,
            ReadinessChange::NotReady { component, .. } => Some(*component),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ReadinessChange::Ready => None,
            ReadinessChange::NotReady { reason, .. } => Some(reason),
        }
    }
}

/// Tracks readiness components and derives overall readiness.
#[derive(Debug, Default)]
pub struct ReadinessAggregator {
    components: Vec<ReadinessComponent>,
    ready: bool,
    last_notified: Option<ReadinessChange>,
}

impl ReadinessAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or overwrites `name` and recomputes overall readiness.
    ///
    /// Returns the change to notify, if any. Nothing is returned when the
    /// aggregate (overall state plus first failing component and reason) is
    /// the same as the last notification.
    pub fn update(
        &mut self,
        name: Component,
        ready: bool,
        reason: impl Into<String>,
    ) -> Option<ReadinessChange> {
        self.apply(ReadinessComponent::new(name, ready, reason))
    }

    /// [`update`](Self::update) taking a prepared record.
    pub fn apply(&mut self, component: ReadinessComponent) -> Option<ReadinessChange> {
        match self.components.iter_mut().find(|c| c.name == component.name) {
            Some(existing) => *existing = component,
            None => self.components.push(component),
        }

        let change = match self.components.iter().find(|c| !c.ready) {
            Some(failing) => {
                self.ready = false;
                ReadinessChange::NotReady {
                    component: failing.name,
                    reason: failing.reason.clone(),
                }
            }
            None => {
                if self.ready {
                    return None;
                }
                self.ready = true;
                ReadinessChange::Ready
            }
        };

        if self.last_notified.as_ref() == Some(&change) {
            return None;
        }
        self.last_notified = Some(change.clone());
        Some(change)
    }

    /// Overall readiness: true iff every tracked component is ready.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// All components in insertion order.
    pub fn components(&self) -> &[ReadinessComponent] {
        &self.components
    }

    pub fn component(&self, name: Component) -> Option<&ReadinessComponent> {
        self.components.iter().find(|c| c.name == name)
    }
}
