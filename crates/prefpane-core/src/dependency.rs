//! Enablement and visibility propagation between parameters and controls.
//!
//! Edges are registered once while a section is built, then evaluated
//! synchronously whenever one of their triggers changes value or state.
//! Cascades follow the trigger -> target graph, which is kept acyclic by
//! rejecting offending edges at registration time.

use crate::parameter::{ListenerId, Parameter};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Effect {
    Enable,
    Disable,
    Show,
    Hide,
}

impl Effect {
    pub fn enabled(enabled: bool) -> Self {
        if enabled { Effect::Enable } else { Effect::Disable }
    }

    pub fn visible(visible: bool) -> Self {
        if visible { Effect::Show } else { Effect::Hide }
    }

    pub fn inverted(self) -> Self {
        match self {
            Effect::Enable => Effect::Disable,
            Effect::Disable => Effect::Enable,
            Effect::Show => Effect::Hide,
            Effect::Hide => Effect::Show,
        }
    }
}

/// UI side of a non-parameter target. The UI layer maps these calls onto
/// its own widgets.
pub trait ControlHandle {
    fn name(&self) -> &str;
    fn set_enabled(&self, enabled: bool);
    fn set_visible(&self, visible: bool);
}

/// Control without a widget behind it; records the state it was given.
#[derive(Debug)]
pub struct HeadlessControl {
    name: String,
    enabled: Cell<bool>,
    visible: Cell<bool>,
}

impl HeadlessControl {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            enabled: Cell::new(true),
            visible: Cell::new(true),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }
}

impl ControlHandle for HeadlessControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }
}

#[derive(Clone)]
pub enum Target {
    Param(Parameter),
    Control(Rc<dyn ControlHandle>),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Param(param) => param.key(),
            Target::Control(control) => control.name(),
        }
    }

    fn apply(&self, effect: Effect) {
        match (self, effect) {
            (Target::Param(param), Effect::Enable | Effect::Disable) => {
                param.set_enabled(effect == Effect::Enable);
            }
            (Target::Param(param), Effect::Show | Effect::Hide) => {
                param.set_visible(effect == Effect::Show);
            }
            (Target::Control(control), Effect::Enable | Effect::Disable) => {
                control.set_enabled(effect == Effect::Enable);
            }
            (Target::Control(control), Effect::Show | Effect::Hide) => {
                control.set_visible(effect == Effect::Show);
            }
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Param(param) => write!(f, "Param({})", param.key()),
            Target::Control(control) => write!(f, "Control({})", control.name()),
        }
    }
}

/// Read access to an edge's triggers, in the order they were added.
pub struct Triggers<'a> {
    params: &'a [Parameter],
}

impl Triggers<'_> {
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn param(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    /// A boolean trigger counts as selected only while it is itself enabled,
    /// which is what makes disabling a master switch cascade.
    pub fn selected(&self, index: usize) -> bool {
        self.params
            .get(index)
            .is_some_and(|param| param.is_enabled() && param.is_selected())
    }

    /// Raw boolean value regardless of the trigger's own enablement.
    pub fn checked(&self, index: usize) -> bool {
        self.params.get(index).is_some_and(Parameter::is_selected)
    }

    pub fn text(&self, index: usize) -> String {
        self.params
            .get(index)
            .map(Parameter::text)
            .unwrap_or_default()
    }

    pub fn all_selected(&self) -> bool {
        (0..self.params.len()).all(|index| self.selected(index))
    }
}

type UniformRule = Box<dyn Fn(&Triggers<'_>) -> Effect>;
type PerTargetRule = Box<dyn Fn(&Triggers<'_>, usize) -> Option<Effect>>;

pub enum Rule {
    /// One effect applied to every target.
    Uniform(UniformRule),
    /// Effect chosen per target index; `None` leaves the target alone.
    PerTarget(PerTargetRule),
}

impl Rule {
    fn reversed(self) -> Self {
        match self {
            Rule::Uniform(rule) => Rule::Uniform(Box::new(move |t| rule(t).inverted())),
            Rule::PerTarget(rule) => {
                Rule::PerTarget(Box::new(move |t, i| rule(t, i).map(Effect::inverted)))
            }
        }
    }
}

pub struct DependencyEdge {
    name: String,
    triggers: Vec<Parameter>,
    targets: Vec<Target>,
    rule: Rule,
}

impl DependencyEdge {
    pub fn new(name: &str, rule: Rule) -> Self {
        Self {
            name: name.to_string(),
            triggers: Vec::new(),
            targets: Vec::new(),
            rule,
        }
    }

    pub fn uniform(name: &str, rule: impl Fn(&Triggers<'_>) -> Effect + 'static) -> Self {
        Self::new(name, Rule::Uniform(Box::new(rule)))
    }

    pub fn per_target(
        name: &str,
        rule: impl Fn(&Triggers<'_>, usize) -> Option<Effect> + 'static,
    ) -> Self {
        Self::new(name, Rule::PerTarget(Box::new(rule)))
    }

    /// Targets are enabled while `trigger` is selected.
    pub fn enable_when_selected(name: &str, trigger: &Parameter) -> Self {
        Self::uniform(name, |t| Effect::enabled(t.selected(0))).trigger(trigger)
    }

    /// Targets are shown while `trigger` is selected.
    pub fn show_when_selected(name: &str, trigger: &Parameter) -> Self {
        Self::uniform(name, |t| Effect::visible(t.selected(0))).trigger(trigger)
    }

    /// Flips every effect the rule produces.
    pub fn reversed(mut self) -> Self {
        self.rule = self.rule.reversed();
        self
    }

    pub fn trigger(mut self, param: &Parameter) -> Self {
        self.triggers.push(param.clone());
        self
    }

    pub fn target(mut self, param: &Parameter) -> Self {
        self.targets.push(Target::Param(param.clone()));
        self
    }

    pub fn targets<'a>(mut self, params: impl IntoIterator<Item = &'a Parameter>) -> Self {
        self.targets
            .extend(params.into_iter().map(|param| Target::Param(param.clone())));
        self
    }

    pub fn control(mut self, control: Rc<dyn ControlHandle>) -> Self {
        self.targets.push(Target::Control(control));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn trigger_keys(&self) -> BTreeSet<String> {
        self.triggers
            .iter()
            .map(|param| param.key().to_string())
            .collect()
    }

    fn param_target_keys(&self) -> BTreeSet<String> {
        self.targets
            .iter()
            .filter_map(|target| match target {
                Target::Param(param) => Some(param.key().to_string()),
                Target::Control(_) => None,
            })
            .collect()
    }

    fn evaluate(&self) {
        let triggers = Triggers {
            params: &self.triggers,
        };
        match &self.rule {
            Rule::Uniform(rule) => {
                let effect = rule(&triggers);
                trace!(edge = %self.name, effect = ?effect, "Applying edge");
                for target in &self.targets {
                    target.apply(effect);
                }
            }
            Rule::PerTarget(rule) => {
                for (index, target) in self.targets.iter().enumerate() {
                    if let Some(effect) = rule(&triggers, index) {
                        trace!(
                            edge = %self.name,
                            target = target.name(),
                            effect = ?effect,
                            "Applying edge"
                        );
                        target.apply(effect);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("edge '{edge}' would create a dependency cycle: '{target}' already drives '{trigger}'")]
pub struct CyclicDependencyError {
    pub edge: String,
    pub trigger: String,
    pub target: String,
}

pub type EdgeId = usize;

struct RegisteredEdge {
    edge: DependencyEdge,
    trigger_keys: BTreeSet<String>,
}

#[derive(Default)]
struct EngineInner {
    edges: RefCell<Vec<Rc<RegisteredEdge>>>,
    graph: RefCell<BTreeMap<String, BTreeSet<String>>>,
    hooks: RefCell<BTreeMap<String, (Parameter, Vec<ListenerId>)>>,
}

#[derive(Clone, Default)]
pub struct DependencyEngine {
    inner: Rc<EngineInner>,
}

impl DependencyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge without evaluating it. Edges that would close a cycle in
    /// the trigger -> target graph are rejected and leave the engine as it
    /// was.
    pub fn register_edge(&self, edge: DependencyEdge) -> Result<EdgeId, CyclicDependencyError> {
        let trigger_keys = edge.trigger_keys();
        let target_keys = edge.param_target_keys();
        {
            let graph = self.inner.graph.borrow();
            for trigger in &trigger_keys {
                for target in &target_keys {
                    if target == trigger || reaches(&graph, target, trigger) {
                        return Err(CyclicDependencyError {
                            edge: edge.name.clone(),
                            trigger: trigger.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
        {
            let mut graph = self.inner.graph.borrow_mut();
            for trigger in &trigger_keys {
                graph
                    .entry(trigger.clone())
                    .or_default()
                    .extend(target_keys.iter().cloned());
            }
        }
        for param in &edge.triggers {
            self.hook(param);
        }
        debug!(
            edge = %edge.name,
            triggers = trigger_keys.len(),
            targets = edge.targets.len(),
            "Dependency edge registered"
        );
        let mut edges = self.inner.edges.borrow_mut();
        edges.push(Rc::new(RegisteredEdge { edge, trigger_keys }));
        Ok(edges.len() - 1)
    }

    /// Evaluates every edge in registration order; used once after a section
    /// is built to establish the initial state.
    pub fn evaluate_all(&self) {
        let edges = self.snapshot(|_| true);
        for registered in edges {
            registered.edge.evaluate();
        }
    }

    /// Re-evaluates, in registration order, every edge triggered by `param`
    /// against the current values of all its triggers.
    pub fn on_trigger_changed(&self, param: &Parameter) {
        let key = param.key();
        let edges = self.snapshot(|registered| registered.trigger_keys.contains(key));
        trace!(key, edges = edges.len(), "Trigger changed");
        for registered in edges {
            registered.edge.evaluate();
        }
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edges.borrow().len()
    }

    /// Removes every listener the engine installed and forgets all edges.
    pub fn teardown(&self) {
        let hooks = std::mem::take(&mut *self.inner.hooks.borrow_mut());
        for (_, (param, ids)) in hooks {
            for id in ids {
                param.remove_listener(id);
            }
        }
        self.inner.edges.borrow_mut().clear();
        self.inner.graph.borrow_mut().clear();
    }

    fn snapshot(&self, filter: impl Fn(&RegisteredEdge) -> bool) -> Vec<Rc<RegisteredEdge>> {
        self.inner
            .edges
            .borrow()
            .iter()
            .filter(|registered| filter(registered))
            .cloned()
            .collect()
    }

    fn hook(&self, param: &Parameter) {
        if self.inner.hooks.borrow().contains_key(param.key()) {
            return;
        }
        let weak: Weak<EngineInner> = Rc::downgrade(&self.inner);
        let on_value = {
            let weak = weak.clone();
            param.add_listener(move |param| {
                if let Some(inner) = weak.upgrade() {
                    DependencyEngine { inner }.on_trigger_changed(param);
                }
            })
        };
        let on_state = param.add_state_listener(move |param, _| {
            if let Some(inner) = weak.upgrade() {
                DependencyEngine { inner }.on_trigger_changed(param);
            }
        });
        self.inner.hooks.borrow_mut().insert(
            param.key().to_string(),
            (param.clone(), vec![on_value, on_state]),
        );
    }
}

fn reaches(graph: &BTreeMap<String, BTreeSet<String>>, from: &str, to: &str) -> bool {
    let mut stack = vec![from];
    let mut visited = BTreeSet::new();
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = graph.get(node) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterSet;
    use crate::store::{ConfigStore, SettingsStore};
    use std::sync::Arc;

    fn params() -> ParameterSet {
        let store: Arc<dyn ConfigStore> = Arc::new(SettingsStore::in_memory());
        ParameterSet::new(store)
    }

    #[test]
    fn registration_does_not_evaluate() {
        let mut set = params();
        let enable = set.boolean("br.backup.auto.enable", false);
        let dir = set.string("br.backup.auto.dir", "");
        let engine = DependencyEngine::new();
        engine
            .register_edge(DependencyEdge::enable_when_selected("auto", &enable).target(&dir))
            .unwrap();
        assert!(dir.is_enabled());
        engine.evaluate_all();
        assert!(!dir.is_enabled());
        enable.set_bool(true).unwrap();
        assert!(dir.is_enabled());
    }

    #[test]
    fn require_and_not_fallback() {
        let mut set = params();
        let require = set.boolean("require", true);
        let fallback = set.boolean("fallback", false);
        let target = set.string("target", "");
        let engine = DependencyEngine::new();
        engine
            .register_edge(
                DependencyEdge::uniform("require-not-fallback", |t| {
                    Effect::enabled(t.checked(0) && !t.checked(1))
                })
                .trigger(&require)
                .trigger(&fallback)
                .target(&target),
            )
            .unwrap();
        engine.evaluate_all();
        assert!(target.is_enabled());

        fallback.set_bool(true).unwrap();
        assert!(!target.is_enabled());

        fallback.set_bool(false).unwrap();
        assert!(target.is_enabled());
        require.set_bool(false).unwrap();
        assert!(!target.is_enabled());
        fallback.set_bool(true).unwrap();
        assert!(!target.is_enabled());
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut set = params();
        let a = set.boolean("a", true);
        let b = set.boolean("b", false);
        let c = set.string("c", "");
        let control = HeadlessControl::new("button");
        let engine = DependencyEngine::new();
        engine
            .register_edge(DependencyEdge::enable_when_selected("a-b", &a).target(&b))
            .unwrap();
        engine
            .register_edge(
                DependencyEdge::show_when_selected("b-c", &b)
                    .target(&c)
                    .control(control.clone()),
            )
            .unwrap();
        engine.evaluate_all();
        let snapshot = (b.is_enabled(), c.is_visible(), control.is_visible());
        let changes = Rc::new(Cell::new(0));
        let changes_in = Rc::clone(&changes);
        c.add_state_listener(move |_, _| changes_in.set(changes_in.get() + 1));
        for _ in 0..3 {
            engine.evaluate_all();
            engine.on_trigger_changed(&a);
        }
        assert_eq!(
            (b.is_enabled(), c.is_visible(), control.is_visible()),
            snapshot
        );
        assert_eq!(changes.get(), 0);
    }

    #[test]
    fn disabling_master_cascades_through_subordinate_trigger() {
        let mut set = params();
        let show_icon = set.boolean("Proxy.SOCKS.ShowIcon", true);
        let flag_incoming = set.boolean("Proxy.SOCKS.ShowIcon.FlagIncoming", true);
        let detail = set.string("detail", "");
        let engine = DependencyEngine::new();
        engine
            .register_edge(
                DependencyEdge::enable_when_selected("icon", &show_icon).target(&flag_incoming),
            )
            .unwrap();
        engine
            .register_edge(
                DependencyEdge::enable_when_selected("incoming", &flag_incoming).target(&detail),
            )
            .unwrap();
        engine.evaluate_all();
        assert!(detail.is_enabled());

        show_icon.set_bool(false).unwrap();
        assert!(!flag_incoming.is_enabled());
        assert!(!detail.is_enabled());

        show_icon.set_bool(true).unwrap();
        assert!(flag_incoming.is_enabled());
        assert!(detail.is_enabled());
    }

    #[test]
    fn last_registered_edge_wins_on_shared_target() {
        let mut set = params();
        let a = set.boolean("a", true);
        let b = set.boolean("b", false);
        let shared = set.string("shared", "");
        let engine = DependencyEngine::new();
        engine
            .register_edge(DependencyEdge::enable_when_selected("from-a", &a).target(&shared))
            .unwrap();
        engine
            .register_edge(DependencyEdge::enable_when_selected("from-b", &b).target(&shared))
            .unwrap();
        engine.evaluate_all();
        assert!(!shared.is_enabled());
    }

    #[test]
    fn reversed_edge_enables_when_unselected() {
        let mut set = params();
        let same = set.boolean("Proxy.Data.Same", true);
        let host = set.string("Proxy.Data.Host", "");
        let engine = DependencyEngine::new();
        engine
            .register_edge(
                DependencyEdge::enable_when_selected("same", &same)
                    .reversed()
                    .target(&host),
            )
            .unwrap();
        engine.evaluate_all();
        assert!(!host.is_enabled());
        same.set_bool(false).unwrap();
        assert!(host.is_enabled());
    }

    #[test]
    fn per_target_rule_handles_asymmetric_effects() {
        let mut set = params();
        let peer = set.boolean("Proxy.Data.Enable", true);
        let same = set.boolean("Proxy.Data.Same", true);
        let host = set.string("Proxy.Data.Host", "");
        let inform = set.boolean("Proxy.Data.SOCKS.inform", false);
        let engine = DependencyEngine::new();
        engine
            .register_edge(
                DependencyEdge::per_target("peer", |t, index| match index {
                    0 => Some(Effect::enabled(t.checked(0) && !t.checked(1))),
                    _ => Some(Effect::enabled(t.checked(0))),
                })
                .trigger(&peer)
                .trigger(&same)
                .target(&host)
                .target(&inform),
            )
            .unwrap();
        engine.evaluate_all();
        assert!(!host.is_enabled());
        assert!(inform.is_enabled());
        same.set_bool(false).unwrap();
        assert!(host.is_enabled());
    }

    #[test]
    fn diamond_is_accepted() {
        let mut set = params();
        let a = set.boolean("a", true);
        let b = set.boolean("b", true);
        let c = set.boolean("c", true);
        let d = set.string("d", "");
        let engine = DependencyEngine::new();
        engine
            .register_edge(DependencyEdge::enable_when_selected("ab", &a).target(&b))
            .unwrap();
        engine
            .register_edge(DependencyEdge::enable_when_selected("ac", &a).target(&c))
            .unwrap();
        engine
            .register_edge(DependencyEdge::enable_when_selected("bd", &b).target(&d))
            .unwrap();
        engine
            .register_edge(DependencyEdge::enable_when_selected("cd", &c).target(&d))
            .unwrap();
        engine.evaluate_all();
        a.set_bool(false).unwrap();
        assert!(!d.is_enabled());
    }

    #[test]
    fn self_loop_is_rejected() {
        let mut set = params();
        let a = set.boolean("a", true);
        let engine = DependencyEngine::new();
        let err = engine
            .register_edge(DependencyEdge::enable_when_selected("loop", &a).target(&a))
            .unwrap_err();
        assert_eq!(err.trigger, "a");
        assert_eq!(err.target, "a");
        assert_eq!(engine.edge_count(), 0);
    }

    #[test]
    fn transitive_cycle_is_rejected_and_engine_unchanged() {
        let mut set = params();
        let a = set.boolean("a", true);
        let b = set.boolean("b", true);
        let c = set.boolean("c", true);
        let engine = DependencyEngine::new();
        engine
            .register_edge(DependencyEdge::enable_when_selected("ab", &a).target(&b))
            .unwrap();
        engine
            .register_edge(DependencyEdge::enable_when_selected("bc", &b).target(&c))
            .unwrap();
        let err = engine
            .register_edge(DependencyEdge::enable_when_selected("ca", &c).target(&a))
            .unwrap_err();
        assert_eq!(err.edge, "ca");
        assert_eq!(engine.edge_count(), 2);

        // The rejected edge left no listener behind on its trigger.
        a.set_bool(false).unwrap();
        assert!(!c.is_enabled());
        assert!(a.is_enabled());
    }

    #[test]
    fn teardown_removes_listeners() {
        let mut set = params();
        let a = set.boolean("a", true);
        let b = set.string("b", "");
        let engine = DependencyEngine::new();
        engine
            .register_edge(DependencyEdge::enable_when_selected("ab", &a).target(&b))
            .unwrap();
        assert_eq!(a.listener_count(), 2);
        engine.teardown();
        assert_eq!(a.listener_count(), 0);
        a.set_bool(false).unwrap();
        assert!(b.is_enabled());
    }
}
