use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::correlation::correlation_model::{
    ApiCall, CallLink, CorrelatedSession, CorrelationConfig, CorrelationGap, CorrelationStats,
    CorrelationStrategy, GapKind, ObservedTransition,
};
use crate::correlation::strategy::{CallLinker, CallObservation, Link, SessionLinker, UiObservation};
use crate::event::event_model::{Event, EventPayload, Session};
use crate::locator::locator_model::ElementAttributes;
use crate::model::app_model::{Element, Screen};
use crate::model::identity::{
    element_id, element_signature, is_partial_view, normalize_api_path, screen_fingerprint,
};

/// Time spent on one screen between two screen changes.
#[derive(Debug, Default)]
struct Visit {
    label: Option<String>,
    /// Keyed by element signature
    elements: BTreeMap<String, ElementAttributes>,
    has_hierarchy: bool,
}

impl Visit {
    fn labelled(label: Option<&str>) -> Self {
        Self {
            label: label.map(str::to_string),
            ..Self::default()
        }
    }

    fn observe(&mut self, attrs: &ElementAttributes) -> String {
        let signature = element_signature(attrs);
        match self.elements.get_mut(&signature) {
            Some(existing) => {
                existing.fill_gaps(attrs);
            }
            None => {
                self.elements.insert(signature.clone(), attrs.clone());
            }
        }
        signature
    }

    fn signatures(&self) -> BTreeSet<String> {
        self.elements.keys().cloned().collect()
    }
}

struct PendingTransition {
    from_visit: usize,
    to_visit: usize,
    trigger_ui: usize,
    timestamp_ms: u64,
}

struct PendingCall<'e> {
    event: &'e Event,
    visit: usize,
    link: Option<Link>,
}

/// State of one correlation pass. Lives only for the duration of `correlate`.
struct Pass<'e> {
    config: &'e CorrelationConfig,
    linker: SessionLinker,
    visits: Vec<Visit>,
    current: Option<usize>,
    ui_history: Vec<UiObservation>,
    /// UI events since the last screen change (candidate triggers)
    pending_triggers: Vec<usize>,
    transitions: Vec<PendingTransition>,
    calls: Vec<PendingCall<'e>>,
    stats: CorrelationStats,
}

/// Correlate one session in a single ordered pass.
pub fn correlate(session: &Session, config: &CorrelationConfig) -> CorrelatedSession {
    let mut ordered: Vec<&Event> = session.events.iter().collect();
    ordered.sort_by_key(|e| e.order_key());

    let mut pass = Pass {
        config,
        linker: SessionLinker::new(config),
        visits: Vec::new(),
        current: None,
        ui_history: Vec::new(),
        pending_triggers: Vec::new(),
        transitions: Vec::new(),
        calls: Vec::new(),
        stats: CorrelationStats::default(),
    };

    for &event in &ordered {
        pass.step(event);
    }

    let result = pass.finish(&session.session_id, ordered.is_empty());
    info!(
        session_id = %result.session_id,
        strategy = %result.strategy,
        screens = result.stats.screens,
        transitions = result.stats.transitions,
        linked_calls = result.stats.linked_calls,
        orphaned_calls = result.stats.orphaned_calls,
        "correlation pass finished"
    );
    result
}

impl<'e> Pass<'e> {
    fn step(&mut self, event: &'e Event) {
        match &event.payload {
            EventPayload::Ui {
                action,
                element,
                thread_id,
                screen,
            } => {
                self.stats.ui_events += 1;
                let visit = self.ensure_visit(screen.as_deref());
                let signature = self.visits[visit].observe(element);
                self.ui_history.push(UiObservation {
                    seq: event.seq,
                    timestamp_ms: event.timestamp_ms,
                    thread_id: thread_id.clone(),
                    tag: event.correlation_tag.clone(),
                    visit,
                    signature,
                    action: action.clone(),
                });
                self.pending_triggers.push(self.ui_history.len() - 1);
            }
            EventPayload::Hierarchy { screen, nodes } => {
                self.stats.hierarchy_events += 1;
                let visit = self.ensure_visit(screen.as_deref());
                let v = &mut self.visits[visit];
                v.has_hierarchy = true;
                for node in nodes {
                    v.observe(node);
                }
            }
            EventPayload::Network { thread_id, .. } => {
                self.stats.api_calls += 1;
                let visit = self.ensure_visit(None);
                let observation = CallObservation {
                    timestamp_ms: event.timestamp_ms,
                    thread_id: thread_id.as_deref(),
                    tag: event.correlation_tag.as_deref(),
                };
                let link = self.linker.link(&observation, &self.ui_history);
                self.calls.push(PendingCall { event, visit, link });
            }
            EventPayload::Navigation {
                from_screen,
                to_screen,
                thread_id,
            } => {
                self.stats.navigation_events += 1;
                self.navigate(event, from_screen.as_deref(), to_screen, thread_id.as_deref());
            }
        }
    }

    /// Current visit, creating an implicit one for events seen before the
    /// first navigation. Labels the visit if it has none yet.
    fn ensure_visit(&mut self, label: Option<&str>) -> usize {
        let index = match self.current {
            Some(i) => i,
            None => {
                self.visits.push(Visit::labelled(None));
                let i = self.visits.len() - 1;
                self.current = Some(i);
                i
            }
        };
        let visit = &mut self.visits[index];
        if visit.label.is_none() {
            visit.label = label.map(str::to_string);
        }
        index
    }

    fn navigate(&mut self, event: &Event, from: Option<&str>, to: &str, thread: Option<&str>) {
        if let Some(cur) = self.current {
            if self.visits[cur].label.as_deref() == Some(to) {
                debug!(screen = to, "navigation to current screen ignored");
                return;
            }
        }

        let from_visit = match (self.current, from) {
            (Some(cur), _) => {
                if self.visits[cur].label.is_none() {
                    self.visits[cur].label = from.map(str::to_string);
                }
                Some(cur)
            }
            (None, Some(label)) => Some(self.ensure_visit(Some(label))),
            (None, None) => None,
        };

        self.visits.push(Visit::labelled(Some(to)));
        let to_visit = self.visits.len() - 1;
        self.current = Some(to_visit);

        if let Some(from_visit) = from_visit {
            if let Some(trigger_ui) = self.pick_trigger(event, from_visit, thread) {
                self.transitions.push(PendingTransition {
                    from_visit,
                    to_visit,
                    trigger_ui,
                    timestamp_ms: event.timestamp_ms,
                });
            }
        }
        self.pending_triggers.clear();
    }

    /// Closest pending UI event on the screen being left, inside the
    /// transition window. A matching tag (or thread, under the thread
    /// strategy) narrows the candidates first.
    fn pick_trigger(&self, nav: &Event, from_visit: usize, thread: Option<&str>) -> Option<usize> {
        let window = self.config.transition_window_ms;
        let candidates: Vec<usize> = self
            .pending_triggers
            .iter()
            .copied()
            .filter(|&i| {
                let ui = &self.ui_history[i];
                ui.visit == from_visit && nav.timestamp_ms.saturating_sub(ui.timestamp_ms) <= window
            })
            .collect();

        let closest = |set: &[usize]| {
            set.iter()
                .copied()
                .max_by_key(|&i| (self.ui_history[i].timestamp_ms, self.ui_history[i].seq))
        };

        if let Some(tag) = nav.correlation_tag.as_deref() {
            let tagged: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&i| self.ui_history[i].tag.as_deref() == Some(tag))
                .collect();
            if let Some(i) = closest(&tagged) {
                return Some(i);
            }
        }
        if self.config.strategy == CorrelationStrategy::Thread {
            if let Some(thread) = thread {
                let same_thread: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&i| self.ui_history[i].thread_id.as_deref() == Some(thread))
                    .collect();
                if let Some(i) = closest(&same_thread) {
                    return Some(i);
                }
            }
        }
        closest(&candidates)
    }

    fn finish(mut self, session_id: &str, empty: bool) -> CorrelatedSession {
        if self.visits.is_empty() {
            self.visits.push(Visit::labelled(None));
        }

        let fingerprints = self.visit_fingerprints();

        // Screens
        let mut screens: BTreeMap<String, Screen> = BTreeMap::new();
        for (visit, fp) in self.visits.iter().zip(&fingerprints) {
            let screen = screens
                .entry(fp.clone())
                .or_insert_with(|| Screen::new(fp));
            screen.visits += 1;
            if let Some(label) = &visit.label {
                screen.labels.insert(label.clone());
            }
            for (signature, attrs) in &visit.elements {
                match screen.elements.get_mut(signature) {
                    Some(existing) => {
                        existing.absorb(attrs);
                    }
                    None => {
                        let element = Element::new(
                            element_id(fp, signature),
                            signature.clone(),
                            attrs.clone(),
                        );
                        screen.elements.insert(signature.clone(), element);
                    }
                }
            }
        }

        // Calls are already in event order.
        let mut api_calls: Vec<ApiCall> = self
            .calls
            .iter()
            .map(|pending| self.build_call(session_id, pending, &fingerprints))
            .collect();

        // Transitions
        let mut transitions = Vec::with_capacity(self.transitions.len());
        for (n, pending) in self.transitions.iter().enumerate() {
            let ui = &self.ui_history[pending.trigger_ui];
            let from = &fingerprints[pending.from_visit];
            let to = &fingerprints[pending.to_visit];
            let transition_id = format!("{}:t{}", session_id, n);

            let mut correlated_calls = Vec::new();
            for (call, draft) in api_calls.iter_mut().zip(&self.calls) {
                if draft.link.is_some_and(|l| l.ui_index == pending.trigger_ui) {
                    call.transition_id = Some(transition_id.clone());
                    correlated_calls.push(call.call_id.clone());
                }
            }

            if let Some(screen) = screens.get_mut(to) {
                screen.entered_from.insert(transition_id.clone());
            }
            transitions.push(ObservedTransition {
                transition_id,
                from_screen: from.clone(),
                to_screen: to.clone(),
                trigger_element: element_id(from, &ui.signature),
                trigger_action: ui.action.clone(),
                timestamp_ms: pending.timestamp_ms,
                correlated_calls,
            });
        }

        let mut gaps = Vec::new();
        if empty {
            gaps.push(CorrelationGap {
                kind: GapKind::EmptySession,
                message: "session has no events; produced one empty screen".to_string(),
            });
        } else if self.stats.navigation_events == 0 {
            gaps.push(CorrelationGap {
                kind: GapKind::NoNavigation,
                message: "no navigation events; all observations folded into one screen"
                    .to_string(),
            });
        } else if transitions.is_empty() {
            gaps.push(CorrelationGap {
                kind: GapKind::NoTriggers,
                message: "navigations observed but none followed a UI action".to_string(),
            });
        }
        for gap in &gaps {
            warn!(session_id, kind = ?gap.kind, "{}", gap.message);
        }

        let mut stats = self.stats;
        stats.linked_calls = api_calls.iter().filter(|c| !c.is_orphan()).count();
        stats.orphaned_calls = api_calls.len() - stats.linked_calls;
        stats.screens = screens.len();
        stats.transitions = transitions.len();

        CorrelatedSession {
            session_id: session_id.to_string(),
            strategy: self.config.strategy,
            screens,
            transitions,
            api_calls,
            gaps,
            stats,
        }
    }

    /// Fingerprint per visit. Partial views collapse into the fuller
    /// observation of the same screen: a visit without a hierarchy dump whose
    /// elements are a subset of a dumped visit with a compatible label, or an
    /// element-less visit sharing a label with one that has elements.
    fn visit_fingerprints(&self) -> Vec<String> {
        let signatures: Vec<BTreeSet<String>> = self.visits.iter().map(Visit::signatures).collect();
        let raw: Vec<String> = self
            .visits
            .iter()
            .zip(&signatures)
            .map(|(v, s)| screen_fingerprint(s, v.label.as_deref()))
            .collect();

        let labels_compatible = |a: &Visit, b: &Visit| match (&a.label, &b.label) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        };

        self.visits
            .iter()
            .enumerate()
            .map(|(i, visit)| {
                if visit.has_hierarchy {
                    return raw[i].clone();
                }
                let fuller = self.visits.iter().enumerate().find(|(j, other)| {
                    if *j == i {
                        return false;
                    }
                    if signatures[i].is_empty() {
                        visit.label.is_some() && other.label == visit.label && !signatures[*j].is_empty()
                    } else {
                        other.has_hierarchy
                            && labels_compatible(visit, *other)
                            && is_partial_view(&signatures[i], &signatures[*j])
                    }
                });
                match fuller {
                    Some((j, _)) => raw[j].clone(),
                    None => raw[i].clone(),
                }
            })
            .collect()
    }

    fn build_call(&self, session_id: &str, pending: &PendingCall<'_>, fps: &[String]) -> ApiCall {
        let event = pending.event;
        let (method, url, request_shape, response_code, duration_ms) = match &event.payload {
            EventPayload::Network {
                method,
                url,
                request_shape,
                response_code,
                duration_ms,
                ..
            } => (
                method.to_uppercase(),
                url.clone(),
                request_shape.clone(),
                *response_code,
                *duration_ms,
            ),
            _ => (String::new(), String::new(), None, None, None),
        };

        let link = pending.link.map(|l| {
            let ui = &self.ui_history[l.ui_index];
            CallLink {
                method: l.method,
                confidence: l.confidence,
                ui_seq: ui.seq,
                element_id: element_id(&fps[ui.visit], &ui.signature),
            }
        });

        ApiCall {
            call_id: format!("{}:{}", session_id, event.seq),
            session_id: session_id.to_string(),
            method,
            path: normalize_api_path(&url),
            url,
            request_shape,
            response_code,
            correlation_tag: event.correlation_tag.clone(),
            duration_ms,
            timestamp_ms: event.timestamp_ms,
            screen_id: fps[pending.visit].clone(),
            link,
            transition_id: None,
        }
    }
}

/// Correlate many sessions on a bounded pool. Results keep input order.
pub async fn correlate_sessions(
    sessions: Vec<Session>,
    config: &CorrelationConfig,
    workers: usize,
) -> Vec<CorrelatedSession> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::with_capacity(sessions.len());

    for session in sessions {
        let semaphore = semaphore.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            tokio::task::spawn_blocking(move || correlate(&session, &config))
                .await
                .ok()
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(Some(result)) => results.push(result),
            Ok(None) | Err(_) => warn!("correlation worker failed; session dropped"),
        }
    }
    results
}
