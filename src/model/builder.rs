use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::correlation::correlation_model::{ApiCall, CorrelatedSession};
use crate::locator::locator_model::{ElementAttributes, Locator, Strategy};
use crate::locator::normalize::text_fingerprint;
use crate::model::app_model::{AppModel, Element, ElementSource, Endpoint, MergeReport, Screen, Transition};
use crate::model::hints::{ElementHint, RouteHint, StaticHints};
use crate::model::identity::{
    element_id, element_signature, endpoint_key, is_partial_view, normalize_api_path, route_matches,
};

/// Incrementally merges correlated sessions and static hints into an
/// `AppModel`. Screens are deduplicated by structural fingerprint.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    model: AppModel,
    report: MergeReport,
}

/// Build a fresh model.
pub fn build(correlated: &[CorrelatedSession], hints: &StaticHints) -> AppModel {
    build_incremental(None, correlated, hints).0
}

/// Merge into `existing` (or a fresh model) and report what changed.
pub fn build_incremental(
    existing: Option<AppModel>,
    correlated: &[CorrelatedSession],
    hints: &StaticHints,
) -> (AppModel, MergeReport) {
    let mut builder = match existing {
        Some(model) => ModelBuilder::from_model(model),
        None => ModelBuilder::new(),
    };
    for session in correlated {
        builder.merge_session(session);
    }
    builder.apply_hints(hints);
    builder.finish()
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_model(model: AppModel) -> Self {
        Self {
            model,
            report: MergeReport::default(),
        }
    }

    pub fn model(&self) -> &AppModel {
        &self.model
    }

    pub fn finish(self) -> (AppModel, MergeReport) {
        info!(
            screens = self.model.screens.len(),
            elements = self.model.element_count(),
            transitions = self.model.transitions.len(),
            endpoints = self.model.endpoints.len(),
            screens_added = self.report.screens_added,
            "app model built"
        );
        (self.model, self.report)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Merge one correlated session. A session already merged is skipped.
    pub fn merge_session(&mut self, session: &CorrelatedSession) {
        if self.model.sessions.contains(&session.session_id) {
            debug!(session_id = %session.session_id, "session already merged; skipping");
            return;
        }

        // Incoming fingerprint -> model screen id, and incoming element id -> model element id.
        let mut screen_map: BTreeMap<String, String> = BTreeMap::new();
        let mut element_map: BTreeMap<String, String> = BTreeMap::new();

        for (fp, incoming) in &session.screens {
            let target = self.resolve_screen(fp, incoming);
            self.merge_screen(&target, incoming, &mut element_map);
            screen_map.insert(fp.clone(), target);
        }

        let calls: BTreeMap<&str, &ApiCall> = session
            .api_calls
            .iter()
            .map(|c| (c.call_id.as_str(), c))
            .collect();

        for observed in &session.transitions {
            let (Some(from), Some(to)) = (
                screen_map.get(&observed.from_screen),
                screen_map.get(&observed.to_screen),
            ) else {
                continue;
            };
            let trigger = element_map
                .get(&observed.trigger_element)
                .cloned()
                .unwrap_or_else(|| observed.trigger_element.clone());
            let endpoint_keys: Vec<String> = observed
                .correlated_calls
                .iter()
                .filter_map(|id| calls.get(id.as_str()))
                .map(|c| self.endpoint_key_for(&c.method, &c.path))
                .collect();

            let transition_id = transition_key(from, to, &trigger);
            if !self.model.transitions.contains_key(&transition_id) {
                self.report.transitions_added += 1;
            }
            let transition = self
                .model
                .transitions
                .entry(transition_id.clone())
                .or_insert_with(|| Transition {
                    transition_id: transition_id.clone(),
                    from_screen: from.clone(),
                    to_screen: to.clone(),
                    trigger_element: trigger.clone(),
                    trigger_action: Some(observed.trigger_action.clone()),
                    correlated_calls: Default::default(),
                    occurrences: 0,
                });
            transition.occurrences += 1;
            transition.correlated_calls.extend(endpoint_keys);

            if let Some(screen) = self.model.screens.get_mut(to) {
                screen.entered_from.insert(transition_id);
            }
        }

        for call in &session.api_calls {
            let screen = screen_map.get(&call.screen_id);
            let trigger = call
                .link
                .as_ref()
                .map(|l| element_map.get(&l.element_id).cloned().unwrap_or_else(|| l.element_id.clone()));
            self.record_call(call, trigger, screen.is_some());
        }

        self.model.sessions.insert(session.session_id.clone());
    }

    /// Model screen id for an incoming screen: same fingerprint, or an
    /// existing screen this one is a partial view of. Otherwise a new screen.
    fn resolve_screen(&mut self, fp: &str, incoming: &Screen) -> String {
        if self.model.screens.contains_key(fp) {
            self.report.screens_merged += 1;
            return fp.to_string();
        }

        let signatures = incoming.signatures();
        let fuller = self.model.screens.values().find(|existing| {
            let labels_ok = incoming.labels.is_empty()
                || existing.labels.is_empty()
                || !incoming.labels.is_disjoint(&existing.labels);
            labels_ok && is_partial_view(&signatures, &existing.signatures())
        });
        if let Some(existing) = fuller {
            self.report.screens_merged += 1;
            return existing.screen_id.clone();
        }

        self.report.screens_added += 1;
        self.model
            .screens
            .insert(fp.to_string(), Screen::new(fp));
        fp.to_string()
    }

    fn merge_screen(
        &mut self,
        target: &str,
        incoming: &Screen,
        element_map: &mut BTreeMap<String, String>,
    ) {
        let Some(screen) = self.model.screens.get_mut(target) else {
            return;
        };
        screen.labels.extend(incoming.labels.iter().cloned());
        screen.visits += incoming.visits;

        for (signature, element) in &incoming.elements {
            match screen.elements.get_mut(signature) {
                Some(existing) => {
                    let before = existing.locators.len();
                    self.report.attributes_filled += existing.absorb(&element.attributes);
                    for locator in element.locators.iter().filter(|l| !l.is_sentinel()) {
                        if !existing.locators.contains(locator.strategy, &locator.value) {
                            existing.locators.insert(locator.clone());
                        }
                    }
                    self.report.locators_added += existing.locators.len().saturating_sub(before);
                    element_map.insert(element.element_id.clone(), existing.element_id.clone());
                }
                None => {
                    let mut copy = element.clone();
                    copy.element_id = element_id(target, signature);
                    element_map.insert(element.element_id.clone(), copy.element_id.clone());
                    screen.elements.insert(signature.clone(), copy);
                    self.report.elements_added += 1;
                }
            }
        }
    }

    fn record_call(&mut self, call: &ApiCall, trigger: Option<String>, on_known_screen: bool) {
        let key = self.endpoint_key_for(&call.method, &call.path);
        if !self.model.endpoints.contains_key(&key) {
            self.report.endpoints_added += 1;
        }
        let endpoint = self
            .model
            .endpoints
            .entry(key)
            .or_insert_with(|| Endpoint::new(&call.method, &call.path));
        endpoint.call_count += 1;
        if call.is_orphan() || !on_known_screen {
            endpoint.orphaned_calls += 1;
        }
        endpoint.observed_paths.insert(call.path.clone());
        endpoint.sessions.insert(call.session_id.clone());
        if let Some(code) = call.response_code {
            endpoint.response_codes.insert(code);
        }
        if let Some(trigger) = trigger {
            endpoint.triggered_by.insert(trigger);
        }
        if endpoint.request_shape.is_none() {
            endpoint.request_shape = call.request_shape.clone();
        }
    }

    /// Declared template endpoints absorb matching concrete paths.
    fn endpoint_key_for(&self, method: &str, path: &str) -> String {
        let method = method.to_uppercase();
        self.model
            .endpoints
            .values()
            .find(|e| e.declared && e.method == method && route_matches(&e.path, path))
            .map(|e| e.key.clone())
            .unwrap_or_else(|| endpoint_key(&method, path))
    }

    // ========================================================================
    // Static hints
    // ========================================================================

    /// Fill gaps from declared elements and routes. Observed attributes are
    /// never overwritten.
    pub fn apply_hints(&mut self, hints: &StaticHints) {
        for screen_hint in &hints.screens {
            let Some(screen_id) = self
                .model
                .screen_by_label(&screen_hint.name)
                .map(|s| s.screen_id.clone())
            else {
                debug!(screen = %screen_hint.name, "hint names no observed screen");
                self.report.hints_unmatched += 1;
                continue;
            };
            for hint in &screen_hint.elements {
                self.apply_element_hint(&screen_id, hint);
            }
        }
        for route in &hints.api_endpoints {
            self.apply_route_hint(route);
        }
    }

    fn apply_element_hint(&mut self, screen_id: &str, hint: &ElementHint) {
        let Some(screen) = self.model.screens.get_mut(screen_id) else {
            return;
        };

        let matched = screen
            .elements
            .iter()
            .find(|(_, e)| same_element(&e.attributes, &hint.attributes))
            .map(|(sig, _)| sig.clone())
            .or_else(|| {
                let sig = element_signature(&hint.attributes);
                screen.elements.contains_key(&sig).then_some(sig)
            });

        let element = match matched {
            Some(signature) => match screen.elements.get_mut(&signature) {
                Some(element) => {
                    self.report.attributes_filled += element.absorb(&hint.attributes);
                    element
                }
                None => return,
            },
            None => {
                let signature = element_signature(&hint.attributes);
                let mut element = Element::new(
                    element_id(screen_id, &signature),
                    signature.clone(),
                    hint.attributes.clone(),
                );
                element.source = ElementSource::Declared;
                self.report.elements_added += 1;
                screen.elements.entry(signature).or_insert(element)
            }
        };

        for declared in &hint.locators {
            let Ok(strategy) = declared.strategy.parse::<Strategy>() else {
                debug!(strategy = %declared.strategy, "ignoring declared locator with unknown strategy");
                continue;
            };
            if declared.value.trim().is_empty()
                || element.locators.contains(strategy, declared.value.trim())
            {
                continue;
            }
            let filled = with_value(&element.attributes, strategy, declared.value.trim());
            if let Some(locator) = Locator::scored(strategy, &filled) {
                element.locators.insert(locator);
                self.report.locators_added += 1;
            }
        }
    }

    fn apply_route_hint(&mut self, route: &RouteHint) {
        let method = route.method.to_uppercase();
        let template = normalize_api_path(&route.path);
        let key = endpoint_key(&method, &template);

        // Fold observed concrete endpoints into the declared template.
        let matching: Vec<String> = self
            .model
            .endpoints
            .values()
            .filter(|e| e.key != key && e.method == method && route_matches(&template, &e.path))
            .map(|e| e.key.clone())
            .collect();

        if !self.model.endpoints.contains_key(&key) {
            self.report.endpoints_added += 1;
        }
        let mut declared = self
            .model
            .endpoints
            .remove(&key)
            .unwrap_or_else(|| Endpoint::new(&method, &template));
        declared.declared = true;
        if declared.request_shape.is_none() {
            declared.request_shape = route.request_shape.clone();
        }

        for old_key in &matching {
            if let Some(observed) = self.model.endpoints.remove(old_key) {
                declared.observed_paths.extend(observed.observed_paths);
                declared.response_codes.extend(observed.response_codes);
                declared.call_count += observed.call_count;
                declared.orphaned_calls += observed.orphaned_calls;
                declared.sessions.extend(observed.sessions);
                declared.triggered_by.extend(observed.triggered_by);
                if declared.request_shape.is_none() {
                    declared.request_shape = observed.request_shape;
                }
            }
            for transition in self.model.transitions.values_mut() {
                if transition.correlated_calls.remove(old_key) {
                    transition.correlated_calls.insert(key.clone());
                }
            }
        }
        self.model.endpoints.insert(key, declared);
    }
}

fn transition_key(from: &str, to: &str, trigger: &str) -> String {
    text_fingerprint(&format!("{}|{}|{}", from, to, trigger))[..16].to_string()
}

/// A hint describes an observed element when a strong identifier agrees.
fn same_element(observed: &ElementAttributes, hint: &ElementAttributes) -> bool {
    let eq = |a: &Option<String>, b: &Option<String>| match (a.as_deref(), b.as_deref()) {
        (Some(x), Some(y)) => !x.trim().is_empty() && x.trim() == y.trim(),
        _ => false,
    };
    eq(&observed.stable_id, &hint.stable_id) || eq(&observed.accessibility_id, &hint.accessibility_id)
}

/// Attributes with the value a declared locator uses, for scoring it.
fn with_value(attrs: &ElementAttributes, strategy: Strategy, value: &str) -> ElementAttributes {
    let mut filled = attrs.clone();
    let slot = match strategy {
        Strategy::StableId => &mut filled.stable_id,
        Strategy::AccessibilityId => &mut filled.accessibility_id,
        Strategy::StructuralPath => &mut filled.path,
        Strategy::Text => &mut filled.text,
    };
    *slot = Some(value.to_string());
    filled
}
