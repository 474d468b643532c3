use screen_healing::correlation::correlation_model::{CorrelatedSession, CorrelationConfig};
use screen_healing::correlation::correlator::correlate;
use screen_healing::event::event_model::Session;
use screen_healing::locator::locator_model::Strategy;
use screen_healing::model::app_model::{AppModel, ElementSource};
use screen_healing::model::builder::{build, build_incremental};
use screen_healing::model::hints::{StaticHints, load_hints};
use screen_healing::model::identity::{normalize_api_path, route_matches};

use crate::common::builders::{attrs_with_a11y, attrs_with_id, call, hierarchy, login_session, navigate, tap};

mod common;

const HINTS: &str = r#"
screens:
  - name: Login
    elements:
      - accessibility_id: login_btn_a11y
        stable_id: login_btn
        locators:
          - strategy: xpath
            value: "//android.widget.Button[@resource-id='login_btn']"
      - stable_id: forgot_password
        text: Forgot password?
  - name: Nowhere
    elements:
      - stable_id: ghost
routes:
  - method: get
    path: /users/{id}
"#;

fn correlated(sessions: &[Session]) -> Vec<CorrelatedSession> {
    sessions
        .iter()
        .map(|s| correlate(s, &CorrelationConfig::default()))
        .collect()
}

// =========================================================================
// Build
// =========================================================================

#[test]
fn build_merges_screens_transitions_and_endpoints() {
    let model = build(&correlated(&[login_session("s1")]), &StaticHints::default());

    assert_eq!(model.screen_count(), 2);
    assert_eq!(model.transitions.len(), 1);
    let transition = model.transitions.values().next().unwrap();
    assert_eq!(transition.occurrences, 1);
    assert!(transition.correlated_calls.contains("POST /v1/login"));

    let endpoint = &model.endpoints["POST /v1/login"];
    assert_eq!(endpoint.call_count, 1);
    assert_eq!(endpoint.orphaned_calls, 0);
    assert!(endpoint.triggered_by.contains(&transition.trigger_element));
    assert!(model.sessions.contains("s1"));
}

#[test]
fn repeated_sessions_reuse_screens() {
    let sessions = [login_session("s1"), login_session("s2")];
    let (model, report) = build_incremental(None, &correlated(&sessions), &StaticHints::default());

    assert_eq!(model.screen_count(), 2, "Same fingerprints merge");
    assert_eq!(report.screens_added, 2);
    assert_eq!(report.screens_merged, 2);
    assert_eq!(model.transitions.len(), 1);
    assert_eq!(model.transitions.values().next().unwrap().occurrences, 2);
    assert_eq!(model.endpoints["POST /v1/login"].sessions.len(), 2);
}

#[test]
fn rebuilding_with_same_sessions_adds_nothing() {
    let input = correlated(&[login_session("s1")]);
    let (first, _) = build_incremental(None, &input, &StaticHints::default());
    let (second, report) = build_incremental(Some(first.clone()), &input, &StaticHints::default());

    assert_eq!(second, first, "Idempotent");
    assert_eq!(report.screens_added, 0);
    assert_eq!(report.transitions_added, 0);
    assert_eq!(report.endpoints_added, 0);
}

#[test]
fn later_session_with_partial_view_merges_into_existing_screen() {
    let full = Session::from_events(
        "s1",
        vec![
            navigate("s1", 0, "Splash", "Home"),
            hierarchy("s1", 10, "Home", vec![attrs_with_id("feed"), attrs_with_id("profile")]),
        ],
    );
    let partial = Session::from_events("s2", vec![tap("s2", 0, "Home", attrs_with_id("feed"))]);

    let (first, _) = build_incremental(None, &correlated(&[full]), &StaticHints::default());
    let home_id = first.screen_by_label("Home").unwrap().screen_id.clone();
    let (model, report) = build_incremental(Some(first), &correlated(&[partial]), &StaticHints::default());

    assert_eq!(report.screens_added, 0);
    assert_eq!(model.screen_by_label("Home").unwrap().screen_id, home_id);
    assert_eq!(model.screens[&home_id].elements.len(), 2);
}

#[test]
fn model_round_trips_through_json() {
    let model = build(&correlated(&[login_session("s1")]), &StaticHints::default());
    let json = model.to_json().unwrap();
    assert_eq!(AppModel::from_json(&json).unwrap(), model);
    assert!(model.to_yaml().unwrap().contains("screens:"));
}

#[test]
fn loaded_model_with_tampered_locators_merges_sorted() {
    let dump = |id: &str| {
        Session::from_events(
            id,
            vec![
                navigate(id, 0, "Splash", "Home"),
                hierarchy(id, 10, "Home", vec![attrs_with_id("feed"), attrs_with_id("profile")]),
            ],
        )
    };
    let model = build(&correlated(&[dump("s1")]), &StaticHints::default());

    let mut value: serde_json::Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();
    let mut emptied = false;
    for screen in value["screens"].as_object_mut().unwrap().values_mut() {
        for element in screen["elements"].as_object_mut().unwrap().values_mut() {
            let locators = element["locators"].as_array_mut().unwrap();
            if emptied {
                locators.reverse();
            } else {
                locators.clear();
                emptied = true;
            }
        }
    }
    assert!(emptied);

    let loaded = AppModel::from_json(&value.to_string()).unwrap();
    let (merged, _) = build_incremental(Some(loaded), &correlated(&[dump("s2")]), &StaticHints::default());

    for element in merged.screens.values().flat_map(|s| s.elements.values()) {
        assert!(!element.locators.is_empty());
        let scores: Vec<f64> = element.locators.iter().map(|l| l.stability_score).collect();
        assert!(
            scores.windows(2).all(|w| w[0] >= w[1]),
            "Locators of {} out of order: {:?}",
            element.element_id,
            scores
        );
        assert_eq!(element.locators.primary().strategy, Strategy::StableId);
    }
}

// =========================================================================
// Static hints
// =========================================================================

#[test]
fn hints_fill_gaps_without_overwriting() {
    let session = Session::from_events(
        "s1",
        vec![
            tap("s1", 0, "Login", attrs_with_a11y("login_btn_a11y")),
            navigate("s1", 100, "Login", "Home"),
        ],
    );
    let hints = StaticHints::parse(HINTS, "hints.yaml").unwrap();
    let (model, report) = build_incremental(None, &correlated(&[session]), &hints);

    let login = model.screen_by_label("Login").unwrap();
    let button = login
        .elements
        .values()
        .find(|e| e.attributes.accessibility_id.as_deref() == Some("login_btn_a11y"))
        .unwrap();
    assert_eq!(button.attributes.stable_id.as_deref(), Some("login_btn"), "Gap filled");
    assert_eq!(button.locators.primary().strategy, Strategy::StableId, "Re-ranked");
    assert!(
        button
            .locators
            .contains(Strategy::StructuralPath, "//android.widget.Button[@resource-id='login_btn']"),
        "Declared locator added"
    );
    assert_eq!(button.source, ElementSource::Observed);

    let forgot = login
        .elements
        .values()
        .find(|e| e.attributes.stable_id.as_deref() == Some("forgot_password"))
        .expect("declared element added");
    assert_eq!(forgot.source, ElementSource::Declared);

    assert_eq!(report.hints_unmatched, 1, "Nowhere matches no screen");
    assert!(report.attributes_filled >= 1);
    assert!(model.element_count() >= 2);
}

#[test]
fn route_templates_absorb_concrete_paths() {
    let session = Session::from_events(
        "s1",
        vec![
            tap("s1", 0, "Profile", attrs_with_id("refresh")),
            call("s1", 100, "GET", "https://api.example.com/users/42"),
            call("s1", 200, "GET", "https://api.example.com/users/77?full=1"),
        ],
    );
    let hints = StaticHints::parse(HINTS, "hints.yaml").unwrap();
    let model = build(&correlated(&[session]), &hints);

    assert!(!model.endpoints.contains_key("GET /users/42"));
    let users = &model.endpoints["GET /users/{id}"];
    assert!(users.declared);
    assert_eq!(users.call_count, 2);
    assert!(users.observed_paths.contains("/users/42"));
    assert!(users.observed_paths.contains("/users/77"));
}

#[test]
fn missing_hints_file_is_empty_hints() {
    let dir = tempfile::tempdir().unwrap();
    let hints = load_hints(Some(&dir.path().join("absent.yaml"))).unwrap();
    assert!(hints.is_empty());
    assert!(load_hints(None).unwrap().is_empty());
    assert!(StaticHints::parse("screens: [1, 2", "bad.yaml").is_err());
}

#[test]
fn api_path_helpers() {
    assert_eq!(normalize_api_path("https://h.example.com/a/b/?q=1#x"), "/a/b");
    assert_eq!(normalize_api_path("https://h.example.com"), "/");
    assert_eq!(normalize_api_path("v1/items"), "/v1/items");
    assert!(route_matches("/users/{id}/orders", "/users/9/orders"));
    assert!(!route_matches("/users/{id}", "/users/9/orders"));
    assert!(!route_matches("/users/{id}", "/accounts/9"));
}
