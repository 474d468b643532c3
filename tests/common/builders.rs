use screen_healing::event::event_model::{Event, EventPayload, Session};
use screen_healing::healing::failure_analyzer::{FailureRecord, LocatorRef, SourceLocation};
use screen_healing::healing::snapshot::{PageSnapshot, SnapshotNode};
use screen_healing::locator::locator_model::{ElementAttributes, Strategy};

// ============================================================================
// Element attributes
// ============================================================================

pub fn attrs_with_id(id: &str) -> ElementAttributes {
    ElementAttributes {
        stable_id: Some(id.to_string()),
        class_name: Some("android.widget.Button".to_string()),
        ..ElementAttributes::default()
    }
}

pub fn attrs_with_a11y(a11y: &str) -> ElementAttributes {
    ElementAttributes {
        accessibility_id: Some(a11y.to_string()),
        ..ElementAttributes::default()
    }
}

pub fn attrs_with_text(text: &str) -> ElementAttributes {
    ElementAttributes {
        text: Some(text.to_string()),
        class_name: Some("android.widget.TextView".to_string()),
        ..ElementAttributes::default()
    }
}

// ============================================================================
// Events
// ============================================================================

fn event(session: &str, ts: u64, payload: EventPayload) -> Event {
    Event {
        session_id: session.to_string(),
        timestamp_ms: ts,
        seq: 0,
        correlation_tag: None,
        payload,
    }
}

pub fn tap(session: &str, ts: u64, screen: &str, element: ElementAttributes) -> Event {
    event(
        session,
        ts,
        EventPayload::Ui {
            action: "tap".to_string(),
            element,
            thread_id: None,
            screen: Some(screen.to_string()),
        },
    )
}

pub fn navigate(session: &str, ts: u64, from: &str, to: &str) -> Event {
    event(
        session,
        ts,
        EventPayload::Navigation {
            from_screen: Some(from.to_string()),
            to_screen: to.to_string(),
            thread_id: None,
        },
    )
}

pub fn call(session: &str, ts: u64, method: &str, url: &str) -> Event {
    event(
        session,
        ts,
        EventPayload::Network {
            method: method.to_string(),
            url: url.to_string(),
            request_shape: None,
            response_code: Some(200),
            duration_ms: Some(80),
            thread_id: None,
        },
    )
}

pub fn hierarchy(session: &str, ts: u64, screen: &str, nodes: Vec<ElementAttributes>) -> Event {
    event(
        session,
        ts,
        EventPayload::Hierarchy {
            screen: Some(screen.to_string()),
            nodes,
        },
    )
}

pub fn tagged(mut event: Event, tag: &str) -> Event {
    event.correlation_tag = Some(tag.to_string());
    event
}

pub fn on_thread(mut event: Event, thread: &str) -> Event {
    match &mut event.payload {
        EventPayload::Ui { thread_id, .. }
        | EventPayload::Navigation { thread_id, .. }
        | EventPayload::Network { thread_id, .. } => *thread_id = Some(thread.to_string()),
        EventPayload::Hierarchy { .. } => {}
    }
    event
}

/// Tap the login button at t=0, call the login API at 500ms, land on Home at 600ms.
pub fn login_session(id: &str) -> Session {
    Session::from_events(
        id,
        vec![
            tap(id, 0, "Login", attrs_with_id("login_btn")),
            call(id, 500, "POST", "https://api.example.com/v1/login?retry=0"),
            navigate(id, 600, "Login", "Home"),
        ],
    )
}

// ============================================================================
// Healing inputs
// ============================================================================

pub fn locator(strategy: Strategy, value: &str) -> LocatorRef {
    LocatorRef {
        strategy,
        value: value.to_string(),
    }
}

pub fn failure(test_id: &str, failing: LocatorRef, file: &str, line: u32, snapshot: &str) -> FailureRecord {
    FailureRecord::new(
        test_id,
        failing,
        Some(SourceLocation {
            file: file.into(),
            line,
        }),
        Some(snapshot.to_string()),
        "NoSuchElementError: element not found",
    )
}

pub fn snapshot(reference: &str, nodes: Vec<ElementAttributes>) -> PageSnapshot {
    let children = nodes
        .into_iter()
        .map(|attributes| SnapshotNode {
            attributes,
            children: Vec::new(),
        })
        .collect();
    PageSnapshot::from_nodes(
        reference,
        vec![SnapshotNode {
            attributes: ElementAttributes {
                class_name: Some("android.widget.FrameLayout".to_string()),
                ..ElementAttributes::default()
            },
            children,
        }],
    )
}
