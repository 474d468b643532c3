use crate::correlation::correlation_model::{CorrelationConfig, CorrelationStrategy, LinkMethod};

/// A UI event as seen by the linkers.
#[derive(Debug, Clone)]
pub struct UiObservation {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub thread_id: Option<String>,
    pub tag: Option<String>,
    /// Index of the screen visit the event happened on
    pub visit: usize,
    pub signature: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy)]
pub struct CallObservation<'a> {
    pub timestamp_ms: u64,
    pub thread_id: Option<&'a str>,
    pub tag: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    /// Index into the UI history slice
    pub ui_index: usize,
    pub method: LinkMethod,
    pub confidence: f64,
}

/// Picks the UI event (if any) that caused a call. `history` holds every UI
/// event that precedes the call, oldest first.
pub trait CallLinker: Send + Sync {
    fn link(&self, call: &CallObservation<'_>, history: &[UiObservation]) -> Option<Link>;
}

pub struct TagLinker;

impl CallLinker for TagLinker {
    fn link(&self, call: &CallObservation<'_>, history: &[UiObservation]) -> Option<Link> {
        let tag = call.tag?;
        history
            .iter()
            .rposition(|ui| ui.tag.as_deref() == Some(tag))
            .map(|ui_index| Link {
                ui_index,
                method: LinkMethod::Tag,
                confidence: 1.0,
            })
    }
}

pub struct ThreadLinker;

const THREAD_CONFIDENCE: f64 = 0.7;

impl CallLinker for ThreadLinker {
    fn link(&self, call: &CallObservation<'_>, history: &[UiObservation]) -> Option<Link> {
        let thread = call.thread_id?;
        history
            .iter()
            .rposition(|ui| ui.thread_id.as_deref() == Some(thread))
            .map(|ui_index| Link {
                ui_index,
                method: LinkMethod::Thread,
                confidence: THREAD_CONFIDENCE,
            })
    }
}

pub struct TemporalLinker {
    pub window_ms: u64,
}

impl CallLinker for TemporalLinker {
    fn link(&self, call: &CallObservation<'_>, history: &[UiObservation]) -> Option<Link> {
        // History is time-ordered, so the last event inside the window has the
        // smallest elapsed time.
        let (ui_index, ui) = history.iter().enumerate().next_back()?;
        let elapsed = call.timestamp_ms.saturating_sub(ui.timestamp_ms);
        if elapsed > self.window_ms {
            return None;
        }
        let confidence = if self.window_ms == 0 {
            1.0
        } else {
            1.0 - elapsed as f64 / self.window_ms as f64
        };
        Some(Link {
            ui_index,
            method: LinkMethod::Temporal,
            confidence: (confidence * 100.0).round() / 100.0,
        })
    }
}

/// Tag matching first, then the session's configured strategy.
pub struct SessionLinker {
    tag: TagLinker,
    fallback: Option<Box<dyn CallLinker>>,
}

impl SessionLinker {
    pub fn new(config: &CorrelationConfig) -> Self {
        let fallback: Option<Box<dyn CallLinker>> = match config.strategy {
            CorrelationStrategy::Temporal => Some(Box::new(TemporalLinker {
                window_ms: config.window_ms,
            })),
            CorrelationStrategy::Thread => Some(Box::new(ThreadLinker)),
            CorrelationStrategy::Tag => None,
        };
        Self {
            tag: TagLinker,
            fallback,
        }
    }
}

impl CallLinker for SessionLinker {
    fn link(&self, call: &CallObservation<'_>, history: &[UiObservation]) -> Option<Link> {
        self.tag
            .link(call, history)
            .or_else(|| self.fallback.as_ref().and_then(|f| f.link(call, history)))
    }
}
