//! Explicitly passed exchange context.
//!
//! A [`Context`] carries the collaborators the exchange core reports to: the
//! timer registry that receives one named section per logical operation, and
//! the base [`CommTag`]s used for token and move traffic. It is built
//! once by the caller and handed to builders; nothing here is process-global.

use std::sync::Arc;

use crate::algs::communicator::CommTag;

/// Collaborator receiving named timed sections.
///
/// The core only reports section boundaries; measuring is the
/// implementation's business.
pub trait TimerRegistry: Send + Sync {
    fn enter(&self, section: &str);
    fn exit(&self, section: &str);
}

/// Registry that drops every report.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTimers;

impl TimerRegistry for NoTimers {
    fn enter(&self, _section: &str) {}
    fn exit(&self, _section: &str) {}
}

/// Registry forwarding section boundaries to `log` at trace level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTimers;

impl TimerRegistry for LogTimers {
    fn enter(&self, section: &str) {
        log::trace!("enter {section}");
    }
    fn exit(&self, section: &str) {
        log::trace!("exit {section}");
    }
}

/// RAII guard: reports `enter` on creation and `exit` on drop.
pub struct TimedSection<'a> {
    timers: &'a dyn TimerRegistry,
    name: &'a str,
}

impl<'a> TimedSection<'a> {
    pub fn new(timers: &'a dyn TimerRegistry, name: &'a str) -> Self {
        timers.enter(name);
        Self { timers, name }
    }
}

impl Drop for TimedSection<'_> {
    fn drop(&mut self) {
        self.timers.exit(self.name);
    }
}

/// Base tags for the message families of the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExchangeTags {
    /// Token get/put data traffic.
    pub token: CommTag,
    /// Move traffic.
    pub move_data: CommTag,
}

impl Default for ExchangeTags {
    fn default() -> Self {
        Self {
            token: CommTag::new(0xBEE0),
            move_data: CommTag::new(0xBEF0),
        }
    }
}

/// Explicitly constructed exchange context.
#[derive(Clone)]
pub struct Context {
    timers: Arc<dyn TimerRegistry>,
    tags: ExchangeTags,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(NoTimers))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("tags", &self.tags).finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(timers: Arc<dyn TimerRegistry>) -> Self {
        Self {
            timers,
            tags: ExchangeTags::default(),
        }
    }

    pub fn with_tags(mut self, tags: ExchangeTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn tags(&self) -> ExchangeTags {
        self.tags
    }

    pub fn timers(&self) -> &dyn TimerRegistry {
        self.timers.as_ref()
    }

    /// Open a named timed section reported to this context's registry.
    pub fn section<'a>(&'a self, name: &'a str) -> TimedSection<'a> {
        TimedSection::new(self.timers(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl TimerRegistry for Recorder {
        fn enter(&self, section: &str) {
            self.0.lock().push(format!("+{section}"));
        }
        fn exit(&self, section: &str) {
            self.0.lock().push(format!("-{section}"));
        }
    }

    #[test]
    fn section_reports_enter_and_exit() {
        let rec = Arc::new(Recorder::default());
        let ctx = Context::new(rec.clone());
        {
            let _s = ctx.section("token_get");
        }
        assert_eq!(*rec.0.lock(), vec!["+token_get", "-token_get"]);
    }

    #[test]
    fn tags_serialize() {
        let tags = ExchangeTags::default();
        let json = serde_json::to_string(&tags).unwrap();
        let back: ExchangeTags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tags);
    }
}
