use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::Result;
use crate::engine::ReadyState;
use crate::error::Error;

/// Callback invoked with the ready state at the moment the event fired.
pub type Listener = Arc<dyn Fn(ReadyState) + Send + Sync>;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Event {
    LoadStart,
    ReadyStateChange,
    Load,
    Error,
    Abort,
    LoadEnd,
}

impl Event {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Event::LoadStart => "loadstart",
            Event::ReadyStateChange => "readystatechange",
            Event::Load => "load",
            Event::Error => "error",
            Event::Abort => "abort",
            Event::LoadEnd => "loadend",
        }
    }

    pub fn parse(value: &str) -> Result<Event> {
        match value.trim().to_ascii_lowercase().as_str() {
            "loadstart" => Ok(Event::LoadStart),
            "readystatechange" => Ok(Event::ReadyStateChange),
            "load" => Ok(Event::Load),
            "error" => Ok(Event::Error),
            "abort" => Ok(Event::Abort),
            "loadend" => Ok(Event::LoadEnd),
            other => Err(Error::validation(format!("unknown event `{other}`"))),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Event::parse(s)
    }
}

/// Per-request listener table: one optional handler slot per event plus an
/// ordered list of registered listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    handlers: HashMap<Event, Listener>,
    registered: HashMap<Event, Vec<Listener>>,
}

impl Listeners {
    pub(crate) fn set_handler(&mut self, event: Event, handler: Option<Listener>) {
        match handler {
            Some(handler) => {
                self.handlers.insert(event, handler);
            }
            None => {
                self.handlers.remove(&event);
            }
        }
    }

    pub(crate) fn add(&mut self, event: Event, listener: Listener) {
        self.registered.entry(event).or_default().push(listener);
    }

    pub(crate) fn remove(&mut self, event: Event, listener: &Listener) -> bool {
        let Some(listeners) = self.registered.get_mut(&event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|candidate| !Arc::ptr_eq(candidate, listener));
        listeners.len() != before
    }

    /// Handler slot first, then registered listeners in registration order.
    ///
    /// Cloned out so callbacks run without the table locked.
    pub(crate) fn snapshot(&self, event: Event) -> Vec<Listener> {
        self.handlers
            .get(&event)
            .into_iter()
            .chain(self.registered.get(&event).into_iter().flatten())
            .cloned()
            .collect()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field(
                "registered",
                &self
                    .registered
                    .iter()
                    .map(|(event, listeners)| (event, listeners.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn parses_event_names() {
        assert_eq!(Event::parse("readystatechange").unwrap(), Event::ReadyStateChange);
        assert_eq!("LoadEnd".parse::<Event>().unwrap(), Event::LoadEnd);
        assert!(Event::parse("progress").is_err());
        assert_eq!(Event::Abort.to_string(), "abort");
    }

    #[test]
    fn snapshot_runs_handler_then_listeners_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::default();

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            listeners.add(
                Event::ReadyStateChange,
                Arc::new(move |_| seen.lock().unwrap().push(tag)),
            );
        }
        let handler_seen = Arc::clone(&seen);
        listeners.set_handler(
            Event::ReadyStateChange,
            Some(Arc::new(move |_| handler_seen.lock().unwrap().push("handler"))),
        );

        for listener in listeners.snapshot(Event::ReadyStateChange) {
            listener(ReadyState::Opened);
        }

        assert_eq!(*seen.lock().unwrap(), vec!["handler", "first", "second"]);
        assert!(listeners.snapshot(Event::Load).is_empty());
    }

    #[test]
    fn remove_matches_by_identity() {
        let mut listeners = Listeners::default();
        let kept: Listener = Arc::new(|_| {});
        let dropped: Listener = Arc::new(|_| {});
        listeners.add(Event::Load, Arc::clone(&kept));
        listeners.add(Event::Load, Arc::clone(&dropped));

        assert!(listeners.remove(Event::Load, &dropped));
        assert!(!listeners.remove(Event::Load, &dropped));
        assert!(!listeners.remove(Event::Error, &kept));

        let remaining = listeners.snapshot(Event::Load);
        assert_eq!(remaining.len(), 1);
        assert!(Arc::ptr_eq(&remaining[0], &kept));
    }
}
