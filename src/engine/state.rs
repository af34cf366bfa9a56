use serde::{Deserialize, Serialize};

/// Lifecycle of a request object.
///
/// Advances forward through one exchange; `abort` is the only way back to
/// [`ReadyState::Unsent`].
#[non_exhaustive]
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ReadyState {
    #[default]
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl ReadyState {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// An exchange has been dispatched and has not reached `Done`.
    #[must_use]
    pub(crate) const fn in_flight(self, send_flag: bool) -> bool {
        match self {
            ReadyState::Opened => send_flag,
            ReadyState::HeadersReceived | ReadyState::Loading => true,
            ReadyState::Unsent | ReadyState::Done => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_lifecycle() {
        assert!(ReadyState::Unsent < ReadyState::Opened);
        assert!(ReadyState::Opened < ReadyState::HeadersReceived);
        assert!(ReadyState::HeadersReceived < ReadyState::Loading);
        assert!(ReadyState::Loading < ReadyState::Done);
        assert_eq!(ReadyState::Done.as_u8(), 4);
    }

    #[test]
    fn opened_is_in_flight_only_after_send() {
        assert!(!ReadyState::Opened.in_flight(false));
        assert!(ReadyState::Opened.in_flight(true));
        assert!(ReadyState::Loading.in_flight(false));
        assert!(!ReadyState::Done.in_flight(true));
        assert!(!ReadyState::Unsent.in_flight(true));
    }
}
