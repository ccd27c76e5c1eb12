//! Peer connection lifecycle
//!
//! Signaling and agent events are applied through pure transition
//! functions; the session task is the only caller and publishes the result.

use ice::AgentEvent;

use crate::errors::PeerConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeerConnectionState {
    #[default]
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    /// Negotiation is complete; connectivity checks may start
    Stable,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Signaling input of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    LocalOffer,
    RemoteOffer,
    LocalAnswer,
    RemoteAnswer,
    RemoteCandidates,
}

impl Signal {
    fn action(&self) -> &'static str {
        match self {
            Signal::LocalOffer => "create an offer",
            Signal::RemoteOffer => "accept a remote offer",
            Signal::LocalAnswer => "create an answer",
            Signal::RemoteAnswer => "accept a remote answer",
            Signal::RemoteCandidates => "add remote candidates",
        }
    }
}

impl PeerConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::HaveLocalOffer => "have-local-offer",
            PeerConnectionState::HaveRemoteOffer => "have-remote-offer",
            PeerConnectionState::Stable => "stable",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        }
    }

    /// `failed` and `closed` accept no further signaling.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerConnectionState::Failed | PeerConnectionState::Closed)
    }

    /// Negotiation finished, so the agent may run checks.
    pub fn is_negotiated(&self) -> bool {
        matches!(
            self,
            PeerConnectionState::Stable
                | PeerConnectionState::Connecting
                | PeerConnectionState::Connected
                | PeerConnectionState::Disconnected
        )
    }

    /// State after `signal`.
    ///
    /// # Returns
    /// * `Ok(state)` - The signal is allowed; `state` may equal `self`
    /// * `Err(PeerConnectionError::InvalidTransition)` - Rejected, nothing changes
    pub fn on_signal(self, signal: Signal) -> Result<Self, PeerConnectionError> {
        use PeerConnectionState::*;

        let next = match (self, signal) {
            (New, Signal::LocalOffer) => Some(HaveLocalOffer),
            (New, Signal::RemoteOffer) => Some(HaveRemoteOffer),
            (HaveRemoteOffer, Signal::LocalAnswer) => Some(Stable),
            (HaveLocalOffer, Signal::RemoteAnswer) => Some(Stable),
            (state, Signal::RemoteCandidates) if state != New && !state.is_terminal() => Some(state),
            _ => None,
        };
        next.ok_or_else(|| PeerConnectionError::invalid_transition(self, signal.action()))
    }

    /// State after an agent event, or `None` when the event does not move it.
    pub fn on_agent_event(self, event: &AgentEvent) -> Option<Self> {
        use PeerConnectionState::*;

        match (self, event) {
            (Stable, AgentEvent::Checking) => Some(Connecting),
            (Stable | Connecting | Disconnected, AgentEvent::Selected(_)) => Some(Connected),
            (Connected, AgentEvent::LivenessLost) => Some(Disconnected),
            (Disconnected, AgentEvent::Recovered(_)) => Some(Connected),
            (state, AgentEvent::Failed) if !state.is_terminal() => Some(Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::PeerConnectionState::*;
    use super::*;

    const ALL: [PeerConnectionState; 9] = [
        New,
        HaveLocalOffer,
        HaveRemoteOffer,
        Stable,
        Connecting,
        Connected,
        Disconnected,
        Failed,
        Closed,
    ];

    #[test]
    fn test_offer_then_answer_reaches_stable() {
        let state = New.on_signal(Signal::RemoteOffer).unwrap();
        assert_eq!(state, HaveRemoteOffer);
        assert_eq!(state.on_signal(Signal::LocalAnswer).unwrap(), Stable);

        let state = New.on_signal(Signal::LocalOffer).unwrap();
        assert_eq!(state, HaveLocalOffer);
        assert_eq!(state.on_signal(Signal::RemoteAnswer).unwrap(), Stable);
    }

    #[test]
    fn test_one_side_never_reaches_stable() {
        for state in ALL {
            for signal in [Signal::LocalOffer, Signal::RemoteOffer, Signal::RemoteCandidates] {
                assert_ne!(state.on_signal(signal).ok(), Some(Stable), "{state} {signal:?}");
            }
        }
        assert!(New.on_signal(Signal::LocalAnswer).is_err());
        assert!(New.on_signal(Signal::RemoteAnswer).is_err());
        assert!(HaveLocalOffer.on_signal(Signal::LocalAnswer).is_err());
        assert!(HaveRemoteOffer.on_signal(Signal::RemoteAnswer).is_err());
    }

    #[test]
    fn test_offers_only_accepted_in_new() {
        for state in ALL.into_iter().filter(|s| *s != New) {
            let err = state.on_signal(Signal::RemoteOffer).unwrap_err();
            assert!(matches!(
                err,
                PeerConnectionError::InvalidTransition { state: s, .. } if s == state
            ));
            assert!(state.on_signal(Signal::LocalOffer).is_err());
        }
    }

    #[test]
    fn test_candidates_need_a_description() {
        assert!(New.on_signal(Signal::RemoteCandidates).is_err());
        assert!(Failed.on_signal(Signal::RemoteCandidates).is_err());
        assert!(Closed.on_signal(Signal::RemoteCandidates).is_err());
        for state in [HaveLocalOffer, HaveRemoteOffer, Stable, Connecting, Connected, Disconnected] {
            assert_eq!(state.on_signal(Signal::RemoteCandidates).unwrap(), state);
        }
    }

    #[test]
    fn test_agent_events_drive_connectivity() {
        assert_eq!(Stable.on_agent_event(&AgentEvent::Checking), Some(Connecting));
        assert_eq!(Connecting.on_agent_event(&AgentEvent::Selected(0)), Some(Connected));
        assert_eq!(Connected.on_agent_event(&AgentEvent::Selected(1)), None);
        assert_eq!(Connected.on_agent_event(&AgentEvent::LivenessLost), Some(Disconnected));
        assert_eq!(Disconnected.on_agent_event(&AgentEvent::Recovered(1)), Some(Connected));
        assert_eq!(Disconnected.on_agent_event(&AgentEvent::Failed), Some(Failed));
        assert_eq!(Connecting.on_agent_event(&AgentEvent::Failed), Some(Failed));
    }

    #[test]
    fn test_terminal_states_ignore_agent_events() {
        for state in [Failed, Closed] {
            assert!(state.is_terminal());
            assert_eq!(state.on_agent_event(&AgentEvent::Failed), None);
            assert_eq!(state.on_agent_event(&AgentEvent::Selected(0)), None);
        }
    }

    #[test]
    fn test_display_is_kebab_case() {
        assert_eq!(HaveRemoteOffer.to_string(), "have-remote-offer");
        assert_eq!(Disconnected.as_str(), "disconnected");
    }
}
