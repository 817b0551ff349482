use sr_music_types::LinkState;

/// What the session actor must do in response to a connectivity event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Absorb the event.
    Ignore,
    /// Start broadcasting and announce the connection.
    Connect,
    /// Stop broadcasting, disconnect every client, then announce.
    Teardown { message: String },
    /// Announce a disconnect that happened before the session connected.
    Report { message: String },
}

/// Session-wide link state owned by the actor.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    link: LinkState,
    disconnect_reported: bool,
}

impl SessionState {
    pub(crate) fn link(&self) -> LinkState {
        self.link
    }

    /// Decide the transition for one event.
    ///
    /// `all_connected` is only consulted for `connected == true` events.
    pub(crate) fn on_connection_event(
        &self,
        connected: bool,
        message: &str,
        quit_requested: bool,
        all_connected: impl FnOnce() -> bool,
    ) -> Transition {
        if connected {
            if self.link != LinkState::Connected && all_connected() {
                return Transition::Connect;
            }
            return Transition::Ignore;
        }

        if quit_requested {
            return Transition::Ignore;
        }
        match self.link {
            LinkState::Connected => Transition::Teardown {
                message: message.to_string(),
            },
            _ if !self.disconnect_reported => Transition::Report {
                message: message.to_string(),
            },
            _ => Transition::Ignore,
        }
    }

    pub(crate) fn mark_connected(&mut self) {
        self.link = LinkState::Connected;
        self.disconnect_reported = false;
    }

    pub(crate) fn mark_disconnecting(&mut self) {
        self.link = LinkState::Disconnecting;
        self.disconnect_reported = true;
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.link = LinkState::Disconnected;
    }

    pub(crate) fn mark_reported(&mut self) {
        self.disconnect_reported = true;
    }

    /// Collapse to `Disconnected` after a failed transition.
    pub(crate) fn force_disconnected(&mut self) {
        self.link = LinkState::Disconnected;
        self.disconnect_reported = true;
    }
}
