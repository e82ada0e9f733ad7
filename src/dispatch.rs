use crate::{transport::Transport, types::Command};

/// Last command handed to the transport, `None` until the first send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchState {
    pub last: Option<Command>,
}

/// Last-value suppression.
///
/// Returns the next state and whether `command` has to be sent. The state
/// advances as soon as a send is required, before its outcome is known.
pub fn dispatch(command: Option<Command>, state: DispatchState) -> (DispatchState, bool) {
    match command {
        Some(command) if state.last != Some(command) => (
            DispatchState {
                last: Some(command),
            },
            true,
        ),
        _ => (state, false),
    }
}

pub struct CommandDispatcher<T> {
    state: DispatchState,
    transport: T,
}

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            state: DispatchState::default(),
            transport,
        }
    }

    /// Sends `command` if it differs from the last one and returns it.
    ///
    /// Transport failures are logged and swallowed; a failed command still
    /// becomes the last command and is not retried.
    pub fn dispatch(&mut self, command: Option<Command>) -> Option<Command> {
        let (state, send_required) = dispatch(command, self.state);
        self.state = state;

        let command = command.filter(|_| send_required)?;
        match self.transport.send(command) {
            Ok(()) => log::info!("sent: {command}"),
            Err(err) => log::warn!("couldn't send command {command}: {err}"),
        }
        Some(command)
    }

    pub fn last(&self) -> Option<Command> {
        self.state.last
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::RecordingTransport;
    use super::*;
    use crate::transport::{TransportError, WebSocketTransport};

    #[test]
    fn absent_command_never_changes_state() {
        for last in std::iter::once(None).chain(Command::ALL.into_iter().map(Some)) {
            let state = DispatchState { last };
            assert_eq!(dispatch(None, state), (state, false));
        }
    }

    #[test]
    fn dispatch_sends_exactly_on_change() {
        let options = std::iter::once(None).chain(Command::ALL.into_iter().map(Some));
        for last in options.clone() {
            for command in options.clone() {
                let state = DispatchState { last };
                let expected = match command {
                    Some(c) if last != Some(c) => (DispatchState { last: command }, true),
                    _ => (state, false),
                };
                assert_eq!(
                    dispatch(command, state),
                    expected,
                    "last {last:?}, command {command:?}"
                );
            }
        }
    }

    #[test]
    fn repeated_command_is_suppressed() {
        let state = DispatchState {
            last: Some(Command::Left),
        };
        assert_eq!(dispatch(Some(Command::Left), state), (state, false));
    }

    #[test]
    fn changed_command_advances_state() {
        let (state, send) = dispatch(Some(Command::Right), DispatchState::default());
        assert!(send);
        assert_eq!(state.last, Some(Command::Right));
    }

    #[test]
    fn same_command_twice_sends_once() {
        let mut dispatcher = CommandDispatcher::new(RecordingTransport::default());
        assert_eq!(dispatcher.dispatch(Some(Command::Forward)), Some(Command::Forward));
        assert_eq!(dispatcher.dispatch(Some(Command::Forward)), None);
        assert_eq!(dispatcher.transport().sent, vec![Command::Forward]);
    }

    #[test]
    fn changes_are_sent_in_order() {
        let mut dispatcher = CommandDispatcher::new(RecordingTransport::default());
        dispatcher.dispatch(Some(Command::Forward));
        dispatcher.dispatch(None);
        dispatcher.dispatch(Some(Command::Stop));
        dispatcher.dispatch(Some(Command::Forward));
        assert_eq!(
            dispatcher.transport().sent,
            vec![Command::Forward, Command::Stop, Command::Forward]
        );
        assert_eq!(dispatcher.last(), Some(Command::Forward));
    }

    #[test]
    fn absence_keeps_last_command() {
        let mut dispatcher = CommandDispatcher::new(RecordingTransport::default());
        dispatcher.dispatch(Some(Command::Backward));
        assert_eq!(dispatcher.dispatch(None), None);
        assert_eq!(dispatcher.last(), Some(Command::Backward));
        assert_eq!(dispatcher.transport().sent.len(), 1);
    }

    #[test]
    fn failed_send_still_becomes_last_and_is_not_retried() {
        let mut dispatcher = CommandDispatcher::new(RecordingTransport::failing());
        assert_eq!(dispatcher.dispatch(Some(Command::Left)), Some(Command::Left));
        assert_eq!(dispatcher.last(), Some(Command::Left));
        assert_eq!(dispatcher.dispatch(Some(Command::Left)), None);
        assert_eq!(dispatcher.transport().sent, vec![Command::Left]);
    }

    #[test]
    fn unreachable_endpoint_is_swallowed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("ws://127.0.0.1:{port}/ws");

        // The error the dispatcher logs and drops.
        let mut transport = WebSocketTransport::new(&url, None).unwrap();
        let err = transport.send(Command::Stop).unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "{err:?}");

        let mut dispatcher = CommandDispatcher::new(transport);
        assert_eq!(dispatcher.dispatch(Some(Command::Stop)), Some(Command::Stop));
        assert_eq!(dispatcher.last(), Some(Command::Stop));
        assert_eq!(dispatcher.dispatch(Some(Command::Stop)), None);
    }
}
