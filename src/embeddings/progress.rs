//! Typed progress reporting for embedder load/warm-up, replacing the
//! original's callback-streaming of download/load events with an explicit
//! channel.

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Downloading { file: String, percent: u8 },
    Loading,
    Ready,
    Error { message: String },
}

/// Cheap-to-clone handle a caller polls or subscribes to for embedder
/// load/warm progress. `watch` (rather than an mpsc channel) because
/// callers only ever care about the latest state.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<LoadState>,
}

pub struct ProgressWatcher {
    rx: watch::Receiver<LoadState>,
}

pub fn channel() -> (ProgressReporter, ProgressWatcher) {
    let (tx, rx) = watch::channel(LoadState::Downloading {
        file: String::new(),
        percent: 0,
    });
    (ProgressReporter { tx }, ProgressWatcher { rx })
}

impl ProgressReporter {
    pub fn report(&self, state: LoadState) {
        let _ = self.tx.send(state);
    }
}

impl ProgressWatcher {
    pub fn current(&self) -> LoadState {
        self.rx.borrow().clone()
    }

    /// Wait until the state changes, returning the new value.
    pub async fn changed(&mut self) -> Option<LoadState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_downloading() {
        let (_tx, rx) = channel();
        assert_eq!(
            rx.current(),
            LoadState::Downloading {
                file: String::new(),
                percent: 0
            }
        );
    }

    #[tokio::test]
    async fn reports_flow_to_ready() {
        let (tx, mut rx) = channel();
        tx.report(LoadState::Loading);
        let seen = rx.changed().await.unwrap();
        assert_eq!(seen, LoadState::Loading);
        tx.report(LoadState::Ready);
        let seen = rx.changed().await.unwrap();
        assert_eq!(seen, LoadState::Ready);
    }
}
