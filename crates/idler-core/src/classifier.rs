use std::sync::LazyLock;

use regex::Regex;

use crate::{ActivityKind, ActivitySignal};

static COMPANION_CONNECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"headless_.*has connected").unwrap());

/// Maps raw server log lines to activity signals.
///
/// Called once per streamed line, so classification borrows the line and
/// yields signals lazily without allocating.
#[derive(Debug, Clone)]
pub struct ActivityClassifier {
    kinds: Vec<ActivityKind>,
}

impl Default for ActivityClassifier {
    fn default() -> Self {
        Self::new(ActivityKind::ALL)
    }
}

impl ActivityClassifier {
    /// Kinds are matched in catalogue order regardless of the order given.
    pub fn new(kinds: impl IntoIterator<Item = ActivityKind>) -> Self {
        let wanted: Vec<ActivityKind> = kinds.into_iter().collect();
        let kinds = ActivityKind::ALL
            .into_iter()
            .filter(|k| wanted.contains(k))
            .collect();
        Self { kinds }
    }

    pub fn kinds(&self) -> &[ActivityKind] {
        &self.kinds
    }

    /// Every matching activity substring yields a heartbeat, followed by a
    /// companion-started signal if the line also reports a headless session.
    pub fn classify<'a>(&'a self, line: &'a str) -> impl Iterator<Item = ActivitySignal> + 'a {
        let heartbeats = self
            .kinds
            .iter()
            .copied()
            .filter(move |k| line.contains(k.pattern()))
            .map(ActivitySignal::Heartbeat);
        let started = COMPANION_CONNECTED
            .is_match(line)
            .then_some(ActivitySignal::CompanionStarted);
        heartbeats.chain(started)
    }
}
