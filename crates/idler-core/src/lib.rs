use std::{fmt, str::FromStr};

pub mod classifier;

pub use classifier::ActivityClassifier;

/// Server request paths that indicate a player is doing something.
///
/// The order of [`ActivityKind::ALL`] is the order signals are emitted in
/// when one line carries several of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    /// A launcher profile login.
    Login,
    /// The client asking for the server version once in game.
    ServerVersion,
    /// Menu, stash and hideout presence updates.
    PresenceSet,
    /// Raid keep-alive pings.
    RaidPing,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        ActivityKind::Login,
        ActivityKind::ServerVersion,
        ActivityKind::PresenceSet,
        ActivityKind::RaidPing,
    ];

    /// Substring searched for in server log lines.
    pub const fn pattern(self) -> &'static str {
        match self {
            ActivityKind::Login => "/launcher/profile/login",
            ActivityKind::ServerVersion => "/launcher/server/version",
            ActivityKind::PresenceSet => "/fika/presence/set",
            ActivityKind::RaidPing => "/fika/update/ping",
        }
    }

    /// Short name used in configuration.
    pub const fn name(self) -> &'static str {
        match self {
            ActivityKind::Login => "login",
            ActivityKind::ServerVersion => "version",
            ActivityKind::PresenceSet => "presence",
            ActivityKind::RaidPing => "raid",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pattern())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownActivityKind(pub String);

impl fmt::Display for UnknownActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown activity kind: {}", self.0)
    }
}

impl std::error::Error for UnknownActivityKind {}

impl FromStr for ActivityKind {
    type Err = UnknownActivityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ActivityKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(wanted) || k.pattern() == wanted)
            .ok_or_else(|| UnknownActivityKind(wanted.to_string()))
    }
}

/// One classified fact extracted from a server log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    Heartbeat(ActivityKind),
    /// A headless client session connected to the server.
    CompanionStarted,
}

/// Snapshot of the managed container. Never cached across decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Stopped,
    NotFound,
    Error,
}

impl ContainerStatus {
    /// Maps a runtime state string; anything but `running` counts as stopped.
    pub fn from_state(state: &str) -> Self {
        if state.eq_ignore_ascii_case("running") {
            ContainerStatus::Running
        } else {
            ContainerStatus::Stopped
        }
    }

    pub fn is_running(self) -> bool {
        self == ContainerStatus::Running
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::NotFound => "not_found",
            ContainerStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Icon shown next to an in-game notification. Cosmetic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NotificationIcon {
    Default = 0,
    Alert = 1,
    Friend = 2,
    Mail = 3,
    Note = 4,
    Quest = 5,
}

impl NotificationIcon {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Where the companion is in its start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionPhase {
    Idle,
    StartPending,
    Active,
}

impl fmt::Display for CompanionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompanionPhase::Idle => "idle",
            CompanionPhase::StartPending => "start_pending",
            CompanionPhase::Active => "active",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_kind_parses_names_and_patterns() {
        assert_eq!("login".parse::<ActivityKind>().unwrap(), ActivityKind::Login);
        assert_eq!(" RAID ".parse::<ActivityKind>().unwrap(), ActivityKind::RaidPing);
        assert_eq!(
            "/fika/presence/set".parse::<ActivityKind>().unwrap(),
            ActivityKind::PresenceSet
        );
        let err = "lobby".parse::<ActivityKind>().unwrap_err();
        assert!(err.to_string().contains("lobby"));
    }

    #[test]
    fn container_status_only_running_is_running() {
        assert_eq!(ContainerStatus::from_state("running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::from_state("exited"), ContainerStatus::Stopped);
        assert_eq!(ContainerStatus::from_state("restarting"), ContainerStatus::Stopped);
        assert!(!ContainerStatus::NotFound.is_running());
        assert!(!ContainerStatus::Error.is_running());
    }

    #[test]
    fn notification_icon_codes_stay_in_range() {
        assert_eq!(NotificationIcon::Default.code(), 0);
        assert_eq!(NotificationIcon::Quest.code(), 5);
    }
}
