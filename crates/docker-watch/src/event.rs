//! Container lifecycle events.
//!
//! [`LifecycleEvent`] is the raw runtime notification (start, stop, die,
//! destroy) as read from the Docker event stream. [`ContainerEvent`] is what
//! the [`ContainerEventSource`](crate::source::ContainerEventSource) emits
//! downstream after enriching `start` events with inspected metadata.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use labelsync_core::types::ContainerSnapshot;

/// Runtime lifecycle action the source subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    /// 컨테이너 시작됨
    Start,
    /// 컨테이너 정지됨
    Stop,
    /// 컨테이너 프로세스 종료됨
    Die,
    /// 컨테이너 삭제됨
    Destroy,
}

impl LifecycleAction {
    /// All actions, in the form used for the Docker `event` filter.
    pub const ALL: [LifecycleAction; 4] = [Self::Start, Self::Stop, Self::Die, Self::Destroy];

    /// Docker event action name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Die => "die",
            Self::Destroy => "destroy",
        }
    }

    /// Whether this action means the container no longer serves traffic.
    pub fn is_removal(&self) -> bool {
        !matches!(self, Self::Start)
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "die" => Ok(Self::Die),
            "destroy" => Ok(Self::Destroy),
            _ => Err(()),
        }
    }
}

/// A single lifecycle notification from the runtime event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// 대상 컨테이너 ID
    pub container_id: String,
    /// 이벤트 종류
    pub action: LifecycleAction,
}

impl LifecycleEvent {
    /// Creates a lifecycle event.
    pub fn new(container_id: impl Into<String>, action: LifecycleAction) -> Self {
        Self {
            container_id: container_id.into(),
            action,
        }
    }
}

/// Event emitted by the container event source.
///
/// `Seen` and `Removed` cover both the initial enumeration and the live
/// subscription. `EnumerationComplete` closes every full enumeration (the
/// first one at startup and one after each reconnect) and carries the ids of
/// all containers that were running at that time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    /// A running container was observed, with its current metadata.
    Seen(ContainerSnapshot),
    /// A container stopped, died or was destroyed.
    Removed {
        /// 대상 컨테이너 ID
        container_id: String,
    },
    /// A full enumeration of running containers finished.
    EnumerationComplete {
        /// 열거 시점에 실행 중이던 컨테이너 ID
        running: HashSet<String>,
    },
}

impl ContainerEvent {
    /// Fixed event name for logging and metric labels.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Seen(_) => "seen",
            Self::Removed { .. } => "removed",
            Self::EnumerationComplete { .. } => "enumeration_complete",
        }
    }
}

impl fmt::Display for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seen(snapshot) => write!(f, "seen({} {})", snapshot.id, snapshot.name),
            Self::Removed { container_id } => write!(f, "removed({container_id})"),
            Self::EnumerationComplete { running } => {
                write!(f, "enumeration_complete({} running)", running.len())
            }
        }
    }
}
