//! Object type tags and debug categories.

/// The closed set of object kinds the registry manages.
///
/// Declaration order is the shutdown drain order: kinds that hold references
/// to later kinds are destroyed first (a channel references its line and
/// device, so channels go before lines and devices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    /// Conference participant.
    Participant,
    /// Conference bridge.
    Conference,
    /// Queued event.
    Event,
    /// Call leg.
    Channel,
    /// Binding between a line and a device.
    LineDevice,
    /// Line.
    Line,
    /// Physical or virtual device.
    Device,
    /// Anything else, including test objects.
    Generic,
}

impl ObjectType {
    /// Number of object types.
    pub const COUNT: usize = 8;

    /// All object types in drain priority order.
    pub const DRAIN_ORDER: [ObjectType; Self::COUNT] = [
        ObjectType::Participant,
        ObjectType::Conference,
        ObjectType::Event,
        ObjectType::Channel,
        ObjectType::LineDevice,
        ObjectType::Line,
        ObjectType::Device,
        ObjectType::Generic,
    ];

    /// Dense index, usable for per-type tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Display name used in listings and the audit log.
    pub const fn name(self) -> &'static str {
        match self {
            ObjectType::Participant => "participant",
            ObjectType::Conference => "conference",
            ObjectType::Event => "event",
            ObjectType::Channel => "channel",
            ObjectType::LineDevice => "linedevice",
            ObjectType::Line => "line",
            ObjectType::Device => "device",
            ObjectType::Generic => "generic",
        }
    }

    /// Debug category this type's traces are filed under.
    pub const fn category(self) -> DebugCategory {
        match self {
            ObjectType::Participant | ObjectType::Conference => DebugCategory::Conference,
            ObjectType::Event => DebugCategory::Event,
            ObjectType::Channel => DebugCategory::Channel,
            ObjectType::LineDevice | ObjectType::Line => DebugCategory::Line,
            ObjectType::Device => DebugCategory::Device,
            ObjectType::Generic => DebugCategory::High,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Diagnostic category used to filter verbose refcount traces.
///
/// Each category maps to its own `log` target, so a host logger can enable
/// tracing for channels without drowning in device traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugCategory {
    Conference,
    Event,
    Channel,
    Line,
    Device,
    High,
}

impl DebugCategory {
    /// The `log` target for this category.
    pub const fn target(self) -> &'static str {
        match self {
            DebugCategory::Conference => "refcount_registry::conference",
            DebugCategory::Event => "refcount_registry::event",
            DebugCategory::Channel => "refcount_registry::channel",
            DebugCategory::Line => "refcount_registry::line",
            DebugCategory::Device => "refcount_registry::device",
            DebugCategory::High => "refcount_registry::high",
        }
    }
}
