//! Core types used throughout the decision core.

use std::cell::Cell;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Index of one of the parallel links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u8);

impl LinkId {
    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Check the id against the configured number of links.
    pub fn is_valid(self, num_links: usize) -> bool {
        self.index() < num_links
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traffic identifier (TID) in `[0, 255]`.
///
/// The range is enforced by the representation; raw ids from collaborators
/// go through `TryFrom<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowId(pub u8);

impl FlowId {
    pub fn new(tid: u8) -> Self {
        Self(tid)
    }

    pub fn as_u32(self) -> u32 {
        u32::from(self.0)
    }
}

impl TryFrom<u32> for FlowId {
    type Error = Error;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        u8::try_from(raw).map(Self).map_err(|_| Error::InvalidFlow(raw))
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority tier derived from the configured emergency/critical counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Regular traffic.
    Normal,
    /// Critical traffic.
    Critical,
    /// Highest priority traffic.
    Emergency,
}

impl Tier {
    /// Both Emergency and Critical count as critical for monitoring.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Emergency | Self::Critical)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Critical => write!(f, "critical"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// IEEE 802.11 access category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessCategory {
    Background,
    BestEffort,
    Video,
    Voice,
}

impl AccessCategory {
    /// Numeric AC index (AC_BK=0 .. AC_VO=3).
    pub fn index(self) -> u8 {
        match self {
            Self::Background => 0,
            Self::BestEffort => 1,
            Self::Video => 2,
            Self::Voice => 3,
        }
    }
}

/// Frequency band a link operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyBand {
    /// 2.4 GHz
    #[serde(rename = "2.4ghz")]
    Ghz2_4,
    /// 5 GHz
    #[serde(rename = "5ghz")]
    Ghz5,
    /// 6 GHz
    #[serde(rename = "6ghz")]
    Ghz6,
    /// Anything else
    #[default]
    Unknown,
}

impl FrequencyBand {
    /// Default band for a link index (0 = 2.4 GHz, 1 = 5 GHz, 2 = 6 GHz).
    pub fn for_index(index: usize) -> Self {
        match index {
            0 => Self::Ghz2_4,
            1 => Self::Ghz5,
            2 => Self::Ghz6,
            _ => Self::Unknown,
        }
    }

    /// Nominal capacity in bits per second.
    pub fn capacity_bps(self) -> f64 {
        match self {
            Self::Ghz2_4 => 100.0e6,
            Self::Ghz5 => 300.0e6,
            Self::Ghz6 => 500.0e6,
            Self::Unknown => 200.0e6,
        }
    }

    /// Base selection weight (higher bands weighted higher).
    pub fn base_weight(self) -> f64 {
        match self {
            Self::Ghz2_4 => 0.6,
            Self::Ghz5 => 1.0,
            Self::Ghz6 => 1.2,
            Self::Unknown => 1.0,
        }
    }

    /// Ordering key for band preference (higher = preferred).
    pub fn rank(self) -> u8 {
        match self {
            Self::Ghz6 => 3,
            Self::Ghz5 => 2,
            Self::Ghz2_4 => 1,
            Self::Unknown => 0,
        }
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ghz2_4 => write!(f, "2.4GHz"),
            Self::Ghz5 => write!(f, "5GHz"),
            Self::Ghz6 => write!(f, "6GHz"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// What happened to one transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Outcome {
    /// Transmit recorded, delivery not yet known.
    Pending,
    /// Delivered after `delay_ms`.
    Delivered { delay_ms: f64 },
    /// Lost on the air.
    Lost,
}

impl Outcome {
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn delay_ms(self) -> Option<f64> {
        match self {
            Self::Delivered { delay_ms } => Some(delay_ms),
            _ => None,
        }
    }
}

/// A single packet event handed to the core by the transmission layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacketEvent {
    pub link: LinkId,
    pub flow: FlowId,
    /// Virtual time of the event.
    pub timestamp: Duration,
    pub bytes: u32,
    pub outcome: Outcome,
    /// The packet is a backup copy of another transmission.
    #[serde(default)]
    pub duplicate: bool,
    /// Explicit criticality; derived from the flow's tier when absent.
    #[serde(default)]
    pub critical: Option<bool>,
}

impl PacketEvent {
    pub fn new(link: LinkId, flow: FlowId, timestamp: Duration, bytes: u32, outcome: Outcome) -> Self {
        Self {
            link,
            flow,
            timestamp,
            bytes,
            outcome,
            duplicate: false,
            critical: None,
        }
    }

    pub fn pending(link: LinkId, flow: FlowId, timestamp: Duration, bytes: u32) -> Self {
        Self::new(link, flow, timestamp, bytes, Outcome::Pending)
    }

    pub fn delivered(
        link: LinkId,
        flow: FlowId,
        timestamp: Duration,
        bytes: u32,
        delay_ms: f64,
    ) -> Self {
        Self::new(link, flow, timestamp, bytes, Outcome::Delivered { delay_ms })
    }

    pub fn lost(link: LinkId, flow: FlowId, timestamp: Duration, bytes: u32) -> Self {
        Self::new(link, flow, timestamp, bytes, Outcome::Lost)
    }

    /// Mark as a duplicate copy.
    pub fn as_duplicate(mut self) -> Self {
        self.duplicate = true;
        self
    }

    /// Override the derived criticality.
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }
}

/// Monotonic virtual clock supplied by the driver.
pub trait Clock {
    /// Time elapsed since the start of the run.
    fn now(&self) -> Duration;
}

/// Clock advanced by hand, for drivers and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Jump to an absolute time; earlier values are ignored.
    pub fn set(&self, to: Duration) {
        if to > self.now.get() {
            self.now.set(to);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}
