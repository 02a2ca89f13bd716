//! Message catalog: the closed set of wire message types.
//!
//! Each entry carries static metadata: the numeric wire identifier, the
//! manual's name for it, which side originates it, and what shape its
//! payload takes. The catalog never changes at runtime.
//!
//! One identifier is deliberately overloaded: [`OperationCompleted`]
//! means "this point's test finished" when the instrument sends it and
//! "the entire batch is finished" when the controller sends it back at
//! the end of a run. The receiving role's current state disambiguates.
//!
//! [`OperationCompleted`]: MessageKind::OperationCompleted

use std::fmt;

/// Which side of the link originates a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    /// Sent by the workflow-driving side.
    Controller,
    /// Sent by the measuring side.
    Instrument,
    /// Sent by either side, meaning dependent on direction and state.
    Either,
}

/// Expected payload shape for a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Informational text, never parsed.
    FreeText,
    /// A run-unique test method name.
    MethodName,
    /// `"X:Y"` with each coordinate at exactly four decimal places.
    Coordinates,
}

/// Message types understood by both endpoints.
///
/// Discriminants are the wire identifiers; gaps in the numbering belong
/// to instrument functions this link does not drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    /// Instrument is initialized and in loading position; sent once,
    /// first, before anything else.
    Ready = 1,
    /// Controller confirms the sample is in position for approach.
    SampleLoaded = 2,
    /// Instrument is still indenting; poll again later.
    Busy = 4,
    /// Controller dispatches a test method to execute.
    MethodId = 5,
    /// Controller requests a stage move to `"X:Y"`.
    MoveXy = 10,
    /// Controller asks how the running test is doing.
    RequestStatus = 11,
    /// Instrument reports a fault; the whole batch aborts.
    Error = 12,
    /// Instrument acknowledges that stage motion started.
    JobExecStatus = 22,
    /// Instrument reports that the surface approach started.
    ApproachStatus = 23,
    /// Point finished (instrument → controller) or batch finished
    /// (controller → instrument).
    OperationCompleted = 27,
}

/// Every catalog entry, in wire-identifier order.
pub const CATALOG: [MessageKind; 10] = [
    MessageKind::Ready,
    MessageKind::SampleLoaded,
    MessageKind::Busy,
    MessageKind::MethodId,
    MessageKind::MoveXy,
    MessageKind::RequestStatus,
    MessageKind::Error,
    MessageKind::JobExecStatus,
    MessageKind::ApproachStatus,
    MessageKind::OperationCompleted,
];

impl MessageKind {
    /// The identifier written into the wire header.
    #[inline]
    pub const fn wire_id(self) -> u32 {
        self as u32
    }

    /// Resolve a wire identifier against the catalog.
    pub fn from_wire(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::Ready),
            2 => Some(Self::SampleLoaded),
            4 => Some(Self::Busy),
            5 => Some(Self::MethodId),
            10 => Some(Self::MoveXy),
            11 => Some(Self::RequestStatus),
            12 => Some(Self::Error),
            22 => Some(Self::JobExecStatus),
            23 => Some(Self::ApproachStatus),
            27 => Some(Self::OperationCompleted),
            _ => None,
        }
    }

    /// The instrument manual's name for this message.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::SampleLoaded => "SAMPLE_LOADED",
            Self::Busy => "BUSY",
            Self::MethodId => "METHOD_ID",
            Self::MoveXy => "MOVE_XY",
            Self::RequestStatus => "REQUEST_STATUS",
            Self::Error => "ERROR",
            Self::JobExecStatus => "JOB_EXEC_STATUS",
            Self::ApproachStatus => "APPROACH_STATUS",
            Self::OperationCompleted => "OPERATION_COMPLETED",
        }
    }

    /// Which side originates this message.
    pub const fn sender(self) -> Sender {
        match self {
            Self::SampleLoaded | Self::MethodId | Self::MoveXy | Self::RequestStatus => {
                Sender::Controller
            }
            Self::Ready
            | Self::Busy
            | Self::Error
            | Self::JobExecStatus
            | Self::ApproachStatus => Sender::Instrument,
            Self::OperationCompleted => Sender::Either,
        }
    }

    /// Expected payload shape for this message.
    pub const fn payload_shape(self) -> PayloadShape {
        match self {
            Self::MoveXy => PayloadShape::Coordinates,
            Self::MethodId => PayloadShape::MethodName,
            _ => PayloadShape::FreeText,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.wire_id())
    }
}
