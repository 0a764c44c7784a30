/// Segmentation capability advertised during device discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Segmentation {
    SegmentedBoth = 0,
    SegmentedTransmit = 1,
    SegmentedReceive = 2,
    NoSegmentation = 3,
}

impl Segmentation {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::SegmentedBoth),
            1 => Some(Self::SegmentedTransmit),
            2 => Some(Self::SegmentedReceive),
            3 => Some(Self::NoSegmentation),
            _ => None,
        }
    }

    pub const fn can_transmit(self) -> bool {
        matches!(self, Self::SegmentedBoth | Self::SegmentedTransmit)
    }

    pub const fn can_receive(self) -> bool {
        matches!(self, Self::SegmentedBoth | Self::SegmentedReceive)
    }
}

/// Maximum APDU length accepted by a device, as the 4-bit wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum MaxApdu {
    UpTo50 = 0,
    UpTo128 = 1,
    UpTo206 = 2,
    UpTo480 = 3,
    UpTo1024 = 4,
    UpTo1476 = 5,
}

impl MaxApdu {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::UpTo50),
            1 => Some(Self::UpTo128),
            2 => Some(Self::UpTo206),
            3 => Some(Self::UpTo480),
            4 => Some(Self::UpTo1024),
            5 => Some(Self::UpTo1476),
            _ => None,
        }
    }

    pub const fn octets(self) -> usize {
        match self {
            Self::UpTo50 => 50,
            Self::UpTo128 => 128,
            Self::UpTo206 => 206,
            Self::UpTo480 => 480,
            Self::UpTo1024 => 1024,
            Self::UpTo1476 => 1476,
        }
    }

    /// Largest code whose octet count does not exceed `octets`.
    pub const fn for_octets(octets: usize) -> Self {
        if octets >= 1476 {
            Self::UpTo1476
        } else if octets >= 1024 {
            Self::UpTo1024
        } else if octets >= 480 {
            Self::UpTo480
        } else if octets >= 206 {
            Self::UpTo206
        } else if octets >= 128 {
            Self::UpTo128
        } else {
            Self::UpTo50
        }
    }
}

/// BACnet error class reported in Error PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ErrorClass {
    Device = 0,
    Object = 1,
    Property = 2,
    Resources = 3,
    Security = 4,
    Services = 5,
    Vt = 6,
    Communication = 7,
}

impl ErrorClass {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Device),
            1 => Some(Self::Object),
            2 => Some(Self::Property),
            3 => Some(Self::Resources),
            4 => Some(Self::Security),
            5 => Some(Self::Services),
            6 => Some(Self::Vt),
            7 => Some(Self::Communication),
            _ => None,
        }
    }
}

/// BACnet error code reported in Error PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorCode {
    Other,
    ConfigurationInProgress,
    DeviceBusy,
    DynamicCreationNotSupported,
    FileAccessDenied,
    InconsistentParameters,
    InconsistentSelectionCriterion,
    InvalidDataType,
    InvalidFileAccessMethod,
    InvalidFileStartPosition,
    InvalidParameterDataType,
    InvalidTimeStamp,
    MissingRequiredParameter,
    NoObjectsOfSpecifiedType,
    NoSpaceForObject,
    NoSpaceToWriteProperty,
    NoVtSessionsAvailable,
    PropertyIsNotAList,
    ObjectDeletionNotPermitted,
    ObjectIdentifierAlreadyExists,
    OperationalProblem,
    PasswordFailure,
    ReadAccessDenied,
    ServiceRequestDenied,
    Timeout,
    UnknownObject,
    UnknownProperty,
    UnknownVtClass,
    UnknownVtSession,
    UnsupportedObjectType,
    ValueOutOfRange,
    VtSessionAlreadyClosed,
    VtSessionTerminationFailure,
    WriteAccessDenied,
    CharacterSetNotSupported,
    InvalidArrayIndex,
    CovSubscriptionFailed,
    NotCovProperty,
    OptionalFunctionalityNotSupported,
    InvalidConfigurationData,
    DatatypeNotSupported,
    DuplicateName,
    DuplicateObjectId,
    PropertyIsNotAnArray,
    AbortBufferOverflow,
    AbortInvalidApduInThisState,
    AbortPreemptedByHigherPriorityTask,
    AbortSegmentationNotSupported,
    InvalidTag,
    NetworkDown,
    RejectBufferOverflow,
    RejectInconsistentParameters,
    RejectInvalidParameterDataType,
    RejectInvalidTag,
    RejectMissingRequiredParameter,
    RejectParameterOutOfRange,
    RejectTooManyArguments,
    RejectUndefinedEnumeration,
    RejectUnrecognizedService,
    RejectProprietary,
    CommunicationDisabled,
    Success,
    ValueNotInitialized,
    ListElementNotFound,
    LogBufferFull,
    MessageTooLong,
    Proprietary(u16),
}

impl ErrorCode {
    pub const fn to_u32(self) -> u32 {
        self.to_u16() as u32
    }

    const fn to_u16(self) -> u16 {
        match self {
            Self::Other => 0,
            Self::ConfigurationInProgress => 2,
            Self::DeviceBusy => 3,
            Self::DynamicCreationNotSupported => 4,
            Self::FileAccessDenied => 5,
            Self::InconsistentParameters => 7,
            Self::InconsistentSelectionCriterion => 8,
            Self::InvalidDataType => 9,
            Self::InvalidFileAccessMethod => 10,
            Self::InvalidFileStartPosition => 11,
            Self::InvalidParameterDataType => 13,
            Self::InvalidTimeStamp => 14,
            Self::MissingRequiredParameter => 16,
            Self::NoObjectsOfSpecifiedType => 17,
            Self::NoSpaceForObject => 18,
            Self::NoSpaceToWriteProperty => 20,
            Self::NoVtSessionsAvailable => 21,
            Self::PropertyIsNotAList => 22,
            Self::ObjectDeletionNotPermitted => 23,
            Self::ObjectIdentifierAlreadyExists => 24,
            Self::OperationalProblem => 25,
            Self::PasswordFailure => 26,
            Self::ReadAccessDenied => 27,
            Self::ServiceRequestDenied => 29,
            Self::Timeout => 30,
            Self::UnknownObject => 31,
            Self::UnknownProperty => 32,
            Self::UnknownVtClass => 34,
            Self::UnknownVtSession => 35,
            Self::UnsupportedObjectType => 36,
            Self::ValueOutOfRange => 37,
            Self::VtSessionAlreadyClosed => 38,
            Self::VtSessionTerminationFailure => 39,
            Self::WriteAccessDenied => 40,
            Self::CharacterSetNotSupported => 41,
            Self::InvalidArrayIndex => 42,
            Self::CovSubscriptionFailed => 43,
            Self::NotCovProperty => 44,
            Self::OptionalFunctionalityNotSupported => 45,
            Self::InvalidConfigurationData => 46,
            Self::DatatypeNotSupported => 47,
            Self::DuplicateName => 48,
            Self::DuplicateObjectId => 49,
            Self::PropertyIsNotAnArray => 50,
            Self::AbortBufferOverflow => 51,
            Self::AbortInvalidApduInThisState => 52,
            Self::AbortPreemptedByHigherPriorityTask => 53,
            Self::AbortSegmentationNotSupported => 54,
            Self::InvalidTag => 57,
            Self::NetworkDown => 58,
            Self::RejectBufferOverflow => 59,
            Self::RejectInconsistentParameters => 60,
            Self::RejectInvalidParameterDataType => 61,
            Self::RejectInvalidTag => 62,
            Self::RejectMissingRequiredParameter => 63,
            Self::RejectParameterOutOfRange => 64,
            Self::RejectTooManyArguments => 65,
            Self::RejectUndefinedEnumeration => 66,
            Self::RejectUnrecognizedService => 67,
            Self::RejectProprietary => 68,
            Self::LogBufferFull => 75,
            Self::ListElementNotFound => 81,
            Self::CommunicationDisabled => 83,
            Self::Success => 84,
            Self::ValueNotInitialized => 97,
            Self::MessageTooLong => 113,
            Self::Proprietary(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Other,
            2 => Self::ConfigurationInProgress,
            3 => Self::DeviceBusy,
            4 => Self::DynamicCreationNotSupported,
            5 => Self::FileAccessDenied,
            7 => Self::InconsistentParameters,
            8 => Self::InconsistentSelectionCriterion,
            9 => Self::InvalidDataType,
            10 => Self::InvalidFileAccessMethod,
            11 => Self::InvalidFileStartPosition,
            13 => Self::InvalidParameterDataType,
            14 => Self::InvalidTimeStamp,
            16 => Self::MissingRequiredParameter,
            17 => Self::NoObjectsOfSpecifiedType,
            18 => Self::NoSpaceForObject,
            20 => Self::NoSpaceToWriteProperty,
            21 => Self::NoVtSessionsAvailable,
            22 => Self::PropertyIsNotAList,
            23 => Self::ObjectDeletionNotPermitted,
            24 => Self::ObjectIdentifierAlreadyExists,
            25 => Self::OperationalProblem,
            26 => Self::PasswordFailure,
            27 => Self::ReadAccessDenied,
            29 => Self::ServiceRequestDenied,
            30 => Self::Timeout,
            31 => Self::UnknownObject,
            32 => Self::UnknownProperty,
            34 => Self::UnknownVtClass,
            35 => Self::UnknownVtSession,
            36 => Self::UnsupportedObjectType,
            37 => Self::ValueOutOfRange,
            38 => Self::VtSessionAlreadyClosed,
            39 => Self::VtSessionTerminationFailure,
            40 => Self::WriteAccessDenied,
            41 => Self::CharacterSetNotSupported,
            42 => Self::InvalidArrayIndex,
            43 => Self::CovSubscriptionFailed,
            44 => Self::NotCovProperty,
            45 => Self::OptionalFunctionalityNotSupported,
            46 => Self::InvalidConfigurationData,
            47 => Self::DatatypeNotSupported,
            48 => Self::DuplicateName,
            49 => Self::DuplicateObjectId,
            50 => Self::PropertyIsNotAnArray,
            51 => Self::AbortBufferOverflow,
            52 => Self::AbortInvalidApduInThisState,
            53 => Self::AbortPreemptedByHigherPriorityTask,
            54 => Self::AbortSegmentationNotSupported,
            57 => Self::InvalidTag,
            58 => Self::NetworkDown,
            59 => Self::RejectBufferOverflow,
            60 => Self::RejectInconsistentParameters,
            61 => Self::RejectInvalidParameterDataType,
            62 => Self::RejectInvalidTag,
            63 => Self::RejectMissingRequiredParameter,
            64 => Self::RejectParameterOutOfRange,
            65 => Self::RejectTooManyArguments,
            66 => Self::RejectUndefinedEnumeration,
            67 => Self::RejectUnrecognizedService,
            68 => Self::RejectProprietary,
            75 => Self::LogBufferFull,
            81 => Self::ListElementNotFound,
            83 => Self::CommunicationDisabled,
            84 => Self::Success,
            97 => Self::ValueNotInitialized,
            113 => Self::MessageTooLong,
            v => Self::Proprietary(v as u16),
        }
    }
}

/// Reject reasons carried in Reject PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RejectReason {
    Other = 0,
    BufferOverflow = 1,
    InconsistentParameters = 2,
    InvalidParameterDataType = 3,
    InvalidTag = 4,
    MissingRequiredParameter = 5,
    ParameterOutOfRange = 6,
    TooManyArguments = 7,
    UndefinedEnumeration = 8,
    UnrecognizedService = 9,
}

impl RejectReason {
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::BufferOverflow,
            2 => Self::InconsistentParameters,
            3 => Self::InvalidParameterDataType,
            4 => Self::InvalidTag,
            5 => Self::MissingRequiredParameter,
            6 => Self::ParameterOutOfRange,
            7 => Self::TooManyArguments,
            8 => Self::UndefinedEnumeration,
            9 => Self::UnrecognizedService,
            _ => Self::Other,
        }
    }
}

/// Abort reasons carried in Abort PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AbortReason {
    Other = 0,
    BufferOverflow = 1,
    InvalidApduInThisState = 2,
    PreemptedByHigherPriorityTask = 3,
    SegmentationNotSupported = 4,
    SecurityError = 5,
    InsufficientSecurity = 6,
    WindowSizeOutOfRange = 7,
    ApplicationExceededReplyTime = 8,
    OutOfResources = 9,
    TsmTimeout = 10,
    ApduTooLong = 11,
}

impl AbortReason {
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::BufferOverflow,
            2 => Self::InvalidApduInThisState,
            3 => Self::PreemptedByHigherPriorityTask,
            4 => Self::SegmentationNotSupported,
            5 => Self::SecurityError,
            6 => Self::InsufficientSecurity,
            7 => Self::WindowSizeOutOfRange,
            8 => Self::ApplicationExceededReplyTime,
            9 => Self::OutOfResources,
            10 => Self::TsmTimeout,
            11 => Self::ApduTooLong,
            _ => Self::Other,
        }
    }
}

/// Event state of a monitored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EventState {
    #[default]
    Normal = 0,
    Fault = 1,
    Offnormal = 2,
    HighLimit = 3,
    LowLimit = 4,
    LifeSafetyAlarm = 5,
}

impl EventState {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Fault),
            2 => Some(Self::Offnormal),
            3 => Some(Self::HighLimit),
            4 => Some(Self::LowLimit),
            5 => Some(Self::LifeSafetyAlarm),
            _ => None,
        }
    }

    pub const fn is_alarm(self) -> bool {
        matches!(
            self,
            Self::Offnormal | Self::HighLimit | Self::LowLimit | Self::LifeSafetyAlarm
        )
    }

    /// Index into event-enable / acked-transitions / event-time-stamps
    /// arrays: to-offnormal = 0, to-fault = 1, to-normal = 2.
    pub const fn transition_index(self) -> usize {
        match self {
            Self::Normal => 2,
            Self::Fault => 1,
            _ => 0,
        }
    }
}

/// Event algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventType {
    ChangeOfBitstring,
    ChangeOfState,
    ChangeOfValue,
    CommandFailure,
    FloatingLimit,
    OutOfRange,
    ChangeOfLifeSafety,
    Extended,
    BufferReady,
    UnsignedRange,
    AccessEvent,
    DoubleOutOfRange,
    SignedOutOfRange,
    UnsignedOutOfRange,
    ChangeOfCharacterstring,
    ChangeOfStatusFlags,
    ChangeOfReliability,
    None,
    ChangeOfDiscreteValue,
    ChangeOfTimer,
    Proprietary(u32),
}

impl EventType {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::ChangeOfBitstring => 0,
            Self::ChangeOfState => 1,
            Self::ChangeOfValue => 2,
            Self::CommandFailure => 3,
            Self::FloatingLimit => 4,
            Self::OutOfRange => 5,
            Self::ChangeOfLifeSafety => 8,
            Self::Extended => 9,
            Self::BufferReady => 10,
            Self::UnsignedRange => 11,
            Self::AccessEvent => 13,
            Self::DoubleOutOfRange => 14,
            Self::SignedOutOfRange => 15,
            Self::UnsignedOutOfRange => 16,
            Self::ChangeOfCharacterstring => 17,
            Self::ChangeOfStatusFlags => 18,
            Self::ChangeOfReliability => 19,
            Self::None => 20,
            Self::ChangeOfDiscreteValue => 21,
            Self::ChangeOfTimer => 22,
            Self::Proprietary(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::ChangeOfBitstring,
            1 => Self::ChangeOfState,
            2 => Self::ChangeOfValue,
            3 => Self::CommandFailure,
            4 => Self::FloatingLimit,
            5 => Self::OutOfRange,
            8 => Self::ChangeOfLifeSafety,
            9 => Self::Extended,
            10 => Self::BufferReady,
            11 => Self::UnsignedRange,
            13 => Self::AccessEvent,
            14 => Self::DoubleOutOfRange,
            15 => Self::SignedOutOfRange,
            16 => Self::UnsignedOutOfRange,
            17 => Self::ChangeOfCharacterstring,
            18 => Self::ChangeOfStatusFlags,
            19 => Self::ChangeOfReliability,
            20 => Self::None,
            21 => Self::ChangeOfDiscreteValue,
            22 => Self::ChangeOfTimer,
            v => Self::Proprietary(v),
        }
    }
}

/// Notification purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum NotifyType {
    Alarm = 0,
    Event = 1,
    AckNotification = 2,
}

impl NotifyType {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Alarm),
            1 => Some(Self::Event),
            2 => Some(Self::AckNotification),
            _ => None,
        }
    }
}

/// Reliability of a monitored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reliability {
    #[default]
    NoFaultDetected,
    NoSensor,
    OverRange,
    UnderRange,
    OpenLoop,
    ShortedLoop,
    NoOutput,
    UnreliableOther,
    ProcessError,
    MultiStateFault,
    ConfigurationError,
    CommunicationFailure,
    MemberFault,
    MonitoredObjectFault,
    Tripped,
    Proprietary(u32),
}

impl Reliability {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::NoFaultDetected => 0,
            Self::NoSensor => 1,
            Self::OverRange => 2,
            Self::UnderRange => 3,
            Self::OpenLoop => 4,
            Self::ShortedLoop => 5,
            Self::NoOutput => 6,
            Self::UnreliableOther => 7,
            Self::ProcessError => 8,
            Self::MultiStateFault => 9,
            Self::ConfigurationError => 10,
            Self::CommunicationFailure => 12,
            Self::MemberFault => 13,
            Self::MonitoredObjectFault => 14,
            Self::Tripped => 15,
            Self::Proprietary(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::NoFaultDetected,
            1 => Self::NoSensor,
            2 => Self::OverRange,
            3 => Self::UnderRange,
            4 => Self::OpenLoop,
            5 => Self::ShortedLoop,
            6 => Self::NoOutput,
            7 => Self::UnreliableOther,
            8 => Self::ProcessError,
            9 => Self::MultiStateFault,
            10 => Self::ConfigurationError,
            12 => Self::CommunicationFailure,
            13 => Self::MemberFault,
            14 => Self::MonitoredObjectFault,
            15 => Self::Tripped,
            v => Self::Proprietary(v),
        }
    }

    pub const fn is_fault(self) -> bool {
        !matches!(self, Self::NoFaultDetected)
    }
}

/// DeviceCommunicationControl enable/disable argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EnableDisable {
    #[default]
    Enable = 0,
    Disable = 1,
    DisableInitiation = 2,
}

impl EnableDisable {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Enable),
            1 => Some(Self::Disable),
            2 => Some(Self::DisableInitiation),
            _ => None,
        }
    }
}

/// ReinitializeDevice target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ReinitializedState {
    Coldstart = 0,
    Warmstart = 1,
    StartBackup = 2,
    EndBackup = 3,
    StartRestore = 4,
    EndRestore = 5,
    AbortRestore = 6,
}

impl ReinitializedState {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Coldstart),
            1 => Some(Self::Warmstart),
            2 => Some(Self::StartBackup),
            3 => Some(Self::EndBackup),
            4 => Some(Self::StartRestore),
            5 => Some(Self::EndRestore),
            6 => Some(Self::AbortRestore),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, EventState, MaxApdu};

    #[test]
    fn max_apdu_octet_mapping() {
        assert_eq!(MaxApdu::UpTo1476.octets(), 1476);
        assert_eq!(MaxApdu::for_octets(1476), MaxApdu::UpTo1476);
        assert_eq!(MaxApdu::for_octets(600), MaxApdu::UpTo480);
        assert_eq!(MaxApdu::for_octets(10), MaxApdu::UpTo50);
    }

    #[test]
    fn error_code_roundtrip() {
        for raw in 0..120u32 {
            assert_eq!(ErrorCode::from_u32(raw).to_u32(), raw);
        }
    }

    #[test]
    fn transition_indices() {
        assert_eq!(EventState::HighLimit.transition_index(), 0);
        assert_eq!(EventState::Fault.transition_index(), 1);
        assert_eq!(EventState::Normal.transition_index(), 2);
    }
}
