/// BACnet property identifiers.
///
/// The variants cover the standard properties this stack reads, writes, or
/// synthesizes; vendor-specific or unrecognised identifiers use
/// [`Proprietary`](Self::Proprietary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyId {
    /// ReadPropertyMultiple wildcard: every property.
    All,
    /// ReadPropertyMultiple wildcard: required properties.
    Required,
    /// ReadPropertyMultiple wildcard: optional properties.
    Optional,
    AckedTransitions,
    AckRequired,
    AlarmValue,
    AlarmValues,
    ApduSegmentTimeout,
    ApduTimeout,
    ApplicationSoftwareVersion,
    Archive,
    CovIncrement,
    DatabaseRevision,
    DaylightSavingsStatus,
    Deadband,
    Description,
    DeviceAddressBinding,
    EventAlgorithmInhibit,
    EventDetectionEnable,
    EventEnable,
    EventMessageTexts,
    EventParameters,
    EventState,
    EventTimeStamps,
    EventType,
    FaultValues,
    FeedbackValue,
    FileAccessMethod,
    FileSize,
    FileType,
    FirmwareRevision,
    HighLimit,
    InactiveText,
    ActiveText,
    LifeSafetyAlarmValues,
    LimitEnable,
    LocalDate,
    LocalTime,
    LowLimit,
    MaxApduLengthAccepted,
    MaxPresValue,
    MaxSegmentsAccepted,
    MinimumOffTime,
    MinimumOnTime,
    MinPresValue,
    ModelName,
    ModificationDate,
    NotificationClass,
    NotifyType,
    NumberOfApduRetries,
    NumberOfStates,
    ObjectIdentifier,
    ObjectList,
    ObjectName,
    ObjectPropertyReference,
    ObjectType,
    OutOfService,
    Polarity,
    PresentValue,
    Priority,
    PriorityArray,
    ProcessIdentifier,
    ProtocolObjectTypesSupported,
    ProtocolRevision,
    ProtocolServicesSupported,
    ProtocolVersion,
    ReadOnly,
    RecipientList,
    RecordCount,
    Reliability,
    ReliabilityEvaluationInhibit,
    RelinquishDefault,
    Setpoint,
    SegmentationSupported,
    StateText,
    StatusFlags,
    SystemStatus,
    TimeDelay,
    TimeDelayNormal,
    TimeSynchronizationRecipients,
    Units,
    UtcOffset,
    VendorIdentifier,
    VendorName,
    PropertyList,
    CurrentCommandPriority,
    Proprietary(u32),
}

impl PropertyId {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::All => 8,
            Self::Required => 105,
            Self::Optional => 80,
            Self::AckedTransitions => 0,
            Self::AckRequired => 1,
            Self::AlarmValue => 6,
            Self::AlarmValues => 7,
            Self::ApduSegmentTimeout => 10,
            Self::ApduTimeout => 11,
            Self::ApplicationSoftwareVersion => 12,
            Self::Archive => 13,
            Self::CovIncrement => 22,
            Self::DatabaseRevision => 155,
            Self::DaylightSavingsStatus => 24,
            Self::Deadband => 25,
            Self::Description => 28,
            Self::DeviceAddressBinding => 30,
            Self::EventAlgorithmInhibit => 354,
            Self::EventDetectionEnable => 353,
            Self::EventEnable => 35,
            Self::EventMessageTexts => 351,
            Self::EventParameters => 83,
            Self::EventState => 36,
            Self::EventTimeStamps => 130,
            Self::EventType => 37,
            Self::FaultValues => 39,
            Self::FeedbackValue => 40,
            Self::FileAccessMethod => 41,
            Self::FileSize => 42,
            Self::FileType => 43,
            Self::FirmwareRevision => 44,
            Self::HighLimit => 45,
            Self::InactiveText => 46,
            Self::ActiveText => 4,
            Self::LifeSafetyAlarmValues => 166,
            Self::LimitEnable => 52,
            Self::LocalDate => 56,
            Self::LocalTime => 57,
            Self::LowLimit => 59,
            Self::MaxApduLengthAccepted => 62,
            Self::MaxPresValue => 65,
            Self::MaxSegmentsAccepted => 167,
            Self::MinimumOffTime => 66,
            Self::MinimumOnTime => 67,
            Self::MinPresValue => 69,
            Self::ModelName => 70,
            Self::ModificationDate => 71,
            Self::NotificationClass => 17,
            Self::NotifyType => 72,
            Self::NumberOfApduRetries => 73,
            Self::NumberOfStates => 74,
            Self::ObjectIdentifier => 75,
            Self::ObjectList => 76,
            Self::ObjectName => 77,
            Self::ObjectPropertyReference => 78,
            Self::ObjectType => 79,
            Self::OutOfService => 81,
            Self::Polarity => 84,
            Self::PresentValue => 85,
            Self::Priority => 86,
            Self::PriorityArray => 87,
            Self::ProcessIdentifier => 89,
            Self::ProtocolObjectTypesSupported => 96,
            Self::ProtocolRevision => 139,
            Self::ProtocolServicesSupported => 97,
            Self::ProtocolVersion => 98,
            Self::ReadOnly => 99,
            Self::RecipientList => 102,
            Self::RecordCount => 141,
            Self::Reliability => 103,
            Self::ReliabilityEvaluationInhibit => 357,
            Self::RelinquishDefault => 104,
            Self::Setpoint => 108,
            Self::SegmentationSupported => 107,
            Self::StateText => 110,
            Self::StatusFlags => 111,
            Self::SystemStatus => 112,
            Self::TimeDelay => 113,
            Self::TimeDelayNormal => 356,
            Self::TimeSynchronizationRecipients => 116,
            Self::Units => 117,
            Self::UtcOffset => 119,
            Self::VendorIdentifier => 120,
            Self::VendorName => 121,
            Self::PropertyList => 371,
            Self::CurrentCommandPriority => 431,
            Self::Proprietary(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::AckedTransitions,
            1 => Self::AckRequired,
            4 => Self::ActiveText,
            8 => Self::All,
            6 => Self::AlarmValue,
            7 => Self::AlarmValues,
            10 => Self::ApduSegmentTimeout,
            11 => Self::ApduTimeout,
            12 => Self::ApplicationSoftwareVersion,
            13 => Self::Archive,
            17 => Self::NotificationClass,
            22 => Self::CovIncrement,
            24 => Self::DaylightSavingsStatus,
            25 => Self::Deadband,
            28 => Self::Description,
            30 => Self::DeviceAddressBinding,
            35 => Self::EventEnable,
            36 => Self::EventState,
            37 => Self::EventType,
            39 => Self::FaultValues,
            40 => Self::FeedbackValue,
            41 => Self::FileAccessMethod,
            42 => Self::FileSize,
            43 => Self::FileType,
            44 => Self::FirmwareRevision,
            45 => Self::HighLimit,
            46 => Self::InactiveText,
            52 => Self::LimitEnable,
            56 => Self::LocalDate,
            57 => Self::LocalTime,
            59 => Self::LowLimit,
            62 => Self::MaxApduLengthAccepted,
            65 => Self::MaxPresValue,
            66 => Self::MinimumOffTime,
            67 => Self::MinimumOnTime,
            69 => Self::MinPresValue,
            70 => Self::ModelName,
            71 => Self::ModificationDate,
            72 => Self::NotifyType,
            73 => Self::NumberOfApduRetries,
            74 => Self::NumberOfStates,
            75 => Self::ObjectIdentifier,
            76 => Self::ObjectList,
            77 => Self::ObjectName,
            78 => Self::ObjectPropertyReference,
            79 => Self::ObjectType,
            80 => Self::Optional,
            81 => Self::OutOfService,
            83 => Self::EventParameters,
            84 => Self::Polarity,
            85 => Self::PresentValue,
            86 => Self::Priority,
            87 => Self::PriorityArray,
            89 => Self::ProcessIdentifier,
            96 => Self::ProtocolObjectTypesSupported,
            97 => Self::ProtocolServicesSupported,
            98 => Self::ProtocolVersion,
            99 => Self::ReadOnly,
            102 => Self::RecipientList,
            103 => Self::Reliability,
            104 => Self::RelinquishDefault,
            105 => Self::Required,
            107 => Self::SegmentationSupported,
            108 => Self::Setpoint,
            110 => Self::StateText,
            111 => Self::StatusFlags,
            112 => Self::SystemStatus,
            113 => Self::TimeDelay,
            116 => Self::TimeSynchronizationRecipients,
            117 => Self::Units,
            119 => Self::UtcOffset,
            120 => Self::VendorIdentifier,
            121 => Self::VendorName,
            130 => Self::EventTimeStamps,
            139 => Self::ProtocolRevision,
            141 => Self::RecordCount,
            155 => Self::DatabaseRevision,
            166 => Self::LifeSafetyAlarmValues,
            167 => Self::MaxSegmentsAccepted,
            351 => Self::EventMessageTexts,
            353 => Self::EventDetectionEnable,
            354 => Self::EventAlgorithmInhibit,
            356 => Self::TimeDelayNormal,
            357 => Self::ReliabilityEvaluationInhibit,
            371 => Self::PropertyList,
            431 => Self::CurrentCommandPriority,
            v => Self::Proprietary(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PropertyId;

    #[test]
    fn roundtrip_standard_range() {
        for raw in 0..512u32 {
            assert_eq!(PropertyId::from_u32(raw).to_u32(), raw);
        }
    }
}
