use bacnode_core::types::{BacnetAddress, ObjectType, PropertyValue};
use clap::ValueEnum;
use std::net::SocketAddr;

/// CLI-friendly enum for selecting BACnet object types.
///
/// Maps human-readable names to [`ObjectType`] variants for use with clap
/// argument parsing.
#[derive(Debug, Clone, ValueEnum)]
pub enum ObjectTypeArg {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Calendar,
    Command,
    Device,
    EventEnrollment,
    File,
    Group,
    Loop,
    MultiStateInput,
    MultiStateOutput,
    NotificationClass,
    Program,
    Schedule,
    MultiStateValue,
    TrendLog,
    Accumulator,
    PulseConverter,
    EventLog,
    StructuredView,
    AccessDoor,
    Timer,
    CharacterStringValue,
    NetworkPort,
}

impl ObjectTypeArg {
    /// Convert to the core [`ObjectType`] representation.
    pub const fn into_object_type(self) -> ObjectType {
        match self {
            Self::AnalogInput => ObjectType::AnalogInput,
            Self::AnalogOutput => ObjectType::AnalogOutput,
            Self::AnalogValue => ObjectType::AnalogValue,
            Self::BinaryInput => ObjectType::BinaryInput,
            Self::BinaryOutput => ObjectType::BinaryOutput,
            Self::BinaryValue => ObjectType::BinaryValue,
            Self::Calendar => ObjectType::Calendar,
            Self::Command => ObjectType::Command,
            Self::Device => ObjectType::Device,
            Self::EventEnrollment => ObjectType::EventEnrollment,
            Self::File => ObjectType::File,
            Self::Group => ObjectType::Group,
            Self::Loop => ObjectType::Loop,
            Self::MultiStateInput => ObjectType::MultiStateInput,
            Self::MultiStateOutput => ObjectType::MultiStateOutput,
            Self::NotificationClass => ObjectType::NotificationClass,
            Self::Program => ObjectType::Program,
            Self::Schedule => ObjectType::Schedule,
            Self::MultiStateValue => ObjectType::MultiStateValue,
            Self::TrendLog => ObjectType::TrendLog,
            Self::Accumulator => ObjectType::Accumulator,
            Self::PulseConverter => ObjectType::PulseConverter,
            Self::EventLog => ObjectType::EventLog,
            Self::StructuredView => ObjectType::StructuredView,
            Self::AccessDoor => ObjectType::AccessDoor,
            Self::Timer => ObjectType::Timer,
            Self::CharacterStringValue => ObjectType::CharacterStringValue,
            Self::NetworkPort => ObjectType::NetworkPort,
        }
    }
}

/// Parse a command-line value literal into a [`PropertyValue`]:
/// `null`, booleans, integers, floats, or a quoted/bare string.
pub fn parse_value(raw: &str) -> PropertyValue {
    match raw {
        "null" | "Null" | "NULL" => return PropertyValue::Null,
        "true" => return PropertyValue::Boolean(true),
        "false" => return PropertyValue::Boolean(false),
        _ => {}
    }
    if let Ok(unsigned) = raw.parse::<u32>() {
        return PropertyValue::Unsigned(unsigned);
    }
    if let Ok(signed) = raw.parse::<i32>() {
        return PropertyValue::Signed(signed);
    }
    if let Ok(real) = raw.parse::<f32>() {
        return PropertyValue::Real(real);
    }
    PropertyValue::CharacterString(raw.trim_matches('"').to_string())
}

/// Target device address from an `ip:port` pair, optionally behind a
/// routed network number.
pub fn target_address(addr: SocketAddr, network: Option<u16>) -> BacnetAddress {
    let local = BacnetAddress::from_socket_addr(addr);
    match network {
        Some(network) => BacnetAddress::remote(network, local.mac),
        None => local,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_value;
    use bacnode_core::types::PropertyValue;

    #[test]
    fn parses_literals() {
        assert_eq!(parse_value("null"), PropertyValue::Null);
        assert_eq!(parse_value("true"), PropertyValue::Boolean(true));
        assert_eq!(parse_value("42"), PropertyValue::Unsigned(42));
        assert_eq!(parse_value("-3"), PropertyValue::Signed(-3));
        assert_eq!(parse_value("72.5"), PropertyValue::Real(72.5));
        assert_eq!(
            parse_value("lobby"),
            PropertyValue::CharacterString("lobby".into())
        );
    }
}
