use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

/// BACnet network layer protocol version (always `0x01`).
pub const NPDU_VERSION: u8 = 0x01;

/// DNET value addressing every network.
pub const GLOBAL_BROADCAST_NETWORK: u16 = 0xFFFF;

/// Hop count assigned to originated NPDUs.
pub const INITIAL_HOP_COUNT: u8 = 255;

/// Control-byte flags.
pub const CONTROL_NETWORK_MESSAGE: u8 = 0x80;
pub const CONTROL_HAS_DESTINATION: u8 = 0x20;
pub const CONTROL_HAS_SOURCE: u8 = 0x08;
pub const CONTROL_EXPECTING_REPLY: u8 = 0x04;
pub const CONTROL_PRIORITY_MASK: u8 = 0x03;

/// Network-layer message types carried when the control byte has the
/// network-message flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMessageType {
    WhoIsRouterToNetwork,
    IAmRouterToNetwork,
    ICouldBeRouterToNetwork,
    RejectMessageToNetwork,
    RouterBusyToNetwork,
    RouterAvailableToNetwork,
    InitializeRoutingTable,
    InitializeRoutingTableAck,
    EstablishConnectionToNetwork,
    DisconnectConnectionToNetwork,
    WhatIsNetworkNumber,
    NetworkNumberIs,
    Vendor(u8),
    Unknown(u8),
}

impl NetworkMessageType {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::WhoIsRouterToNetwork,
            0x01 => Self::IAmRouterToNetwork,
            0x02 => Self::ICouldBeRouterToNetwork,
            0x03 => Self::RejectMessageToNetwork,
            0x04 => Self::RouterBusyToNetwork,
            0x05 => Self::RouterAvailableToNetwork,
            0x06 => Self::InitializeRoutingTable,
            0x07 => Self::InitializeRoutingTableAck,
            0x08 => Self::EstablishConnectionToNetwork,
            0x09 => Self::DisconnectConnectionToNetwork,
            0x12 => Self::WhatIsNetworkNumber,
            0x13 => Self::NetworkNumberIs,
            v if v >= 0x80 => Self::Vendor(v),
            v => Self::Unknown(v),
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            Self::WhoIsRouterToNetwork => 0x00,
            Self::IAmRouterToNetwork => 0x01,
            Self::ICouldBeRouterToNetwork => 0x02,
            Self::RejectMessageToNetwork => 0x03,
            Self::RouterBusyToNetwork => 0x04,
            Self::RouterAvailableToNetwork => 0x05,
            Self::InitializeRoutingTable => 0x06,
            Self::InitializeRoutingTableAck => 0x07,
            Self::EstablishConnectionToNetwork => 0x08,
            Self::DisconnectConnectionToNetwork => 0x09,
            Self::WhatIsNetworkNumber => 0x12,
            Self::NetworkNumberIs => 0x13,
            Self::Vendor(v) | Self::Unknown(v) => v,
        }
    }
}

/// A network-layer address consisting of a network number and a MAC address.
///
/// MACs are at most 18 bytes (IPv6 address + port).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpduAddress {
    /// The DNET/SNET network number.
    pub network: u16,
    /// MAC address bytes.
    pub mac: [u8; 18],
    /// Number of valid bytes in `mac`. Zero means broadcast on `network`.
    pub mac_len: u8,
}

impl NpduAddress {
    pub fn new(network: u16, mac: &[u8]) -> Self {
        let mut buf = [0u8; 18];
        let len = mac.len().min(18);
        buf[..len].copy_from_slice(&mac[..len]);
        Self {
            network,
            mac: buf,
            mac_len: len as u8,
        }
    }

    pub const fn broadcast(network: u16) -> Self {
        Self {
            network,
            mac: [0u8; 18],
            mac_len: 0,
        }
    }

    pub fn mac_bytes(&self) -> &[u8] {
        &self.mac[..self.mac_len as usize]
    }
}

/// BACnet Network Protocol Data Unit (NPDU) header.
///
/// Handles encoding and decoding of the NPDU including optional source/
/// destination addresses, hop count, and network-layer message fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Npdu {
    pub control: u8,
    pub destination: Option<NpduAddress>,
    pub source: Option<NpduAddress>,
    pub hop_count: Option<u8>,
    pub message_type: Option<u8>,
    pub vendor_id: Option<u16>,
}

impl Npdu {
    pub const fn new(control: u8) -> Self {
        Self {
            control,
            destination: None,
            source: None,
            hop_count: None,
            message_type: None,
            vendor_id: None,
        }
    }

    /// An application NPDU with the expecting-reply flag set or clear.
    pub const fn application(expecting_reply: bool) -> Self {
        Self::new(if expecting_reply {
            CONTROL_EXPECTING_REPLY
        } else {
            0
        })
    }

    /// A network-layer message NPDU for the given message type.
    pub fn network_message(message_type: NetworkMessageType) -> Self {
        let mut npdu = Self::new(CONTROL_NETWORK_MESSAGE);
        npdu.message_type = Some(message_type.to_u8());
        npdu
    }

    pub const fn is_network_message(&self) -> bool {
        (self.control & CONTROL_NETWORK_MESSAGE) != 0
    }

    pub const fn expecting_reply(&self) -> bool {
        (self.control & CONTROL_EXPECTING_REPLY) != 0
    }

    pub const fn priority(&self) -> u8 {
        self.control & CONTROL_PRIORITY_MASK
    }

    pub fn with_destination(mut self, destination: NpduAddress) -> Self {
        self.destination = Some(destination);
        self.hop_count = Some(self.hop_count.unwrap_or(INITIAL_HOP_COUNT));
        self
    }

    pub fn with_source(mut self, source: NpduAddress) -> Self {
        self.source = Some(source);
        self
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(NPDU_VERSION)?;

        let mut control = self.control;
        if self.destination.is_some() {
            control |= CONTROL_HAS_DESTINATION;
        }
        if self.source.is_some() {
            control |= CONTROL_HAS_SOURCE;
        }
        w.write_u8(control)?;

        if let Some(dest) = self.destination {
            encode_addr(w, dest)?;
        }
        if let Some(src) = self.source {
            encode_addr(w, src)?;
        }
        if self.destination.is_some() {
            w.write_u8(self.hop_count.unwrap_or(INITIAL_HOP_COUNT))?;
        }
        if self.is_network_message() {
            w.write_u8(self.message_type.unwrap_or(0))?;
            if matches!(self.message_type, Some(0x80..=0xFF)) {
                w.write_be_u16(self.vendor_id.unwrap_or(0))?;
            }
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let version = r.read_u8()?;
        if version != NPDU_VERSION {
            return Err(DecodeError::InvalidValue);
        }

        let control = r.read_u8()?;
        let has_dest = (control & CONTROL_HAS_DESTINATION) != 0;
        let has_src = (control & CONTROL_HAS_SOURCE) != 0;
        let is_network_msg = (control & CONTROL_NETWORK_MESSAGE) != 0;

        let destination = if has_dest {
            Some(decode_addr(r)?)
        } else {
            None
        };
        let source = if has_src { Some(decode_addr(r)?) } else { None };
        let hop_count = if has_dest { Some(r.read_u8()?) } else { None };

        let (message_type, vendor_id) = if is_network_msg {
            let mt = r.read_u8()?;
            let vid = if mt >= 0x80 {
                Some(r.read_be_u16()?)
            } else {
                None
            };
            (Some(mt), vid)
        } else {
            (None, None)
        };

        Ok(Self {
            // Address-presence flags are reconstructed from the option
            // fields on encode.
            control: control & !(CONTROL_HAS_DESTINATION | CONTROL_HAS_SOURCE),
            destination,
            source,
            hop_count,
            message_type,
            vendor_id,
        })
    }
}

fn encode_addr(w: &mut Writer<'_>, addr: NpduAddress) -> Result<(), EncodeError> {
    if addr.mac_len as usize > addr.mac.len() {
        return Err(EncodeError::InvalidLength);
    }
    w.write_be_u16(addr.network)?;
    w.write_u8(addr.mac_len)?;
    w.write_all(&addr.mac[..addr.mac_len as usize])
}

fn decode_addr(r: &mut Reader<'_>) -> Result<NpduAddress, DecodeError> {
    let network = r.read_be_u16()?;
    let mac_len = r.read_u8()?;
    if mac_len as usize > 18 {
        return Err(DecodeError::InvalidLength);
    }
    let mut mac = [0u8; 18];
    let src = r.read_exact(mac_len as usize)?;
    mac[..mac_len as usize].copy_from_slice(src);
    Ok(NpduAddress {
        network,
        mac,
        mac_len,
    })
}

#[cfg(test)]
mod tests {
    use super::{NetworkMessageType, Npdu, NpduAddress, CONTROL_EXPECTING_REPLY};
    use crate::encoding::{reader::Reader, writer::Writer};

    #[test]
    fn npdu_roundtrip() {
        let p = Npdu::application(true)
            .with_destination(NpduAddress::new(1, &[192, 168, 1, 2, 0xBA, 0xC0]));

        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        p.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let dec = Npdu::decode(&mut r).unwrap();
        assert_eq!(dec.control, CONTROL_EXPECTING_REPLY);
        assert_eq!(dec.destination.unwrap().network, 1);
        assert_eq!(dec.hop_count, Some(255));
        assert!(dec.expecting_reply());
    }

    #[test]
    fn npdu_roundtrip_ipv6_mac() {
        let mac = [0x20u8; 18];
        let p = Npdu::new(0).with_destination(NpduAddress::new(77, &mac));

        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        p.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let dec = Npdu::decode(&mut r).unwrap();
        assert_eq!(dec.destination.unwrap().mac_bytes(), &mac);
    }

    #[test]
    fn network_message_vendor_id_only_for_vendor_types() {
        let mut p = Npdu::network_message(NetworkMessageType::Vendor(0x80));
        p.vendor_id = Some(260);

        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        p.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let dec = Npdu::decode(&mut r).unwrap();
        assert_eq!(dec.message_type, Some(0x80));
        assert_eq!(dec.vendor_id, Some(260));
    }

    #[test]
    fn who_is_router_has_no_vendor_id() {
        let p = Npdu::network_message(NetworkMessageType::WhoIsRouterToNetwork);

        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        p.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let dec = Npdu::decode(&mut r).unwrap();
        assert_eq!(dec.message_type, Some(0x00));
        assert_eq!(dec.vendor_id, None);
    }
}
