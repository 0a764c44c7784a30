use crate::apdu::ApduType;
use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

/// Header of an Unconfirmed-Request APDU: two octets, the PDU type and
/// the service choice. The service payload follows uninterpreted; the
/// per-service codecs in [`services`](crate::services) pick it up from
/// there, which is also where the `SERVICE_*` choice constants live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnconfirmedRequestHeader {
    pub service_choice: u8,
}

impl UnconfirmedRequestHeader {
    pub const fn new(service_choice: u8) -> Self {
        Self { service_choice }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8((ApduType::UnconfirmedRequest as u8) << 4)?;
        w.write_u8(self.service_choice)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = r.read_u8()?;
        if (b0 >> 4) != ApduType::UnconfirmedRequest as u8 {
            return Err(DecodeError::InvalidValue);
        }
        Ok(Self::new(r.read_u8()?))
    }
}

#[cfg(test)]
mod tests {
    use super::UnconfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::services::who_is::SERVICE_WHO_IS;

    #[test]
    fn two_octet_header() {
        let mut buf = [0u8; 2];
        let mut w = Writer::new(&mut buf);
        UnconfirmedRequestHeader::new(SERVICE_WHO_IS)
            .encode(&mut w)
            .unwrap();
        assert_eq!(w.as_written(), &[0x10, 0x08]);

        let mut r = Reader::new(w.as_written());
        let header = UnconfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(header.service_choice, SERVICE_WHO_IS);
    }
}
