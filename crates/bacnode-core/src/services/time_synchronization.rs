use crate::apdu::UnconfirmedRequestHeader;
use crate::encoding::{
    primitives::{decode_app_date, decode_app_time, encode_app_date, encode_app_time},
    reader::Reader,
    writer::Writer,
};
use crate::types::{Date, Time};
use crate::{DecodeError, EncodeError};

pub const SERVICE_TIME_SYNCHRONIZATION: u8 = 0x06;
pub const SERVICE_UTC_TIME_SYNCHRONIZATION: u8 = 0x09;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSynchronizationRequest {
    pub date: Date,
    pub time: Time,
    pub utc: bool,
}

impl TimeSynchronizationRequest {
    pub const fn local(date: Date, time: Time) -> Self {
        Self {
            date,
            time,
            utc: false,
        }
    }

    pub const fn utc(date: Date, time: Time) -> Self {
        Self {
            date,
            time,
            utc: true,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(if self.utc {
            SERVICE_UTC_TIME_SYNCHRONIZATION
        } else {
            SERVICE_TIME_SYNCHRONIZATION
        })
        .encode(w)?;
        encode_app_date(w, self.date)?;
        encode_app_time(w, self.time)
    }

    pub fn decode_after_header(r: &mut Reader<'_>, utc: bool) -> Result<Self, DecodeError> {
        Ok(Self {
            date: decode_app_date(r)?,
            time: decode_app_time(r)?,
            utc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::TimeSynchronizationRequest;
    use crate::apdu::UnconfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{Date, Time};

    #[test]
    fn utc_roundtrip() {
        let req = TimeSynchronizationRequest::utc(
            Date {
                year_since_1900: 126,
                month: 8,
                day: 1,
                weekday: 6,
            },
            Time {
                hour: 12,
                minute: 30,
                second: 0,
                hundredths: 0,
            },
        );
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = UnconfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(header.service_choice, super::SERVICE_UTC_TIME_SYNCHRONIZATION);
        assert_eq!(
            TimeSynchronizationRequest::decode_after_header(&mut r, true).unwrap(),
            req
        );
    }
}
