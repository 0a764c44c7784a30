use crate::encoding::{
    primitives::{decode_unsigned, encode_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::{expect_closing, expect_opening};
use crate::types::{Date, Time};
use crate::{DecodeError, EncodeError};

/// BACnetTimeStamp choice used in event reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStamp {
    Time(Time),
    SequenceNumber(u32),
    DateTime(Date, Time),
}

impl TimeStamp {
    pub const fn unspecified() -> Self {
        Self::DateTime(Date::any(), Time::any())
    }

    /// Encode as a choice inside the given context tag.
    pub fn encode_ctx(&self, w: &mut Writer<'_>, tag_num: u8) -> Result<(), EncodeError> {
        Tag::Opening { tag_num }.encode(w)?;
        self.encode_choice(w)?;
        Tag::Closing { tag_num }.encode(w)
    }

    /// Encode the bare choice, as used in timestamp lists.
    pub fn encode_choice(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match self {
            Self::Time(t) => {
                Tag::Context { tag_num: 0, len: 4 }.encode(w)?;
                w.write_all(&[t.hour, t.minute, t.second, t.hundredths])?;
            }
            Self::SequenceNumber(seq) => {
                let mut scratch = [0u8; 4];
                let mut tw = Writer::new(&mut scratch);
                let len = encode_unsigned(&mut tw, *seq)? as u32;
                Tag::Context { tag_num: 1, len }.encode(w)?;
                w.write_all(&scratch[..len as usize])?;
            }
            Self::DateTime(d, t) => {
                Tag::Opening { tag_num: 2 }.encode(w)?;
                crate::encoding::primitives::encode_app_date(w, *d)?;
                crate::encoding::primitives::encode_app_time(w, *t)?;
                Tag::Closing { tag_num: 2 }.encode(w)?;
            }
        }
        Ok(())
    }

    pub fn decode_ctx(r: &mut Reader<'_>, tag_num: u8) -> Result<Self, DecodeError> {
        expect_opening(r, tag_num)?;
        let ts = Self::decode_choice(r)?;
        expect_closing(r, tag_num)?;
        Ok(ts)
    }

    /// Decode the bare choice, as used in timestamp lists.
    pub fn decode_choice(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let ts = match Tag::decode(r)? {
            Tag::Context { tag_num: 0, len: 4 } => {
                let b = r.read_exact(4)?;
                Self::Time(Time {
                    hour: b[0],
                    minute: b[1],
                    second: b[2],
                    hundredths: b[3],
                })
            }
            Tag::Context { tag_num: 1, len } => {
                Self::SequenceNumber(decode_unsigned(r, len as usize)?)
            }
            Tag::Opening { tag_num: 2 } => {
                let date = crate::encoding::primitives::decode_app_date(r)?;
                let time = crate::encoding::primitives::decode_app_time(r)?;
                expect_closing(r, 2)?;
                Self::DateTime(date, time)
            }
            _ => return Err(DecodeError::UnexpectedTag),
        };
        Ok(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::TimeStamp;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{Date, Time};

    #[test]
    fn timestamp_choices_roundtrip() {
        let stamps = [
            TimeStamp::Time(Time {
                hour: 10,
                minute: 2,
                second: 3,
                hundredths: 0,
            }),
            TimeStamp::SequenceNumber(77),
            TimeStamp::DateTime(
                Date {
                    year_since_1900: 124,
                    month: 5,
                    day: 1,
                    weekday: 3,
                },
                Time {
                    hour: 23,
                    minute: 59,
                    second: 59,
                    hundredths: 99,
                },
            ),
        ];
        for ts in stamps {
            let mut buf = [0u8; 32];
            let mut w = Writer::new(&mut buf);
            ts.encode_ctx(&mut w, 3).unwrap();
            let mut r = Reader::new(w.as_written());
            assert_eq!(TimeStamp::decode_ctx(&mut r, 3).unwrap(), ts);
        }
    }
}
