#![no_main]

use bacnode_core::apdu::{
    AbortPdu, BacnetError, ComplexAckHeader, ConfirmedRequestHeader, RejectPdu, SegmentAck,
    SimpleAck,
};
use bacnode_core::encoding::reader::Reader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = ConfirmedRequestHeader::decode(&mut Reader::new(data));
    let _ = ComplexAckHeader::decode(&mut Reader::new(data));
    let _ = SimpleAck::decode(&mut Reader::new(data));
    let _ = SegmentAck::decode(&mut Reader::new(data));
    let _ = BacnetError::decode(&mut Reader::new(data));
    let _ = RejectPdu::decode(&mut Reader::new(data));
    let _ = AbortPdu::decode(&mut Reader::new(data));
});
