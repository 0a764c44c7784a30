#![no_main]

use bacnode_core::encoding::reader::Reader;
use bacnode_core::services::cov_notification::CovNotification;
use bacnode_core::services::event_notification::EventNotification;
use bacnode_core::services::read_property::{ReadPropertyAck, ReadPropertyRequest};
use bacnode_core::services::read_property_multiple::{
    ReadPropertyMultipleAck, ReadPropertyMultipleRequest,
};
use bacnode_core::services::subscribe_cov::SubscribeCovRequest;
use bacnode_core::services::value_codec::decode_application_data_value;
use bacnode_core::services::who_is::WhoIsRequest;
use bacnode_core::services::write_property::WritePropertyRequest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_application_data_value(&mut Reader::new(data));
    let _ = WhoIsRequest::decode_after_header(&mut Reader::new(data));
    let _ = ReadPropertyRequest::decode_after_header(&mut Reader::new(data), 0);
    let _ = ReadPropertyAck::decode_after_header(&mut Reader::new(data));
    let _ = WritePropertyRequest::decode_after_header(&mut Reader::new(data), 0);
    let _ = ReadPropertyMultipleRequest::decode_after_header(&mut Reader::new(data), 0);
    let _ = ReadPropertyMultipleAck::decode_after_header(&mut Reader::new(data));
    let _ = SubscribeCovRequest::decode_after_header(&mut Reader::new(data), 0);
    let _ = CovNotification::decode_after_header(&mut Reader::new(data));
    let _ = EventNotification::decode_after_header(&mut Reader::new(data));
});
