#![no_main]

use bacnode_core::encoding::reader::Reader;
use bacnode_core::npdu::Npdu;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut r = Reader::new(data);
    let _ = Npdu::decode(&mut r);
});
