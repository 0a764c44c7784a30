#![no_main]

use bacnode_core::encoding::reader::Reader;
use bacnode_datalink::bip::bvlc::BvlcHeader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut r = Reader::new(data);
    if let Ok(header) = BvlcHeader::decode(&mut r) {
        let _ = r.read_exact((header.length as usize).saturating_sub(4));
    }
});
