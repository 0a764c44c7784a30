use crate::error::ServiceError;
use crate::tsm::{segment_capacity, Frame};
use bacnode_core::apdu::{
    AbortPdu, ApduType, BacnetError, ComplexAckHeader, ConfirmedRequestHeader, RejectPdu,
    SegmentAck,
};
use bacnode_core::encoding::{reader::Reader, writer::Writer};
use bacnode_core::types::{AbortReason, BacnetAddress, MaxApdu, RejectReason};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// A fully-reassembled confirmed request handed to the service registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDispatch {
    pub source: BacnetAddress,
    pub invoke_id: u8,
    pub service_choice: u8,
    pub payload: Vec<u8>,
    /// The client's advertised maximum APDU size.
    pub client_max_apdu: usize,
    pub segmented_response_accepted: bool,
}

/// What a service handler produced for a confirmed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerResponse {
    /// A complete response APDU (Simple-ACK or unsegmented Complex-ACK)
    /// already carrying the invoke id.
    Apdu(Vec<u8>),
}

#[derive(Debug)]
struct Assembly {
    header: ConfirmedRequestHeader,
    payload: Vec<u8>,
    last_seq: u8,
    window: u8,
    deadline: Instant,
}

#[derive(Debug)]
struct CachedResponse {
    frames: Vec<Frame>,
    expires: Instant,
}

#[derive(Debug)]
struct SegmentedResponse {
    destination: BacnetAddress,
    header: ComplexAckHeader,
    payload: Vec<u8>,
    segment_len: usize,
    segment_count: usize,
    window_start: usize,
    window: u8,
    deadline: Instant,
}

/// The server transaction state machine: duplicate suppression, inbound
/// request reassembly, and outbound response segmentation.
#[derive(Debug)]
pub struct ServerTsm {
    apdu_timeout: Duration,
    segment_timeout: Duration,
    local_max_apdu: usize,
    window_size: u8,
    assemblies: HashMap<(BacnetAddress, u8), Assembly>,
    duplicates: HashMap<(BacnetAddress, u8), CachedResponse>,
    responses: HashMap<(BacnetAddress, u8), SegmentedResponse>,
}

impl ServerTsm {
    pub fn new(
        apdu_timeout: Duration,
        segment_timeout: Duration,
        local_max_apdu: usize,
        window_size: u8,
    ) -> Self {
        Self {
            apdu_timeout,
            segment_timeout,
            local_max_apdu,
            window_size: window_size.max(1),
            assemblies: HashMap::new(),
            duplicates: HashMap::new(),
            responses: HashMap::new(),
        }
    }

    /// Process an inbound Confirmed-Request APDU. Returns frames to send
    /// now plus, when a complete request is available, the dispatch for
    /// the service registry.
    pub fn handle_confirmed_request(
        &mut self,
        now: Instant,
        source: BacnetAddress,
        apdu: &[u8],
    ) -> (Vec<Frame>, Option<ServerDispatch>) {
        let mut r = Reader::new(apdu);
        let header = match ConfirmedRequestHeader::decode(&mut r) {
            Ok(header) => header,
            Err(_) => return (Vec::new(), None),
        };
        let payload = r.rest();
        let key = (source.clone(), header.invoke_id);

        // Duplicate suppression: a repeat of a request whose response is
        // still cached gets the cached bytes again.
        if let Some(cached) = self.duplicates.get(&key) {
            if !header.segmented {
                return (cached.frames.clone(), None);
            }
        }

        if !header.segmented {
            let dispatch = ServerDispatch {
                source,
                invoke_id: header.invoke_id,
                service_choice: header.service_choice,
                payload: payload.to_vec(),
                client_max_apdu: decode_max_apdu(header.max_apdu),
                segmented_response_accepted: header.segmented_response_accepted,
            };
            return (Vec::new(), Some(dispatch));
        }

        self.handle_request_segment(now, source, header, payload)
    }

    fn handle_request_segment(
        &mut self,
        now: Instant,
        source: BacnetAddress,
        header: ConfirmedRequestHeader,
        payload: &[u8],
    ) -> (Vec<Frame>, Option<ServerDispatch>) {
        let key = (source.clone(), header.invoke_id);
        let seq = header.sequence_number.unwrap_or(0);

        let assembly = match self.assemblies.get_mut(&key) {
            Some(assembly) => assembly,
            None => {
                if seq != 0 {
                    // Mid-stream segment for a transmission we never saw.
                    let frame =
                        server_segment_ack(&source, header.invoke_id, true, 0, self.window_size);
                    return (vec![frame], None);
                }
                let window = header
                    .proposed_window_size
                    .unwrap_or(1)
                    .min(self.window_size)
                    .max(1);
                let assembly = Assembly {
                    header,
                    payload: payload.to_vec(),
                    last_seq: 0,
                    window,
                    deadline: now + self.segment_timeout,
                };
                if !header.more_follows {
                    let mut frames =
                        vec![server_segment_ack(&source, header.invoke_id, false, 0, window)];
                    let (more, dispatch) = self.finish_assembly(source, assembly);
                    frames.extend(more);
                    return (frames, dispatch);
                }
                self.assemblies.insert(key, assembly);
                let frame = server_segment_ack(&source, header.invoke_id, false, 0, window);
                return (vec![frame], None);
            }
        };

        if seq == assembly.last_seq {
            // Duplicate segment: re-acknowledge.
            let frame =
                server_segment_ack(&source, header.invoke_id, false, seq, assembly.window);
            return (vec![frame], None);
        }
        if seq != assembly.last_seq.wrapping_add(1) {
            let frame = server_segment_ack(
                &source,
                header.invoke_id,
                true,
                assembly.last_seq,
                assembly.window,
            );
            return (vec![frame], None);
        }

        assembly.payload.extend_from_slice(payload);
        assembly.last_seq = seq;
        assembly.deadline = now + self.segment_timeout;
        let window = assembly.window;

        if header.more_follows {
            // Acknowledge at window boundaries.
            let frames = if seq.wrapping_add(1) % window == 0 {
                vec![server_segment_ack(
                    &source,
                    header.invoke_id,
                    false,
                    seq,
                    window,
                )]
            } else {
                Vec::new()
            };
            return (frames, None);
        }

        let assembly = self.assemblies.remove(&key).expect("present");
        let mut frames = vec![server_segment_ack(
            &source,
            header.invoke_id,
            false,
            seq,
            window,
        )];
        let (more_frames, dispatch) = self.finish_assembly(source, assembly);
        frames.extend(more_frames);
        (frames, dispatch)
    }

    fn finish_assembly(
        &mut self,
        source: BacnetAddress,
        assembly: Assembly,
    ) -> (Vec<Frame>, Option<ServerDispatch>) {
        let dispatch = ServerDispatch {
            source,
            invoke_id: assembly.header.invoke_id,
            service_choice: assembly.header.service_choice,
            payload: assembly.payload,
            client_max_apdu: decode_max_apdu(assembly.header.max_apdu),
            segmented_response_accepted: assembly.header.segmented_response_accepted,
        };
        (Vec::new(), Some(dispatch))
    }

    /// Compose and queue the response for a dispatched request. The
    /// handler result is mapped to ACK/Error/Reject/Abort; oversized
    /// Complex-ACKs are segmented when the client accepts that.
    pub fn respond(
        &mut self,
        now: Instant,
        request: &ServerDispatch,
        result: Result<ServerResponse, ServiceError>,
    ) -> Vec<Frame> {
        let frames = match result {
            Ok(ServerResponse::Apdu(apdu)) => {
                let budget = request.client_max_apdu.min(self.local_max_apdu);
                if apdu.len() <= budget {
                    vec![Frame {
                        destination: request.source.clone(),
                        apdu,
                        expecting_reply: false,
                    }]
                } else if request.segmented_response_accepted
                    && matches!(
                        ApduType::of_first_byte(apdu[0]),
                        Some(ApduType::ComplexAck)
                    )
                {
                    self.start_segmented_response(now, request, apdu, budget)
                } else {
                    vec![abort_frame(
                        &request.source,
                        request.invoke_id,
                        AbortReason::SegmentationNotSupported,
                    )]
                }
            }
            Err(ServiceError::Error(class, code)) => {
                let mut buf = [0u8; 16];
                let len = {
                    let mut w = Writer::new(&mut buf);
                    BacnetError {
                        invoke_id: request.invoke_id,
                        service_choice: request.service_choice,
                        error_class: Some(class.to_u32()),
                        error_code: Some(code.to_u32()),
                    }
                    .encode(&mut w)
                    .expect("error pdu fits");
                    w.as_written().len()
                };
                vec![Frame {
                    destination: request.source.clone(),
                    apdu: buf[..len].to_vec(),
                    expecting_reply: false,
                }]
            }
            Err(ServiceError::Reject(reason)) => vec![reject_frame(
                &request.source,
                request.invoke_id,
                reason,
            )],
            Err(ServiceError::Abort(reason)) => vec![abort_frame(
                &request.source,
                request.invoke_id,
                reason,
            )],
        };

        self.duplicates.insert(
            (request.source.clone(), request.invoke_id),
            CachedResponse {
                frames: frames.clone(),
                expires: now + self.apdu_timeout,
            },
        );
        frames
    }

    fn start_segmented_response(
        &mut self,
        now: Instant,
        request: &ServerDispatch,
        apdu: Vec<u8>,
        budget: usize,
    ) -> Vec<Frame> {
        let mut r = Reader::new(&apdu);
        let Ok(header) = ComplexAckHeader::decode(&mut r) else {
            return vec![abort_frame(
                &request.source,
                request.invoke_id,
                AbortReason::Other,
            )];
        };
        let payload = r.rest().to_vec();
        let segment_len = segment_capacity(budget);
        let segment_count = payload.len().div_ceil(segment_len);
        if segment_count > usize::from(u8::MAX) + 1 {
            return vec![abort_frame(
                &request.source,
                request.invoke_id,
                AbortReason::ApduTooLong,
            )];
        }

        let mut response = SegmentedResponse {
            destination: request.source.clone(),
            header,
            payload,
            segment_len,
            segment_count,
            window_start: 0,
            window: self.window_size,
            deadline: now + self.segment_timeout,
        };
        let frames = emit_response_window(&mut response);
        self.responses.insert(
            (request.source.clone(), request.invoke_id),
            response,
        );
        frames
    }

    /// Process a Segment-ACK from a client consuming our segmented
    /// response.
    pub fn handle_segment_ack(
        &mut self,
        now: Instant,
        source: &BacnetAddress,
        apdu: &[u8],
    ) -> Vec<Frame> {
        let mut r = Reader::new(apdu);
        let Ok(ack) = SegmentAck::decode(&mut r) else {
            return Vec::new();
        };
        let key = (source.clone(), ack.invoke_id);
        let Some(response) = self.responses.get_mut(&key) else {
            return Vec::new();
        };

        let window_len =
            (response.segment_count - response.window_start).min(response.window as usize);
        let acked_offset = ack
            .sequence_number
            .wrapping_sub(response.window_start as u8) as usize;

        if ack.negative_ack {
            if acked_offset < window_len {
                response.window_start += acked_offset + 1;
            }
            response.deadline = now + self.segment_timeout;
            return emit_response_window(response);
        }

        if acked_offset >= window_len {
            return Vec::new();
        }
        response.window_start += acked_offset + 1;
        response.window = response.window.min(ack.actual_window_size.max(1));
        response.deadline = now + self.segment_timeout;

        if response.window_start >= response.segment_count {
            self.responses.remove(&key);
            return Vec::new();
        }
        let response = self.responses.get_mut(&key).expect("present");
        emit_response_window(response)
    }

    /// An Abort from the client kills any in-progress reassembly or
    /// segmented response.
    pub fn handle_abort(&mut self, source: &BacnetAddress, apdu: &[u8]) {
        let mut r = Reader::new(apdu);
        if let Ok(abort) = AbortPdu::decode(&mut r) {
            let key = (source.clone(), abort.invoke_id);
            self.assemblies.remove(&key);
            self.responses.remove(&key);
        }
    }

    /// Expire duplicate-cache entries, stale assemblies, and abandoned
    /// segmented responses.
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        self.duplicates.retain(|_, cached| now < cached.expires);
        let mut frames = Vec::new();
        self.assemblies.retain(|(source, invoke_id), assembly| {
            if now < assembly.deadline {
                true
            } else {
                frames.push(abort_frame(source, *invoke_id, AbortReason::TsmTimeout));
                false
            }
        });
        self.responses
            .retain(|_, response| now < response.deadline);
        frames
    }

    pub fn clear(&mut self) {
        self.assemblies.clear();
        self.duplicates.clear();
        self.responses.clear();
    }
}

fn decode_max_apdu(code: u8) -> usize {
    MaxApdu::from_u32((code & 0x0F) as u32)
        .map(MaxApdu::octets)
        .unwrap_or(480)
}

fn server_segment_ack(
    destination: &BacnetAddress,
    invoke_id: u8,
    negative: bool,
    sequence_number: u8,
    window: u8,
) -> Frame {
    let mut buf = [0u8; 8];
    let mut w = Writer::new(&mut buf);
    SegmentAck {
        negative_ack: negative,
        sent_by_server: true,
        invoke_id,
        sequence_number,
        actual_window_size: window,
    }
    .encode(&mut w)
    .expect("segment ack fits");
    Frame {
        destination: destination.clone(),
        apdu: w.as_written().to_vec(),
        expecting_reply: false,
    }
}

fn reject_frame(destination: &BacnetAddress, invoke_id: u8, reason: RejectReason) -> Frame {
    let mut buf = [0u8; 4];
    let mut w = Writer::new(&mut buf);
    RejectPdu {
        invoke_id,
        reason: reason.to_u8(),
    }
    .encode(&mut w)
    .expect("reject fits");
    Frame {
        destination: destination.clone(),
        apdu: w.as_written().to_vec(),
        expecting_reply: false,
    }
}

fn abort_frame(destination: &BacnetAddress, invoke_id: u8, reason: AbortReason) -> Frame {
    let mut buf = [0u8; 4];
    let mut w = Writer::new(&mut buf);
    AbortPdu {
        server: true,
        invoke_id,
        reason: reason.to_u8(),
    }
    .encode(&mut w)
    .expect("abort fits");
    Frame {
        destination: destination.clone(),
        apdu: w.as_written().to_vec(),
        expecting_reply: false,
    }
}

fn emit_response_window(response: &mut SegmentedResponse) -> Vec<Frame> {
    let end = (response.window_start + response.window as usize).min(response.segment_count);
    let mut frames = Vec::with_capacity(end - response.window_start);
    for index in response.window_start..end {
        let start = index * response.segment_len;
        let stop = ((index + 1) * response.segment_len).min(response.payload.len());
        let chunk = &response.payload[start..stop];
        let header = ComplexAckHeader {
            segmented: true,
            more_follows: index + 1 < response.segment_count,
            sequence_number: Some(index as u8),
            proposed_window_size: Some(response.window),
            ..response.header
        };
        let mut buf = vec![0u8; 8 + chunk.len()];
        let len = {
            let mut w = Writer::new(&mut buf);
            if header.encode(&mut w).is_err() {
                continue;
            }
            if w.write_all(chunk).is_err() {
                continue;
            }
            w.as_written().len()
        };
        buf.truncate(len);
        frames.push(Frame {
            destination: response.destination.clone(),
            apdu: buf,
            expecting_reply: false,
        });
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::{ServerResponse, ServerTsm};
    use crate::error::ServiceError;
    use bacnode_core::apdu::{ComplexAckHeader, ConfirmedRequestHeader, SegmentAck, SimpleAck};
    use bacnode_core::encoding::{reader::Reader, writer::Writer};
    use bacnode_core::types::{BacnetAddress, ErrorClass, ErrorCode, RejectReason};
    use tokio::time::{Duration, Instant};

    fn tsm() -> ServerTsm {
        ServerTsm::new(
            Duration::from_secs(3),
            Duration::from_millis(1500),
            1476,
            4,
        )
    }

    fn client() -> BacnetAddress {
        BacnetAddress::local(vec![127, 0, 0, 1, 0xBA, 0xC0])
    }

    fn request(invoke_id: u8, service_choice: u8) -> Vec<u8> {
        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        ConfirmedRequestHeader::simple(invoke_id, service_choice)
            .encode(&mut w)
            .unwrap();
        w.as_written().to_vec()
    }

    fn simple_ack_apdu(invoke_id: u8, service_choice: u8) -> Vec<u8> {
        let mut buf = [0u8; 4];
        let mut w = Writer::new(&mut buf);
        SimpleAck {
            invoke_id,
            service_choice,
        }
        .encode(&mut w)
        .unwrap();
        w.as_written().to_vec()
    }

    #[test]
    fn duplicate_request_replays_cached_response() {
        let mut tsm = tsm();
        let now = Instant::now();
        let apdu = request(7, 0x0F);

        let (frames, dispatch) = tsm.handle_confirmed_request(now, client(), &apdu);
        assert!(frames.is_empty());
        let dispatch = dispatch.unwrap();

        let response = tsm.respond(
            now,
            &dispatch,
            Ok(ServerResponse::Apdu(simple_ack_apdu(7, 0x0F))),
        );
        assert_eq!(response.len(), 1);

        // The retransmitted request is answered from the cache, without a
        // second dispatch.
        let (frames, dispatch) = tsm.handle_confirmed_request(now, client(), &apdu);
        assert!(dispatch.is_none());
        assert_eq!(frames, response);

        // After the window passes, the cache entry is gone.
        let later = now + Duration::from_secs(4);
        tsm.tick(later);
        let (frames, dispatch) = tsm.handle_confirmed_request(later, client(), &apdu);
        assert!(frames.is_empty());
        assert!(dispatch.is_some());
    }

    #[test]
    fn service_error_becomes_error_pdu() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (_, dispatch) = tsm.handle_confirmed_request(now, client(), &request(3, 0x0C));
        let dispatch = dispatch.unwrap();

        let frames = tsm.respond(
            now,
            &dispatch,
            Err(ServiceError::Error(
                ErrorClass::Object,
                ErrorCode::UnknownObject,
            )),
        );
        assert_eq!(frames.len(), 1);
        let mut r = Reader::new(&frames[0].apdu);
        let error = bacnode_core::apdu::BacnetError::decode(&mut r).unwrap();
        assert_eq!(error.invoke_id, 3);
        assert_eq!(error.error_class, Some(1));
        assert_eq!(error.error_code, Some(31));
    }

    #[test]
    fn reject_becomes_reject_pdu() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (_, dispatch) = tsm.handle_confirmed_request(now, client(), &request(4, 0x0C));
        let frames = tsm.respond(
            now,
            &dispatch.unwrap(),
            Err(ServiceError::Reject(RejectReason::InvalidParameterDataType)),
        );
        assert_eq!(frames[0].apdu[0] >> 4, 6);
        assert_eq!(frames[0].apdu[2], 3);
    }

    #[test]
    fn segmented_request_reassembles_in_order() {
        let mut tsm = tsm();
        let now = Instant::now();
        let mut dispatched = None;

        for seq in 0..3u8 {
            let mut buf = [0u8; 64];
            let len = {
                let mut w = Writer::new(&mut buf);
                ConfirmedRequestHeader {
                    segmented: true,
                    more_follows: seq < 2,
                    segmented_response_accepted: true,
                    max_segments: 0,
                    max_apdu: 5,
                    invoke_id: 9,
                    sequence_number: Some(seq),
                    proposed_window_size: Some(4),
                    service_choice: 0x10,
                }
                .encode(&mut w)
                .unwrap();
                w.write_all(&[seq; 8]).unwrap();
                w.as_written().len()
            };
            let (_, dispatch) = tsm.handle_confirmed_request(now, client(), &buf[..len]);
            if dispatch.is_some() {
                dispatched = dispatch;
            }
        }

        let dispatch = dispatched.expect("request should dispatch after final segment");
        assert_eq!(dispatch.payload.len(), 24);
        assert_eq!(&dispatch.payload[..8], &[0; 8]);
        assert_eq!(&dispatch.payload[16..], &[2; 8]);
    }

    #[test]
    fn oversized_response_is_segmented() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (_, dispatch) = tsm.handle_confirmed_request(now, client(), &request(5, 0x0C));
        let dispatch = dispatch.unwrap();
        // The client advertised max_apdu code 5 (1476); build a response
        // much larger than that: six segments at the 1470-octet capacity.
        let mut apdu = vec![0u8; 8000];
        {
            let mut w = Writer::new(&mut apdu);
            ComplexAckHeader::simple(5, 0x0C).encode(&mut w).unwrap();
        }

        let frames = tsm.respond(now, &dispatch, Ok(ServerResponse::Apdu(apdu)));
        // First window of segments.
        assert_eq!(frames.len(), 4);
        for frame in &frames {
            assert!(frame.apdu.len() <= 1476);
            let mut r = Reader::new(&frame.apdu);
            let header = ComplexAckHeader::decode(&mut r).unwrap();
            assert!(header.segmented);
        }

        // Acknowledge the first window; the remainder follows.
        let mut ack_buf = [0u8; 8];
        let mut w = Writer::new(&mut ack_buf);
        SegmentAck {
            negative_ack: false,
            sent_by_server: false,
            invoke_id: 5,
            sequence_number: 3,
            actual_window_size: 4,
        }
        .encode(&mut w)
        .unwrap();
        let ack_len = w.position();
        let more = tsm.handle_segment_ack(now, &client(), &ack_buf[..ack_len]);
        assert_eq!(more.len(), 2);
    }
}
