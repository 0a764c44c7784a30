use crate::error::AppError;
use crate::tsm::{segment_capacity, Frame};
use bacnode_core::apdu::{
    AbortPdu, ApduType, BacnetError, ComplexAckHeader, ConfirmedRequestHeader, RejectPdu,
    SegmentAck, SimpleAck,
};
use bacnode_core::encoding::{reader::Reader, writer::Writer};
use bacnode_core::types::{AbortReason, BacnetAddress, RejectReason};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};

/// Outcome of a confirmed request, delivered through the caller's
/// completion channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmedResult {
    SimpleAck,
    /// Service payload of the (possibly reassembled) Complex-ACK.
    ComplexAck(Vec<u8>),
}

type Completion = oneshot::Sender<Result<ConfirmedResult, AppError>>;

#[derive(Debug)]
struct SegmentedSend {
    header: ConfirmedRequestHeader,
    payload: Vec<u8>,
    segment_len: usize,
    segment_count: usize,
    /// Index of the first segment of the current window.
    window_start: usize,
    window: u8,
}

#[derive(Debug)]
struct SegmentedReceive {
    payload: Vec<u8>,
    last_seq: u8,
    window: u8,
}

#[derive(Debug)]
enum TxState {
    /// Request fully transmitted; the stored frame is retransmitted on
    /// timer expiry (empty for segmented sends, which are never blindly
    /// retransmitted).
    AwaitingResponse { request_apdu: Vec<u8> },
    Sending(SegmentedSend),
    Reassembling(SegmentedReceive),
}

struct ClientTransaction {
    service_choice: u8,
    destination: BacnetAddress,
    reply: Option<Completion>,
    deadline: Instant,
    retries_left: u8,
    state: TxState,
}

impl std::fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("service_choice", &self.service_choice)
            .field("retries_left", &self.retries_left)
            .field("state", &self.state)
            .finish()
    }
}

/// The client transaction state machine: invoke-id allocation per peer,
/// retry of unsegmented requests, the segmentation protocol in both
/// directions, and completion delivery.
#[derive(Debug)]
pub struct ClientTsm {
    apdu_timeout: Duration,
    segment_timeout: Duration,
    retries: u8,
    proposed_window_size: u8,
    next_invoke: HashMap<BacnetAddress, u8>,
    transactions: HashMap<(BacnetAddress, u8), ClientTransaction>,
}

impl ClientTsm {
    pub fn new(
        apdu_timeout: Duration,
        segment_timeout: Duration,
        retries: u8,
        proposed_window_size: u8,
    ) -> Self {
        Self {
            apdu_timeout,
            segment_timeout,
            retries,
            proposed_window_size: proposed_window_size.max(1),
            next_invoke: HashMap::new(),
            transactions: HashMap::new(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.transactions.len()
    }

    /// Allocate the next free invoke id toward a destination; monotonic,
    /// skipping ids still in flight.
    fn allocate_invoke_id(&mut self, destination: &BacnetAddress) -> Option<u8> {
        let counter = self.next_invoke.entry(destination.clone()).or_insert(0);
        for _ in 0..=u8::MAX as usize {
            let candidate = *counter;
            *counter = counter.wrapping_add(1);
            if !self
                .transactions
                .contains_key(&(destination.clone(), candidate))
            {
                return Some(candidate);
            }
        }
        None
    }

    /// Begin a confirmed request. `request_apdu` is a complete
    /// unsegmented Confirmed-Request APDU whose invoke id is rewritten
    /// here; `peer_max_apdu` bounds each transmitted APDU. Returns the
    /// frames to transmit now.
    pub fn start(
        &mut self,
        now: Instant,
        destination: BacnetAddress,
        request_apdu: Vec<u8>,
        peer_max_apdu: usize,
        peer_can_segment: bool,
        reply: Completion,
    ) -> Vec<Frame> {
        let mut r = Reader::new(&request_apdu);
        let header = match ConfirmedRequestHeader::decode(&mut r) {
            Ok(header) => header,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return Vec::new();
            }
        };
        let payload_start = r.position();

        let Some(invoke_id) = self.allocate_invoke_id(&destination) else {
            let _ = reply.send(Err(AppError::TooManyPending));
            return Vec::new();
        };

        if request_apdu.len() <= peer_max_apdu {
            let mut apdu = request_apdu;
            // Invoke id sits at offset 2 of an unsegmented header.
            apdu[2] = invoke_id;
            let frame = Frame {
                destination: destination.clone(),
                apdu: apdu.clone(),
                expecting_reply: true,
            };
            self.transactions.insert(
                (destination.clone(), invoke_id),
                ClientTransaction {
                    service_choice: header.service_choice,
                    destination,
                    reply: Some(reply),
                    deadline: now + self.apdu_timeout,
                    retries_left: self.retries,
                    state: TxState::AwaitingResponse { request_apdu: apdu },
                },
            );
            return vec![frame];
        }

        if !peer_can_segment {
            let _ = reply.send(Err(AppError::RemoteAbort {
                reason: AbortReason::SegmentationNotSupported,
                server: false,
            }));
            return Vec::new();
        }

        let payload = request_apdu[payload_start..].to_vec();
        let segment_len = segment_capacity(peer_max_apdu);
        let segment_count = payload.len().div_ceil(segment_len);
        if segment_count > usize::from(u8::MAX) + 1 {
            let _ = reply.send(Err(AppError::RemoteAbort {
                reason: AbortReason::ApduTooLong,
                server: false,
            }));
            return Vec::new();
        }

        let mut send = SegmentedSend {
            header: ConfirmedRequestHeader {
                invoke_id,
                ..header
            },
            payload,
            segment_len,
            segment_count,
            window_start: 0,
            window: self.proposed_window_size,
        };
        let frames = emit_window(&destination, &mut send);

        self.transactions.insert(
            (destination.clone(), invoke_id),
            ClientTransaction {
                service_choice: header.service_choice,
                destination,
                reply: Some(reply),
                deadline: now + self.segment_timeout,
                retries_left: 0,
                state: TxState::Sending(send),
            },
        );
        frames
    }

    /// Offer a response-class APDU to the TSM. Returns `true` when it was
    /// consumed, along with any frames to transmit (segment acks).
    pub fn handle_apdu(
        &mut self,
        now: Instant,
        source: &BacnetAddress,
        apdu: &[u8],
    ) -> (bool, Vec<Frame>) {
        let Some(first) = apdu.first() else {
            return (false, Vec::new());
        };
        match ApduType::of_first_byte(*first) {
            Some(ApduType::SimpleAck) => {
                let mut r = Reader::new(apdu);
                let Ok(ack) = SimpleAck::decode(&mut r) else {
                    return (true, Vec::new());
                };
                self.complete(source, ack.invoke_id, Ok(ConfirmedResult::SimpleAck));
                (true, Vec::new())
            }
            Some(ApduType::ComplexAck) => {
                let mut r = Reader::new(apdu);
                let Ok(header) = ComplexAckHeader::decode(&mut r) else {
                    return (true, Vec::new());
                };
                let payload = r.rest().to_vec();
                let frames = self.handle_complex_ack(now, source, header, payload);
                (true, frames)
            }
            Some(ApduType::SegmentAck) => {
                let mut r = Reader::new(apdu);
                let Ok(ack) = SegmentAck::decode(&mut r) else {
                    return (true, Vec::new());
                };
                if !ack.sent_by_server {
                    // Acknowledgment of a server response; not ours.
                    return (false, Vec::new());
                }
                let frames = self.handle_segment_ack(now, source, ack);
                (true, frames)
            }
            Some(ApduType::Error) => {
                let mut r = Reader::new(apdu);
                if let Ok(error) = BacnetError::decode(&mut r) {
                    self.complete(
                        source,
                        error.invoke_id,
                        Err(AppError::from_error_pdu(error.error_class, error.error_code)),
                    );
                }
                (true, Vec::new())
            }
            Some(ApduType::Reject) => {
                let mut r = Reader::new(apdu);
                if let Ok(reject) = RejectPdu::decode(&mut r) {
                    self.complete(
                        source,
                        reject.invoke_id,
                        Err(AppError::RemoteReject {
                            reason: RejectReason::from_u8(reject.reason),
                        }),
                    );
                }
                (true, Vec::new())
            }
            Some(ApduType::Abort) => {
                let mut r = Reader::new(apdu);
                if let Ok(abort) = AbortPdu::decode(&mut r) {
                    // An abort also kills any in-progress segmentation.
                    self.complete(
                        source,
                        abort.invoke_id,
                        Err(AppError::RemoteAbort {
                            reason: AbortReason::from_u8(abort.reason),
                            server: abort.server,
                        }),
                    );
                }
                (true, Vec::new())
            }
            _ => (false, Vec::new()),
        }
    }

    fn handle_complex_ack(
        &mut self,
        now: Instant,
        source: &BacnetAddress,
        header: ComplexAckHeader,
        payload: Vec<u8>,
    ) -> Vec<Frame> {
        let key = (source.clone(), header.invoke_id);
        let Some(txn) = self.transactions.get_mut(&key) else {
            // Duplicate or stray response: silently discard.
            return Vec::new();
        };
        if txn.service_choice != header.service_choice {
            return Vec::new();
        }

        if !header.segmented {
            self.complete(source, header.invoke_id, Ok(ConfirmedResult::ComplexAck(payload)));
            return Vec::new();
        }

        let seq = header.sequence_number.unwrap_or(0);
        match &mut txn.state {
            TxState::Reassembling(receive) => {
                if seq == receive.last_seq {
                    // Duplicate segment: re-acknowledge.
                    return vec![segment_ack_frame(
                        txn.destination.clone(),
                        header.invoke_id,
                        false,
                        receive.last_seq,
                        receive.window,
                    )];
                }
                if seq != receive.last_seq.wrapping_add(1) {
                    return vec![segment_ack_frame(
                        txn.destination.clone(),
                        header.invoke_id,
                        true,
                        receive.last_seq,
                        receive.window,
                    )];
                }
                receive.payload.extend_from_slice(&payload);
                receive.last_seq = seq;
                txn.deadline = now + self.segment_timeout;
                let ack = segment_ack_frame(
                    txn.destination.clone(),
                    header.invoke_id,
                    false,
                    seq,
                    receive.window,
                );
                if header.more_follows {
                    vec![ack]
                } else {
                    let assembled = std::mem::take(&mut receive.payload);
                    self.complete(
                        source,
                        header.invoke_id,
                        Ok(ConfirmedResult::ComplexAck(assembled)),
                    );
                    vec![ack]
                }
            }
            _ => {
                // First segment of a segmented response.
                if seq != 0 {
                    return vec![segment_ack_frame(
                        txn.destination.clone(),
                        header.invoke_id,
                        true,
                        0,
                        self.proposed_window_size,
                    )];
                }
                let window = header
                    .proposed_window_size
                    .unwrap_or(self.proposed_window_size)
                    .max(1);
                let ack = segment_ack_frame(
                    txn.destination.clone(),
                    header.invoke_id,
                    false,
                    0,
                    window,
                );
                if header.more_follows {
                    txn.state = TxState::Reassembling(SegmentedReceive {
                        payload,
                        last_seq: 0,
                        window,
                    });
                    txn.deadline = now + self.segment_timeout;
                    vec![ack]
                } else {
                    self.complete(
                        source,
                        header.invoke_id,
                        Ok(ConfirmedResult::ComplexAck(payload)),
                    );
                    vec![ack]
                }
            }
        }
    }

    fn handle_segment_ack(
        &mut self,
        now: Instant,
        source: &BacnetAddress,
        ack: SegmentAck,
    ) -> Vec<Frame> {
        let key = (source.clone(), ack.invoke_id);
        let Some(txn) = self.transactions.get_mut(&key) else {
            return Vec::new();
        };
        let TxState::Sending(send) = &mut txn.state else {
            return Vec::new();
        };

        // Window arithmetic is modulo 256; resolve the acknowledged
        // sequence number against the current window.
        let window_len = (send.segment_count - send.window_start).min(send.window as usize);
        let acked_offset = ack
            .sequence_number
            .wrapping_sub(send.window_start as u8) as usize;

        if ack.negative_ack {
            // Retransmit from the first unacknowledged segment.
            if acked_offset < window_len {
                send.window_start += acked_offset + 1;
            }
            txn.deadline = now + self.segment_timeout;
            let destination = txn.destination.clone();
            let TxState::Sending(send) = &mut txn.state else {
                unreachable!();
            };
            return emit_window(&destination, send);
        }

        if acked_offset >= window_len {
            return Vec::new();
        }
        send.window_start += acked_offset + 1;
        send.window = send.window.min(ack.actual_window_size.max(1));

        if send.window_start >= send.segment_count {
            // Everything transmitted and acknowledged; wait for the
            // substantive response.
            txn.state = TxState::AwaitingResponse {
                request_apdu: Vec::new(),
            };
            txn.deadline = now + self.apdu_timeout;
            return Vec::new();
        }

        txn.deadline = now + self.segment_timeout;
        let destination = txn.destination.clone();
        let TxState::Sending(send) = &mut txn.state else {
            unreachable!();
        };
        emit_window(&destination, send)
    }

    /// Drive retry timers; returns retransmissions.
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut expired = Vec::new();
        for (key, txn) in self.transactions.iter_mut() {
            if now < txn.deadline {
                continue;
            }
            match &txn.state {
                TxState::AwaitingResponse { request_apdu }
                    if txn.retries_left > 0 && !request_apdu.is_empty() =>
                {
                    txn.retries_left -= 1;
                    txn.deadline = now + self.apdu_timeout;
                    frames.push(Frame {
                        destination: txn.destination.clone(),
                        apdu: request_apdu.clone(),
                        expecting_reply: true,
                    });
                }
                _ => expired.push(key.clone()),
            }
        }
        for key in expired {
            if let Some(mut txn) = self.transactions.remove(&key) {
                if let Some(reply) = txn.reply.take() {
                    let _ = reply.send(Err(AppError::Timeout));
                }
            }
        }
        frames
    }

    /// Abandon every outstanding transaction (shutdown).
    pub fn cancel_all(&mut self) {
        for (_, mut txn) in self.transactions.drain() {
            if let Some(reply) = txn.reply.take() {
                let _ = reply.send(Err(AppError::Cancelled));
            }
        }
    }

    fn complete(
        &mut self,
        source: &BacnetAddress,
        invoke_id: u8,
        result: Result<ConfirmedResult, AppError>,
    ) {
        if let Some(mut txn) = self.transactions.remove(&(source.clone(), invoke_id)) {
            if let Some(reply) = txn.reply.take() {
                let _ = reply.send(result);
            }
        }
    }
}

fn segment_ack_frame(
    destination: BacnetAddress,
    invoke_id: u8,
    negative: bool,
    sequence_number: u8,
    window: u8,
) -> Frame {
    let mut buf = [0u8; 8];
    let mut w = Writer::new(&mut buf);
    SegmentAck {
        negative_ack: negative,
        sent_by_server: false,
        invoke_id,
        sequence_number,
        actual_window_size: window,
    }
    .encode(&mut w)
    .expect("segment ack fits");
    Frame {
        destination,
        apdu: w.as_written().to_vec(),
        expecting_reply: false,
    }
}

/// Emit every segment of the current window.
fn emit_window(destination: &BacnetAddress, send: &mut SegmentedSend) -> Vec<Frame> {
    let end = (send.window_start + send.window as usize).min(send.segment_count);
    let mut frames = Vec::with_capacity(end - send.window_start);
    for index in send.window_start..end {
        let start = index * send.segment_len;
        let stop = ((index + 1) * send.segment_len).min(send.payload.len());
        let chunk = &send.payload[start..stop];
        let header = ConfirmedRequestHeader {
            segmented: true,
            more_follows: index + 1 < send.segment_count,
            sequence_number: Some(index as u8),
            proposed_window_size: Some(send.window),
            ..send.header
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
            destination: destination.clone(),
            apdu: buf,
            expecting_reply: true,
        });
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::{ClientTsm, ConfirmedResult};
    use crate::error::AppError;
    use bacnode_core::apdu::{ComplexAckHeader, ConfirmedRequestHeader, SegmentAck, SimpleAck};
    use bacnode_core::encoding::writer::Writer;
    use bacnode_core::types::BacnetAddress;
    use tokio::sync::oneshot;
    use tokio::time::{Duration, Instant};

    fn tsm() -> ClientTsm {
        ClientTsm::new(
            Duration::from_secs(3),
            Duration::from_millis(1500),
            3,
            4,
        )
    }

    fn peer() -> BacnetAddress {
        BacnetAddress::local(vec![127, 0, 0, 1, 0xBA, 0xC0])
    }

    fn request_apdu(service_choice: u8, payload_len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; 16 + payload_len];
        let len = {
            let mut w = Writer::new(&mut buf);
            ConfirmedRequestHeader::simple(0, service_choice)
                .encode(&mut w)
                .unwrap();
            w.write_all(&vec![0xAB; payload_len]).unwrap();
            w.as_written().len()
        };
        buf.truncate(len);
        buf
    }

    fn simple_ack(invoke_id: u8, service_choice: u8) -> Vec<u8> {
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
    fn invoke_ids_unique_per_destination() {
        let mut tsm = tsm();
        let now = Instant::now();
        let mut ids = std::collections::HashSet::new();
        let mut replies = Vec::new();
        for _ in 0..50 {
            let (tx, rx) = oneshot::channel();
            let frames = tsm.start(now, peer(), request_apdu(0x0C, 4), 1476, true, tx);
            ids.insert(frames[0].apdu[2]);
            replies.push(rx);
        }
        assert_eq!(ids.len(), 50);
        assert_eq!(tsm.outstanding(), 50);
    }

    #[test]
    fn exhausting_invoke_ids_fails_cleanly() {
        let mut tsm = tsm();
        let now = Instant::now();
        let mut replies = Vec::new();
        for _ in 0..256 {
            let (tx, rx) = oneshot::channel();
            let frames = tsm.start(now, peer(), request_apdu(0x0C, 4), 1476, true, tx);
            assert_eq!(frames.len(), 1);
            replies.push(rx);
        }
        let (tx, mut rx) = oneshot::channel();
        let frames = tsm.start(now, peer(), request_apdu(0x0C, 4), 1476, true, tx);
        assert!(frames.is_empty());
        assert!(matches!(rx.try_recv(), Ok(Err(AppError::TooManyPending))));
    }

    #[test]
    fn simple_ack_completes() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (tx, mut rx) = oneshot::channel();
        let frames = tsm.start(now, peer(), request_apdu(0x0F, 4), 1476, true, tx);
        let invoke_id = frames[0].apdu[2];

        let (handled, _) = tsm.handle_apdu(now, &peer(), &simple_ack(invoke_id, 0x0F));
        assert!(handled);
        assert!(matches!(rx.try_recv(), Ok(Ok(ConfirmedResult::SimpleAck))));
        assert_eq!(tsm.outstanding(), 0);

        // A duplicate ack is silently discarded.
        let (handled, frames) = tsm.handle_apdu(now, &peer(), &simple_ack(invoke_id, 0x0F));
        assert!(handled);
        assert!(frames.is_empty());
    }

    #[test]
    fn retry_then_timeout() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (tx, mut rx) = oneshot::channel();
        let frames = tsm.start(now, peer(), request_apdu(0x0C, 4), 1476, true, tx);
        let original = frames[0].apdu.clone();

        let mut at = now;
        for _ in 0..3 {
            at += Duration::from_secs(4);
            let retransmits = tsm.tick(at);
            assert_eq!(retransmits.len(), 1);
            // Retransmission is byte-identical.
            assert_eq!(retransmits[0].apdu, original);
        }
        at += Duration::from_secs(4);
        assert!(tsm.tick(at).is_empty());
        assert!(matches!(rx.try_recv(), Ok(Err(AppError::Timeout))));
        assert_eq!(tsm.outstanding(), 0);
    }

    #[test]
    fn segmented_send_windows_advance() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (tx, _rx) = oneshot::channel();
        // 480-octet peer budget, 2000-octet payload: 5 segments.
        let frames = tsm.start(now, peer(), request_apdu(0x0F, 2000), 480, true, tx);
        assert_eq!(frames.len(), 4);
        let invoke_id = frames[0].apdu[2];
        // First segment flags segmented + more-follows.
        assert_eq!(frames[0].apdu[0] & 0x0C, 0x0C);

        let ack = SegmentAck {
            negative_ack: false,
            sent_by_server: true,
            invoke_id,
            sequence_number: 3,
            actual_window_size: 4,
        };
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        ack.encode(&mut w).unwrap();
        let (handled, next) = tsm.handle_apdu(now, &peer(), w.as_written());
        assert!(handled);
        assert_eq!(next.len(), 1);
        // Final segment clears more-follows.
        assert_eq!(next[0].apdu[0] & 0x04, 0);
    }

    #[test]
    fn segmented_response_reassembles() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (tx, mut rx) = oneshot::channel();
        let frames = tsm.start(now, peer(), request_apdu(0x0C, 4), 1476, true, tx);
        let invoke_id = frames[0].apdu[2];

        let mut sent = Vec::new();
        for seq in 0..3u8 {
            let mut buf = [0u8; 64];
            let len = {
                let mut w = Writer::new(&mut buf);
                ComplexAckHeader {
                    segmented: true,
                    more_follows: seq < 2,
                    invoke_id,
                    sequence_number: Some(seq),
                    proposed_window_size: Some(4),
                    service_choice: 0x0C,
                }
                .encode(&mut w)
                .unwrap();
                w.write_all(&[seq; 10]).unwrap();
                w.as_written().len()
            };
            sent.extend_from_slice(&[seq; 10]);
            let (handled, acks) = tsm.handle_apdu(now, &peer(), &buf[..len]);
            assert!(handled);
            assert_eq!(acks.len(), 1);
        }

        match rx.try_recv() {
            Ok(Ok(ConfirmedResult::ComplexAck(payload))) => assert_eq!(payload, sent),
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[test]
    fn out_of_order_segment_gets_negative_ack() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (tx, _rx) = oneshot::channel();
        let frames = tsm.start(now, peer(), request_apdu(0x0C, 4), 1476, true, tx);
        let invoke_id = frames[0].apdu[2];

        for (seq, expect_negative) in [(0u8, false), (2u8, true)] {
            let mut buf = [0u8; 64];
            let len = {
                let mut w = Writer::new(&mut buf);
                ComplexAckHeader {
                    segmented: true,
                    more_follows: true,
                    invoke_id,
                    sequence_number: Some(seq),
                    proposed_window_size: Some(4),
                    service_choice: 0x0C,
                }
                .encode(&mut w)
                .unwrap();
                w.write_all(&[0; 4]).unwrap();
                w.as_written().len()
            };
            let (_, acks) = tsm.handle_apdu(now, &peer(), &buf[..len]);
            assert_eq!(acks.len(), 1);
            // Negative-ack flag of the segment ack.
            assert_eq!(acks[0].apdu[0] & 0x02 != 0, expect_negative);
        }
    }

    #[test]
    fn cancel_all_drains_transactions() {
        let mut tsm = tsm();
        let now = Instant::now();
        let (tx, mut rx) = oneshot::channel();
        tsm.start(now, peer(), request_apdu(0x0C, 4), 1476, true, tx);
        tsm.cancel_all();
        assert_eq!(tsm.outstanding(), 0);
        assert!(matches!(rx.try_recv(), Ok(Err(AppError::Cancelled))));
    }
}
