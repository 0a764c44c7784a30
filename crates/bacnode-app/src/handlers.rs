//! Default service handlers: decode the service payload, operate on the
//! object database and engines, and produce the response APDU the server
//! TSM will frame. Malformed service data is answered with a Reject per
//! the error taxonomy; handler failures surface as typed service errors.

use crate::config::DeviceConfig;
use crate::cov::{CovDispatch, CovManager};
use crate::error::ServiceError;
use crate::object::{factory, FileStorage, Object, ObjectDatabase};
use crate::tsm::{ServerDispatch, ServerResponse};
use bacnode_core::apdu::SimpleAck;
use bacnode_core::encoding::{reader::Reader, writer::Writer};
use bacnode_core::services::acknowledge_alarm::{
    AcknowledgeAlarmRequest, SERVICE_ACKNOWLEDGE_ALARM,
};
use bacnode_core::services::alarm_summary::{
    AlarmSummaryItem, GetAlarmSummaryAck, SERVICE_GET_ALARM_SUMMARY,
};
use bacnode_core::services::atomic_read_file::{
    AtomicReadFileAck, AtomicReadFileRequest, ReadFileAccess, ReadFileAckAccess,
    SERVICE_ATOMIC_READ_FILE,
};
use bacnode_core::services::atomic_write_file::{
    AtomicWriteFileAck, AtomicWriteFileRequest, WriteFileAccess, SERVICE_ATOMIC_WRITE_FILE,
};
use bacnode_core::services::cov_notification::{
    CovNotification, SERVICE_CONFIRMED_COV_NOTIFICATION,
};
use bacnode_core::services::device_management::{
    DeviceCommunicationControlRequest, ReinitializeDeviceRequest,
    SERVICE_DEVICE_COMMUNICATION_CONTROL, SERVICE_REINITIALIZE_DEVICE,
};
use bacnode_core::services::enrollment_summary::{
    EnrollmentSummaryItem, GetEnrollmentSummaryAck, SERVICE_GET_ENROLLMENT_SUMMARY,
};
use bacnode_core::services::event_information::{
    EventSummaryItem, GetEventInformationAck, GetEventInformationRequest,
    SERVICE_GET_EVENT_INFORMATION,
};
use bacnode_core::services::event_notification::{
    EventNotification, SERVICE_CONFIRMED_EVENT_NOTIFICATION,
};
use bacnode_core::services::list_element::{
    ListElementRequest, SERVICE_ADD_LIST_ELEMENT, SERVICE_REMOVE_LIST_ELEMENT,
};
use bacnode_core::services::object_management::{
    CreateObjectAck, CreateObjectRequest, DeleteObjectRequest, ObjectSpecifier,
    SERVICE_CREATE_OBJECT, SERVICE_DELETE_OBJECT,
};
use bacnode_core::services::private_transfer::{
    PrivateTransferAck, PrivateTransferRequest, SERVICE_CONFIRMED_PRIVATE_TRANSFER,
};
use bacnode_core::services::read_property::{ReadPropertyAck, ReadPropertyRequest, SERVICE_READ_PROPERTY};
use bacnode_core::services::read_property_multiple::{
    PropertyAccessResult, ReadAccessResult, ReadPropertyMultipleAck, ReadPropertyMultipleRequest,
    SERVICE_READ_PROPERTY_MULTIPLE,
};
use bacnode_core::services::read_range::{
    RangeSpecifier, ReadRangeAck, ReadRangeRequest, ResultFlags, SERVICE_READ_RANGE,
};
use bacnode_core::services::subscribe_cov::{SubscribeCovRequest, SERVICE_SUBSCRIBE_COV};
use bacnode_core::services::subscribe_cov_property::{
    SubscribeCovPropertyRequest, SERVICE_SUBSCRIBE_COV_PROPERTY,
};
use bacnode_core::services::text_message::{TextMessageRequest, SERVICE_CONFIRMED_TEXT_MESSAGE};
use bacnode_core::services::timestamp::TimeStamp;
use bacnode_core::services::write_property::{WritePropertyRequest, SERVICE_WRITE_PROPERTY};
use bacnode_core::services::write_property_multiple::{
    WritePropertyMultipleRequest, SERVICE_WRITE_PROPERTY_MULTIPLE,
};
use bacnode_core::types::{
    BacnetAddress, EnableDisable, ErrorClass, ErrorCode, EventState, EventType, NotifyType,
    ObjectId, ObjectType, PropertyId, PropertyValue, RejectReason, ReinitializedState,
};
use bacnode_core::{DecodeError, EncodeError};
use tokio::time::{Duration, Instant};

/// Device-communication-control gate, consulted on both directions.
#[derive(Debug)]
pub struct DccState {
    state: EnableDisable,
    restore_at: Option<Instant>,
}

impl DccState {
    pub fn new() -> Self {
        Self {
            state: EnableDisable::Enable,
            restore_at: None,
        }
    }

    pub const fn state(&self) -> EnableDisable {
        self.state
    }

    pub fn set(&mut self, state: EnableDisable, duration: Option<Duration>, now: Instant) {
        self.state = state;
        self.restore_at = match state {
            EnableDisable::Enable => None,
            _ => duration.map(|d| now + d),
        };
    }

    /// While DISABLE is in force, only DCC itself and ReinitializeDevice
    /// are served.
    pub fn allows_inbound_confirmed(&self, service_choice: u8) -> bool {
        match self.state {
            EnableDisable::Disable => matches!(
                service_choice,
                SERVICE_DEVICE_COMMUNICATION_CONTROL | SERVICE_REINITIALIZE_DEVICE
            ),
            _ => true,
        }
    }

    pub fn allows_inbound_unconfirmed(&self) -> bool {
        self.state != EnableDisable::Disable
    }

    /// Unsolicited origination (COV/event notifications, client
    /// requests); Who-Is/Who-Has replies stay allowed under
    /// DISABLE_INITIATION.
    pub fn allows_initiation(&self) -> bool {
        self.state == EnableDisable::Enable
    }

    pub fn allows_discovery_reply(&self) -> bool {
        self.state != EnableDisable::Disable
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(at) = self.restore_at {
            if now >= at {
                self.state = EnableDisable::Enable;
                self.restore_at = None;
            }
        }
    }
}

impl Default for DccState {
    fn default() -> Self {
        Self::new()
    }
}

/// Out-of-band consequences of a handled request, surfaced to the
/// application loop.
#[derive(Debug)]
pub enum Notice {
    /// An inbound (confirmed or unconfirmed) COV notification for a local
    /// subscriber process.
    CovNotification {
        source: BacnetAddress,
        process_id: u32,
        monitored_object: ObjectId,
        values_len: usize,
    },
    /// An inbound alarm/event notification.
    EventNotification {
        source: BacnetAddress,
        notification: EventNotification,
    },
    /// A text message addressed to us.
    TextMessage { source: BacnetAddress, message: String },
    /// ReinitializeDevice was accepted.
    Reinitialize(ReinitializedState),
}

/// Everything a confirmed-service handler produced.
pub struct Handled {
    pub response: Result<ServerResponse, ServiceError>,
    pub cov_dispatches: Vec<CovDispatch>,
    pub notices: Vec<Notice>,
}

impl Handled {
    fn response(response: Result<ServerResponse, ServiceError>) -> Self {
        Self {
            response,
            cov_dispatches: Vec::new(),
            notices: Vec::new(),
        }
    }
}

pub struct HandlerContext<'a> {
    pub db: &'a mut ObjectDatabase,
    pub cov: &'a mut CovManager,
    pub dcc: &'a mut DccState,
    pub config: &'a DeviceConfig,
    pub now: Instant,
}

/// Dispatch one reassembled confirmed request to its handler.
pub fn dispatch_confirmed(ctx: &mut HandlerContext<'_>, request: &ServerDispatch) -> Handled {
    let result = match request.service_choice {
        SERVICE_READ_PROPERTY => read_property(ctx, request),
        SERVICE_WRITE_PROPERTY => write_property(ctx, request),
        SERVICE_READ_PROPERTY_MULTIPLE => read_property_multiple(ctx, request),
        SERVICE_WRITE_PROPERTY_MULTIPLE => write_property_multiple(ctx, request),
        SERVICE_READ_RANGE => read_range(ctx, request),
        SERVICE_SUBSCRIBE_COV => return subscribe_cov(ctx, request),
        SERVICE_SUBSCRIBE_COV_PROPERTY => return subscribe_cov_property(ctx, request),
        SERVICE_CREATE_OBJECT => create_object(ctx, request),
        SERVICE_DELETE_OBJECT => delete_object(ctx, request),
        SERVICE_ADD_LIST_ELEMENT => list_element(ctx, request, true),
        SERVICE_REMOVE_LIST_ELEMENT => list_element(ctx, request, false),
        SERVICE_ATOMIC_READ_FILE => atomic_read_file(ctx, request),
        SERVICE_ATOMIC_WRITE_FILE => atomic_write_file(ctx, request),
        SERVICE_DEVICE_COMMUNICATION_CONTROL => return device_communication_control(ctx, request),
        SERVICE_REINITIALIZE_DEVICE => return reinitialize_device(ctx, request),
        SERVICE_ACKNOWLEDGE_ALARM => acknowledge_alarm(ctx, request),
        SERVICE_GET_ALARM_SUMMARY => get_alarm_summary(ctx, request),
        SERVICE_GET_ENROLLMENT_SUMMARY => get_enrollment_summary(ctx, request),
        SERVICE_GET_EVENT_INFORMATION => get_event_information(ctx, request),
        SERVICE_CONFIRMED_COV_NOTIFICATION => return confirmed_cov_notification(request),
        SERVICE_CONFIRMED_EVENT_NOTIFICATION => return confirmed_event_notification(request),
        SERVICE_CONFIRMED_PRIVATE_TRANSFER => confirmed_private_transfer(request),
        SERVICE_CONFIRMED_TEXT_MESSAGE => return confirmed_text_message(request),
        _ => Err(ServiceError::Reject(RejectReason::UnrecognizedService)),
    };
    Handled::response(result)
}

/// Malformed service data answers with a Reject; the decode taxonomy
/// picks the reason.
fn decode_err(error: DecodeError) -> ServiceError {
    ServiceError::Reject(match error {
        DecodeError::Truncated { .. } => RejectReason::MissingRequiredParameter,
        DecodeError::MalformedTag => RejectReason::InvalidTag,
        DecodeError::InvalidValue => RejectReason::ParameterOutOfRange,
        _ => RejectReason::InvalidParameterDataType,
    })
}

fn encode_err(_: EncodeError) -> ServiceError {
    ServiceError::Error(ErrorClass::Resources, ErrorCode::NoSpaceToWriteProperty)
}

/// Encode a response APDU, growing the buffer until it fits.
fn encode_response<F>(mut encode: F) -> Result<ServerResponse, ServiceError>
where
    F: FnMut(&mut Writer<'_>) -> Result<(), EncodeError>,
{
    for size in [512usize, 2048, 8192, 32_768, 131_072] {
        let mut buf = vec![0u8; size];
        let mut w = Writer::new(&mut buf);
        match encode(&mut w) {
            Ok(()) => {
                let len = w.as_written().len();
                buf.truncate(len);
                return Ok(ServerResponse::Apdu(buf));
            }
            Err(EncodeError::BufferTooSmall { .. }) => continue,
            Err(e) => return Err(encode_err(e)),
        }
    }
    Err(ServiceError::Abort(
        bacnode_core::types::AbortReason::BufferOverflow,
    ))
}

fn simple_ack(request: &ServerDispatch) -> Result<ServerResponse, ServiceError> {
    let mut buf = [0u8; 4];
    let mut w = Writer::new(&mut buf);
    SimpleAck {
        invoke_id: request.invoke_id,
        service_choice: request.service_choice,
    }
    .encode(&mut w)
    .map_err(encode_err)?;
    Ok(ServerResponse::Apdu(w.as_written().to_vec()))
}

fn read_property(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req =
        ReadPropertyRequest::decode_after_header(&mut r, request.invoke_id).map_err(decode_err)?;
    let value = ctx.db.read(req.object_id, req.property_id, req.array_index)?;
    encode_response(|w| {
        ReadPropertyAck::encode_response(
            w,
            request.invoke_id,
            ctx.db.resolve(req.object_id),
            req.property_id,
            req.array_index,
            &value,
        )
    })
}

fn write_property(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req =
        WritePropertyRequest::decode_after_header(&mut r, request.invoke_id).map_err(decode_err)?;
    ctx.db.write(
        req.object_id,
        req.property_id,
        req.array_index,
        PropertyValue::from_data_value(&req.value),
        req.priority,
    )?;
    simple_ack(request)
}

/// Expand the ALL/REQUIRED/OPTIONAL wildcards against an object.
fn expand_wildcard(object: &Object, property: PropertyId) -> Vec<PropertyId> {
    const IDENTIFIERS: [PropertyId; 3] = [
        PropertyId::ObjectIdentifier,
        PropertyId::ObjectName,
        PropertyId::ObjectType,
    ];
    let required: Vec<PropertyId> = IDENTIFIERS
        .into_iter()
        .chain(
            [
                PropertyId::PresentValue,
                PropertyId::StatusFlags,
                PropertyId::EventState,
                PropertyId::OutOfService,
                PropertyId::Units,
            ]
            .into_iter()
            .filter(|p| object.contains(*p)),
        )
        .collect();
    match property {
        PropertyId::All => IDENTIFIERS
            .into_iter()
            .chain(object.property_list())
            .collect(),
        PropertyId::Required => required,
        PropertyId::Optional => object
            .property_list()
            .into_iter()
            .filter(|p| !required.contains(p))
            .collect(),
        other => vec![other],
    }
}

fn read_property_multiple(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req = ReadPropertyMultipleRequest::decode_after_header(&mut r, request.invoke_id)
        .map_err(decode_err)?;

    let mut results = Vec::new();
    for spec in &req.specifications {
        let object_id = ctx.db.resolve(spec.object_id);
        let mut object_results = Vec::new();
        for reference in &spec.property_references {
            let expanded = match ctx.db.get(object_id) {
                Some(object) => expand_wildcard(object, reference.property_id),
                None => vec![reference.property_id],
            };
            for property in expanded {
                // Partial failure stays per-property.
                let result = match ctx.db.read(object_id, property, reference.array_index) {
                    Ok(value) => Ok(vec![value]),
                    Err(ServiceError::Error(class, code)) => {
                        Err((class.to_u32(), code.to_u32()))
                    }
                    Err(_) => Err((
                        ErrorClass::Property.to_u32(),
                        ErrorCode::UnknownProperty.to_u32(),
                    )),
                };
                object_results.push(PropertyAccessResult {
                    property_id: property,
                    array_index: reference.array_index,
                    result,
                });
            }
        }
        results.push(ReadAccessResult {
            object_id,
            results: object_results,
        });
    }

    let ack = ReadPropertyMultipleAck { results };
    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

fn write_property_multiple(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req = WritePropertyMultipleRequest::decode_after_header(&mut r, request.invoke_id)
        .map_err(decode_err)?;

    // No rollback of earlier writes: the first failing element ends the
    // request with its error.
    for spec in &req.specifications {
        for write in &spec.writes {
            ctx.db.write(
                spec.object_id,
                write.property_id,
                write.array_index,
                write.value.clone(),
                write.priority,
            )?;
        }
    }
    simple_ack(request)
}

fn read_range(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req =
        ReadRangeRequest::decode_after_header(&mut r, request.invoke_id).map_err(decode_err)?;

    let value = ctx.db.read(req.object_id, req.property_id, None)?;
    let items = match value {
        PropertyValue::Array(items) | PropertyValue::List(items) => items,
        _ => {
            return Err(ServiceError::Error(
                ErrorClass::Property,
                ErrorCode::PropertyIsNotAList,
            ))
        }
    };

    let total = items.len();
    let (start, count) = match req.range {
        RangeSpecifier::All => (0usize, total),
        RangeSpecifier::ByPosition {
            reference_index,
            count,
        } => position_window(reference_index as usize, count, total),
        // Plain lists have no sequence numbers; positions stand in.
        RangeSpecifier::BySequenceNumber {
            reference_sequence,
            count,
        } => position_window(reference_sequence as usize, count, total),
        RangeSpecifier::ByTime { .. } => (0, 0),
    };

    let selected: Vec<PropertyValue> = items.into_iter().skip(start).take(count).collect();
    let item_count = selected.len() as u32;
    let ack = ReadRangeAck {
        object_id: ctx.db.resolve(req.object_id),
        property_id: req.property_id,
        array_index: req.array_index,
        result_flags: ResultFlags {
            first_item: start == 0 && item_count > 0,
            last_item: start + selected.len() >= total,
            more_items: start + selected.len() < total,
        },
        item_count,
        items: selected,
        first_sequence_number: None,
    };
    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

/// Resolve a 1-based reference index and signed count into a window.
fn position_window(reference: usize, count: i32, total: usize) -> (usize, usize) {
    if reference == 0 || reference > total || count == 0 {
        return (0, 0);
    }
    if count > 0 {
        (reference - 1, count as usize)
    } else {
        let span = count.unsigned_abs() as usize;
        let end = reference;
        let start = end.saturating_sub(span);
        (start, end - start)
    }
}

fn subscribe_cov(ctx: &mut HandlerContext<'_>, request: &ServerDispatch) -> Handled {
    let mut r = Reader::new(&request.payload);
    let req = match SubscribeCovRequest::decode_after_header(&mut r, request.invoke_id) {
        Ok(req) => req,
        Err(e) => return Handled::response(Err(decode_err(e))),
    };
    match ctx
        .cov
        .subscribe(ctx.now, ctx.db, request.source.clone(), &req)
    {
        Ok(dispatches) => Handled {
            response: simple_ack(request),
            cov_dispatches: dispatches,
            notices: Vec::new(),
        },
        Err(e) => Handled::response(Err(e)),
    }
}

fn subscribe_cov_property(ctx: &mut HandlerContext<'_>, request: &ServerDispatch) -> Handled {
    let mut r = Reader::new(&request.payload);
    let req = match SubscribeCovPropertyRequest::decode_after_header(&mut r, request.invoke_id) {
        Ok(req) => req,
        Err(e) => return Handled::response(Err(decode_err(e))),
    };
    match ctx
        .cov
        .subscribe_property(ctx.now, ctx.db, request.source.clone(), &req)
    {
        Ok(dispatches) => Handled {
            response: simple_ack(request),
            cov_dispatches: dispatches,
            notices: Vec::new(),
        },
        Err(e) => Handled::response(Err(e)),
    }
}

fn create_object(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req =
        CreateObjectRequest::decode_after_header(&mut r, request.invoke_id).map_err(decode_err)?;

    let (object_type, instance) = match req.specifier {
        ObjectSpecifier::ObjectId(id) => (id.object_type(), Some(id.instance())),
        ObjectSpecifier::ObjectType(t) => (t, None),
    };
    let instance = instance.unwrap_or_else(|| next_free_instance(ctx.db, object_type));
    let object_id = ObjectId::new(object_type, instance);
    let name = format!("{object_type:?}-{instance}");

    let mut object = match object_type {
        ObjectType::AnalogInput => factory::analog_input(instance, &name),
        ObjectType::AnalogOutput => factory::analog_output(instance, &name),
        ObjectType::AnalogValue => factory::analog_value(instance, &name),
        ObjectType::BinaryInput => factory::binary_input(instance, &name),
        ObjectType::BinaryValue => factory::binary_value(instance, &name),
        ObjectType::MultiStateValue => factory::multi_state_value(instance, &name, 2),
        ObjectType::NotificationClass => factory::notification_class(instance, &name),
        ObjectType::File => factory::file(instance, &name, FileStorage::Stream(Vec::new())),
        ObjectType::EventEnrollment => Object::new(object_id, &name),
        _ => {
            return Err(ServiceError::Error(
                ErrorClass::Object,
                ErrorCode::UnsupportedObjectType,
            ))
        }
    };
    for initial in &req.initial_values {
        object.set(initial.property_id, initial.value.clone());
    }
    ctx.db.add(object)?;

    let ack = CreateObjectAck { object_id };
    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

fn next_free_instance(db: &ObjectDatabase, object_type: ObjectType) -> u32 {
    db.ids_of_type(object_type)
        .iter()
        .map(|id| id.instance())
        .max()
        .map(|max| max + 1)
        .unwrap_or(1)
}

fn delete_object(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req =
        DeleteObjectRequest::decode_after_header(&mut r, request.invoke_id).map_err(decode_err)?;
    ctx.db.remove(req.object_id)?;
    simple_ack(request)
}

fn list_element(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
    add: bool,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req =
        ListElementRequest::decode_after_header(&mut r, request.invoke_id).map_err(decode_err)?;

    let object_id = ctx.db.resolve(req.object_id);
    let object = ctx
        .db
        .get_mut(object_id)
        .ok_or_else(ServiceError::unknown_object)?;
    let current = object
        .get(req.property_id)
        .cloned()
        .ok_or_else(ServiceError::unknown_property)?;
    let PropertyValue::List(mut elements) = current else {
        return Err(ServiceError::Error(
            ErrorClass::Property,
            ErrorCode::PropertyIsNotAList,
        ));
    };

    if add {
        for element in &req.elements {
            if !elements.contains(element) {
                elements.push(element.clone());
            }
        }
    } else {
        for element in &req.elements {
            let before = elements.len();
            elements.retain(|existing| existing != element);
            if elements.len() == before {
                return Err(ServiceError::Error(
                    ErrorClass::Property,
                    ErrorCode::ListElementNotFound,
                ));
            }
        }
    }
    object.set(req.property_id, PropertyValue::List(elements));
    simple_ack(request)
}

fn atomic_read_file(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req =
        AtomicReadFileRequest::decode_after_header(&mut r, request.invoke_id).map_err(decode_err)?;

    let object = ctx
        .db
        .get(req.file_object_id)
        .ok_or_else(ServiceError::unknown_object)?;
    let storage = object.file_storage.as_ref().ok_or(ServiceError::Error(
        ErrorClass::Services,
        ErrorCode::InvalidFileAccessMethod,
    ))?;

    let ack = match (&req.access, storage) {
        (
            ReadFileAccess::Stream {
                file_start_position,
                requested_octet_count,
            },
            FileStorage::Stream(data),
        ) => {
            let start = usize::try_from(*file_start_position).map_err(|_| {
                ServiceError::Error(ErrorClass::Services, ErrorCode::InvalidFileStartPosition)
            })?;
            if start > data.len() {
                return Err(ServiceError::Error(
                    ErrorClass::Services,
                    ErrorCode::InvalidFileStartPosition,
                ));
            }
            let end = (start + *requested_octet_count as usize).min(data.len());
            AtomicReadFileAck {
                end_of_file: end == data.len(),
                access: ReadFileAckAccess::Stream {
                    file_start_position: *file_start_position,
                    file_data: data[start..end].to_vec(),
                },
            }
        }
        (
            ReadFileAccess::Record {
                file_start_record,
                requested_record_count,
            },
            FileStorage::Records(records),
        ) => {
            let start = usize::try_from(*file_start_record).map_err(|_| {
                ServiceError::Error(ErrorClass::Services, ErrorCode::InvalidFileStartPosition)
            })?;
            if start > records.len() {
                return Err(ServiceError::Error(
                    ErrorClass::Services,
                    ErrorCode::InvalidFileStartPosition,
                ));
            }
            let end = (start + *requested_record_count as usize).min(records.len());
            AtomicReadFileAck {
                end_of_file: end == records.len(),
                access: ReadFileAckAccess::Record {
                    file_start_record: *file_start_record,
                    file_record_data: records[start..end].to_vec(),
                },
            }
        }
        _ => {
            return Err(ServiceError::Error(
                ErrorClass::Services,
                ErrorCode::InvalidFileAccessMethod,
            ))
        }
    };
    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

fn atomic_write_file(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req = AtomicWriteFileRequest::decode_after_header(&mut r, request.invoke_id)
        .map_err(decode_err)?;

    let object_id = ctx.db.resolve(req.file_object_id);
    let object = ctx
        .db
        .get_mut(object_id)
        .ok_or_else(ServiceError::unknown_object)?;
    let read_only = object
        .get(PropertyId::ReadOnly)
        .and_then(PropertyValue::as_bool)
        .unwrap_or(false);
    if read_only {
        return Err(ServiceError::Error(
            ErrorClass::Services,
            ErrorCode::FileAccessDenied,
        ));
    }
    let storage = object.file_storage.as_mut().ok_or(ServiceError::Error(
        ErrorClass::Services,
        ErrorCode::InvalidFileAccessMethod,
    ))?;

    let ack = match (req.access, storage) {
        (
            WriteFileAccess::Stream {
                file_start_position,
                file_data,
            },
            FileStorage::Stream(data),
        ) => {
            // Position -1 appends.
            let start = if file_start_position < 0 {
                data.len()
            } else {
                file_start_position as usize
            };
            if start > data.len() {
                return Err(ServiceError::Error(
                    ErrorClass::Services,
                    ErrorCode::InvalidFileStartPosition,
                ));
            }
            let end = start + file_data.len();
            if end > data.len() {
                data.resize(end, 0);
            }
            data[start..end].copy_from_slice(&file_data);
            AtomicWriteFileAck::Stream {
                file_start_position: start as i32,
            }
        }
        (
            WriteFileAccess::Record {
                file_start_record,
                file_record_data,
            },
            FileStorage::Records(records),
        ) => {
            let start = if file_start_record < 0 {
                records.len()
            } else {
                file_start_record as usize
            };
            if start > records.len() {
                return Err(ServiceError::Error(
                    ErrorClass::Services,
                    ErrorCode::InvalidFileStartPosition,
                ));
            }
            for (offset, record) in file_record_data.into_iter().enumerate() {
                let index = start + offset;
                if index < records.len() {
                    records[index] = record;
                } else {
                    records.push(record);
                }
            }
            AtomicWriteFileAck::Record {
                file_start_record: start as i32,
            }
        }
        _ => {
            return Err(ServiceError::Error(
                ErrorClass::Services,
                ErrorCode::InvalidFileAccessMethod,
            ))
        }
    };

    // Refresh the size bookkeeping.
    let (size, record_count) = match object.file_storage.as_ref() {
        Some(FileStorage::Stream(data)) => (data.len() as u32, None),
        Some(FileStorage::Records(records)) => (
            records.iter().map(|r| r.len() as u32).sum(),
            Some(records.len() as u32),
        ),
        None => (0, None),
    };
    object.set(PropertyId::FileSize, PropertyValue::Unsigned(size));
    if let Some(count) = record_count {
        object.set(PropertyId::RecordCount, PropertyValue::Unsigned(count));
    }

    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

fn device_communication_control(ctx: &mut HandlerContext<'_>, request: &ServerDispatch) -> Handled {
    let mut r = Reader::new(&request.payload);
    let req = match DeviceCommunicationControlRequest::decode_after_header(&mut r, request.invoke_id)
    {
        Ok(req) => req,
        Err(e) => return Handled::response(Err(decode_err(e))),
    };
    if let Err(e) = check_password(ctx.config, req.password) {
        return Handled::response(Err(e));
    }
    ctx.dcc.set(
        req.enable_disable,
        req.time_duration_minutes
            .map(|minutes| Duration::from_secs(minutes as u64 * 60)),
        ctx.now,
    );
    log::info!("device communication control: {:?}", req.enable_disable);
    Handled::response(simple_ack(request))
}

fn reinitialize_device(ctx: &mut HandlerContext<'_>, request: &ServerDispatch) -> Handled {
    let mut r = Reader::new(&request.payload);
    let req = match ReinitializeDeviceRequest::decode_after_header(&mut r, request.invoke_id) {
        Ok(req) => req,
        Err(e) => return Handled::response(Err(decode_err(e))),
    };
    if let Err(e) = check_password(ctx.config, req.password) {
        return Handled::response(Err(e));
    }
    Handled {
        response: simple_ack(request),
        cov_dispatches: Vec::new(),
        notices: vec![Notice::Reinitialize(req.state)],
    }
}

fn check_password(config: &DeviceConfig, offered: Option<&str>) -> Result<(), ServiceError> {
    match (&config.password, offered) {
        (None, _) => Ok(()),
        (Some(expected), Some(offered)) if expected == offered => Ok(()),
        (Some(_), _) => Err(ServiceError::Error(
            ErrorClass::Security,
            ErrorCode::PasswordFailure,
        )),
    }
}

fn acknowledge_alarm(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req = AcknowledgeAlarmRequest::decode_after_header(&mut r, request.invoke_id)
        .map_err(decode_err)?;

    let object_id = ctx.db.resolve(req.event_object_id);
    let object = ctx
        .db
        .get_mut(object_id)
        .ok_or_else(ServiceError::unknown_object)?;

    let index = req.event_state_acknowledged.transition_index();
    let mut acked = match object.get(PropertyId::AckedTransitions) {
        Some(PropertyValue::BitString { data, .. }) if !data.is_empty() => data[0],
        _ => 0xE0,
    };
    if acked & (0x80 >> index) != 0 {
        return Err(ServiceError::Error(
            ErrorClass::Services,
            ErrorCode::InvalidTimeStamp,
        ));
    }
    acked |= 0x80 >> index;
    object.set(
        PropertyId::AckedTransitions,
        PropertyValue::BitString {
            unused_bits: 5,
            data: vec![acked],
        },
    );
    log::info!(
        "alarm on {object_id} acknowledged by {}",
        req.acknowledgment_source
    );
    simple_ack(request)
}

fn get_alarm_summary(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut summaries = Vec::new();
    for id in ctx.db.ids().collect::<Vec<_>>() {
        let Some(object) = ctx.db.get(id) else {
            continue;
        };
        let Some(state) = object
            .get(PropertyId::EventState)
            .and_then(PropertyValue::as_u32)
            .and_then(EventState::from_u32)
        else {
            continue;
        };
        if !state.is_alarm() {
            continue;
        }
        summaries.push(AlarmSummaryItem {
            object_id: id,
            alarm_state: state,
            acked_transitions: acked_bits_of(object),
        });
    }
    let ack = GetAlarmSummaryAck { summaries };
    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

fn acked_bits_of(object: &Object) -> [bool; 3] {
    match object.get(PropertyId::AckedTransitions) {
        Some(PropertyValue::BitString { data, .. }) if !data.is_empty() => [
            (data[0] & 0x80) != 0,
            (data[0] & 0x40) != 0,
            (data[0] & 0x20) != 0,
        ],
        _ => [true; 3],
    }
}

fn get_enrollment_summary(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut summaries = Vec::new();
    for id in ctx.db.ids().collect::<Vec<_>>() {
        let Some(object) = ctx.db.get(id) else {
            continue;
        };
        if !object.contains(PropertyId::EventEnable) {
            continue;
        }
        let Some(state) = object
            .get(PropertyId::EventState)
            .and_then(PropertyValue::as_u32)
            .and_then(EventState::from_u32)
        else {
            continue;
        };
        let event_type = object
            .get(PropertyId::EventType)
            .and_then(PropertyValue::as_u32)
            .map(EventType::from_u32)
            .unwrap_or(EventType::OutOfRange);
        let notification_class = object
            .get(PropertyId::NotificationClass)
            .and_then(PropertyValue::as_u32);
        summaries.push(EnrollmentSummaryItem {
            object_id: id,
            event_type,
            event_state: state,
            priority: 255,
            notification_class,
        });
    }
    let ack = GetEnrollmentSummaryAck { summaries };
    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

fn get_event_information(
    ctx: &mut HandlerContext<'_>,
    request: &ServerDispatch,
) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req = GetEventInformationRequest::decode_after_header(&mut r, request.invoke_id)
        .map_err(decode_err)?;

    let mut summaries = Vec::new();
    let mut past_resume_point = req.last_received_object_id.is_none();
    for id in ctx.db.ids().collect::<Vec<_>>() {
        if !past_resume_point {
            if Some(id) == req.last_received_object_id {
                past_resume_point = true;
            }
            continue;
        }
        let Some(object) = ctx.db.get(id) else {
            continue;
        };
        if !object.contains(PropertyId::EventEnable) {
            continue;
        }
        let Some(state) = object
            .get(PropertyId::EventState)
            .and_then(PropertyValue::as_u32)
            .and_then(EventState::from_u32)
        else {
            continue;
        };
        let acked = acked_bits_of(object);
        // Only objects with an active state or an unacknowledged
        // transition are reported.
        if state == EventState::Normal && acked.iter().all(|bit| *bit) {
            continue;
        }
        summaries.push(EventSummaryItem {
            object_id: id,
            event_state: state,
            acked_transitions: acked,
            event_time_stamps: [
                TimeStamp::unspecified(),
                TimeStamp::unspecified(),
                TimeStamp::unspecified(),
            ],
            notify_type: NotifyType::Alarm,
            event_enable: [true; 3],
            event_priorities: [255, 255, 255],
        });
    }
    let ack = GetEventInformationAck {
        summaries,
        more_events: false,
    };
    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

fn confirmed_cov_notification(request: &ServerDispatch) -> Handled {
    let mut r = Reader::new(&request.payload);
    let notification = match CovNotification::decode_after_header(&mut r) {
        Ok(notification) => notification,
        Err(e) => return Handled::response(Err(decode_err(e))),
    };
    Handled {
        response: simple_ack(request),
        cov_dispatches: Vec::new(),
        notices: vec![Notice::CovNotification {
            source: request.source.clone(),
            process_id: notification.subscriber_process_id,
            monitored_object: notification.monitored_object_id,
            values_len: notification.values.len(),
        }],
    }
}

fn confirmed_event_notification(request: &ServerDispatch) -> Handled {
    let mut r = Reader::new(&request.payload);
    let notification = match EventNotification::decode_after_header(&mut r) {
        Ok(notification) => notification,
        Err(e) => return Handled::response(Err(decode_err(e))),
    };
    Handled {
        response: simple_ack(request),
        cov_dispatches: Vec::new(),
        notices: vec![Notice::EventNotification {
            source: request.source.clone(),
            notification,
        }],
    }
}

fn confirmed_private_transfer(request: &ServerDispatch) -> Result<ServerResponse, ServiceError> {
    let mut r = Reader::new(&request.payload);
    let req = PrivateTransferRequest::decode_after_header(&mut r, request.invoke_id)
        .map_err(decode_err)?;
    // Pass-through: acknowledge with an empty result block. Vendors hook
    // in by watching the log or replacing this handler upstream.
    log::debug!(
        "private transfer vendor={} service={}",
        req.vendor_id,
        req.service_number
    );
    let ack = PrivateTransferAck {
        vendor_id: req.vendor_id,
        service_number: req.service_number,
        result_block: None,
    };
    encode_response(|w| ack.encode_response(w, request.invoke_id))
}

fn confirmed_text_message(request: &ServerDispatch) -> Handled {
    let mut r = Reader::new(&request.payload);
    let req = match TextMessageRequest::decode_after_header(&mut r, request.invoke_id) {
        Ok(req) => req,
        Err(e) => return Handled::response(Err(decode_err(e))),
    };
    Handled {
        response: simple_ack(request),
        cov_dispatches: Vec::new(),
        notices: vec![Notice::TextMessage {
            source: request.source.clone(),
            message: req.message.to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::{dispatch_confirmed, DccState, HandlerContext};
    use crate::config::DeviceConfig;
    use crate::cov::CovManager;
    use crate::object::{factory, ObjectDatabase};
    use crate::tsm::{ServerDispatch, ServerResponse};
    use bacnode_core::apdu::{ComplexAckHeader, SimpleAck};
    use bacnode_core::encoding::{reader::Reader, writer::Writer};
    use bacnode_core::services::read_property::{
        ReadPropertyAck, ReadPropertyRequest, SERVICE_READ_PROPERTY,
    };
    use bacnode_core::services::write_property::{WritePropertyRequest, SERVICE_WRITE_PROPERTY};
    use bacnode_core::types::{
        BacnetAddress, DataValue, EnableDisable, ObjectId, ObjectType, PropertyId,
    };
    use tokio::time::Instant;

    struct Fixture {
        db: ObjectDatabase,
        cov: CovManager,
        dcc: DccState,
        config: DeviceConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let config = DeviceConfig::new(1000, "unit-1");
            let mut db = ObjectDatabase::new(&config);
            db.add(factory::analog_input(1, "zone-temp")).unwrap();
            db.add(factory::analog_value(1, "setpoint")).unwrap();
            Self {
                db,
                cov: CovManager::new(),
                dcc: DccState::new(),
                config,
            }
        }

        fn ctx(&mut self) -> HandlerContext<'_> {
            HandlerContext {
                db: &mut self.db,
                cov: &mut self.cov,
                dcc: &mut self.dcc,
                config: &self.config,
                now: Instant::now(),
            }
        }
    }

    fn source() -> BacnetAddress {
        BacnetAddress::local(vec![127, 0, 0, 1, 0xBA, 0xC0])
    }

    fn dispatch_of(service_choice: u8, apdu: &[u8]) -> ServerDispatch {
        // Strip the 4-byte unsegmented request header to get the payload.
        ServerDispatch {
            source: source(),
            invoke_id: apdu[2],
            service_choice,
            payload: apdu[4..].to_vec(),
            client_max_apdu: 1476,
            segmented_response_accepted: true,
        }
    }

    #[test]
    fn read_property_round_trips_through_handler() {
        let mut fixture = Fixture::new();
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        ReadPropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogInput, 1),
            property_id: PropertyId::PresentValue,
            array_index: None,
            invoke_id: 9,
        }
        .encode(&mut w)
        .unwrap();
        let request = dispatch_of(SERVICE_READ_PROPERTY, w.as_written());

        let handled = dispatch_confirmed(&mut fixture.ctx(), &request);
        let ServerResponse::Apdu(apdu) = handled.response.unwrap();
        let mut r = Reader::new(&apdu);
        let header = ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(header.invoke_id, 9);
        let ack = ReadPropertyAck::decode_after_header(&mut r).unwrap();
        assert_eq!(ack.value, DataValue::Real(0.0));
    }

    #[test]
    fn write_property_commands_priority_array() {
        let mut fixture = Fixture::new();
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        WritePropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogValue, 1),
            property_id: PropertyId::PresentValue,
            array_index: None,
            value: DataValue::Real(72.5),
            priority: Some(8),
            invoke_id: 3,
        }
        .encode(&mut w)
        .unwrap();
        let request = dispatch_of(SERVICE_WRITE_PROPERTY, w.as_written());

        let handled = dispatch_confirmed(&mut fixture.ctx(), &request);
        let ServerResponse::Apdu(apdu) = handled.response.unwrap();
        let mut r = Reader::new(&apdu);
        let ack = SimpleAck::decode(&mut r).unwrap();
        assert_eq!(ack.invoke_id, 3);

        let value = fixture
            .db
            .read(
                ObjectId::new(ObjectType::AnalogValue, 1),
                PropertyId::CurrentCommandPriority,
                None,
            )
            .unwrap();
        assert_eq!(value, bacnode_core::types::PropertyValue::Unsigned(8));
    }

    #[test]
    fn unknown_service_is_rejected() {
        let mut fixture = Fixture::new();
        let request = ServerDispatch {
            source: source(),
            invoke_id: 1,
            service_choice: 0x63,
            payload: Vec::new(),
            client_max_apdu: 1476,
            segmented_response_accepted: true,
        };
        let handled = dispatch_confirmed(&mut fixture.ctx(), &request);
        assert!(matches!(
            handled.response,
            Err(crate::error::ServiceError::Reject(
                bacnode_core::types::RejectReason::UnrecognizedService
            ))
        ));
    }

    #[test]
    fn dcc_disable_filters_services() {
        let mut dcc = DccState::new();
        let now = Instant::now();
        dcc.set(EnableDisable::Disable, None, now);
        assert!(!dcc.allows_inbound_confirmed(SERVICE_READ_PROPERTY));
        assert!(dcc.allows_inbound_confirmed(
            bacnode_core::services::device_management::SERVICE_DEVICE_COMMUNICATION_CONTROL
        ));
        assert!(dcc.allows_inbound_confirmed(
            bacnode_core::services::device_management::SERVICE_REINITIALIZE_DEVICE
        ));
        assert!(!dcc.allows_initiation());

        dcc.set(
            EnableDisable::DisableInitiation,
            Some(std::time::Duration::from_secs(60)),
            now,
        );
        assert!(dcc.allows_inbound_confirmed(SERVICE_READ_PROPERTY));
        assert!(!dcc.allows_initiation());
        assert!(dcc.allows_discovery_reply());

        // The timer restores ENABLE.
        dcc.tick(now + std::time::Duration::from_secs(61));
        assert_eq!(dcc.state(), EnableDisable::Enable);
    }
}
