use crate::event::algorithms::{self, LimitEnable};
use crate::event::state_machine::EventStateMachine;
use crate::object::{ObjectDatabase, PropertyChange};
use bacnode_core::services::event_notification::EventNotification;
use bacnode_core::services::timestamp::TimeStamp;
use bacnode_core::types::{
    Date, EventState, EventType, NotifyType, ObjectId, ObjectType, PropertyId, PropertyValue,
    Reliability, Time,
};
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::time::{Duration, Instant};

/// Retained evaluation state per monitored object.
#[derive(Debug)]
struct MonitorContext {
    machine: EventStateMachine,
    cov_reference: Option<f64>,
    previous_flags: Option<u8>,
    previous_count: Option<u32>,
}

/// The periodic alarm scanner: one state machine per event-detecting
/// object (EventEnrollment or intrinsic reporting), producing ready-made
/// notifications on transitions.
#[derive(Debug, Default)]
pub struct EventEngine {
    contexts: HashMap<ObjectId, MonitorContext>,
}

impl EventEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// One scan cycle over the database. Returns the notifications to
    /// broadcast; all object bookkeeping (event-state, acked-transitions,
    /// event-time-stamps) has been applied when this returns.
    pub fn scan(
        &mut self,
        now: Instant,
        db: &mut ObjectDatabase,
        device_id: ObjectId,
    ) -> Vec<EventNotification> {
        let mut notifications = Vec::new();

        for id in db.ids().collect::<Vec<_>>() {
            if id.object_type() == ObjectType::EventEnrollment {
                self.evaluate_enrollment(now, db, device_id, id, &mut notifications);
            } else if is_intrinsic(db, id) {
                self.evaluate_intrinsic(now, db, device_id, id, &mut notifications);
            }
        }

        // Contexts for deleted objects go away with them.
        self.contexts.retain(|id, _| db.contains(*id));
        notifications
    }

    fn evaluate_enrollment(
        &mut self,
        now: Instant,
        db: &mut ObjectDatabase,
        device_id: ObjectId,
        enrollment_id: ObjectId,
        notifications: &mut Vec<EventNotification>,
    ) {
        if !detection_enabled(db, enrollment_id) {
            return;
        }
        let Some((target_id, target_property)) = monitored_reference(db, enrollment_id) else {
            return;
        };
        // Missing monitored target: skip this cycle.
        let Some(target) = db.get(target_id) else {
            return;
        };
        let Some(monitored) = target.read(target_property).ok() else {
            return;
        };
        let fault = fault_result(db, enrollment_id, target_id);
        let event_type = db
            .get(enrollment_id)
            .and_then(|o| o.get(PropertyId::EventType))
            .and_then(PropertyValue::as_u32)
            .map(EventType::from_u32)
            .unwrap_or(EventType::None);

        self.run_cycle(
            now,
            db,
            device_id,
            enrollment_id,
            enrollment_id,
            event_type,
            &monitored,
            fault,
            notifications,
        );
    }

    fn evaluate_intrinsic(
        &mut self,
        now: Instant,
        db: &mut ObjectDatabase,
        device_id: ObjectId,
        object_id: ObjectId,
        notifications: &mut Vec<EventNotification>,
    ) {
        if !detection_enabled(db, object_id) {
            return;
        }
        let Some(object) = db.get(object_id) else {
            return;
        };
        let Ok(monitored) = object.read(PropertyId::PresentValue) else {
            return;
        };
        let fault = fault_result(db, object_id, object_id);
        let event_type = intrinsic_event_type(db, object_id);

        self.run_cycle(
            now,
            db,
            device_id,
            object_id,
            object_id,
            event_type,
            &monitored,
            fault,
            notifications,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn run_cycle(
        &mut self,
        now: Instant,
        db: &mut ObjectDatabase,
        device_id: ObjectId,
        event_object: ObjectId,
        parameter_object: ObjectId,
        event_type: EventType,
        monitored: &PropertyValue,
        fault: Reliability,
        notifications: &mut Vec<EventNotification>,
    ) {
        let context = self.contexts.entry(event_object).or_insert_with(|| {
            let time_delay = read_seconds(db, parameter_object, PropertyId::TimeDelay)
                .unwrap_or(Duration::ZERO);
            let time_delay_normal = read_seconds(db, parameter_object, PropertyId::TimeDelayNormal);
            MonitorContext {
                machine: EventStateMachine::new(time_delay, time_delay_normal),
                cov_reference: None,
                previous_flags: None,
                previous_count: None,
            }
        });
        context.machine.event_enable = event_enable(db, parameter_object);

        let mut alarm = evaluate_algorithm(
            db,
            parameter_object,
            event_type,
            monitored,
            &mut context.cov_reference,
            &mut context.previous_flags,
            &mut context.previous_count,
        );
        if algorithm_inhibited(db, parameter_object) {
            alarm = EventState::Normal;
        }

        let Some(transition) = context.machine.evaluate(alarm, fault, now) else {
            return;
        };

        let timestamp = local_timestamp();
        apply_transition_bookkeeping(db, event_object, transition.to, &timestamp);

        let notification_class = db
            .get(parameter_object)
            .and_then(|o| o.get(PropertyId::NotificationClass))
            .and_then(PropertyValue::as_u32)
            .unwrap_or(0);
        let (priority, ack_required) =
            class_parameters(db, notification_class, transition.to);

        notifications.push(EventNotification {
            process_id: 0,
            initiating_device_id: device_id,
            event_object_id: event_object,
            timestamp,
            notification_class,
            priority,
            event_type,
            message_text: None,
            notify_type: NotifyType::Alarm,
            ack_required: Some(ack_required),
            from_state: Some(transition.from),
            to_state: transition.to,
            event_values: None,
        });
    }
}

fn is_intrinsic(db: &ObjectDatabase, id: ObjectId) -> bool {
    let Some(object) = db.get(id) else {
        return false;
    };
    !matches!(
        id.object_type(),
        ObjectType::EventEnrollment | ObjectType::NotificationClass | ObjectType::Device
    ) && object.contains(PropertyId::EventEnable)
        && object.contains(PropertyId::NotificationClass)
}

fn detection_enabled(db: &ObjectDatabase, id: ObjectId) -> bool {
    db.get(id)
        .and_then(|o| o.get(PropertyId::EventDetectionEnable))
        .and_then(PropertyValue::as_bool)
        .unwrap_or(true)
}

fn algorithm_inhibited(db: &ObjectDatabase, id: ObjectId) -> bool {
    db.get(id)
        .and_then(|o| o.get(PropertyId::EventAlgorithmInhibit))
        .and_then(PropertyValue::as_bool)
        .unwrap_or(false)
}

fn fault_result(db: &ObjectDatabase, event_object: ObjectId, target: ObjectId) -> Reliability {
    let inhibited = db
        .get(event_object)
        .and_then(|o| o.get(PropertyId::ReliabilityEvaluationInhibit))
        .and_then(PropertyValue::as_bool)
        .unwrap_or(false);
    if inhibited {
        return Reliability::NoFaultDetected;
    }
    db.get(target)
        .and_then(|o| o.get(PropertyId::Reliability))
        .and_then(PropertyValue::as_u32)
        .map(Reliability::from_u32)
        .unwrap_or(Reliability::NoFaultDetected)
}

/// The enrollment's DeviceObjectPropertyReference, stored as a
/// constructed pair of object id and property id.
fn monitored_reference(db: &ObjectDatabase, id: ObjectId) -> Option<(ObjectId, PropertyId)> {
    let value = db.get(id)?.get(PropertyId::ObjectPropertyReference)?;
    let PropertyValue::Constructed { values, .. } = value else {
        return None;
    };
    let mut object = None;
    let mut property = None;
    for child in values {
        match child {
            PropertyValue::ObjectId(oid) => object = Some(*oid),
            PropertyValue::Enumerated(raw) | PropertyValue::Unsigned(raw) => {
                property = Some(PropertyId::from_u32(*raw));
            }
            _ => {}
        }
    }
    Some((object?, property.unwrap_or(PropertyId::PresentValue)))
}

fn event_enable(db: &ObjectDatabase, id: ObjectId) -> [bool; 3] {
    match db.get(id).and_then(|o| o.get(PropertyId::EventEnable)) {
        Some(PropertyValue::BitString { data, .. }) if !data.is_empty() => [
            (data[0] & 0x80) != 0,
            (data[0] & 0x40) != 0,
            (data[0] & 0x20) != 0,
        ],
        _ => [true; 3],
    }
}

fn intrinsic_event_type(db: &ObjectDatabase, id: ObjectId) -> EventType {
    let Some(object) = db.get(id) else {
        return EventType::None;
    };
    if object.contains(PropertyId::FeedbackValue) {
        EventType::CommandFailure
    } else if object.contains(PropertyId::HighLimit) || object.contains(PropertyId::LowLimit) {
        EventType::OutOfRange
    } else if object.contains(PropertyId::AlarmValues) {
        EventType::ChangeOfState
    } else if object.contains(PropertyId::AlarmValue) {
        EventType::ChangeOfState
    } else {
        EventType::None
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_algorithm(
    db: &ObjectDatabase,
    parameter_object: ObjectId,
    event_type: EventType,
    monitored: &PropertyValue,
    cov_reference: &mut Option<f64>,
    previous_flags: &mut Option<u8>,
    previous_count: &mut Option<u32>,
) -> EventState {
    let current = db
        .get(parameter_object)
        .and_then(|o| o.get(PropertyId::EventState))
        .and_then(PropertyValue::as_u32)
        .and_then(EventState::from_u32)
        .unwrap_or(EventState::Normal);
    let number = |property| {
        db.get(parameter_object)
            .and_then(|o| o.get(property))
            .and_then(PropertyValue::as_f64)
    };

    match event_type {
        EventType::OutOfRange
        | EventType::DoubleOutOfRange
        | EventType::SignedOutOfRange
        | EventType::UnsignedOutOfRange => {
            let Some(value) = monitored.as_f64() else {
                return EventState::Normal;
            };
            let enable = match db
                .get(parameter_object)
                .and_then(|o| o.get(PropertyId::LimitEnable))
            {
                Some(PropertyValue::BitString { data, .. }) if !data.is_empty() => {
                    LimitEnable::from_bits(data[0])
                }
                _ => LimitEnable::BOTH,
            };
            algorithms::out_of_range(
                value,
                current,
                number(PropertyId::HighLimit).unwrap_or(f64::MAX),
                number(PropertyId::LowLimit).unwrap_or(f64::MIN),
                number(PropertyId::Deadband).unwrap_or(0.0),
                enable,
            )
        }
        EventType::UnsignedRange => {
            let Some(value) = monitored.as_u32() else {
                return EventState::Normal;
            };
            algorithms::unsigned_range(
                value,
                number(PropertyId::HighLimit).unwrap_or(f64::MAX) as u32,
                number(PropertyId::LowLimit).unwrap_or(0.0) as u32,
            )
        }
        EventType::FloatingLimit => {
            let Some(value) = monitored.as_f64() else {
                return EventState::Normal;
            };
            algorithms::floating_limit(
                value,
                current,
                number(PropertyId::Setpoint).unwrap_or(0.0),
                number(PropertyId::HighLimit).unwrap_or(f64::MAX),
                number(PropertyId::LowLimit).unwrap_or(f64::MAX),
                number(PropertyId::Deadband).unwrap_or(0.0),
            )
        }
        EventType::ChangeOfState => {
            let alarm_values = list_values(db, parameter_object);
            algorithms::change_of_state(monitored, &alarm_values)
        }
        EventType::ChangeOfBitstring => {
            let PropertyValue::BitString { data, .. } = monitored else {
                return EventState::Normal;
            };
            let bitmask = match db
                .get(parameter_object)
                .and_then(|o| o.get(PropertyId::Proprietary(ALARM_BITMASK)))
            {
                Some(PropertyValue::BitString { data, .. }) => data.clone(),
                _ => vec![0xFF; data.len()],
            };
            let alarm_values: Vec<Vec<u8>> = list_values(db, parameter_object)
                .into_iter()
                .filter_map(|value| match value {
                    PropertyValue::BitString { data, .. } => Some(data),
                    _ => None,
                })
                .collect();
            algorithms::change_of_bitstring(data, &bitmask, &alarm_values)
        }
        EventType::ChangeOfValue => {
            let Some(value) = monitored.as_f64() else {
                return EventState::Normal;
            };
            let increment = number(PropertyId::CovIncrement).unwrap_or(0.0);
            if increment <= 0.0 {
                return EventState::Normal;
            }
            algorithms::change_of_value(value, cov_reference, increment)
        }
        EventType::ChangeOfLifeSafety => {
            let Some(value) = monitored.as_u32() else {
                return EventState::Normal;
            };
            let alarm_values: Vec<u32> = list_values(db, parameter_object)
                .iter()
                .filter_map(PropertyValue::as_u32)
                .collect();
            let life_safety: Vec<u32> = match db
                .get(parameter_object)
                .and_then(|o| o.get(PropertyId::LifeSafetyAlarmValues))
            {
                Some(PropertyValue::List(values)) => {
                    values.iter().filter_map(PropertyValue::as_u32).collect()
                }
                _ => Vec::new(),
            };
            algorithms::change_of_life_safety(value, &alarm_values, &life_safety)
        }
        EventType::ChangeOfStatusFlags => {
            let flags = db
                .get(parameter_object)
                .map(|o| o.status_flags().to_byte())
                .unwrap_or(0);
            // Selected flags default to in-alarm + fault.
            algorithms::change_of_status_flags(flags, previous_flags, 0xC0)
        }
        EventType::ChangeOfReliability => {
            let reliability = monitored
                .as_u32()
                .map(Reliability::from_u32)
                .unwrap_or(Reliability::NoFaultDetected);
            algorithms::change_of_reliability(reliability)
        }
        EventType::ChangeOfCharacterstring => {
            let PropertyValue::CharacterString(value) = monitored else {
                return EventState::Normal;
            };
            let alarm_values: Vec<String> = list_values(db, parameter_object)
                .into_iter()
                .filter_map(|value| match value {
                    PropertyValue::CharacterString(s) => Some(s),
                    _ => None,
                })
                .collect();
            algorithms::change_of_characterstring(value, &alarm_values)
        }
        EventType::CommandFailure => {
            let feedback = db
                .get(parameter_object)
                .and_then(|o| o.get(PropertyId::FeedbackValue).cloned())
                .unwrap_or(PropertyValue::Null);
            algorithms::command_failure(monitored, &feedback)
        }
        EventType::BufferReady => {
            let Some(count) = monitored.as_u32() else {
                return EventState::Normal;
            };
            let threshold = number(PropertyId::Proprietary(NOTIFICATION_THRESHOLD))
                .unwrap_or(1.0) as u32;
            algorithms::buffer_ready(count, previous_count, threshold)
        }
        EventType::AccessEvent | EventType::ChangeOfTimer => {
            let Some(value) = monitored.as_u32() else {
                return EventState::Normal;
            };
            let alarm_values: Vec<u32> = list_values(db, parameter_object)
                .iter()
                .filter_map(PropertyValue::as_u32)
                .collect();
            algorithms::change_of_timer(value, &alarm_values)
        }
        // Vendor extensions and unknown algorithms never alarm here.
        EventType::Extended
        | EventType::None
        | EventType::ChangeOfDiscreteValue
        | EventType::Proprietary(_) => EventState::Normal,
    }
}

/// Notification-threshold parameter for BUFFER_READY (standard property
/// 137, not otherwise used by this stack).
const NOTIFICATION_THRESHOLD: u32 = 137;
/// Bitmask parameter for CHANGE_OF_BITSTRING (standard property 131's
/// neighbourhood is log-buffer; the mask rides as a vendor slot here).
const ALARM_BITMASK: u32 = 640;

fn list_values(db: &ObjectDatabase, id: ObjectId) -> Vec<PropertyValue> {
    match db
        .get(id)
        .and_then(|o| o.get(PropertyId::AlarmValues).or_else(|| o.get(PropertyId::AlarmValue)))
    {
        Some(PropertyValue::List(values)) | Some(PropertyValue::Array(values)) => values.clone(),
        Some(single) => vec![single.clone()],
        None => Vec::new(),
    }
}

fn read_seconds(db: &ObjectDatabase, id: ObjectId, property: PropertyId) -> Option<Duration> {
    db.get(id)
        .and_then(|o| o.get(property))
        .and_then(PropertyValue::as_u32)
        .map(|seconds| Duration::from_secs(seconds as u64))
}

fn class_parameters(db: &ObjectDatabase, class_number: u32, to_state: EventState) -> (u8, bool) {
    let index = to_state.transition_index();
    let class_object = db
        .ids_of_type(ObjectType::NotificationClass)
        .into_iter()
        .find(|id| id.instance() == class_number)
        .and_then(|id| db.get(id));
    let Some(class_object) = class_object else {
        return (255, false);
    };

    let priority = match class_object.get(PropertyId::Priority) {
        Some(PropertyValue::Array(values)) => values
            .get(index)
            .and_then(PropertyValue::as_u32)
            .unwrap_or(255)
            .min(255) as u8,
        _ => 255,
    };
    let ack_required = match class_object.get(PropertyId::AckRequired) {
        Some(PropertyValue::BitString { data, .. }) if !data.is_empty() => {
            (data[0] & (0x80 >> index)) != 0
        }
        _ => false,
    };
    (priority, ack_required)
}

fn apply_transition_bookkeeping(
    db: &mut ObjectDatabase,
    event_object: ObjectId,
    to_state: EventState,
    timestamp: &TimeStamp,
) {
    let index = to_state.transition_index();
    let Some(object) = db.get_mut(event_object) else {
        return;
    };

    let old_state = object.get(PropertyId::EventState).cloned();
    object.set(
        PropertyId::EventState,
        PropertyValue::Enumerated(to_state.to_u32()),
    );

    // Clear the acked bit for this transition; acknowledgment sets it
    // again.
    let mut acked = match object.get(PropertyId::AckedTransitions) {
        Some(PropertyValue::BitString { data, .. }) if !data.is_empty() => data[0],
        _ => 0xE0,
    };
    acked &= !(0x80 >> index);
    object.set(
        PropertyId::AckedTransitions,
        PropertyValue::BitString {
            unused_bits: 5,
            data: vec![acked],
        },
    );

    // Stamp the matching slot of event-time-stamps.
    let mut stamps = match object.get(PropertyId::EventTimeStamps) {
        Some(PropertyValue::Array(values)) if values.len() == 3 => values.clone(),
        _ => vec![unspecified_timestamp_value(); 3],
    };
    stamps[index] = timestamp_value(timestamp);
    object.set(PropertyId::EventTimeStamps, PropertyValue::Array(stamps));

    let new_state = PropertyValue::Enumerated(to_state.to_u32());
    db.record_change(PropertyChange {
        object_id: event_object,
        property_id: PropertyId::EventState,
        old: old_state,
        new: new_state,
    });
}

fn timestamp_value(timestamp: &TimeStamp) -> PropertyValue {
    match timestamp {
        TimeStamp::Time(t) => PropertyValue::Constructed {
            tag_num: 0,
            values: vec![PropertyValue::Time(*t)],
        },
        TimeStamp::SequenceNumber(seq) => PropertyValue::Constructed {
            tag_num: 1,
            values: vec![PropertyValue::Unsigned(*seq)],
        },
        TimeStamp::DateTime(d, t) => PropertyValue::Constructed {
            tag_num: 2,
            values: vec![PropertyValue::Date(*d), PropertyValue::Time(*t)],
        },
    }
}

fn unspecified_timestamp_value() -> PropertyValue {
    timestamp_value(&TimeStamp::unspecified())
}

/// Wall-clock date and time without a calendar dependency: civil date
/// from the days-since-epoch count.
pub fn local_timestamp() -> TimeStamp {
    let Ok(since_epoch) = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) else {
        return TimeStamp::unspecified();
    };
    let days = (since_epoch.as_secs() / 86_400) as i64;
    let seconds_of_day = since_epoch.as_secs() % 86_400;
    let (year, month, day) = civil_from_days(days);
    if !(1900..=2155).contains(&year) {
        return TimeStamp::unspecified();
    }
    // 1970-01-01 was a Thursday; BACnet weekday is 1 = Monday.
    let weekday = ((days + 3).rem_euclid(7) + 1) as u8;
    let date = Date {
        year_since_1900: (year - 1900) as u8,
        month: month as u8,
        day: day as u8,
        weekday,
    };
    let time = Time {
        hour: (seconds_of_day / 3600) as u8,
        minute: (seconds_of_day % 3600 / 60) as u8,
        second: (seconds_of_day % 60) as u8,
        hundredths: (since_epoch.subsec_millis() / 10) as u8,
    };
    TimeStamp::DateTime(date, time)
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::EventEngine;
    use crate::config::DeviceConfig;
    use crate::object::{factory, ObjectDatabase};
    use bacnode_core::types::{
        EventState, ObjectId, ObjectType, PropertyId, PropertyValue,
    };
    use tokio::time::Instant;

    fn alarming_analog_input(db: &mut ObjectDatabase) -> ObjectId {
        let mut ai = factory::analog_input(1, "zone-temp");
        ai.set(PropertyId::HighLimit, PropertyValue::Real(80.0));
        ai.set(PropertyId::LowLimit, PropertyValue::Real(10.0));
        ai.set(PropertyId::Deadband, PropertyValue::Real(5.0));
        ai.set(PropertyId::TimeDelay, PropertyValue::Unsigned(0));
        ai.set(
            PropertyId::EventEnable,
            PropertyValue::BitString {
                unused_bits: 5,
                data: vec![0xE0],
            },
        );
        ai.set(PropertyId::NotificationClass, PropertyValue::Unsigned(1));
        ai.set(
            PropertyId::LimitEnable,
            PropertyValue::BitString {
                unused_bits: 6,
                data: vec![0xC0],
            },
        );
        db.add(factory::notification_class(1, "alarms")).unwrap();
        let id = ai.id();
        db.add(ai).unwrap();
        id
    }

    fn set_present_value(db: &mut ObjectDatabase, id: ObjectId, value: f32) {
        db.get_mut(id)
            .unwrap()
            .set(PropertyId::PresentValue, PropertyValue::Real(value));
    }

    #[test]
    fn intrinsic_out_of_range_cycle() {
        let config = DeviceConfig::new(1000, "unit-1");
        let mut db = ObjectDatabase::new(&config);
        let device_id = db.device_id();
        let ai = alarming_analog_input(&mut db);
        let mut engine = EventEngine::new();
        let now = Instant::now();

        // Cycle 1: 85 trips the high limit.
        set_present_value(&mut db, ai, 85.0);
        let notifications = engine.scan(now, &mut db, device_id);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].to_state, EventState::HighLimit);
        assert_eq!(notifications[0].from_state, Some(EventState::Normal));
        assert_eq!(
            db.read(ai, PropertyId::EventState, None).unwrap(),
            PropertyValue::Enumerated(EventState::HighLimit.to_u32())
        );

        // Cycle 2: 76 sits inside the deadband; no transition.
        set_present_value(&mut db, ai, 76.0);
        assert!(engine.scan(now, &mut db, device_id).is_empty());

        // Cycle 3: 74 clears the deadband; back to normal.
        set_present_value(&mut db, ai, 74.0);
        let notifications = engine.scan(now, &mut db, device_id);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].to_state, EventState::Normal);
    }

    #[test]
    fn notification_class_supplies_priority() {
        let config = DeviceConfig::new(1000, "unit-1");
        let mut db = ObjectDatabase::new(&config);
        let device_id = db.device_id();
        let ai = alarming_analog_input(&mut db);
        let mut engine = EventEngine::new();

        set_present_value(&mut db, ai, 100.0);
        let notifications = engine.scan(Instant::now(), &mut db, device_id);
        // to-offnormal priority from the class object's priority array.
        assert_eq!(notifications[0].priority, 127);
        assert_eq!(notifications[0].notification_class, 1);
    }

    #[test]
    fn enrollment_monitors_remote_property() {
        let config = DeviceConfig::new(1000, "unit-1");
        let mut db = ObjectDatabase::new(&config);
        let device_id = db.device_id();
        db.add(factory::analog_input(2, "supply-temp")).unwrap();
        db.add(factory::notification_class(1, "alarms")).unwrap();

        let target = ObjectId::new(ObjectType::AnalogInput, 2);
        let mut enrollment = crate::object::Object::new(
            ObjectId::new(ObjectType::EventEnrollment, 1),
            "supply-temp-alarm",
        );
        enrollment.set(
            PropertyId::EventType,
            PropertyValue::Enumerated(bacnode_core::types::EventType::OutOfRange.to_u32()),
        );
        enrollment.set(
            PropertyId::ObjectPropertyReference,
            PropertyValue::Constructed {
                tag_num: 0,
                values: vec![
                    PropertyValue::ObjectId(target),
                    PropertyValue::Enumerated(PropertyId::PresentValue.to_u32()),
                ],
            },
        );
        enrollment.set(PropertyId::HighLimit, PropertyValue::Real(50.0));
        enrollment.set(PropertyId::LowLimit, PropertyValue::Real(0.0));
        enrollment.set(PropertyId::Deadband, PropertyValue::Real(1.0));
        enrollment.set(PropertyId::TimeDelay, PropertyValue::Unsigned(0));
        enrollment.set(PropertyId::NotificationClass, PropertyValue::Unsigned(1));
        enrollment.set(
            PropertyId::EventState,
            PropertyValue::Enumerated(EventState::Normal.to_u32()),
        );
        let enrollment_id = enrollment.id();
        db.add(enrollment).unwrap();

        let mut engine = EventEngine::new();
        db.get_mut(target)
            .unwrap()
            .set(PropertyId::PresentValue, PropertyValue::Real(60.0));
        let notifications = engine.scan(Instant::now(), &mut db, device_id);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].event_object_id, enrollment_id);
        assert_eq!(notifications[0].to_state, EventState::HighLimit);
    }

    #[test]
    fn detection_disable_skips_object() {
        let config = DeviceConfig::new(1000, "unit-1");
        let mut db = ObjectDatabase::new(&config);
        let device_id = db.device_id();
        let ai = alarming_analog_input(&mut db);
        db.get_mut(ai)
            .unwrap()
            .set(PropertyId::EventDetectionEnable, PropertyValue::Boolean(false));

        let mut engine = EventEngine::new();
        set_present_value(&mut db, ai, 100.0);
        assert!(engine.scan(Instant::now(), &mut db, device_id).is_empty());
    }
}
