//! Event algorithms: pure functions from a monitored value (plus any
//! retained reference values) to the alarm state the algorithm asks for.
//! The surrounding state machine applies time delays and fault priority.

use bacnode_core::types::{EventState, PropertyValue, Reliability};

/// Limit-enable bits of the out-of-range family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitEnable {
    pub low: bool,
    pub high: bool,
}

impl LimitEnable {
    pub const BOTH: Self = Self {
        low: true,
        high: true,
    };

    /// First two bits of the limit-enable bit string: low-limit-enable,
    /// high-limit-enable.
    pub fn from_bits(byte: u8) -> Self {
        Self {
            low: (byte & 0x80) != 0,
            high: (byte & 0x40) != 0,
        }
    }
}

/// OUT_OF_RANGE / DOUBLE / SIGNED / UNSIGNED_OUT_OF_RANGE: limits with a
/// deadband governing the return to normal.
pub fn out_of_range(
    value: f64,
    current: EventState,
    high_limit: f64,
    low_limit: f64,
    deadband: f64,
    enable: LimitEnable,
) -> EventState {
    if enable.high && value > high_limit {
        return EventState::HighLimit;
    }
    if enable.low && value < low_limit {
        return EventState::LowLimit;
    }
    // Inside the limits: hysteresis holds the alarm until the value
    // clears the deadband.
    match current {
        EventState::HighLimit if enable.high && value > high_limit - deadband => {
            EventState::HighLimit
        }
        EventState::LowLimit if enable.low && value < low_limit + deadband => EventState::LowLimit,
        _ => EventState::Normal,
    }
}

/// UNSIGNED_RANGE: out-of-range without a deadband.
pub fn unsigned_range(value: u32, high_limit: u32, low_limit: u32) -> EventState {
    if value > high_limit {
        EventState::HighLimit
    } else if value < low_limit {
        EventState::LowLimit
    } else {
        EventState::Normal
    }
}

/// FLOATING_LIMIT: limits tracked relative to a setpoint.
#[allow(clippy::too_many_arguments)]
pub fn floating_limit(
    value: f64,
    current: EventState,
    setpoint: f64,
    high_diff_limit: f64,
    low_diff_limit: f64,
    deadband: f64,
) -> EventState {
    out_of_range(
        value,
        current,
        setpoint + high_diff_limit,
        setpoint - low_diff_limit,
        deadband,
        LimitEnable::BOTH,
    )
}

/// CHANGE_OF_STATE: any listed value is offnormal.
pub fn change_of_state(value: &PropertyValue, alarm_values: &[PropertyValue]) -> EventState {
    if alarm_values.iter().any(|alarm| alarm == value) {
        EventState::Offnormal
    } else {
        EventState::Normal
    }
}

/// CHANGE_OF_BITSTRING: the masked bits match any listed pattern.
pub fn change_of_bitstring(value: &[u8], bitmask: &[u8], alarm_values: &[Vec<u8>]) -> EventState {
    let masked: Vec<u8> = value
        .iter()
        .zip(bitmask.iter().chain(std::iter::repeat(&0xFF)))
        .map(|(v, m)| v & m)
        .collect();
    for alarm in alarm_values {
        let alarm_masked: Vec<u8> = alarm
            .iter()
            .zip(bitmask.iter().chain(std::iter::repeat(&0xFF)))
            .map(|(v, m)| v & m)
            .collect();
        if alarm_masked == masked {
            return EventState::Offnormal;
        }
    }
    EventState::Normal
}

/// CHANGE_OF_VALUE: offnormal once the drift from the retained reference
/// reaches the increment; the reference then re-anchors.
pub fn change_of_value(value: f64, reference: &mut Option<f64>, increment: f64) -> EventState {
    match reference {
        Some(anchor) => {
            if (value - *anchor).abs() >= increment {
                *reference = Some(value);
                EventState::Offnormal
            } else {
                EventState::Normal
            }
        }
        None => {
            *reference = Some(value);
            EventState::Normal
        }
    }
}

/// CHANGE_OF_LIFE_SAFETY: the life-safety-alarm list outranks the alarm
/// list.
pub fn change_of_life_safety(
    value: u32,
    alarm_values: &[u32],
    life_safety_alarm_values: &[u32],
) -> EventState {
    if life_safety_alarm_values.contains(&value) {
        EventState::LifeSafetyAlarm
    } else if alarm_values.contains(&value) {
        EventState::Offnormal
    } else {
        EventState::Normal
    }
}

/// CHANGE_OF_STATUS_FLAGS: any selected flag differing from the retained
/// snapshot is offnormal.
pub fn change_of_status_flags(flags: u8, previous: &mut Option<u8>, selected: u8) -> EventState {
    let masked = flags & selected;
    let result = match *previous {
        Some(before) if before & selected != masked => EventState::Offnormal,
        _ => {
            if masked != 0 {
                EventState::Offnormal
            } else {
                EventState::Normal
            }
        }
    };
    *previous = Some(flags);
    result
}

/// CHANGE_OF_RELIABILITY: any fault is offnormal.
pub fn change_of_reliability(reliability: Reliability) -> EventState {
    if reliability.is_fault() {
        EventState::Offnormal
    } else {
        EventState::Normal
    }
}

/// CHANGE_OF_CHARACTERSTRING: any listed string is offnormal.
pub fn change_of_characterstring(value: &str, alarm_values: &[String]) -> EventState {
    if alarm_values.iter().any(|alarm| alarm == value) {
        EventState::Offnormal
    } else {
        EventState::Normal
    }
}

/// COMMAND_FAILURE: feedback disagreeing with the commanded value is
/// offnormal; the time delay is the state machine's business.
pub fn command_failure(commanded: &PropertyValue, feedback: &PropertyValue) -> EventState {
    if commanded == feedback {
        EventState::Normal
    } else {
        EventState::Offnormal
    }
}

/// BUFFER_READY: enough new records since the last notification.
pub fn buffer_ready(record_count: u32, previous: &mut Option<u32>, threshold: u32) -> EventState {
    let result = match *previous {
        Some(before) if record_count.wrapping_sub(before) >= threshold && threshold > 0 => {
            *previous = Some(record_count);
            EventState::Offnormal
        }
        Some(_) => EventState::Normal,
        None => {
            *previous = Some(record_count);
            EventState::Normal
        }
    };
    result
}

/// ACCESS_EVENT: any listed access event is offnormal.
pub fn access_event(event: u32, access_event_list: &[u32]) -> EventState {
    if access_event_list.contains(&event) {
        EventState::Offnormal
    } else {
        EventState::Normal
    }
}

/// CHANGE_OF_TIMER: any listed timer state is offnormal.
pub fn change_of_timer(timer_state: u32, alarm_values: &[u32]) -> EventState {
    if alarm_values.contains(&timer_state) {
        EventState::Offnormal
    } else {
        EventState::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bacnode_core::types::EventState;

    #[test]
    fn out_of_range_deadband_hysteresis() {
        let p = |value, current| out_of_range(value, current, 80.0, 10.0, 5.0, LimitEnable::BOTH);

        assert_eq!(p(85.0, EventState::Normal), EventState::HighLimit);
        // Inside the deadband the alarm holds.
        assert_eq!(p(76.0, EventState::HighLimit), EventState::HighLimit);
        // Below high-limit minus deadband it releases.
        assert_eq!(p(74.0, EventState::HighLimit), EventState::Normal);

        assert_eq!(p(5.0, EventState::Normal), EventState::LowLimit);
        assert_eq!(p(14.0, EventState::LowLimit), EventState::LowLimit);
        assert_eq!(p(15.0, EventState::LowLimit), EventState::Normal);
    }

    #[test]
    fn out_of_range_respects_limit_enable() {
        let no_high = LimitEnable {
            low: true,
            high: false,
        };
        assert_eq!(
            out_of_range(100.0, EventState::Normal, 80.0, 10.0, 5.0, no_high),
            EventState::Normal
        );
        assert_eq!(
            out_of_range(5.0, EventState::Normal, 80.0, 10.0, 5.0, no_high),
            EventState::LowLimit
        );
    }

    #[test]
    fn change_of_value_re_anchors() {
        let mut reference = None;
        assert_eq!(change_of_value(10.0, &mut reference, 5.0), EventState::Normal);
        assert_eq!(change_of_value(13.0, &mut reference, 5.0), EventState::Normal);
        assert_eq!(
            change_of_value(15.0, &mut reference, 5.0),
            EventState::Offnormal
        );
        // Reference moved to 15; 18 is below the increment again.
        assert_eq!(change_of_value(18.0, &mut reference, 5.0), EventState::Normal);
    }

    #[test]
    fn life_safety_list_priority() {
        assert_eq!(
            change_of_life_safety(7, &[7], &[7]),
            EventState::LifeSafetyAlarm
        );
        assert_eq!(change_of_life_safety(3, &[3], &[9]), EventState::Offnormal);
        assert_eq!(change_of_life_safety(1, &[3], &[9]), EventState::Normal);
    }

    #[test]
    fn buffer_ready_threshold() {
        let mut previous = None;
        assert_eq!(buffer_ready(10, &mut previous, 5), EventState::Normal);
        assert_eq!(buffer_ready(12, &mut previous, 5), EventState::Normal);
        assert_eq!(buffer_ready(15, &mut previous, 5), EventState::Offnormal);
        assert_eq!(buffer_ready(16, &mut previous, 5), EventState::Normal);
    }

    #[test]
    fn command_failure_compares_feedback() {
        use bacnode_core::types::PropertyValue;
        assert_eq!(
            command_failure(&PropertyValue::Enumerated(1), &PropertyValue::Enumerated(1)),
            EventState::Normal
        );
        assert_eq!(
            command_failure(&PropertyValue::Enumerated(1), &PropertyValue::Enumerated(0)),
            EventState::Offnormal
        );
    }
}
