use bacnode_core::types::{EventState, Reliability};
use tokio::time::{Duration, Instant};

/// A committed event-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: EventState,
    pub to: EventState,
}

/// Per-monitored-object transition logic: fault outranks alarm, and
/// alarm transitions are debounced by the configured time delays.
#[derive(Debug)]
pub struct EventStateMachine {
    pub state: EventState,
    pub event_enable: [bool; 3],
    pub time_delay: Duration,
    pub time_delay_normal: Option<Duration>,
    pending: Option<(EventState, Instant)>,
}

impl EventStateMachine {
    pub fn new(time_delay: Duration, time_delay_normal: Option<Duration>) -> Self {
        Self {
            state: EventState::Normal,
            event_enable: [true; 3],
            time_delay,
            time_delay_normal,
            pending: None,
        }
    }

    pub fn effective_time_delay_normal(&self) -> Duration {
        self.time_delay_normal.unwrap_or(self.time_delay)
    }

    /// Feed one evaluation cycle: the alarm state the algorithm asks for
    /// and the fault evaluator's verdict.
    pub fn evaluate(
        &mut self,
        alarm_result: EventState,
        fault: Reliability,
        now: Instant,
    ) -> Option<Transition> {
        if fault.is_fault() {
            self.pending = None;
            if self.state != EventState::Fault {
                if !self.event_enable[EventState::Fault.transition_index()] {
                    return None;
                }
                return Some(self.commit(EventState::Fault));
            }
            return None;
        }

        // Fault just cleared: fall through to the ordinary delay logic
        // toward whatever the alarm evaluator wants now.
        if self.state == EventState::Fault {
            let target = alarm_result;
            return self.apply_delay(target, now);
        }

        self.apply_delay(alarm_result, now)
    }

    fn apply_delay(&mut self, target: EventState, now: Instant) -> Option<Transition> {
        if target == self.state {
            self.pending = None;
            return None;
        }

        let delay = if target == EventState::Normal {
            self.effective_time_delay_normal()
        } else {
            // To-offnormal and alarm-to-different-alarm both use the
            // plain time delay.
            self.time_delay
        };

        match self.pending {
            Some((pending_state, since)) if pending_state == target => {
                if now.duration_since(since) >= delay {
                    self.pending = None;
                    if !self.event_enable[target.transition_index()] {
                        // Disabled transitions still move the state, but
                        // silently.
                        self.state = target;
                        return None;
                    }
                    return Some(self.commit(target));
                }
                None
            }
            _ => {
                // A change of the evaluator's output restarts the timer.
                if delay.is_zero() {
                    self.pending = None;
                    if !self.event_enable[target.transition_index()] {
                        self.state = target;
                        return None;
                    }
                    return Some(self.commit(target));
                }
                self.pending = Some((target, now));
                None
            }
        }
    }

    fn commit(&mut self, to: EventState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::EventStateMachine;
    use bacnode_core::types::{EventState, Reliability};
    use tokio::time::{Duration, Instant};

    #[test]
    fn immediate_transition_with_zero_delay() {
        let mut machine = EventStateMachine::new(Duration::ZERO, None);
        let now = Instant::now();
        let transition = machine
            .evaluate(EventState::HighLimit, Reliability::NoFaultDetected, now)
            .unwrap();
        assert_eq!(transition.from, EventState::Normal);
        assert_eq!(transition.to, EventState::HighLimit);
        assert_eq!(machine.state, EventState::HighLimit);
    }

    #[test]
    fn time_delay_debounces() {
        let mut machine = EventStateMachine::new(Duration::from_secs(5), None);
        let start = Instant::now();

        assert!(machine
            .evaluate(EventState::HighLimit, Reliability::NoFaultDetected, start)
            .is_none());
        // Condition persists but the delay has not elapsed.
        assert!(machine
            .evaluate(
                EventState::HighLimit,
                Reliability::NoFaultDetected,
                start + Duration::from_secs(3)
            )
            .is_none());
        // A change of the evaluator output restarts the timer.
        assert!(machine
            .evaluate(
                EventState::Normal,
                Reliability::NoFaultDetected,
                start + Duration::from_secs(4)
            )
            .is_none());
        assert!(machine
            .evaluate(
                EventState::HighLimit,
                Reliability::NoFaultDetected,
                start + Duration::from_secs(5)
            )
            .is_none());
        // Now it must persist the full delay again.
        let transition = machine.evaluate(
            EventState::HighLimit,
            Reliability::NoFaultDetected,
            start + Duration::from_secs(10),
        );
        assert!(transition.is_some());
    }

    #[test]
    fn fault_preempts_and_ignores_alarms() {
        let mut machine = EventStateMachine::new(Duration::ZERO, None);
        let now = Instant::now();
        let transition = machine
            .evaluate(EventState::HighLimit, Reliability::NoSensor, now)
            .unwrap();
        assert_eq!(transition.to, EventState::Fault);

        // While faulted, alarm output is ignored.
        assert!(machine
            .evaluate(EventState::HighLimit, Reliability::NoSensor, now)
            .is_none());

        // Fault clears into the current alarm result.
        let transition = machine
            .evaluate(EventState::HighLimit, Reliability::NoFaultDetected, now)
            .unwrap();
        assert_eq!(transition.from, EventState::Fault);
        assert_eq!(transition.to, EventState::HighLimit);
    }

    #[test]
    fn to_normal_uses_time_delay_normal() {
        let mut machine =
            EventStateMachine::new(Duration::ZERO, Some(Duration::from_secs(10)));
        let now = Instant::now();
        machine
            .evaluate(EventState::HighLimit, Reliability::NoFaultDetected, now)
            .unwrap();

        assert!(machine
            .evaluate(EventState::Normal, Reliability::NoFaultDetected, now)
            .is_none());
        assert!(machine
            .evaluate(
                EventState::Normal,
                Reliability::NoFaultDetected,
                now + Duration::from_secs(9)
            )
            .is_none());
        let transition = machine.evaluate(
            EventState::Normal,
            Reliability::NoFaultDetected,
            now + Duration::from_secs(10),
        );
        assert_eq!(transition.unwrap().to, EventState::Normal);
    }

    #[test]
    fn alarm_to_alarm_is_a_new_offnormal_transition() {
        let mut machine = EventStateMachine::new(Duration::from_secs(2), None);
        let now = Instant::now();
        machine.time_delay = Duration::ZERO;
        machine
            .evaluate(EventState::HighLimit, Reliability::NoFaultDetected, now)
            .unwrap();
        machine.time_delay = Duration::from_secs(2);

        assert!(machine
            .evaluate(EventState::LowLimit, Reliability::NoFaultDetected, now)
            .is_none());
        let transition = machine.evaluate(
            EventState::LowLimit,
            Reliability::NoFaultDetected,
            now + Duration::from_secs(2),
        );
        assert_eq!(transition.unwrap().to, EventState::LowLimit);
    }
}
