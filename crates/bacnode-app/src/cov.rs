use crate::error::ServiceError;
use crate::object::{ObjectDatabase, PropertyChange};
use bacnode_core::services::cov_notification::CovValue;
use bacnode_core::services::subscribe_cov::SubscribeCovRequest;
use bacnode_core::services::subscribe_cov_property::SubscribeCovPropertyRequest;
use bacnode_core::types::{
    BacnetAddress, ErrorClass, ErrorCode, ObjectId, PropertyId, PropertyValue, RejectReason,
};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// A notification the manager wants delivered to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct CovDispatch {
    pub subscriber: BacnetAddress,
    pub process_id: u32,
    pub confirmed: bool,
    pub monitored_object: ObjectId,
    pub time_remaining_seconds: u32,
    pub values: Vec<CovValue>,
}

#[derive(Debug)]
struct Subscription {
    subscriber: BacnetAddress,
    process_id: u32,
    confirmed: bool,
    /// Property-level subscriptions carry the nominated property;
    /// object-level ones monitor present-value + status-flags.
    property: Option<(PropertyId, Option<u32>)>,
    cov_increment: Option<f32>,
    expires_at: Option<Instant>,
    /// Values as of the most recent notification; increments accumulate
    /// against these, not against the previous write.
    last_reported: HashMap<PropertyId, PropertyValue>,
}

impl Subscription {
    fn time_remaining(&self, now: Instant) -> u32 {
        self.expires_at
            .map(|at| at.saturating_duration_since(now).as_secs() as u32)
            .unwrap_or(0)
    }
}

/// The change-of-value subscription table and dispatch logic.
#[derive(Debug, Default)]
pub struct CovManager {
    subscriptions: HashMap<ObjectId, Vec<Subscription>>,
}

impl CovManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }

    /// Handle SubscribeCOV. A request without the confirmed/lifetime
    /// options cancels; otherwise the subscription is inserted (replacing
    /// any with the same subscriber/process/object key) and an initial
    /// notification is returned.
    pub fn subscribe(
        &mut self,
        now: Instant,
        db: &ObjectDatabase,
        subscriber: BacnetAddress,
        request: &SubscribeCovRequest,
    ) -> Result<Vec<CovDispatch>, ServiceError> {
        if request.is_cancellation() {
            self.cancel(
                &subscriber,
                request.subscriber_process_id,
                request.monitored_object_id,
            );
            return Ok(Vec::new());
        }
        let object_id = db.resolve(request.monitored_object_id);
        if !db.contains(object_id) {
            return Err(ServiceError::unknown_object());
        }
        let confirmed = match request.issue_confirmed_notifications {
            Some(confirmed) => confirmed,
            None => return Err(ServiceError::Reject(RejectReason::MissingRequiredParameter)),
        };

        let subscription = Subscription {
            subscriber,
            process_id: request.subscriber_process_id,
            confirmed,
            property: None,
            cov_increment: None,
            expires_at: request
                .lifetime_seconds
                .filter(|s| *s > 0)
                .map(|s| now + Duration::from_secs(s as u64)),
            last_reported: HashMap::new(),
        };
        Ok(self.insert_and_notify(now, db, object_id, subscription))
    }

    /// Handle SubscribeCOVProperty.
    pub fn subscribe_property(
        &mut self,
        now: Instant,
        db: &ObjectDatabase,
        subscriber: BacnetAddress,
        request: &SubscribeCovPropertyRequest,
    ) -> Result<Vec<CovDispatch>, ServiceError> {
        if request.is_cancellation() {
            self.cancel(
                &subscriber,
                request.subscriber_process_id,
                request.monitored_object_id,
            );
            return Ok(Vec::new());
        }
        let object_id = db.resolve(request.monitored_object_id);
        let Some(object) = db.get(object_id) else {
            return Err(ServiceError::unknown_object());
        };
        if !object.contains(request.monitored_property_id)
            && request.monitored_property_id != PropertyId::StatusFlags
        {
            return Err(ServiceError::unknown_property());
        }
        let confirmed = match request.issue_confirmed_notifications {
            Some(confirmed) => confirmed,
            None => return Err(ServiceError::Reject(RejectReason::MissingRequiredParameter)),
        };

        let subscription = Subscription {
            subscriber,
            process_id: request.subscriber_process_id,
            confirmed,
            property: Some((
                request.monitored_property_id,
                request.monitored_property_array_index,
            )),
            cov_increment: request.cov_increment,
            expires_at: request
                .lifetime_seconds
                .filter(|s| *s > 0)
                .map(|s| now + Duration::from_secs(s as u64)),
            last_reported: HashMap::new(),
        };
        Ok(self.insert_and_notify(now, db, object_id, subscription))
    }

    fn insert_and_notify(
        &mut self,
        now: Instant,
        db: &ObjectDatabase,
        object_id: ObjectId,
        subscription: Subscription,
    ) -> Vec<CovDispatch> {
        let list = self.subscriptions.entry(object_id).or_default();
        list.retain(|existing| {
            !(existing.subscriber == subscription.subscriber
                && existing.process_id == subscription.process_id)
        });
        list.push(subscription);
        let subscription = list.last_mut().expect("just pushed");

        // Subscribers synchronize on subscribe: send the current values
        // immediately.
        match build_values(db, object_id, subscription) {
            Some(values) => {
                remember(subscription, &values);
                vec![CovDispatch {
                    subscriber: subscription.subscriber.clone(),
                    process_id: subscription.process_id,
                    confirmed: subscription.confirmed,
                    monitored_object: object_id,
                    time_remaining_seconds: subscription.time_remaining(now),
                    values,
                }]
            }
            None => Vec::new(),
        }
    }

    /// Remove a subscription; absent entries are ignored.
    pub fn cancel(&mut self, subscriber: &BacnetAddress, process_id: u32, object_id: ObjectId) {
        if let Some(list) = self.subscriptions.get_mut(&object_id) {
            list.retain(|s| !(s.subscriber == *subscriber && s.process_id == process_id));
            if list.is_empty() {
                self.subscriptions.remove(&object_id);
            }
        }
    }

    /// Evaluate a property change against the table.
    pub fn on_change(
        &mut self,
        now: Instant,
        db: &ObjectDatabase,
        change: &PropertyChange,
    ) -> Vec<CovDispatch> {
        let Some(list) = self.subscriptions.get_mut(&change.object_id) else {
            return Vec::new();
        };
        let mut dispatches = Vec::new();
        for subscription in list.iter_mut() {
            if !subscription_covers(subscription, change.property_id) {
                continue;
            }
            if !should_notify(db, change, subscription) {
                continue;
            }
            let Some(values) = build_values(db, change.object_id, subscription) else {
                continue;
            };
            remember(subscription, &values);
            dispatches.push(CovDispatch {
                subscriber: subscription.subscriber.clone(),
                process_id: subscription.process_id,
                confirmed: subscription.confirmed,
                monitored_object: change.object_id,
                time_remaining_seconds: subscription.time_remaining(now),
                values,
            });
        }
        dispatches
    }

    /// Remove expired subscriptions (silent).
    pub fn expire(&mut self, now: Instant) {
        self.subscriptions.retain(|_, list| {
            list.retain(|s| match s.expires_at {
                Some(at) => at > now,
                None => true,
            });
            !list.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

fn subscription_covers(subscription: &Subscription, property: PropertyId) -> bool {
    match &subscription.property {
        Some((nominated, _)) => *nominated == property,
        None => matches!(
            property,
            PropertyId::PresentValue
                | PropertyId::StatusFlags
                | PropertyId::Reliability
                | PropertyId::OutOfService
                | PropertyId::EventState
        ),
    }
}

/// The increment rule: analog present-value changes fire only once the
/// distance from the last *reported* value reaches the increment.
fn should_notify(db: &ObjectDatabase, change: &PropertyChange, subscription: &Subscription) -> bool {
    if change.property_id != PropertyId::PresentValue {
        return true;
    }
    let (Some(current), Some(reference)) = (
        change.new.as_f64(),
        subscription
            .last_reported
            .get(&PropertyId::PresentValue)
            .and_then(PropertyValue::as_f64),
    ) else {
        return true;
    };
    let increment = subscription.cov_increment.map(f64::from).or_else(|| {
        db.get(change.object_id)
            .filter(|object| object.object_type().is_analog() || object.is_commandable())
            .and_then(|object| object.get(PropertyId::CovIncrement))
            .and_then(PropertyValue::as_f64)
    });
    match increment {
        Some(increment) if increment > 0.0 => (current - reference).abs() >= increment,
        _ => (current - reference).abs() != 0.0,
    }
}

fn build_values(
    db: &ObjectDatabase,
    object_id: ObjectId,
    subscription: &Subscription,
) -> Option<Vec<CovValue>> {
    let object = db.get(object_id)?;
    match &subscription.property {
        Some((property, array_index)) => {
            let value = object.read_indexed(*property, *array_index).ok()?;
            Some(vec![CovValue {
                property_id: *property,
                array_index: *array_index,
                value,
                priority: None,
            }])
        }
        None => {
            let present = object.read(PropertyId::PresentValue).ok()?;
            let status = object.read(PropertyId::StatusFlags).ok()?;
            Some(vec![
                CovValue {
                    property_id: PropertyId::PresentValue,
                    array_index: None,
                    value: present,
                    priority: None,
                },
                CovValue {
                    property_id: PropertyId::StatusFlags,
                    array_index: None,
                    value: status,
                    priority: None,
                },
            ])
        }
    }
}

fn remember(subscription: &mut Subscription, values: &[CovValue]) {
    for value in values {
        subscription
            .last_reported
            .insert(value.property_id, value.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::CovManager;
    use crate::config::DeviceConfig;
    use crate::object::{factory, ObjectDatabase};
    use bacnode_core::services::subscribe_cov::SubscribeCovRequest;
    use bacnode_core::types::{BacnetAddress, ObjectId, ObjectType, PropertyId, PropertyValue};
    use tokio::time::{Duration, Instant};

    fn setup() -> (ObjectDatabase, CovManager, BacnetAddress, ObjectId) {
        let mut db = ObjectDatabase::new(&DeviceConfig::new(1000, "unit-1"));
        let mut av = factory::analog_value(1, "sp");
        av.set(PropertyId::CovIncrement, PropertyValue::Real(5.0));
        db.add(av).unwrap();
        (
            db,
            CovManager::new(),
            BacnetAddress::local(vec![127, 0, 0, 1, 0xBA, 0xC0]),
            ObjectId::new(ObjectType::AnalogValue, 1),
        )
    }

    fn subscribe_request(object_id: ObjectId) -> SubscribeCovRequest {
        SubscribeCovRequest {
            subscriber_process_id: 42,
            monitored_object_id: object_id,
            issue_confirmed_notifications: Some(false),
            lifetime_seconds: Some(60),
            invoke_id: 1,
        }
    }

    fn write(db: &mut ObjectDatabase, object_id: ObjectId, value: f32) -> super::PropertyChange {
        db.write(
            object_id,
            PropertyId::PresentValue,
            None,
            PropertyValue::Real(value),
            Some(8),
        )
        .unwrap();
        db.drain_changes().remove(0)
    }

    #[test]
    fn initial_notification_carries_current_values() {
        let (db, mut cov, subscriber, object_id) = setup();
        let now = Instant::now();
        let dispatches = cov
            .subscribe(now, &db, subscriber, &subscribe_request(object_id))
            .unwrap();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].values.len(), 2);
        assert_eq!(dispatches[0].values[0].value, PropertyValue::Real(0.0));
        assert_eq!(dispatches[0].time_remaining_seconds, 60);
    }

    #[test]
    fn increment_accumulates_across_writes() {
        let (mut db, mut cov, subscriber, object_id) = setup();
        let now = Instant::now();
        cov.subscribe(now, &db, subscriber, &subscribe_request(object_id))
            .unwrap();

        // 2.0 and 4.0 stay inside the 5.0 increment from the reported 0.0.
        for value in [2.0, 4.0] {
            let change = write(&mut db, object_id, value);
            assert!(cov.on_change(now, &db, &change).is_empty());
        }
        // 5.0 crosses it and resets the reference point.
        let change = write(&mut db, object_id, 5.0);
        let fired = cov.on_change(now, &db, &change);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].values[0].value, PropertyValue::Real(5.0));

        // 9.0 is only 4.0 from the new reference; 10.0 crosses again.
        let change = write(&mut db, object_id, 9.0);
        assert!(cov.on_change(now, &db, &change).is_empty());
        let change = write(&mut db, object_id, 10.0);
        assert_eq!(cov.on_change(now, &db, &change).len(), 1);
    }

    #[test]
    fn resubscribe_replaces_entry() {
        let (db, mut cov, subscriber, object_id) = setup();
        let now = Instant::now();
        cov.subscribe(now, &db, subscriber.clone(), &subscribe_request(object_id))
            .unwrap();
        cov.subscribe(now, &db, subscriber, &subscribe_request(object_id))
            .unwrap();
        assert_eq!(cov.subscription_count(), 1);
    }

    #[test]
    fn cancellation_and_expiry_remove_silently() {
        let (db, mut cov, subscriber, object_id) = setup();
        let now = Instant::now();
        cov.subscribe(now, &db, subscriber.clone(), &subscribe_request(object_id))
            .unwrap();

        let cancel = SubscribeCovRequest::cancel(42, object_id, 2);
        cov.subscribe(now, &db, subscriber.clone(), &cancel).unwrap();
        assert_eq!(cov.subscription_count(), 0);

        // Cancelling again is a no-op.
        cov.subscribe(now, &db, subscriber.clone(), &cancel).unwrap();

        cov.subscribe(now, &db, subscriber, &subscribe_request(object_id))
            .unwrap();
        cov.expire(now + Duration::from_secs(61));
        assert_eq!(cov.subscription_count(), 0);
    }

    #[test]
    fn unknown_object_rejected() {
        let (db, mut cov, subscriber, _) = setup();
        let now = Instant::now();
        let request = subscribe_request(ObjectId::new(ObjectType::AnalogValue, 99));
        assert!(cov.subscribe(now, &db, subscriber, &request).is_err());
    }
}
