//! Typed manager events and their dispatch.
//!
//! Observers subscribe to an `EventBus` and receive every event synchronously,
//! in subscription order. A failing or panicking observer is logged and
//! skipped; it never affects other observers or the operation that emitted
//! the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::error::{DataError, ValidationErrors};
use crate::models::{Course, Student};

#[derive(Debug)]
pub enum CourseEvent {
    Loading,
    Loaded(Vec<Course>),
    Created(Course),
    Updated(Course),
    Deleted(String),
    Error(DataError),
    ValidationError(ValidationErrors),
}

#[derive(Debug)]
pub enum StudentEvent {
    Loading,
    Loaded(Vec<Student>),
    Created(Student),
    Updated(Student),
    Deleted(String),
    Error(DataError),
    ValidationError(ValidationErrors),
}

/// Event name as used in logs, e.g. `courseCreated`
pub trait EventName {
    fn name(&self) -> &'static str;
}

impl EventName for CourseEvent {
    fn name(&self) -> &'static str {
        match self {
            CourseEvent::Loading => "coursesLoading",
            CourseEvent::Loaded(_) => "coursesLoaded",
            CourseEvent::Created(_) => "courseCreated",
            CourseEvent::Updated(_) => "courseUpdated",
            CourseEvent::Deleted(_) => "courseDeleted",
            CourseEvent::Error(_) => "courseError",
            CourseEvent::ValidationError(_) => "courseValidationError",
        }
    }
}

impl EventName for StudentEvent {
    fn name(&self) -> &'static str {
        match self {
            StudentEvent::Loading => "studentsLoading",
            StudentEvent::Loaded(_) => "studentsLoaded",
            StudentEvent::Created(_) => "studentCreated",
            StudentEvent::Updated(_) => "studentUpdated",
            StudentEvent::Deleted(_) => "studentDeleted",
            StudentEvent::Error(_) => "studentError",
            StudentEvent::ValidationError(_) => "studentValidationError",
        }
    }
}

pub trait Observer<E>: Send + Sync {
    fn on_event(&self, event: &E) -> anyhow::Result<()>;
}

impl<E, F> Observer<E> for F
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &E) -> anyhow::Result<()> {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub struct EventBus<E> {
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn Observer<E>>)>>,
    next_id: AtomicU64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E: EventName> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<E>>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        observers.push((id, observer));
        id
    }

    /// Returns false if the id was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver to every observer. Failures are logged, never returned.
    pub fn emit(&self, event: &E) {
        // Snapshot so observers may subscribe or unsubscribe while handling
        let observers: Vec<Arc<dyn Observer<E>>> = {
            let guard = self.observers.read().unwrap_or_else(|e| e.into_inner());
            guard.iter().map(|(_, o)| Arc::clone(o)).collect()
        };

        for (index, observer) in observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = event.name(), observer = index, error = %e, "Observer failed");
                }
                Err(_) => {
                    warn!(event = event.name(), observer = index, "Observer panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn Observer<CourseEvent>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let observer: Arc<dyn Observer<CourseEvent>> = Arc::new(move |_: &CourseEvent| -> anyhow::Result<()> {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, observer)
    }

    #[test]
    fn test_emit_reaches_all_observers() {
        let bus = EventBus::new();
        let (a, oa) = counter();
        let (b, ob) = counter();
        bus.subscribe(oa);
        bus.subscribe(ob);
        bus.emit(&CourseEvent::Loading);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_observer_does_not_block_others() {
        let bus = EventBus::new();
        let failing: Arc<dyn Observer<CourseEvent>> =
            Arc::new(|_: &CourseEvent| -> anyhow::Result<()> { anyhow::bail!("broken observer") });
        let panicking: Arc<dyn Observer<CourseEvent>> =
            Arc::new(|_: &CourseEvent| -> anyhow::Result<()> { panic!("observer panic") });
        let (count, ok) = counter();
        bus.subscribe(failing);
        bus.subscribe(panicking);
        bus.subscribe(ok);

        bus.emit(&CourseEvent::Deleted("c1".to_string()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (count, observer) = counter();
        let id = bus.subscribe(observer);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&CourseEvent::Loading);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(CourseEvent::Loading.name(), "coursesLoading");
        assert_eq!(
            StudentEvent::ValidationError(ValidationErrors::new()).name(),
            "studentValidationError"
        );
    }
}
