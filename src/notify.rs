// Change notification - observers subscribe to a source and get every event it publishes
// Single-threaded: everything observable lives on the owning thread

/// Returned by `subscribe`, hand it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Anything that publishes change events of type `E`.
pub trait Observable<E> {
    fn subscribe(&mut self, observer: Box<dyn FnMut(&E)>) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
}

/// Subscriber list backing an [`Observable`] implementation.
pub struct Notifier<E> {
    next_id: u64,
    observers: Vec<(SubscriptionId, Box<dyn FnMut(&E)>)>,
}

impl<E> Notifier<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn FnMut(&E)>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn notify(&mut self, event: &E) {
        for (_, observer) in self.observers.iter_mut() {
            observer(event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_notify_reaches_all_observers_until_unsubscribed() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut notifier = Notifier::new();

        let first = {
            let seen = Rc::clone(&seen);
            notifier.subscribe(Box::new(move |v: &u32| seen.borrow_mut().push(*v)))
        };
        {
            let seen = Rc::clone(&seen);
            notifier.subscribe(Box::new(move |v: &u32| seen.borrow_mut().push(*v * 10)));
        }

        notifier.notify(&1);
        assert_eq!(*seen.borrow(), vec![1, 10]);

        assert!(notifier.unsubscribe(first));
        assert!(!notifier.unsubscribe(first));
        notifier.notify(&2);
        assert_eq!(*seen.borrow(), vec![1, 10, 20]);
        assert_eq!(notifier.observer_count(), 1);
    }
}
