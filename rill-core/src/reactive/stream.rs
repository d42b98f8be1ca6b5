//! Discrete streams.
//!
//! A [`Stream`] is a source of discrete occurrences with no current value.
//! Occurrences are delivered synchronously to every listener, inside a
//! propagation pass so behaviors updated by the same occurrence publish
//! together.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::{CallbackObserver, ListenerRegistry, Observer, Ranked, Reactive, ReactiveHandle, ReactiveKind, SubscriberId};
use crate::graph::batch;

struct StreamInner<A> {
    id: SubscriberId,
    listeners: RefCell<ListenerRegistry<A>>,
    /// Subscriptions to the streams this one is derived from.
    upstream: RefCell<Vec<ReactiveHandle>>,
}

/// A discrete sequence of occurrences.
///
/// Cloning a stream yields another handle to the same stream.
pub struct Stream<A> {
    inner: Rc<StreamInner<A>>,
}

impl<A> Clone for Stream<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: Clone + 'static> Stream<A> {
    /// Create a stream that occurs whenever [`Stream::push`] is called.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StreamInner {
                id: SubscriberId::new(),
                listeners: RefCell::new(ListenerRegistry::new()),
                upstream: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The stream's ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Fire an occurrence.
    pub fn push(&self, value: A) {
        let targets = self.inner.listeners.borrow().live();
        tracing::trace!(stream = self.inner.id.raw(), listeners = targets.len(), "stream occurrence");
        batch(|| {
            for (_, observer) in targets {
                observer.push(value.clone());
            }
        });
    }

    /// Register an observer. Returns the new listener count.
    pub fn add_listener(&self, id: SubscriberId, observer: &Rc<dyn Observer<A>>) -> usize {
        self.inner.listeners.borrow_mut().insert(id, observer)
    }

    /// Deregister an observer. Returns the new listener count, or `None` if
    /// `id` was not registered.
    pub fn remove_listener(&self, id: SubscriberId) -> Option<usize> {
        let remaining = self.inner.listeners.borrow_mut().remove(id);
        if remaining.is_none() {
            tracing::warn!(stream = self.inner.id.raw(), listener = id.raw(), "removing unknown stream listener");
        }
        remaining
    }

    /// Number of registered observers.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Call `f` for every occurrence until the handle is dropped.
    pub fn subscribe<F>(&self, f: F) -> ReactiveHandle
    where
        F: Fn(A) + 'static,
    {
        let observer = Rc::new(CallbackObserver::new(f));
        let id = observer.id();
        let erased: Rc<dyn Observer<A>> = observer;
        self.add_listener(id, &erased);

        let stream = self.clone();
        ReactiveHandle::new(move || {
            stream.remove_listener(id);
            drop(erased);
        })
    }

    /// A stream whose occurrences are `f` applied to this stream's.
    pub fn map<B, F>(&self, f: F) -> Stream<B>
    where
        B: Clone + 'static,
        F: Fn(A) -> B + 'static,
    {
        let mapped = Stream::new();
        mapped.follow(self, f);
        mapped
    }

    /// A stream occurring with `value` whenever this stream occurs.
    pub fn map_to<B: Clone + 'static>(&self, value: B) -> Stream<B> {
        self.map(move |_| value.clone())
    }

    /// A stream occurring whenever either stream occurs.
    pub fn combine(&self, other: &Stream<A>) -> Stream<A> {
        let combined = Stream::new();
        combined.follow(self, |a| a);
        combined.follow(other, |a| a);
        combined
    }

    /// Forward every occurrence of `source`, transformed by `f`, into self.
    fn follow<S, F>(&self, source: &Stream<S>, f: F)
    where
        S: Clone + 'static,
        F: Fn(S) -> A + 'static,
    {
        let forward = Rc::new(Forward {
            id: SubscriberId::new(),
            rank: Cell::new(0),
            target: Rc::downgrade(&self.inner),
            f: Box::new(f),
        });
        let id = forward.id;
        let erased: Rc<dyn Observer<S>> = forward;
        source.add_listener(id, &erased);

        // The handle owns the upstream stream, so intermediate streams stay
        // alive as long as something derived from them does.
        let source = source.clone();
        self.inner
            .upstream
            .borrow_mut()
            .push(ReactiveHandle::new(move || {
                source.remove_listener(id);
                drop(erased);
            }));
    }
}

impl<A: Clone + 'static> Default for Stream<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Reactive for Stream<A> {
    fn kind(&self) -> ReactiveKind {
        ReactiveKind::Stream
    }
}

impl<A: 'static> std::fmt::Debug for Stream<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

struct Forward<S, A> {
    id: SubscriberId,
    rank: Cell<u32>,
    target: Weak<StreamInner<A>>,
    f: Box<dyn Fn(S) -> A>,
}

impl<S, A> Ranked for Forward<S, A> {
    fn rank(&self) -> u32 {
        self.rank.get()
    }

    fn raise_rank(&self, above: u32) {
        if self.rank.get() <= above {
            self.rank.set(above + 1);
        }
    }
}

impl<S, A: Clone + 'static> Observer<S> for Forward<S, A> {
    fn push(&self, value: S) {
        if let Some(inner) = self.target.upgrade() {
            Stream { inner }.push((self.f)(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<A: Clone + 'static>(stream: &Stream<A>) -> (Rc<RefCell<Vec<A>>>, ReactiveHandle) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let handle = stream.subscribe(move |v| seen_clone.borrow_mut().push(v));
        (seen, handle)
    }

    #[test]
    fn stream_delivers_to_subscribers() {
        let stream = Stream::new();
        let (seen, handle) = collect(&stream);

        stream.push(1);
        stream.push(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);

        drop(handle);
        stream.push(3);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(stream.listener_count(), 0);
    }

    #[test]
    fn map_and_combine() {
        let a = Stream::new();
        let b = Stream::new();
        let merged = a.map(|n: i32| n * 10).combine(&b.map_to(-1));
        let (seen, _handle) = collect(&merged);

        a.push(1);
        b.push(99);
        a.push(2);
        assert_eq!(*seen.borrow(), vec![10, -1, 20]);
    }

    #[test]
    fn derived_stream_releases_source_when_dropped() {
        let source: Stream<i32> = Stream::new();
        let mapped = source.map(|n| n + 1);
        assert_eq!(source.listener_count(), 1);

        drop(mapped);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn debug_output_shows_listeners() {
        let stream: Stream<i32> = Stream::new();
        let _handle = stream.subscribe(|_| {});
        assert!(format!("{stream:?}").contains("listeners: 1"));
    }

    #[test]
    fn stream_is_not_a_behavior() {
        let stream: Stream<i32> = Stream::new();
        assert!(!crate::reactive::is_behavior(&stream));
    }
}
