//! One-shot results.
//!
//! A [`Future`] occurs at most once. Listeners registered before it occurs
//! are told the value when it does; listeners registered afterwards are told
//! immediately. This is a reactive value, unrelated to `std::future`.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::{CallbackObserver, ListenerRegistry, Observer, Ranked, Reactive, ReactiveHandle, ReactiveKind, SubscriberId};
use crate::error::{BehaviorError, Result};
use crate::graph::batch;

struct FutureInner<A> {
    id: SubscriberId,
    value: RefCell<Option<A>>,
    listeners: RefCell<ListenerRegistry<A>>,
    /// Whatever resolves this future, kept alive until it has.
    upstream: RefCell<Option<ReactiveHandle>>,
}

/// A value that becomes known at one moment in time.
///
/// Cloning a future yields another handle to the same result.
pub struct Future<A> {
    inner: Rc<FutureInner<A>>,
}

impl<A> Clone for Future<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: Clone + 'static> Future<A> {
    fn with_value(value: Option<A>) -> Self {
        Self {
            inner: Rc::new(FutureInner {
                id: SubscriberId::new(),
                value: RefCell::new(value),
                listeners: RefCell::new(ListenerRegistry::new()),
                upstream: RefCell::new(None),
            }),
        }
    }

    /// A future that has already occurred with `value`.
    pub fn of(value: A) -> Self {
        Self::with_value(Some(value))
    }

    /// A pending future, resolved with [`Future::resolve`].
    pub fn sink() -> Self {
        Self::with_value(None)
    }

    /// The future's ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Whether the future has occurred.
    pub fn occurred(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// The value, once occurred.
    pub fn value(&self) -> Option<A> {
        self.inner.value.borrow().clone()
    }

    /// Resolve a pending future and notify its listeners.
    pub fn resolve(&self, value: A) -> Result<()> {
        if self.occurred() {
            return Err(BehaviorError::AlreadyResolved);
        }
        *self.inner.value.borrow_mut() = Some(value.clone());

        let targets = self.inner.listeners.borrow_mut().drain();
        let upstream = self.inner.upstream.borrow_mut().take();
        drop(upstream);

        tracing::trace!(future = self.inner.id.raw(), listeners = targets.len(), "future resolved");
        batch(|| {
            for (_, observer) in targets {
                observer.push(value.clone());
            }
        });
        Ok(())
    }

    /// Register an observer for the occurrence.
    ///
    /// If the future has already occurred the observer is told right away and
    /// nothing is registered.
    pub fn listen(&self, id: SubscriberId, observer: &Rc<dyn Observer<A>>) {
        match self.value() {
            Some(value) => batch(|| observer.push(value)),
            None => {
                self.inner.listeners.borrow_mut().insert(id, observer);
            }
        }
    }

    /// Withdraw a registration made with [`Future::listen`].
    pub fn unlisten(&self, id: SubscriberId) {
        self.inner.listeners.borrow_mut().remove(id);
    }

    /// Number of observers waiting for the occurrence.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Call `f` with the value when the future occurs.
    pub fn subscribe<F>(&self, f: F) -> ReactiveHandle
    where
        F: Fn(A) + 'static,
    {
        let observer = Rc::new(CallbackObserver::new(f));
        let id = observer.id();
        let erased: Rc<dyn Observer<A>> = observer;
        self.listen(id, &erased);

        let future = self.clone();
        ReactiveHandle::new(move || {
            future.unlisten(id);
            drop(erased);
        })
    }

    /// A future occurring with `f` applied to this one's value.
    pub fn map<B, F>(&self, f: F) -> Future<B>
    where
        B: Clone + 'static,
        F: Fn(A) -> B + 'static,
    {
        if let Some(value) = self.value() {
            return Future::of(f(value));
        }
        let mapped = Future::sink();
        let forward = Rc::new(Resolve {
            id: SubscriberId::new(),
            rank: Cell::new(0),
            target: Rc::downgrade(&mapped.inner),
            f: Box::new(f),
        });
        let id = forward.id;
        let erased: Rc<dyn Observer<A>> = forward;
        self.listen(id, &erased);

        let source = self.clone();
        mapped.hold(ReactiveHandle::new(move || {
            source.unlisten(id);
            drop(erased);
        }));
        mapped
    }

    /// A callback that resolves this future if it is still pending and
    /// still referenced elsewhere. It does not keep the future alive.
    pub(crate) fn resolver(&self) -> impl Fn(A) + 'static {
        let target = Rc::downgrade(&self.inner);
        move |value| {
            if let Some(inner) = target.upgrade() {
                let future = Future { inner };
                if !future.occurred() {
                    let _ = future.resolve(value);
                }
            }
        }
    }

    /// Keep `handle` alive until this future occurs.
    pub(crate) fn hold(&self, handle: ReactiveHandle) {
        if self.occurred() {
            return;
        }
        let previous = self.inner.upstream.borrow_mut().replace(handle);
        drop(previous);
    }
}

impl<A> Reactive for Future<A> {
    fn kind(&self) -> ReactiveKind {
        ReactiveKind::Future
    }
}

impl<A: std::fmt::Debug> std::fmt::Debug for Future<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

struct Resolve<A, B> {
    id: SubscriberId,
    rank: Cell<u32>,
    target: Weak<FutureInner<B>>,
    f: Box<dyn Fn(A) -> B>,
}

impl<A, B> Ranked for Resolve<A, B> {
    fn rank(&self) -> u32 {
        self.rank.get()
    }

    fn raise_rank(&self, above: u32) {
        if self.rank.get() <= above {
            self.rank.set(above + 1);
        }
    }
}

impl<A, B: Clone + 'static> Observer<A> for Resolve<A, B> {
    fn push(&self, value: A) {
        if let Some(inner) = self.target.upgrade() {
            // A mapped future has exactly one resolver.
            let _ = Future { inner }.resolve((self.f)(value));
        }
    }
}
