//! Listener registration and synchronous fan-out

use std::sync::RwLock;

type Listener<T> = Box<dyn Fn(&T) + Send + Sync + 'static>;

/// An explicit observer list.
///
/// `emit` delivers to every listener synchronously on the calling thread.
/// Emitting components release their own state locks before emitting, so a
/// listener may call back into the emitter. Subscribing from inside a
/// listener is not supported; wire everything up before the first emit.
pub struct ListenerSet<T> {
    listeners: RwLock<Vec<Listener<T>>>,
}

impl<T> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.listeners.write().unwrap().push(Box::new(listener));
    }

    pub fn emit(&self, value: &T) {
        for listener in self.listeners.read().unwrap().iter() {
            listener(value);
        }
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
