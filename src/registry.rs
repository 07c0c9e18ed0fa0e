//! Process-wide "active instance" slot.
//!
//! Only one interrupt manager can own the hardware table and only one heap
//! can back `alloc`. Instead of each type hiding a mutable static, the owner
//! of the slot is a `Registry` that callers name explicitly:
//!
//! 1. `install` makes an instance active and hands back the one it displaced
//! 2. `current` is what interrupt entry and the global allocator consult
//! 3. `remove` clears the slot, but only for the instance that holds it

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

pub struct Registry<T: Sync + 'static> {
    active: AtomicPtr<T>,
}

impl<T: Sync + 'static> Registry<T> {
    pub const fn new() -> Self {
        Self {
            active: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Makes `instance` active, returning the previously active one.
    pub fn install(&self, instance: &'static T) -> Option<&'static T> {
        let previous = self
            .active
            .swap(instance as *const T as *mut T, Ordering::AcqRel);
        // Only `&'static T` values are ever stored.
        unsafe { previous.as_ref() }
    }

    pub fn current(&self) -> Option<&'static T> {
        unsafe { self.active.load(Ordering::Acquire).as_ref() }
    }

    pub fn is_active(&self, instance: &T) -> bool {
        ptr::eq(self.active.load(Ordering::Acquire), instance)
    }

    /// Clears the slot if `instance` holds it.
    pub fn remove(&self, instance: &T) -> bool {
        self.active
            .compare_exchange(
                instance as *const T as *mut T,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl<T: Sync + 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FIRST: u32 = 1;
    static SECOND: u32 = 2;

    #[test]
    fn test_install_returns_displaced_instance() {
        let registry: Registry<u32> = Registry::new();
        assert!(registry.current().is_none());

        assert!(registry.install(&FIRST).is_none());
        assert!(registry.is_active(&FIRST));

        let previous = registry.install(&SECOND);
        assert!(previous.is_some_and(|p| ptr::eq(p, &FIRST)));
        assert_eq!(registry.current(), Some(&2));
    }

    #[test]
    fn test_remove_only_clears_holder() {
        let registry: Registry<u32> = Registry::new();
        registry.install(&SECOND);

        assert!(!registry.remove(&FIRST));
        assert!(registry.is_active(&SECOND));

        assert!(registry.remove(&SECOND));
        assert!(registry.current().is_none());
    }
}
