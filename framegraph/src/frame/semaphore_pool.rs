//! Reusable binary semaphores.

use std::sync::Arc;

use super::FrameDevice;
use crate::error::GraphicsError;

/// Per-frame semaphore recycler.
///
/// [`request_semaphore`](Self::request_semaphore) hands out pool-owned
/// semaphores that come back on [`reset`](Self::reset).
/// [`request_owned_semaphore`](Self::request_owned_semaphore) transfers
/// ownership to the caller, for semaphores that must outlive the frame (for
/// example a present wait). Such a semaphore returns through
/// [`release_owned_semaphore`](Self::release_owned_semaphore) and only becomes
/// reusable after the next reset.
pub struct SemaphorePool<D: FrameDevice> {
    semaphores: Vec<D::Semaphore>,
    released: Vec<D::Semaphore>,
    active_count: usize,
    device: Arc<D>,
}

impl<D: FrameDevice> SemaphorePool<D> {
    /// Create an empty pool.
    pub fn new(device: Arc<D>) -> Self {
        Self {
            semaphores: Vec::new(),
            released: Vec::new(),
            active_count: 0,
            device,
        }
    }

    /// Next unused pool-owned semaphore, creating one if all are in use.
    pub fn request_semaphore(&mut self) -> Result<D::Semaphore, GraphicsError> {
        if let Some(semaphore) = self.semaphores.get(self.active_count) {
            self.active_count += 1;
            return Ok(*semaphore);
        }

        let semaphore = self.device.create_semaphore()?;
        log::debug!("SemaphorePool: created semaphore #{}", self.semaphores.len());
        self.semaphores.push(semaphore);
        self.active_count += 1;
        Ok(semaphore)
    }

    /// A semaphore the caller owns until it is released back.
    pub fn request_owned_semaphore(&mut self) -> Result<D::Semaphore, GraphicsError> {
        if self.active_count < self.semaphores.len()
            && let Some(semaphore) = self.semaphores.pop()
        {
            return Ok(semaphore);
        }
        self.device.create_semaphore()
    }

    /// Give back a semaphore obtained from
    /// [`request_owned_semaphore`](Self::request_owned_semaphore).
    pub fn release_owned_semaphore(&mut self, semaphore: D::Semaphore) {
        self.released.push(semaphore);
    }

    /// Make every semaphore available again and recycle released ones.
    pub fn reset(&mut self) {
        self.active_count = 0;
        self.semaphores.append(&mut self.released);
    }

    /// Semaphores handed out since the last reset.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Semaphores owned by the pool, excluding released ones awaiting reset.
    pub fn len(&self) -> usize {
        self.semaphores.len()
    }

    /// Returns true if the pool owns no semaphores.
    pub fn is_empty(&self) -> bool {
        self.semaphores.is_empty()
    }

    /// Released semaphores waiting for the next reset.
    pub fn released_count(&self) -> usize {
        self.released.len()
    }
}

impl<D: FrameDevice> Drop for SemaphorePool<D> {
    fn drop(&mut self) {
        for semaphore in self.semaphores.drain(..).chain(self.released.drain(..)) {
            self.device.destroy_semaphore(semaphore);
        }
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;

    #[test]
    fn test_request_reuses_after_reset() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = SemaphorePool::new(device.clone());
        let a = pool.request_semaphore().unwrap();
        let b = pool.request_semaphore().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.active_count(), 2);

        pool.reset();
        assert_eq!(pool.request_semaphore().unwrap(), a);
        assert_eq!(pool.request_semaphore().unwrap(), b);
        assert_eq!(device.stats().semaphores_created, 2);
    }

    #[test]
    fn test_owned_semaphore_takes_unused_one() {
        let mut pool = SemaphorePool::new(Arc::new(DummyDevice::new()));
        pool.request_semaphore().unwrap();
        pool.request_semaphore().unwrap();
        pool.reset();

        let _in_use = pool.request_semaphore().unwrap();
        let owned = pool.request_owned_semaphore().unwrap();
        assert_eq!(pool.len(), 1);

        pool.release_owned_semaphore(owned);
        assert_eq!(pool.released_count(), 1);
        assert_eq!(pool.len(), 1);

        pool.reset();
        assert_eq!(pool.released_count(), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_owned_semaphore_created_when_all_active() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = SemaphorePool::new(device.clone());
        pool.request_semaphore().unwrap();
        let owned = pool.request_owned_semaphore().unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(device.stats().semaphores_created, 2);
        pool.release_owned_semaphore(owned);
    }

    #[test]
    fn test_drop_destroys_pool_semaphores() {
        let device = Arc::new(DummyDevice::new());
        {
            let mut pool = SemaphorePool::new(device.clone());
            pool.request_semaphore().unwrap();
            let owned = pool.request_owned_semaphore().unwrap();
            pool.release_owned_semaphore(owned);
        }
        assert_eq!(device.stats().semaphores_destroyed, 2);
    }
}
