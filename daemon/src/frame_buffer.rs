//! Shared frame memory between the frame hand-in path and its readers
//!
//! One RGBA buffer sized to the active video. The lock is held only while
//! copying in, copying out, blacking out or swapping in a new allocation.

use common::PlaybackError;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct FrameData {
    data: Vec<u8>,
    width: u32,
    height: u32,
    /// A frame was written since the last hand-off
    updated: bool,
}

#[derive(Debug, Default)]
pub struct FrameBuffer {
    inner: Mutex<FrameData>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FrameData> {
        // A panicking reader leaves plain bytes behind, still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resize to `width` x `height` RGBA, zero-filled.
    ///
    /// The new allocation is installed before the old one is released. On
    /// failure the previous buffer stays in place.
    pub fn reallocate(&self, width: u32, height: u32) -> Result<(), PlaybackError> {
        let size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(crate::controller::BYTES_PER_PIXEL))
            .ok_or_else(|| {
                PlaybackError::BufferAllocation(format!("{}x{} overflows", width, height))
            })?;

        let mut fresh = Vec::new();
        fresh.try_reserve_exact(size).map_err(|e| {
            PlaybackError::BufferAllocation(format!(
                "{} bytes for {}x{}: {}",
                size, width, height, e
            ))
        })?;
        fresh.resize(size, 0);

        let old = {
            let mut inner = self.lock();
            inner.width = width;
            inner.height = height;
            inner.updated = false;
            std::mem::replace(&mut inner.data, fresh)
        };
        drop(old);

        log::debug!("Frame buffer sized to {}x{} ({} bytes)", width, height, size);
        Ok(())
    }

    /// Copy a frame in and mark it updated.
    ///
    /// A frame whose length does not match the current size is ignored.
    pub fn write(&self, frame: &[u8]) -> bool {
        let mut inner = self.lock();
        if inner.data.is_empty() || inner.data.len() != frame.len() {
            return false;
        }
        inner.data.copy_from_slice(frame);
        inner.updated = true;
        true
    }

    /// Hand the frame to `render` if one was written since the last hand-off
    pub fn consume_updated<R>(&self, render: impl FnOnce(&[u8], u32, u32) -> R) -> Option<R> {
        let mut inner = self.lock();
        if !inner.updated {
            return None;
        }
        inner.updated = false;
        Some(render(&inner.data, inner.width, inner.height))
    }

    /// Forget a written frame that was never handed off, returns whether
    /// there was one
    pub fn discard_pending(&self) -> bool {
        std::mem::take(&mut self.lock().updated)
    }

    /// Zero-fill and hand the black frame to `render`
    pub fn blackout<R>(&self, render: impl FnOnce(&[u8], u32, u32) -> R) -> R {
        let mut inner = self.lock();
        inner.data.fill(0);
        inner.updated = false;
        render(&inner.data, inner.width, inner.height)
    }

    /// Copy of the current contents, `None` before the first allocation
    pub fn snapshot(&self) -> Option<(Vec<u8>, u32, u32)> {
        let inner = self.lock();
        if inner.data.is_empty() {
            return None;
        }
        Some((inner.data.clone(), inner.width, inner.height))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let inner = self.lock();
        (inner.width, inner.height)
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
