use std::{cell::UnsafeCell, fmt, slice};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A flat buffer of `f32` values that many threads can read and write at the same time without
/// taking any lock.
///
/// It embraces race conditions, concurrent writes to the same slot are not synchronized and the
/// last writer wins. This is the Hogwild arena every weight, bias and optimizer array lives in.
pub struct WildBuf {
    data: Box<[UnsafeCell<f32>]>,
}

// SAFETY: The buffer is only ever accessed through plain `f32` loads and stores. Torn or lost
//         updates are accepted as the price of lock-free training, the buffer itself is never
//         reallocated while shared.
unsafe impl Send for WildBuf {}
unsafe impl Sync for WildBuf {}

impl WildBuf {
    /// Creates a new `WildBuf` filled with zeros.
    ///
    /// # Arguments
    /// * `len` - The amount of values in the buffer.
    ///
    /// # Returns
    /// A new `WildBuf` instance.
    pub fn zeros(len: usize) -> Self {
        Self::from_vec(vec![0.; len])
    }

    /// Creates a new `WildBuf` taking ownership of the given values.
    ///
    /// # Arguments
    /// * `values` - The initial state of the buffer.
    ///
    /// # Returns
    /// A new `WildBuf` instance.
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            data: values.into_iter().map(UnsafeCell::new).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        // SAFETY: The cell lives as long as `self`, racing writers are tolerated.
        unsafe { *self.data[i].get() }
    }

    #[inline]
    pub fn set(&self, i: usize, value: f32) {
        // SAFETY: Same as `get`.
        unsafe { *self.data[i].get() = value }
    }

    #[inline]
    pub fn add(&self, i: usize, delta: f32) {
        // SAFETY: Same as `get`. The read-modify-write is not atomic on purpose.
        unsafe { *self.data[i].get() += delta }
    }

    /// Gives a read-only view of the whole buffer.
    ///
    /// Other threads may still be writing through the shared arena while the view is alive, the
    /// values observed are whatever was last stored.
    pub fn as_slice(&self) -> &[f32] {
        // SAFETY: `UnsafeCell<f32>` has the same layout as `f32` and the buffer is never resized.
        unsafe { slice::from_raw_parts(self.data.as_ptr() as *const f32, self.data.len()) }
    }

    /// Gives a mutable view of the whole buffer, requires exclusive access.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: `&mut self` guarantees no other reference to the cells exists.
        unsafe { slice::from_raw_parts_mut(self.data.as_mut_ptr() as *mut f32, self.data.len()) }
    }
}

impl Clone for WildBuf {
    fn clone(&self) -> Self {
        Self::from_vec(self.as_slice().to_vec())
    }
}

impl fmt::Debug for WildBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WildBuf").field("len", &self.len()).finish()
    }
}

impl Serialize for WildBuf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.as_slice())
    }
}

impl<'de> Deserialize<'de> for WildBuf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<f32>::deserialize(deserializer).map(Self::from_vec)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn element_access() {
        let buf = WildBuf::zeros(4);
        buf.set(1, 2.);
        buf.add(1, 0.5);
        buf.add(3, -1.);

        assert_eq!(buf.as_slice(), [0., 2.5, 0., -1.]);
    }

    #[test]
    fn clone_is_deep() {
        let buf = WildBuf::from_vec(vec![1., 2.]);
        let copy = buf.clone();
        buf.set(0, 7.);

        assert_eq!(copy.as_slice(), [1., 2.]);
    }

    #[test]
    fn disjoint_concurrent_writers() {
        const THREADS: usize = 8;
        const SLOTS: usize = 1024;

        let buf = WildBuf::zeros(THREADS * SLOTS);

        thread::scope(|s| {
            for t in 0..THREADS {
                let buf = &buf;
                s.spawn(move || {
                    for i in 0..SLOTS {
                        buf.add(t * SLOTS + i, 1.);
                    }
                });
            }
        });

        assert!(buf.as_slice().iter().all(|&v| v == 1.));
    }
}
