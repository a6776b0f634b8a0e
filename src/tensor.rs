//! Dense row-major tensor with logical shape distinct from capacity.
//!
//! Every numeric kernel operates on the logical `rows x cols` prefix of the
//! allocated buffer, so a tensor sized for the largest batch can carry a
//! smaller final batch without reallocating. With the `cuda` feature the
//! tensor optionally mirrors a device-resident buffer; host and device are
//! considered divergent immediately after any device-side mutation, and a
//! caller must request synchronization explicitly before reading the stale
//! side.

#[cfg(feature = "cuda")]
use crate::backend::gpu_buf::GpuBuf;

/// Dense row-major vector/matrix buffer.
///
/// A vector is represented as a single-row matrix. `len() = rows * cols` is
/// always at most the allocated capacity; `resize` within capacity is free.
#[derive(Clone, Debug, Default)]
pub struct Tensor {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
    #[cfg(feature = "cuda")]
    device: Option<GpuBuf<f32>>,
    /// Host copy is stale: the device buffer was mutated since the last sync.
    #[cfg(feature = "cuda")]
    host_stale: bool,
}

impl Tensor {
    /// Create a zero-filled tensor with the given logical shape.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
            #[cfg(feature = "cuda")]
            device: None,
            #[cfg(feature = "cuda")]
            host_stale: false,
        }
    }

    /// Create a 1 x n row vector.
    pub fn vector(n: usize) -> Self {
        Self::new(1, n)
    }

    /// Create a tensor from existing values, shaped `rows x cols`.
    ///
    /// # Panics
    /// Panics if `values.len() != rows * cols`.
    pub fn from_vec(values: Vec<f32>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            values.len(),
            rows * cols,
            "tensor shape {rows}x{cols} does not match {} values",
            values.len()
        );
        Self {
            data: values,
            rows,
            cols,
            #[cfg(feature = "cuda")]
            device: None,
            #[cfg(feature = "cuda")]
            host_stale: false,
        }
    }

    /// Logical row count.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Logical column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Logical element count (`rows * cols`).
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// True when the logical shape is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated capacity in elements.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Change the logical shape.
    ///
    /// Shrinking or reshaping within capacity never reallocates; growing
    /// beyond capacity extends the buffer with zeros. Capacity is monotone,
    /// which is what the shared scratch tensor relies on: it only ever grows
    /// to the largest batch seen.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        let needed = rows * cols;
        if needed > self.data.len() {
            self.data.resize(needed, 0.0);
            #[cfg(feature = "cuda")]
            {
                // Device mirror no longer covers the allocation.
                self.device = None;
            }
        }
        self.rows = rows;
        self.cols = cols;
    }

    /// Host view of the logical prefix.
    pub fn host(&self) -> &[f32] {
        #[cfg(feature = "cuda")]
        debug_assert!(!self.host_stale, "host read of a device-divergent tensor");
        &self.data[..self.rows * self.cols]
    }

    /// Mutable host view of the logical prefix.
    pub fn host_mut(&mut self) -> &mut [f32] {
        let n = self.rows * self.cols;
        &mut self.data[..n]
    }

    /// Copy the logical contents of `src` into this tensor, adopting its shape.
    pub fn assign(&mut self, src: &Tensor) {
        self.resize(src.rows, src.cols);
        self.host_mut().copy_from_slice(src.host());
    }
}

#[cfg(feature = "cuda")]
impl Tensor {
    /// Ensure a device mirror exists covering the full allocation.
    fn ensure_device(&mut self) {
        if self.device.as_ref().map_or(true, |d| d.len() < self.data.len()) {
            self.device = Some(GpuBuf::alloc(self.data.len()));
        }
    }

    /// Push the host contents to the device mirror.
    pub fn sync_to_device(&mut self) {
        self.ensure_device();
        let dev = self.device.as_mut().unwrap();
        dev.upload(&self.data);
        self.host_stale = false;
    }

    /// Pull the device contents back to the host buffer.
    pub fn sync_to_host(&mut self) {
        if let Some(dev) = &self.device {
            dev.download(&mut self.data);
        }
        self.host_stale = false;
    }

    /// Device buffer, if mirrored.
    pub fn device(&self) -> Option<&GpuBuf<f32>> {
        self.device.as_ref()
    }

    /// Mutable device buffer; marks the host copy divergent.
    ///
    /// Callers must `sync_to_host` before the next host read.
    pub fn device_mut(&mut self) -> &mut GpuBuf<f32> {
        self.ensure_device();
        self.host_stale = true;
        self.device.as_mut().unwrap()
    }
}
