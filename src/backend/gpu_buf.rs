//! RAII wrapper for CUDA device memory.
//!
//! `GpuBuf<T>` owns a contiguous device allocation; Drop calls cudaFree.
//! Transfers are explicit (`upload`/`download`); nothing here keeps host
//! and device coherent automatically. Only available with `--features cuda`.

use std::ffi::c_void;
use std::marker::PhantomData;

extern "C" {
    fn cudaMalloc(dev_ptr: *mut *mut c_void, size: usize) -> i32;
    fn cudaFree(dev_ptr: *mut c_void) -> i32;
    fn cudaMemcpy(dst: *mut c_void, src: *const c_void, count: usize, kind: i32) -> i32;
    fn cudaMemset(dev_ptr: *mut c_void, value: i32, count: usize) -> i32;
    fn cudaDeviceSynchronize() -> i32;
}

const CUDA_MEMCPY_HOST_TO_DEVICE: i32 = 1;
const CUDA_MEMCPY_DEVICE_TO_HOST: i32 = 2;

/// Marker trait for element types storable in device buffers.
pub trait GpuElement: Copy + Default + private::Sealed {}

mod private {
    pub trait Sealed {}
    impl Sealed for f32 {}
}

impl GpuElement for f32 {}

/// Owning device allocation of `len` elements of `T`.
#[derive(Debug)]
pub struct GpuBuf<T: GpuElement> {
    ptr: *mut c_void,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: GpuElement> GpuBuf<T> {
    /// Allocate `len` elements on the device, zero-initialized.
    ///
    /// # Panics
    /// Panics if the CUDA allocation fails; device memory exhaustion during
    /// setup is not a recoverable condition for this core.
    pub fn alloc(len: usize) -> Self {
        let bytes = len * std::mem::size_of::<T>();
        let mut ptr: *mut c_void = std::ptr::null_mut();
        // SAFETY: ptr is a valid out-parameter; bytes is the exact size.
        let rc = unsafe { cudaMalloc(&mut ptr, bytes) };
        assert_eq!(rc, 0, "cudaMalloc of {bytes} bytes failed with code {rc}");
        let rc = unsafe { cudaMemset(ptr, 0, bytes) };
        assert_eq!(rc, 0, "cudaMemset failed with code {rc}");
        Self { ptr, len, _marker: PhantomData }
    }

    /// Element count of the allocation.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the allocation holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw device pointer.
    pub fn as_ptr(&self) -> *const T {
        self.ptr as *const T
    }

    /// Raw mutable device pointer.
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr as *mut T
    }

    /// Copy host values to the device (host-to-device sync).
    ///
    /// # Panics
    /// Panics if `host.len()` exceeds the allocation or the transfer fails.
    pub fn upload(&mut self, host: &[T]) {
        assert!(host.len() <= self.len, "upload of {} into {} elements", host.len(), self.len);
        let bytes = host.len() * std::mem::size_of::<T>();
        // SAFETY: both pointers cover at least `bytes`.
        let rc = unsafe {
            cudaMemcpy(self.ptr, host.as_ptr().cast(), bytes, CUDA_MEMCPY_HOST_TO_DEVICE)
        };
        assert_eq!(rc, 0, "host-to-device copy failed with code {rc}");
    }

    /// Copy device values back to the host (device-to-host sync).
    ///
    /// Blocks until outstanding kernels complete.
    pub fn download(&self, host: &mut [T]) {
        assert!(host.len() <= self.len, "download of {} from {} elements", host.len(), self.len);
        let bytes = host.len() * std::mem::size_of::<T>();
        // SAFETY: both pointers cover at least `bytes`.
        let rc = unsafe {
            cudaDeviceSynchronize();
            cudaMemcpy(host.as_mut_ptr().cast(), self.ptr, bytes, CUDA_MEMCPY_DEVICE_TO_HOST)
        };
        assert_eq!(rc, 0, "device-to-host copy failed with code {rc}");
    }
}

impl<T: GpuElement> Drop for GpuBuf<T> {
    fn drop(&mut self) {
        // SAFETY: ptr came from cudaMalloc and is freed exactly once.
        unsafe {
            cudaFree(self.ptr);
        }
    }
}

// The training core is single-threaded; the buffer is never shared across
// threads, but Clone for Tensor requires the mirror to be re-creatable.
impl<T: GpuElement> Clone for GpuBuf<T> {
    fn clone(&self) -> Self {
        let mut host = vec![T::default(); self.len];
        self.download(&mut host);
        let mut fresh = Self::alloc(self.len);
        fresh.upload(&host);
        fresh
    }
}
