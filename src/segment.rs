//! POSIX shared-memory segment management: `shm_open`/`ftruncate`/`mmap`/
//! `munmap`/`shm_unlink`, wrapped behind a safe, `Drop`-unmapping handle.
//!
//! A [`Segment`] owns exactly one `mmap` region and nothing else; it knows
//! nothing about the ring-buffer layout living inside it. [`crate::queue`]
//! and [`crate::group`] interpret the bytes.

use std::ffi::CString;
use std::io;
use std::ptr;

use crate::error::{Error, Result};

/// An open mapping of a named shared-memory object.
///
/// Unmaps on drop. Does *not* unlink the name — unlinking the POSIX object
/// from the filesystem namespace is a separate, explicit operation performed
/// by whichever handle owns segment lifetime (see spec §4.1 "Close / Unlink").
pub struct Segment {
    ptr: *mut u8,
    size: usize,
    name: String,
}

// SAFETY: the mapped region is shared-memory backed and all concurrent
// mutation through it goes through atomics; a `Segment` itself is just a
// pointer + length and carries no thread-affine state.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Creates a new named segment of exactly `size` bytes, zero-initialized.
    ///
    /// Fails with [`Error::Exists`] if the name is already in use; the
    /// create-or-attach decision (spec §4.1) is made by the caller, which can
    /// fall back to [`Segment::attach`] on that error.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let c_name = validate_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated path; O_CREAT|O_EXCL
        // atomically fails instead of truncating an existing segment, so two
        // racing creators can never both believe they initialized it.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR | libc::O_EXCL, 0o600) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EEXIST) => Error::Exists,
                Some(libc::EACCES) => Error::Permission,
                _ => Error::SysErr(err),
            });
        }

        let ptr = match truncate_and_map(fd, size) {
            Ok(p) => p,
            Err(e) => {
                // SAFETY: fd is the valid descriptor opened above; we are on
                // an error path and it is not reused afterward.
                unsafe { libc::close(fd) };
                let _ = unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }
        };

        // SAFETY: fd is valid; mapping above holds its own reference so the
        // descriptor can be closed immediately after.
        unsafe { libc::close(fd) };

        // SAFETY: ptr and size come from the successful mmap above.
        unsafe { ptr::write_bytes(ptr, 0, size) };

        Ok(Self { ptr, size, name: name.to_string() })
    }

    /// Attaches to an existing named segment, mapping its *actual* size (the
    /// full file, not just the caller's guess) so the control header and
    /// ring buffer are both reachable regardless of the capacity/slot size
    /// the creator chose.
    pub fn attach(name: &str) -> Result<Self> {
        let c_name = validate_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated path.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::ENOENT) => Error::NotFound(name_owned_leak(name)),
                Some(libc::EACCES) => Error::Permission,
                _ => Error::SysErr(err),
            });
        }

        let size = match fstat_size(fd) {
            Ok(s) => s,
            Err(e) => {
                // SAFETY: fd valid from shm_open above, error path.
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        let ptr = match map(fd, size) {
            Ok(p) => p,
            Err(e) => {
                // SAFETY: fd valid from shm_open above, error path.
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        // SAFETY: fd valid; mapping holds its own reference.
        unsafe { libc::close(fd) };

        Ok(Self { ptr, size, name: name.to_string() })
    }

    /// Removes the name from the shared-memory namespace. Existing mappings
    /// (including `self`) remain valid until unmapped; the backing storage is
    /// only freed once every process has unmapped it.
    ///
    /// Idempotent: unlinking an already-unlinked name is not an error.
    pub fn unlink(name: &str) -> Result<()> {
        let c_name = validate_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated path; affects only the
        // shm namespace, not any existing mapping.
        let ret = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(Error::SysErr(err));
            }
        }
        Ok(())
    }

    /// Returns `true` if a segment with this name currently exists.
    pub fn exists(name: &str) -> bool {
        let Ok(c_name) = validate_name(name) else {
            return false;
        };
        // SAFETY: c_name is a valid NUL-terminated path; read-only probe.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd >= 0 {
            // SAFETY: fd just returned valid by shm_open above.
            unsafe { libc::close(fd) };
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: self.ptr/self.size were produced by the mmap call in
        // create()/attach() and munmap is only ever called once per mapping.
        unsafe {
            libc::munmap(self.ptr.cast(), self.size);
        }
    }
}

fn validate_name(name: &str) -> Result<CString> {
    if !name.starts_with('/') {
        return Err(Error::Invalid("segment name must start with '/'"));
    }
    if name.len() > 1 && name[1..].contains('/') {
        return Err(Error::Invalid("segment name must not contain '/' after the leading one"));
    }
    if name.len() > 255 {
        return Err(Error::Invalid("segment name too long (max 255 bytes)"));
    }
    CString::new(name).map_err(|_| Error::Invalid("segment name must not contain an interior NUL"))
}

/// Leaks the name into a `&'static str` for the rare not-found error path.
/// Segment names are short, and this path is not hot, so the one-time leak
/// is preferable to changing `Error::NotFound`'s signature to an owned string
/// for a single call site.
fn name_owned_leak(name: &str) -> &'static str {
    Box::leak(name.to_string().into_boxed_str())
}

fn fstat_size(fd: i32) -> Result<usize> {
    // SAFETY: stat is a plain-old-data struct; fd is a valid, open descriptor.
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: &mut stat is a valid pointer to a libc::stat-sized buffer.
    let ret = unsafe { libc::fstat(fd, &mut stat) };
    if ret < 0 {
        return Err(Error::SysErr(io::Error::last_os_error()));
    }
    Ok(stat.st_size as usize)
}

fn truncate_and_map(fd: i32, size: usize) -> Result<*mut u8> {
    // SAFETY: fd is a valid descriptor open for writing; size is caller-checked.
    let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
    if ret < 0 {
        return Err(Error::SysErr(io::Error::last_os_error()));
    }
    map(fd, size)
}

fn map(fd: i32, size: usize) -> Result<*mut u8> {
    // SAFETY: null base address lets the kernel choose; fd is valid and
    // sized at least `size` bytes; PROT_READ|WRITE and MAP_SHARED are valid
    // flags for a cross-process read-write mapping.
    let ptr = unsafe {
        libc::mmap(ptr::null_mut(), size, libc::PROT_READ | libc::PROT_WRITE, libc::MAP_SHARED, fd, 0)
    };
    if ptr == libc::MAP_FAILED {
        return Err(Error::SysErr(io::Error::last_os_error()));
    }
    Ok(ptr.cast())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name() -> String {
        let pid = std::process::id();
        let addr = &pid as *const u32 as usize;
        format!("/ringshm_test_{pid}_{addr}")
    }

    #[test]
    fn create_then_attach_round_trips_bytes() {
        let name = unique_name();
        let seg = Segment::create(&name, 4096).expect("create");
        // SAFETY: seg maps 4096 bytes; offset 0 is in bounds.
        unsafe {
            *seg.as_ptr() = 0xAB;
        }
        let seg2 = Segment::attach(&name).expect("attach");
        assert_eq!(seg2.size(), 4096);
        // SAFETY: seg2 maps the same 4096-byte object written above.
        unsafe {
            assert_eq!(*seg2.as_ptr(), 0xAB);
        }
        drop(seg);
        drop(seg2);
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn create_twice_fails_with_exists() {
        let name = unique_name();
        let _seg = Segment::create(&name, 4096).expect("create");
        let err = Segment::create(&name, 4096).unwrap_err();
        assert!(matches!(err, Error::Exists));
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn attach_nonexistent_fails_not_found() {
        let err = Segment::attach("/ringshm_test_does_not_exist").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn unlink_is_idempotent() {
        let name = unique_name();
        let _seg = Segment::create(&name, 4096).expect("create");
        Segment::unlink(&name).unwrap();
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn exists_reflects_lifecycle() {
        let name = unique_name();
        assert!(!Segment::exists(&name));
        let seg = Segment::create(&name, 4096).expect("create");
        assert!(Segment::exists(&name));
        drop(seg);
        Segment::unlink(&name).unwrap();
        assert!(!Segment::exists(&name));
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(Segment::create("no-leading-slash", 4096).is_err());
        assert!(Segment::create("/has/inner/slash", 4096).is_err());
    }
}
