//! Joining real-time threads to OS workgroups
//!
//! An audio device's I/O thread runs inside an `os_workgroup`. Helper threads
//! that do real-time work for the same deadline join that workgroup so the
//! scheduler can account for them together. Joining hands back a token that
//! must be passed to the matching leave call on the same thread; here the token
//! lives in a [`JoinGuard`] which leaves when consumed or dropped.
//!
//! ```text
//! NotRealtime ──set_realtime──▶ Promoted ──join_workgroup──▶ JoinGuard
//!                                                              │
//!                                   interval_start/finish ◀────┤ per cycle
//!                                                              │
//!                                               leave / drop ──▶ Left
//! ```
//!
//! [`WorkgroupBackend`] is the seam between the join protocol and the OS;
//! [`Workgroup`] implements it with the real `os_workgroup_*` calls on macOS.

use std::marker::PhantomData;

use crate::error::{Error, JoinRejection, Result};
use crate::realtime::Promoted;

/// Core Audio device identifier (`AudioObjectID`)
pub type AudioDeviceId = u32;

/// Raw workgroup operations, returning the OS error code on failure
pub trait WorkgroupBackend {
    /// Membership token handed back by a successful join
    type Token;

    fn join(&self) -> std::result::Result<Self::Token, i32>;
    fn leave(&self, token: Self::Token);
    fn interval_start(&self, start: u64, deadline: u64) -> std::result::Result<(), i32>;
    fn interval_finish(&self) -> std::result::Result<(), i32>;
}

/// Join the calling thread to `workgroup`
///
/// Rejections are classified into [`JoinRejection`] and returned; the caller
/// decides whether to continue outside the workgroup.
pub fn join_workgroup<'w, W>(promoted: &Promoted, workgroup: &'w W) -> Result<JoinGuard<'w, W>>
where
    W: WorkgroupBackend + ?Sized,
{
    match workgroup.join() {
        Ok(token) => {
            tracing::debug!(period = promoted.policy().period, "joined workgroup");
            Ok(JoinGuard {
                workgroup,
                token: Some(token),
                _thread: PhantomData,
            })
        }
        Err(code) => {
            let rejection = JoinRejection::from_code(code);
            tracing::warn!(code, %rejection, "os_workgroup_join failed");
            Err(Error::JoinRejected(rejection))
        }
    }
}

/// Workgroup membership of the calling thread
///
/// Leaves the workgroup exactly once: on [`JoinGuard::leave`] or on drop.
/// Not `Send`: the leave call must happen on the thread that joined.
pub struct JoinGuard<'w, W>
where
    W: WorkgroupBackend + ?Sized,
{
    workgroup: &'w W,
    token: Option<W::Token>,
    _thread: PhantomData<*const ()>,
}

impl<'w, W> JoinGuard<'w, W>
where
    W: WorkgroupBackend + ?Sized,
{
    pub fn workgroup(&self) -> &'w W {
        self.workgroup
    }

    /// Mark the start of a work cycle ending no later than `deadline`
    pub fn interval_start(&self, start: u64, deadline: u64) -> std::result::Result<(), i32> {
        self.workgroup.interval_start(start, deadline)
    }

    pub fn interval_finish(&self) -> std::result::Result<(), i32> {
        self.workgroup.interval_finish()
    }

    /// Leave the workgroup now
    pub fn leave(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(token) = self.token.take() {
            self.workgroup.leave(token);
            tracing::debug!("left workgroup");
        }
    }
}

impl<W> Drop for JoinGuard<'_, W>
where
    W: WorkgroupBackend + ?Sized,
{
    fn drop(&mut self) {
        self.release();
    }
}

impl<W> std::fmt::Debug for JoinGuard<'_, W>
where
    W: WorkgroupBackend + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinGuard")
            .field("joined", &self.token.is_some())
            .finish()
    }
}

/// Where to find the workgroup a thread should join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkgroupSource {
    /// The I/O workgroup of a specific audio device
    Device(AudioDeviceId),
    /// The I/O workgroup of the system default output device
    DefaultOutputDevice,
    /// A work interval created by this process under the given name
    NamedInterval(String),
}

/// A retained `os_workgroup_t`
///
/// Shared read-only by every thread that joins it; the reference is released
/// on drop. Only constructible on macOS.
pub struct Workgroup {
    #[cfg(target_os = "macos")]
    raw: std::ptr::NonNull<libc::c_void>,
    #[cfg(not(target_os = "macos"))]
    never: std::convert::Infallible,
}

/// Token filled in by `os_workgroup_join`
pub struct JoinToken {
    #[cfg(target_os = "macos")]
    raw: Box<crate::sys::os_workgroup_join_token_s>,
    #[cfg(not(target_os = "macos"))]
    never: std::convert::Infallible,
}

impl Workgroup {
    pub fn resolve(source: &WorkgroupSource) -> Result<Self> {
        match source {
            WorkgroupSource::Device(device) => Self::for_device(*device),
            WorkgroupSource::DefaultOutputDevice => Self::for_device(default_output_device()?),
            WorkgroupSource::NamedInterval(name) => Self::create_interval(name),
        }
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::{AudioDeviceId, JoinToken, Workgroup, WorkgroupBackend};
    use crate::error::{Error, Result};
    use crate::sys;
    use std::ffi::CString;
    use std::ptr::{self, NonNull};

    // SAFETY: os_workgroup objects are reference counted and thread-safe.
    unsafe impl Send for Workgroup {}
    unsafe impl Sync for Workgroup {}

    impl Workgroup {
        /// Wrap a retained `os_workgroup_t`, taking over its reference
        ///
        /// # Safety
        ///
        /// `raw` must be null or a valid `os_workgroup_t` carrying a +1
        /// reference that the caller gives up.
        pub unsafe fn from_raw_retained(raw: sys::os_workgroup_t) -> Option<Self> {
            NonNull::new(raw).map(|raw| Self { raw })
        }

        pub fn as_raw(&self) -> sys::os_workgroup_t {
            self.raw.as_ptr()
        }

        /// The I/O thread workgroup of an audio device
        pub fn for_device(device: AudioDeviceId) -> Result<Self> {
            let address = sys::AudioObjectPropertyAddress {
                mSelector: sys::kAudioDevicePropertyIOThreadOSWorkgroup,
                mScope: sys::kAudioObjectPropertyScopeGlobal,
                mElement: sys::kAudioObjectPropertyElementMain,
            };
            let mut workgroup: sys::os_workgroup_t = ptr::null_mut();
            let mut size = std::mem::size_of::<sys::os_workgroup_t>() as u32;
            // SAFETY: address, size and the output slot are valid for the call;
            // the property yields a retained os_workgroup_t.
            let status = unsafe {
                sys::AudioObjectGetPropertyData(
                    device,
                    &address,
                    0,
                    ptr::null(),
                    &mut size,
                    (&mut workgroup as *mut sys::os_workgroup_t).cast(),
                )
            };
            if status != 0 {
                tracing::warn!(device, status, "AudioObjectGetPropertyData IOThreadOSWorkgroup failed");
                return Err(Error::PropertyQueryFailed {
                    object: device,
                    status,
                });
            }
            tracing::debug!(device, property_size = size, "resolved device workgroup");

            // SAFETY: on success the property hands over a +1 reference.
            unsafe { Self::from_raw_retained(workgroup) }.ok_or(Error::PropertyQueryFailed {
                object: device,
                status,
            })
        }

        /// Create a work interval on the Mach absolute-time clock
        pub fn create_interval(name: &str) -> Result<Self> {
            let c_name = CString::new(name).map_err(|_| Error::IntervalCreateFailed {
                name: name.to_string(),
            })?;
            // SAFETY: c_name outlives the call; a null attr is documented as valid.
            let raw = unsafe {
                sys::AudioWorkIntervalCreate(
                    c_name.as_ptr(),
                    sys::OS_CLOCK_MACH_ABSOLUTE_TIME,
                    ptr::null_mut(),
                )
            };
            // SAFETY: AudioWorkIntervalCreate returns a +1 reference or null.
            unsafe { Self::from_raw_retained(raw) }.ok_or_else(|| {
                tracing::warn!(name, "AudioWorkIntervalCreate returned no interval");
                Error::IntervalCreateFailed {
                    name: name.to_string(),
                }
            })
        }
    }

    impl Drop for Workgroup {
        fn drop(&mut self) {
            // SAFETY: we own exactly one reference to the object.
            unsafe { sys::os_release(self.raw.as_ptr()) }
        }
    }

    impl WorkgroupBackend for Workgroup {
        type Token = JoinToken;

        fn join(&self) -> std::result::Result<JoinToken, i32> {
            let mut raw = Box::new(sys::os_workgroup_join_token_s::zeroed());
            // SAFETY: the workgroup is live and the token is writable.
            let result = unsafe { sys::os_workgroup_join(self.as_raw(), &mut *raw) };
            if result == 0 {
                Ok(JoinToken { raw })
            } else {
                Err(result)
            }
        }

        fn leave(&self, mut token: JoinToken) {
            // SAFETY: the token came from os_workgroup_join on this workgroup.
            unsafe { sys::os_workgroup_leave(self.as_raw(), &mut *token.raw) }
        }

        fn interval_start(&self, start: u64, deadline: u64) -> std::result::Result<(), i32> {
            // SAFETY: the workgroup is live; null interval data is allowed.
            let result = unsafe {
                sys::os_workgroup_interval_start(self.as_raw(), start, deadline, ptr::null_mut())
            };
            if result == 0 {
                Ok(())
            } else {
                Err(result)
            }
        }

        fn interval_finish(&self) -> std::result::Result<(), i32> {
            // SAFETY: the workgroup is live; null interval data is allowed.
            let result =
                unsafe { sys::os_workgroup_interval_finish(self.as_raw(), ptr::null_mut()) };
            if result == 0 {
                Ok(())
            } else {
                Err(result)
            }
        }
    }

    pub fn default_output_device() -> Result<AudioDeviceId> {
        let address = sys::AudioObjectPropertyAddress {
            mSelector: sys::kAudioHardwarePropertyDefaultOutputDevice,
            mScope: sys::kAudioObjectPropertyScopeGlobal,
            mElement: sys::kAudioObjectPropertyElementMain,
        };
        let mut device: AudioDeviceId = sys::kAudioObjectUnknown;
        let mut size = std::mem::size_of::<AudioDeviceId>() as u32;
        // SAFETY: address, size and the output slot are valid for the call.
        let status = unsafe {
            sys::AudioObjectGetPropertyData(
                sys::kAudioObjectSystemObject,
                &address,
                0,
                ptr::null(),
                &mut size,
                (&mut device as *mut AudioDeviceId).cast(),
            )
        };
        if status != 0 {
            tracing::warn!(status, "AudioObjectGetPropertyData DefaultOutputDevice failed");
            return Err(Error::PropertyQueryFailed {
                object: sys::kAudioObjectSystemObject,
                status,
            });
        }
        if device == sys::kAudioObjectUnknown {
            return Err(Error::NoDefaultOutputDevice);
        }
        Ok(device)
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::{AudioDeviceId, JoinToken, Workgroup, WorkgroupBackend};
    use crate::error::{Error, Result};

    impl Workgroup {
        pub fn for_device(device: AudioDeviceId) -> Result<Self> {
            tracing::warn!(device, "audio device workgroups are unavailable on this platform");
            Err(Error::Unsupported("os_workgroup"))
        }

        pub fn create_interval(name: &str) -> Result<Self> {
            tracing::warn!(name, "work intervals are unavailable on this platform");
            Err(Error::Unsupported("os_workgroup"))
        }
    }

    impl WorkgroupBackend for Workgroup {
        type Token = JoinToken;

        fn join(&self) -> std::result::Result<JoinToken, i32> {
            match self.never {}
        }

        fn leave(&self, token: JoinToken) {
            match token.never {}
        }

        fn interval_start(&self, _start: u64, _deadline: u64) -> std::result::Result<(), i32> {
            match self.never {}
        }

        fn interval_finish(&self) -> std::result::Result<(), i32> {
            match self.never {}
        }
    }

    pub fn default_output_device() -> Result<AudioDeviceId> {
        Err(Error::Unsupported("Core Audio device queries"))
    }
}

/// The system default output device
pub use platform::default_output_device;
