//! Raw macOS bindings for Mach thread policies, os_workgroup and Core Audio
//!
//! Only the symbols this crate sequences are declared. Struct layouts follow
//! `<mach/thread_policy.h>`, `<os/workgroup_object.h>` and
//! `<CoreAudio/AudioHardware.h>` field for field.

#![allow(non_camel_case_types, non_snake_case)]

use libc::{c_char, c_int, c_uint, c_void};

pub type kern_return_t = c_int;
pub type mach_port_t = c_uint;
pub type thread_act_t = mach_port_t;
pub type thread_policy_flavor_t = c_uint;
pub type integer_t = c_int;
pub type boolean_t = c_int;
pub type mach_msg_type_number_t = c_uint;

pub type OSStatus = i32;
pub type AudioObjectID = u32;
pub type AudioObjectPropertySelector = u32;
pub type AudioObjectPropertyScope = u32;
pub type AudioObjectPropertyElement = u32;

pub type os_workgroup_t = *mut c_void;
pub type os_clockid_t = u32;

pub const KERN_SUCCESS: kern_return_t = 0;

pub const THREAD_EXTENDED_POLICY: thread_policy_flavor_t = 1;
pub const THREAD_TIME_CONSTRAINT_POLICY: thread_policy_flavor_t = 2;
pub const THREAD_PRECEDENCE_POLICY: thread_policy_flavor_t = 3;

pub const OS_CLOCK_MACH_ABSOLUTE_TIME: os_clockid_t = 32;

pub const kAudioObjectSystemObject: AudioObjectID = 1;
pub const kAudioObjectUnknown: AudioObjectID = 0;
pub const kAudioObjectPropertyScopeGlobal: AudioObjectPropertyScope = fourcc(b"glob");
pub const kAudioObjectPropertyElementMain: AudioObjectPropertyElement = 0;
pub const kAudioHardwarePropertyDefaultOutputDevice: AudioObjectPropertySelector = fourcc(b"dOut");
pub const kAudioDevicePropertyIOThreadOSWorkgroup: AudioObjectPropertySelector = fourcc(b"oswg");

#[cfg(target_pointer_width = "64")]
const OS_WORKGROUP_JOIN_TOKEN_SPI_SIZE: usize = 36;
#[cfg(not(target_pointer_width = "64"))]
const OS_WORKGROUP_JOIN_TOKEN_SPI_SIZE: usize = 28;

/// Core Audio four-character code, big-endian packed.
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct mach_timebase_info_data_t {
    pub numer: u32,
    pub denom: u32,
}

#[repr(C)]
pub struct thread_extended_policy_data_t {
    pub timeshare: boolean_t,
}

#[repr(C)]
pub struct thread_precedence_policy_data_t {
    pub importance: integer_t,
}

#[repr(C)]
pub struct thread_time_constraint_policy_data_t {
    pub period: u32,
    pub computation: u32,
    pub constraint: u32,
    pub preemptible: boolean_t,
}

#[repr(C)]
pub struct AudioObjectPropertyAddress {
    pub mSelector: AudioObjectPropertySelector,
    pub mScope: AudioObjectPropertyScope,
    pub mElement: AudioObjectPropertyElement,
}

#[repr(C)]
#[allow(dead_code)] // written by os_workgroup_join only
pub struct os_workgroup_join_token_s {
    sig: u32,
    opaque: [c_char; OS_WORKGROUP_JOIN_TOKEN_SPI_SIZE],
}

impl os_workgroup_join_token_s {
    pub const fn zeroed() -> Self {
        Self {
            sig: 0,
            opaque: [0; OS_WORKGROUP_JOIN_TOKEN_SPI_SIZE],
        }
    }
}

extern "C" {
    pub fn mach_timebase_info(info: *mut mach_timebase_info_data_t) -> kern_return_t;
    pub fn mach_absolute_time() -> u64;

    pub fn pthread_mach_thread_np(thread: libc::pthread_t) -> mach_port_t;
    pub fn thread_policy_set(
        thread: thread_act_t,
        flavor: thread_policy_flavor_t,
        policy_info: *mut integer_t,
        count: mach_msg_type_number_t,
    ) -> kern_return_t;

    pub fn os_workgroup_join(wg: os_workgroup_t, token: *mut os_workgroup_join_token_s) -> c_int;
    pub fn os_workgroup_leave(wg: os_workgroup_t, token: *mut os_workgroup_join_token_s);
    pub fn os_workgroup_interval_start(
        wg: os_workgroup_t,
        start: u64,
        deadline: u64,
        data: *mut c_void,
    ) -> c_int;
    pub fn os_workgroup_interval_finish(wg: os_workgroup_t, data: *mut c_void) -> c_int;

    pub fn os_release(object: *mut c_void);
}

#[link(name = "CoreAudio", kind = "framework")]
extern "C" {
    pub fn AudioObjectGetPropertyData(
        object_id: AudioObjectID,
        address: *const AudioObjectPropertyAddress,
        qualifier_data_size: u32,
        qualifier_data: *const c_void,
        data_size: *mut u32,
        data: *mut c_void,
    ) -> OSStatus;
}

#[link(name = "AudioToolbox", kind = "framework")]
extern "C" {
    pub fn AudioWorkIntervalCreate(
        name: *const c_char,
        clock: os_clockid_t,
        attr: *mut c_void,
    ) -> os_workgroup_t;
}
