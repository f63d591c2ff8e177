//! Windows transport backed by the Win32 process memory APIs

use std::ffi::c_void;
use std::mem::size_of;

use tracing::debug;
use windows::Win32::{
    Foundation::{
        CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, FALSE, HANDLE, HMODULE,
    },
    System::{
        Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory},
        Memory::{
            MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
            PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE, VirtualAllocEx, VirtualFreeEx,
        },
        ProcessStatus::EnumProcessModules,
        Threading::{
            GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
            PROCESS_VM_READ, PROCESS_VM_WRITE,
        },
    },
};

use crate::error::{Error, Result};

use super::transport::{MemoryTransport, Protection, RawHandle};

/// Exit code reported by a process that is still running
const STILL_ACTIVE: u32 = 259;

fn to_handle(handle: RawHandle) -> HANDLE {
    HANDLE(handle.0 as *mut c_void)
}

fn page_protection(protection: Protection) -> PAGE_PROTECTION_FLAGS {
    match protection {
        Protection::ReadOnly => PAGE_READONLY,
        Protection::ReadWrite => PAGE_READWRITE,
        Protection::ExecuteRead => PAGE_EXECUTE_READ,
        Protection::ExecuteReadWrite => PAGE_EXECUTE_READWRITE,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsTransport;

impl WindowsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryTransport for WindowsTransport {
    fn open(&self, pid: u32) -> Result<RawHandle> {
        let handle = unsafe {
            OpenProcess(
                PROCESS_QUERY_INFORMATION | PROCESS_VM_OPERATION | PROCESS_VM_READ | PROCESS_VM_WRITE,
                FALSE,
                pid,
            )
        }
        .map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                Error::AccessDenied { pid }
            } else if e.code() == ERROR_INVALID_PARAMETER.to_hresult() {
                Error::NoSuchProcess { pid }
            } else {
                Error::ProcessOpenFailed {
                    pid,
                    message: e.to_string(),
                }
            }
        })?;
        Ok(RawHandle(handle.0 as isize))
    }

    fn close(&self, handle: RawHandle) -> bool {
        unsafe { CloseHandle(to_handle(handle)) }.is_ok()
    }

    fn read(&self, handle: RawHandle, address: u64, buffer: &mut [u8]) -> usize {
        let mut bytes_read: usize = 0;
        let result = unsafe {
            ReadProcessMemory(
                to_handle(handle),
                address as usize as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                buffer.len(),
                Some(&mut bytes_read),
            )
        };
        if let Err(e) = result {
            debug!("ReadProcessMemory at 0x{:X} failed: {}", address, e);
        }
        bytes_read
    }

    fn write(&self, handle: RawHandle, address: u64, bytes: &[u8]) -> usize {
        let mut bytes_written: usize = 0;
        let result = unsafe {
            WriteProcessMemory(
                to_handle(handle),
                address as usize as *const c_void,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                Some(&mut bytes_written),
            )
        };
        if let Err(e) = result {
            debug!("WriteProcessMemory at 0x{:X} failed: {}", address, e);
        }
        bytes_written
    }

    fn allocate(&self, handle: RawHandle, size: usize, protection: Protection) -> u64 {
        let address = unsafe {
            VirtualAllocEx(
                to_handle(handle),
                None,
                size,
                MEM_COMMIT | MEM_RESERVE,
                page_protection(protection),
            )
        };
        address as usize as u64
    }

    fn free(&self, handle: RawHandle, address: u64) -> bool {
        unsafe { VirtualFreeEx(to_handle(handle), address as usize as *mut c_void, 0, MEM_RELEASE) }
            .is_ok()
    }

    fn has_exited(&self, handle: RawHandle) -> bool {
        let mut exit_code: u32 = 0;
        match unsafe { GetExitCodeProcess(to_handle(handle), &mut exit_code) } {
            Ok(()) => exit_code != STILL_ACTIVE,
            Err(_) => true,
        }
    }

    fn main_module_base(&self, handle: RawHandle) -> Result<u64> {
        let mut modules = [HMODULE::default(); 1];
        let mut cb_needed = 0;
        unsafe {
            EnumProcessModules(
                to_handle(handle),
                modules.as_mut_ptr(),
                size_of::<[HMODULE; 1]>() as u32,
                &mut cb_needed,
            )
        }
        .map_err(|e| Error::QueryFailed(format!("EnumProcessModules: {}", e)))?;

        if cb_needed == 0 {
            return Err(Error::QueryFailed("process has no modules".to_string()));
        }
        // The first module listed is the executable
        Ok(modules[0].0 as usize as u64)
    }
}
