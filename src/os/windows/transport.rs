//! Overlapped-events-based multiplexing: one named pipe instance per client slot, each carrying
//! its own connect-completion and data-completion events, waited on together with
//! `WaitForMultipleObjects`.

use super::{close_handle, create_instance, encode_wide_nul, PipeHandle};
use crate::{
    server::{
        transport::{DataSlot, HarvestOutcome, PendingAccept, Transport},
        ClientId, Timeout,
    },
    socket::Socket,
};
use std::{ffi::OsStr, io, ptr, sync::Arc};
use windows_sys::Win32::{
    Foundation::{
        CloseHandle, GetLastError, BOOL, ERROR_BROKEN_PIPE, ERROR_IO_PENDING, ERROR_PIPE_CONNECTED, HANDLE,
        INVALID_HANDLE_VALUE, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
    },
    Storage::FileSystem::ReadFile,
    System::{
        Pipes::{ConnectNamedPipe, DisconnectNamedPipe},
        Threading::{CreateEventW, ResetEvent, SetEvent, WaitForMultipleObjects, WaitForSingleObject, INFINITE},
        IO::{GetOverlappedResult, OVERLAPPED},
    },
};

#[derive(Copy, Clone, PartialEq, Eq)]
enum InstanceState {
    Idle,
    Accepted,
    /// Re-arm failed after a disconnect; excluded from future waits, still counted against
    /// `max_clients` until the server closes. See the Open Question resolved in `DESIGN.md`.
    Dead,
}

struct PipeInstance {
    handle: Arc<PipeHandle>,
    connect_event: HANDLE,
    data_event: HANDLE,
    overlapped: Box<OVERLAPPED>,
    buf: Vec<u8>,
    state: InstanceState,
}

impl PipeInstance {
    fn active_event(&self) -> HANDLE {
        match self.state {
            InstanceState::Idle => self.connect_event,
            InstanceState::Accepted => self.data_event,
            InstanceState::Dead => INVALID_HANDLE_VALUE,
        }
    }
}

/// A pipe instance whose connect event fired, awaiting admit/reject.
pub(crate) struct WindowsPending {
    index: usize,
    id: ClientId,
}
impl PendingAccept for WindowsPending {
    fn id(&self) -> ClientId { self.id }
}

pub(crate) struct WindowsTransport {
    wide_path: Vec<u16>,
    max_clients: usize,
    buffer_size: usize,
    instances: Vec<PipeInstance>,
    ready: Vec<usize>,
    pending_accept_cursor: usize,
}

fn zeroed_overlapped() -> OVERLAPPED {
    unsafe { std::mem::zeroed() }
}

fn create_event() -> io::Result<HANDLE> {
    let h = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
    if h.is_null() {
        Err(io::Error::last_os_error())
    } else {
        Ok(h)
    }
}

impl WindowsTransport {
    fn arm_connect(instance: &mut PipeInstance) -> io::Result<()> {
        *instance.overlapped = zeroed_overlapped();
        instance.overlapped.hEvent = instance.connect_event;
        let ok: BOOL = unsafe { ConnectNamedPipe(instance.handle.raw(), instance.overlapped.as_mut()) };
        if ok != 0 {
            // Connected synchronously (rare); the event never gets set by the kernel for us.
            unsafe { SetEvent(instance.connect_event) };
            return Ok(());
        }
        match unsafe { GetLastError() } {
            ERROR_IO_PENDING => Ok(()),
            ERROR_PIPE_CONNECTED => {
                unsafe { SetEvent(instance.connect_event) };
                Ok(())
            }
            _ => Err(io::Error::last_os_error()),
        }
    }

    fn arm_read(instance: &mut PipeInstance, buffer_size: usize) -> io::Result<()> {
        instance.buf.clear();
        instance.buf.resize(buffer_size, 0);
        *instance.overlapped = zeroed_overlapped();
        instance.overlapped.hEvent = instance.data_event;
        unsafe { ResetEvent(instance.data_event) };
        let len = u32::try_from(instance.buf.len()).unwrap_or(u32::MAX);
        let ok: BOOL = unsafe {
            ReadFile(instance.handle.raw(), instance.buf.as_mut_ptr().cast(), len, ptr::null_mut(), instance.overlapped.as_mut())
        };
        if ok != 0 {
            // Completed synchronously; fake the normal async-completion signal so harvesting is
            // uniform regardless of which path the kernel took.
            unsafe { SetEvent(instance.data_event) };
            return Ok(());
        }
        match unsafe { GetLastError() } {
            ERROR_IO_PENDING => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Disconnects and reconnects the same pipe instance/handle for the next client, reusing one
    /// `HANDLE` across sessions rather than recreating it on every connection (see `DESIGN.md`).
    /// If the re-arm fails on the existing handle, falls back to allocating a fresh instance and swapping
    /// it into the shared `Arc<PipeHandle>` via `replace`, so a `Client` still holding that `Arc`
    /// (if any) observes the new handle too, before giving up and marking the slot dead.
    fn rearm_for_next_client(instance: &mut PipeInstance, wide_path: &[u16], max_clients: usize, buffer_size: usize) {
        unsafe {
            DisconnectNamedPipe(instance.handle.raw());
        }
        instance.state = InstanceState::Idle;
        if Self::arm_connect(instance).is_ok() {
            return;
        }
        if let Ok(raw) = create_instance(wide_path, max_clients, buffer_size) {
            instance.handle.replace(raw);
            if Self::arm_connect(instance).is_ok() {
                return;
            }
        }
        instance.state = InstanceState::Dead;
    }
}

impl Transport for WindowsTransport {
    type Pending = WindowsPending;

    fn create(path: &OsStr, max_clients: usize, buffer_size: usize) -> io::Result<Self> {
        let wide_path = encode_wide_nul(path);
        let mut instances = Vec::with_capacity(max_clients);
        for _ in 0..max_clients {
            let raw = create_instance(&wide_path, max_clients, buffer_size)?;
            let connect_event = match create_event() {
                Ok(e) => e,
                Err(e) => {
                    close_handle(raw);
                    return Err(e);
                }
            };
            let data_event = match create_event() {
                Ok(e) => e,
                Err(e) => {
                    unsafe {
                        CloseHandle(connect_event);
                    }
                    close_handle(raw);
                    return Err(e);
                }
            };
            let mut instance = PipeInstance {
                handle: Arc::new(PipeHandle::new(raw)),
                connect_event,
                data_event,
                overlapped: Box::new(zeroed_overlapped()),
                buf: Vec::new(),
                state: InstanceState::Idle,
            };
            if let Err(e) = Self::arm_connect(&mut instance) {
                unsafe {
                    CloseHandle(connect_event);
                    CloseHandle(data_event);
                }
                close_handle(raw);
                return Err(e);
            }
            instances.push(instance);
        }
        Ok(Self { wide_path, max_clients, buffer_size, instances, ready: Vec::new(), pending_accept_cursor: 0 })
    }

    fn wait(&mut self, timeout: Timeout) -> io::Result<()> {
        self.ready.clear();
        self.pending_accept_cursor = 0;
        // `WaitForMultipleObjects` rejects the whole call if any handle in the array is invalid,
        // so dead slots (excluded from scans per the degraded-slot decision in `DESIGN.md`) must
        // not appear here at all; keep a side table back to each handle's real instance index.
        let live: Vec<(usize, HANDLE)> = self
            .instances
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.state != InstanceState::Dead)
            .map(|(index, inst)| (index, inst.active_event()))
            .collect();
        if live.is_empty() {
            return Ok(());
        }
        let handles: Vec<HANDLE> = live.iter().map(|&(_, h)| h).collect();
        let millis = match timeout {
            Timeout::Immediate => 0,
            Timeout::Millis(ms) => ms,
            Timeout::Infinite => INFINITE,
        };
        let ret = unsafe { WaitForMultipleObjects(handles.len() as u32, handles.as_ptr(), 0, millis) };
        if ret == WAIT_FAILED {
            return Err(io::Error::last_os_error());
        }
        if ret == WAIT_TIMEOUT {
            return Ok(());
        }
        // At least one handle fired; collect every other already-signalled handle too, so a tick
        // behaves like Unix's drain-the-backlog loop instead of surfacing one event at a time.
        let fired = ret.wrapping_sub(WAIT_OBJECT_0) as usize;
        for (pos, &(index, h)) in live.iter().enumerate() {
            if pos == fired {
                self.ready.push(index);
                continue;
            }
            if unsafe { WaitForSingleObject(h, 0) } == WAIT_OBJECT_0 {
                self.ready.push(index);
            }
        }
        Ok(())
    }

    fn next_pending_accept(&mut self) -> io::Result<Option<Self::Pending>> {
        while self.pending_accept_cursor < self.ready.len() {
            let index = self.ready[self.pending_accept_cursor];
            self.pending_accept_cursor += 1;
            let instance = &mut self.instances[index];
            if instance.state != InstanceState::Idle {
                continue;
            }
            let mut transferred = 0u32;
            let ok: BOOL =
                unsafe { GetOverlappedResult(instance.handle.raw(), instance.overlapped.as_mut(), &mut transferred, 0) };
            unsafe {
                ResetEvent(instance.connect_event);
            }
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            let id = ClientId::from_raw(instance.handle.raw() as isize as i64);
            return Ok(Some(WindowsPending { index, id }));
        }
        Ok(None)
    }

    fn admit(&mut self, pending: Self::Pending) -> io::Result<Socket> {
        let instance = &mut self.instances[pending.index];
        Self::arm_read(instance, self.buffer_size)?;
        instance.state = InstanceState::Accepted;
        Ok(Socket::from_pipe(Arc::clone(&instance.handle), true))
    }

    fn reject(&mut self, pending: Self::Pending) {
        let instance = &mut self.instances[pending.index];
        Self::rearm_for_next_client(instance, &self.wide_path, self.max_clients, self.buffer_size);
    }

    fn revoke(&mut self, id: ClientId) {
        if let Some(instance) = self
            .instances
            .iter_mut()
            .find(|inst| inst.state == InstanceState::Accepted && inst.handle.raw() as isize as i64 == id.as_raw())
        {
            Self::rearm_for_next_client(instance, &self.wide_path, self.max_clients, self.buffer_size);
        }
    }

    fn ready_data_slots(&self) -> Vec<DataSlot> {
        self.ready
            .iter()
            .copied()
            .filter(|&index| self.instances[index].state == InstanceState::Accepted)
            .map(|index| DataSlot { id: ClientId::from_raw(self.instances[index].handle.raw() as isize as i64), index })
            .collect()
    }

    fn harvest(&mut self, slot: DataSlot, buf: &mut Vec<u8>) -> HarvestOutcome {
        let instance = &mut self.instances[slot.index];
        let mut transferred = 0u32;
        let ok: BOOL =
            unsafe { GetOverlappedResult(instance.handle.raw(), instance.overlapped.as_mut(), &mut transferred, 0) };
        if ok == 0 {
            let err = io::Error::last_os_error();
            return if err.raw_os_error() == Some(ERROR_BROKEN_PIPE as i32) {
                HarvestOutcome::Disconnected
            } else {
                HarvestOutcome::Error(err)
            };
        }
        if transferred == 0 {
            return HarvestOutcome::Disconnected;
        }
        buf.clear();
        buf.extend_from_slice(&instance.buf[..transferred as usize]);
        if let Err(e) = Self::arm_read(instance, self.buffer_size) {
            return HarvestOutcome::Error(e);
        }
        HarvestOutcome::Data(transferred as usize)
    }

    fn reclaim(&mut self, slot: DataSlot) {
        let instance = &mut self.instances[slot.index];
        Self::rearm_for_next_client(instance, &self.wide_path, self.max_clients, self.buffer_size);
    }

    fn compact(&mut self) {
        // The instance array never shifts; nothing to do.
    }

    fn client_count(&self) -> usize {
        self.instances.iter().filter(|inst| inst.state != InstanceState::Idle).count()
    }

    fn teardown(&mut self) {
        for instance in &mut self.instances {
            unsafe {
                CloseHandle(instance.connect_event);
                CloseHandle(instance.data_event);
            }
            // Accepted instances' handles are shared with a dispatched `Client`'s `Socket` (see
            // the `Transport::teardown` contract); only close the ones the transport alone owns.
            if instance.state != InstanceState::Accepted {
                instance.handle.close();
            }
        }
        self.instances.clear();
    }
}
