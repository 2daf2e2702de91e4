//! Simulated reader speaking the wire protocol.
//!
//! [`SimulatedReader`] is a [`Transport`] that decodes request frames and
//! answers them from an in-memory reader: a tag field, tag memory, and both
//! parameter tables. The paired [`SimulatorHandle`] controls that state and
//! injects faults from the test side.
//!
//! ```
//! use taglink_core::TagType;
//! use taglink_hardware::mock::SimulatedReader;
//! use taglink_hardware::{ReaderSession, TransportDevice};
//!
//! let (reader, handle) = SimulatedReader::new();
//! handle.add_tag(TagType::Gen2, &[0xE2, 0x00, 0x34, 0x12]);
//!
//! let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();
//! let tags = session.get_tags(TagType::AutoDetect).unwrap();
//! assert_eq!(tags[0].friendly, "E2003412");
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use taglink_core::{
    BaudRate, Error, HostInterface, Result, TagType, TransportKind,
    constants::{DEFAULT_COMMAND_RETRIES, GEN2_BLOCK_SIZE, SYSTEM_PARAMETER_SPACE_SIZE},
};
use taglink_protocol::{
    CommandCode, PROTOCOL_VERSION, ReaderInfo, Request, Response, StatusCode, TagLinkCodec,
};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::params::SystemParameter;
use crate::transport::{Transport, millis};

const CONFIG_REGISTERS: usize = 256;
const ENDLESS_TAG_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct SimTag {
    tag_type: TagType,
    id: Bytes,
    block_size: usize,
    banks: HashMap<u8, Vec<u8>>,
    config: Vec<u8>,
    force_bits: HashMap<u16, u8>,
    /// Locked blocks as (bank, block); configuration registers use bank `None`.
    locked: HashSet<(Option<u8>, u16)>,
    password: Option<Bytes>,
}

impl SimTag {
    fn new(tag_type: TagType, id: &[u8]) -> Self {
        let block_size = if tag_type == TagType::Gen2 {
            GEN2_BLOCK_SIZE
        } else {
            4
        };
        Self {
            tag_type,
            id: Bytes::copy_from_slice(id),
            block_size,
            banks: HashMap::new(),
            config: vec![0; CONFIG_REGISTERS],
            force_bits: HashMap::new(),
            locked: HashSet::new(),
            password: None,
        }
    }
}

#[derive(Debug)]
struct State {
    info: ReaderInfo,
    tags: Vec<SimTag>,
    current: Vec<u8>,
    defaults: Vec<u8>,
    outbox: VecDeque<u8>,
    requests: Vec<Request>,

    drop_next: u32,
    loop_off_next: u32,
    nack_next: VecDeque<StatusCode>,
    failing_commands: HashMap<CommandCode, StatusCode>,
    failing_parameters: HashMap<u16, StatusCode>,
    /// Successful answers left before `command` starts failing with the status.
    failing_after: HashMap<CommandCode, (u32, StatusCode)>,
    refuse_port_rate: bool,
    disconnected: bool,
    refuse_open: bool,
    silent: bool,

    endless_inventory: bool,
    inventory: Option<(TagType, usize)>,

    open_count: u32,
    close_count: u32,
    /// Rate the reader listens at.
    line_rate: u32,
    host_baud_rate: Option<u32>,
}

impl State {
    fn new() -> Self {
        let mut params = vec![0u8; SYSTEM_PARAMETER_SPACE_SIZE as usize];
        let mut put = |key: SystemParameter, value: &[u8]| {
            let start = usize::from(key.address());
            params[start..start + value.len()].copy_from_slice(value);
        };
        put(SystemParameter::SerialNumber, &[0x00, 0x00, 0x00, 0x01]);
        put(SystemParameter::FirmwareVersion, &[0x01, 0x04, 0x00, 0x02]);
        put(SystemParameter::HardwareVersion, &[0x02, 0x00]);
        put(SystemParameter::ProductCode, &[0x00, 0x0A]);
        put(SystemParameter::ReaderName, b"SIM-1");
        put(SystemParameter::HostInterface, &[HostInterface::Serial.code()]);
        put(SystemParameter::BaudRate, &[BaudRate::B38400.code()]);
        put(SystemParameter::TagPopulation, &[0x10]);
        put(SystemParameter::CommandRetry, &[DEFAULT_COMMAND_RETRIES]);
        put(SystemParameter::TxPower, &[0x1E]);

        Self {
            info: ReaderInfo {
                protocol_version: PROTOCOL_VERSION,
                manufacturer: "TagLink".to_string(),
                model: "SIM-1".to_string(),
                firmware: "1.4.0".to_string(),
                serial_number: "00000001".to_string(),
            },
            tags: Vec::new(),
            defaults: params.clone(),
            current: params,
            outbox: VecDeque::new(),
            requests: Vec::new(),
            drop_next: 0,
            loop_off_next: 0,
            nack_next: VecDeque::new(),
            failing_commands: HashMap::new(),
            failing_parameters: HashMap::new(),
            failing_after: HashMap::new(),
            refuse_port_rate: false,
            disconnected: false,
            refuse_open: false,
            silent: false,
            endless_inventory: false,
            inventory: None,
            open_count: 0,
            close_count: 0,
            line_rate: BaudRate::B38400.rate(),
            host_baud_rate: None,
        }
    }

    fn tag_mut(&mut self, id: &[u8]) -> Option<&mut SimTag> {
        self.tags.iter_mut().find(|t| t.id == id)
    }

    fn queue(&mut self, response: Response) {
        let mut frame = BytesMut::new();
        match TagLinkCodec::<Request>::new().encode(response, &mut frame) {
            Ok(()) => self.outbox.extend(frame.iter().copied()),
            Err(e) => trace!(error = %e, "Simulated response not encodable"),
        }
    }

    fn handle(&mut self, request: Request) {
        trace!(command = %request.command, "Simulated reader request");
        self.requests.push(request.clone());
        if request.command != CommandCode::SelectTag || !request.flags.inventory {
            self.inventory = None;
        }

        if self.silent {
            return;
        }
        if self.host_baud_rate.is_some_and(|rate| rate != self.line_rate) {
            trace!(line_rate = self.line_rate, "Request garbled by a baud rate mismatch");
            return;
        }
        if self.drop_next > 0 {
            self.drop_next -= 1;
            return;
        }
        if self.loop_off_next > 0 {
            self.loop_off_next -= 1;
            self.queue(Response::new(request.command, StatusCode::LoopOff));
            return;
        }
        if let Some(status) = self.nack_next.pop_front() {
            self.queue(Response::new(request.command, status));
            return;
        }
        if let Some(status) = self.failing_commands.get(&request.command) {
            let status = *status;
            self.queue(Response::new(request.command, status));
            return;
        }
        if let Some((remaining, status)) = self.failing_after.get_mut(&request.command) {
            if *remaining == 0 {
                let status = *status;
                self.queue(Response::new(request.command, status));
                return;
            }
            *remaining -= 1;
        }

        let command = request.command;
        match self.execute(request) {
            Ok(responses) => responses.into_iter().for_each(|r| self.queue(r)),
            Err(status) => self.queue(Response::new(command, status)),
        }
    }

    fn execute(&mut self, request: Request) -> std::result::Result<Vec<Response>, StatusCode> {
        let command = request.command;
        match command {
            CommandCode::GetReaderInfo => {
                let data = self.info.to_bytes().map_err(|_| StatusCode::ReadFailed)?;
                Ok(vec![Response::new(command, StatusCode::Success).with_data(data)])
            }
            CommandCode::SelectTag if request.flags.inventory => Ok(self.inventory_round(&request)),
            CommandCode::SelectTag => {
                let tag = self
                    .tags
                    .iter()
                    .find(|t| request.tag_type.matches(t.tag_type))
                    .ok_or(StatusCode::NoTag)?;
                Ok(vec![
                    Response::new(command, StatusCode::Success).with_tag(tag.tag_type, tag.id.clone()),
                ])
            }
            CommandCode::ReadSystemParameter | CommandCode::RetrieveDefaultParameter => {
                let table = if command == CommandCode::ReadSystemParameter {
                    &self.current
                } else {
                    &self.defaults
                };
                let range = param_range(&request, table.len())?;
                let data = Bytes::copy_from_slice(&table[range]);
                Ok(vec![Response::new(command, StatusCode::Success).with_data(data)])
            }
            CommandCode::WriteSystemParameter | CommandCode::StoreDefaultParameter => {
                if let Some(status) = self.failing_parameters.get(&request.address) {
                    return Err(*status);
                }
                let data = request.data.clone().ok_or(StatusCode::InvalidParameter)?;
                let table = if command == CommandCode::WriteSystemParameter {
                    &mut self.current
                } else {
                    &mut self.defaults
                };
                let range = param_range(&request, table.len())?;
                if data.len() != range.len() {
                    return Err(StatusCode::InvalidParameter);
                }
                table[range].copy_from_slice(&data);
                if command == CommandCode::WriteSystemParameter {
                    self.apply_line_settings(request.address);
                }
                Ok(vec![Response::new(command, StatusCode::Success)])
            }
            CommandCode::ReadTag => {
                let tag = self.addressed_tag(&request)?;
                let start = usize::from(request.address) * tag.block_size;
                let len = usize::from(request.blocks) * tag.block_size;
                let bank = tag.banks.entry(request.bank).or_default();
                if bank.len() < start + len {
                    bank.resize(start + len, 0);
                }
                let data = Bytes::copy_from_slice(&bank[start..start + len]);
                Ok(vec![Response::new(command, StatusCode::Success).with_data(data)])
            }
            CommandCode::WriteTag => {
                let lock = request.flags.lock;
                let data = request.data.clone().ok_or(StatusCode::InvalidParameter)?;
                let tag = self.addressed_tag(&request)?;
                let start = usize::from(request.address) * tag.block_size;
                if data.len() != usize::from(request.blocks) * tag.block_size {
                    return Err(StatusCode::InvalidParameter);
                }
                let end = request
                    .address
                    .checked_add(request.blocks)
                    .ok_or(StatusCode::InvalidAddress)?;
                let blocks = request.address..end;
                if blocks.clone().any(|b| tag.locked.contains(&(Some(request.bank), b))) {
                    return Err(StatusCode::LockedMemory);
                }
                let bank = tag.banks.entry(request.bank).or_default();
                if bank.len() < start + data.len() {
                    bank.resize(start + data.len(), 0);
                }
                bank[start..start + data.len()].copy_from_slice(&data);
                if lock {
                    tag.locked.extend(blocks.map(|b| (Some(request.bank), b)));
                }
                Ok(vec![Response::new(command, StatusCode::Success)])
            }
            CommandCode::ReadTagConfig => {
                let tag = self.addressed_tag(&request)?;
                let range = config_range(&request)?;
                let data = Bytes::copy_from_slice(&tag.config[range]);
                Ok(vec![Response::new(command, StatusCode::Success).with_data(data)])
            }
            CommandCode::WriteTagConfig => {
                let lock = request.flags.lock;
                let data = request.data.clone().ok_or(StatusCode::InvalidParameter)?;
                let range = config_range(&request)?;
                if data.len() != range.len() {
                    return Err(StatusCode::InvalidParameter);
                }
                let tag = self.addressed_tag(&request)?;
                let registers = request.address..request.address + request.blocks;
                if registers.clone().any(|r| tag.locked.contains(&(None, r))) {
                    return Err(StatusCode::LockedMemory);
                }
                for (register, value) in registers.clone().zip(data.iter()) {
                    let forced = tag.force_bits.get(&register).copied().unwrap_or(0);
                    tag.config[usize::from(register)] = value | forced;
                }
                if lock {
                    tag.locked.extend(registers.map(|r| (None, r)));
                }
                Ok(vec![Response::new(command, StatusCode::Success)])
            }
            CommandCode::SendTagPassword => {
                let password = request.data.clone().ok_or(StatusCode::InvalidParameter)?;
                let tag = self.addressed_tag(&request)?;
                match &tag.password {
                    Some(expected) if *expected != password => Err(StatusCode::AccessDenied),
                    _ => Ok(vec![Response::new(command, StatusCode::Success)]),
                }
            }
        }
    }

    // The reader starts listening at the configured rate once the serial
    // host interface is (re)selected.
    fn apply_line_settings(&mut self, address: u16) {
        if address != SystemParameter::HostInterface.address() {
            return;
        }
        let interface = self.current[usize::from(address)];
        let baud = self.current[usize::from(SystemParameter::BaudRate.address())];
        if interface == HostInterface::Serial.code() {
            if let Ok(rate) = BaudRate::from_code(baud) {
                self.line_rate = rate.rate();
            }
        }
    }

    fn addressed_tag(&mut self, request: &Request) -> std::result::Result<&mut SimTag, StatusCode> {
        let id = request.tag_id.as_ref().ok_or(StatusCode::InvalidParameter)?;
        self.tag_mut(id).ok_or(StatusCode::NoTag)
    }

    fn inventory_round(&mut self, request: &Request) -> Vec<Response> {
        if self.endless_inventory || request.flags.loop_mode {
            self.inventory = Some((request.tag_type, 0));
            return Vec::new();
        }

        let mut responses: Vec<Response> = self
            .tags
            .iter()
            .filter(|t| request.tag_type.matches(t.tag_type))
            .map(|t| {
                Response::new(CommandCode::SelectTag, StatusCode::TagFound)
                    .with_tag(t.tag_type, t.id.clone())
            })
            .collect();
        responses.push(Response::new(
            CommandCode::SelectTag,
            StatusCode::InventoryComplete,
        ));
        responses
    }

    // Endless rounds report the matching tags over and over.
    fn next_endless_tag(&mut self) {
        let Some((filter, cursor)) = self.inventory else {
            return;
        };
        let matching: Vec<(TagType, Bytes)> = self
            .tags
            .iter()
            .filter(|t| filter.matches(t.tag_type))
            .map(|t| (t.tag_type, t.id.clone()))
            .collect();
        if matching.is_empty() {
            return;
        }

        let (tag_type, id) = matching[cursor % matching.len()].clone();
        self.inventory = Some((filter, cursor.wrapping_add(1)));
        self.queue(Response::new(CommandCode::SelectTag, StatusCode::TagFound).with_tag(tag_type, id));
    }
}

fn param_range(
    request: &Request,
    table_len: usize,
) -> std::result::Result<std::ops::Range<usize>, StatusCode> {
    let start = usize::from(request.address);
    let end = start + usize::from(request.blocks);
    if request.blocks == 0 || end > table_len {
        return Err(StatusCode::InvalidAddress);
    }
    Ok(start..end)
}

fn config_range(request: &Request) -> std::result::Result<std::ops::Range<usize>, StatusCode> {
    param_range(request, CONFIG_REGISTERS)
}

/// In-memory reader behind the [`Transport`] trait.
#[derive(Debug)]
pub struct SimulatedReader {
    address: String,
    kind: TransportKind,
    state: Arc<Mutex<State>>,
    codec: TagLinkCodec<Request>,
    rx: BytesMut,
    open: bool,
}

impl SimulatedReader {
    /// A serial-kind simulated reader at address `"sim"`.
    pub fn new() -> (Self, SimulatorHandle) {
        Self::with_address(TransportKind::Serial, "sim")
    }

    pub fn with_address(kind: TransportKind, address: impl Into<String>) -> (Self, SimulatorHandle) {
        let state = Arc::new(Mutex::new(State::new()));
        let reader = Self {
            address: address.into(),
            kind,
            state: state.clone(),
            codec: TagLinkCodec::new(),
            rx: BytesMut::new(),
            open: false,
        };
        (reader, SimulatorHandle { state })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn check_usable(&self) -> Result<()> {
        if !self.open {
            return Err(Error::fatal(format!("{} is not open", self.address)));
        }
        if self.state().disconnected {
            return Err(Error::fatal(format!("{} disconnected", self.address)));
        }
        Ok(())
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Transport for SimulatedReader {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn open(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.refuse_open || state.disconnected {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not present", self.address),
            )));
        }
        state.open_count += 1;
        drop(state);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.state().close_count += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.check_usable()?;
        self.rx.extend_from_slice(data);

        let mut requests = Vec::new();
        while let Some(request) = self.codec.decode(&mut self.rx)? {
            requests.push(request);
        }

        let mut state = self.state();
        for request in requests {
            state.handle(request);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.check_usable()?;
        let mut state = self.state();
        if state.outbox.is_empty() && state.inventory.is_some() {
            drop(state);
            std::thread::sleep(ENDLESS_TAG_INTERVAL);
            state = self.state();
            state.next_endless_tag();
        }

        if state.outbox.is_empty() {
            return Err(Error::timeout(millis(timeout)));
        }
        let n = buf.len().min(state.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.check_usable()?;
        self.state().outbox.clear();
        Ok(())
    }

    fn set_baud_rate(&mut self, rate: u32) -> Result<()> {
        let mut state = self.state();
        if state.refuse_port_rate {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} rejected {rate} baud", self.address),
            )));
        }
        state.host_baud_rate = Some(rate);
        Ok(())
    }
}

/// Test-side control of a [`SimulatedReader`].
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    state: Arc<Mutex<State>>,
}

impl SimulatorHandle {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Put a tag in the field.
    pub fn add_tag(&self, tag_type: TagType, id: &[u8]) {
        let mut state = self.state();
        if state.tag_mut(id).is_none() {
            state.tags.push(SimTag::new(tag_type, id));
        }
    }

    /// Take a tag out of the field. Its memory is forgotten.
    pub fn remove_tag(&self, id: &[u8]) {
        self.state().tags.retain(|t| t.id != id);
    }

    pub fn clear_tags(&self) {
        self.state().tags.clear();
    }

    /// Overwrite tag memory in `bank` starting at byte `offset`.
    ///
    /// Ignored when the tag is not in the field.
    pub fn set_tag_memory(&self, id: &[u8], bank: u8, offset: usize, data: &[u8]) {
        let mut state = self.state();
        let Some(tag) = state.tag_mut(id) else {
            return;
        };
        let memory = tag.banks.entry(bank).or_default();
        if memory.len() < offset + data.len() {
            memory.resize(offset + data.len(), 0);
        }
        memory[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Raw contents of one bank, empty when never touched.
    pub fn tag_memory(&self, id: &[u8], bank: u8) -> Vec<u8> {
        let mut state = self.state();
        state
            .tag_mut(id)
            .and_then(|t| t.banks.get(&bank).cloned())
            .unwrap_or_default()
    }

    /// Make the tag hold `bits` set in configuration register `register`.
    pub fn set_config_force_bits(&self, id: &[u8], register: u16, bits: u8) {
        let mut state = self.state();
        if let Some(tag) = state.tag_mut(id) {
            if let Some(slot) = tag.config.get_mut(usize::from(register)) {
                *slot |= bits;
                tag.force_bits.insert(register, bits);
            }
        }
    }

    /// Require `password` from [`CommandCode::SendTagPassword`].
    pub fn set_tag_password(&self, id: &[u8], password: &[u8]) {
        if let Some(tag) = self.state().tag_mut(id) {
            tag.password = Some(Bytes::copy_from_slice(password));
        }
    }

    pub fn set_current_parameter(&self, key: SystemParameter, value: &[u8]) {
        let start = usize::from(key.address());
        self.state().current[start..start + value.len()].copy_from_slice(value);
    }

    pub fn current_parameter(&self, key: SystemParameter) -> Vec<u8> {
        let range = usize::from(key.address())..usize::from(key.address() + key.width());
        self.state().current[range].to_vec()
    }

    pub fn set_default_parameter(&self, key: SystemParameter, value: &[u8]) {
        let start = usize::from(key.address());
        self.state().defaults[start..start + value.len()].copy_from_slice(value);
    }

    pub fn default_parameter(&self, key: SystemParameter) -> Vec<u8> {
        let range = usize::from(key.address())..usize::from(key.address() + key.width());
        self.state().defaults[range].to_vec()
    }

    pub fn set_protocol_version(&self, version: u8) {
        self.state().info.protocol_version = version;
    }

    pub fn set_serial_number(&self, serial: &str) {
        self.state().info.serial_number = serial.to_string();
    }

    /// Swallow the next `n` requests without answering.
    pub fn fail_next(&self, n: u32) {
        self.state().drop_next = n;
    }

    /// Answer the next `n` requests with `LoopOff`.
    pub fn loop_off_next(&self, n: u32) {
        self.state().loop_off_next = n;
    }

    /// Answer the next `n` requests with `status`.
    pub fn nack_next(&self, status: StatusCode, n: u32) {
        let mut state = self.state();
        state.nack_next.extend(std::iter::repeat_n(status, n as usize));
    }

    /// Answer every `command` with `status` until [`clear_faults`](Self::clear_faults).
    pub fn fail_command(&self, command: CommandCode, status: StatusCode) {
        self.state().failing_commands.insert(command, status);
    }

    /// Answer the first `successes` later `command` requests normally and
    /// every one after that with `status`.
    pub fn fail_after(&self, command: CommandCode, successes: u32, status: StatusCode) {
        self.state().failing_after.insert(command, (successes, status));
    }

    /// Make the host side port refuse rate changes.
    pub fn refuse_port_rate(&self, refuse: bool) {
        self.state().refuse_port_rate = refuse;
    }

    /// Reject writes of `key`, in either scope, with `status`.
    pub fn fail_parameter_write(&self, key: SystemParameter, status: StatusCode) {
        self.state().failing_parameters.insert(key.address(), status);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.drop_next = 0;
        state.loop_off_next = 0;
        state.nack_next.clear();
        state.failing_commands.clear();
        state.failing_parameters.clear();
        state.failing_after.clear();
        state.refuse_port_rate = false;
        state.silent = false;
    }

    /// Unplug the reader: every later I/O fails as fatal.
    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    /// Make `open` fail, as for a port with nothing attached.
    pub fn refuse_open(&self, refuse: bool) {
        self.state().refuse_open = refuse;
    }

    /// Accept requests but never answer.
    pub fn set_silent(&self, silent: bool) {
        self.state().silent = silent;
    }

    /// Inventory rounds never complete and report tags continuously, as
    /// they do for requests with the loop flag set.
    pub fn set_endless_inventory(&self, endless: bool) {
        self.state().endless_inventory = endless;
    }

    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    pub fn count_of(&self, command: CommandCode) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.command == command)
            .count()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    pub fn open_count(&self) -> u32 {
        self.state().open_count
    }

    pub fn close_count(&self) -> u32 {
        self.state().close_count
    }

    /// Rate the host last configured on the port, if any.
    pub fn host_baud_rate(&self) -> Option<u32> {
        self.state().host_baud_rate
    }

    /// Rate the reader currently listens at.
    pub fn line_rate(&self) -> u32 {
        self.state().line_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taglink_protocol::RequestBuilder;

    fn exchange(reader: &mut SimulatedReader, request: Request) -> Vec<Response> {
        let mut frame = BytesMut::new();
        TagLinkCodec::<Response>::new()
            .encode(request, &mut frame)
            .unwrap();
        reader.send(&frame).unwrap();

        let mut buf = [0u8; 512];
        let mut rx = BytesMut::new();
        while let Ok(n) = reader.receive(&mut buf, Duration::ZERO) {
            rx.extend_from_slice(&buf[..n]);
        }
        let mut codec = TagLinkCodec::<Response>::new();
        let mut responses = Vec::new();
        while let Some(response) = codec.decode(&mut rx).unwrap() {
            responses.push(response);
        }
        responses
    }

    #[test]
    fn test_closed_reader_is_fatal() {
        let (mut reader, _handle) = SimulatedReader::new();
        assert!(reader.send(&[0x02]).unwrap_err().is_fatal());
    }

    #[test]
    fn test_inventory_ends_with_complete() {
        let (mut reader, handle) = SimulatedReader::new();
        reader.open().unwrap();
        handle.add_tag(TagType::Gen2, &[0x01]);
        handle.add_tag(TagType::Gen2, &[0x02]);

        let request = RequestBuilder::new(CommandCode::SelectTag)
            .inventory(true)
            .build()
            .unwrap();
        let statuses: Vec<_> = exchange(&mut reader, request)
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                StatusCode::TagFound,
                StatusCode::TagFound,
                StatusCode::InventoryComplete
            ]
        );
    }

    #[test]
    fn test_unknown_tag_is_no_tag() {
        let (mut reader, _handle) = SimulatedReader::new();
        reader.open().unwrap();
        let request = RequestBuilder::new(CommandCode::ReadTag)
            .tag(TagType::Gen2, vec![0x99])
            .address(0, 1)
            .build()
            .unwrap();
        let responses = exchange(&mut reader, request);
        assert_eq!(responses[0].status, StatusCode::NoTag);
    }

    #[test]
    fn test_loop_flag_streams_tags() {
        let (mut reader, handle) = SimulatedReader::new();
        reader.open().unwrap();
        handle.add_tag(TagType::Gen2, &[0x01]);

        let request = RequestBuilder::new(CommandCode::SelectTag)
            .inventory(true)
            .loop_mode(true)
            .build()
            .unwrap();
        let mut frame = BytesMut::new();
        TagLinkCodec::<Response>::new()
            .encode(request, &mut frame)
            .unwrap();
        reader.send(&frame).unwrap();

        let mut codec = TagLinkCodec::<Response>::new();
        let mut rx = BytesMut::new();
        let mut buf = [0u8; 64];
        let mut found = 0;
        for _ in 0..5 {
            let n = reader.receive(&mut buf, Duration::ZERO).unwrap();
            rx.extend_from_slice(&buf[..n]);
            while let Some(response) = codec.decode(&mut rx).unwrap() {
                assert_eq!(response.status, StatusCode::TagFound);
                found += 1;
            }
        }
        assert_eq!(found, 5);
    }

    #[test]
    fn test_rate_mismatch_drops_requests() {
        let (mut reader, handle) = SimulatedReader::new();
        reader.open().unwrap();
        reader.set_baud_rate(115_200).unwrap();

        let request = RequestBuilder::new(CommandCode::GetReaderInfo).build().unwrap();
        assert!(exchange(&mut reader, request.clone()).is_empty());

        reader.set_baud_rate(handle.line_rate()).unwrap();
        assert_eq!(exchange(&mut reader, request)[0].status, StatusCode::Success);
    }

    #[test]
    fn test_fail_after_counts_successes() {
        let (mut reader, handle) = SimulatedReader::new();
        reader.open().unwrap();
        handle.fail_after(CommandCode::GetReaderInfo, 1, StatusCode::ReadFailed);

        let request = RequestBuilder::new(CommandCode::GetReaderInfo).build().unwrap();
        assert_eq!(exchange(&mut reader, request.clone())[0].status, StatusCode::Success);
        assert_eq!(exchange(&mut reader, request)[0].status, StatusCode::ReadFailed);
    }

    #[test]
    fn test_disconnect_is_fatal() {
        let (mut reader, handle) = SimulatedReader::new();
        reader.open().unwrap();
        handle.disconnect();
        let mut buf = [0u8; 8];
        assert!(reader.receive(&mut buf, Duration::ZERO).unwrap_err().is_fatal());
    }
}
